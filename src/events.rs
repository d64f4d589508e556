//! Input events the shell feeds into the Instance, one at a time.

use crate::member::Member;
use crate::node::Node;
use crate::status::Incarnation;

/// The outcome of a direct probe (`onPeriodicPingTick`'s ping) or of the
/// shell relaying back a reply from a ping it sent on our behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingResponse {
    Ack { target: Node, incarnation: Incarnation, gossip: Vec<Member>, sequence_number: u64 },
    Nack { target: Node, sequence_number: u64 },
    Timeout { target: Node, sequence_number: u64 },
}

/// The outcome of an indirect probe, reported by the shell once it hears
/// back from (or times out on) the node it asked to relay a ping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingRequestResponse {
    Ack { incarnation: Incarnation, gossip: Vec<Member> },
    Nack,
    Timeout,
}

/// Every event the Instance can consume. `Instance::handle` dispatches on
/// this; the individual `on_*` methods on `Instance` are also public for
/// shells that prefer to call them directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PeriodicPingTick,
    Ping { origin: Node, payload: Vec<Member>, sequence_number: u64 },
    PingRequest { target: Node, reply_to: Node, payload: Vec<Member> },
    PingResponse { response: PingResponse, ping_request_origin: Option<Node> },
    EveryPingRequestResponse { response: PingRequestResponse },
    PingRequestResponse { response: PingRequestResponse, pinged_member: Node },
    ConfirmDead { peer: Node },
}
