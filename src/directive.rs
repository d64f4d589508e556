//! Directives: instructions the Instance returns for the shell to carry out.
//! The Instance never performs I/O itself; everything externally visible
//! flows through this sum type.

use crate::member::Member;
use crate::node::Node;
use crate::status::{Incarnation, Status};
use std::time::Duration;

/// Outcome of folding one gossip record that actually changed the
/// membership table. Stale/duplicate records are dropped silently during
/// fold-in (§4.6) -- they never reach the shell as a directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GossipApplyOutcome {
    pub previous_status: Option<Status>,
    pub member: Member,
}

/// A membership change worth telling the shell about (e.g. for publishing
/// to subscribers, updating a routing table, emitting metrics upstream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    pub previous_status: Option<Status>,
    pub member: Member,
}

/// Outcome of [`crate::instance::Instance::confirm_dead`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmDeadOutcome {
    Applied(MembershipChange),
    Ignored,
}

/// Outcome of an indirect-probe reply, reported via `onPingRequestResponse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingRequestResponseOutcome {
    UnknownMember,
    Alive(Option<Status>),
    IgnoredDueToOlderStatus,
    NackReceived,
    NewlySuspect,
    AlreadyUnreachable,
    AlreadyDead,
}

/// One candidate queried on behalf of an indirect probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingRequestCandidate {
    pub candidate: Node,
    pub gossip: Vec<Member>,
    pub sequence_number: u64,
}

/// Everything the Instance can ask the shell to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Send a direct ping to `target`, arming a timeout timer for `timeout`
    /// and expecting a reply keyed by `sequence_number`. When this ping is
    /// being sent on behalf of a ping-request from another peer (§4.5
    /// `onPingRequest`), `on_behalf_of` names that peer; the shell must
    /// thread it back in as `ping_request_origin` when it reports the
    /// eventual ack/nack/timeout via `PingResponse`.
    SendPing { target: Node, timeout: Duration, sequence_number: u64, on_behalf_of: Option<Node> },

    /// Reply to a ping/ping-request with an ack.
    SendAck {
        to: Node,
        incarnation: Incarnation,
        gossip: Vec<Member>,
        acknowledging: u64,
    },

    /// Reply to a ping-request whose indirect probe timed out.
    SendNack { to: Node, acknowledging: u64, target: Node },

    /// Probe `target` indirectly via each listed candidate.
    SendPingRequests { target: Node, candidates: Vec<PingRequestCandidate> },

    /// Result of folding one incoming gossip record.
    GossipProcessed(GossipApplyOutcome),

    /// A member's status changed as a direct result of handling this event.
    MembershipChanged(MembershipChange),

    /// Outcome of an indirect-probe reply (ack/nack/timeout) reported back
    /// through `onPingRequestResponse`.
    PingRequestResponse(PingRequestResponseOutcome),

    /// Nothing to do (e.g. a ping-request that targeted ourselves).
    Ignore,
}
