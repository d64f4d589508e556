//! A deterministic SWIM+Lifeguard failure detector, expressed as a pure
//! reducer: `(state, event) -> (state', directives)`.
//!
//! [`Instance`] owns the full membership state -- the peer table, the
//! round-robin ping cursor, the gossip dissemination heap, the Lifeguard
//! Local Health Multiplier -- and never performs I/O, never sleeps, and
//! never spawns anything. A shell feeds it [`Event`]s (timer ticks, inbound
//! messages) one at a time and carries out whatever [`Directive`]s come
//! back: send this ping, arm that timeout, publish this membership change.
//!
//! Every source of non-determinism the algorithm needs -- wall-clock time
//! and randomness -- is injected: see [`Clock`] and [`Config::rng_seed`].
//! Given the same event sequence, the same config, and the same clock
//! readings, two `Instance`s produce identical directives.

mod clock;
mod config;
mod directive;
mod error;
mod events;
mod gossip;
mod instance;
mod lhm;
mod member;
mod membership;
mod node;
mod status;
mod suspicion;

pub use clock::Clock;
pub use config::{
    standard_dissemination_limit, Config, GossipConfig, GossipEntryView, LifeguardConfig,
    NeedsToBeGossipedMoreTimes, UnreachabilityExtension,
};
pub use directive::{
    ConfirmDeadOutcome, Directive, GossipApplyOutcome, MembershipChange, PingRequestCandidate,
    PingRequestResponseOutcome,
};
pub use error::ConfigError;
pub use events::{Event, PingRequestResponse, PingResponse};
pub use instance::Instance;
pub use lhm::LhmEvent;
pub use member::Member;
pub use membership::{AddMemberOutcome, MarkOutcome};
pub use node::{Node, Uid};
pub use status::{Incarnation, Status};
