//! The Instance's only fallible surface: validating configuration at
//! construction time. Once built, `Instance` methods are infallible.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("indirect_probe_count must be greater than zero")]
    InvalidIndirectProbeCount,

    #[error("indirect_ping_timeout_multiplier must be in (0.0, 1.0), got {0}")]
    InvalidIndirectPingTimeoutMultiplier(String),

    #[error("lifeguard.suspicion_timeout_min ({min:?}) must be <= lifeguard.suspicion_timeout_max ({max:?})")]
    SuspicionTimeoutBoundsInverted {
        min: std::time::Duration,
        max: std::time::Duration,
    },

    #[error("lifeguard.max_independent_suspicions must be greater than zero")]
    InvalidMaxIndependentSuspicions,

    #[error("gossip.max_messages_per_gossip must be greater than zero")]
    InvalidMaxMessagesPerGossip,
}
