//! Exhaustive Instance configuration (§6). Validated once at construction;
//! see [`crate::error::ConfigError`].

use crate::error::ConfigError;
use std::sync::Arc;
use std::time::Duration;

/// Whether the `Unreachable` status is reachable at all. When disabled, any
/// transition that would produce `Unreachable` is promoted straight to
/// `Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreachabilityExtension {
    Enabled,
    Disabled,
}

impl UnreachabilityExtension {
    pub fn is_enabled(self) -> bool {
        matches!(self, UnreachabilityExtension::Enabled)
    }
}

/// A single gossip heap entry, exposed to the `needs_to_be_gossiped_more_times`
/// predicate so it can see the dissemination count without depending on the
/// heap's internal type.
#[derive(Debug, Clone, Copy)]
pub struct GossipEntryView {
    pub times_gossiped: u32,
}

pub type NeedsToBeGossipedMoreTimes = Arc<dyn Fn(GossipEntryView, usize) -> bool + Send + Sync>;

/// The Lifeguard-specific knobs: LHM ceiling and suspicion timeout bounds.
#[derive(Debug, Clone)]
pub struct LifeguardConfig {
    pub max_local_health_multiplier: u32,
    pub suspicion_timeout_min: Duration,
    pub suspicion_timeout_max: Duration,
    pub max_independent_suspicions: u32,
}

impl Default for LifeguardConfig {
    fn default() -> Self {
        LifeguardConfig {
            max_local_health_multiplier: 8,
            suspicion_timeout_min: Duration::from_secs(1),
            suspicion_timeout_max: Duration::from_secs(10),
            max_independent_suspicions: 3,
        }
    }
}

/// Gossip dissemination knobs.
#[derive(Clone)]
pub struct GossipConfig {
    pub max_messages_per_gossip: usize,
    /// Standard SWIM dissemination count `ceil(lambda * log(n + 1))` by
    /// default; configurable per §4.4.
    pub needs_to_be_gossiped_more_times: NeedsToBeGossipedMoreTimes,
}

/// Standard SWIM dissemination predicate, parameterized by the tuning
/// constant `lambda`. An entry keeps circulating until it's been gossiped at
/// least `ceil(lambda * log(cluster_size + 1))` times.
pub fn standard_dissemination_limit(lambda: f64) -> NeedsToBeGossipedMoreTimes {
    Arc::new(move |entry: GossipEntryView, cluster_size: usize| {
        let limit = (lambda * ((cluster_size + 1) as f64).ln()).ceil() as u32;
        entry.times_gossiped < limit.max(1)
    })
}

impl std::fmt::Debug for GossipConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GossipConfig")
            .field("max_messages_per_gossip", &self.max_messages_per_gossip)
            .field("needs_to_be_gossiped_more_times", &"<fn>")
            .finish()
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        GossipConfig {
            max_messages_per_gossip: 6,
            needs_to_be_gossiped_more_times: standard_dissemination_limit(3.0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub probe_interval: Duration,
    pub ping_timeout: Duration,
    pub indirect_probe_count: usize,
    pub indirect_ping_timeout_multiplier: f64,
    pub lifeguard: LifeguardConfig,
    pub gossip: GossipConfig,
    pub extension_unreachability: UnreachabilityExtension,
    pub rng_seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            probe_interval: Duration::from_millis(200),
            ping_timeout: Duration::from_millis(500),
            indirect_probe_count: 3,
            indirect_ping_timeout_multiplier: 0.6,
            lifeguard: LifeguardConfig::default(),
            gossip: GossipConfig::default(),
            extension_unreachability: UnreachabilityExtension::Disabled,
            rng_seed: 0,
        }
    }
}

impl Config {
    /// Check the invariants every update path relies on. Mirrors §4.8 of the
    /// spec this crate implements.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indirect_probe_count == 0 {
            return Err(ConfigError::InvalidIndirectProbeCount);
        }
        if !(self.indirect_ping_timeout_multiplier > 0.0 && self.indirect_ping_timeout_multiplier < 1.0) {
            return Err(ConfigError::InvalidIndirectPingTimeoutMultiplier(
                self.indirect_ping_timeout_multiplier.to_string(),
            ));
        }
        if self.lifeguard.suspicion_timeout_min > self.lifeguard.suspicion_timeout_max {
            return Err(ConfigError::SuspicionTimeoutBoundsInverted {
                min: self.lifeguard.suspicion_timeout_min,
                max: self.lifeguard.suspicion_timeout_max,
            });
        }
        if self.lifeguard.max_independent_suspicions == 0 {
            return Err(ConfigError::InvalidMaxIndependentSuspicions);
        }
        if self.gossip.max_messages_per_gossip == 0 {
            return Err(ConfigError::InvalidMaxMessagesPerGossip);
        }
        Ok(())
    }

    pub fn indirect_ping_timeout(&self) -> Duration {
        self.ping_timeout.mul_f64(self.indirect_ping_timeout_multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_indirect_probe_count() {
        let mut cfg = Config::default();
        cfg.indirect_probe_count = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidIndirectProbeCount));
    }

    #[test]
    fn rejects_out_of_range_indirect_multiplier() {
        let mut cfg = Config::default();
        cfg.indirect_ping_timeout_multiplier = 1.2;
        assert!(cfg.validate().is_err());
        cfg.indirect_ping_timeout_multiplier = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_suspicion_bounds() {
        let mut cfg = Config::default();
        cfg.lifeguard.suspicion_timeout_min = Duration::from_secs(20);
        cfg.lifeguard.suspicion_timeout_max = Duration::from_secs(1);
        assert!(matches!(cfg.validate(), Err(ConfigError::SuspicionTimeoutBoundsInverted { .. })));
    }

    #[test]
    fn standard_dissemination_limit_increases_with_cluster_size() {
        let pred = standard_dissemination_limit(3.0);
        let entry = GossipEntryView { times_gossiped: 2 };
        assert!(!pred(entry, 1));
        assert!(pred(entry, 1000));
    }
}
