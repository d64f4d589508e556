//! Lifeguard Local Health Multiplier: a saturating counter that dilates
//! probe intervals and timeouts when the local node looks overloaded.

/// Categorized events that move the multiplier. Values match §4.2: a
/// successful direct probe is the only event that improves (decreases) local
/// health; everything else that suggests the local node is struggling to
/// keep its protocol timing increases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LhmEvent {
    SuccessfulProbe,
    FailedProbe,
    RefutingSuspectAboutSelf,
    ProbeWithMissedNack,
}

impl LhmEvent {
    fn delta(self) -> i32 {
        match self {
            LhmEvent::SuccessfulProbe => -1,
            LhmEvent::FailedProbe => 1,
            LhmEvent::RefutingSuspectAboutSelf => 1,
            LhmEvent::ProbeWithMissedNack => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lhm {
    value: u32,
    max: u32,
}

impl Lhm {
    pub fn new(max: u32) -> Self {
        Lhm { value: 0, max }
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// Apply `event`, clamping to `[0, max]`. Returns the new value.
    pub fn adjust(&mut self, event: LhmEvent) -> u32 {
        let delta = event.delta();
        self.value = if delta.is_negative() {
            self.value.saturating_sub(delta.unsigned_abs())
        } else {
            (self.value + delta as u32).min(self.max)
        };
        self.value
    }

    pub fn dynamic_probe_interval(&self, base: std::time::Duration) -> std::time::Duration {
        base * (1 + self.value)
    }

    pub fn dynamic_ping_timeout(&self, base: std::time::Duration) -> std::time::Duration {
        base * (1 + self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_zero_and_max() {
        let mut lhm = Lhm::new(2);
        lhm.adjust(LhmEvent::SuccessfulProbe);
        assert_eq!(lhm.value(), 0, "cannot go below zero");
        lhm.adjust(LhmEvent::FailedProbe);
        lhm.adjust(LhmEvent::FailedProbe);
        lhm.adjust(LhmEvent::FailedProbe);
        assert_eq!(lhm.value(), 2, "cannot exceed configured max");
    }

    #[test]
    fn successful_probe_decreases_failed_probe_increases() {
        let mut lhm = Lhm::new(5);
        lhm.adjust(LhmEvent::FailedProbe);
        lhm.adjust(LhmEvent::FailedProbe);
        assert_eq!(lhm.value(), 2);
        lhm.adjust(LhmEvent::SuccessfulProbe);
        assert_eq!(lhm.value(), 1);
    }

    #[test]
    fn dynamic_timeout_scales_with_multiplier() {
        let mut lhm = Lhm::new(5);
        let base = std::time::Duration::from_millis(100);
        assert_eq!(lhm.dynamic_ping_timeout(base), base);
        lhm.adjust(LhmEvent::FailedProbe);
        assert_eq!(lhm.dynamic_ping_timeout(base), base * 2);
    }
}
