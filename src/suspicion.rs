//! Lifeguard IV-B adaptive suspicion timeout: shrinks logarithmically as
//! more independent nodes confirm the same suspicion.

use std::time::Duration;

/// `T = max(Min, Max - (Max - Min) * log2(c + 1) / log2(K + 1))`
///
/// `c` is the number of independent suspecting nodes, `K` the configured cap
/// on that count. At `c = 0` this returns `Max`; as `c` approaches `K` it
/// approaches `Min`.
pub fn suspicion_timeout(min: Duration, max: Duration, suspected_by_count: usize, max_independent_suspicions: u32) -> Duration {
    debug_assert!(min <= max, "suspicion timeout bounds must be ordered min <= max");
    if max_independent_suspicions == 0 {
        return max;
    }
    let c = suspected_by_count as f64;
    let k = max_independent_suspicions as f64;
    let span = max.as_secs_f64() - min.as_secs_f64();
    let decay = (c + 1.0).log2() / (k + 1.0).log2();
    let t = max.as_secs_f64() - span * decay;
    Duration::from_secs_f64(t.max(min.as_secs_f64()))
}

/// Whether a suspicion that started at `started_at_nanos` has timed out by
/// `now_nanos`, given the computed timeout.
pub fn has_timed_out(started_at_nanos: u64, now_nanos: u64, timeout: Duration) -> bool {
    now_nanos >= started_at_nanos.saturating_add(timeout.as_nanos() as u64)
}
