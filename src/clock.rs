//! Monotonic time source, injectable so tests can virtualize the clock.

use std::sync::Arc;

/// A monotonic nanosecond source.
///
/// The Instance never calls `Instant::now()` directly; every timestamp it
/// stamps or compares against comes from a `Clock`. Production shells wrap a
/// real monotonic clock; tests wrap a counter they can advance by hand.
#[derive(Clone)]
pub struct Clock(Arc<dyn Fn() -> u64 + Send + Sync>);

impl Clock {
    /// Wrap an arbitrary nanosecond source.
    pub fn new<F>(now_nanos: F) -> Self
    where
        F: Fn() -> u64 + Send + Sync + 'static,
    {
        Clock(Arc::new(now_nanos))
    }

    /// A clock backed by `std::time::Instant`, relative to its own creation.
    pub fn system() -> Self {
        let start = std::time::Instant::now();
        Clock::new(move || start.elapsed().as_nanos() as u64)
    }

    pub fn now_nanos(&self) -> u64 {
        (self.0)()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Clock::system()
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Clock(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn virtualized_clock_is_controllable() {
        let t = Arc::new(AtomicU64::new(0));
        let t2 = t.clone();
        let clock = Clock::new(move || t2.load(Ordering::SeqCst));
        assert_eq!(clock.now_nanos(), 0);
        t.store(42, Ordering::SeqCst);
        assert_eq!(clock.now_nanos(), 42);
    }
}
