//! Progress counter for long-running compilation stages
//!
//! Stages tick it as they make progress; a watchdog on another thread polls
//! a [`TickWatch`] to tell a slow job from a stuck one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic tick counter owned by a compilation job
#[derive(Debug, Default)]
pub struct TickCounter {
    ticks: Arc<AtomicU64>,
}

impl TickCounter {
    /// Counter starting at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one unit of progress
    #[inline]
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Ticks so far
    #[inline]
    pub fn current(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Read-only view for a watchdog
    pub fn watch(&self) -> TickWatch {
        TickWatch {
            ticks: self.ticks.clone(),
            last_seen: self.current(),
        }
    }
}

/// Watchdog side of a [`TickCounter`]
#[derive(Debug, Clone)]
pub struct TickWatch {
    ticks: Arc<AtomicU64>,
    last_seen: u64,
}

impl TickWatch {
    /// Current tick count
    pub fn poll(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Whether the counter moved since the last call (or since the watch
    /// was created)
    pub fn has_progressed(&mut self) -> bool {
        let now = self.poll();
        let moved = now != self.last_seen;
        self.last_seen = now;
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_accumulate() {
        let counter = TickCounter::new();
        for _ in 0..3 {
            counter.tick();
        }
        assert_eq!(counter.current(), 3);
    }

    #[test]
    fn watch_sees_progress_from_another_thread() {
        let counter = TickCounter::new();
        let mut watch = counter.watch();
        assert!(!watch.has_progressed());

        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..10 {
                    counter.tick();
                }
            });
        });

        assert!(watch.has_progressed());
        assert_eq!(watch.poll(), 10);
        assert!(!watch.has_progressed());
    }
}
