//! Basic-block execution counters
//!
//! Created and owned by the profiler. A compilation job only carries a
//! shared reference so the code generator can emit counter increments.

use std::sync::atomic::{AtomicU32, Ordering};

/// Per-block execution counts for one compiled function
#[derive(Debug)]
pub struct BasicBlockProfilerData {
    function_name: String,
    block_ids: Vec<u32>,
    counts: Vec<AtomicU32>,
}

impl BasicBlockProfilerData {
    /// Counters for the given blocks, all zero
    pub fn new(function_name: impl Into<String>, block_ids: Vec<u32>) -> Self {
        let counts = block_ids.iter().map(|_| AtomicU32::new(0)).collect();
        Self {
            function_name: function_name.into(),
            block_ids,
            counts,
        }
    }

    /// Profiled function
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Number of instrumented blocks
    pub fn block_count(&self) -> usize {
        self.block_ids.len()
    }

    /// Count an execution of the block at `slot`. Counts saturate.
    #[inline]
    pub fn record(&self, slot: usize) {
        if let Some(counter) = self.counts.get(slot) {
            // Err means the counter is saturated.
            counter
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_add(1))
                .ok();
        }
    }

    /// `(block id, count)` pairs in slot order
    pub fn snapshot(&self) -> Vec<(u32, u32)> {
        self.block_ids
            .iter()
            .zip(&self.counts)
            .map(|(id, count)| (*id, count.load(Ordering::Relaxed)))
            .collect()
    }

    /// Zero every counter
    pub fn reset(&self) {
        for counter in &self.counts {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_per_block() {
        let data = BasicBlockProfilerData::new("loop", vec![0, 3, 7]);
        data.record(0);
        data.record(2);
        data.record(2);
        data.record(99);
        assert_eq!(data.snapshot(), vec![(0, 1), (3, 0), (7, 2)]);

        data.reset();
        assert_eq!(data.snapshot(), vec![(0, 0), (3, 0), (7, 0)]);
    }

    #[test]
    fn counts_saturate() {
        let data = BasicBlockProfilerData::new("hot", vec![1]);
        data.counts[0].store(u32::MAX, Ordering::Relaxed);
        data.record(0);
        assert_eq!(data.snapshot(), vec![(1, u32::MAX)]);
    }
}
