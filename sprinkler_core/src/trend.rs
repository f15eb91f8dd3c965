//! Rolling-window slope estimate for noisy sensor sequences.

use std::collections::VecDeque;

/// Fixed-capacity window of the most recent samples. Pushing into a full
/// window evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    values: VecDeque<i32>,
    capacity: usize,
}

impl TrendAnalyzer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(2);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: i32) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mean of the whole window, 0 when empty.
    pub fn avg_value(&self) -> i32 {
        if self.values.is_empty() {
            return 0;
        }
        let sum: i64 = self.values.iter().map(|&v| i64::from(v)).sum();
        (sum / self.values.len() as i64) as i32
    }

    /// Mean of the `k` samples following index `s`. Out-of-range indices are
    /// ignored.
    pub fn avg_range(&self, s: usize, k: usize) -> i32 {
        let len = self.values.len();
        let start = s.saturating_add(1).min(len);
        let end = start.saturating_add(k).min(len);
        if start == end {
            return 0;
        }
        let sum: i64 = self.values.range(start..end).map(|&v| i64::from(v)).sum();
        (sum / (end - start) as i64) as i32
    }

    /// Mean of the newest `k` samples minus the mean of the oldest `k`
    /// (the first sample serves as the base of both ranges).
    pub fn trend(&self, k: usize) -> i32 {
        let len = self.values.len();
        if len < 2 {
            return 0;
        }
        let k = k.clamp(1, len - 1);
        self.avg_range(len - k - 1, k) - self.avg_range(0, k)
    }
}
