//! Bounded latency samples per strategy.

use std::collections::VecDeque;
use std::time::Duration;

/// Keeps the most recent `capacity` latency samples.
#[derive(Debug, Clone)]
pub(crate) struct LatencyWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyWindow {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn push(&mut self, sample: Duration) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Average in milliseconds, `None` when empty.
    pub(crate) fn average_ms(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let total: f64 = self.samples.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
        Some(total / self.samples.len() as f64)
    }

    pub(crate) fn len(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_drops_oldest_sample() {
        let mut w = LatencyWindow::new(3);
        for ms in [10, 20, 30, 40] {
            w.push(Duration::from_millis(ms));
        }
        assert_eq!(w.len(), 3);
        let avg = w.average_ms().unwrap();
        assert!((avg - 30.0).abs() < 1e-9);
    }

    #[test]
    fn empty_window_has_no_average() {
        assert_eq!(LatencyWindow::new(5).average_ms(), None);
    }
}
