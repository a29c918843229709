//! Count-based sliding window of recent call outcomes.
//!
//! # Responsibilities
//! - Hold at most `capacity` outcomes, evicting the oldest (FIFO)
//! - Maintain running failure/slow counts incrementally
//! - Report rates without rescanning the buffer
//!
//! # Design Decisions
//! - Owned by exactly one breaker, mutated only under its lock
//! - Records are immutable once appended

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::Serialize;

/// Classification of a finished call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
    /// Succeeded, but took at least the slow-call threshold.
    SlowSuccess,
}

impl OutcomeKind {
    /// Classify a finished call against the slow-call threshold.
    pub fn classify(succeeded: bool, duration: Duration, slow_threshold: Duration) -> Self {
        match (succeeded, duration >= slow_threshold) {
            (false, _) => OutcomeKind::Failure,
            (true, true) => OutcomeKind::SlowSuccess,
            (true, false) => OutcomeKind::Success,
        }
    }
}

/// One recorded outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub kind: OutcomeKind,
    pub duration: Duration,
    pub recorded_at: Instant,
}

/// Aggregated counts over the current window contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub total: usize,
    pub failures: usize,
    pub slow: usize,
}

impl WindowStats {
    /// Percentage of failed calls; 0 for an empty window.
    pub fn failure_rate(&self) -> f32 {
        percentage(self.failures, self.total)
    }

    /// Percentage of slow calls; 0 for an empty window.
    pub fn slow_call_rate(&self) -> f32 {
        percentage(self.slow, self.total)
    }
}

fn percentage(part: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f32 / total as f32
    }
}

/// Ring buffer of outcomes with pre-aggregated counts.
#[derive(Debug)]
pub struct OutcomeWindow {
    records: VecDeque<OutcomeRecord>,
    capacity: usize,
    failures: usize,
    slow: usize,
}

impl OutcomeWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            failures: 0,
            slow: 0,
        }
    }

    /// Append an outcome, evicting the oldest one when full.
    pub fn record(&mut self, record: OutcomeRecord) {
        if self.records.len() == self.capacity {
            if let Some(evicted) = self.records.pop_front() {
                self.adjust(evicted.kind, false);
            }
        }
        self.adjust(record.kind, true);
        self.records.push_back(record);
    }

    pub fn stats(&self) -> WindowStats {
        WindowStats {
            total: self.records.len(),
            failures: self.failures,
            slow: self.slow,
        }
    }

    /// Drop every record and reset the counts.
    pub fn clear(&mut self) {
        self.records.clear();
        self.failures = 0;
        self.slow = 0;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &OutcomeRecord> {
        self.records.iter()
    }

    fn adjust(&mut self, kind: OutcomeKind, inserted: bool) {
        let counter = match kind {
            OutcomeKind::Failure => &mut self.failures,
            OutcomeKind::SlowSuccess => &mut self.slow,
            OutcomeKind::Success => return,
        };
        if inserted {
            *counter += 1;
        } else {
            *counter -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(kind: OutcomeKind) -> OutcomeRecord {
        OutcomeRecord {
            kind,
            duration: Duration::from_millis(1),
            recorded_at: Instant::now(),
        }
    }

    #[test]
    fn test_classify() {
        let slow = Duration::from_millis(100);
        assert_eq!(
            OutcomeKind::classify(true, Duration::from_millis(5), slow),
            OutcomeKind::Success
        );
        assert_eq!(OutcomeKind::classify(true, slow, slow), OutcomeKind::SlowSuccess);
        // A slow failure is still a failure
        assert_eq!(
            OutcomeKind::classify(false, Duration::from_secs(5), slow),
            OutcomeKind::Failure
        );
    }

    #[test]
    fn test_empty_window_rates() {
        let window = OutcomeWindow::new(4);
        let stats = window.stats();
        assert_eq!(stats, WindowStats::default());
        assert_eq!(stats.failure_rate(), 0.0);
        assert_eq!(stats.slow_call_rate(), 0.0);
    }

    #[test]
    fn test_eviction_keeps_counts_in_sync() {
        let mut window = OutcomeWindow::new(3);
        window.record(outcome(OutcomeKind::Failure));
        window.record(outcome(OutcomeKind::SlowSuccess));
        window.record(outcome(OutcomeKind::Success));
        assert_eq!(window.stats(), WindowStats { total: 3, failures: 1, slow: 1 });

        // Evicts the failure
        window.record(outcome(OutcomeKind::Success));
        assert_eq!(window.stats(), WindowStats { total: 3, failures: 0, slow: 1 });

        // Evicts the slow success
        window.record(outcome(OutcomeKind::Failure));
        assert_eq!(window.stats(), WindowStats { total: 3, failures: 1, slow: 0 });

        let kinds: Vec<_> = window.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![OutcomeKind::Success, OutcomeKind::Success, OutcomeKind::Failure]
        );
    }

    #[test]
    fn test_rates() {
        let mut window = OutcomeWindow::new(10);
        window.record(outcome(OutcomeKind::Success));
        window.record(outcome(OutcomeKind::Failure));
        window.record(outcome(OutcomeKind::SlowSuccess));
        window.record(outcome(OutcomeKind::Failure));

        let stats = window.stats();
        assert_eq!(stats.failure_rate(), 50.0);
        assert_eq!(stats.slow_call_rate(), 25.0);
    }

    #[test]
    fn test_clear() {
        let mut window = OutcomeWindow::new(2);
        window.record(outcome(OutcomeKind::Failure));
        window.record(outcome(OutcomeKind::SlowSuccess));
        window.clear();

        assert!(window.is_empty());
        assert_eq!(window.stats(), WindowStats::default());
        assert_eq!(window.capacity(), 2);
    }
}
