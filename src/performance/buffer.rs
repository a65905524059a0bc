//! Bounded metric history and its aggregations.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;

/// Number of raw samples returned with [`OperationStats`].
pub const RECENT_SAMPLES: usize = 10;

/// One recorded duration sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    operation: String,
    duration_ms: u64,
    recorded_at: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Value>,
    failed: bool,
}

impl Metric {
    pub fn new(
        operation: impl Into<String>,
        duration_ms: u64,
        metadata: Option<Value>,
        failed: bool,
    ) -> Self {
        Self {
            operation: operation.into(),
            duration_ms,
            recorded_at: Local::now(),
            metadata,
            failed,
        }
    }

    /// The same sample with `metadata` replaced.
    pub fn with_metadata(&self, metadata: Option<Value>) -> Self {
        Self {
            metadata,
            ..self.clone()
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn recorded_at(&self) -> DateTime<Local> {
        self.recorded_at
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    pub fn failed(&self) -> bool {
        self.failed
    }
}

/// Aggregate over a set of samples. All numbers are zero for an empty set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    pub count: usize,
    pub average_ms: f64,
    pub max_ms: u64,
    pub min_ms: u64,
    pub failures: usize,
    /// Up to [`RECENT_SAMPLES`] newest samples, oldest first.
    pub recent: Vec<Metric>,
}

/// One row of the slow-operations report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowOperation {
    pub operation: String,
    pub count: usize,
    pub average_ms: f64,
    pub max_ms: u64,
}

/// Fixed-capacity FIFO of metrics. The oldest sample is evicted once full.
#[derive(Debug)]
pub struct MetricBuffer {
    capacity: usize,
    samples: VecDeque<Metric>,
}

impl MetricBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, metric: Metric) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(metric);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stats over every sample, or only those of `operation`.
    pub fn stats(&self, operation: Option<&str>) -> OperationStats {
        let selected: Vec<&Metric> = self
            .samples
            .iter()
            .filter(|m| operation.map_or(true, |op| m.operation == op))
            .collect();

        if selected.is_empty() {
            return OperationStats::default();
        }

        let count = selected.len();
        let total: u64 = selected.iter().map(|m| m.duration_ms).sum();
        let max_ms = selected.iter().map(|m| m.duration_ms).max().unwrap_or(0);
        let min_ms = selected.iter().map(|m| m.duration_ms).min().unwrap_or(0);
        let failures = selected.iter().filter(|m| m.failed).count();
        let recent = selected[count.saturating_sub(RECENT_SAMPLES)..]
            .iter()
            .map(|m| (*m).clone())
            .collect();

        OperationStats {
            count,
            average_ms: total as f64 / count as f64,
            max_ms,
            min_ms,
            failures,
            recent,
        }
    }

    /// Samples slower than `threshold_ms`, grouped by operation, slowest
    /// average first.
    pub fn slow_operations(&self, threshold_ms: u64) -> Vec<SlowOperation> {
        let mut groups: HashMap<&str, (usize, u64, u64)> = HashMap::new();
        for metric in self.samples.iter().filter(|m| m.duration_ms > threshold_ms) {
            let entry = groups.entry(metric.operation.as_str()).or_insert((0, 0, 0));
            entry.0 += 1;
            entry.1 += metric.duration_ms;
            entry.2 = entry.2.max(metric.duration_ms);
        }

        let mut report: Vec<SlowOperation> = groups
            .into_iter()
            .map(|(operation, (count, total, max_ms))| SlowOperation {
                operation: operation.to_string(),
                count,
                average_ms: total as f64 / count as f64,
                max_ms,
            })
            .collect();
        report.sort_by(|a, b| b.average_ms.total_cmp(&a.average_ms));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(op: &str, ms: u64) -> Metric {
        Metric::new(op, ms, None, false)
    }

    #[test]
    fn test_empty_stats_are_zeroed() {
        let buffer = MetricBuffer::new(10);
        assert_eq!(buffer.stats(None), OperationStats::default());
        assert_eq!(buffer.stats(Some("db.query")).count, 0);
        assert!(buffer.stats(None).recent.is_empty());
    }

    #[test]
    fn test_fifo_eviction_keeps_most_recent() {
        let mut buffer = MetricBuffer::new(3);
        for ms in [100, 200, 300, 400, 500] {
            buffer.push(sample("op", ms));
        }

        let stats = buffer.stats(None);
        assert_eq!(buffer.len(), 3);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min_ms, 300);
        assert_eq!(stats.max_ms, 500);
        assert_eq!(stats.average_ms, 400.0);
    }

    #[test]
    fn test_stats_filter_and_recent_window() {
        let mut buffer = MetricBuffer::new(100);
        for ms in 1..=15 {
            buffer.push(sample("render", ms));
        }
        buffer.push(Metric::new("db.query", 40, None, true));

        let render = buffer.stats(Some("render"));
        assert_eq!(render.count, 15);
        assert_eq!(render.recent.len(), RECENT_SAMPLES);
        assert_eq!(render.recent[0].duration_ms(), 6);
        assert_eq!(render.recent[9].duration_ms(), 15);
        assert_eq!(render.failures, 0);

        let db = buffer.stats(Some("db.query"));
        assert_eq!(db.count, 1);
        assert_eq!(db.failures, 1);
    }

    #[test]
    fn test_slow_operations_report() {
        let mut buffer = MetricBuffer::new(100);
        buffer.push(sample("fast", 10));
        buffer.push(sample("export", 1500));
        buffer.push(sample("export", 2500));
        buffer.push(sample("report", 4000));
        buffer.push(sample("report", 900));

        let report = buffer.slow_operations(1000);
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].operation, "report");
        assert_eq!(report[0].count, 1);
        assert_eq!(report[0].max_ms, 4000);
        assert_eq!(report[1].operation, "export");
        assert_eq!(report[1].count, 2);
        assert_eq!(report[1].average_ms, 2000.0);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = MetricBuffer::new(0);
        buffer.push(sample("a", 1));
        buffer.push(sample("b", 2));
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.stats(None).recent[0].operation(), "b");
    }
}
