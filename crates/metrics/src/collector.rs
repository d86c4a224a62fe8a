use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::info;

use crate::Metrics;

/// Counter used to derive throughput in the report.
const THROUGHPUT_COUNTER: &str = "transaction_committed";

/// In-memory metrics sink. Gathers counters and latency samples for the
/// duration of a run and summarizes them into a [`MetricsReport`].
#[derive(Debug)]
pub struct Collector {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    started_at: Instant,
    counters: BTreeMap<&'static str, u64>,
    latencies: BTreeMap<&'static str, LatencySummary>,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                started_at: Instant::now(),
                counters: BTreeMap::new(),
                latencies: BTreeMap::new(),
            }),
        }
    }

    /// Restarts the collection period, keeping already recorded values.
    pub fn start(&self) {
        self.lock().started_at = Instant::now();
        info!("Metrics collection started");
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.lock().counters.get(name).copied().unwrap_or_default()
    }

    pub fn latency(&self, name: &str) -> Option<LatencySummary> {
        self.lock().latencies.get(name).copied()
    }

    pub fn report(&self) -> MetricsReport {
        let inner = self.lock();
        let elapsed = inner.started_at.elapsed();
        let committed = inner
            .counters
            .get(THROUGHPUT_COUNTER)
            .copied()
            .unwrap_or_default();
        let throughput = if elapsed.is_zero() {
            0.0
        } else {
            committed as f64 / elapsed.as_secs_f64()
        };

        MetricsReport {
            elapsed,
            throughput,
            counters: inner.counters.clone(),
            latencies: inner.latencies.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking producer can not leave counters half-updated
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics for Collector {
    fn increment(&self, name: &'static str) {
        *self.lock().counters.entry(name).or_default() += 1;
    }

    fn record_latency(&self, name: &'static str, latency: Duration) {
        self.lock()
            .latencies
            .entry(name)
            .or_default()
            .record(latency);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: u64,
    pub total: Duration,
    pub min: Duration,
    pub max: Duration,
}

impl LatencySummary {
    fn record(&mut self, latency: Duration) {
        if self.count == 0 || latency < self.min {
            self.min = latency;
        }
        if latency > self.max {
            self.max = latency;
        }
        self.count += 1;
        self.total += latency;
    }

    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos((self.total.as_nanos() / u128::from(self.count)) as u64)
    }
}

/// Snapshot of everything a [`Collector`] gathered.
#[derive(Clone, Debug)]
pub struct MetricsReport {
    pub elapsed: Duration,
    /// Committed transactions per second.
    pub throughput: f64,
    pub counters: BTreeMap<&'static str, u64>,
    pub latencies: BTreeMap<&'static str, LatencySummary>,
}

impl MetricsReport {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or_default()
    }
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "------ Metrics Report ------")?;
        writeln!(f, "Total execution time: {:.2}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "Throughput: {:.2} TPS", self.throughput)?;
        for (name, value) in &self.counters {
            writeln!(f, "{name}: {value}")?;
        }
        for (name, summary) in &self.latencies {
            writeln!(
                f,
                "{name}: n={} mean={:.2}ms min={:.2}ms max={:.2}ms",
                summary.count,
                summary.mean().as_secs_f64() * 1000.0,
                summary.min.as_secs_f64() * 1000.0,
                summary.max.as_secs_f64() * 1000.0,
            )?;
        }
        write!(f, "----------------------------")
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::Metrics;

    use super::{Collector, LatencySummary};

    #[test]
    fn counters() {
        let collector = Collector::new();
        collector.increment("block_committed");
        collector.increment("block_committed");
        collector.increment("proposal_sent");

        assert_eq!(collector.counter("block_committed"), 2);
        assert_eq!(collector.counter("proposal_sent"), 1);
        assert_eq!(collector.counter("unknown"), 0);

        let report = collector.report();
        assert_eq!(report.counter("block_committed"), 2);
    }

    #[test]
    fn latency_summary() {
        let collector = Collector::new();
        assert!(collector.latency("commit_latency").is_none());

        for ms in [30, 10, 20] {
            collector.record_latency("commit_latency", Duration::from_millis(ms));
        }

        let summary = collector.latency("commit_latency").unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min, Duration::from_millis(10));
        assert_eq!(summary.max, Duration::from_millis(30));
        assert_eq!(summary.mean(), Duration::from_millis(20));
    }

    #[test]
    fn mean_with_huge_sample_count() {
        let summary = LatencySummary {
            count: u64::from(u32::MAX) + 1,
            total: Duration::from_secs(1 << 32),
            min: Duration::from_secs(1),
            max: Duration::from_secs(1),
        };
        assert_eq!(summary.mean(), Duration::from_secs(1));
    }

    #[test]
    fn report_display_lists_everything() {
        let collector = Collector::new();
        collector.increment("transaction_committed");
        collector.record_latency("commit_latency", Duration::from_millis(5));

        let report = collector.report().to_string();
        assert!(report.contains("transaction_committed: 1"));
        assert!(report.contains("commit_latency: n=1"));
        assert!(report.contains("Throughput"));
    }
}
