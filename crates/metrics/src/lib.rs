//! Metrics contract shared by consensus, network and the replica shell.
//!
//! Producers emit named counter increments and latency samples into a
//! [`Metrics`] sink. Sinks are passive: nothing recorded here feeds back
//! into protocol decisions.

mod collector;

use std::sync::Arc;
use std::time::Duration;

pub use collector::{Collector, LatencySummary, MetricsReport};

pub trait Metrics: Send + Sync + 'static {
    fn increment(&self, name: &'static str);

    fn record_latency(&self, name: &'static str, latency: Duration);
}

pub type SharedMetrics = Arc<dyn Metrics>;

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn increment(&self, _: &'static str) {}

    fn record_latency(&self, _: &'static str, _: Duration) {}
}

pub fn noop() -> SharedMetrics {
    Arc::new(NoopMetrics)
}
