//! The Prometheus metrics registry: `polls_total`, `swaps_total`,
//! `errors_total{type}`, `bundle_load_seconds`, `watcher_last_success_unix`,
//! `watcher_stale`.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
pub enum ErrorType {
    Ssm,
    Load,
    Validation,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, EncodeLabelSet)]
pub struct ErrorLabels {
    pub r#type: ErrorType,
}

pub struct Metrics {
    pub registry: Registry,
    pub polls_total: Counter,
    pub swaps_total: Counter,
    pub errors_total: Family<ErrorLabels, Counter>,
    pub bundle_load_seconds: Histogram,
    pub watcher_last_success_unix: Gauge,
    pub watcher_stale: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("content_node");

        let polls_total = Counter::default();
        registry.register("polls", "Total watcher poll cycles", polls_total.clone());

        let swaps_total = Counter::default();
        registry.register("swaps", "Total successful snapshot publications", swaps_total.clone());

        let errors_total = Family::<ErrorLabels, Counter>::default();
        registry.register("errors", "Total watcher errors by kind", errors_total.clone());

        let bundle_load_seconds =
            Histogram::new(prometheus_client::metrics::histogram::exponential_buckets(0.01, 2.0, 12));
        registry.register(
            "bundle_load_seconds",
            "Time to fetch, verify, and extract a bundle",
            bundle_load_seconds.clone(),
        );

        let watcher_last_success_unix = Gauge::default();
        registry.register(
            "watcher_last_success_unix",
            "Unix timestamp of the last successful pointer read",
            watcher_last_success_unix.clone(),
        );

        let watcher_stale = Gauge::default();
        registry.register("watcher_stale", "1 if the watcher is stale, 0 otherwise", watcher_stale.clone());

        Self {
            registry,
            polls_total,
            swaps_total,
            errors_total,
            bundle_load_seconds,
            watcher_last_success_unix,
            watcher_stale,
        }
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
