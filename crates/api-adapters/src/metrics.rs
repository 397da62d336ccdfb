//! Prometheus counters for sync passes, exposed on `/metrics`.

use std::fmt;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

pub const CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum SyncKind {
    Head,
    Tail,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Ok,
    Cancelled,
    Rejected,
    Error,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PassLabels {
    pub kind: SyncKind,
    pub outcome: Outcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KindLabels {
    pub kind: SyncKind,
}

pub struct Metrics {
    registry: Registry,
    passes: Family<PassLabels, Counter>,
    inserted: Family<KindLabels, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("statuslog");
        let passes = Family::<PassLabels, Counter>::default();
        let inserted = Family::<KindLabels, Counter>::default();
        registry.register("sync_passes", "Sync passes by direction and outcome", passes.clone());
        registry.register("posts_inserted", "Posts newly stored by sync", inserted.clone());
        Self {
            registry,
            passes,
            inserted,
        }
    }

    pub fn record_pass(&self, kind: SyncKind, outcome: Outcome) {
        self.passes.get_or_create(&PassLabels { kind, outcome }).inc();
    }

    pub fn record_inserted(&self, kind: SyncKind, count: u64) {
        self.inserted.get_or_create(&KindLabels { kind }).inc_by(count);
    }

    /// OpenMetrics text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
