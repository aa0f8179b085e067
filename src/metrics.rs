use crate::migration::Direction;
use once_cell::sync::Lazy;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};
use opentelemetry_prometheus::PrometheusExporter;
use std::time::Duration;

pub static METRICS: Lazy<TidemarkMetrics> = Lazy::new(TidemarkMetrics::init);

pub struct TidemarkMetrics {
    /// `None` when the exporter couldn't be built; instruments still work
    pub exporter: Option<PrometheusExporter>,
    pub versions_executed: Counter<u64>,
    pub versions_marked: Counter<u64>,
    pub statement_duration: Histogram<f64>,
}

impl TidemarkMetrics {
    pub fn init() -> Self {
        let exporter = match opentelemetry_prometheus::exporter().build() {
            Ok(exporter) => Some(exporter),
            Err(e) => {
                log::warn!("Prometheus exporter unavailable: {e}");
                None
            }
        };
        let meter = global::meter("tidemark");

        let versions_executed = meter
            .u64_counter("tidemark_versions_executed_total")
            .with_description("Migration versions executed, by direction")
            .build();

        let versions_marked = meter
            .u64_counter("tidemark_versions_marked_total")
            .with_description("Versions added to or deleted from the version table by hand")
            .build();

        let statement_duration = meter
            .f64_histogram("tidemark_statement_duration_seconds")
            .with_description("Duration of migration statements")
            .build();

        Self {
            exporter,
            versions_executed,
            versions_marked,
            statement_duration,
        }
    }

    pub fn record_version(&self, direction: Direction) {
        self.versions_executed
            .add(1, &[KeyValue::new("direction", direction.to_string())]);
    }

    pub fn record_marks(&self, count: u64, applied: bool) {
        let action = if applied { "add" } else { "delete" };
        self.versions_marked
            .add(count, &[KeyValue::new("action", action)]);
    }

    pub fn record_statement(&self, elapsed: Duration) {
        self.statement_duration.record(elapsed.as_secs_f64(), &[]);
    }
}
