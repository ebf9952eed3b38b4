//! Transform/load counters, labelled by integrated table.

use super::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::tables::{IntegratedTable, RegisteredTable};

pub struct LoadMetrics;

impl LoadMetrics {
    pub fn record_table_loaded(table: IntegratedTable, rows: u64, exclusions: usize) {
        ::metrics::counter!(phase_metric!(counter, "load", "tables"), "table" => table.name()).increment(1);
        ::metrics::counter!(phase_metric!(counter, "load", "rows"), "table" => table.name()).increment(rows);
        ::metrics::counter!(phase_metric!(counter, "load", "exclusions"), "table" => table.name())
            .increment(exclusions as u64);
    }
}

impl PhaseMetrics for LoadMetrics {
    fn register_metrics() {
        for doc in Self::metrics_documentation() {
            ::metrics::describe_counter!(doc.name, doc.help);
        }
    }

    fn phase_name() -> &'static str {
        "load"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "load", "tables"),
                metric_type: MetricType::Counter,
                help: "Integrated tables loaded",
                labels: vec!["table"],
            },
            MetricDoc {
                name: phase_metric!(counter, "load", "rows"),
                metric_type: MetricType::Counter,
                help: "Rows inserted into integrated tables",
                labels: vec!["table"],
            },
            MetricDoc {
                name: phase_metric!(counter, "load", "exclusions"),
                metric_type: MetricType::Counter,
                help: "Staging records excluded from integrated tables",
                labels: vec!["table"],
            },
        ]
    }
}
