//! Raw extraction counters, labelled by staging table.

use super::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::tables::{RegisteredTable, StagingTable};

pub struct ExtractMetrics;

impl ExtractMetrics {
    pub fn record_partition_extracted(table: StagingTable, rows: u64) {
        ::metrics::counter!(phase_metric!(counter, "extract", "partitions_success"), "table" => table.name())
            .increment(1);
        ::metrics::counter!(phase_metric!(counter, "extract", "rows"), "table" => table.name()).increment(rows);
        ::metrics::histogram!(phase_metric!(histogram, "extract", "partition_rows"), "table" => table.name())
            .record(rows as f64);
    }

    pub fn record_partition_failed(table: StagingTable) {
        ::metrics::counter!(phase_metric!(counter, "extract", "partitions_error"), "table" => table.name())
            .increment(1);
    }
}

impl PhaseMetrics for ExtractMetrics {
    fn register_metrics() {
        for doc in Self::metrics_documentation() {
            match doc.metric_type {
                MetricType::Counter => ::metrics::describe_counter!(doc.name, doc.help),
                MetricType::Histogram => ::metrics::describe_histogram!(doc.name, doc.help),
            }
        }
    }

    fn phase_name() -> &'static str {
        "extract"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "extract", "partitions_success"),
                metric_type: MetricType::Counter,
                help: "Partitions extracted into staging",
                labels: vec!["table"],
            },
            MetricDoc {
                name: phase_metric!(counter, "extract", "partitions_error"),
                metric_type: MetricType::Counter,
                help: "Partitions that were missing or malformed",
                labels: vec!["table"],
            },
            MetricDoc {
                name: phase_metric!(counter, "extract", "rows"),
                metric_type: MetricType::Counter,
                help: "Rows inserted into staging tables",
                labels: vec!["table"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "extract", "partition_rows"),
                metric_type: MetricType::Histogram,
                help: "Rows per extracted partition",
                labels: vec!["table"],
            },
        ]
    }
}
