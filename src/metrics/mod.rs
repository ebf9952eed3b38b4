//! Pipeline counters, one submodule per phase.
//!
//! Counters go through the `metrics` facade. Without an installed recorder
//! they are no-ops, so library callers and tests pay nothing. A batch run
//! that wants them installs its own recorder before calling in.

pub mod extract;
pub mod load;

pub use extract::ExtractMetrics;
pub use load::LoadMetrics;

/// Metric name with the crate prefix and, for counters, the `_total` suffix.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("pudl_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("pudl_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

/// A phase's metric set.
pub trait PhaseMetrics {
    /// Describe every metric of the phase to the installed recorder.
    fn register_metrics();

    fn phase_name() -> &'static str;

    fn metrics_documentation() -> Vec<MetricDoc>;
}

#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

/// Register every phase with the installed recorder.
pub fn register_all_metrics() {
    ExtractMetrics::register_metrics();
    LoadMetrics::register_metrics();
}

/// Documentation for every metric the pipeline emits.
pub fn all_metrics_documentation() -> Vec<MetricDoc> {
    let mut docs = ExtractMetrics::metrics_documentation();
    docs.extend(LoadMetrics::metrics_documentation());
    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_follow_the_convention_and_are_unique() {
        let docs = all_metrics_documentation();
        let mut seen = HashSet::new();
        for doc in &docs {
            assert!(doc.name.starts_with("pudl_"), "{}", doc.name);
            if doc.metric_type == MetricType::Counter {
                assert!(doc.name.ends_with("_total"), "{}", doc.name);
            }
            assert!(seen.insert(doc.name), "duplicate metric {}", doc.name);
        }
        assert!(docs.iter().any(|d| d.name == "pudl_load_exclusions_total"));
    }

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        register_all_metrics();
        ExtractMetrics::record_partition_extracted(crate::tables::StagingTable::F1Fuel, 3);
        ExtractMetrics::record_partition_failed(crate::tables::StagingTable::F1Fuel);
        LoadMetrics::record_table_loaded(crate::tables::IntegratedTable::FuelFerc1, 3, 1);
    }
}
