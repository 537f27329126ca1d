//! Metrics for the wrangling pipeline.
//!
//! Stages record through the `metrics` facade; [`init`] installs a Prometheus
//! recorder so a run can dump a text snapshot next to its report.

use std::fmt;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Every metric name used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Sources metrics
    SourcesRowsRead,
    SourcesLinesSkipped,
    SourcesFetchDuration,
    SourcesPayloadBytes,

    // Cleaning metrics
    CleaningRowsDropped,
    CleaningStepDuration,

    // Merge metrics
    MergeRowsJoined,

    // Persist metrics
    PersistRowsWritten,

    // Pipeline metrics
    PipelineRuns,
    PipelineDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SourcesRowsRead => "dogwrangle_sources_rows_read_total",
            MetricName::SourcesLinesSkipped => "dogwrangle_sources_lines_skipped_total",
            MetricName::SourcesFetchDuration => "dogwrangle_sources_fetch_duration_seconds",
            MetricName::SourcesPayloadBytes => "dogwrangle_sources_payload_bytes",
            MetricName::CleaningRowsDropped => "dogwrangle_cleaning_rows_dropped_total",
            MetricName::CleaningStepDuration => "dogwrangle_cleaning_step_duration_seconds",
            MetricName::MergeRowsJoined => "dogwrangle_merge_rows_joined_total",
            MetricName::PersistRowsWritten => "dogwrangle_persist_rows_written_total",
            MetricName::PipelineRuns => "dogwrangle_pipeline_runs_total",
            MetricName::PipelineDuration => "dogwrangle_pipeline_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus recorder. Call once, from the binary.
pub fn init() -> Result<PrometheusHandle, String> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    info!("Metrics recorder installed");
    Ok(handle)
}

pub mod sources {
    use super::MetricName;

    pub fn rows_read(table: &str, rows: usize) {
        ::metrics::counter!(MetricName::SourcesRowsRead.as_str(), "table" => table.to_string())
            .increment(rows as u64);
    }

    pub fn lines_skipped(count: usize) {
        ::metrics::counter!(MetricName::SourcesLinesSkipped.as_str()).increment(count as u64);
    }

    pub fn fetch_completed(duration_secs: f64, bytes: usize) {
        ::metrics::histogram!(MetricName::SourcesFetchDuration.as_str()).record(duration_secs);
        ::metrics::histogram!(MetricName::SourcesPayloadBytes.as_str()).record(bytes as f64);
    }
}

pub mod cleaning {
    use super::MetricName;

    pub fn step_completed(step: &'static str, rows_dropped: usize, duration_secs: f64) {
        ::metrics::counter!(MetricName::CleaningRowsDropped.as_str(), "step" => step)
            .increment(rows_dropped as u64);
        ::metrics::histogram!(MetricName::CleaningStepDuration.as_str(), "step" => step)
            .record(duration_secs);
    }
}

pub mod merge {
    use super::MetricName;

    pub fn rows_joined(kind: &'static str, rows: usize) {
        ::metrics::counter!(MetricName::MergeRowsJoined.as_str(), "kind" => kind)
            .increment(rows as u64);
    }
}

pub mod persist {
    use super::MetricName;

    pub fn rows_written(rows: usize) {
        ::metrics::counter!(MetricName::PersistRowsWritten.as_str()).increment(rows as u64);
    }
}

pub mod pipeline {
    use super::MetricName;

    pub fn run_completed(duration_secs: f64) {
        ::metrics::counter!(MetricName::PipelineRuns.as_str()).increment(1);
        ::metrics::histogram!(MetricName::PipelineDuration.as_str()).record(duration_secs);
    }
}
