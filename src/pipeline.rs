// Data processing pipeline: ingestion, processing, and the run orchestrator

pub mod ingestion;
pub mod processing;

use polars::prelude::DataFrame;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::app::ports::HttpClientPort;
use crate::config::Config;
use crate::constants::{ARCHIVE_TABLE, ENGAGEMENT_TABLE, ID, MASTER_TABLE, PREDICTIONS_TABLE};
use crate::error::{Result, WrangleError};
use crate::observability::metrics;
use crate::pipeline::ingestion::{
    fetch_predictions, read_archive, read_cached_predictions, read_engagement, EngagementLoad,
};
use crate::pipeline::processing::clean::steps::NormalizeIdentifiers;
use crate::pipeline::processing::clean::{CleaningPipeline, CleaningStep, RatingCorrections, StepReport};
use crate::pipeline::processing::merge::{inner_join, left_join};
use crate::pipeline::processing::quality_gate::{
    assess, audit_archive, duplicate_keys, log_issues, QualityIssue, TableAssessment,
};
use crate::report::{build_report, write_report, Report, ReportArtifacts};
use crate::storage::{write_csv, PersistedTable};

/// The three raw inputs, exactly as read.
#[derive(Debug, Clone)]
pub struct Gathered {
    pub archive: DataFrame,
    pub predictions: DataFrame,
    pub engagement: EngagementLoad,
}

impl Gathered {
    pub fn engagement_frame(&self) -> Result<DataFrame> {
        self.engagement.to_frame()
    }
}

/// Read-only findings about the gathered inputs.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub tables: Vec<TableAssessment>,
    pub issues: Vec<QualityIssue>,
    pub skipped_engagement_lines: usize,
}

#[derive(Debug, Clone)]
pub struct Transformed {
    pub master: DataFrame,
    pub archive_steps: Vec<StepReport>,
    pub prediction_steps: Vec<StepReport>,
}

/// Result of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub archive_rows: usize,
    pub prediction_rows: usize,
    pub engagement_records: usize,
    pub skipped_engagement_lines: usize,
    pub merged_rows: usize,
    pub steps: Vec<StepReport>,
    pub output: PersistedTable,
    pub report: Report,
    pub artifacts: ReportArtifacts,
    pub duration_secs: f64,
}

pub struct Pipeline {
    config: Config,
    http: Box<dyn HttpClientPort>,
    use_cache: bool,
}

impl Pipeline {
    pub fn new(config: Config, http: Box<dyn HttpClientPort>) -> Self {
        Self {
            config,
            http,
            use_cache: false,
        }
    }

    /// Re-read a previously downloaded predictions file instead of fetching it.
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    #[instrument(skip(self))]
    pub async fn gather(&self) -> Result<Gathered> {
        let sources = &self.config.sources;
        info!("📥 Gathering sources");

        let archive = read_archive(&sources.archive)?;
        let predictions = if self.use_cache && sources.predictions_cache.exists() {
            read_cached_predictions(&sources.predictions_cache)?
        } else {
            if self.use_cache {
                warn!(
                    "No cached predictions at {}; fetching instead",
                    sources.predictions_cache.display()
                );
            }
            fetch_predictions(
                self.http.as_ref(),
                &sources.predictions_url,
                &sources.predictions_cache,
            )
            .await?
        };
        let engagement = read_engagement(&sources.engagement)?;

        Ok(Gathered {
            archive,
            predictions,
            engagement,
        })
    }

    /// Profile all three tables and audit the archive. Nothing is modified.
    pub fn assess(gathered: &Gathered) -> Result<Assessment> {
        let tables = vec![
            assess(ARCHIVE_TABLE, &gathered.archive)?,
            assess(PREDICTIONS_TABLE, &gathered.predictions)?,
            assess(ENGAGEMENT_TABLE, &gathered.engagement_frame()?)?,
        ];
        let issues = audit_archive(&gathered.archive)?;
        log_issues(ARCHIVE_TABLE, &issues);
        Ok(Assessment {
            tables,
            issues,
            skipped_engagement_lines: gathered.engagement.skipped_count(),
        })
    }

    /// Attach engagement to the archive, clean both sides and merge them.
    ///
    /// Fails when the cleaned archive repeats an identifier, since every merged
    /// row must stand for one post.
    pub fn transform(gathered: &Gathered, corrections: &RatingCorrections) -> Result<Transformed> {
        let archive = NormalizeIdentifiers::default().apply(&gathered.archive)?;
        let with_metrics = left_join(&archive, &gathered.engagement_frame()?, ENGAGEMENT_TABLE, ID)?;

        let archive = CleaningPipeline::for_archive(corrections).run(&with_metrics)?;
        let predictions = CleaningPipeline::for_predictions().run(&gathered.predictions)?;

        let duplicates = duplicate_keys(&archive.frame, ID)?;
        if duplicates > 0 {
            return Err(WrangleError::Schema(format!(
                "{} duplicate post identifiers in the cleaned {}",
                duplicates, ARCHIVE_TABLE
            )));
        }

        let master = inner_join(&archive.frame, &predictions.frame, PREDICTIONS_TABLE, ID)?;
        info!(
            table = MASTER_TABLE,
            archive_rows = archive.frame.height(),
            prediction_rows = predictions.frame.height(),
            merged_rows = master.height(),
            "🔗 Merged cleaned tables"
        );

        Ok(Transformed {
            master,
            archive_steps: archive.reports,
            prediction_steps: predictions.reports,
        })
    }

    /// Gather, assess, clean, merge, persist and report. A failure in any stage
    /// before persisting leaves the previous output untouched.
    #[instrument(skip(self), fields(use_cache = self.use_cache))]
    pub async fn run(&self) -> Result<PipelineResult> {
        info!("🚀 Starting wrangling pipeline");
        let started = Instant::now();

        let corrections = RatingCorrections::load(&self.config.cleaning.corrections)?;
        info!(
            version = %corrections.version,
            entries = corrections.len(),
            "Loaded rating corrections"
        );

        let gathered = self.gather().await?;
        Self::assess(&gathered)?;
        let transformed = Self::transform(&gathered, &corrections)?;

        let output = write_csv(&transformed.master, &self.config.output.merged)?;
        let report = build_report(&transformed.master)?;
        let artifacts = write_report(&report, &self.config.output.report_dir)?;

        let duration_secs = started.elapsed().as_secs_f64();
        metrics::pipeline::run_completed(duration_secs);
        info!(duration_secs, "✅ Pipeline finished");

        Ok(PipelineResult {
            archive_rows: gathered.archive.height(),
            prediction_rows: gathered.predictions.height(),
            engagement_records: gathered.engagement.records.len(),
            skipped_engagement_lines: gathered.engagement.skipped_count(),
            merged_rows: transformed.master.height(),
            steps: transformed
                .archive_steps
                .into_iter()
                .chain(transformed.prediction_steps)
                .collect(),
            output,
            report,
            artifacts,
            duration_secs,
        })
    }
}
