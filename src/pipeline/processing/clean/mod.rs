//! Ordered cleaning rules.
//!
//! Each rule is a [`CleaningStep`] that borrows a frame and returns a new one; the
//! [`CleaningPipeline`] runs them in sequence and reports what every step removed.

pub mod corrections;
pub mod steps;

use polars::prelude::*;
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{error, info, instrument};

use crate::error::Result;
use crate::observability::metrics;

pub use corrections::RatingCorrections;
use steps::*;

/// A single cleaning rule.
pub trait CleaningStep: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce the cleaned frame; the input is left untouched.
    fn apply(&self, df: &DataFrame) -> Result<DataFrame>;
}

/// What one step did to the frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: &'static str,
    pub rows_before: usize,
    pub rows_after: usize,
    pub columns_after: usize,
}

impl StepReport {
    pub fn rows_dropped(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<28} {:>6} -> {:<6} ({} dropped, {} columns)",
            self.step,
            self.rows_before,
            self.rows_after,
            self.rows_dropped(),
            self.columns_after
        )
    }
}

#[derive(Debug, Clone)]
pub struct CleanOutput {
    pub frame: DataFrame,
    pub reports: Vec<StepReport>,
}

pub struct CleaningPipeline {
    steps: Vec<Box<dyn CleaningStep>>,
}

impl CleaningPipeline {
    pub fn new(steps: Vec<Box<dyn CleaningStep>>) -> Self {
        Self { steps }
    }

    /// The twelve archive rules, in the order they must run.
    pub fn for_archive(corrections: &RatingCorrections) -> Self {
        Self::new(vec![
            Box::new(DropMissingMedia),
            Box::new(DropReposts),
            Box::new(FillEngagementCounters),
            Box::new(ParseTimestamps),
            Box::new(ApplyNumeratorOverrides::new(
                corrections.numerator_overrides.clone(),
            )),
            Box::new(CoerceRatings),
            Box::new(BlankRatings::new(
                corrections.blank_ratings.iter().map(|b| b.id.clone()).collect(),
            )),
            Box::new(FixRatings::new(corrections.rating_fixes.clone())),
            Box::new(ExtractSourceLabel),
            Box::new(NormalizeIdentifiers::default()),
            Box::new(DropLowercaseNames),
            Box::new(CollapseDogStage),
        ])
    }

    pub fn for_predictions() -> Self {
        Self::new(vec![Box::new(NormalizeIdentifiers::default())])
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    #[instrument(skip_all, fields(rows = df.height(), steps = self.steps.len()))]
    pub fn run(&self, df: &DataFrame) -> Result<CleanOutput> {
        let mut current = df.clone();
        let mut reports = Vec::with_capacity(self.steps.len());

        for step in &self.steps {
            let started = Instant::now();
            let next = step.apply(&current).map_err(|e| {
                error!(step = step.name(), "Cleaning step failed: {}", e);
                e
            })?;
            let report = StepReport {
                step: step.name(),
                rows_before: current.height(),
                rows_after: next.height(),
                columns_after: next.width(),
            };
            info!(
                step = report.step,
                rows_before = report.rows_before,
                rows_after = report.rows_after,
                "🧹 {}",
                report
            );
            metrics::cleaning::step_completed(
                report.step,
                report.rows_dropped(),
                started.elapsed().as_secs_f64(),
            );
            reports.push(report);
            current = next;
        }

        Ok(CleanOutput {
            frame: current,
            reports,
        })
    }
}
