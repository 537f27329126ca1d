//! Descriptive statistics and charts derived from the merged table.

pub mod charts;

use polars::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::constants::{DOG_STAGE, FAVORITE_COUNT, IMG_NUM, MASTER_TABLE, RETWEET_COUNT, SOURCE};
use crate::error::Result;
use crate::frame::{series, text_values};
use crate::pipeline::processing::quality_gate::{assess, summarize, NumericSummary};
use crate::storage::write_atomic;

pub const REPORT_FILE: &str = "report.json";
pub const STAGE_CHART_FILE: &str = "dog_stages.svg";
pub const SOURCE_CHART_FILE: &str = "sources.svg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub label: String,
    pub count: usize,
}

/// Occurrences of each non-null label, most frequent first; ties sort by label.
pub fn value_counts(df: &DataFrame, column: &str) -> Result<Vec<CategoryCount>> {
    let labels = series(df, column)?.cast(&DataType::String)?.drop_nulls();
    let counted = labels.value_counts(false, false, "count".into(), false)?;
    let label_col = text_values(&counted, column)?;
    let count_col = series(&counted, "count")?.cast(&DataType::UInt64)?;

    let mut counts: Vec<CategoryCount> = label_col
        .into_iter()
        .zip(count_col.u64()?)
        .filter_map(|(label, count)| {
            Some(CategoryCount {
                label: label?,
                count: count? as usize,
            })
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    Ok(counts)
}

/// Summary statistics of one numeric column; `None` when it holds no numbers.
pub fn describe(df: &DataFrame, column: &str) -> Result<Option<NumericSummary>> {
    summarize(column, series(df, column)?)
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub rows: usize,
    pub columns: usize,
    /// Posts per life stage; posts without a stage are counted in `unstaged`
    pub dog_stages: Vec<CategoryCount>,
    pub unstaged: usize,
    pub sources: Vec<CategoryCount>,
    pub favorite_count: Option<NumericSummary>,
    pub retweet_count: Option<NumericSummary>,
    pub img_num: Option<NumericSummary>,
    /// Every numeric column of the merged table
    pub numeric: Vec<NumericSummary>,
}

#[instrument(skip_all, fields(rows = df.height()))]
pub fn build_report(df: &DataFrame) -> Result<Report> {
    let (unstaged, dog_stages): (Vec<_>, Vec<_>) = value_counts(df, DOG_STAGE)?
        .into_iter()
        .partition(|c| c.label.is_empty());

    Ok(Report {
        rows: df.height(),
        columns: df.width(),
        dog_stages,
        unstaged: unstaged.iter().map(|c| c.count).sum(),
        sources: value_counts(df, SOURCE)?,
        favorite_count: describe(df, FAVORITE_COUNT)?,
        retweet_count: describe(df, RETWEET_COUNT)?,
        img_num: describe(df, IMG_NUM)?,
        numeric: assess(MASTER_TABLE, df)?.numeric,
    })
}

/// Where [`write_report`] put its artifacts.
#[derive(Debug, Clone, Serialize)]
pub struct ReportArtifacts {
    pub summary: PathBuf,
    pub charts: Vec<PathBuf>,
}

/// Write `report.json` and the two bar charts into `dir`.
#[instrument(skip(report), fields(dir = %dir.display()))]
pub fn write_report(report: &Report, dir: &Path) -> Result<ReportArtifacts> {
    let summary = dir.join(REPORT_FILE);
    let mut json = serde_json::to_vec_pretty(report)?;
    json.push(b'\n');
    write_atomic(&summary, &json)?;

    let stages = dir.join(STAGE_CHART_FILE);
    let svg = charts::bar_chart_svg("Number of dogs in each stage", "Dog stage", &report.dog_stages)?;
    write_atomic(&stages, svg.as_bytes())?;

    let sources = dir.join(SOURCE_CHART_FILE);
    let svg = charts::bar_chart_svg("Most common sources of posts", "Source", &report.sources)?;
    write_atomic(&sources, svg.as_bytes())?;

    info!("📊 Report written to {}", dir.display());
    Ok(ReportArtifacts {
        summary,
        charts: vec![stages, sources],
    })
}

fn top(counts: &[CategoryCount]) -> String {
    counts
        .first()
        .map_or_else(|| "-".to_string(), |c| format!("{} ({})", c.label, c.count))
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Merged table: {} rows x {} columns", self.rows, self.columns)?;
        writeln!(f, "Dog stages ({} posts without a stage):", self.unstaged)?;
        for c in &self.dog_stages {
            writeln!(f, "  {:<24} {:>6}", c.label, c.count)?;
        }
        writeln!(f, "Sources:")?;
        for c in &self.sources {
            writeln!(f, "  {:<24} {:>6}", c.label, c.count)?;
        }
        writeln!(f, "Most common stage: {}", top(&self.dog_stages))?;
        writeln!(f, "Most common source: {}", top(&self.sources))?;
        if let Some(s) = &self.retweet_count {
            writeln!(f, "Mean retweet count: {:.0}", s.mean)?;
        }
        if let Some(s) = &self.favorite_count {
            writeln!(f, "Mean favorite count: {:.0}", s.mean)?;
        }
        if let Some(s) = &self.img_num {
            writeln!(f, "Image number ranges from {} to {}", s.min, s.max)?;
        }
        Ok(())
    }
}
