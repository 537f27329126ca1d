use crate::constants::{ENGAGEMENT_TABLE, FAVORITE_COUNT, ID, RETWEET_COUNT};
use crate::error::Result;
use crate::observability::metrics;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Per-post counters pulled from the platform API, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub id: i64,
    pub favorite_count: i64,
    pub retweet_count: i64,
}

/// Why a line was left out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// Not valid JSON at all
    InvalidJson(String),
    /// Valid JSON that lacks a required field or has the wrong type
    MissingField(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Parsed(EngagementMetrics),
    Skipped { line: usize, reason: SkipReason },
}

/// Everything read from the engagement file, skipped lines included.
#[derive(Debug, Clone, Default)]
pub struct EngagementLoad {
    pub records: Vec<EngagementMetrics>,
    pub skipped: Vec<(usize, SkipReason)>,
}

impl EngagementLoad {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// One row per parsed record. Identifiers are written as decimal text so they
    /// join against the text keys of the other sources.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let ids: Vec<String> = self.records.iter().map(|r| r.id.to_string()).collect();
        let favorites: Vec<i64> = self.records.iter().map(|r| r.favorite_count).collect();
        let retweets: Vec<i64> = self.records.iter().map(|r| r.retweet_count).collect();
        Ok(df!(
            ID => ids,
            FAVORITE_COUNT => favorites,
            RETWEET_COUNT => retweets
        )?)
    }
}

/// Parse one line. `line` is 1-based and only used for reporting.
pub fn parse_line(line: usize, text: &str) -> LineOutcome {
    match serde_json::from_str::<EngagementMetrics>(text) {
        Ok(metrics) => LineOutcome::Parsed(metrics),
        Err(e) => {
            let reason = if e.is_data() {
                SkipReason::MissingField(e.to_string())
            } else {
                SkipReason::InvalidJson(e.to_string())
            };
            LineOutcome::Skipped { line, reason }
        }
    }
}

/// Best-effort read: unparseable lines are skipped and counted; I/O errors abort.
pub fn parse_engagement<R: BufRead>(reader: R) -> Result<EngagementLoad> {
    let mut load = EngagementLoad::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(idx + 1, &line) {
            LineOutcome::Parsed(metrics) => load.records.push(metrics),
            LineOutcome::Skipped { line, reason } => {
                debug!(line, ?reason, "Skipping engagement line");
                load.skipped.push((line, reason));
            }
        }
    }
    Ok(load)
}

#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_engagement(path: &Path) -> Result<EngagementLoad> {
    let file = File::open(path)?;
    let load = parse_engagement(BufReader::new(file))?;

    info!(
        "Loaded {} engagement records ({} lines skipped)",
        load.records.len(),
        load.skipped_count()
    );
    if load.skipped_count() > 0 {
        warn!("{} engagement lines could not be parsed", load.skipped_count());
    }
    metrics::sources::rows_read(ENGAGEMENT_TABLE, load.records.len());
    metrics::sources::lines_skipped(load.skipped_count());
    Ok(load)
}
