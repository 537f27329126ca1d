use once_cell::sync::Lazy;
use regex::Regex;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

use crate::constants::{
    EXPANDED_URLS, ID, IN_REPLY_TO_STATUS_ID, NAME, RATING_DENOMINATOR, RETWEETED_STATUS_ID,
    SOURCE, STAGE_COLUMNS, TEXT,
};
use crate::error::Result;
use crate::pipeline::processing::clean::steps::{is_lowercase_name, is_stage_tag};
use crate::frame::{dtype_label, series, text_values};

static DECIMAL_RATING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.\d*/\d+").expect("decimal rating pattern must compile"));

/// Per-column completeness and type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: String,
    pub non_null: usize,
    pub nulls: usize,
}

/// Descriptive statistics for a numeric column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; undefined for a single value
    pub std: Option<f64>,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

/// Read-only snapshot of a table's shape and contents
#[derive(Debug, Clone, Serialize)]
pub struct TableAssessment {
    pub table: String,
    pub rows: usize,
    pub columns: Vec<ColumnProfile>,
    pub numeric: Vec<NumericSummary>,
}

/// Types of quality issues found in the archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QualityIssueType {
    /// Missing required data
    MissingData,
    /// Rows that describe something other than an original post
    OutOfScope,
    /// Invalid format or structure
    InvalidFormat,
    /// Suspicious or anomalous values
    SuspiciousValue,
    /// One variable spread over several columns, or several values in one cell
    Untidy,
    /// Duplicate detection concerns
    DuplicationConcern,
}

/// Severity levels for quality issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum QualitySeverity {
    /// Worth knowing, handled downstream
    Info,
    /// Notable issue the cleaning rules fix
    Warning,
    /// Breaks an invariant of the merged table; the run refuses to merge
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityIssue {
    pub issue_type: QualityIssueType,
    pub severity: QualitySeverity,
    /// Human-readable description of the issue
    pub description: String,
    /// Column that triggered this issue
    pub column: Option<String>,
    pub affected_rows: usize,
}

/// Profile every column and summarize the numeric ones.
pub fn assess(name: &str, df: &DataFrame) -> Result<TableAssessment> {
    let columns = df
        .get_columns()
        .iter()
        .map(|c| ColumnProfile {
            name: c.name().to_string(),
            dtype: dtype_label(c.dtype()),
            non_null: c.len() - c.null_count(),
            nulls: c.null_count(),
        })
        .collect();

    let mut numeric = Vec::new();
    for column in df.get_columns() {
        if let Some(summary) = summarize(column.name(), column.as_materialized_series())? {
            numeric.push(summary);
        }
    }

    Ok(TableAssessment {
        table: name.to_string(),
        rows: df.height(),
        columns,
        numeric,
    })
}

/// Summary statistics; `None` for a non-numeric column or one without values.
pub fn summarize(column: &str, values: &Series) -> Result<Option<NumericSummary>> {
    if !values.dtype().is_primitive_numeric() {
        return Ok(None);
    }
    let floats = values.cast(&DataType::Float64)?.drop_nulls();
    let ca = floats.f64()?;
    let count = ca.len();
    if count == 0 {
        return Ok(None);
    }
    let quantile = |q: f64| -> Result<f64> {
        Ok(ca
            .quantile(q, QuantileMethod::Linear)?
            .unwrap_or(f64::NAN))
    };

    Ok(Some(NumericSummary {
        column: column.to_string(),
        count,
        mean: ca.mean().unwrap_or(f64::NAN),
        std: if count > 1 { ca.std(1) } else { None },
        min: ca.min().unwrap_or(f64::NAN),
        q25: quantile(0.25)?,
        median: quantile(0.5)?,
        q75: quantile(0.75)?,
        max: ca.max().unwrap_or(f64::NAN),
    }))
}

/// Archive-specific findings: the problems the cleaning rules exist to fix.
pub fn audit_archive(df: &DataFrame) -> Result<Vec<QualityIssue>> {
    let count = |column: &str, pred: &dyn Fn(&str) -> bool| -> Result<usize> {
        Ok(text_values(df, column)?
            .iter()
            .filter(|v| v.as_deref().is_some_and(pred))
            .count())
    };
    let present = |column: &str| -> Result<usize> {
        let s = series(df, column)?;
        Ok(s.len() - s.null_count())
    };

    let mut issues = Vec::new();
    let mut push = |issue_type, severity, column: &str, affected_rows: usize, description: &str| {
        if affected_rows > 0 {
            issues.push(QualityIssue {
                issue_type,
                severity,
                description: description.to_string(),
                column: Some(column.to_string()),
                affected_rows,
            });
        }
    };

    push(
        QualityIssueType::MissingData,
        QualitySeverity::Warning,
        EXPANDED_URLS,
        df.height() - count(EXPANDED_URLS, &|v| !v.trim().is_empty())?,
        "posts without a media link",
    );
    push(
        QualityIssueType::OutOfScope,
        QualitySeverity::Warning,
        RETWEETED_STATUS_ID,
        present(RETWEETED_STATUS_ID)?,
        "reposts of other posts",
    );
    push(
        QualityIssueType::OutOfScope,
        QualitySeverity::Info,
        IN_REPLY_TO_STATUS_ID,
        present(IN_REPLY_TO_STATUS_ID)?,
        "replies to other posts",
    );
    push(
        QualityIssueType::InvalidFormat,
        QualitySeverity::Warning,
        TEXT,
        count(TEXT, &|t| DECIMAL_RATING.is_match(t))?,
        "decimal ratings in the text that the numerator column truncates",
    );
    push(
        QualityIssueType::SuspiciousValue,
        QualitySeverity::Info,
        RATING_DENOMINATOR,
        count(RATING_DENOMINATOR, &|v| v.trim().parse::<f64>().is_ok_and(|d| d != 10.0))?,
        "rating denominators other than 10",
    );
    push(
        QualityIssueType::SuspiciousValue,
        QualitySeverity::Warning,
        NAME,
        count(NAME, &is_lowercase_name)?,
        "lowercase words captured as dog names",
    );
    push(
        QualityIssueType::InvalidFormat,
        QualitySeverity::Info,
        SOURCE,
        count(SOURCE, &|s| s.trim_start().starts_with("<a"))?,
        "client markup instead of a plain source label",
    );

    let stages = STAGE_COLUMNS
        .iter()
        .map(|name| text_values(df, name))
        .collect::<Result<Vec<_>>>()?;
    let multi_stage = (0..df.height())
        .filter(|&row| {
            stages
                .iter()
                .filter(|cells| is_stage_tag(cells[row].as_deref()))
                .count()
                > 1
        })
        .count();
    push(
        QualityIssueType::Untidy,
        QualitySeverity::Info,
        "doggo/floofer/pupper/puppo",
        multi_stage,
        "life stage spread over four columns; some posts carry several stages",
    );

    push(
        QualityIssueType::DuplicationConcern,
        QualitySeverity::Error,
        ID,
        duplicate_keys(df, ID)?,
        "duplicate post identifiers",
    );

    Ok(issues)
}

/// Rows whose non-null `key` already appeared on an earlier row.
pub fn duplicate_keys(df: &DataFrame, key: &str) -> Result<usize> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for id in text_values(df, key)?.into_iter().flatten() {
        *seen.entry(id).or_default() += 1;
    }
    Ok(seen.values().filter(|&&n| n > 1).map(|n| n - 1).sum())
}

/// Log each finding at a level matching its severity.
pub fn log_issues(table: &str, issues: &[QualityIssue]) {
    if issues.is_empty() {
        info!(table, "✅ No quality issues found");
        return;
    }
    for issue in issues {
        let column = issue.column.as_deref().unwrap_or("-");
        match issue.severity {
            QualitySeverity::Info => info!(
                table,
                column,
                rows = issue.affected_rows,
                "{:?}: {}",
                issue.issue_type,
                issue.description
            ),
            QualitySeverity::Warning | QualitySeverity::Error => warn!(
                table,
                column,
                rows = issue.affected_rows,
                severity = ?issue.severity,
                "{:?}: {}",
                issue.issue_type,
                issue.description
            ),
        }
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "NaN".to_string(), |v| format!("{:.3}", v))
}

impl fmt::Display for TableAssessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} rows x {} columns",
            self.table,
            self.rows,
            self.columns.len()
        )?;
        writeln!(f, "  {:<28} {:<16} {:>9} {:>7}", "column", "dtype", "non-null", "nulls")?;
        for c in &self.columns {
            writeln!(
                f,
                "  {:<28} {:<16} {:>9} {:>7}",
                c.name,
                c.dtype,
                c.non_null,
                c.nulls
            )?;
        }
        if !self.numeric.is_empty() {
            writeln!(
                f,
                "  {:<28} {:>7} {:>14} {:>14} {:>14} {:>14} {:>14} {:>14} {:>14}",
                "numeric", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
            )?;
            for s in &self.numeric {
                writeln!(
                    f,
                    "  {:<28} {:>7} {:>14.3} {:>14} {:>14.3} {:>14.3} {:>14.3} {:>14.3} {:>14.3}",
                    s.column,
                    s.count,
                    s.mean,
                    fmt_opt(s.std),
                    s.min,
                    s.q25,
                    s.median,
                    s.q75,
                    s.max
                )?;
            }
        }
        Ok(())
    }
}
