use crate::constants::{
    ARCHIVE_COLUMNS, ARCHIVE_TABLE, ID, RATING_DENOMINATOR, RATING_NUMERATOR, TWEET_ID,
};
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::ingestion::ingest_common::parse_delimited;
use polars::prelude::*;
use std::fs;
use std::path::Path;
use tracing::{info, instrument};

/// Declared column types; every other archive column, identifiers included, is text.
fn archive_types() -> Vec<(&'static str, DataType)> {
    vec![
        (TWEET_ID, DataType::String),
        (RATING_NUMERATOR, DataType::Int64),
        (RATING_DENOMINATOR, DataType::Int64),
    ]
}

/// Load the post archive. The `tweet_id` key is renamed to the shared `id`.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn read_archive(path: &Path) -> Result<DataFrame> {
    let bytes = fs::read(path)?;
    parse_archive(&bytes, &path.display().to_string())
}

pub fn parse_archive(bytes: &[u8], origin: &str) -> Result<DataFrame> {
    let mut df = parse_delimited(bytes, b',', &ARCHIVE_COLUMNS, &archive_types(), origin)?;
    df.rename(TWEET_ID, ID.into())?;

    info!("Loaded {} archive rows", df.height());
    metrics::sources::rows_read(ARCHIVE_TABLE, df.height());
    Ok(df)
}
