use crate::app::ports::HttpClientPort;
use crate::constants::{ID, IMG_NUM, PREDICTIONS_TABLE, PREDICTION_COLUMNS, TWEET_ID};
use crate::error::{Result, WrangleError};
use crate::observability::metrics;
use crate::pipeline::ingestion::ingest_common::{parse_delimited, parse_flags};
use crate::storage::write_atomic;
use polars::prelude::*;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument};

/// Download the image predictions, keep the raw bytes at `cache_path`, then parse
/// them as tab-separated values.
#[instrument(skip(http, cache_path), fields(cache = %cache_path.display()))]
pub async fn fetch_predictions(
    http: &dyn HttpClientPort,
    url: &str,
    cache_path: &Path,
) -> Result<DataFrame> {
    info!("📡 Fetching image predictions");
    let started = Instant::now();
    let response = http.get(url).await.map_err(|message| WrangleError::Network {
        url: url.to_string(),
        message,
    })?;
    if !response.is_success() {
        return Err(WrangleError::Network {
            url: url.to_string(),
            message: format!("unexpected HTTP status {}", response.status),
        });
    }
    metrics::sources::fetch_completed(started.elapsed().as_secs_f64(), response.bytes.len());
    info!(
        bytes = response.bytes.len(),
        content_type = %response.content_type,
        "✅ Downloaded image predictions"
    );

    write_atomic(cache_path, &response.bytes)?;
    parse_predictions(&response.bytes, &cache_path.display().to_string())
}

/// Re-read a previously downloaded predictions file.
#[instrument(skip_all, fields(cache = %cache_path.display()))]
pub fn read_cached_predictions(cache_path: &Path) -> Result<DataFrame> {
    let bytes = fs::read(cache_path)?;
    info!("Using cached image predictions");
    parse_predictions(&bytes, &cache_path.display().to_string())
}

const CONFIDENCE_COLUMNS: [&str; 3] = ["p1_conf", "p2_conf", "p3_conf"];
const DOG_FLAG_COLUMNS: [&str; 3] = ["p1_dog", "p2_dog", "p3_dog"];

/// Declared column types; the key and the breed labels stay text.
fn prediction_types() -> Vec<(&'static str, DataType)> {
    let mut types = vec![(TWEET_ID, DataType::String), (IMG_NUM, DataType::Int64)];
    types.extend(CONFIDENCE_COLUMNS.iter().map(|c| (*c, DataType::Float64)));
    types
}

pub fn parse_predictions(bytes: &[u8], origin: &str) -> Result<DataFrame> {
    let mut df = parse_delimited(bytes, b'\t', &PREDICTION_COLUMNS, &prediction_types(), origin)?;
    for column in DOG_FLAG_COLUMNS {
        df = parse_flags(&df, column, origin)?;
    }
    df.rename(TWEET_ID, ID.into())?;
    metrics::sources::rows_read(PREDICTIONS_TABLE, df.height());
    Ok(df)
}
