use crate::error::{Result, WrangleError};
use crate::observability::metrics;
use crate::frame::{column_names, render_fields};
use polars::prelude::*;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Outcome of persisting a table.
#[derive(Debug, Clone, Serialize)]
pub struct PersistedTable {
    pub path: PathBuf,
    pub rows: usize,
    pub columns: usize,
    /// SHA-256 of the bytes written, hex encoded
    pub sha256: String,
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so readers
/// never observe a half-written file. Parent directories are created.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| WrangleError::Config(format!("'{}' is not a file path", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, bytes)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }
    debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
}

/// Render a frame as comma-separated text with a header row.
pub fn render_csv(df: &DataFrame) -> Result<Vec<u8>> {
    let fields = df
        .get_columns()
        .iter()
        .map(|c| render_fields(c.as_materialized_series()))
        .collect::<Result<Vec<_>>>()?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(column_names(df))?;
    for row in 0..df.height() {
        writer.write_record(fields.iter().map(|column| column[row].as_str()))?;
    }
    writer
        .into_inner()
        .map_err(|e| WrangleError::Io(e.into_error()))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist the frame as CSV, replacing any previous output at `path`.
#[instrument(skip(df), fields(path = %path.display()))]
pub fn write_csv(df: &DataFrame, path: &Path) -> Result<PersistedTable> {
    let bytes = render_csv(df)?;
    write_atomic(path, &bytes)?;

    let persisted = PersistedTable {
        path: path.to_path_buf(),
        rows: df.height(),
        columns: df.width(),
        sha256: sha256_hex(&bytes),
    };
    info!(
        rows = persisted.rows,
        sha256 = %persisted.sha256,
        "💾 Saved merged table"
    );
    metrics::persist::rows_written(persisted.rows);
    Ok(persisted)
}
