use crate::error::{Result, WrangleError};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Check delimited bytes record by record and return the header.
///
/// Every record must have as many fields as the header; a ragged row is a parse
/// error that names the offending line.
pub fn check_structure(bytes: &[u8], delimiter: u8, origin: &str) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| WrangleError::parse(origin, format!("unreadable header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();
    if header.iter().all(|h| h.trim().is_empty()) {
        return Err(WrangleError::parse(origin, "missing header row"));
    }

    let mut record = csv::ByteRecord::new();
    let mut rows = 0usize;
    loop {
        match reader.read_byte_record(&mut record) {
            Ok(true) => rows += 1,
            Ok(false) => break,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or_default();
                return Err(WrangleError::parse(origin, format!("line {}: {}", line, e)));
            }
        }
    }
    debug!(origin, rows, columns = header.len(), "checked delimited payload");
    Ok(header)
}

/// A fixed-schema source must carry all of its expected columns.
pub fn require_schema(header: &[String], expected: &[&str], origin: &str) -> Result<()> {
    let missing: Vec<&str> = expected
        .iter()
        .copied()
        .filter(|c| !header.iter().any(|h| h == c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(WrangleError::parse(
            origin,
            format!("missing expected columns: {}", missing.join(", ")),
        ))
    }
}

/// Parse a fixed-schema delimited payload into a frame.
///
/// Nothing is inferred: a column is text unless `types` names it, so identifiers
/// keep every digit and an empty payload still has its declared types.
pub fn parse_delimited(
    bytes: &[u8],
    delimiter: u8,
    expected: &[&str],
    types: &[(&str, DataType)],
    origin: &str,
) -> Result<DataFrame> {
    let header = check_structure(bytes, delimiter, origin)?;
    require_schema(&header, expected, origin)?;

    let mut overrides = Schema::default();
    for (name, dtype) in types {
        overrides.with_column((*name).into(), dtype.clone());
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_schema_overwrite(Some(Arc::new(overrides)))
        .with_parse_options(CsvParseOptions::default().with_separator(delimiter))
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()
        .map_err(|e| WrangleError::parse(origin, e.to_string()))?;
    debug!(origin, rows = df.height(), columns = df.width(), "parsed delimited payload");
    Ok(df)
}

/// Turn a `True`/`False` text column into booleans.
pub fn parse_flags(df: &DataFrame, column: &str, origin: &str) -> Result<DataFrame> {
    let flags = crate::frame::text_values(df, column)?
        .into_iter()
        .enumerate()
        .map(|(row, cell)| match cell.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some("True") => Ok(Some(true)),
            Some("False") => Ok(Some(false)),
            Some(other) => Err(WrangleError::parse(
                origin,
                format!("row {}: '{}' in '{}' is not True or False", row + 1, other, column),
            )),
        })
        .collect::<Result<Vec<_>>>()?;
    crate::frame::with_series(df, Series::new(column.into(), flags))
}
