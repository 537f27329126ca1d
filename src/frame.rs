//! Helpers over polars frames shared by every pipeline stage.
//!
//! Stages never mutate a frame in place: each helper borrows the input and
//! returns a new frame. Cloning a `DataFrame` only bumps reference counts.

use chrono::DateTime;
use polars::prelude::*;

use crate::error::{Result, WrangleError};

/// Output format for date-time cells.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// Parsed timestamps are stored as UTC milliseconds.
pub fn datetime_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// Small set of labels, such as the post source or the dog stage.
pub fn category_dtype() -> DataType {
    DataType::Categorical(None, Default::default())
}

pub fn series<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Series> {
    df.column(name)
        .map(Column::as_materialized_series)
        .map_err(|_| WrangleError::missing_column(name))
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect()
}

pub fn require_columns(df: &DataFrame, names: &[&str]) -> Result<()> {
    names.iter().try_for_each(|n| series(df, n).map(|_| ()))
}

/// Cells of a column as text; numbers are rendered, nulls stay `None`.
pub fn text_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let text = series(df, name)?.cast(&DataType::String)?;
    Ok(text
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Cells of a numeric column as `f64`. Text columns are rejected rather than
/// silently nulled.
pub fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = series(df, name)?;
    if !column.dtype().is_primitive_numeric() {
        return Err(WrangleError::Schema(format!(
            "column '{}' is {}, expected a number",
            name,
            dtype_label(column.dtype())
        )));
    }
    let floats = column.cast(&DataType::Float64)?;
    Ok(floats.f64()?.into_iter().collect())
}

/// Row index of the first row whose `key` cell reads `id`.
pub fn find_row(df: &DataFrame, key: &str, id: &str) -> Result<Option<usize>> {
    Ok(text_values(df, key)?
        .iter()
        .position(|v| v.as_deref().map(str::trim) == Some(id)))
}

/// Keep the rows whose mask entry is `true`.
pub fn filter_rows(df: &DataFrame, mask: &[bool]) -> Result<DataFrame> {
    let mask = BooleanChunked::from_slice("mask".into(), mask);
    Ok(df.filter(&mask)?)
}

/// Replace the column with the same name, or append it.
pub fn with_series(df: &DataFrame, column: Series) -> Result<DataFrame> {
    let mut out = df.clone();
    out.with_column(column)?;
    Ok(out)
}

pub fn drop_columns(df: &DataFrame, names: &[&str]) -> Result<DataFrame> {
    require_columns(df, names)?;
    let mut out = df.clone();
    for name in names {
        out = out.drop(name)?;
    }
    Ok(out)
}

/// Dtype names as the assessment prints them.
pub fn dtype_label(dtype: &DataType) -> String {
    match dtype {
        DataType::Int64 => "int64".to_string(),
        DataType::Float64 => "float64".to_string(),
        DataType::Boolean => "bool".to_string(),
        DataType::String => "object".to_string(),
        DataType::Categorical(_, _) => "category".to_string(),
        DataType::Datetime(_, _) => "datetime64[UTC]".to_string(),
        other => other.to_string(),
    }
}

/// Render every cell of `column` for a delimited file; nulls become empty fields.
pub fn render_fields(column: &Series) -> Result<Vec<String>> {
    let fields: Vec<String> = match column.dtype() {
        DataType::Datetime(_, _) => {
            let millis = column.cast(&datetime_dtype())?.cast(&DataType::Int64)?;
            millis
                .i64()?
                .into_iter()
                .map(|v| {
                    v.and_then(DateTime::from_timestamp_millis)
                        .map(|dt| dt.format(DATETIME_FORMAT).to_string())
                        .unwrap_or_default()
                })
                .collect()
        }
        DataType::Boolean => column
            .bool()?
            .into_iter()
            .map(|v| match v {
                Some(true) => "True".to_string(),
                Some(false) => "False".to_string(),
                None => String::new(),
            })
            .collect(),
        DataType::Float32 | DataType::Float64 => column
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map(|f| f.to_string()).unwrap_or_default())
            .collect(),
        _ => column
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect(),
    };
    Ok(fields)
}
