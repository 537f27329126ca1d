//! Key joins between frames.
//!
//! Keys are compared exactly, so both sides must carry the key with the same
//! dtype. Non-key columns that exist on both sides keep the left name, the right
//! copy gets a `_<right table name>` suffix.

use polars::prelude::*;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::error::{Result, WrangleError};
use crate::frame::{dtype_label, filter_rows, has_column, series, text_values};
use crate::observability::metrics;

const LEFT_ROW: &str = "__left_row";

/// First row for each non-null key; later duplicates are dropped.
fn first_per_key(right: &DataFrame, right_name: &str, key: &str) -> Result<DataFrame> {
    let mut seen = HashSet::new();
    let mask: Vec<bool> = text_values(right, key)?
        .into_iter()
        .map(|k| k.is_some_and(|k| seen.insert(k)))
        .collect();
    let duplicates = mask.iter().filter(|keep| !**keep).count()
        - series(right, key)?.null_count();
    if duplicates > 0 {
        warn!(
            table = right_name,
            key, duplicates, "Duplicate join keys on the right; first occurrence wins"
        );
    }
    filter_rows(right, &mask)
}

fn check_keys(left: &DataFrame, right: &DataFrame, right_name: &str, key: &str) -> Result<()> {
    let l = series(left, key)?.dtype();
    let r = series(right, key)?.dtype();
    if l != r {
        return Err(WrangleError::Schema(format!(
            "cannot join '{}' ({}) on '{}' ({}): key types differ",
            right_name,
            dtype_label(r),
            key,
            dtype_label(l)
        )));
    }
    Ok(())
}

/// Rename right-side columns that collide with the left.
fn suffix_collisions(
    left: &DataFrame,
    mut right: DataFrame,
    right_name: &str,
    key: &str,
) -> Result<DataFrame> {
    let colliding: Vec<String> = right
        .get_column_names()
        .into_iter()
        .filter(|n| n.as_str() != key && has_column(left, n))
        .map(|n| n.to_string())
        .collect();
    for name in colliding {
        let renamed = format!("{}_{}", name, right_name);
        if has_column(left, &renamed) || has_column(&right, &renamed) {
            return Err(WrangleError::Schema(format!(
                "column '{}' from '{}' collides even after renaming",
                name, right_name
            )));
        }
        right.rename(&name, renamed.into())?;
    }
    Ok(right)
}

fn join(
    left: &DataFrame,
    right: &DataFrame,
    right_name: &str,
    key: &str,
    how: JoinType,
) -> Result<DataFrame> {
    check_keys(left, right, right_name, key)?;
    let right = first_per_key(right, right_name, key)?;
    let right = suffix_collisions(left, right, right_name, key)?;

    let joined = left
        .with_row_index(LEFT_ROW.into(), None)?
        .lazy()
        .join(right.lazy(), [col(key)], [col(key)], JoinArgs::new(how))
        .collect()?
        .sort([LEFT_ROW], SortMultipleOptions::default())?
        .drop(LEFT_ROW)?;
    Ok(joined)
}

/// Every left row, with the matching right row's columns or nulls.
pub fn left_join(
    left: &DataFrame,
    right: &DataFrame,
    right_name: &str,
    key: &str,
) -> Result<DataFrame> {
    let joined = join(left, right, right_name, key, JoinType::Left)?;
    debug!(right = right_name, rows = joined.height(), "Left join complete");
    metrics::merge::rows_joined("left", joined.height());
    Ok(joined)
}

/// Rows whose key is present on both sides, in left order.
pub fn inner_join(
    left: &DataFrame,
    right: &DataFrame,
    right_name: &str,
    key: &str,
) -> Result<DataFrame> {
    let joined = join(left, right, right_name, key, JoinType::Inner)?;
    debug!(right = right_name, matched = joined.height(), "Inner join complete");
    metrics::merge::rows_joined("inner", joined.height());
    Ok(joined)
}
