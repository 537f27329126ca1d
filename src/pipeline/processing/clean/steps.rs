use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use tracing::{debug, warn};

use super::corrections::{NumeratorOverride, RatingFix};
use super::CleaningStep;
use crate::constants::{
    DOG_STAGE, EXPANDED_URLS, FAVORITE_COUNT, ID, NAME, NONE_PLACEHOLDER, RATING_DENOMINATOR,
    RATING_NUMERATOR, REPOST_COLUMNS, RETWEETED_STATUS_ID, RETWEET_COUNT, SOURCE,
    STAGE_COLUMNS, STAGE_SEPARATOR, TIMESTAMP,
};
use crate::error::{Result, WrangleError};
use crate::frame::{
    category_dtype, datetime_dtype, drop_columns, dtype_label, filter_rows, find_row,
    float_values, series, text_values, with_series,
};

static SOURCE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^<a.+>(.+)</a>$").expect("source label pattern must compile")
});

const ARCHIVE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Identifier of `row` for error messages.
fn row_id(df: &DataFrame, row: usize) -> String {
    text_values(df, ID)
        .ok()
        .and_then(|ids| ids.into_iter().nth(row).flatten())
        .unwrap_or_else(|| format!("<row {}>", row))
}

/// Decimal view of a rating column; text cells must parse.
fn rating_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    if series(df, column)?.dtype().is_primitive_numeric() {
        return float_values(df, column);
    }
    text_values(df, column)?
        .into_iter()
        .enumerate()
        .map(|(row, cell)| match cell.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse::<f64>().map(Some).map_err(|_| {
                WrangleError::format(column, row_id(df, row), format!("'{}' is not a number", s))
            }),
        })
        .collect()
}

/// Write `value` into `column` at the rows of `ids`; absent ids are logged and skipped.
fn set_by_id(
    df: &DataFrame,
    values: &mut [Option<f64>],
    id: &str,
    value: Option<f64>,
    what: &str,
) -> Result<bool> {
    match find_row(df, ID, id)? {
        Some(row) => {
            values[row] = value;
            Ok(true)
        }
        None => {
            warn!(id = %id, "{} targets an absent post", what);
            Ok(false)
        }
    }
}

/// A name with at least one cased letter and no uppercase letter, such as "a" or "such".
pub fn is_lowercase_name(name: &str) -> bool {
    let mut cased = false;
    for c in name.chars() {
        if c.is_uppercase() {
            return false;
        }
        cased |= c.is_lowercase();
    }
    cased
}

/// Whether a life-stage cell marks the stage as present.
pub fn is_stage_tag(cell: Option<&str>) -> bool {
    cell.map(str::trim)
        .is_some_and(|s| !s.is_empty() && s != NONE_PLACEHOLDER)
}

/// Posts without a media link have no picture to classify.
pub struct DropMissingMedia;

impl CleaningStep for DropMissingMedia {
    fn name(&self) -> &'static str {
        "drop_missing_media"
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let mask: Vec<bool> = text_values(df, EXPANDED_URLS)?
            .iter()
            .map(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
            .collect();
        filter_rows(df, &mask)
    }
}

/// Drop reposts, then the columns that only reposts populate.
pub struct DropReposts;

impl CleaningStep for DropReposts {
    fn name(&self) -> &'static str {
        "drop_reposts"
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let originals = series(df, RETWEETED_STATUS_ID)?.is_null();
        drop_columns(&df.filter(&originals)?, &REPOST_COLUMNS)
    }
}

/// Posts missing from the engagement file count as zero likes and reposts.
pub struct FillEngagementCounters;

impl FillEngagementCounters {
    fn counter(df: &DataFrame, column: &str, row: usize, cell: Option<&str>) -> Result<i64> {
        let invalid = |msg: String| WrangleError::format(column, row_id(df, row), msg);
        let Some(raw) = cell.map(str::trim) else {
            return Ok(0);
        };
        let n = match raw.parse::<i64>() {
            Ok(n) => n,
            Err(_) => match raw.parse::<f64>() {
                Ok(f) if f.is_finite() && f.fract() == 0.0 => f as i64,
                _ => return Err(invalid(format!("'{}' is not a whole number", raw))),
            },
        };
        if n < 0 {
            return Err(invalid(format!("counter is negative ({})", n)));
        }
        Ok(n)
    }
}

impl CleaningStep for FillEngagementCounters {
    fn name(&self) -> &'static str {
        "fill_engagement_counters"
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut out = df.clone();
        for column in [FAVORITE_COUNT, RETWEET_COUNT] {
            let counts = text_values(df, column)?
                .iter()
                .enumerate()
                .map(|(row, cell)| Self::counter(df, column, row, cell.as_deref()))
                .collect::<Result<Vec<i64>>>()?;
            out = with_series(&out, Series::new(column.into(), counts))?;
        }
        Ok(out)
    }
}

pub struct ParseTimestamps;

impl ParseTimestamps {
    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        DateTime::parse_from_str(raw, ARCHIVE_TIMESTAMP_FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(raw))
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl CleaningStep for ParseTimestamps {
    fn name(&self) -> &'static str {
        "parse_timestamps"
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        if matches!(series(df, TIMESTAMP)?.dtype(), DataType::Datetime(_, _)) {
            return Ok(df.clone());
        }
        let millis = text_values(df, TIMESTAMP)?
            .into_iter()
            .enumerate()
            .map(|(row, cell)| {
                let raw = cell.ok_or_else(|| {
                    WrangleError::format(TIMESTAMP, row_id(df, row), "missing timestamp")
                })?;
                Self::parse(&raw)
                    .map(|dt| dt.timestamp_millis())
                    .ok_or_else(|| {
                        WrangleError::format(
                            TIMESTAMP,
                            row_id(df, row),
                            format!("unparseable timestamp '{}'", raw),
                        )
                    })
            })
            .collect::<Result<Vec<i64>>>()?;
        let parsed = Series::new(TIMESTAMP.into(), millis).cast(&datetime_dtype())?;
        with_series(df, parsed)
    }
}

/// Numerators the archive truncated from decimal ratings, e.g. 11.26/10 read as 26.
pub struct ApplyNumeratorOverrides {
    overrides: Vec<NumeratorOverride>,
}

impl ApplyNumeratorOverrides {
    pub fn new(overrides: Vec<NumeratorOverride>) -> Self {
        Self { overrides }
    }
}

impl CleaningStep for ApplyNumeratorOverrides {
    fn name(&self) -> &'static str {
        "apply_numerator_overrides"
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut numerators = rating_values(df, RATING_NUMERATOR)?;
        let mut applied = 0usize;
        for o in &self.overrides {
            let Some(row) = find_row(df, ID, &o.id)? else {
                warn!(id = %o.id, "Numerator override targets an absent post");
                continue;
            };
            let current = numerators[row];
            if let Some(expected) = o.expect {
                if current != Some(expected) {
                    warn!(
                        id = %o.id,
                        expected,
                        found = ?current,
                        "Numerator no longer matches the override; left unchanged"
                    );
                    continue;
                }
            }
            debug!(id = %o.id, from = ?current, to = o.value, "Overriding numerator");
            numerators[row] = Some(o.value);
            applied += 1;
        }
        if applied == 0 {
            return Ok(df.clone());
        }
        with_series(df, Series::new(RATING_NUMERATOR.into(), numerators))
    }
}

/// Both rating fields become decimals.
pub struct CoerceRatings;

impl CleaningStep for CoerceRatings {
    fn name(&self) -> &'static str {
        "coerce_ratings"
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut out = df.clone();
        for column in [RATING_NUMERATOR, RATING_DENOMINATOR] {
            let values = rating_values(df, column)?;
            out = with_series(&out, Series::new(column.into(), values))?;
        }
        Ok(out)
    }
}

/// Posts whose text holds no real rating keep their row but lose both rating fields.
pub struct BlankRatings {
    ids: Vec<String>,
}

impl BlankRatings {
    pub fn new(ids: Vec<String>) -> Self {
        Self { ids }
    }
}

impl CleaningStep for BlankRatings {
    fn name(&self) -> &'static str {
        "blank_ratings"
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut numerators = rating_values(df, RATING_NUMERATOR)?;
        let mut denominators = rating_values(df, RATING_DENOMINATOR)?;
        for id in &self.ids {
            if set_by_id(df, &mut numerators, id, None, "Blank rating")? {
                set_by_id(df, &mut denominators, id, None, "Blank rating")?;
            }
        }
        let out = with_series(df, Series::new(RATING_NUMERATOR.into(), numerators))?;
        with_series(&out, Series::new(RATING_DENOMINATOR.into(), denominators))
    }
}

/// Ratings picked up from the wrong fraction in the text.
pub struct FixRatings {
    fixes: Vec<RatingFix>,
}

impl FixRatings {
    pub fn new(fixes: Vec<RatingFix>) -> Self {
        Self { fixes }
    }
}

impl CleaningStep for FixRatings {
    fn name(&self) -> &'static str {
        "fix_ratings"
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut numerators = rating_values(df, RATING_NUMERATOR)?;
        let mut denominators = rating_values(df, RATING_DENOMINATOR)?;
        for fix in &self.fixes {
            if set_by_id(df, &mut numerators, &fix.id, Some(fix.numerator), "Rating fix")? {
                set_by_id(df, &mut denominators, &fix.id, Some(fix.denominator), "Rating fix")?;
            }
        }
        let out = with_series(df, Series::new(RATING_NUMERATOR.into(), numerators))?;
        with_series(&out, Series::new(RATING_DENOMINATOR.into(), denominators))
    }
}

/// Reduce the client markup in `source` to its visible label.
pub struct ExtractSourceLabel;

impl ExtractSourceLabel {
    pub fn label(markup: &str) -> Option<String> {
        SOURCE_LABEL
            .captures(markup.trim())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

impl CleaningStep for ExtractSourceLabel {
    fn name(&self) -> &'static str {
        "extract_source_label"
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let labels: Vec<Option<String>> = text_values(df, SOURCE)?
            .iter()
            .map(|cell| cell.as_deref().and_then(Self::label))
            .collect();
        let labels = Series::new(SOURCE.into(), labels).cast(&category_dtype())?;
        with_series(df, labels)
    }
}

/// Give identifiers one canonical decimal-string form so both sides of a join agree.
///
/// Identifiers are read as text, so an artifact such as `666020888022790149.0`
/// still carries every digit. A float-typed key column has already lost digits
/// and is rejected.
pub struct NormalizeIdentifiers {
    column: &'static str,
}

impl NormalizeIdentifiers {
    pub fn new(column: &'static str) -> Self {
        Self { column }
    }

    pub fn canonical(raw: &str) -> Option<String> {
        let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
            .then(|| digits.to_string())
    }
}

impl Default for NormalizeIdentifiers {
    fn default() -> Self {
        Self::new(ID)
    }
}

impl CleaningStep for NormalizeIdentifiers {
    fn name(&self) -> &'static str {
        "normalize_identifiers"
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let dtype = series(df, self.column)?.dtype();
        if !(matches!(dtype, DataType::String) || dtype.is_integer()) {
            return Err(WrangleError::format(
                self.column,
                "*",
                format!(
                    "identifiers stored as {} may have lost digits; read them as text",
                    dtype_label(dtype)
                ),
            ));
        }
        let ids = text_values(df, self.column)?
            .into_iter()
            .enumerate()
            .map(|(row, cell)| {
                let raw = cell.unwrap_or_default();
                Self::canonical(&raw).ok_or_else(|| {
                    let shown = if raw.is_empty() { format!("<row {}>", row) } else { raw.clone() };
                    WrangleError::format(self.column, shown, "not a numeric identifier")
                })
            })
            .collect::<Result<Vec<String>>>()?;
        with_series(df, Series::new(self.column.into(), ids))
    }
}

/// Lowercase words in `name` are extraction mistakes ("a", "such"), not names.
pub struct DropLowercaseNames;

impl CleaningStep for DropLowercaseNames {
    fn name(&self) -> &'static str {
        "drop_lowercase_names"
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let mask: Vec<bool> = text_values(df, NAME)?
            .iter()
            .map(|v| !v.as_deref().is_some_and(is_lowercase_name))
            .collect();
        filter_rows(df, &mask)
    }
}

/// Fold the four life-stage columns into one `dog_stage` column.
pub struct CollapseDogStage;

impl CleaningStep for CollapseDogStage {
    fn name(&self) -> &'static str {
        "collapse_dog_stage"
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let stages = STAGE_COLUMNS
            .iter()
            .map(|name| text_values(df, name))
            .collect::<Result<Vec<_>>>()?;
        let labels: Vec<String> = (0..df.height())
            .map(|row| {
                let tags: Vec<&str> = STAGE_COLUMNS
                    .iter()
                    .zip(&stages)
                    .filter(|(_, cells)| is_stage_tag(cells[row].as_deref()))
                    .map(|(name, _)| *name)
                    .collect();
                tags.join(STAGE_SEPARATOR)
            })
            .collect();
        let labels = Series::new(DOG_STAGE.into(), labels).cast(&category_dtype())?;
        with_series(&drop_columns(df, &STAGE_COLUMNS)?, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DOGGO;
    use crate::frame::column_names;

    fn texts(df: &DataFrame, column: &str) -> Vec<Option<String>> {
        text_values(df, column).unwrap()
    }

    fn some(values: &[&str]) -> Vec<Option<String>> {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn missing_media_rows_are_dropped() {
        let df = df!(
            ID => ["1", "2", "3"],
            EXPANDED_URLS => [Some("https://x/1"), None, Some("  ")]
        )
        .unwrap();
        let out = DropMissingMedia.apply(&df).unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(df.height(), 3);
    }

    #[test]
    fn reposts_and_their_columns_are_removed() {
        let df = df!(
            ID => ["1", "2"],
            RETWEETED_STATUS_ID => [None, Some("7")],
            REPOST_COLUMNS[1] => [None, Some("8")],
            REPOST_COLUMNS[2] => [None, Some("2017-01-01")]
        )
        .unwrap();
        let out = DropReposts.apply(&df).unwrap();
        assert_eq!(column_names(&out), vec![ID]);
        assert_eq!(out.height(), 1);
    }

    #[test]
    fn counters_default_to_zero_and_reject_negatives() {
        let df = df!(
            ID => ["1", "2"],
            FAVORITE_COUNT => [Some(5i64), None],
            RETWEET_COUNT => [None, Some(3.0f64)]
        )
        .unwrap();
        let out = FillEngagementCounters.apply(&df).unwrap();
        assert_eq!(texts(&out, FAVORITE_COUNT), some(&["5", "0"]));
        assert_eq!(series(&out, RETWEET_COUNT).unwrap().dtype(), &DataType::Int64);

        let negative = df!(
            ID => ["9"],
            FAVORITE_COUNT => [-1i64],
            RETWEET_COUNT => [0i64]
        )
        .unwrap();
        match FillEngagementCounters.apply(&negative) {
            Err(WrangleError::Format { column, id, .. }) => {
                assert_eq!(column, FAVORITE_COUNT);
                assert_eq!(id, "9");
            }
            other => panic!("expected a format error, got {other:?}"),
        }
    }

    #[test]
    fn timestamps_accept_archive_and_rfc3339_forms() {
        let archive = ParseTimestamps::parse("2017-08-01 16:23:56 +0000").unwrap();
        let rfc = ParseTimestamps::parse("2017-08-01T18:23:56+02:00").unwrap();
        assert_eq!(archive, rfc);
        assert!(ParseTimestamps::parse("yesterday").is_none());
    }

    #[test]
    fn timestamps_become_datetimes() {
        let df = df!(ID => ["1"], TIMESTAMP => ["2017-08-01 16:23:56 +0000"]).unwrap();
        let out = ParseTimestamps.apply(&df).unwrap();
        assert!(matches!(
            series(&out, TIMESTAMP).unwrap().dtype(),
            DataType::Datetime(_, _)
        ));
        assert!(ParseTimestamps.apply(&out).unwrap().equals_missing(&out));
    }

    #[test]
    fn unparseable_timestamp_names_the_row() {
        let df = df!(ID => ["42"], TIMESTAMP => ["not a time"]).unwrap();
        let err = ParseTimestamps.apply(&df).unwrap_err();
        assert!(err.to_string().contains("42"));
    }

    fn ratings() -> DataFrame {
        df!(
            ID => ["10", "20", "30"],
            RATING_NUMERATOR => [26i64, 24, 1],
            RATING_DENOMINATOR => [10i64, 7, 2]
        )
        .unwrap()
    }

    #[test]
    fn numerator_override_requires_expected_value() {
        let step = ApplyNumeratorOverrides::new(vec![
            NumeratorOverride { id: "10".into(), expect: Some(26.0), value: 11.26, note: None },
            NumeratorOverride { id: "20".into(), expect: Some(99.0), value: 1.0, note: None },
            NumeratorOverride { id: "404".into(), expect: None, value: 1.0, note: None },
        ]);
        let out = CoerceRatings.apply(&step.apply(&ratings()).unwrap()).unwrap();
        let numerators = float_values(&out, RATING_NUMERATOR).unwrap();
        assert_eq!(numerators[0], Some(11.26));
        assert_eq!(numerators[1], Some(24.0));
    }

    #[test]
    fn unparseable_rating_is_a_format_error() {
        let df = df!(
            ID => ["1"],
            RATING_NUMERATOR => ["ten"],
            RATING_DENOMINATOR => [10i64]
        )
        .unwrap();
        assert!(matches!(CoerceRatings.apply(&df), Err(WrangleError::Format { .. })));
    }

    #[test]
    fn blank_and_fixed_ratings_are_keyed_by_identifier() {
        let coerced = CoerceRatings.apply(&ratings()).unwrap();
        let blanked = BlankRatings::new(vec!["20".into()]).apply(&coerced).unwrap();
        let fixed = FixRatings::new(vec![RatingFix {
            id: "30".into(),
            numerator: 9.0,
            denominator: 10.0,
            note: None,
        }])
        .apply(&blanked)
        .unwrap();

        assert_eq!(fixed.height(), 3);
        assert_eq!(series(&fixed, RATING_NUMERATOR).unwrap().dtype(), &DataType::Float64);
        let num = float_values(&fixed, RATING_NUMERATOR).unwrap();
        let den = float_values(&fixed, RATING_DENOMINATOR).unwrap();
        assert_eq!(num, vec![Some(26.0), None, Some(9.0)]);
        assert_eq!(den, vec![Some(10.0), None, Some(10.0)]);
    }

    #[test]
    fn source_label_is_extracted_from_markup() {
        let markup = r#"<a href="http://twitter.com/download/iphone" rel="nofollow">Twitter for iPhone</a>"#;
        assert_eq!(ExtractSourceLabel::label(markup).as_deref(), Some("Twitter for iPhone"));
        assert_eq!(ExtractSourceLabel::label("plain text"), None);

        let df = df!(SOURCE => [markup, "plain"]).unwrap();
        let out = ExtractSourceLabel.apply(&df).unwrap();
        assert!(matches!(
            series(&out, SOURCE).unwrap().dtype(),
            DataType::Categorical(_, _)
        ));
        assert_eq!(
            texts(&out, SOURCE),
            vec![Some("Twitter for iPhone".to_string()), None]
        );
    }

    #[test]
    fn identifiers_are_canonicalized() {
        assert_eq!(NormalizeIdentifiers::canonical(" \"892420643555336193\" ").as_deref(), Some("892420643555336193"));
        assert_eq!(NormalizeIdentifiers::canonical("666020888022790149.0").as_deref(), Some("666020888022790149"));
        assert_eq!(NormalizeIdentifiers::canonical("12ab"), None);
        assert_eq!(NormalizeIdentifiers::canonical(""), None);

        let df = df!(ID => ["5", "'6'", "666020888022790149.0"]).unwrap();
        let out = NormalizeIdentifiers::default().apply(&df).unwrap();
        assert_eq!(texts(&out, ID), some(&["5", "6", "666020888022790149"]));

        let missing = df!(ID => [None::<&str>]).unwrap();
        assert!(NormalizeIdentifiers::default().apply(&missing).is_err());
    }

    #[test]
    fn float_typed_identifiers_are_rejected() {
        let df = df!(ID => [666020888022790149.0f64]).unwrap();
        match NormalizeIdentifiers::default().apply(&df) {
            Err(WrangleError::Format { column, message, .. }) => {
                assert_eq!(column, ID);
                assert!(message.contains("float64"), "{}", message);
            }
            other => panic!("expected a format error, got {other:?}"),
        }

        let ints = df!(ID => [892420643555336193i64]).unwrap();
        let out = NormalizeIdentifiers::default().apply(&ints).unwrap();
        assert_eq!(texts(&out, ID), some(&["892420643555336193"]));
    }

    #[test]
    fn only_all_lowercase_names_are_dropped() {
        assert!(is_lowercase_name("such"));
        assert!(!is_lowercase_name("Phineas"));
        assert!(!is_lowercase_name("McLovin"));
        assert!(!is_lowercase_name("123"));

        let df = df!(NAME => [Some("a"), Some("Tilly"), None, Some("None"), Some("deLuca")]).unwrap();
        let out = DropLowercaseNames.apply(&df).unwrap();
        assert_eq!(
            texts(&out, NAME),
            vec![
                Some("Tilly".to_string()),
                None,
                Some("None".to_string()),
                Some("deLuca".to_string())
            ]
        );
    }

    #[test]
    fn stages_collapse_in_canonical_order() {
        let df = df!(
            ID => ["1", "2", "3"],
            DOGGO => [Some("doggo"), Some("None"), Some("None")],
            STAGE_COLUMNS[1] => [Some("None"), Some("None"), None],
            STAGE_COLUMNS[2] => [Some("pupper"), Some("None"), None],
            STAGE_COLUMNS[3] => [Some("None"), Some("puppo"), Some("")]
        )
        .unwrap();
        let out = CollapseDogStage.apply(&df).unwrap();
        assert_eq!(column_names(&out), vec![ID, DOG_STAGE]);
        assert_eq!(texts(&out, DOG_STAGE), some(&["doggo, pupper", "puppo", ""]));
    }

    #[test]
    fn steps_accept_empty_frames() {
        let df = df!(
            ID => Vec::<String>::new(),
            NAME => Vec::<String>::new(),
            EXPANDED_URLS => Vec::<String>::new()
        )
        .unwrap();
        assert_eq!(DropMissingMedia.apply(&df).unwrap().height(), 0);
        assert_eq!(DropLowercaseNames.apply(&df).unwrap().height(), 0);
        assert_eq!(NormalizeIdentifiers::default().apply(&df).unwrap().height(), 0);
    }
}
