//! Identifier-keyed rating corrections, kept in a versioned TOML file so a
//! reviewer can audit every hand edit applied to the data.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{Result, WrangleError};

/// Replace a numerator that the archive extracted wrongly from a decimal rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumeratorOverride {
    pub id: String,
    /// Value the numerator must currently hold for the override to apply.
    #[serde(default)]
    pub expect: Option<f64>,
    pub value: f64,
    #[serde(default)]
    pub note: Option<String>,
}

/// A post whose rating cannot be recovered; both fields become null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlankRating {
    pub id: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingFix {
    pub id: String,
    pub numerator: f64,
    pub denominator: f64,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingCorrections {
    pub version: String,
    #[serde(default, rename = "numerator_override")]
    pub numerator_overrides: Vec<NumeratorOverride>,
    #[serde(default, rename = "blank_rating")]
    pub blank_ratings: Vec<BlankRating>,
    #[serde(default, rename = "rating_fix")]
    pub rating_fixes: Vec<RatingFix>,
}

impl RatingCorrections {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            WrangleError::Config(format!(
                "Failed to read rating corrections '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let corrections: RatingCorrections = toml::from_str(content)?;
        corrections.validate()?;
        Ok(corrections)
    }

    pub fn len(&self) -> usize {
        self.numerator_overrides.len() + self.blank_ratings.len() + self.rating_fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(WrangleError::Config(
                "rating corrections need a non-empty version".to_string(),
            ));
        }
        check_ids("numerator_override", self.numerator_overrides.iter().map(|o| o.id.as_str()))?;
        check_ids("blank_rating", self.blank_ratings.iter().map(|b| b.id.as_str()))?;
        check_ids("rating_fix", self.rating_fixes.iter().map(|f| f.id.as_str()))?;

        if let Some(fix) = self.rating_fixes.iter().find(|f| f.denominator <= 0.0) {
            return Err(WrangleError::Config(format!(
                "rating_fix for {} has non-positive denominator {}",
                fix.id, fix.denominator
            )));
        }
        Ok(())
    }
}

fn check_ids<'a>(section: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WrangleError::Config(format!(
                "{}: '{}' is not a numeric post identifier",
                section, id
            )));
        }
        if !seen.insert(id) {
            return Err(WrangleError::Config(format!(
                "{}: identifier {} listed twice",
                section, id
            )));
        }
    }
    Ok(())
}
