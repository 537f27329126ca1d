use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use crate::error::{Result, WrangleError};

pub const DEFAULT_CONFIG_PATH: &str = "wrangle.toml";

/// Run configuration loaded from `wrangle.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub sources: SourcesConfig,
    pub http: HttpConfig,
    pub cleaning: CleaningConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    /// Comma-separated post archive
    pub archive: PathBuf,
    /// Where the tab-separated image predictions are downloaded from
    pub predictions_url: String,
    /// Local copy of the downloaded predictions
    pub predictions_cache: PathBuf,
    /// Line-delimited JSON engagement records
    pub engagement: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Required: a hung fetch would otherwise block the run forever.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleaningConfig {
    /// Versioned identifier-keyed rating corrections
    pub corrections: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub merged: PathBuf,
    pub report_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(path).map_err(|e| {
            WrangleError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&config_content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.http.timeout_seconds == 0 {
            return Err(WrangleError::Config(
                "http.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        let url = self.sources.predictions_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(WrangleError::Config(format!(
                "sources.predictions_url must be an http(s) URL, got '{}'",
                url
            )));
        }
        Ok(())
    }
}
