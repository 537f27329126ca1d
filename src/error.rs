use thiserror::Error;

#[derive(Error, Debug)]
pub enum WrangleError {
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("Parse error in {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("Format error in column '{column}' for id {id}: {message}")]
    Format {
        column: String,
        id: String,
        message: String,
    },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Data frame error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Chart rendering failed: {0}")]
    Chart(String),
}

impl WrangleError {
    pub fn parse(origin: impl Into<String>, message: impl Into<String>) -> Self {
        WrangleError::Parse {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub fn format(column: &str, id: impl Into<String>, message: impl Into<String>) -> Self {
        WrangleError::Format {
            column: column.to_string(),
            id: id.into(),
            message: message.into(),
        }
    }

    pub fn missing_column(column: &str) -> Self {
        WrangleError::Schema(format!("no column '{}'", column))
    }
}

pub type Result<T> = std::result::Result<T, WrangleError>;
