use chrono::NaiveDate;
use thiserror::Error;

/// Bad command-line or configuration input. Always fatal, raised before any fetch.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("--company must not be empty")]
    EmptyCompany,

    #[error("Invalid --{field} date {value:?} (expected YYYY-MM-DD)")]
    InvalidDate { field: &'static str, value: String },

    #[error("Start date {start} is after end date {end}")]
    InvertedWindow { start: NaiveDate, end: NaiveDate },

    #[error("Unknown source {0:?} (expected g2, capterra, trustradius or all)")]
    UnknownSource(String),

    #[error("Invalid proxy URL {0:?}")]
    InvalidProxy(String),

    #[error("Conflicting options: {0}")]
    Conflict(String),

    #[error("Config file error: {0}")]
    File(String),

    #[error("Fetch backend setup failed: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No requested source produced any data")]
    NoData,

    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl HarvestError {
    /// Process exit code for errors that escape the pipeline.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarvestError::Config(_) => 2,
            HarvestError::NoData => 3,
            HarvestError::Io(_) | HarvestError::Serialize(_) => 1,
        }
    }
}
