use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while requesting advert prices from the P2P endpoint.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected HTTP status: {0}")]
    Status(u16),

    #[error("failed to decode advert search response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(value: reqwest::Error) -> Self {
        if let Some(status) = value.status() {
            Self::Status(status.as_u16())
        } else if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

/// Errors produced by a [`RowStore`](crate::store::RowStore).
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("SQLite error: {0}")]
    Sqlite(String),
}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<csv::Error> for StoreError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value.to_string())
    }
}

/// Errors produced while loading the stored series for display.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum LoadError {
    #[error("no date/time column found, available columns: {}", .available.join(", "))]
    MissingColumn { available: Vec<String> },

    #[error("source contains no rows with a valid timestamp")]
    EmptyData,

    #[error("failed to read source: {0}")]
    Source(String),
}

impl LoadError {
    /// Determine if the error describes the data itself rather than a failure to reach it.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_data_error(&self) -> bool {
        match self {
            LoadError::MissingColumn { .. } | LoadError::EmptyData => true,
            _ => false,
        }
    }
}

impl From<StoreError> for LoadError {
    fn from(value: StoreError) -> Self {
        Self::Source(value.to_string())
    }
}

impl From<FetchError> for LoadError {
    fn from(value: FetchError) -> Self {
        Self::Source(value.to_string())
    }
}

/// Errors produced while reading configuration from the environment.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: String, value: String },
}
