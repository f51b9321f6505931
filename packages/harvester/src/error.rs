//! Error types for the harvester.
//!
//! Transport failures are retried inside [`crate::http`]; every variant that
//! reaches a caller is final for the operation that produced it.

use std::path::PathBuf;

use thiserror::Error;

/// Last cause recorded by the retry client before giving up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The registry answered with a non-success status.
    Status(u16),
    /// The request never produced a response (connect, timeout, TLS, ...).
    Transport(String),
}

impl FailureCause {
    /// HTTP status of the last response, if there was one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Transport(_) => None,
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status(status) => write!(f, "HTTP status {status}"),
            Self::Transport(message) => f.write_str(message),
        }
    }
}

/// Main error type for the harvester library.
#[derive(Debug, Error)]
pub enum HarvesterError {
    /// The bearer token was rejected. Retrying will not help.
    #[error("Registry rejected the bearer token (HTTP {status}); set a fresh BEARER_TOKEN")]
    Credential { status: u16 },

    /// The registry kept answering 502 after the extended backoff schedule.
    #[error("Registry unavailable (HTTP 502) after {attempts} attempts")]
    UpstreamUnavailable { attempts: u32 },

    /// Generic request failure after the normal retry budget.
    #[error("Request failed after {attempts} attempts: {cause}")]
    RequestFailed { attempts: u32, cause: FailureCause },

    /// Reference data (or a listing) came back without usable content.
    #[error("Data retrieval failed: {0}")]
    DataRetrieval(String),

    /// A date string matched none of the supported formats.
    #[error("Invalid date '{value}'{}", .context.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
    DateParse {
        value: String,
        context: Option<String>,
    },

    /// A cache file exists but does not hold valid JSON.
    #[error("Corrupt cache file {}: {source}", .path.display())]
    CacheCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A detail record references a regulation missing from the reference table.
    #[error("Record {record_id} references unknown technical regulation {regulation_id}")]
    UnknownRegulation { record_id: u64, regulation_id: u64 },

    /// Response body could not be decoded into the expected shape.
    #[error("Invalid response from {url}: {message}")]
    InvalidResponse { url: String, message: String },

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client could not be built or a request could not be prepared.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl HarvesterError {
    /// Build a date error tagged with the record it came from.
    pub fn date_in(value: impl Into<String>, context: impl Into<String>) -> Self {
        Self::DateParse {
            value: value.into(),
            context: Some(context.into()),
        }
    }
}

/// Result type alias for harvester operations.
pub type Result<T> = std::result::Result<T, HarvesterError>;
