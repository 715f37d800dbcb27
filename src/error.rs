use thiserror::Error;

/// Domain errors the pipeline and the dispatcher can raise.
///
/// Plumbing errors (I/O, SQL, HTTP) travel as `anyhow::Error` with context;
/// these variants are the ones a caller may want to match on.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Invalid mode specified: {0}")]
    UnknownMode(String),

    #[error("Missing required parameter `{0}`")]
    MissingParameter(&'static str),

    #[error("Invalid date `{0}` (expected YYYY-MM-DD)")]
    InvalidDate(String),

    #[error("Start date {start} is after end date {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("Single-day batch spans several dates: {0:?}")]
    MixedDates(Vec<String>),

    #[error("Invalid schema definition at {path}: {reason}")]
    InvalidSchema { path: String, reason: String },

    #[error("Invalid object path `{0}`")]
    InvalidObjectPath(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Upstream error for {ticker}: {message}")]
    Upstream { ticker: String, message: String },
}
