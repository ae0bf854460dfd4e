use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised synchronously at the boundary of the pipeline stage that
/// detects them. There is no retry policy: every input is deterministic and
/// local, so the only recovery path is correcting the caller's input.
#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("invalid date range: start {start} must not be later than end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("transaction log is missing required columns: {missing:?}. Expected columns are: {expected:?}")]
    SchemaError {
        missing: Vec<String>,
        expected: Vec<String>,
    },

    #[error("no transactions found between {start} and {end}")]
    EmptyResult { start: NaiveDate, end: NaiveDate },

    #[error("{country} is not supported. Supported countries: {supported:?}")]
    UnsupportedCountry {
        country: String,
        supported: Vec<String>,
    },

    #[error("{resolution} is not a valid resolution. Choose from: {valid:?}")]
    UnsupportedResolution {
        resolution: String,
        valid: Vec<String>,
    },

    #[error("no configuration found for resolution {resolution}")]
    MissingConfiguration { resolution: String },

    #[error("join column '{field}' is missing from the {side} side of the merge")]
    JoinKeyMismatch { field: String, side: String },

    #[error("row {row}: cannot parse column '{column}': {reason}")]
    MalformedRow {
        row: usize,
        column: String,
        reason: String,
    },

    #[error("{requested} {granularity} periods requested, but at most {max_periods} are supported")]
    WindowTooLong {
        granularity: String,
        max_periods: u32,
        requested: u32,
    },

    #[error("invalid jurisdiction ({jurisdiction}). Must be one of {valid:?}")]
    UnknownJurisdiction {
        jurisdiction: String,
        valid: Vec<String>,
    },
}
