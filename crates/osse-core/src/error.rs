//! Error taxonomy for experiment derivation and verification.

use std::path::PathBuf;

/// Errors produced by the core library.
#[derive(Debug, thiserror::Error)]
pub enum OsseError {
    #[error("malformed lead time: {0:?}")]
    MalformedLeadTime(String),

    #[error("invalid timestamp {value:?}: expected YYYY-MM-DDTHH:MM:SSZ")]
    InvalidTimestamp { value: String },

    #[error("cycle frequency must be positive, got {0}")]
    NonPositiveFrequency(String),

    #[error("cycle {0} is the first cycle and has no background")]
    NoPreviousCycle(String),

    #[error("{cycle} offset by {lead} is outside the representable time range")]
    TimeOutOfRange { cycle: String, lead: String },

    #[error("template {path:?} is not a mapping at {key}")]
    TemplateShape { path: PathBuf, key: String },

    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("record {path:?} has no state vector on line 3")]
    MissingStateLine { path: PathBuf },

    #[error("record {path:?} has an unparseable value {token:?}")]
    BadRecordValue { path: PathBuf, token: String },

    #[error("record {what} is empty")]
    EmptyRecord { what: String },

    #[error("length mismatch at {what}: truth has {truth} values, forecast has {forecast}")]
    LengthMismatch {
        what: String,
        truth: usize,
        forecast: usize,
    },

    #[error("no cycles to verify between {from} and {to}")]
    NoVerificationCycles { from: String, to: String },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, OsseError>;
