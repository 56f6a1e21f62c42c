//! Error type shared by every fallible operation of the crate.
//!
//! Stale granular batches and unsupported payload shapes are policy branches,
//! not errors; they never surface here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A conversion names a type tag nobody registered.
    #[error("no converter registered for type '{0}'")]
    UnknownConverter(String),

    /// The `conversions` metadata has an unexpected JSON shape.
    #[error("invalid conversion info: {0}")]
    InvalidConversionInfo(String),

    /// A nested conversion inside a plain value produced a smart value.
    #[error("nested conversion at '{0}' produced a smart value inside a plain value")]
    NestedSmartValue(String),

    /// A converter could not turn a payload into a client value (or back).
    #[error("{type_name} conversion failed: {reason}")]
    Conversion { type_name: String, reason: String },

    #[error("malformed granular op: {0}")]
    MalformedOp(String),

    /// An op addresses indexes outside the container as left by prior ops.
    #[error("granular op [{start}, {end}] out of range for length {len}")]
    OpOutOfRange { start: usize, end: usize, len: usize },

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// An incremental payload arrived for a property that has no client value.
    #[error("incremental update received without a client value to apply it to")]
    MissingClientValue,

    #[error("no element under key '{0}'")]
    MissingKey(String),

    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// In-place editing was requested on a smart element.
    #[error("element '{0}' is not a plain value")]
    NotPlainValue(String),

    #[error("digest already in progress")]
    DigestInProgress,

    /// Watches kept firing for the whole digest TTL.
    #[error("digest did not stabilize after {0} rounds")]
    DigestLimitExceeded(usize),

    #[error("invalid replay step: {0}")]
    InvalidStep(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
