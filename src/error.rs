//! Error types.
//!
//! Only configuration can fail loudly. Everything that goes wrong while the engine is running
//! (detector failures, render ticks without geometry, unknown filter ids) degrades to fallback
//! rendering and is reported through logs and render reports instead.

use thiserror::Error;

use crate::registry::FilterId;

/// An error reported by a [`FaceDetector`][crate::detection::FaceDetector].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectionError {
    /// A single detection cycle failed.
    ///
    /// The engine treats this as "no faces this cycle" and counts it towards the detection
    /// backoff.
    #[error("face detection failed: {0}")]
    Failed(String),

    /// The detection capability does not exist (model failed to load, worker exited, ...).
    ///
    /// The engine switches to fallback rendering permanently and never retries.
    #[error("face detection is unavailable")]
    Unavailable,
}

/// Invalid engine or filter configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("smoothing factor must lie strictly between 0 and 1, got {0}")]
    InvalidAlpha(f32),

    #[error("fallback position of filter `{id}` must lie in [0, 1]x[0, 1], got ({x}, {y})")]
    InvalidFallback { id: FilterId, x: f32, y: f32 },

    #[error("base size of filter `{id}` must be positive, got {size}")]
    InvalidBaseSize { id: FilterId, size: f32 },

    #[error("filter `{0}` is registered more than once")]
    DuplicateFilter(FilterId),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A string could not be parsed into one of the crate's enumerations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} `{value}`")]
pub struct ParseError {
    pub(crate) kind: &'static str,
    pub(crate) value: String,
}

impl ParseError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
