use std::path::PathBuf;

use pcd_pipeline::PlanError;
use spatial_core::ParseConversionTypeError;
use spatial_parser::ParseError;
use thiserror::Error;

/// Longest stderr excerpt carried in an error.
pub const STDERR_EXCERPT_CHARS: usize = 500;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("source file not found: {0:?}")]
    SourceNotFound(PathBuf),
    #[error("unsupported conversion type: {0}")]
    UnsupportedConversionType(String),
    #[error("unsupported source format: {0}")]
    UnsupportedSourceFormat(String),
    #[error("source bounds are missing, non-finite or degenerate")]
    InvalidBounds,
    #[error("{0} is not available")]
    ExternalEngineUnavailable(String),
    #[error("{engine} failed (exit code {exit_code:?}): {stderr_excerpt}")]
    ExternalEngineFailure {
        engine: String,
        exit_code: Option<i32>,
        stderr_excerpt: String,
    },
    #[error("{engine} timed out after {seconds}s")]
    Timeout { engine: String, seconds: u64 },
    #[error("output was not created: {0:?}")]
    OutputArtifactMissing(PathBuf),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Plan(#[from] PlanError),
}

impl ConvertError {
    /// Recoverable errors change the course of a conversion instead of
    /// ending it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ConvertError::InvalidBounds | ConvertError::ExternalEngineUnavailable(_)
        )
    }

    pub fn engine_failure(engine: &str, exit_code: Option<i32>, stderr: &str) -> Self {
        ConvertError::ExternalEngineFailure {
            engine: engine.to_string(),
            exit_code,
            stderr_excerpt: excerpt(stderr),
        }
    }
}

impl From<ParseConversionTypeError> for ConvertError {
    fn from(err: ParseConversionTypeError) -> Self {
        ConvertError::UnsupportedConversionType(err.0)
    }
}

/// First `STDERR_EXCERPT_CHARS` characters, trimmed.
pub fn excerpt(text: &str) -> String {
    text.trim().chars().take(STDERR_EXCERPT_CHARS).collect()
}
