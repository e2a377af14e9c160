use spatial_core::SourceFormat;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("no point-cloud reader for {0} sources")]
    NoReader(SourceFormat),
    #[error("failed to write pipeline: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize pipeline: {0}")]
    Json(#[from] serde_json::Error),
}
