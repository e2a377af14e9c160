use spatial_core::CoordinateClassification;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("bounds are missing, non-finite or degenerate")]
    InvalidBounds,
    #[error("expected geographic coordinates, found {0}")]
    NotGeographic(CoordinateClassification),
}
