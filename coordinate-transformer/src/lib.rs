mod error;

pub mod classifier;
pub mod geodesy;
pub mod korea_tm;
pub mod normalizer;
pub mod tile_transform;

pub use classifier::{classify, classify_bbox};
pub use error::TransformError;
pub use normalizer::{LocalMetersProjection, Matrix4, NormalizationPlan, UP_AXIS_CORRECTION};
pub use tile_transform::{MeshPlacement, TileTransform};
