pub mod bounds;
pub mod color;
pub mod conversion;
pub mod info;
pub mod profile;
pub mod volume;

pub use bounds::BoundingBox;
pub use color::ColorProfile;
pub use conversion::{ConversionType, ParseConversionTypeError, SourceFormat};
pub use info::SpatialInfo;
pub use profile::{CoordinateClassification, SpatialProfile};
pub use volume::BoundingVolume;
