mod error;

pub mod color;
pub mod las_header;
pub mod mesh;
pub mod obj;
pub mod summary;

pub use error::ParseError;
pub use mesh::MeshSummary;
pub use summary::EngineSummary;
