mod error;
pub mod planner;
pub mod stage;
pub mod tools;

pub use error::PlanError;
pub use planner::{ColorPolicy, PlannerSettings, VisualizationRequest};
pub use stage::{PipelineBuilder, PipelineSpec, ReaderKind, Stage, WriterKind};
pub use tools::ToolInvocation;
