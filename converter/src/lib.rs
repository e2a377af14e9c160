mod analysis;
mod artifact;
mod mesh;
mod multihop;
mod pointcloud;

pub mod config;
pub mod error;
pub mod exec;
pub mod jobs;
pub mod options;
pub mod orchestrator;
pub mod progress;
pub mod result;

pub use analysis::{describe, SourceAnalysis};
pub use config::ConverterConfig;
pub use error::ConvertError;
pub use exec::{ProcessOutput, ProcessRunner, SystemRunner};
pub use jobs::{ConversionStatus, JobRegistry, JobState, Submission};
pub use options::ConversionOptions;
pub use orchestrator::{ConversionRequest, Converter};
pub use progress::Progress;
pub use result::ConversionResult;
