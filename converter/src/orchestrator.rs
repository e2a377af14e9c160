//! Entry point for a single conversion.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    path::PathBuf,
    sync::Arc,
};

use spatial_core::ConversionType;

use crate::{
    exec::{ProcessRunner, SystemRunner},
    mesh, multihop, pointcloud, ConversionOptions, ConversionResult, ConvertError,
    ConverterConfig, Progress,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub source: PathBuf,
    pub conversion_type: ConversionType,
    pub options: ConversionOptions,
    /// Material, texture and buffer files that belong next to the source.
    pub siblings: Vec<PathBuf>,
}

impl ConversionRequest {
    pub fn new(source: impl Into<PathBuf>, conversion_type: ConversionType) -> Self {
        Self {
            source: source.into(),
            conversion_type,
            options: ConversionOptions::default(),
            siblings: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_siblings(mut self, siblings: Vec<PathBuf>) -> Self {
        self.siblings = siblings;
        self
    }
}

/// Everything a handler may touch.
pub(crate) struct Context<'a> {
    pub(crate) config: &'a ConverterConfig,
    pub(crate) runner: &'a dyn ProcessRunner,
    pub(crate) progress: &'a Progress,
}

type Handler = fn(&Context, &ConversionRequest) -> Result<ConversionResult, ConvertError>;

fn handler(conversion_type: ConversionType) -> Handler {
    match conversion_type {
        ConversionType::E57ToPly => pointcloud::e57_to_ply,
        ConversionType::E57ToLas => pointcloud::e57_to_las,
        ConversionType::LasToCopc | ConversionType::LazToCopc | ConversionType::PlyToCopc => {
            pointcloud::to_copc
        }
        ConversionType::ObjTo3dtiles => mesh::obj_to_3dtiles,
        ConversionType::GltfTo3dtiles | ConversionType::GlbTo3dtiles => mesh::model_to_3dtiles,
        ConversionType::E57To3dtiles => multihop::e57_to_3dtiles,
        ConversionType::LasTo3dtiles => multihop::las_to_3dtiles,
    }
}

pub struct Converter {
    config: ConverterConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl Converter {
    pub fn new(config: ConverterConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    pub fn with_system_runner(config: ConverterConfig) -> Self {
        Self::new(config, Arc::new(SystemRunner))
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Never fails: errors and panics inside a handler come back as a
    /// failed result.
    pub fn convert(&self, request: &ConversionRequest, progress: &Progress) -> ConversionResult {
        log::info!(
            "conversion started: type={} source={:?}",
            request.conversion_type,
            request.source
        );
        let outcome = self.run(request, progress);
        match outcome {
            Ok(result) => {
                progress.report(100);
                log::info!("conversion finished: output={:?}", result.output_path);
                result
            }
            Err(e) => {
                log::error!("conversion failed: type={} error={e}", request.conversion_type);
                ConversionResult::failed(&e)
            }
        }
    }

    fn run(&self, request: &ConversionRequest, progress: &Progress) -> Result<ConversionResult, ConvertError> {
        if !request.source.exists() {
            return Err(ConvertError::SourceNotFound(request.source.clone()));
        }
        self.config.ensure_dirs()?;

        let ctx = Context {
            config: &self.config,
            runner: self.runner.as_ref(),
            progress,
        };
        let handle = handler(request.conversion_type);
        catch_unwind(AssertUnwindSafe(|| handle(&ctx, request))).unwrap_or_else(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            Err(ConvertError::Internal(message))
        })
    }
}
