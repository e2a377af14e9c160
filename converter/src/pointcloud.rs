//! Point-cloud conversions run through a single engine pipeline.

use std::path::{Path, PathBuf};

use pcd_pipeline::{
    planner::{plan_archival, plan_visualization, ArchiveKind},
    PipelineSpec, ToolInvocation, VisualizationRequest,
};
use serde_json::Value;
use spatial_core::SourceFormat;

use crate::{
    analysis::{describe, resolve_format, Analyzer, SourceAnalysis},
    artifact::PartialArtifact,
    exec::run_checked,
    orchestrator::{ConversionRequest, Context},
    ConversionResult, ConvertError,
};

pub(crate) fn output_name(source: &Path, extension: &str) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    format!("{stem}.{extension}")
}

fn analyze(ctx: &Context, source: &Path, format: SourceFormat) -> SourceAnalysis {
    Analyzer {
        runner: ctx.runner,
        config: ctx.config,
    }
    .point_cloud(source, format)
}

/// Resolved source format, rejected unless a point-cloud reader exists for it.
fn point_cloud_format(request: &ConversionRequest) -> Result<SourceFormat, ConvertError> {
    let format = resolve_format(&request.source, &request.options, request.conversion_type)?;
    if !format.is_point_cloud() {
        return Err(ConvertError::UnsupportedSourceFormat(format.to_string()));
    }
    Ok(format)
}

/// Viewer-ready PLY: sampled, normalized, oriented and colored.
pub(crate) fn e57_to_ply(
    ctx: &Context,
    request: &ConversionRequest,
) -> Result<ConversionResult, ConvertError> {
    let format = point_cloud_format(request)?;
    let output = ctx.config.output_dir.join(output_name(&request.source, "ply"));

    ctx.progress.report(5);
    let analysis = analyze(ctx, &request.source, format);
    ctx.progress.report(15);

    let plan = plan_visualization(
        &VisualizationRequest {
            source: &request.source,
            format,
            output: &output,
            profile: &analysis.profile,
            color: analysis.color,
            voxel_size: request.options.voxel_size,
            transform_coords: request.options.transform_coords,
        },
        &ctx.config.planner_settings(),
    )?;

    run_pipeline(ctx, &plan, &output, &analysis, request.options.epsg)
}

/// Lossless LAS 1.4 copy of a scan.
pub(crate) fn e57_to_las(
    ctx: &Context,
    request: &ConversionRequest,
) -> Result<ConversionResult, ConvertError> {
    archive(ctx, request, ArchiveKind::Las, "las")
}

/// Compressed LAZ for storage; geometry is untouched.
pub(crate) fn to_copc(
    ctx: &Context,
    request: &ConversionRequest,
) -> Result<ConversionResult, ConvertError> {
    archive(ctx, request, ArchiveKind::Laz, "laz")
}

fn archive(
    ctx: &Context,
    request: &ConversionRequest,
    kind: ArchiveKind,
    extension: &str,
) -> Result<ConversionResult, ConvertError> {
    let format = point_cloud_format(request)?;
    let output = ctx.config.output_dir.join(output_name(&request.source, extension));

    ctx.progress.report(5);
    let analysis = analyze(ctx, &request.source, format);
    ctx.progress.report(15);

    let plan = plan_archival(format, &request.source, &output, kind)?;
    run_pipeline(ctx, &plan, &output, &analysis, request.options.epsg)
}

fn run_pipeline(
    ctx: &Context,
    plan: &PipelineSpec,
    output: &Path,
    analysis: &SourceAnalysis,
    epsg: Option<u32>,
) -> Result<ConversionResult, ConvertError> {
    let partial = PartialArtifact::new(output);

    std::fs::create_dir_all(&ctx.config.temp_dir)?;
    let pipeline_file = tempfile::Builder::new()
        .prefix("pipeline_")
        .suffix(".json")
        .tempfile_in(&ctx.config.temp_dir)?;
    plan.write_to(pipeline_file.path())?;
    ctx.progress.report(30);

    run_checked(
        ctx.runner,
        &ToolInvocation::pdal_pipeline(pipeline_file.path(), partial.path(), ctx.config.conversion_timeout),
    )?;
    ctx.progress.report(80);

    let output = partial.keep();
    let engine_metadata = output_metadata(ctx, &output);
    ctx.progress.report(95);

    Ok(finish(output, engine_metadata, analysis, epsg))
}

fn finish(
    output: PathBuf,
    engine_metadata: Option<Value>,
    analysis: &SourceAnalysis,
    epsg: Option<u32>,
) -> ConversionResult {
    let format = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut result = ConversionResult::succeeded(output)
        .with_metadata("format", format)
        .with_spatial_info(&describe(&analysis.profile, epsg, false));
    if let Some(metadata) = engine_metadata {
        result = result.with_metadata("engine", metadata);
    }
    result
}

/// Summary of a finished output. Failing to get one does not fail the
/// conversion.
pub(crate) fn output_metadata(ctx: &Context, output: &Path) -> Option<Value> {
    let invocation = ToolInvocation::pdal_summary(output, ctx.config.metadata_timeout);
    match run_checked(ctx.runner, &invocation)
        .and_then(|out| serde_json::from_str::<Value>(&out.stdout).map_err(ConvertError::from))
    {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("metadata extraction failed: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exec::testing::*, exec::ProcessRunner, ConversionOptions, ConverterConfig, Progress,
    };
    use spatial_core::{ConversionType, CoordinateClassification};

    fn pipeline_json(invocation: &ToolInvocation) -> Value {
        let text = std::fs::read_to_string(&invocation.args[1]).unwrap();
        serde_json::from_str(&text).unwrap()
    }

    fn setup() -> (tempfile::TempDir, ConverterConfig, PathBuf) {
        let root = tempfile::tempdir().unwrap();
        let config = ConverterConfig::default().with_dirs(root.path().join("out"), root.path().join("tmp"));
        config.ensure_dirs().unwrap();
        let source = root.path().join("scan.e57");
        std::fs::write(&source, b"e57").unwrap();
        (root, config, source)
    }

    fn request(source: &Path, conversion_type: ConversionType) -> ConversionRequest {
        ConversionRequest {
            source: source.to_path_buf(),
            conversion_type,
            options: ConversionOptions::default(),
            siblings: vec![],
        }
    }

    #[test]
    fn e57_to_ply_plans_from_analysis() {
        let (_root, config, source) = setup();
        let seen = std::sync::Arc::new(parking_lot::Mutex::new(None));
        let seen_in_runner = std::sync::Arc::clone(&seen);
        let runner = ScriptedRunner::new(move |inv| match inv.args[0].as_str() {
            "info" if inv.args.contains(&"--stats".to_string()) => succeed_with(
                inv,
                r#"{"stats": {"statistic": [{"name": "Red", "maximum": 200}]}}"#,
            ),
            "info" => succeed_with(inv, E57_SUMMARY),
            "pipeline" => {
                *seen_in_runner.lock() = Some(pipeline_json(inv));
                succeed(inv)
            }
            _ => fail(inv),
        });
        let progress = Progress::silent();
        let ctx = Context {
            config: &config,
            runner: &runner as &dyn ProcessRunner,
            progress: &progress,
        };

        let result = e57_to_ply(&ctx, &request(&source, ConversionType::E57ToPly)).unwrap();
        assert!(result.success);
        assert_eq!(result.output_path, Some(config.output_dir.join("scan.ply")));
        assert_eq!(
            result.spatial_info().unwrap().classification,
            CoordinateClassification::SwappedGeographic
        );
        assert!(result.metadata.contains_key("engine"));

        let pipeline = seen.lock().clone().unwrap();
        let types: Vec<&str> = pipeline["pipeline"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["type"].as_str().unwrap())
            .collect();
        // 8-bit color passes through; geographic data is decimated and
        // normalized but never rotated.
        assert_eq!(
            types,
            vec!["readers.e57", "filters.decimation", "filters.transformation", "writers.ply"]
        );
        assert_eq!(pipeline["pipeline"][1]["step"], 3);
        assert_eq!(std::fs::read_dir(&config.temp_dir).unwrap().count(), 0);
    }

    #[test]
    fn copc_uses_original_format_for_extensionless_source() {
        let (root, config, _) = setup();
        let source = root.path().join("0b1e");
        std::fs::write(&source, b"ply").unwrap();
        let runner = ScriptedRunner::new(|inv| match inv.args[0].as_str() {
            "pipeline" => {
                let pipeline = pipeline_json(inv);
                assert_eq!(pipeline["pipeline"][0]["type"], "readers.ply");
                assert_eq!(pipeline["pipeline"][1]["compression"], "laszip");
                succeed(inv)
            }
            _ => missing(inv),
        });
        let progress = Progress::silent();
        let ctx = Context {
            config: &config,
            runner: &runner,
            progress: &progress,
        };
        let mut req = request(&source, ConversionType::PlyToCopc);
        req.options.original_format = Some("ply".into());

        let result = to_copc(&ctx, &req).unwrap();
        assert_eq!(result.output_path, Some(config.output_dir.join("0b1e.laz")));
        assert_eq!(result.metadata["format"], "laz");
        assert!(!result.metadata.contains_key("engine"));
    }

    #[test]
    fn failed_pipeline_leaves_no_output() {
        let (_root, config, source) = setup();
        let runner = ScriptedRunner::new(|inv| match inv.args[0].as_str() {
            "pipeline" => {
                // Engine writes part of the file, then fails.
                succeed(inv)?;
                fail(inv)
            }
            _ => missing(inv),
        });
        let progress = Progress::silent();
        let ctx = Context {
            config: &config,
            runner: &runner,
            progress: &progress,
        };

        let err = e57_to_las(&ctx, &request(&source, ConversionType::E57ToLas)).unwrap_err();
        assert!(matches!(err, ConvertError::ExternalEngineFailure { .. }));
        assert!(!config.output_dir.join("scan.las").exists());
        assert_eq!(std::fs::read_dir(&config.temp_dir).unwrap().count(), 0);
    }

    #[test]
    fn meshes_are_not_archived() {
        let (root, config, _) = setup();
        let source = root.path().join("model.obj");
        std::fs::write(&source, b"v 0 0 0").unwrap();
        let runner = ScriptedRunner::new(succeed);
        let progress = Progress::silent();
        let ctx = Context {
            config: &config,
            runner: &runner,
            progress: &progress,
        };
        assert!(matches!(
            to_copc(&ctx, &request(&source, ConversionType::LasToCopc)),
            Err(ConvertError::UnsupportedSourceFormat(_))
        ));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn mesh_sources_are_not_visualized() {
        let (root, config, _) = setup();
        let source = root.path().join("model.glb");
        std::fs::write(&source, b"glTF").unwrap();
        let runner = ScriptedRunner::new(succeed);
        let progress = Progress::silent();
        let ctx = Context {
            config: &config,
            runner: &runner,
            progress: &progress,
        };
        let err = e57_to_ply(&ctx, &request(&source, ConversionType::E57ToPly)).unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedSourceFormat(ref f) if f == "glb"));
        assert!(runner.calls().is_empty());
        assert!(!config.output_dir.join("model.ply").exists());
    }
}
