//! Point-cloud tiling, directly or through an intermediate LAS.

use std::path::Path;

use pcd_pipeline::ToolInvocation;
use spatial_core::{ConversionType, SourceFormat};

use crate::{
    analysis::{describe, resolve_format, Analyzer, EngineInput},
    artifact::PartialArtifact,
    exec::run_checked,
    orchestrator::{ConversionRequest, Context},
    pointcloud, ConversionResult, ConvertError, ConverterConfig,
};

const TILESET_FORMAT: &str = "3dtiles_pointcloud";

fn tile(
    ctx: &Context,
    input: &Path,
    stem: &str,
    epsg: Option<u32>,
) -> Result<ConversionResult, ConvertError> {
    // The tiler refuses to write into an existing directory.
    let out_dir = PartialArtifact::new(ctx.config.output_dir.join(format!("{stem}_3dtiles")));
    let invocation = ToolInvocation::py3dtiles(input, out_dir.path(), epsg, ctx.config.conversion_timeout);
    ctx.progress.report(10);
    run_checked(ctx.runner, &invocation)?;
    ctx.progress.report(90);

    let tileset_path = invocation
        .output
        .clone()
        .unwrap_or_else(|| out_dir.path().join(tileset_exporter::tileset::TILESET_FILE_NAME));
    Ok(ConversionResult::succeeded(out_dir.keep())
        .with_metadata("tileset_path", tileset_path.to_string_lossy())
        .with_metadata("format", TILESET_FORMAT))
}

fn stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pointcloud".to_string())
}

/// Single hop through the tiling engine.
pub(crate) fn las_to_3dtiles(
    ctx: &Context,
    request: &ConversionRequest,
) -> Result<ConversionResult, ConvertError> {
    let format = resolve_format(&request.source, &request.options, request.conversion_type)?;
    if !matches!(format, SourceFormat::Las | SourceFormat::Laz) {
        return Err(ConvertError::UnsupportedSourceFormat(format.to_string()));
    }
    let analysis = Analyzer {
        runner: ctx.runner,
        config: ctx.config,
    }
    .point_cloud(&request.source, format);
    ctx.progress.report(10);

    let input = EngineInput::prepare(&request.source, format, &ctx.config.temp_dir)?;
    let tiling = ctx.progress.sub_range(10, 100);
    let result = tile(
        &Context {
            progress: &tiling,
            ..*ctx
        },
        input.path(),
        &stem(&request.source),
        request.options.epsg,
    )?;
    Ok(result.with_spatial_info(&describe(&analysis.profile, request.options.epsg, false)))
}

/// E57 to LAS in a scratch directory, then LAS to tiles. The LAS is
/// discarded; its spatial summary is carried into the final result.
pub(crate) fn e57_to_3dtiles(
    ctx: &Context,
    request: &ConversionRequest,
) -> Result<ConversionResult, ConvertError> {
    std::fs::create_dir_all(&ctx.config.temp_dir)?;
    let hop_dir = tempfile::Builder::new()
        .prefix("multihop_")
        .tempdir_in(&ctx.config.temp_dir)?;
    log::info!("intermediate directory: {:?}", hop_dir.path());

    let hop_config = ConverterConfig {
        output_dir: hop_dir.path().to_path_buf(),
        ..ctx.config.clone()
    };
    let first_progress = ctx.progress.sub_range(0, 50);
    let first = pointcloud::e57_to_las(
        &Context {
            config: &hop_config,
            runner: ctx.runner,
            progress: &first_progress,
        },
        &ConversionRequest {
            conversion_type: ConversionType::E57ToLas,
            ..request.clone()
        },
    )?;
    let las = first
        .output_path
        .clone()
        .ok_or_else(|| ConvertError::Internal("intermediate LAS has no path".to_string()))?;

    let second_progress = ctx.progress.sub_range(50, 100);
    let mut result = tile(
        &Context {
            progress: &second_progress,
            ..*ctx
        },
        &las,
        &stem(&request.source),
        request.options.epsg,
    )?;

    if let Some(info) = first.spatial_info() {
        result = result.with_spatial_info(&info);
    }
    log::info!("removing intermediate directory: {:?}", hop_dir.path());
    Ok(result)
}
