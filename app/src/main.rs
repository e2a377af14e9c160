use std::{
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Builder;
use glob::glob;
use log::LevelFilter;
use serde_json::{json, Map, Value};
use thiserror::Error;

use converter::{
    describe, ConversionOptions, ConversionRequest, Converter, ConverterConfig, JobRegistry, JobState,
};
use coordinate_transformer::classify;
use pcd_pipeline::{
    planner::{plan_archival, plan_visualization, ArchiveKind},
    PlannerSettings, VisualizationRequest,
};
use spatial_core::{BoundingBox, ColorProfile, ConversionType, SourceFormat};
use spatial_parser::mesh;

#[derive(Parser, Debug)]
#[command(
    name = "sconv",
    about = "Plans and runs conversions of point clouds and meshes for web viewers",
    version
)]
struct Cli {
    #[arg(long, env = "OUTPUT_PATH", default_value = "/app/output", global = true, value_name = "DIR")]
    output: PathBuf,

    #[arg(long, env = "TEMP_PATH", default_value = "/app/temp", global = true, value_name = "DIR")]
    temp: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one conversion and print its final status as JSON
    Convert(ConvertArgs),
    /// Print the point-cloud pipeline for a described source, without running it
    Plan(PlanArgs),
    /// Classify the coordinate frame of a bounding box
    Classify(BboxArgs),
    /// Read the vertex extent of a mesh file
    Inspect {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    #[arg(short = 't', long = "type", value_name = "CONVERSION_TYPE")]
    conversion_type: ConversionType,

    /// Identifier used in the job id; defaults to the input file stem
    #[arg(long)]
    file_id: Option<String>,

    /// Conversion option as key=value; JSON values are accepted
    #[arg(short = 'O', long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Side files (MTL, textures, buffers); glob patterns are expanded.
    /// Discovered next to the input when omitted.
    #[arg(short, long = "sibling", value_name = "FILE")]
    siblings: Vec<String>,
}

#[derive(Args, Debug)]
struct BboxArgs {
    /// minx,miny,minz,maxx,maxy,maxz
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
    bbox: Vec<f64>,

    #[arg(long, default_value_t = 0)]
    points: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Archive {
    Las,
    Laz,
}

#[derive(Args, Debug)]
struct PlanArgs {
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Source format when the input has no usable extension
    #[arg(long)]
    format: Option<String>,

    #[command(flatten)]
    bounds: BboxArgs,

    #[arg(long)]
    color: bool,

    #[arg(long, requires = "color")]
    color_16bit: bool,

    #[arg(long)]
    voxel_size: Option<f64>,

    #[arg(long)]
    transform_coords: Option<bool>,

    /// Plan an archival copy instead of a viewer PLY
    #[arg(long, value_enum)]
    archive: Option<Archive>,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("expected 6 bbox values, got {0}")]
    BboxLength(usize),
    #[error("invalid option {0:?}, expected KEY=VALUE")]
    Option(String),
    #[error("unknown source format for {0:?}")]
    Format(PathBuf),
    #[error("invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),
    #[error(transparent)]
    Parse(#[from] spatial_parser::ParseError),
    #[error(transparent)]
    Plan(#[from] pcd_pipeline::PlanError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("conversion failed: {0}")]
    Conversion(String),
}

fn bounding_box(values: &[f64]) -> Result<BoundingBox, CliError> {
    let extents: [f64; 6] = values
        .try_into()
        .map_err(|_| CliError::BboxLength(values.len()))?;
    Ok(BoundingBox::from_extents(extents))
}

fn parse_options(pairs: &[String]) -> Result<ConversionOptions, CliError> {
    let mut map = Map::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| CliError::Option(pair.clone()))?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        map.insert(key.trim().to_string(), value);
    }
    Ok(ConversionOptions::from_map(&map))
}

fn expand_globs(patterns: &[String]) -> Result<Vec<PathBuf>, CliError> {
    let mut paths = Vec::new();
    for pattern in patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            for entry in glob(pattern)? {
                match entry {
                    Ok(path) => paths.push(path),
                    Err(e) => log::warn!("skipping unreadable path: {e}"),
                }
            }
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }
    Ok(paths)
}

/// Side files that usually travel with a mesh, looked up next to it.
fn discover_siblings(input: &Path, conversion_type: ConversionType) -> Result<Vec<PathBuf>, CliError> {
    let extensions: &[&str] = match conversion_type {
        ConversionType::ObjTo3dtiles => &["mtl", "jpg", "jpeg", "png", "tif", "tiff", "bmp"],
        ConversionType::GltfTo3dtiles => &["bin", "jpg", "jpeg", "png", "webp", "ktx2"],
        _ => return Ok(Vec::new()),
    };
    let dir = input.parent().unwrap_or_else(|| Path::new("."));
    let dir = glob::Pattern::escape(&dir.to_string_lossy());
    let patterns: Vec<String> = extensions.iter().map(|ext| format!("{dir}/*.{ext}")).collect();
    let mut siblings = expand_globs(&patterns)?;
    siblings.retain(|p| p != input);
    siblings.sort();
    siblings.dedup();
    Ok(siblings)
}

fn convert(config: ConverterConfig, args: ConvertArgs) -> Result<Value, CliError> {
    let options = parse_options(&args.options)?;
    let siblings = if args.siblings.is_empty() {
        discover_siblings(&args.input, args.conversion_type)?
    } else {
        expand_globs(&args.siblings)?
    };
    log::info!("side files: {:?}", siblings);

    let file_id = args.file_id.unwrap_or_else(|| {
        args.input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string())
    });
    let request = ConversionRequest::new(&args.input, args.conversion_type)
        .with_options(options)
        .with_siblings(siblings);

    let registry = JobRegistry::new(Arc::new(Converter::with_system_runner(config)));
    let submission = registry.submit(&file_id, request);
    log::info!("submitted job {}", submission.status.job_id);
    if let Some(worker) = submission.worker {
        worker
            .join()
            .map_err(|_| CliError::Conversion("worker thread panicked".to_string()))?;
    }

    let status = registry
        .get(&submission.status.job_id)
        .ok_or_else(|| CliError::Conversion("job disappeared".to_string()))?;
    let failed = status.status == JobState::Failed;
    let error = status.error.clone().unwrap_or_default();
    let value = serde_json::to_value(status)?;
    if failed {
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Err(CliError::Conversion(error));
    }
    Ok(value)
}

fn plan(config: &ConverterConfig, args: PlanArgs) -> Result<Value, CliError> {
    let format = match &args.format {
        Some(format) => SourceFormat::from_extension(format),
        None => SourceFormat::from_path(&args.input),
    }
    .ok_or_else(|| CliError::Format(args.input.clone()))?;
    let profile = classify(Some(bounding_box(&args.bounds.bbox)?), args.bounds.points);
    let stem = args
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let plan = match args.archive {
        Some(archive) => {
            let (kind, extension) = match archive {
                Archive::Las => (ArchiveKind::Las, "las"),
                Archive::Laz => (ArchiveKind::Laz, "laz"),
            };
            let output = config.output_dir.join(format!("{stem}.{extension}"));
            plan_archival(format, &args.input, &output, kind)?
        }
        None => {
            let color = match (args.color, args.color_16bit) {
                (true, true) => ColorProfile::rgb16(),
                (true, false) => ColorProfile::rgb8(),
                _ => ColorProfile::none(),
            };
            let output = config.output_dir.join(format!("{stem}.ply"));
            let settings = PlannerSettings {
                target_point_count: config.target_point_count,
                default_voxel_size: config.default_voxel_size,
            };
            plan_visualization(
                &VisualizationRequest {
                    source: &args.input,
                    format,
                    output: &output,
                    profile: &profile,
                    color,
                    voxel_size: args.voxel_size,
                    transform_coords: args.transform_coords,
                },
                &settings,
            )?
        }
    };
    Ok(plan.to_json())
}

fn classify_bbox(args: &BboxArgs) -> Result<Value, CliError> {
    let profile = classify(Some(bounding_box(&args.bbox)?), args.points);
    Ok(json!({
        "profile": profile,
        "spatial_info": describe(&profile, None, false),
    }))
}

fn inspect(input: &Path) -> Result<Value, CliError> {
    let format = SourceFormat::from_path(input)
        .filter(SourceFormat::is_mesh)
        .ok_or_else(|| CliError::Format(input.to_path_buf()))?;
    let summary = mesh::extract(input, format)?;
    let profile = classify(summary.bbox, summary.vertex_count);
    Ok(json!({
        "format": format,
        "vertex_count": summary.vertex_count,
        "spatial_info": describe(&profile, None, true),
    }))
}

fn run(cli: Cli) -> Result<Value, CliError> {
    let config = ConverterConfig::default().with_dirs(cli.output, cli.temp);
    log::info!("output folder: {:?}", config.output_dir);
    log::info!("temp folder: {:?}", config.temp_dir);
    match cli.command {
        Command::Convert(args) => convert(config, args),
        Command::Plan(args) => plan(&config, args),
        Command::Classify(args) => classify_bbox(&args),
        Command::Inspect { input } => inspect(&input),
    }
}

fn main() -> ExitCode {
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        .parse_default_env()
        .init();

    let start = std::time::Instant::now();
    let outcome = run(Cli::parse()).and_then(|value| Ok(serde_json::to_string_pretty(&value)?));
    log::info!("Elapsed: {:?}", start.elapsed());
    match outcome {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
