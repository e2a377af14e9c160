//! Decides which stages a point-cloud conversion runs, and in what order:
//! reader, sampling, normalization, up-axis, color, writer.

use std::{collections::BTreeMap, path::Path};

use coordinate_transformer::{NormalizationPlan, UP_AXIS_CORRECTION};
use serde_json::{json, Value};
use spatial_core::{ColorProfile, CoordinateClassification, SourceFormat, SpatialProfile};

use crate::{
    stage::{PipelineBuilder, PipelineSpec, Stage, WriterKind},
    PlanError,
};

pub const TARGET_POINT_COUNT: u64 = 500_000;
pub const DEFAULT_VOXEL_SIZE: f64 = 0.05;

const POSITION_DIMS: [&str; 3] = ["X", "Y", "Z"];
const COLOR_DIMS: [&str; 3] = ["Red", "Green", "Blue"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerSettings {
    pub target_point_count: u64,
    pub default_voxel_size: f64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            target_point_count: TARGET_POINT_COUNT,
            default_voxel_size: DEFAULT_VOXEL_SIZE,
        }
    }
}

/// Number of points to skip between kept points so that at most
/// `target` remain.
pub fn decimation_step(point_count: u64, target: u64) -> u64 {
    point_count.div_ceil(target.max(1)).max(1)
}

/// Geographic data is decimated, never voxelized: a metric cell size is
/// meaningless in degrees.
pub fn choose_sampling(
    profile: &SpatialProfile,
    settings: &PlannerSettings,
    voxel_size: Option<f64>,
) -> Option<Stage> {
    let cell_size = voxel_size.unwrap_or(settings.default_voxel_size);
    let too_many = profile.point_count > settings.target_point_count;
    let stage = match profile.classification {
        c if c.is_geographic() && too_many => Some(Stage::Decimation {
            step: decimation_step(profile.point_count, settings.target_point_count),
        }),
        c if c.is_geographic() => None,
        CoordinateClassification::KoreaTm | CoordinateClassification::Projected => {
            Some(Stage::VoxelDownsample { cell_size })
        }
        _ if too_many => Some(Stage::Decimation {
            step: decimation_step(profile.point_count, settings.target_point_count),
        }),
        _ => Some(Stage::VoxelDownsample { cell_size }),
    };
    log::info!(
        "sampling: classification={} points={} stage={:?}",
        profile.classification,
        profile.point_count,
        stage
    );
    stage
}

/// Whether the Z-up to Y-up rotation is applied. Geographic frames are never
/// rotated, whatever the caller asks for.
pub fn wants_up_axis(profile: &SpatialProfile, transform_coords: Option<bool>) -> bool {
    if profile.is_geographic() {
        return false;
    }
    transform_coords.unwrap_or(profile.classification.needs_up_axis_correction())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorPolicy {
    /// 16-bit channels scaled down to 8 bits.
    Rescale16Bit,
    PassThrough,
    /// Synthesized from the normalized Z.
    HeightRamp,
    Flat,
}

impl ColorPolicy {
    pub fn choose(color: &ColorProfile, normalized: bool) -> Self {
        match (color.has_color, color.is_16bit, normalized) {
            (true, true, _) => Self::Rescale16Bit,
            (true, false, _) => Self::PassThrough,
            (false, _, true) => Self::HeightRamp,
            (false, _, false) => Self::Flat,
        }
    }

    pub fn expressions(&self) -> Vec<String> {
        let expressions: &[&str] = match self {
            Self::Rescale16Bit => &["Red = Red / 256", "Green = Green / 256", "Blue = Blue / 256"],
            Self::PassThrough => &[],
            Self::HeightRamp => &["Red = (Z + 50) * 2 + 55", "Green = 180", "Blue = (50 - Z) * 2 + 55"],
            Self::Flat => &["Red = 150", "Green = 180", "Blue = 210"],
        };
        expressions.iter().map(|e| e.to_string()).collect()
    }

    pub fn synthesizes(&self) -> bool {
        matches!(self, Self::HeightRamp | Self::Flat)
    }

    /// Stages that realize this policy. Synthesized channels are ferried in
    /// first so the assignment has dimensions to write to.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = Vec::new();
        if self.synthesizes() {
            stages.push(Stage::FerryDimensions {
                dimensions: COLOR_DIMS.iter().map(|d| d.to_string()).collect(),
            });
        }
        let expressions = self.expressions();
        if !expressions.is_empty() {
            stages.push(Stage::ColorAssign { expressions });
        }
        stages
    }
}

#[derive(Debug, Clone)]
pub struct VisualizationRequest<'a> {
    pub source: &'a Path,
    pub format: SourceFormat,
    pub output: &'a Path,
    pub profile: &'a SpatialProfile,
    pub color: ColorProfile,
    pub voxel_size: Option<f64>,
    pub transform_coords: Option<bool>,
}

/// Full viewer-oriented plan, written as little-endian PLY.
pub fn plan_visualization(
    request: &VisualizationRequest,
    settings: &PlannerSettings,
) -> Result<PipelineSpec, PlanError> {
    let profile = request.profile;
    let mut builder = PipelineBuilder::new(request.format, request.source)?;

    if let Some(sampling) = choose_sampling(profile, settings, request.voxel_size) {
        builder = builder.stage(sampling);
    }

    let normalization = NormalizationPlan::for_profile(profile);
    if let Some(plan) = &normalization {
        builder = builder.stage(Stage::AffineTransform {
            matrix: plan.matrix(),
        });
    }

    if wants_up_axis(profile, request.transform_coords) {
        log::info!("applying Z-up to Y-up rotation");
        builder = builder.stage(Stage::AffineTransform {
            matrix: UP_AXIS_CORRECTION,
        });
    }

    let policy = ColorPolicy::choose(&request.color, normalization.is_some());
    log::info!("color policy: {policy:?}");
    builder = builder.stages(policy.stages());

    let mut dims: Vec<String> = POSITION_DIMS.iter().map(|d| d.to_string()).collect();
    if request.color.has_color || policy.synthesizes() {
        dims.extend(COLOR_DIMS.iter().map(|d| d.to_string()));
    }

    let mut options = BTreeMap::new();
    options.insert("storage_mode".to_string(), json!("little endian"));

    Ok(builder.writer(WriterKind::Ply, request.output, dims, options))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Uncompressed LAS 1.4.
    Las,
    /// LASzip-compressed, every dimension forwarded.
    Laz,
}

/// Format change only; geometry is never altered.
pub fn plan_archival(
    format: SourceFormat,
    source: &Path,
    output: &Path,
    kind: ArchiveKind,
) -> Result<PipelineSpec, PlanError> {
    let mut options: BTreeMap<String, Value> = BTreeMap::new();
    match kind {
        ArchiveKind::Las => {
            options.insert("compression".to_string(), json!("none"));
            options.insert("minor_version".to_string(), json!(4));
        }
        ArchiveKind::Laz => {
            options.insert("compression".to_string(), json!("laszip"));
            options.insert("forward".to_string(), json!("all"));
        }
    }
    Ok(PipelineBuilder::new(format, source)?.writer(WriterKind::Las, output, vec![], options))
}
