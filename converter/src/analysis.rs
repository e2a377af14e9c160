//! Read-only inspection of a source before planning.

use std::path::{Path, PathBuf};

use coordinate_transformer::{classify, korea_tm};
use pcd_pipeline::ToolInvocation;
use serde_json::Value;
use spatial_core::{
    ColorProfile, ConversionType, CoordinateClassification, SourceFormat, SpatialInfo,
    SpatialProfile,
};
use spatial_parser::{color, las_header, mesh, summary};
use tempfile::TempDir;

use crate::{
    exec::{run_checked, ProcessRunner},
    ConversionOptions, ConvertError, ConverterConfig,
};

/// Points read from a LAS file when probing color depth natively.
const LAS_COLOR_SAMPLE: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceAnalysis {
    pub profile: SpatialProfile,
    pub color: ColorProfile,
    /// Raw engine summary, when the engine produced one.
    pub engine_summary: Option<Value>,
}

impl SourceAnalysis {
    fn unknown() -> Self {
        Self {
            profile: SpatialProfile::unknown(),
            color: ColorProfile::none(),
            engine_summary: None,
        }
    }
}

/// Extension first, then the `original_format` option, then the natural
/// input of the conversion type.
pub(crate) fn resolve_format(
    source: &Path,
    options: &ConversionOptions,
    conversion_type: ConversionType,
) -> Result<SourceFormat, ConvertError> {
    if source.extension().is_some() {
        return SourceFormat::from_path(source).ok_or_else(|| {
            ConvertError::UnsupportedSourceFormat(source.to_string_lossy().into_owned())
        });
    }
    if let Some(format) = &options.original_format {
        log::info!("using original format: {format}");
        return SourceFormat::from_extension(format)
            .ok_or_else(|| ConvertError::UnsupportedSourceFormat(format.clone()));
    }
    Ok(conversion_type.natural_source())
}

/// A source path usable by engines that dispatch on the file extension.
/// Extension-less sources are linked under a temporary name that is removed
/// when this value is dropped.
pub(crate) struct EngineInput {
    path: PathBuf,
    _link_dir: Option<TempDir>,
}

impl EngineInput {
    pub(crate) fn prepare(
        source: &Path,
        format: SourceFormat,
        temp_dir: &Path,
    ) -> Result<Self, ConvertError> {
        if source.extension().is_some() {
            return Ok(Self {
                path: source.to_path_buf(),
                _link_dir: None,
            });
        }
        std::fs::create_dir_all(temp_dir)?;
        let link_dir = tempfile::Builder::new()
            .prefix("detect_")
            .tempdir_in(temp_dir)?;
        let stem = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());
        let link = link_dir.path().join(format!("{stem}.{}", format.extension()));
        link_source(source, &link)?;
        log::info!("created temporary link: {:?} -> {:?}", link, source);
        Ok(Self {
            path: link,
            _link_dir: Some(link_dir),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn link_source(source: &Path, link: &Path) -> std::io::Result<()> {
    let target = std::fs::canonicalize(source)?;
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn link_source(source: &Path, link: &Path) -> std::io::Result<()> {
    std::fs::copy(source, link).map(|_| ())
}

pub(crate) struct Analyzer<'a> {
    pub(crate) runner: &'a dyn ProcessRunner,
    pub(crate) config: &'a ConverterConfig,
}

impl Analyzer<'_> {
    /// Never fails: a source that cannot be inspected yields an unknown
    /// profile, which downstream planning treats conservatively.
    pub(crate) fn point_cloud(&self, source: &Path, format: SourceFormat) -> SourceAnalysis {
        match self.with_engine(source, format) {
            Ok(analysis) => return analysis,
            Err(e) => log::warn!("coordinate detection failed: {e}"),
        }

        if matches!(format, SourceFormat::Las | SourceFormat::Laz) {
            match las_header::analyze(source, LAS_COLOR_SAMPLE) {
                Ok(las) => {
                    return SourceAnalysis {
                        profile: classify(Some(las.bbox), las.point_count),
                        color: las.color,
                        engine_summary: None,
                    }
                }
                Err(e) => log::warn!("native LAS analysis failed: {e}"),
            }
        }
        SourceAnalysis::unknown()
    }

    fn with_engine(&self, source: &Path, format: SourceFormat) -> Result<SourceAnalysis, ConvertError> {
        let input = EngineInput::prepare(source, format, &self.config.temp_dir)?;
        let output = run_checked(
            self.runner,
            &ToolInvocation::pdal_summary(input.path(), self.config.analysis_timeout),
        )?;
        let summary = summary::parse_summary(&output.stdout)?;
        let profile = classify(summary.bbox, summary.point_count);
        let color = self.color_profile(input.path(), &summary.dimensions);
        Ok(SourceAnalysis {
            profile,
            color,
            engine_summary: Some(summary.raw),
        })
    }

    /// Channels whose depth cannot be sampled are assumed to be 16-bit.
    fn color_profile(&self, input: &Path, dimensions: &[String]) -> ColorProfile {
        if !color::has_rgb_channels(dimensions) {
            log::info!("no RGB channels in source");
            return ColorProfile::none();
        }
        let stats = ToolInvocation::pdal_stats(input, &color::COLOR_CHANNELS, self.config.analysis_timeout);
        let maxima = run_checked(self.runner, &stats)
            .map_err(|e| e.to_string())
            .and_then(|out| summary::parse_channel_maxima(&out.stdout).map_err(|e| e.to_string()));
        match maxima {
            Ok(maxima) if !maxima.is_empty() => color::inspect(dimensions, &maxima),
            Ok(_) | Err(_) => {
                log::warn!("color statistics unavailable, assuming 16-bit channels");
                ColorProfile::rgb16()
            }
        }
    }

    pub(crate) fn mesh(&self, source: &Path, format: SourceFormat) -> SpatialProfile {
        match mesh::extract(source, format) {
            Ok(summary) => classify(summary.bbox, summary.vertex_count),
            Err(e) => {
                log::warn!("mesh extent extraction failed: {e}");
                SpatialProfile::unknown()
            }
        }
    }
}

/// Summary attached to results. Projected Korean data also gets an
/// approximate WGS84 center for display.
pub fn describe(profile: &SpatialProfile, epsg: Option<u32>, is_mesh: bool) -> SpatialInfo {
    let mut info = if is_mesh {
        SpatialInfo::for_mesh(profile, epsg)
    } else {
        SpatialInfo::from_profile(profile, epsg)
    };
    info.center_wgs84 = match (profile.classification, profile.usable_bbox()) {
        (CoordinateClassification::KoreaTm, Some(bbox)) => {
            let [x, y, _] = bbox.center();
            let (lon, lat) = korea_tm::to_wgs84_approx(x, y);
            Some([lon, lat])
        }
        (CoordinateClassification::Geographic, Some(bbox)) => {
            let [lon, lat, _] = bbox.center();
            Some([lon, lat])
        }
        _ => None,
    };
    info
}
