use std::{path::PathBuf, time::Duration};

use pcd_pipeline::PlannerSettings;

pub const OUTPUT_PATH_ENV: &str = "OUTPUT_PATH";
pub const TEMP_PATH_ENV: &str = "TEMP_PATH";

const DEFAULT_OUTPUT_PATH: &str = "/app/output";
const DEFAULT_TEMP_PATH: &str = "/app/temp";

#[derive(Debug, Clone, PartialEq)]
pub struct ConverterConfig {
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    /// Source inspection (`info --summary`, `--stats`).
    pub analysis_timeout: Duration,
    /// Inspection of a finished output.
    pub metadata_timeout: Duration,
    pub conversion_timeout: Duration,
    pub mesh_timeout: Duration,
    /// Secondary mesh engine and texture resizing.
    pub pack_timeout: Duration,
    pub target_point_count: u64,
    pub default_voxel_size: f64,
    pub compress_textures: bool,
    pub max_texture_size: u32,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        let planner = PlannerSettings::default();
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_PATH),
            temp_dir: PathBuf::from(DEFAULT_TEMP_PATH),
            analysis_timeout: Duration::from_secs(120),
            metadata_timeout: Duration::from_secs(60),
            conversion_timeout: Duration::from_secs(3600),
            mesh_timeout: Duration::from_secs(600),
            pack_timeout: Duration::from_secs(300),
            target_point_count: planner.target_point_count,
            default_voxel_size: planner.default_voxel_size,
            compress_textures: true,
            max_texture_size: 2048,
        }
    }
}

impl ConverterConfig {
    pub fn from_env() -> Self {
        let dir = |key: &str, default: &str| {
            std::env::var_os(key)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        Self {
            output_dir: dir(OUTPUT_PATH_ENV, DEFAULT_OUTPUT_PATH),
            temp_dir: dir(TEMP_PATH_ENV, DEFAULT_TEMP_PATH),
            ..Self::default()
        }
    }

    pub fn with_dirs(mut self, output_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn planner_settings(&self) -> PlannerSettings {
        PlannerSettings {
            target_point_count: self.target_point_count,
            default_voxel_size: self.default_voxel_size,
        }
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;
        std::fs::create_dir_all(&self.temp_dir)
    }
}
