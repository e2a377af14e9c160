//! Pipeline stages and their JSON form, as consumed by `pdal pipeline`.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use coordinate_transformer::Matrix4;
use itertools::Itertools as _;
use serde_json::{json, Map, Value};
use spatial_core::SourceFormat;

use crate::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderKind {
    E57,
    Las,
    Ply,
}

impl ReaderKind {
    pub fn for_format(format: SourceFormat) -> Result<Self, PlanError> {
        match format {
            SourceFormat::E57 => Ok(Self::E57),
            SourceFormat::Las | SourceFormat::Laz => Ok(Self::Las),
            SourceFormat::Ply => Ok(Self::Ply),
            other => Err(PlanError::NoReader(other)),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::E57 => "readers.e57",
            Self::Las => "readers.las",
            Self::Ply => "readers.ply",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterKind {
    Las,
    Ply,
}

impl WriterKind {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Las => "writers.las",
            Self::Ply => "writers.ply",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Reader {
        kind: ReaderKind,
        filename: PathBuf,
    },
    /// Keeps every `step`-th point.
    Decimation {
        step: u64,
    },
    VoxelDownsample {
        cell_size: f64,
    },
    /// Row-major 4x4 matrix.
    AffineTransform {
        matrix: Matrix4,
    },
    /// Creates empty dimensions so later assignments have a target.
    FerryDimensions {
        dimensions: Vec<String>,
    },
    ColorAssign {
        expressions: Vec<String>,
    },
    Writer {
        kind: WriterKind,
        filename: PathBuf,
        /// Output dimensions; empty means the writer's default set.
        dims: Vec<String>,
        options: BTreeMap<String, Value>,
    },
}

impl Stage {
    pub fn type_name(&self) -> &'static str {
        match self {
            Stage::Reader { kind, .. } => kind.type_name(),
            Stage::Decimation { .. } => "filters.decimation",
            Stage::VoxelDownsample { .. } => "filters.voxeldownsize",
            Stage::AffineTransform { .. } => "filters.transformation",
            Stage::FerryDimensions { .. } => "filters.ferry",
            Stage::ColorAssign { .. } => "filters.assign",
            Stage::Writer { kind, .. } => kind.type_name(),
        }
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("type".to_string(), json!(self.type_name()));
        match self {
            Stage::Reader { filename, .. } => {
                object.insert("filename".to_string(), json!(filename.to_string_lossy()));
            }
            Stage::Decimation { step } => {
                object.insert("step".to_string(), json!(step));
            }
            Stage::VoxelDownsample { cell_size } => {
                object.insert("cell".to_string(), json!(cell_size));
                object.insert("mode".to_string(), json!("center"));
            }
            Stage::AffineTransform { matrix } => {
                object.insert("matrix".to_string(), json!(matrix_string(matrix)));
            }
            Stage::FerryDimensions { dimensions } => {
                let dimensions = dimensions.iter().map(|d| format!("=>{d}")).join(", ");
                object.insert("dimensions".to_string(), json!(dimensions));
            }
            Stage::ColorAssign { expressions } => {
                object.insert("value".to_string(), json!(expressions));
            }
            Stage::Writer {
                filename,
                dims,
                options,
                ..
            } => {
                object.insert("filename".to_string(), json!(filename.to_string_lossy()));
                if !dims.is_empty() {
                    object.insert("dims".to_string(), json!(dims.join(",")));
                }
                for (key, value) in options {
                    object.insert(key.clone(), value.clone());
                }
            }
        }
        Value::Object(object)
    }
}

/// Space-separated matrix values in row-major order.
pub fn matrix_string(matrix: &Matrix4) -> String {
    matrix.iter().join(" ")
}

/// An ordered, immutable list of stages.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSpec {
    stages: Vec<Stage>,
}

impl PipelineSpec {
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn reader(&self) -> Option<&Stage> {
        self.stages.first()
    }

    pub fn writer(&self) -> Option<&Stage> {
        self.stages.last()
    }

    pub fn output_path(&self) -> Option<&Path> {
        match self.writer() {
            Some(Stage::Writer { filename, .. }) => Some(filename.as_path()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "pipeline": self.stages.iter().map(Stage::to_json).collect::<Vec<_>>() })
    }

    pub fn to_json_string(&self) -> Result<String, PlanError> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), PlanError> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}

pub struct PipelineBuilder {
    stages: Vec<Stage>,
}

impl PipelineBuilder {
    pub fn new(format: SourceFormat, source: &Path) -> Result<Self, PlanError> {
        Ok(Self {
            stages: vec![Stage::Reader {
                kind: ReaderKind::for_format(format)?,
                filename: source.to_path_buf(),
            }],
        })
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.stages.extend(stages);
        self
    }

    pub fn writer(
        self,
        kind: WriterKind,
        output: &Path,
        dims: Vec<String>,
        options: BTreeMap<String, Value>,
    ) -> PipelineSpec {
        let mut stages = self.stages;
        stages.push(Stage::Writer {
            kind,
            filename: output.to_path_buf(),
            dims,
            options,
        });
        PipelineSpec { stages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinate_transformer::UP_AXIS_CORRECTION;

    #[test]
    fn up_axis_matrix_string() {
        assert_eq!(
            matrix_string(&UP_AXIS_CORRECTION),
            "1 0 0 0 0 0 1 0 0 -1 0 0 0 0 0 1"
        );
    }

    #[test]
    fn stage_json() {
        let voxel = Stage::VoxelDownsample { cell_size: 0.05 }.to_json();
        assert_eq!(voxel, json!({"type": "filters.voxeldownsize", "cell": 0.05, "mode": "center"}));

        let ferry = Stage::FerryDimensions {
            dimensions: vec!["Red".into(), "Green".into(), "Blue".into()],
        }
        .to_json();
        assert_eq!(ferry["dimensions"], "=>Red, =>Green, =>Blue");

        let decimation = Stage::Decimation { step: 3 }.to_json();
        assert_eq!(decimation, json!({"type": "filters.decimation", "step": 3}));
    }

    #[test]
    fn no_reader_for_meshes() {
        assert!(matches!(
            PipelineBuilder::new(SourceFormat::Obj, Path::new("a.obj")),
            Err(PlanError::NoReader(SourceFormat::Obj))
        ));
    }

    #[test]
    fn laz_uses_las_reader() {
        let spec = PipelineBuilder::new(SourceFormat::Laz, Path::new("in.laz"))
            .unwrap()
            .writer(WriterKind::Las, Path::new("out.las"), vec![], BTreeMap::new());
        let json = spec.to_json();
        assert_eq!(json["pipeline"][0]["type"], "readers.las");
        assert_eq!(json["pipeline"][0]["filename"], "in.laz");
        assert_eq!(json["pipeline"][1]["type"], "writers.las");
        assert_eq!(spec.output_path(), Some(Path::new("out.las")));
    }

    #[test]
    fn writes_pipeline_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let spec = PipelineBuilder::new(SourceFormat::E57, Path::new("scan.e57"))
            .unwrap()
            .stage(Stage::Decimation { step: 2 })
            .writer(WriterKind::Ply, Path::new("scan.ply"), vec!["X".into()], BTreeMap::new());
        spec.write_to(&path).unwrap();

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, spec.to_json());
        assert_eq!(written["pipeline"][2]["dims"], "X");
    }
}
