use std::{path::Path, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionType {
    E57ToPly,
    E57ToLas,
    LasToCopc,
    LazToCopc,
    PlyToCopc,
    // snake_case would not split before the digit.
    #[serde(rename = "obj_to_3dtiles")]
    ObjTo3dtiles,
    #[serde(rename = "gltf_to_3dtiles")]
    GltfTo3dtiles,
    #[serde(rename = "glb_to_3dtiles")]
    GlbTo3dtiles,
    #[serde(rename = "e57_to_3dtiles")]
    E57To3dtiles,
    #[serde(rename = "las_to_3dtiles")]
    LasTo3dtiles,
}

impl ConversionType {
    pub const ALL: [ConversionType; 10] = [
        Self::E57ToPly,
        Self::E57ToLas,
        Self::LasToCopc,
        Self::LazToCopc,
        Self::PlyToCopc,
        Self::ObjTo3dtiles,
        Self::GltfTo3dtiles,
        Self::GlbTo3dtiles,
        Self::E57To3dtiles,
        Self::LasTo3dtiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E57ToPly => "e57_to_ply",
            Self::E57ToLas => "e57_to_las",
            Self::LasToCopc => "las_to_copc",
            Self::LazToCopc => "laz_to_copc",
            Self::PlyToCopc => "ply_to_copc",
            Self::ObjTo3dtiles => "obj_to_3dtiles",
            Self::GltfTo3dtiles => "gltf_to_3dtiles",
            Self::GlbTo3dtiles => "glb_to_3dtiles",
            Self::E57To3dtiles => "e57_to_3dtiles",
            Self::LasTo3dtiles => "las_to_3dtiles",
        }
    }

    /// Format assumed for a source that carries no extension and no hint.
    pub fn natural_source(&self) -> SourceFormat {
        match self {
            Self::E57ToPly | Self::E57ToLas | Self::E57To3dtiles => SourceFormat::E57,
            Self::LasToCopc | Self::LasTo3dtiles => SourceFormat::Las,
            Self::LazToCopc => SourceFormat::Laz,
            Self::PlyToCopc => SourceFormat::Ply,
            Self::ObjTo3dtiles => SourceFormat::Obj,
            Self::GltfTo3dtiles => SourceFormat::Gltf,
            Self::GlbTo3dtiles => SourceFormat::Glb,
        }
    }
}

impl std::fmt::Display for ConversionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported conversion type: {0}")]
pub struct ParseConversionTypeError(pub String);

impl FromStr for ConversionType {
    type Err = ParseConversionTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ParseConversionTypeError(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    E57,
    Las,
    Laz,
    Ply,
    Obj,
    Gltf,
    Glb,
}

impl SourceFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_lowercase().as_str() {
            "e57" => Some(Self::E57),
            "las" => Some(Self::Las),
            "laz" => Some(Self::Laz),
            "ply" => Some(Self::Ply),
            "obj" => Some(Self::Obj),
            "gltf" => Some(Self::Gltf),
            "glb" => Some(Self::Glb),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::E57 => "e57",
            Self::Las => "las",
            Self::Laz => "laz",
            Self::Ply => "ply",
            Self::Obj => "obj",
            Self::Gltf => "gltf",
            Self::Glb => "glb",
        }
    }

    pub fn is_point_cloud(&self) -> bool {
        matches!(self, Self::E57 | Self::Las | Self::Laz | Self::Ply)
    }

    pub fn is_mesh(&self) -> bool {
        matches!(self, Self::Obj | Self::Gltf | Self::Glb | Self::Ply)
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}
