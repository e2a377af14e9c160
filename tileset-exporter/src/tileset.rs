//! Single-tile 3D Tiles descriptors.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use spatial_core::BoundingVolume;

pub const TILESET_FILE_NAME: &str = "tileset.json";

const ROOT_GEOMETRIC_ERROR: f64 = 500.0;
const TILE_GEOMETRIC_ERROR: f64 = 100.0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tileset_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extras: Option<Value>,
}

impl Default for Asset {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            tileset_version: Some("1.0.0".to_string()),
            extras: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub enum Refine {
    #[default]
    #[serde(rename = "ADD")]
    Add,
    #[serde(rename = "REPLACE")]
    Replace,
}

/// Exactly one of `box` or `region` is set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct TileBoundingVolume {
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub bx: Option<[f64; 12]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<[f64; 6]>,
}

impl From<BoundingVolume> for TileBoundingVolume {
    fn from(volume: BoundingVolume) -> Self {
        match volume {
            BoundingVolume::Box { center, half_axes } => {
                let [x, y, z] = half_axes;
                Self {
                    bx: Some([
                        center[0], center[1], center[2], //
                        x[0], x[1], x[2], //
                        y[0], y[1], y[2], //
                        z[0], z[1], z[2],
                    ]),
                    region: None,
                }
            }
            BoundingVolume::Region {
                west,
                south,
                east,
                north,
                min_height,
                max_height,
            } => Self {
                bx: None,
                region: Some([west, south, east, north, min_height, max_height]),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Content {
    pub uri: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub bounding_volume: TileBoundingVolume,
    pub geometric_error: f64,
    pub refine: Refine,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    /// Column-major placement matrix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform: Option<[f64; 16]>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tileset {
    pub asset: Asset,
    pub geometric_error: f64,
    pub root: Tile,
}

impl Tileset {
    /// One root tile holding `uri`, refined additively.
    pub fn single(uri: &str, volume: BoundingVolume) -> Self {
        Self {
            asset: Asset::default(),
            geometric_error: ROOT_GEOMETRIC_ERROR,
            root: Tile {
                bounding_volume: volume.into(),
                geometric_error: TILE_GEOMETRIC_ERROR,
                refine: Refine::Add,
                content: Some(Content {
                    uri: uri.to_string(),
                }),
                transform: None,
            },
        }
    }

    pub fn with_transform(mut self, transform: [f64; 16]) -> Self {
        self.root.transform = Some(transform);
        self
    }

    pub fn with_extras(mut self, extras: Value) -> Self {
        self.asset.extras = Some(extras);
        self
    }
}

/// Writes `tileset.json` into `dir` and returns its path.
pub fn write_tileset(dir: &Path, tileset: &Tileset) -> std::io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(TILESET_FILE_NAME);
    log::info!("write tileset.json: {:?}", path);
    fs::write(&path, serde_json::to_string_pretty(tileset)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use spatial_core::volume::WORLD_REGION;

    #[test]
    fn box_tileset_json() {
        let volume = BoundingVolume::aligned_box([0.0, 0.0, 0.0], [100.0, 100.0, 100.0]);
        let tileset = Tileset::single("model.glb", volume);
        let json = serde_json::to_value(&tileset).unwrap();
        assert_eq!(
            json,
            json!({
                "asset": {"version": "1.0", "tilesetVersion": "1.0.0"},
                "geometricError": 500.0,
                "root": {
                    "boundingVolume": {
                        "box": [0.0, 0.0, 0.0, 100.0, 0.0, 0.0, 0.0, 100.0, 0.0, 0.0, 0.0, 100.0]
                    },
                    "geometricError": 100.0,
                    "refine": "ADD",
                    "content": {"uri": "model.glb"}
                }
            })
        );
    }

    #[test]
    fn region_transform_and_extras() {
        let mut transform = [0.0; 16];
        transform[15] = 1.0;
        let tileset = Tileset::single("model.obj", WORLD_REGION)
            .with_transform(transform)
            .with_extras(json!({"format": "obj"}));
        let json = serde_json::to_value(&tileset).unwrap();

        assert_eq!(json["asset"]["extras"]["format"], "obj");
        assert_eq!(json["root"]["transform"].as_array().unwrap().len(), 16);
        let region = json["root"]["boundingVolume"]["region"].as_array().unwrap();
        assert_eq!(region[0], -std::f64::consts::PI);
        assert_eq!(region[5], 1000.0);
        assert!(json["root"]["boundingVolume"].get("box").is_none());
    }

    #[test]
    fn writes_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("model_3dtiles");
        let tileset = Tileset::single("model.glb", WORLD_REGION);
        let path = write_tileset(&out, &tileset).unwrap();
        assert_eq!(path, out.join("tileset.json"));

        let read: Tileset = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, tileset);
    }
}
