use spatial_core::{BoundingVolume, CoordinateClassification, SpatialProfile};

use crate::{
    geodesy::{geodetic_to_ecef, EnuBasis},
    TransformError,
};

// Coarse meters-per-degree used for sizing bounding volumes only.
const METERS_PER_DEGREE: f64 = 111_000.0;
const MIN_HALF_AXIS: f64 = 10.0;

/// Placement of a mesh tile whose vertices are centered on the origin.
///
/// Local mesh axes are (East, Up, South): the mesh is authored Z-up and
/// converted to Y-up on export, so the rotation columns are
/// `(east, up, -north)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileTransform {
    pub ecef_translation: [f64; 3],
    pub rotation_columns: [[f64; 3]; 3],
}

impl TileTransform {
    pub fn at(lon: f64, lat: f64, height: f64) -> Self {
        let basis = EnuBasis::at(lon, lat);
        let south = basis.north.map(|v| -v);
        Self {
            ecef_translation: geodetic_to_ecef(lon, lat, height),
            rotation_columns: [basis.east, basis.up, south],
        }
    }

    /// 16 values, column-major, as tileset descriptors expect.
    pub fn to_column_major(&self) -> [f64; 16] {
        let [c0, c1, c2] = self.rotation_columns;
        let t = self.ecef_translation;
        [
            c0[0], c0[1], c0[2], 0.0, //
            c1[0], c1[1], c1[2], 0.0, //
            c2[0], c2[1], c2[2], 0.0, //
            t[0], t[1], t[2], 1.0,
        ]
    }
}

/// Transform and local bounding box for a georeferenced mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshPlacement {
    pub center_lon: f64,
    pub center_lat: f64,
    pub height: f64,
    pub transform: TileTransform,
    pub bounding_volume: BoundingVolume,
}

impl MeshPlacement {
    /// `profile` describes the mesh in lon/lat/alt before localization.
    pub fn from_profile(profile: &SpatialProfile) -> Result<Self, TransformError> {
        if profile.classification != CoordinateClassification::Geographic {
            return Err(TransformError::NotGeographic(profile.classification));
        }
        let bbox = profile.usable_bbox().ok_or(TransformError::InvalidBounds)?;
        let [lon, lat, _] = bbox.center();
        let [lon_range, lat_range, height_range] = bbox.ranges();

        // Lift by half the vertical extent so the floor, not the center,
        // sits on the ellipsoid.
        let height = height_range / 2.0;
        let transform = TileTransform::at(lon, lat, height);

        let east_half = (lon_range * METERS_PER_DEGREE * lat.to_radians().cos() / 2.0).max(MIN_HALF_AXIS);
        let south_half = (lat_range * METERS_PER_DEGREE / 2.0).max(MIN_HALF_AXIS);
        let up_half = (height_range / 2.0).max(MIN_HALF_AXIS);

        log::info!(
            "mesh placement: center=({lon}, {lat}) height={height} half_axes=({east_half}, {up_half}, {south_half})"
        );

        Ok(Self {
            center_lon: lon,
            center_lat: lat,
            height,
            transform,
            // Local axes are (east, up, south).
            bounding_volume: BoundingVolume::aligned_box(
                [0.0, 0.0, 0.0],
                [east_half, up_half, south_half],
            ),
        })
    }
}
