use spatial_core::{BoundingBox, CoordinateClassification, SpatialProfile};

use crate::{geodesy::WGS84_SEMI_MAJOR_AXIS, TransformError};

/// 4x4 matrix, row-major.
pub type Matrix4 = [f64; 16];

/// Half the edge of the cube every normalized axis is mapped into.
pub const NORMALIZED_HALF_EXTENT: f64 = 50.0;

const MIN_NORMALIZATION_RANGE: f64 = 1e-10;

/// Z-up to Y-up: X' = X, Y' = Z, Z' = -Y.
pub const UP_AXIS_CORRECTION: Matrix4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, -1.0, 0.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

pub const IDENTITY: Matrix4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Per-axis scale and translation that maps a bounding box onto a
/// `±NORMALIZED_HALF_EXTENT` cube.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationPlan {
    pub center: [f64; 3],
    pub scale: [f64; 3],
}

impl NormalizationPlan {
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        let ranges = bbox.ranges();
        let full_extent = NORMALIZED_HALF_EXTENT * 2.0;
        let scale = [
            full_extent / ranges[0].max(MIN_NORMALIZATION_RANGE),
            full_extent / ranges[1].max(MIN_NORMALIZATION_RANGE),
            full_extent / ranges[2].max(MIN_NORMALIZATION_RANGE),
        ];
        Self {
            center: bbox.center(),
            scale,
        }
    }

    /// Returns a plan only for valid bounds in a frame that needs one.
    pub fn for_profile(profile: &SpatialProfile) -> Option<Self> {
        if !profile.classification.needs_normalization() {
            return None;
        }
        let bbox = profile.usable_bbox()?;
        let plan = Self::from_bbox(bbox);
        log::info!(
            "normalizing coordinates: center={:?} scale={:?}",
            plan.center,
            plan.scale
        );
        Some(plan)
    }

    /// Scale-then-translate as one affine.
    pub fn matrix(&self) -> Matrix4 {
        let [cx, cy, cz] = self.center;
        let [sx, sy, sz] = self.scale;
        [
            sx, 0.0, 0.0, -cx * sx, //
            0.0, sy, 0.0, -cy * sy, //
            0.0, 0.0, sz, -cz * sz, //
            0.0, 0.0, 0.0, 1.0,
        ]
    }

    pub fn apply(&self, point: [f64; 3]) -> [f64; 3] {
        transform_point(&self.matrix(), point)
    }
}

pub fn transform_point(matrix: &Matrix4, point: [f64; 3]) -> [f64; 3] {
    let [x, y, z] = point;
    let mut out = [0.0; 3];
    for (row, value) in out.iter_mut().enumerate() {
        let m = &matrix[row * 4..row * 4 + 4];
        *value = m[0] * x + m[1] * y + m[2] * z + m[3];
    }
    out
}

/// Equirectangular approximation that turns WGS84 degrees into meters around
/// a fixed center. Heights pass through unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalMetersProjection {
    pub center_lon: f64,
    pub center_lat: f64,
    pub meters_per_deg_lon: f64,
    pub meters_per_deg_lat: f64,
}

impl LocalMetersProjection {
    pub fn new(center_lon: f64, center_lat: f64) -> Self {
        let meters_per_deg_lat = std::f64::consts::PI * WGS84_SEMI_MAJOR_AXIS / 180.0;
        Self {
            center_lon,
            center_lat,
            meters_per_deg_lon: center_lat.to_radians().cos() * meters_per_deg_lat,
            meters_per_deg_lat,
        }
    }

    /// Only standard lon/lat/alt meshes can be localized.
    pub fn for_profile(profile: &SpatialProfile) -> Result<Self, TransformError> {
        if profile.classification != CoordinateClassification::Geographic {
            return Err(TransformError::NotGeographic(profile.classification));
        }
        let bbox = profile.usable_bbox().ok_or(TransformError::InvalidBounds)?;
        let [lon, lat, _] = bbox.center();
        Ok(Self::new(lon, lat))
    }

    pub fn project(&self, lon: f64, lat: f64, alt: f64) -> [f64; 3] {
        [
            (lon - self.center_lon) * self.meters_per_deg_lon,
            (lat - self.center_lat) * self.meters_per_deg_lat,
            alt,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < EPS, "{a} != {b}");
    }

    fn profile(classification: CoordinateClassification, bbox: BoundingBox) -> SpatialProfile {
        SpatialProfile {
            classification,
            bbox: Some(bbox),
            point_count: 1000,
            valid_bounds: bbox.has_valid_extent(),
        }
    }

    #[test]
    fn corners_map_onto_cube() {
        let boxes = [
            BoundingBox::new([126.95, 37.55, 12.0], [126.96, 37.57, 48.0]),
            BoundingBox::new([150_000.0, 200_000.0, 0.0], [160_000.0, 210_000.0, 50.0]),
            BoundingBox::new([-3.5, -1.0, -500.0], [2.25, 7.0, 1200.0]),
        ];
        for bbox in boxes {
            let plan = NormalizationPlan::from_bbox(&bbox);
            let low = plan.apply(bbox.min);
            let high = plan.apply(bbox.max);
            for axis in 0..3 {
                assert!((low[axis] + 50.0).abs() < 1e-6, "{low:?}");
                assert!((high[axis] - 50.0).abs() < 1e-6, "{high:?}");
            }
        }
    }

    #[test]
    fn matrix_layout_is_row_major() {
        let bbox = BoundingBox::new([0.0, 10.0, 0.0], [100.0, 20.0, 50.0]);
        let m = NormalizationPlan::from_bbox(&bbox).matrix();
        assert_close(m[0], 1.0);
        assert_close(m[3], -50.0);
        assert_close(m[5], 10.0);
        assert_close(m[7], -150.0);
        assert_close(m[10], 2.0);
        assert_close(m[11], -50.0);
        assert_eq!(&m[12..], &[0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn unknown_frames_are_not_normalized() {
        let bbox = BoundingBox::new([-10.0, -10.0, 0.0], [10.0, 10.0, 5.0]);
        assert!(NormalizationPlan::for_profile(&profile(CoordinateClassification::Unknown, bbox)).is_none());
        assert!(NormalizationPlan::for_profile(&profile(CoordinateClassification::Projected, bbox)).is_some());
    }

    #[test]
    fn invalid_bounds_skip_normalization() {
        let bbox = BoundingBox::new([126.0, 37.0, f64::NAN], [126.5, 37.5, 10.0]);
        let p = SpatialProfile {
            classification: CoordinateClassification::Geographic,
            bbox: Some(bbox),
            point_count: 10,
            valid_bounds: false,
        };
        assert!(NormalizationPlan::for_profile(&p).is_none());
    }

    #[test]
    fn up_axis_correction_swaps_y_and_z() {
        assert_eq!(transform_point(&UP_AXIS_CORRECTION, [1.0, 2.0, 3.0]), [1.0, 3.0, -2.0]);
        assert_eq!(transform_point(&IDENTITY, [1.0, 2.0, 3.0]), [1.0, 2.0, 3.0]);
    }

    #[test]
    fn local_meters_at_equator() {
        let projection = LocalMetersProjection::new(0.0, 0.0);
        let [x, y, z] = projection.project(1.0, 1.0, 12.5);
        let expected = std::f64::consts::PI * WGS84_SEMI_MAJOR_AXIS / 180.0;
        assert_close(x, expected);
        assert_close(y, expected);
        assert_close(z, 12.5);
    }

    #[test]
    fn local_meters_shrink_longitude_with_latitude() {
        let projection = LocalMetersProjection::new(127.0, 60.0);
        assert!((projection.meters_per_deg_lon - projection.meters_per_deg_lat * 0.5).abs() < 1e-6);
        assert_eq!(projection.project(127.0, 60.0, 3.0), [0.0, 0.0, 3.0]);
    }

    #[test]
    fn local_meters_require_standard_geographic() {
        let bbox = BoundingBox::new([0.0, 0.0, 37.0], [0.01, 0.01, 38.0]);
        let err = LocalMetersProjection::for_profile(&profile(
            CoordinateClassification::SwappedGeographic,
            bbox,
        ))
        .unwrap_err();
        assert!(matches!(err, TransformError::NotGeographic(_)));

        let bbox = BoundingBox::new([127.0, 37.0, 0.0], [127.01, 37.01, 30.0]);
        let projection =
            LocalMetersProjection::for_profile(&profile(CoordinateClassification::Geographic, bbox))
                .unwrap();
        assert_close(projection.center_lon, 127.005);
        assert_close(projection.center_lat, 37.005);
    }
}
