use serde::{Deserialize, Serialize};

use crate::profile::{CoordinateClassification, SpatialProfile};

/// Spatial summary attached to a conversion result. It survives multi-hop
/// conversions even when the intermediate artifact is discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epsg: Option<u32>,
    pub classification: CoordinateClassification,
    pub is_geographic: bool,
    pub is_swapped: bool,
    pub valid_bounds: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 6]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 3]>,
    /// Approximate lon/lat of the center for projected frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center_wgs84: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vertex_count: Option<u64>,
}

impl SpatialInfo {
    pub fn from_profile(profile: &SpatialProfile, epsg: Option<u32>) -> Self {
        Self {
            epsg,
            classification: profile.classification,
            is_geographic: profile.classification.is_geographic(),
            is_swapped: profile.classification.is_swapped(),
            valid_bounds: profile.valid_bounds,
            bbox: profile.bbox.map(|b| b.extents()),
            center: profile.bbox.map(|b| b.center()),
            center_wgs84: None,
            point_count: Some(profile.point_count),
            vertex_count: None,
        }
    }

    /// Same summary, but counting mesh vertices rather than points.
    pub fn for_mesh(profile: &SpatialProfile, epsg: Option<u32>) -> Self {
        Self {
            point_count: None,
            vertex_count: Some(profile.point_count),
            ..Self::from_profile(profile, epsg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::BoundingBox;

    #[test]
    fn mesh_info_reports_vertex_count() {
        let profile = SpatialProfile {
            classification: CoordinateClassification::Geographic,
            bbox: Some(BoundingBox::from_extents([126.0, 37.0, 0.0, 126.1, 37.1, 20.0])),
            point_count: 42,
            valid_bounds: true,
        };
        let info = SpatialInfo::for_mesh(&profile, Some(4326));
        assert_eq!(info.vertex_count, Some(42));
        assert_eq!(info.point_count, None);
        assert!(info.is_geographic);
        assert!(!info.is_swapped);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["classification"], "geographic");
        assert!(json.get("point_count").is_none());
    }
}
