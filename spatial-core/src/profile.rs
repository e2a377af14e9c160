use serde::{Deserialize, Serialize};

use crate::bounds::BoundingBox;

/// Reference frame guessed from the numeric bounds of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateClassification {
    /// Longitude/latitude stored on the X and Z axes.
    SwappedGeographic,
    Geographic,
    /// Meter-scale Korean transverse mercator grid.
    KoreaTm,
    Projected,
    Unknown,
}

impl CoordinateClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SwappedGeographic => "swapped_geographic",
            Self::Geographic => "geographic",
            Self::KoreaTm => "korea_tm",
            Self::Projected => "projected",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Self::Geographic | Self::SwappedGeographic)
    }

    pub fn is_swapped(&self) -> bool {
        matches!(self, Self::SwappedGeographic)
    }

    pub fn is_projected(&self) -> bool {
        matches!(self, Self::KoreaTm | Self::Projected)
    }

    /// Frames whose coordinates are rescaled into the viewer envelope.
    pub fn needs_normalization(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Frames that are authored Z-up and must be rotated for a Y-up viewer.
    /// Geographic sources are already oriented and are never rotated again.
    pub fn needs_up_axis_correction(&self) -> bool {
        self.is_projected()
    }
}

impl std::fmt::Display for CoordinateClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialProfile {
    pub classification: CoordinateClassification,
    pub bbox: Option<BoundingBox>,
    pub point_count: u64,
    pub valid_bounds: bool,
}

impl SpatialProfile {
    /// Profile used when a source could not be analysed at all.
    pub fn unknown() -> Self {
        Self {
            classification: CoordinateClassification::Unknown,
            bbox: None,
            point_count: 0,
            valid_bounds: false,
        }
    }

    pub fn is_geographic(&self) -> bool {
        self.classification.is_geographic()
    }

    /// The bounding box, but only when it may be used for normalization.
    pub fn usable_bbox(&self) -> Option<&BoundingBox> {
        if self.valid_bounds {
            self.bbox.as_ref()
        } else {
            None
        }
    }
}
