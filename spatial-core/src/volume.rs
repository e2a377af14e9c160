use serde::{Deserialize, Serialize};

/// Whole-globe region used when nothing better is known.
pub const WORLD_REGION: BoundingVolume = BoundingVolume::Region {
    west: -std::f64::consts::PI,
    south: -std::f64::consts::FRAC_PI_2,
    east: std::f64::consts::PI,
    north: std::f64::consts::FRAC_PI_2,
    min_height: 0.0,
    max_height: 1000.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BoundingVolume {
    /// Oriented box: center plus three half-axis vectors.
    Box {
        center: [f64; 3],
        half_axes: [[f64; 3]; 3],
    },
    /// Geographic region in radians, heights in meters.
    Region {
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        min_height: f64,
        max_height: f64,
    },
}

impl BoundingVolume {
    /// Axis-aligned box with the given half lengths.
    pub fn aligned_box(center: [f64; 3], half_lengths: [f64; 3]) -> Self {
        let [hx, hy, hz] = half_lengths;
        BoundingVolume::Box {
            center,
            half_axes: [[hx, 0.0, 0.0], [0.0, hy, 0.0], [0.0, 0.0, hz]],
        }
    }
}
