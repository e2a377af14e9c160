use spatial_core::{BoundingBox, CoordinateClassification, SpatialProfile};

// Swapped exports keep lon/lat on X/Z, so Z falls inside a plausible latitude band.
const SWAPPED_LATITUDE_BAND: (f64, f64) = (20.0, 70.0);
const SWAPPED_MAX_XY_RANGE: f64 = 1.0;

const GEOGRAPHIC_MAX_RANGE: f64 = 10.0;

const KOREA_TM_EXTENT: (f64, f64) = (100_000.0, 700_000.0);
const KOREA_TM_MAX_Z_RANGE: f64 = 1000.0;

const PROJECTED_ABS_EXTENT: (f64, f64) = (10_000.0, 1e7);
const PROJECTED_MAX_Z_RANGE: f64 = 5000.0;

type Rule = fn(&BoundingBox, [f64; 3]) -> bool;

// Evaluated top to bottom, first match wins. Swapped geographic must stay
// ahead of the metric grids: its Z range looks like meters.
const RULES: [(CoordinateClassification, Rule); 4] = [
    (CoordinateClassification::SwappedGeographic, is_swapped_geographic),
    (CoordinateClassification::Geographic, is_standard_geographic),
    (CoordinateClassification::KoreaTm, is_korea_tm),
    (CoordinateClassification::Projected, is_projected),
];

fn within(value: f64, (lo, hi): (f64, f64)) -> bool {
    lo <= value && value <= hi
}

fn is_swapped_geographic(bbox: &BoundingBox, ranges: [f64; 3]) -> bool {
    let [x_range, y_range, _] = ranges;
    x_range < SWAPPED_MAX_XY_RANGE
        && y_range < SWAPPED_MAX_XY_RANGE
        && within(bbox.min[2], SWAPPED_LATITUDE_BAND)
        && within(bbox.max[2], SWAPPED_LATITUDE_BAND)
}

fn is_standard_geographic(bbox: &BoundingBox, ranges: [f64; 3]) -> bool {
    let [x_range, y_range, _] = ranges;
    within(bbox.min[0], (-180.0, 180.0))
        && within(bbox.max[0], (-180.0, 180.0))
        && within(bbox.min[1], (-90.0, 90.0))
        && within(bbox.max[1], (-90.0, 90.0))
        && x_range < GEOGRAPHIC_MAX_RANGE
        && y_range < GEOGRAPHIC_MAX_RANGE
}

fn is_korea_tm(bbox: &BoundingBox, ranges: [f64; 3]) -> bool {
    within(bbox.min[0], KOREA_TM_EXTENT)
        && within(bbox.max[0], KOREA_TM_EXTENT)
        && within(bbox.min[1], KOREA_TM_EXTENT)
        && within(bbox.max[1], KOREA_TM_EXTENT)
        && ranges[2] < KOREA_TM_MAX_Z_RANGE
}

fn is_projected(bbox: &BoundingBox, ranges: [f64; 3]) -> bool {
    within(bbox.min[0].abs(), PROJECTED_ABS_EXTENT)
        && within(bbox.min[1].abs(), PROJECTED_ABS_EXTENT)
        && ranges[2] < PROJECTED_MAX_Z_RANGE
}

/// Labels the reference frame of a bounding box. Boxes with non-finite or
/// degenerate bounds are always `Unknown`.
pub fn classify_bbox(bbox: &BoundingBox) -> CoordinateClassification {
    if !bbox.has_valid_extent() {
        return CoordinateClassification::Unknown;
    }
    let ranges = bbox.ranges();
    RULES
        .iter()
        .find(|(_, rule)| rule(bbox, ranges))
        .map(|(classification, _)| *classification)
        .unwrap_or(CoordinateClassification::Unknown)
}

pub fn classify(bbox: Option<BoundingBox>, point_count: u64) -> SpatialProfile {
    let Some(bbox) = bbox else {
        return SpatialProfile {
            point_count,
            ..SpatialProfile::unknown()
        };
    };

    let valid_bounds = bbox.has_valid_extent();
    let classification = classify_bbox(&bbox);
    let ranges = bbox.ranges();
    log::info!(
        "coordinate system detected: classification={} valid_bounds={} ranges=({}, {}, {}) points={}",
        classification,
        valid_bounds,
        ranges[0],
        ranges[1],
        ranges[2],
        point_count
    );

    SpatialProfile {
        classification,
        bbox: Some(bbox),
        point_count,
        valid_bounds,
    }
}
