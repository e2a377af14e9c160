//! Engine-free analysis of LAS/LAZ sources from their header and a bounded
//! sample of points.

use std::path::Path;

use las::Reader;
use spatial_core::{BoundingBox, ColorProfile};

use crate::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub struct LasAnalysis {
    pub bbox: BoundingBox,
    pub point_count: u64,
    pub color: ColorProfile,
}

pub fn analyze(path: &Path, color_sample: usize) -> Result<LasAnalysis, ParseError> {
    let mut reader = Reader::from_path(path)?;

    let header = reader.header();
    let bounds = header.bounds();
    let bbox = BoundingBox::new(
        [bounds.min.x, bounds.min.y, bounds.min.z],
        [bounds.max.x, bounds.max.y, bounds.max.z],
    );
    let point_count = header.number_of_points();
    let has_color = header.point_format().has_color;

    let color = if has_color {
        let mut max_channel = 0u16;
        for point in reader.points().take(color_sample) {
            if let Some(c) = point?.color {
                max_channel = max_channel.max(c.red).max(c.green).max(c.blue);
            }
        }
        ColorProfile {
            has_color: true,
            is_16bit: max_channel > 255,
        }
    } else {
        ColorProfile::none()
    };

    log::info!(
        "analysed LAS header: path={:?} points={} color={:?}",
        path,
        point_count,
        color
    );

    Ok(LasAnalysis {
        bbox,
        point_count,
        color,
    })
}
