//! Parsing of the JSON documents printed by the point-cloud engine's
//! `info --summary` and `info --stats` commands.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use spatial_core::BoundingBox;

use crate::ParseError;

#[derive(Debug, Default, Deserialize)]
struct SummaryBounds {
    #[serde(default)]
    minx: f64,
    #[serde(default)]
    miny: f64,
    #[serde(default)]
    minz: f64,
    #[serde(default)]
    maxx: f64,
    #[serde(default)]
    maxy: f64,
    #[serde(default)]
    maxz: f64,
}

#[derive(Debug, Default, Deserialize)]
struct Summary {
    bounds: Option<SummaryBounds>,
    #[serde(default)]
    num_points: u64,
    #[serde(default)]
    dimensions: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSummary {
    pub bbox: Option<BoundingBox>,
    pub point_count: u64,
    pub dimensions: Vec<String>,
    /// The document as printed, kept for result metadata.
    pub raw: Value,
}

pub fn parse_summary(json: &str) -> Result<EngineSummary, ParseError> {
    let raw: Value = serde_json::from_str(json)?;
    let summary_value = raw
        .get("summary")
        .cloned()
        .ok_or_else(|| ParseError::format("engine output has no `summary` object"))?;
    let summary: Summary = serde_json::from_value(summary_value)?;

    let bbox = summary.bounds.map(|b| {
        BoundingBox::from_extents([b.minx, b.miny, b.minz, b.maxx, b.maxy, b.maxz])
    });
    let dimensions = summary
        .dimensions
        .as_deref()
        .map(split_dimensions)
        .unwrap_or_default();

    Ok(EngineSummary {
        bbox,
        point_count: summary.num_points,
        dimensions,
        raw,
    })
}

fn split_dimensions(dimensions: &str) -> Vec<String> {
    dimensions
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Deserialize)]
struct Statistic {
    name: String,
    maximum: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Stats {
    #[serde(default)]
    statistic: Vec<Statistic>,
}

#[derive(Debug, Deserialize)]
struct StatsDocument {
    stats: Stats,
}

/// Per-dimension maxima from an `info --stats` document.
pub fn parse_channel_maxima(json: &str) -> Result<HashMap<String, f64>, ParseError> {
    let document: StatsDocument = serde_json::from_str(json)?;
    Ok(document
        .stats
        .statistic
        .into_iter()
        .filter_map(|s| s.maximum.map(|max| (s.name, max)))
        .collect())
}
