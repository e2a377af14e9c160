use serde_json::{Map, Value};
use spatial_core::SourceFormat;

/// Recognised conversion options. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionOptions {
    pub voxel_size: Option<f64>,
    pub transform_coords: Option<bool>,
    /// Extension of the uploaded file, for sources stored without one.
    pub original_format: Option<String>,
    pub original_name: Option<String>,
    pub epsg: Option<u32>,
}

impl ConversionOptions {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut options = Self::default();
        for (key, value) in map {
            let recognised = match key.as_str() {
                "voxel_size" => value
                    .as_f64()
                    .filter(|v| *v > 0.0)
                    .map(|v| options.voxel_size = Some(v)),
                "transform_coords" => value.as_bool().map(|v| options.transform_coords = Some(v)),
                "original_format" => value
                    .as_str()
                    .map(|v| options.original_format = Some(v.trim_start_matches('.').to_lowercase())),
                "original_name" => value
                    .as_str()
                    .map(|v| options.original_name = Some(v.to_string())),
                "epsg" => parse_epsg(value).map(|v| options.epsg = Some(v)),
                _ => continue,
            };
            if recognised.is_none() {
                log::warn!("ignoring option {key} with unexpected value {value}");
            }
        }
        options
    }

    pub fn from_value(value: &Value) -> Self {
        value.as_object().map(Self::from_map).unwrap_or_default()
    }

    pub fn original_source_format(&self) -> Option<SourceFormat> {
        self.original_format
            .as_deref()
            .and_then(SourceFormat::from_extension)
    }
}

/// Accepts `5186`, `"5186"` and `"EPSG:5186"`.
fn parse_epsg(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
        Value::String(s) => {
            let s = s.trim();
            let code = s
                .get(..5)
                .filter(|prefix| prefix.eq_ignore_ascii_case("epsg:"))
                .map_or(s, |_| &s[5..]);
            code.trim().parse().ok()
        }
        _ => None,
    }
}
