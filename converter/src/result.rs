use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use spatial_core::SpatialInfo;

use crate::error::{excerpt, ConvertError};

pub const SPATIAL_INFO_KEY: &str = "spatial_info";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl ConversionResult {
    pub fn succeeded(output_path: impl Into<PathBuf>) -> Self {
        Self {
            success: true,
            output_path: Some(output_path.into()),
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn failed(err: &ConvertError) -> Self {
        Self {
            success: false,
            output_path: None,
            error: Some(excerpt(&err.to_string())),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_spatial_info(mut self, info: &SpatialInfo) -> Self {
        if let Ok(value) = serde_json::to_value(info) {
            self.metadata.insert(SPATIAL_INFO_KEY.to_string(), value);
        }
        self
    }

    pub fn spatial_info(&self) -> Option<SpatialInfo> {
        self.metadata
            .get(SPATIAL_INFO_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}
