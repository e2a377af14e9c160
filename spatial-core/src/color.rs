use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorProfile {
    pub has_color: bool,
    pub is_16bit: bool,
}

impl ColorProfile {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn rgb8() -> Self {
        Self {
            has_color: true,
            is_16bit: false,
        }
    }

    pub fn rgb16() -> Self {
        Self {
            has_color: true,
            is_16bit: true,
        }
    }
}
