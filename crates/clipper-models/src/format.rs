//! Output formats and aspect ratios.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output format of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ClipFormat {
    /// Same framing as the source
    #[default]
    Horizontal,
    /// 9:16 face-following crop
    Vertical,
}

impl ClipFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipFormat::Horizontal => "horizontal",
            ClipFormat::Vertical => "vertical",
        }
    }
}

impl fmt::Display for ClipFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a clip format string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown clip format '{0}', expected 'horizontal' or 'vertical'")]
pub struct ClipFormatParseError(pub String);

impl FromStr for ClipFormat {
    type Err = ClipFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "horizontal" | "landscape" | "h" => Ok(ClipFormat::Horizontal),
            "vertical" | "portrait" | "v" | "9:16" => Ok(ClipFormat::Vertical),
            other => Err(ClipFormatParseError(other.to_string())),
        }
    }
}

/// Width:height aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub const PORTRAIT: Self = Self { width: 9, height: 16 };
    pub const SQUARE: Self = Self { width: 1, height: 1 };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width divided by height.
    pub fn ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::PORTRAIT
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}
