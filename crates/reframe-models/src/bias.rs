//! Side bias definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which portion of the cropped frame to retain when trimming to a
/// narrower target aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum SideBias {
    /// Keep the left side, trim from the right edge
    Left,
    /// Keep the right side, trim from the left edge
    Right,
    /// Keep the middle portion, trim equally from both edges
    #[default]
    Center,
}

impl SideBias {
    pub const ALL: &'static [SideBias] = &[SideBias::Left, SideBias::Right, SideBias::Center];

    pub fn as_str(&self) -> &'static str {
        match self {
            SideBias::Left => "left",
            SideBias::Right => "right",
            SideBias::Center => "center",
        }
    }
}

impl fmt::Display for SideBias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SideBias {
    type Err = SideBiasParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().trim() {
            "left" => Ok(SideBias::Left),
            "right" => Ok(SideBias::Right),
            "center" | "centre" | "middle" => Ok(SideBias::Center),
            _ => Err(SideBiasParseError(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
#[error("Unknown side bias: {0}")]
pub struct SideBiasParseError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bias_parse() {
        assert_eq!("left".parse::<SideBias>().unwrap(), SideBias::Left);
        assert_eq!("RIGHT".parse::<SideBias>().unwrap(), SideBias::Right);
        assert_eq!("middle".parse::<SideBias>().unwrap(), SideBias::Center);
        assert!("diagonal".parse::<SideBias>().is_err());
    }

    #[test]
    fn test_bias_display() {
        assert_eq!(SideBias::Center.to_string(), "center");
    }
}
