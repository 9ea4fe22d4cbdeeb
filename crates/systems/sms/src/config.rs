//! Machine configuration

use crate::system::SmsError;
use emu_core::timing::TimingMode;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    /// Video standard; selects CPU clock and scanline count
    pub timing: TimingMode,
    /// PSG output rate in Hz
    pub sample_rate: u32,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            timing: TimingMode::Ntsc,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl SmsConfig {
    pub fn from_json(json: &str) -> Result<Self, SmsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SmsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SmsConfig::default();
        assert_eq!(config.timing, TimingMode::Ntsc);
        assert_eq!(config.sample_rate, 44_100);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SmsConfig::from_json(r#"{"timing": "pal"}"#).unwrap();
        assert_eq!(config.timing, TimingMode::Pal);
        assert_eq!(config.sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = SmsConfig {
            timing: TimingMode::Pal,
            sample_rate: 22_050,
        };
        let json = config.to_json().unwrap();
        assert_eq!(SmsConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            SmsConfig::from_json("{\"timing\": \"secam\"}"),
            Err(SmsError::Config(_))
        ));
    }
}
