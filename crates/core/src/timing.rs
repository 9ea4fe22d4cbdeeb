//! Video standard timing for Z80-based consoles.

use serde::{Deserialize, Serialize};

/// Console region timing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingMode {
    /// NTSC (North America, Japan) - 3.579545 MHz CPU clock, 262 lines
    #[default]
    Ntsc,
    /// PAL (Europe, Australia) - 3.546893 MHz CPU clock, 313 lines
    Pal,
}

impl TimingMode {
    /// Get the CPU clock frequency in Hz for this timing mode
    pub fn cpu_clock_hz(&self) -> f64 {
        match self {
            TimingMode::Ntsc => 3_579_545.0,
            TimingMode::Pal => 3_546_893.0,
        }
    }

    /// Scan lines per frame, blanking included
    pub fn lines_per_frame(&self) -> u16 {
        match self {
            TimingMode::Ntsc => 262,
            TimingMode::Pal => 313,
        }
    }

    /// CPU cycles per scan line
    pub fn cycles_per_line(&self) -> u32 {
        228
    }

    /// CPU cycles per frame
    pub fn cycles_per_frame(&self) -> u32 {
        self.cycles_per_line() * self.lines_per_frame() as u32
    }

    /// Parse "ntsc"/"pal" (case-insensitive)
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ntsc" => Some(TimingMode::Ntsc),
            "pal" => Some(TimingMode::Pal),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_lengths() {
        assert_eq!(TimingMode::Ntsc.cycles_per_frame(), 59_736);
        assert_eq!(TimingMode::Pal.cycles_per_frame(), 71_364);
    }

    #[test]
    fn test_parse() {
        assert_eq!(TimingMode::from_str("PAL"), Some(TimingMode::Pal));
        assert_eq!(TimingMode::from_str("ntsc"), Some(TimingMode::Ntsc));
        assert_eq!(TimingMode::from_str("secam"), None);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&TimingMode::Pal).expect("serialize");
        assert_eq!(json, "\"pal\"");
    }
}
