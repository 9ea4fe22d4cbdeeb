//! Core APU (Audio Processing Unit) components.
//!
//! ## Audio Chips
//!
//! - **SN76489**: Sega Master System PSG (3 tone channels, 1 noise channel)
//! - **AudioChip trait**: Common interface for pluggable audio chips
//!
//! Chips are clocked by elapsed CPU cycles and support both NTSC and PAL
//! clock rates.

pub mod audio_chip;
pub mod sn76489;

pub use audio_chip::AudioChip;
pub use sn76489::Sn76489Psg;
