//! Audio chip trait for pluggable audio implementations.
//!
//! Chips are driven by the CPU clock: the host reports elapsed CPU cycles
//! after each instruction and the chip emits samples at its output rate.

use crate::timing::TimingMode;

pub trait AudioChip {
    /// Write to a register on the audio chip
    fn write_register(&mut self, addr: u16, val: u8);

    /// Read from a register on the audio chip (if supported)
    fn read_register(&self, addr: u16) -> u8 {
        let _ = addr;
        0 // Default: no readable registers
    }

    /// Advance the chip by `cycles` CPU cycles
    fn update(&mut self, cycles: u32);

    /// Get the timing mode of this chip (NTSC/PAL)
    fn timing(&self) -> TimingMode;

    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Samples produced since the previous call
    fn take_samples(&mut self) -> Vec<f32>;

    /// Reset the chip to power-on state
    fn reset(&mut self);
}
