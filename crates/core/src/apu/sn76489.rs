//! Texas Instruments SN76489 Programmable Sound Generator
//!
//! The SN76489 is the sound chip of the Sega Master System.
//!
//! # Architecture
//! - 3 square wave tone channels with 10-bit period registers
//! - 1 noise channel driven by a 15-bit LFSR
//! - 4-bit attenuation per channel (15 = silent)
//!
//! The chip is clocked at CPU clock / 16. Rather than stepping every chip
//! clock, each output sample advances the channel counters by the number of
//! chip clocks that fit into one sample period.
//!
//! Samples go into a ring of `BLOCK_COUNT` blocks of `BLOCK_SAMPLES` each.
//! A registered callback is handed every block as it fills up.

use crate::apu::AudioChip;
use crate::logging::{log, LogCategory, LogLevel};
use crate::timing::TimingMode;

/// Samples per playback block
pub const BLOCK_SAMPLES: usize = 1024;
/// Blocks in the ring buffer
pub const BLOCK_COUNT: usize = 4;

/// Tone periods below this would alias; the channel outputs a constant level instead
const MIN_TONE_PERIOD: u16 = 6;

const LFSR_RESET: u16 = 0x4000;
const LFSR_RELOAD: u16 = 0x7FFF;

pub type BlockCallback = Box<dyn FnMut(&[f32])>;

/// SN76489 PSG state
pub struct Sn76489Psg {
    // Tone generators
    tone_freq: [u16; 3], // 10-bit period registers

    // Noise generator
    noise_control: u8, // bit 2: white noise, bits 0-1: rate
    noise_lfsr: u16,

    // Per channel (tones 0-2, noise 3)
    counters: [f64; 4],
    polarity: [bool; 4],
    volume: [u8; 4], // 4-bit attenuation, 0=max, 15=mute
    volume_table: [f32; 16],

    // Latched register
    latched_channel: u8,
    latched_volume: bool,

    timing_mode: TimingMode,
    sample_rate: u32,
    cycles_per_sample: f64,
    clocks_per_sample: f64,
    cycle_acc: f64,

    buffer: Vec<f32>,
    write_pos: usize,
    unread: usize,
    on_block: Option<BlockCallback>,
}

impl Sn76489Psg {
    /// Create a new SN76489 PSG
    ///
    /// # Arguments
    /// * `timing_mode` - NTSC or PAL timing mode
    /// * `sample_rate` - output rate in Hz
    pub fn new(timing_mode: TimingMode, sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        let cycles_per_sample = timing_mode.cpu_clock_hz() / sample_rate as f64;
        let mut volume_table = [0.0; 16];
        for (i, v) in volume_table.iter_mut().enumerate() {
            *v = volume_to_amplitude(i as u8);
        }

        Self {
            tone_freq: [0; 3],
            noise_control: 0,
            noise_lfsr: LFSR_RESET,
            counters: [0.0; 4],
            polarity: [true; 4],
            volume: [0x0F; 4],
            volume_table,
            latched_channel: 0,
            latched_volume: false,
            timing_mode,
            sample_rate,
            cycles_per_sample,
            clocks_per_sample: cycles_per_sample / 16.0,
            cycle_acc: 0.0,
            buffer: vec![0.0; BLOCK_COUNT * BLOCK_SAMPLES],
            write_pos: 0,
            unread: 0,
            on_block: None,
        }
    }

    /// Register a callback receiving each completed block of samples
    pub fn set_block_callback(&mut self, callback: BlockCallback) {
        self.on_block = Some(callback);
    }

    /// Write a byte to the PSG
    pub fn write(&mut self, data: u8) {
        if data & 0x80 != 0 {
            // Latch byte: 1 cc t dddd
            self.latched_channel = (data >> 5) & 0x03;
            self.latched_volume = data & 0x10 != 0;
            self.write_latched(data & 0x0F, true);
        } else {
            // Data byte: 0 - dddddd
            self.write_latched(data & 0x3F, false);
        }
        log(LogCategory::Audio, LogLevel::Trace, || {
            format!(
                "PSG: write {:02X} (channel {}, {})",
                data,
                self.latched_channel,
                if self.latched_volume { "volume" } else { "tone/noise" }
            )
        });
    }

    fn write_latched(&mut self, value: u8, latch: bool) {
        let ch = self.latched_channel as usize;
        if self.latched_volume {
            self.volume[ch] = value & 0x0F;
        } else if ch == 3 {
            self.noise_control = value & 0x07;
            self.noise_lfsr = LFSR_RESET;
        } else if latch {
            self.tone_freq[ch] = (self.tone_freq[ch] & 0x3F0) | value as u16;
        } else {
            self.tone_freq[ch] = (self.tone_freq[ch] & 0x00F) | ((value as u16) << 4);
        }
    }

    /// Period of the noise channel in chip clocks
    fn noise_period(&self) -> u16 {
        match self.noise_control & 0x03 {
            0 => 0x10,
            1 => 0x20,
            2 => 0x40,
            _ => self.tone_freq[2],
        }
    }

    fn shift_lfsr(&mut self) {
        let lfsr = self.noise_lfsr;
        let feedback = if self.noise_control & 0x04 != 0 {
            // White noise (tapped)
            (lfsr ^ (lfsr >> 1)) & 1
        } else {
            // Periodic noise
            lfsr & 1
        };
        self.noise_lfsr = (lfsr >> 1) | (feedback << 14);
        if self.noise_lfsr == 0 {
            self.noise_lfsr = LFSR_RELOAD;
        }
    }

    /// Advance every channel by one sample period and mix
    fn generate_sample(&mut self) -> f32 {
        let step = self.clocks_per_sample;

        for ch in 0..3 {
            let period = self.tone_freq[ch];
            if period < MIN_TONE_PERIOD {
                self.polarity[ch] = true;
                continue;
            }
            self.counters[ch] -= step;
            while self.counters[ch] <= 0.0 {
                self.counters[ch] += period as f64;
                self.polarity[ch] = !self.polarity[ch];
            }
        }

        let period = self.noise_period().max(1) as f64;
        self.counters[3] -= step;
        while self.counters[3] <= 0.0 {
            self.counters[3] += period;
            self.polarity[3] = !self.polarity[3];
            if self.polarity[3] {
                self.shift_lfsr();
            }
        }

        let mut output = 0.0;
        for ch in 0..3 {
            let amplitude = self.volume_table[self.volume[ch] as usize];
            output += if self.polarity[ch] {
                amplitude
            } else {
                -amplitude
            };
        }
        output += (self.noise_lfsr & 1) as f32 * self.volume_table[self.volume[3] as usize];

        output / 4.0
    }

    fn push_sample(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
        self.unread = (self.unread + 1).min(self.buffer.len());

        if self.write_pos % BLOCK_SAMPLES == 0 {
            let end = if self.write_pos == 0 {
                self.buffer.len()
            } else {
                self.write_pos
            };
            if let Some(callback) = self.on_block.as_mut() {
                callback(&self.buffer[end - BLOCK_SAMPLES..end]);
            }
        }
    }

    /// Reset the PSG to initial state
    pub fn reset_state(&mut self) {
        self.tone_freq.fill(0);
        self.noise_control = 0;
        self.noise_lfsr = LFSR_RESET;
        self.counters.fill(0.0);
        self.polarity.fill(true);
        self.volume.fill(0x0F);
        self.latched_channel = 0;
        self.latched_volume = false;
        self.cycle_acc = 0.0;
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.unread = 0;
    }
}

/// Convert 4-bit attenuation to amplitude (0=max, 15=silent), 2dB per step
fn volume_to_amplitude(volume: u8) -> f32 {
    if volume >= 0x0F {
        0.0
    } else {
        10_f32.powf(-0.1 * volume as f32)
    }
}

impl AudioChip for Sn76489Psg {
    fn write_register(&mut self, _addr: u16, val: u8) {
        // SMS writes to PSG via I/O port, not memory-mapped
        self.write(val);
    }

    fn update(&mut self, cycles: u32) {
        self.cycle_acc += cycles as f64;
        while self.cycle_acc >= self.cycles_per_sample {
            self.cycle_acc -= self.cycles_per_sample;
            let sample = self.generate_sample();
            self.push_sample(sample);
        }
    }

    fn timing(&self) -> TimingMode {
        self.timing_mode
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn take_samples(&mut self) -> Vec<f32> {
        let len = self.buffer.len();
        let start = (self.write_pos + len - self.unread) % len;
        let samples = (0..self.unread)
            .map(|i| self.buffer[(start + i) % len])
            .collect();
        self.unread = 0;
        samples
    }

    fn reset(&mut self) {
        self.reset_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn make_psg() -> Sn76489Psg {
        Sn76489Psg::new(TimingMode::Ntsc, 44_100)
    }

    /// Run exactly `n` samples
    fn run_samples(psg: &mut Sn76489Psg, n: usize) {
        for _ in 0..n {
            let sample = psg.generate_sample();
            psg.push_sample(sample);
        }
    }

    #[test]
    fn test_psg_creation() {
        let psg = make_psg();
        assert_eq!(psg.volume, [0x0F; 4]); // All muted
        assert_eq!(psg.noise_lfsr, LFSR_RESET);
    }

    #[test]
    fn test_psg_volume_write() {
        let mut psg = make_psg();

        psg.write(0x90); // Channel 0, volume, value 0 (max)
        assert_eq!(psg.volume[0], 0x00);

        psg.write(0xB5); // Channel 1, volume 5
        assert_eq!(psg.volume[1], 0x05);

        // A data byte after a volume latch replaces the volume
        psg.write(0x0C);
        assert_eq!(psg.volume[1], 0x0C);
    }

    #[test]
    fn test_psg_tone_frequency() {
        let mut psg = make_psg();

        psg.write(0x84); // Latch tone 0, low 4 bits = 0x4
        psg.write(0x1A); // High 6 bits = 0x1A
        assert_eq!(psg.tone_freq[0], 0x1A4);

        // A second data byte only replaces the high bits
        psg.write(0x3F);
        assert_eq!(psg.tone_freq[0], 0x3F4);
    }

    #[test]
    fn test_psg_noise_control_resets_lfsr() {
        let mut psg = make_psg();
        psg.noise_lfsr = 0x1234;

        psg.write(0xE7); // Latch noise, white, rate 3
        assert_eq!(psg.noise_control, 0x07);
        assert_eq!(psg.noise_lfsr, LFSR_RESET);
        assert_eq!(psg.noise_period(), psg.tone_freq[2]);
    }

    #[test]
    fn test_silent_when_muted() {
        let mut psg = make_psg();
        psg.write(0x80);
        psg.write(0x10);
        run_samples(&mut psg, 256);
        assert!(psg.take_samples().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_low_period_is_constant() {
        let mut psg = make_psg();
        psg.write(0x81); // tone 0 period 1
        psg.write(0x00);
        psg.write(0x90); // tone 0 volume max
        run_samples(&mut psg, 64);
        let samples = psg.take_samples();
        assert_eq!(samples.len(), 64);
        assert!(samples.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_square_wave_alternates() {
        let mut psg = make_psg();
        psg.write(0x8E); // tone 0 period 0x0FE
        psg.write(0x0F);
        psg.write(0x90);
        run_samples(&mut psg, 512);
        let samples = psg.take_samples();
        assert!(samples.iter().any(|&s| s > 0.0));
        assert!(samples.iter().any(|&s| s < 0.0));
    }

    #[test]
    fn test_periodic_noise_shifts() {
        let mut psg = make_psg();
        psg.write(0xE0); // periodic, rate 0x10
        psg.write(0xF0); // noise volume max
        run_samples(&mut psg, 64);
        assert_ne!(psg.noise_lfsr, LFSR_RESET);
    }

    #[test]
    fn test_lfsr_never_zero() {
        let mut psg = make_psg();
        psg.noise_lfsr = 0;
        psg.shift_lfsr();
        assert_eq!(psg.noise_lfsr, LFSR_RELOAD);
    }

    #[test]
    fn test_update_sample_count() {
        let mut psg = make_psg();
        for _ in 0..1000 {
            psg.update(228);
        }
        let expected = 228_000.0 / psg.cycles_per_sample;
        let count = psg.take_samples().len() as f64;
        assert!((count - expected).abs() <= 1.0);
    }

    #[test]
    fn test_block_callback() {
        let mut psg = make_psg();
        let blocks = Rc::new(Cell::new(0));
        let seen = Rc::clone(&blocks);
        psg.set_block_callback(Box::new(move |block: &[f32]| {
            assert_eq!(block.len(), BLOCK_SAMPLES);
            seen.set(seen.get() + 1);
        }));

        run_samples(&mut psg, BLOCK_SAMPLES * BLOCK_COUNT + 10);
        assert_eq!(blocks.get(), BLOCK_COUNT);
        run_samples(&mut psg, BLOCK_SAMPLES);
        assert_eq!(blocks.get(), BLOCK_COUNT + 1);
    }

    #[test]
    fn test_take_samples_drains() {
        let mut psg = make_psg();
        run_samples(&mut psg, 100);
        assert_eq!(psg.take_samples().len(), 100);
        assert!(psg.take_samples().is_empty());
    }

    #[test]
    fn test_volume_to_amplitude() {
        assert_eq!(volume_to_amplitude(0), 1.0);
        assert_eq!(volume_to_amplitude(15), 0.0);

        // Volume 8 should be approximately -16dB
        let vol_8 = volume_to_amplitude(8);
        assert!(vol_8 > 0.15 && vol_8 < 0.17);
    }
}
