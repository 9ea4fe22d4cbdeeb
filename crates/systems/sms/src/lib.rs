//! Sega Master System emulator implementation
//!
//! # Architecture
//!
//! - **CPU**: Zilog Z80A @ 3.58 MHz (NTSC) / 3.55 MHz (PAL)
//! - **VDP**: Sega 315-5124, 256×192, 262 or 313 lines per frame
//! - **PSG**: Texas Instruments SN76489
//! - **RAM**: 8 KB main RAM, mirrored up to the mapper registers
//! - **VRAM**: 16 KB video RAM
//! - **Cartridge**: Sega mapper with three 16 KB frames and two battery RAM pages
//!
//! The host drives the machine one CPU step at a time; each step's cycle
//! count clocks the PSG and then the VDP:
//!
//! ```rust,ignore
//! use emu_sms::SmsSystem;
//!
//! let mut sms = SmsSystem::new();
//! sms.load_rom(&rom)?;
//! loop {
//!     sms.step()?;
//! }
//! ```

pub mod bus;
pub mod cartridge;
pub mod config;
pub mod system;
pub mod vdp;

pub use cartridge::Cartridge;
pub use config::SmsConfig;
pub use system::{SmsError, SmsSystem};
