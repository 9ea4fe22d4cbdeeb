//! Cartridge image and battery RAM

use crate::system::SmsError;
use emu_core::logging::{log, LogCategory, LogLevel};

/// Size of one ROM page and one banked frame
pub const PAGE_SIZE: usize = 0x4000;

/// Copier header some dumps carry in front of the ROM
const HEADER_SIZE: usize = 512;

/// Battery-backed RAM pages selectable into frame 2
pub const RAM_PAGES: usize = 2;

pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
}

impl Cartridge {
    /// Validate a raw image, stripping the copier header if present
    pub fn load(image: &[u8]) -> Result<Self, SmsError> {
        let rom = if image.len() % PAGE_SIZE == HEADER_SIZE {
            log(LogCategory::Bus, LogLevel::Info, || {
                "Cartridge: stripping 512-byte header".to_string()
            });
            &image[HEADER_SIZE..]
        } else {
            image
        };

        if rom.is_empty() {
            log(LogCategory::Bus, LogLevel::Error, || {
                "Cartridge: empty ROM image".to_string()
            });
            return Err(SmsError::EmptyRom);
        }
        if rom.len() % PAGE_SIZE != 0 {
            log(LogCategory::Bus, LogLevel::Error, || {
                format!(
                    "Cartridge: ROM length {} is not a multiple of {}",
                    rom.len(),
                    PAGE_SIZE
                )
            });
            return Err(SmsError::InvalidRomSize { len: image.len() });
        }

        let cartridge = Self {
            rom: rom.to_vec(),
            ram: vec![0; RAM_PAGES * PAGE_SIZE],
        };
        log(LogCategory::Bus, LogLevel::Info, || {
            format!(
                "Cartridge: loaded {} KB ({} pages)",
                cartridge.rom.len() / 1024,
                cartridge.page_count()
            )
        });
        Ok(cartridge)
    }

    pub fn page_count(&self) -> usize {
        self.rom.len() / PAGE_SIZE
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    /// Read from a ROM page; `page` is reduced modulo the page count
    pub fn read_rom(&self, page: usize, offset: u16) -> u8 {
        let page = page % self.page_count();
        self.rom[page * PAGE_SIZE + (offset as usize & (PAGE_SIZE - 1))]
    }

    pub fn read_ram(&self, page: usize, offset: u16) -> u8 {
        self.ram[(page % RAM_PAGES) * PAGE_SIZE + (offset as usize & (PAGE_SIZE - 1))]
    }

    pub fn write_ram(&mut self, page: usize, offset: u16, val: u8) {
        self.ram[(page % RAM_PAGES) * PAGE_SIZE + (offset as usize & (PAGE_SIZE - 1))] = val;
    }

    /// Both battery RAM pages, back to back
    pub fn battery_ram(&self) -> &[u8] {
        &self.ram
    }
}
