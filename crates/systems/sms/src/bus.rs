//! Sega Master System memory bus implementation

use crate::cartridge::{Cartridge, PAGE_SIZE};
use crate::vdp::Vdp;
use emu_core::apu::Sn76489Psg;
use emu_core::cpu_z80::MemoryZ80;
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

const RAM_SIZE: usize = 0x2000;

/// Bottom of ROM page 0 that never banks out
const FIXED_BOOT_AREA: u16 = 0x0400;

/// Control byte: frame 2 maps cartridge RAM
const RAM_ENABLE: u8 = 0x08;
/// Control byte: which cartridge RAM page
const RAM_PAGE_SELECT: u8 = 0x04;

pub const PORT_CONTROLLER_1: u8 = 0xDC;
pub const PORT_CONTROLLER_2: u8 = 0xDD;

/// The vertical counter line on which a latched pause is delivered
pub const PAUSE_SAMPLE_LINE: u8 = 0xC1;

/// Serializable mapper registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankState {
    pub control: u8,
    pub pages: [u8; 3],
}

/// SMS Memory bus
///
/// Memory Map:
/// - 0x0000-0x03FF: ROM page 0, never banked
/// - 0x0400-0xBFFF: three 16KB frames, each mapped to any ROM page;
///   frame 2 may map one of two cartridge RAM pages instead
/// - 0xC000-0xDFFF: RAM (8KB)
/// - 0xE000-0xFFFB: RAM mirror
/// - 0xFFFC-0xFFFF: mapper control and frame page registers (also stored in RAM)
///
/// I/O ports are decoded by the top two bits of the port number:
/// - 0x40-0x7F: V counter (even) / H counter (odd) on read, PSG on write
/// - 0x80-0xBF: VDP data (even) / control (odd)
/// - 0xC0-0xFF: controller ports 0xDC / 0xDD on read
/// - everything else: the port latch, reads give 0xFF
pub struct SmsBus {
    cartridge: Cartridge,

    // RAM (8KB)
    ram: Vec<u8>,

    vdp: Rc<RefCell<Vdp>>,
    psg: Rc<RefCell<Sn76489Psg>>,

    // Mapper registers
    control: u8,
    pages: [u8; 3],

    // Port latch; controller state lives at 0xDC/0xDD
    ports: [u8; 256],

    pause_pressed: bool,
    pause_requested: bool,
}

impl SmsBus {
    /// Create a new SMS memory bus
    pub fn new(cartridge: Cartridge, vdp: Rc<RefCell<Vdp>>, psg: Rc<RefCell<Sn76489Psg>>) -> Self {
        let mut ports = [0; 256];
        ports[PORT_CONTROLLER_1 as usize] = 0xFF;
        ports[PORT_CONTROLLER_2 as usize] = 0xFF;

        Self {
            cartridge,
            ram: vec![0; RAM_SIZE],
            vdp,
            psg,
            control: 0,
            pages: [0, 1, 2],
            ports,
            pause_pressed: false,
            pause_requested: false,
        }
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    /// Latched value of a port
    pub fn port(&self, port: u8) -> u8 {
        self.ports[port as usize]
    }

    /// Set controller 1 state (active low)
    pub fn set_controller_1(&mut self, state: u8) {
        self.ports[PORT_CONTROLLER_1 as usize] = state;
    }

    /// Set controller 2 state (active low)
    pub fn set_controller_2(&mut self, state: u8) {
        self.ports[PORT_CONTROLLER_2 as usize] = state;
    }

    /// Pause button level; pressing it latches one NMI request
    pub fn set_pause(&mut self, pressed: bool) {
        if pressed && !self.pause_pressed {
            self.pause_requested = true;
        }
        self.pause_pressed = pressed;
    }

    pub fn bank_state(&self) -> BankState {
        BankState {
            control: self.control,
            pages: self.pages,
        }
    }

    pub fn restore_banks(&mut self, state: BankState) {
        self.control = state.control;
        self.pages = state.pages;
    }

    fn ram_mapped(&self) -> bool {
        self.control & RAM_ENABLE != 0
    }

    fn ram_page(&self) -> usize {
        usize::from(self.control & RAM_PAGE_SELECT != 0)
    }

    fn write_mapper(&mut self, addr: u16, val: u8) {
        match addr {
            0xFFFC => {
                if (val ^ self.control) & (RAM_ENABLE | RAM_PAGE_SELECT) != 0 {
                    log(LogCategory::Bus, LogLevel::Debug, || {
                        format!(
                            "Bus: frame 2 -> {}",
                            if val & RAM_ENABLE != 0 {
                                format!("cartridge RAM page {}", (val & RAM_PAGE_SELECT) >> 2)
                            } else {
                                "ROM".to_string()
                            }
                        )
                    });
                }
                self.control = val;
            }
            _ => {
                let frame = (addr - 0xFFFD) as usize;
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!(
                        "Bus: frame {} -> ROM page {}",
                        frame,
                        val as usize % self.cartridge.page_count()
                    )
                });
                // Stored as written; the cartridge wraps it on access
                self.pages[frame] = val;
            }
        }
    }
}

impl MemoryZ80 for SmsBus {
    fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0xBFFF => {
                let frame = (addr as usize) / PAGE_SIZE;
                if addr < FIXED_BOOT_AREA {
                    self.cartridge.read_rom(0, addr)
                } else if frame == 2 && self.ram_mapped() {
                    self.cartridge.read_ram(self.ram_page(), addr)
                } else {
                    self.cartridge.read_rom(self.pages[frame] as usize, addr)
                }
            }
            0xFFFC => self.control,
            0xFFFD..=0xFFFF => self.pages[(addr - 0xFFFD) as usize],
            _ => self.ram[addr as usize & (RAM_SIZE - 1)],
        }
    }

    fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0xBFFF => {
                if addr >= 0x8000 && self.ram_mapped() {
                    let page = self.ram_page();
                    self.cartridge.write_ram(page, addr, val);
                } else {
                    log(LogCategory::Bus, LogLevel::Trace, || {
                        format!("Bus: ignored ROM write ${:04X} = ${:02X}", addr, val)
                    });
                }
            }
            0xC000..=0xFFFB => self.ram[addr as usize & (RAM_SIZE - 1)] = val,
            _ => {
                self.ram[addr as usize & (RAM_SIZE - 1)] = val;
                self.write_mapper(addr, val);
            }
        }
    }

    fn io_read(&mut self, port: u8) -> u8 {
        let odd = port & 1 != 0;
        match port & 0xC0 {
            0x40 => {
                let vdp = self.vdp.borrow();
                if odd {
                    vdp.hcounter()
                } else {
                    vdp.vcounter()
                }
            }
            0x80 => {
                let mut vdp = self.vdp.borrow_mut();
                if odd {
                    vdp.read_status()
                } else {
                    vdp.read_data()
                }
            }
            0xC0 => {
                if odd {
                    self.ports[PORT_CONTROLLER_2 as usize]
                } else {
                    self.ports[PORT_CONTROLLER_1 as usize]
                }
            }
            _ => {
                log(LogCategory::Bus, LogLevel::Trace, || {
                    format!("Bus: read from unmapped port ${:02X}", port)
                });
                0xFF
            }
        }
    }

    fn io_write(&mut self, port: u8, val: u8) {
        match port & 0xC0 {
            0x40 => self.psg.borrow_mut().write(val),
            0x80 => {
                let mut vdp = self.vdp.borrow_mut();
                if port & 1 != 0 {
                    vdp.write_control(val);
                } else {
                    vdp.write_data(val);
                }
            }
            _ => {
                if port == 0x3E || port == 0x3F {
                    log(LogCategory::Bus, LogLevel::Debug, || {
                        format!("Bus: memory control port ${:02X} = ${:02X}", port, val)
                    });
                } else {
                    log(LogCategory::Bus, LogLevel::Trace, || {
                        format!("Bus: write to unmapped port ${:02X} = ${:02X}", port, val)
                    });
                }
                self.ports[port as usize] = val;
            }
        }
    }

    fn irq_asserted(&self) -> bool {
        self.vdp.borrow().irq_pending()
    }

    fn take_nmi(&mut self) -> bool {
        if self.pause_requested && self.vdp.borrow().vcounter() == PAUSE_SAMPLE_LINE {
            self.pause_requested = false;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu_core::timing::TimingMode;

    fn make_bus(pages: usize) -> SmsBus {
        let mut rom = vec![0; pages * PAGE_SIZE];
        // Mark each bank with its number
        for i in 0..pages {
            rom[i * PAGE_SIZE] = i as u8;
            rom[i * PAGE_SIZE + 0x1000] = 0x80 | i as u8;
        }
        let cartridge = Cartridge::load(&rom).unwrap();
        let vdp = Rc::new(RefCell::new(Vdp::new(TimingMode::Ntsc)));
        let psg = Rc::new(RefCell::new(Sn76489Psg::new(TimingMode::Ntsc, 44_100)));
        SmsBus::new(cartridge, vdp, psg)
    }

    #[test]
    fn test_ram_read_write() {
        let mut bus = make_bus(2);
        bus.write(0xC000, 0x42);
        assert_eq!(bus.read(0xC000), 0x42);
        // Check RAM mirror
        assert_eq!(bus.read(0xE000), 0x42);
        bus.write(0xFFFB, 0x99);
        assert_eq!(bus.read(0xDFFB), 0x99);
    }

    #[test]
    fn test_rom_read() {
        let bus = make_bus(2);
        assert_eq!(bus.read(0x1000), 0x80);
        assert_eq!(bus.read(0x5000), 0x81);
    }

    #[test]
    fn test_banking() {
        let mut bus = make_bus(8);

        // Initially bank 0, 1, 2 should be mapped
        assert_eq!(bus.read(0x4000), 1);
        assert_eq!(bus.read(0x8000), 2);

        // Switch frame 2 to bank 5
        bus.write(0xFFFF, 5);
        assert_eq!(bus.read(0x8000), 5);
        assert_eq!(bus.read(0xFFFF), 5);
        // The register is also stored in RAM
        assert_eq!(bus.read(0xDFFF), 5);

        // Page numbers wrap at the page count when mapped
        bus.write(0xFFFE, 9);
        assert_eq!(bus.read(0x4000), 1);
        assert_eq!(bus.read(0xFFFE), 9);
        assert_eq!(bus.bank_state().pages, [0, 9, 5]);
    }

    #[test]
    fn test_upper_ram_reads_back_writes() {
        let mut bus = make_bus(4);
        for addr in 0xC000..=0xFFFFu16 {
            for val in [0x00, 0x03, 0x04, 0x07, 0x80, 0xFF] {
                bus.write(addr, val);
                assert_eq!(bus.read(addr), val, "address ${:04X}", addr);
            }
        }
    }

    #[test]
    fn test_frame_0_maps_page_offset() {
        let mut rom = vec![0; 4 * PAGE_SIZE];
        for page in 0..4 {
            rom[page * PAGE_SIZE] = 0xA0 | page as u8;
            rom[page * PAGE_SIZE + 0x400] = 0xB0 | page as u8;
        }
        let vdp = Rc::new(RefCell::new(Vdp::new(TimingMode::Ntsc)));
        let psg = Rc::new(RefCell::new(Sn76489Psg::new(TimingMode::Ntsc, 44_100)));
        let mut bus = SmsBus::new(Cartridge::load(&rom).unwrap(), vdp, psg);

        bus.write(0xFFFD, 2);
        // 0x0400 is offset 0x400 of the selected page, not its first byte
        assert_eq!(bus.read(0x0400), 0xB2);
        assert_eq!(bus.read(0x03FF), 0);
        assert_eq!(bus.read(0x0000), 0xA0);

        // Out of range page numbers wrap
        bus.write(0xFFFD, 6);
        assert_eq!(bus.read(0x0400), 0xB2);
        assert_eq!(bus.read(0xFFFD), 6);
    }

    #[test]
    fn test_boot_area_is_fixed() {
        let mut bus = make_bus(4);
        bus.write(0xFFFD, 3);
        // First 1KB still comes from page 0
        assert_eq!(bus.read(0x0000), 0);
        assert_eq!(bus.read(0x1000), 0x83);
    }

    #[test]
    fn test_rom_writes_ignored() {
        let mut bus = make_bus(4);
        bus.write(0x8000, 0x55);
        assert_eq!(bus.read(0x8000), 2);
    }

    #[test]
    fn test_cartridge_ram() {
        let mut bus = make_bus(4);
        bus.write(0xFFFC, RAM_ENABLE);
        bus.write(0x8000, 0x55);
        assert_eq!(bus.read(0x8000), 0x55);

        // Second RAM page is separate
        bus.write(0xFFFC, RAM_ENABLE | RAM_PAGE_SELECT);
        assert_eq!(bus.read(0x8000), 0);
        bus.write(0xBFFF, 0x66);

        // Back to ROM, RAM contents retained
        bus.write(0xFFFC, 0);
        assert_eq!(bus.read(0x8000), 2);
        bus.write(0xFFFC, RAM_ENABLE);
        assert_eq!(bus.read(0x8000), 0x55);
        assert_eq!(bus.cartridge().read_ram(1, 0x3FFF), 0x66);
    }

    #[test]
    fn test_controllers() {
        let mut bus = make_bus(1);
        assert_eq!(bus.io_read(0xDC), 0xFF);
        assert_eq!(bus.io_read(0xDD), 0xFF);

        bus.set_controller_1(0xFE);
        bus.set_controller_2(0x7F);
        assert_eq!(bus.io_read(0xDC), 0xFE);
        assert_eq!(bus.io_read(0xC0), 0xFE);
        assert_eq!(bus.io_read(0xDD), 0x7F);
        assert_eq!(bus.io_read(0xC1), 0x7F);
    }

    #[test]
    fn test_unmapped_ports() {
        let mut bus = make_bus(1);
        bus.io_write(0x3E, 0xAB);
        assert_eq!(bus.port(0x3E), 0xAB);
        assert_eq!(bus.io_read(0x3E), 0xFF);
        assert_eq!(bus.io_read(0x00), 0xFF);
    }

    #[test]
    fn test_vdp_ports() {
        let mut bus = make_bus(1);
        // Register 1 = 0x20 via the odd alias 0xBF
        bus.io_write(0xBF, 0x20);
        bus.io_write(0xBF, 0x81);
        assert_eq!(bus.vdp.borrow().state().registers[1], 0x20);

        // VRAM write through the even alias 0x80
        bus.io_write(0x81, 0x00);
        bus.io_write(0x81, 0x40);
        bus.io_write(0x80, 0x5A);
        bus.io_write(0x81, 0x00);
        bus.io_write(0x81, 0x00);
        assert_eq!(bus.io_read(0xBE), 0x5A);
    }

    #[test]
    fn test_counter_ports() {
        let mut bus = make_bus(1);
        bus.vdp.borrow_mut().update(228 * 3 + 100);
        assert_eq!(bus.io_read(0x7E), 3);
        assert_eq!(bus.io_read(0x7F), 75);
        assert_eq!(bus.io_read(0x40), 3);
    }

    #[test]
    fn test_pause_waits_for_sample_line() {
        let mut bus = make_bus(1);
        bus.set_pause(true);
        assert!(!bus.take_nmi());

        bus.vdp.borrow_mut().update(228 * PAUSE_SAMPLE_LINE as u32);
        assert!(bus.take_nmi());
        // Delivered once per press
        assert!(!bus.take_nmi());

        bus.set_pause(true);
        assert!(!bus.pause_requested);
        bus.set_pause(false);
        bus.set_pause(true);
        assert!(bus.pause_requested);
    }

    #[test]
    fn test_irq_follows_vdp() {
        let mut bus = make_bus(1);
        bus.io_write(0xBF, 0x20);
        bus.io_write(0xBF, 0x81);
        assert!(!bus.irq_asserted());
        bus.vdp.borrow_mut().update(228 * 193);
        assert!(bus.irq_asserted());
        bus.io_read(0xBF);
        assert!(!bus.irq_asserted());
    }
}
