//! Sega Master System Video Display Processor (VDP)
//!
//! The VDP is based on the Texas Instruments TMS9918A and handles all video output.
//!
//! # Features
//! - 256×192 pixel resolution
//! - 64 color palette (32 simultaneous)
//! - Tilemap-based background rendering with scroll locks
//! - 64 sprites with 8 per scanline limit, zoom and 8×16 mode
//! - Line and frame interrupts
//!
//! # Timing
//! The VDP is clocked by elapsed CPU cycles. Every scanline's worth of cycles the
//! current scanline is finished and the vertical counter advances. The counter
//! does not count linearly: it runs up to a jump point, skips back, and then
//! counts up to 0xFF, giving 262 lines on NTSC and 313 on PAL.

use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::renderer::Renderer;
use emu_core::timing::TimingMode;
use emu_core::types::Frame;
use serde::{Deserialize, Serialize};

pub const SCREEN_WIDTH: u32 = 256;
pub const SCREEN_HEIGHT: u32 = 192;

const VRAM_SIZE: usize = 0x4000;
const CRAM_SIZE: usize = 0x20;
const REGISTER_COUNT: usize = 11;

/// Vertical counter value at which the frame interrupt is raised
pub const VBLANK_LINE: u8 = SCREEN_HEIGHT as u8 + 1;

/// Sprite table terminator in 192-line mode
const SPRITE_END: u8 = 0xD0;
const SPRITES_PER_LINE: usize = 8;

/// Background tiles are 28 rows tall
const BACKGROUND_HEIGHT: usize = 224;

pub type FrameCallback = Box<dyn FnMut(&Frame)>;

/// Serializable VDP registers and counters (VRAM is not included)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VdpState {
    pub registers: [u8; REGISTER_COUNT],
    pub cram: Vec<u8>,
    pub address: u16,
    pub code: u8,
    pub vcounter: u8,
    pub line_cycles: u32,
    pub line_counter: u8,
    pub frame_pending: bool,
    pub line_pending: bool,
}

/// Background pixel for compositing
#[derive(Clone, Copy)]
struct TilePixel {
    color: u8,
    palette: usize,
    priority: bool,
}

/// VDP state and rendering
pub struct Vdp {
    // Video RAM (16KB)
    vram: Vec<u8>,

    // Color RAM (32 bytes for palette)
    cram: [u8; CRAM_SIZE],

    // VDP registers (11 registers)
    registers: [u8; REGISTER_COUNT],

    // Control port
    address: u16,
    code: u8,
    read_buffer: u8,
    second_byte: bool,

    // Counters
    timing: TimingMode,
    line_cycles: u32,
    vcounter: u8,
    line_counter: u8,

    // Status
    frame_pending: bool,
    line_pending: bool,
    sprite_overflow: bool,
    sprite_collision: bool,

    // Rendering
    frame: Frame,
    frame_count: u64,
    on_frame: Option<FrameCallback>,
}

impl Vdp {
    /// Create a new VDP
    pub fn new(timing: TimingMode) -> Self {
        Self {
            vram: vec![0; VRAM_SIZE],
            cram: [0; CRAM_SIZE],
            registers: [0; REGISTER_COUNT],
            address: 0,
            code: 0,
            read_buffer: 0,
            second_byte: false,
            timing,
            line_cycles: 0,
            vcounter: 0,
            line_counter: 0xFF,
            frame_pending: false,
            line_pending: false,
            sprite_overflow: false,
            sprite_collision: false,
            frame: Frame::new(SCREEN_WIDTH, SCREEN_HEIGHT),
            frame_count: 0,
            on_frame: None,
        }
    }

    /// Register a callback receiving each completed frame
    pub fn set_frame_callback(&mut self, callback: FrameCallback) {
        self.on_frame = Some(callback);
    }

    pub fn timing(&self) -> TimingMode {
        self.timing
    }

    /// Write to VDP control port (0xBF)
    pub fn write_control(&mut self, data: u8) {
        if !self.second_byte {
            // First byte - lower 8 bits of address
            self.address = (self.address & 0x3F00) | data as u16;
            self.second_byte = true;
            return;
        }

        // Second byte - upper 6 bits of address + code
        self.second_byte = false;
        self.address = (self.address & 0x00FF) | ((data as u16 & 0x3F) << 8);
        self.code = data >> 6;

        match self.code {
            0 => {
                // Prime the read buffer
                self.read_buffer = self.vram[self.address as usize];
                self.advance_address();
            }
            2 => {
                let reg = (data & 0x0F) as usize;
                if reg < REGISTER_COUNT {
                    self.write_register(reg, self.address as u8);
                }
            }
            _ => {}
        }
    }

    fn write_register(&mut self, reg: usize, val: u8) {
        log(LogCategory::Video, LogLevel::Debug, || {
            format!("VDP: R{} = ${:02X}", reg, val)
        });
        self.registers[reg] = val;
    }

    /// Write to VDP data port (0xBE)
    pub fn write_data(&mut self, data: u8) {
        self.second_byte = false;
        self.read_buffer = data;

        if self.code == 3 {
            self.cram[self.address as usize & (CRAM_SIZE - 1)] = data;
        } else {
            self.vram[self.address as usize] = data;
        }
        self.advance_address();
    }

    /// Read from VDP data port (0xBE)
    pub fn read_data(&mut self) -> u8 {
        self.second_byte = false;
        let value = self.read_buffer;
        self.read_buffer = self.vram[self.address as usize];
        self.advance_address();
        value
    }

    fn advance_address(&mut self) {
        self.address = (self.address + 1) & (VRAM_SIZE as u16 - 1);
    }

    /// Read from VDP status port (0xBF); clears all flags and the control latch
    pub fn read_status(&mut self) -> u8 {
        let mut status = 0;
        if self.frame_pending {
            status |= 0x80;
        }
        if self.sprite_overflow {
            status |= 0x40;
        }
        if self.sprite_collision {
            status |= 0x20;
        }

        self.frame_pending = false;
        self.line_pending = false;
        self.sprite_overflow = false;
        self.sprite_collision = false;
        self.second_byte = false;

        status
    }

    /// Vertical counter (port 0x7E)
    pub fn vcounter(&self) -> u8 {
        self.vcounter
    }

    /// Horizontal counter (port 0x7F), in pixel clocks halved
    pub fn hcounter(&self) -> u8 {
        ((self.line_cycles * 3 / 2) >> 1) as u8
    }

    /// Level of the interrupt line
    pub fn irq_pending(&self) -> bool {
        (self.frame_pending && self.registers[1] & 0x20 != 0)
            || (self.line_pending && self.registers[0] & 0x10 != 0)
    }

    pub fn display_enabled(&self) -> bool {
        self.registers[1] & 0x40 != 0
    }

    /// Number of frames started so far (counted at the start of vertical blank)
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Advance by `cycles` CPU cycles
    pub fn update(&mut self, cycles: u32) {
        let line_length = self.timing.cycles_per_line();
        self.line_cycles += cycles;
        while self.line_cycles >= line_length {
            self.line_cycles -= line_length;
            self.end_line();
        }
    }

    fn end_line(&mut self) {
        if (self.vcounter as u32) < SCREEN_HEIGHT {
            self.render_line(self.vcounter);
        }

        self.vcounter = self.next_vcounter();

        if self.vcounter as u32 <= SCREEN_HEIGHT {
            if self.line_counter == 0 {
                self.line_counter = self.registers[10];
                self.line_pending = true;
                log(LogCategory::Video, LogLevel::Trace, || {
                    format!("VDP: line interrupt at line {}", self.vcounter)
                });
            } else {
                self.line_counter -= 1;
            }
        } else {
            self.line_counter = self.registers[10];
        }

        if self.vcounter == VBLANK_LINE {
            self.frame_pending = true;
            self.frame_count += 1;
            log(LogCategory::Video, LogLevel::Trace, || {
                format!("VDP: frame interrupt, frame {}", self.frame_count)
            });
            if self.display_enabled() {
                if let Some(callback) = self.on_frame.as_mut() {
                    callback(&self.frame);
                }
            }
        }
    }

    /// Next value in the vertical counter sequence
    fn next_vcounter(&self) -> u8 {
        let (jump_from, jump_to) = match self.timing {
            TimingMode::Ntsc => (0xDA, 0xD5),
            TimingMode::Pal => (0xF2, 0xBA),
        };
        if self.vcounter == jump_from {
            jump_to
        } else {
            self.vcounter.wrapping_add(1)
        }
    }

    /// Render a single scanline: sprites, then background, then backdrop
    fn render_line(&mut self, line: u8) {
        let offset = line as usize * SCREEN_WIDTH as usize;
        let backdrop = decode_color(self.cram[16 + (self.registers[7] & 0x0F) as usize]);

        if !self.display_enabled() {
            self.frame.pixels[offset..offset + SCREEN_WIDTH as usize].fill(backdrop);
            return;
        }

        let sprites = self.render_sprites(line);

        for x in 0..SCREEN_WIDTH as usize {
            let bg = self.background_pixel(line, x);
            let index = match sprites[x] {
                Some(sprite) if !(bg.priority && bg.color != 0) => 16 + sprite as usize,
                _ => bg.palette * 16 + bg.color as usize,
            };
            self.frame.pixels[offset + x] = decode_color(self.cram[index]);
        }

        // Left column blank
        if self.registers[0] & 0x20 != 0 {
            self.frame.pixels[offset..offset + 8].fill(backdrop);
        }
    }

    /// Sprite pixels for one line (palette 1 color indices)
    fn render_sprites(&mut self, line: u8) -> [Option<u8>; SCREEN_WIDTH as usize] {
        let mut pixels = [None; SCREEN_WIDTH as usize];

        let table = ((self.registers[5] & 0x7E) as usize) << 7;
        let tall = self.registers[1] & 0x02 != 0;
        let scale = if self.registers[1] & 0x01 != 0 { 2 } else { 1 };
        let height = (if tall { 16 } else { 8 }) * scale;
        let tile_base = if self.registers[6] & 0x04 != 0 { 0x100 } else { 0 };
        let shift = if self.registers[0] & 0x08 != 0 { 8 } else { 0 };

        let mut count = 0;
        for i in 0..64 {
            let y = self.vram[table + i];
            if y == SPRITE_END {
                break;
            }

            // Y values past 240 wrap to the top of the screen
            let top = if y > 240 { y as i32 - 256 } else { y as i32 } + 1;
            let row = line as i32 - top;
            if row < 0 || row >= height {
                continue;
            }

            count += 1;
            if count > SPRITES_PER_LINE {
                self.sprite_overflow = true;
                break;
            }

            let x = self.vram[table + 0x80 + i * 2] as i32 - shift;
            let mut tile = self.vram[table + 0x81 + i * 2] as usize;
            if tall {
                tile &= 0xFE;
            }
            let addr = (tile_base + tile) * 32 + (row / scale) as usize * 4;

            for px in 0..8 * scale {
                let sx = x + px;
                if !(0..SCREEN_WIDTH as i32).contains(&sx) {
                    continue;
                }
                let color = self.pattern_pixel(addr, (px / scale) as usize);
                if color == 0 {
                    continue;
                }
                let slot = &mut pixels[sx as usize];
                if slot.is_some() {
                    self.sprite_collision = true;
                } else {
                    *slot = Some(color);
                }
            }
        }

        pixels
    }

    fn background_pixel(&self, line: u8, x: usize) -> TilePixel {
        let name_table = ((self.registers[2] & 0x0E) as usize) << 10;

        let hscroll = if self.registers[0] & 0x40 != 0 && line < 16 {
            0
        } else {
            self.registers[8]
        };
        let vscroll = if self.registers[0] & 0x80 != 0 && x / 8 >= 24 {
            0
        } else {
            self.registers[9]
        };

        let src_x = (x as u8).wrapping_sub(hscroll) as usize;
        let src_y = (line as usize + vscroll as usize) % BACKGROUND_HEIGHT;

        let entry_addr = name_table + (src_y / 8) * 64 + (src_x / 8) * 2;
        let entry = self.vram[entry_addr & (VRAM_SIZE - 1)] as u16
            | (self.vram[(entry_addr + 1) & (VRAM_SIZE - 1)] as u16) << 8;

        let tile = (entry & 0x1FF) as usize;
        let hflip = entry & 0x0200 != 0;
        let vflip = entry & 0x0400 != 0;

        let row = if vflip { 7 - src_y % 8 } else { src_y % 8 };
        let col = if hflip { 7 - src_x % 8 } else { src_x % 8 };

        TilePixel {
            color: self.pattern_pixel(tile * 32 + row * 4, col),
            palette: ((entry >> 11) & 1) as usize,
            priority: entry & 0x1000 != 0,
        }
    }

    /// 4-bit pixel `col` from the pattern row at `addr`
    fn pattern_pixel(&self, addr: usize, col: usize) -> u8 {
        let shift = 7 - col;
        (0..4).fold(0, |pixel, plane| {
            let byte = self.vram[(addr + plane) & (VRAM_SIZE - 1)];
            pixel | (((byte >> shift) & 1) << plane)
        })
    }

    pub fn state(&self) -> VdpState {
        VdpState {
            registers: self.registers,
            cram: self.cram.to_vec(),
            address: self.address,
            code: self.code,
            vcounter: self.vcounter,
            line_cycles: self.line_cycles,
            line_counter: self.line_counter,
            frame_pending: self.frame_pending,
            line_pending: self.line_pending,
        }
    }

    pub fn restore(&mut self, state: &VdpState) {
        self.registers = state.registers;
        for (dst, src) in self.cram.iter_mut().zip(&state.cram) {
            *dst = *src;
        }
        self.address = state.address & (VRAM_SIZE as u16 - 1);
        self.code = state.code & 0x03;
        self.vcounter = state.vcounter;
        self.line_cycles = state.line_cycles % self.timing.cycles_per_line();
        self.line_counter = state.line_counter;
        self.frame_pending = state.frame_pending;
        self.line_pending = state.line_pending;
    }
}

/// Decode 6-bit SMS color to 32-bit ARGB
pub fn decode_color(color: u8) -> u32 {
    // SMS uses 6-bit color: --BBGGRR
    let r = (color & 0x03) as u32 * 85;
    let g = ((color >> 2) & 0x03) as u32 * 85;
    let b = ((color >> 4) & 0x03) as u32 * 85;

    0xFF000000 | (r << 16) | (g << 8) | b
}

impl Renderer for Vdp {
    fn get_frame(&self) -> &Frame {
        &self.frame
    }

    fn clear(&mut self, color: u32) {
        self.frame.pixels.fill(color);
    }

    fn name(&self) -> &str {
        "SMS VDP"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn set_register(vdp: &mut Vdp, reg: u8, val: u8) {
        vdp.write_control(val);
        vdp.write_control(0x80 | reg);
    }

    fn set_vram_address(vdp: &mut Vdp, addr: u16) {
        vdp.write_control(addr as u8);
        vdp.write_control(0x40 | (addr >> 8) as u8);
    }

    fn set_cram(vdp: &mut Vdp, index: u8, color: u8) {
        vdp.write_control(index);
        vdp.write_control(0xC0);
        vdp.write_data(color);
    }

    /// Fill one 8x8 tile with a solid color index
    fn solid_tile(vdp: &mut Vdp, tile: u16, color: u8) {
        set_vram_address(vdp, tile * 32);
        for _ in 0..8 {
            for plane in 0..4 {
                vdp.write_data(if color & (1 << plane) != 0 { 0xFF } else { 0 });
            }
        }
    }

    fn run_lines(vdp: &mut Vdp, lines: u32) {
        vdp.update(lines * TimingMode::Ntsc.cycles_per_line());
    }

    #[test]
    fn test_vdp_creation() {
        let vdp = Vdp::new(TimingMode::Ntsc);
        assert_eq!(vdp.frame.pixels.len(), 256 * 192);
        assert_eq!(vdp.vcounter(), 0);
    }

    #[test]
    fn test_vdp_register_write() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        set_register(&mut vdp, 0, 0x00);
        assert_eq!(vdp.registers[0], 0x00);
        set_register(&mut vdp, 1, 0xA0);
        assert_eq!(vdp.registers[1], 0xA0);

        // Index 11 and above is ignored
        set_register(&mut vdp, 12, 0x55);
        assert!(!vdp.registers.contains(&0x55));
    }

    #[test]
    fn test_vdp_vram_write() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        set_vram_address(&mut vdp, 0x1234);
        vdp.write_data(0x42);
        assert_eq!(vdp.vram[0x1234], 0x42);
    }

    #[test]
    fn test_vram_address_wraps() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        set_vram_address(&mut vdp, 0x3FFF);
        vdp.write_data(1);
        vdp.write_data(2);
        assert_eq!(vdp.vram[0x3FFF], 1);
        assert_eq!(vdp.vram[0x0000], 2);
    }

    #[test]
    fn test_read_buffer_is_primed() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        set_vram_address(&mut vdp, 0x0100);
        vdp.write_data(0xAA);
        vdp.write_data(0xBB);

        // Code 0 fills the buffer from the address, then increments
        vdp.write_control(0x00);
        vdp.write_control(0x01);
        assert_eq!(vdp.read_data(), 0xAA);
        assert_eq!(vdp.read_data(), 0xBB);
    }

    #[test]
    fn test_cram_write() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        set_cram(&mut vdp, 0x21, 0x3F); // index wraps to 1
        assert_eq!(vdp.cram[1], 0x3F);
    }

    #[test]
    fn test_status_read_clears_latch() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        vdp.write_control(0x34);
        vdp.read_status();
        // Treated as a first byte again
        vdp.write_control(0x12);
        vdp.write_control(0x40);
        assert_eq!(vdp.address, 0x0012);
    }

    #[test]
    fn test_vdp_color_decode() {
        assert_eq!(decode_color(0x00), 0xFF000000);
        assert_eq!(decode_color(0x3F), 0xFFFFFFFF);
        assert_eq!(decode_color(0x03), 0xFFFF0000);
        assert_eq!(decode_color(0x0C), 0xFF00FF00);
        assert_eq!(decode_color(0x30), 0xFF0000FF);
    }

    #[test]
    fn test_ntsc_vcounter_sequence() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        let mut seen = Vec::new();
        for _ in 0..262 {
            seen.push(vdp.vcounter());
            run_lines(&mut vdp, 1);
        }
        assert_eq!(vdp.vcounter(), 0);
        assert_eq!(seen[0xDA], 0xDA);
        assert_eq!(seen[0xDB], 0xD5);
        assert_eq!(seen[261], 0xFF);
    }

    #[test]
    fn test_pal_vcounter_sequence() {
        let mut vdp = Vdp::new(TimingMode::Pal);
        let mut seen = Vec::new();
        for _ in 0..313 {
            seen.push(vdp.vcounter());
            run_lines(&mut vdp, 1);
        }
        assert_eq!(vdp.vcounter(), 0);
        assert_eq!(seen[0xF2], 0xF2);
        assert_eq!(seen[0xF3], 0xBA);
        assert_eq!(seen[312], 0xFF);
    }

    #[test]
    fn test_hcounter() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        assert_eq!(vdp.hcounter(), 0);
        vdp.update(100);
        assert_eq!(vdp.hcounter(), 75);
        vdp.update(TimingMode::Ntsc.cycles_per_line() - 100);
        assert_eq!(vdp.hcounter(), 0);
        assert_eq!(vdp.vcounter(), 1);
    }

    #[test]
    fn test_frame_interrupt() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        run_lines(&mut vdp, VBLANK_LINE as u32);
        assert!(vdp.frame_pending);
        // Disabled in register 1
        assert!(!vdp.irq_pending());

        // Enabling it raises the line straight away
        set_register(&mut vdp, 1, 0x20);
        assert!(vdp.irq_pending());

        assert_eq!(vdp.read_status() & 0x80, 0x80);
        assert!(!vdp.irq_pending());
        assert_eq!(vdp.read_status(), 0);
    }

    #[test]
    fn test_line_interrupt() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        set_register(&mut vdp, 0, 0x10);
        set_register(&mut vdp, 10, 4);

        // Let the counter reload outside the active area first
        run_lines(&mut vdp, 262);
        vdp.read_status();
        assert_eq!(vdp.vcounter(), 0);

        // Line 0 already counted once
        run_lines(&mut vdp, 3);
        assert!(!vdp.irq_pending());
        run_lines(&mut vdp, 1);
        assert_eq!(vdp.vcounter(), 4);
        assert!(vdp.irq_pending());
        assert_eq!(vdp.line_counter, 4);
    }

    #[test]
    fn test_frame_callback_requires_display() {
        let frames = Rc::new(Cell::new(0));
        let counter = Rc::clone(&frames);

        let mut vdp = Vdp::new(TimingMode::Ntsc);
        vdp.set_frame_callback(Box::new(move |frame: &Frame| {
            assert_eq!(frame.width, SCREEN_WIDTH);
            counter.set(counter.get() + 1);
        }));

        run_lines(&mut vdp, 262);
        assert_eq!(frames.get(), 0);
        assert_eq!(vdp.frame_count(), 1);

        set_register(&mut vdp, 1, 0x40);
        run_lines(&mut vdp, 262);
        assert_eq!(frames.get(), 1);
        assert_eq!(vdp.frame_count(), 2);
    }

    #[test]
    fn test_backdrop_when_blanked() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        set_cram(&mut vdp, 16 + 3, 0x03);
        set_register(&mut vdp, 7, 0x03);
        run_lines(&mut vdp, 1);
        assert_eq!(vdp.frame.pixel(0, 0), 0xFFFF0000);
        assert_eq!(vdp.frame.pixel(255, 0), 0xFFFF0000);
    }

    #[test]
    fn test_background_tile() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        set_register(&mut vdp, 1, 0x40);
        set_register(&mut vdp, 2, 0x0E); // name table at 0x3800
        set_cram(&mut vdp, 5, 0x0C);
        solid_tile(&mut vdp, 1, 5);

        // Tile 1 at column 2, row 0
        set_vram_address(&mut vdp, 0x3800 + 2 * 2);
        vdp.write_data(0x01);
        vdp.write_data(0x00);

        run_lines(&mut vdp, 1);
        assert_eq!(vdp.frame.pixel(16, 0), 0xFF00FF00);
        assert_eq!(vdp.frame.pixel(23, 0), 0xFF00FF00);
        assert_eq!(vdp.frame.pixel(24, 0), decode_color(0));
    }

    #[test]
    fn test_horizontal_scroll_and_lock() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        set_register(&mut vdp, 1, 0x40);
        set_register(&mut vdp, 2, 0x0E);
        set_register(&mut vdp, 8, 8);
        set_cram(&mut vdp, 5, 0x0C);
        solid_tile(&mut vdp, 1, 5);
        set_vram_address(&mut vdp, 0x3800);
        vdp.write_data(0x01);
        vdp.write_data(0x00);

        // Scrolled 8 pixels right
        assert_eq!(vdp.background_pixel(0, 8).color, 5);
        assert_eq!(vdp.background_pixel(0, 0).color, 0);

        // Top two rows locked
        set_register(&mut vdp, 0, 0x40);
        assert_eq!(vdp.background_pixel(0, 0).color, 5);
    }

    #[test]
    fn test_sprite_drawn_and_priority() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        set_register(&mut vdp, 1, 0x40);
        set_register(&mut vdp, 2, 0x0E);
        set_register(&mut vdp, 5, 0x7E); // sprite table at 0x3F00
        set_cram(&mut vdp, 2, 0x0C); // background color 2: green
        set_cram(&mut vdp, 16 + 3, 0x03); // sprite color 3: red
        solid_tile(&mut vdp, 1, 2);
        solid_tile(&mut vdp, 2, 3);

        // Sprite 0 at (16, 0) using tile 2
        set_vram_address(&mut vdp, 0x3F00);
        vdp.write_data(0xFF); // Y = -1, visible from line 0
        vdp.write_data(SPRITE_END);
        set_vram_address(&mut vdp, 0x3F80);
        vdp.write_data(16);
        vdp.write_data(2);

        // Background tile 1 under the sprite, no priority
        set_vram_address(&mut vdp, 0x3800 + 2 * 2);
        vdp.write_data(0x01);
        vdp.write_data(0x00);

        run_lines(&mut vdp, 1);
        assert_eq!(vdp.frame.pixel(16, 0), 0xFFFF0000);

        // Priority bit puts the background in front
        set_vram_address(&mut vdp, 0x3800 + 2 * 2 + 1);
        vdp.write_data(0x10);
        run_lines(&mut vdp, 1);
        assert_eq!(vdp.frame.pixel(16, 1), 0xFF00FF00);
    }

    #[test]
    fn test_sprite_overflow_and_collision() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        set_register(&mut vdp, 1, 0x40);
        set_register(&mut vdp, 5, 0x7E);
        solid_tile(&mut vdp, 1, 1);

        set_vram_address(&mut vdp, 0x3F00);
        for _ in 0..9 {
            vdp.write_data(0xFF);
        }
        vdp.write_data(SPRITE_END);
        set_vram_address(&mut vdp, 0x3F80);
        for i in 0..9 {
            vdp.write_data(i * 4);
            vdp.write_data(1);
        }

        run_lines(&mut vdp, 1);
        let status = vdp.read_status();
        assert_eq!(status & 0x40, 0x40);
        assert_eq!(status & 0x20, 0x20);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut vdp = Vdp::new(TimingMode::Ntsc);
        set_register(&mut vdp, 7, 0x05);
        set_cram(&mut vdp, 3, 0x2A);
        run_lines(&mut vdp, 10);

        let state = vdp.state();
        let json = serde_json::to_string(&state).unwrap();
        let mut other = Vdp::new(TimingMode::Ntsc);
        other.restore(&serde_json::from_str(&json).unwrap());
        assert_eq!(other.state(), state);
        assert_eq!(other.vcounter(), 10);
    }
}
