//! Z80 register file
//!
//! The flag register is stored once, packed into `f`; the named flag
//! accessors read and write bits of that byte.

use serde::{Deserialize, Serialize};

/// Sign
pub const FLAG_S: u8 = 0b1000_0000;
/// Zero
pub const FLAG_Z: u8 = 0b0100_0000;
/// Undocumented copy of result bit 5
pub const FLAG_Y: u8 = 0b0010_0000;
/// Half carry
pub const FLAG_H: u8 = 0b0001_0000;
/// Undocumented copy of result bit 3
pub const FLAG_X: u8 = 0b0000_1000;
/// Parity / overflow
pub const FLAG_PV: u8 = 0b0000_0100;
/// Subtract
pub const FLAG_N: u8 = 0b0000_0010;
/// Carry
pub const FLAG_C: u8 = 0b0000_0001;

/// Both undocumented flag bits
pub const FLAGS_XY: u8 = FLAG_X | FLAG_Y;

/// Main and shadow register sets plus the special-purpose registers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    /// Shadow set, swapped in by EX AF,AF' and EXX
    pub a_prime: u8,
    pub f_prime: u8,
    pub b_prime: u8,
    pub c_prime: u8,
    pub d_prime: u8,
    pub e_prime: u8,
    pub h_prime: u8,
    pub l_prime: u8,

    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,

    /// Interrupt vector base
    pub i: u8,
    /// Memory refresh counter; bit 7 is only changed by LD R,A
    pub r: u8,
}

impl Registers {
    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f])
    }

    pub fn set_af(&mut self, val: u16) {
        [self.a, self.f] = val.to_be_bytes();
    }

    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    pub fn set_bc(&mut self, val: u16) {
        [self.b, self.c] = val.to_be_bytes();
    }

    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    pub fn set_de(&mut self, val: u16) {
        [self.d, self.e] = val.to_be_bytes();
    }

    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    pub fn set_hl(&mut self, val: u16) {
        [self.h, self.l] = val.to_be_bytes();
    }

    pub fn ixh(&self) -> u8 {
        (self.ix >> 8) as u8
    }

    pub fn ixl(&self) -> u8 {
        self.ix as u8
    }

    pub fn set_ixh(&mut self, val: u8) {
        self.ix = (self.ix & 0x00FF) | ((val as u16) << 8);
    }

    pub fn set_ixl(&mut self, val: u8) {
        self.ix = (self.ix & 0xFF00) | val as u16;
    }

    pub fn iyh(&self) -> u8 {
        (self.iy >> 8) as u8
    }

    pub fn iyl(&self) -> u8 {
        self.iy as u8
    }

    pub fn set_iyh(&mut self, val: u8) {
        self.iy = (self.iy & 0x00FF) | ((val as u16) << 8);
    }

    pub fn set_iyl(&mut self, val: u8) {
        self.iy = (self.iy & 0xFF00) | val as u16;
    }

    pub fn flag(&self, flag: u8) -> bool {
        self.f & flag != 0
    }

    pub fn set_flag(&mut self, flag: u8, val: bool) {
        if val {
            self.f |= flag;
        } else {
            self.f &= !flag;
        }
    }

    /// Advance the low seven bits of R, keeping bit 7
    pub fn increment_r(&mut self) {
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
    }

    /// EX AF,AF'
    pub fn swap_af(&mut self) {
        std::mem::swap(&mut self.a, &mut self.a_prime);
        std::mem::swap(&mut self.f, &mut self.f_prime);
    }

    /// EXX
    pub fn swap_main(&mut self) {
        std::mem::swap(&mut self.b, &mut self.b_prime);
        std::mem::swap(&mut self.c, &mut self.c_prime);
        std::mem::swap(&mut self.d, &mut self.d_prime);
        std::mem::swap(&mut self.e, &mut self.e_prime);
        std::mem::swap(&mut self.h, &mut self.h_prime);
        std::mem::swap(&mut self.l, &mut self.l_prime);
    }
}
