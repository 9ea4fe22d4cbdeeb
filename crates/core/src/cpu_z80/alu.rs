//! Z80 arithmetic and logic
//!
//! Every operation is a pure function of its operands and the incoming flag
//! byte, returning the masked result together with the new flag byte. Bits 3
//! and 5 of F follow the documented undocumented behaviour (copied from the
//! result unless noted otherwise).

use super::instruction::{AccRot, AluOp, RotOp};
use super::registers::{FLAGS_XY, FLAG_C, FLAG_H, FLAG_N, FLAG_PV, FLAG_S, FLAG_X, FLAG_Z};

const KEEP_SZP: u8 = FLAG_S | FLAG_Z | FLAG_PV;

/// True when `v` has an even number of set bits
pub fn parity_even(v: u8) -> bool {
    v.count_ones() % 2 == 0
}

fn sz53(v: u8) -> u8 {
    let zero = if v == 0 { FLAG_Z } else { 0 };
    (v & (FLAG_S | FLAGS_XY)) | zero
}

fn sz53p(v: u8) -> u8 {
    let parity = if parity_even(v) { FLAG_PV } else { 0 };
    sz53(v) | parity
}

fn bool_flag(cond: bool, flag: u8) -> u8 {
    if cond {
        flag
    } else {
        0
    }
}

pub fn add8(a: u8, b: u8, carry: bool) -> (u8, u8) {
    let sum = a as u16 + b as u16 + carry as u16;
    let r = sum as u8;
    let f = sz53(r)
        | bool_flag((a ^ b ^ r) & 0x10 != 0, FLAG_H)
        | bool_flag((a ^ b) & 0x80 == 0 && (a ^ r) & 0x80 != 0, FLAG_PV)
        | bool_flag(sum > 0xFF, FLAG_C);
    (r, f)
}

pub fn sub8(a: u8, b: u8, carry: bool) -> (u8, u8) {
    let diff = (a as u16).wrapping_sub(b as u16).wrapping_sub(carry as u16);
    let r = diff as u8;
    let f = sz53(r)
        | FLAG_N
        | bool_flag((a ^ b ^ r) & 0x10 != 0, FLAG_H)
        | bool_flag((a ^ b) & 0x80 != 0 && (a ^ r) & 0x80 != 0, FLAG_PV)
        | bool_flag(diff > 0xFF, FLAG_C);
    (r, f)
}

/// CP: flags of A - b, with bits 3/5 taken from the operand
pub fn cp8(a: u8, b: u8) -> u8 {
    let (_, f) = sub8(a, b, false);
    (f & !FLAGS_XY) | (b & FLAGS_XY)
}

pub fn and8(a: u8, b: u8) -> (u8, u8) {
    let r = a & b;
    (r, sz53p(r) | FLAG_H)
}

pub fn or8(a: u8, b: u8) -> (u8, u8) {
    let r = a | b;
    (r, sz53p(r))
}

pub fn xor8(a: u8, b: u8) -> (u8, u8) {
    let r = a ^ b;
    (r, sz53p(r))
}

/// Accumulator group; `CP` leaves A unchanged
pub fn alu8(op: AluOp, a: u8, b: u8, f: u8) -> (u8, u8) {
    let carry = f & FLAG_C != 0;
    match op {
        AluOp::Add => add8(a, b, false),
        AluOp::Adc => add8(a, b, carry),
        AluOp::Sub => sub8(a, b, false),
        AluOp::Sbc => sub8(a, b, carry),
        AluOp::And => and8(a, b),
        AluOp::Xor => xor8(a, b),
        AluOp::Or => or8(a, b),
        AluOp::Cp => (a, cp8(a, b)),
    }
}

pub fn inc8(v: u8, f: u8) -> (u8, u8) {
    let r = v.wrapping_add(1);
    let flags = (f & FLAG_C)
        | sz53(r)
        | bool_flag(r & 0x0F == 0, FLAG_H)
        | bool_flag(r == 0x80, FLAG_PV);
    (r, flags)
}

pub fn dec8(v: u8, f: u8) -> (u8, u8) {
    let r = v.wrapping_sub(1);
    let flags = (f & FLAG_C)
        | sz53(r)
        | FLAG_N
        | bool_flag(v & 0x0F == 0, FLAG_H)
        | bool_flag(r == 0x7F, FLAG_PV);
    (r, flags)
}

/// ADD HL,rr (and the IX/IY forms): S, Z and P/V are preserved
pub fn add16(a: u16, b: u16, f: u8) -> (u16, u8) {
    let sum = a as u32 + b as u32;
    let r = sum as u16;
    let flags = (f & KEEP_SZP)
        | ((r >> 8) as u8 & FLAGS_XY)
        | bool_flag((a ^ b ^ r) & 0x1000 != 0, FLAG_H)
        | bool_flag(sum > 0xFFFF, FLAG_C);
    (r, flags)
}

pub fn adc16(a: u16, b: u16, f: u8) -> (u16, u8) {
    let sum = a as u32 + b as u32 + (f & FLAG_C) as u32;
    let r = sum as u16;
    let flags = bool_flag(r & 0x8000 != 0, FLAG_S)
        | bool_flag(r == 0, FLAG_Z)
        | ((r >> 8) as u8 & FLAGS_XY)
        | bool_flag((a ^ b ^ r) & 0x1000 != 0, FLAG_H)
        | bool_flag((a ^ b) & 0x8000 == 0 && (a ^ r) & 0x8000 != 0, FLAG_PV)
        | bool_flag(sum > 0xFFFF, FLAG_C);
    (r, flags)
}

pub fn sbc16(a: u16, b: u16, f: u8) -> (u16, u8) {
    let diff = (a as u32)
        .wrapping_sub(b as u32)
        .wrapping_sub((f & FLAG_C) as u32);
    let r = diff as u16;
    let flags = bool_flag(r & 0x8000 != 0, FLAG_S)
        | bool_flag(r == 0, FLAG_Z)
        | ((r >> 8) as u8 & FLAGS_XY)
        | FLAG_N
        | bool_flag((a ^ b ^ r) & 0x1000 != 0, FLAG_H)
        | bool_flag((a ^ b) & 0x8000 != 0 && (a ^ r) & 0x8000 != 0, FLAG_PV)
        | bool_flag(diff > 0xFFFF, FLAG_C);
    (r, flags)
}

/// RLCA/RRCA/RLA/RRA
pub fn acc_rotate(op: AccRot, a: u8, f: u8) -> (u8, u8) {
    let carry_in = f & FLAG_C;
    let (r, carry_out) = match op {
        AccRot::Rlca => (a.rotate_left(1), a >> 7),
        AccRot::Rrca => (a.rotate_right(1), a & 1),
        AccRot::Rla => ((a << 1) | carry_in, a >> 7),
        AccRot::Rra => ((a >> 1) | (carry_in << 7), a & 1),
    };
    (r, (f & KEEP_SZP) | (r & FLAGS_XY) | carry_out)
}

/// Rotate/shift group of the 0xCB space
pub fn rotate(op: RotOp, v: u8, f: u8) -> (u8, u8) {
    let carry_in = f & FLAG_C;
    let (r, carry_out) = match op {
        RotOp::Rlc => (v.rotate_left(1), v >> 7),
        RotOp::Rrc => (v.rotate_right(1), v & 1),
        RotOp::Rl => ((v << 1) | carry_in, v >> 7),
        RotOp::Rr => ((v >> 1) | (carry_in << 7), v & 1),
        RotOp::Sla => (v << 1, v >> 7),
        RotOp::Sra => ((v >> 1) | (v & 0x80), v & 1),
        RotOp::Sll => ((v << 1) | 1, v >> 7),
        RotOp::Srl => (v >> 1, v & 1),
    };
    (r, sz53p(r) | carry_out)
}

/// BIT n; `xy_source` supplies bits 3/5 (the operand for registers, the
/// high address byte for memory forms)
pub fn bit(n: u8, v: u8, f: u8, xy_source: u8) -> u8 {
    let set = v & (1 << n) != 0;
    (f & FLAG_C)
        | FLAG_H
        | (xy_source & FLAGS_XY)
        | bool_flag(!set, FLAG_Z | FLAG_PV)
        | bool_flag(n == 7 && set, FLAG_S)
}

/// Decimal adjust after BCD addition or subtraction
pub fn daa(a: u8, f: u8) -> (u8, u8) {
    let subtract = f & FLAG_N != 0;
    let mut carry = f & FLAG_C != 0;
    let mut correction = 0u8;

    if f & FLAG_H != 0 || a & 0x0F > 9 {
        correction |= 0x06;
    }
    if carry || a > 0x99 {
        correction |= 0x60;
        carry = true;
    }

    let (r, half) = if subtract {
        (a.wrapping_sub(correction), f & FLAG_H != 0 && a & 0x0F < 6)
    } else {
        (a.wrapping_add(correction), a & 0x0F > 9)
    };

    let flags =
        sz53p(r) | (f & FLAG_N) | bool_flag(half, FLAG_H) | bool_flag(carry, FLAG_C);
    (r, flags)
}

pub fn cpl(a: u8, f: u8) -> (u8, u8) {
    let r = !a;
    (r, (f & (KEEP_SZP | FLAG_C)) | FLAG_H | FLAG_N | (r & FLAGS_XY))
}

pub fn scf(a: u8, f: u8) -> u8 {
    (f & KEEP_SZP) | (a & FLAGS_XY) | FLAG_C
}

pub fn ccf(a: u8, f: u8) -> u8 {
    let carry = f & FLAG_C != 0;
    (f & KEEP_SZP) | (a & FLAGS_XY) | bool_flag(carry, FLAG_H) | bool_flag(!carry, FLAG_C)
}

pub fn neg(a: u8) -> (u8, u8) {
    sub8(0, a, false)
}

/// LD A,I / LD A,R: P/V reports IFF2
pub fn ld_a_ir(v: u8, f: u8, iff2: bool) -> u8 {
    (f & FLAG_C) | sz53(v) | bool_flag(iff2, FLAG_PV)
}

/// RRD: returns (A, memory byte, flags)
pub fn rrd(a: u8, m: u8, f: u8) -> (u8, u8, u8) {
    let new_a = (a & 0xF0) | (m & 0x0F);
    let new_m = (m >> 4) | (a << 4);
    (new_a, new_m, (f & FLAG_C) | sz53p(new_a))
}

/// RLD: returns (A, memory byte, flags)
pub fn rld(a: u8, m: u8, f: u8) -> (u8, u8, u8) {
    let new_a = (a & 0xF0) | (m >> 4);
    let new_m = (m << 4) | (a & 0x0F);
    (new_a, new_m, (f & FLAG_C) | sz53p(new_a))
}

/// IN r,(C)
pub fn in_flags(v: u8, f: u8) -> u8 {
    (f & FLAG_C) | sz53p(v)
}

/// LDI/LDD family; `bc` is the count after decrementing
pub fn block_load_flags(f: u8, a: u8, val: u8, bc: u16) -> u8 {
    let n = val.wrapping_add(a);
    (f & (FLAG_S | FLAG_Z | FLAG_C))
        | bool_flag(bc != 0, FLAG_PV)
        | (n & FLAG_X)
        | ((n & 0x02) << 4)
}

/// CPI/CPD family; `bc` is the count after decrementing
pub fn block_compare_flags(f: u8, a: u8, val: u8, bc: u16) -> u8 {
    let r = a.wrapping_sub(val);
    let half = (a ^ val ^ r) & 0x10 != 0;
    let n = r.wrapping_sub(half as u8);
    (f & FLAG_C)
        | FLAG_N
        | (r & FLAG_S)
        | bool_flag(r == 0, FLAG_Z)
        | bool_flag(half, FLAG_H)
        | bool_flag(bc != 0, FLAG_PV)
        | (n & FLAG_X)
        | ((n & 0x02) << 4)
}

/// INI/OUTI family; `b` is the count after decrementing and `k` the sum of
/// the transferred byte and the adjusted C (input) or L (output)
pub fn block_io_flags(val: u8, b: u8, k: u16) -> u8 {
    sz53(b)
        | bool_flag(val & 0x80 != 0, FLAG_N)
        | bool_flag(k > 0xFF, FLAG_H | FLAG_C)
        | bool_flag(parity_even((k as u8 & 7) ^ b), FLAG_PV)
}
