//! Z80 opcode decoder
//!
//! Opcodes are split into the usual fields:
//!
//! ```text
//!   7 6 | 5 4 3 | 2 1 0
//!    x  |   y   |   z        p = y >> 1, q = y & 1
//! ```
//!
//! Each opcode space has one decode function. The index spaces (0xDD/0xFD)
//! reuse the base decoder with an explicit `IndexReg` argument that swaps
//! H/L/(HL) for the index halves or an indexed memory operand.
//!
//! Cycle counts in the returned entries are totals for the whole encoded
//! instruction, prefixes included. Conditional branches and repeating block
//! instructions report their shorter (not taken / final) cost; the processor
//! adds the difference when it applies.

use std::fmt;

use super::dispatch;
use super::instruction::{
    write_text, AccRot, AluOp, BlockKind, BlockOp, Condition, Immediate, IndexReg, Instruction,
    Operand8, OperandValues, Prefix, Reg16, Reg8, RotOp,
};

/// One slot of a dispatch table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeEntry {
    pub instruction: Instruction,
    pub cycles: u8,
}

impl OpcodeEntry {
    fn new(instruction: Instruction, cycles: u8) -> Self {
        Self {
            instruction,
            cycles,
        }
    }
}

struct Fields {
    x: u8,
    y: u8,
    z: u8,
    p: u8,
    q: u8,
}

fn fields(opcode: u8) -> Fields {
    let y = (opcode >> 3) & 7;
    Fields {
        x: opcode >> 6,
        y,
        z: opcode & 7,
        p: y >> 1,
        q: y & 1,
    }
}

/// r[field], with H/L/(HL) replaced under an index prefix
fn reg_operand(field: u8, index: Option<IndexReg>) -> Operand8 {
    match (field & 7, index) {
        (6, Some(ix)) => Operand8::IndexedMemory(ix),
        (6, None) => Operand8::Indirect(Reg16::HL),
        (4, Some(ix)) => Operand8::Register8(ix.high()),
        (5, Some(ix)) => Operand8::Register8(ix.low()),
        (f, _) => Operand8::Register8(Reg8::from_field(f).unwrap_or(Reg8::A)),
    }
}

fn hl_or_index(index: Option<IndexReg>) -> Reg16 {
    index.map_or(Reg16::HL, IndexReg::pair)
}

/// rp[p]: BC, DE, HL, SP
fn pair(p: u8, index: Option<IndexReg>) -> Reg16 {
    match p & 3 {
        0 => Reg16::BC,
        1 => Reg16::DE,
        2 => hl_or_index(index),
        _ => Reg16::SP,
    }
}

/// rp2[p]: BC, DE, HL, AF
fn pair_af(p: u8, index: Option<IndexReg>) -> Reg16 {
    match p & 3 {
        3 => Reg16::AF,
        p => pair(p, index),
    }
}

const A: Operand8 = Operand8::Register8(Reg8::A);

/// Base opcode space; `index` selects the 0xDD/0xFD substitution.
///
/// Cycle counts assume non-indexed addressing; `decode_indexed` adds
/// `index_penalty` on top.
pub fn decode_base(opcode: u8, index: Option<IndexReg>) -> OpcodeEntry {
    use Instruction::*;

    let Fields { x, y, z, p, q } = fields(opcode);
    let hl = hl_or_index(index);
    let mem_cost = |op: Operand8, reg: u8, mem: u8| if op.is_memory() { mem } else { reg };

    let (instruction, cycles) = match x {
        0 => match z {
            0 => match y {
                0 => (Nop, 4),
                1 => (ExAfAf, 4),
                2 => (Djnz, 8),
                3 => (Jr(None), 12),
                _ => (Jr(Some(Condition::from_field(y - 4))), 7),
            },
            1 if q == 0 => (Ld16Immediate(pair(p, index)), 10),
            1 => (Add16(hl, pair(p, index)), 11),
            2 => match (q, p) {
                (0, 0) => (Ld8 { dst: Operand8::Indirect(Reg16::BC), src: A }, 7),
                (0, 1) => (Ld8 { dst: Operand8::Indirect(Reg16::DE), src: A }, 7),
                (0, 2) => (Ld16Store(hl), 16),
                (0, _) => (Ld8 { dst: Operand8::DirectMemory, src: A }, 13),
                (_, 0) => (Ld8 { dst: A, src: Operand8::Indirect(Reg16::BC) }, 7),
                (_, 1) => (Ld8 { dst: A, src: Operand8::Indirect(Reg16::DE) }, 7),
                (_, 2) => (Ld16Load(hl), 16),
                _ => (Ld8 { dst: A, src: Operand8::DirectMemory }, 13),
            },
            3 if q == 0 => (Inc16(pair(p, index)), 6),
            3 => (Dec16(pair(p, index)), 6),
            4 => {
                let op = reg_operand(y, index);
                (Inc8(op), mem_cost(op, 4, 11))
            }
            5 => {
                let op = reg_operand(y, index);
                (Dec8(op), mem_cost(op, 4, 11))
            }
            6 => {
                let op = reg_operand(y, index);
                (Ld8 { dst: op, src: Operand8::Immediate }, mem_cost(op, 7, 10))
            }
            _ => {
                let instr = match y {
                    0 => AccRotate(AccRot::Rlca),
                    1 => AccRotate(AccRot::Rrca),
                    2 => AccRotate(AccRot::Rla),
                    3 => AccRotate(AccRot::Rra),
                    4 => Daa,
                    5 => Cpl,
                    6 => Scf,
                    _ => Ccf,
                };
                (instr, 4)
            }
        },
        1 if y == 6 && z == 6 => (Halt, 4),
        1 => {
            // With a memory operand on one side the other side keeps plain H/L
            let (dst, src) = if y == 6 || z == 6 {
                let dst_index = if y == 6 { index } else { None };
                let src_index = if z == 6 { index } else { None };
                (reg_operand(y, dst_index), reg_operand(z, src_index))
            } else {
                (reg_operand(y, index), reg_operand(z, index))
            };
            let cycles = if dst.is_memory() || src.is_memory() { 7 } else { 4 };
            (Ld8 { dst, src }, cycles)
        }
        2 => {
            let op = reg_operand(z, index);
            (Alu(AluOp::from_field(y), op), mem_cost(op, 4, 7))
        }
        _ => match z {
            0 => (Ret(Some(Condition::from_field(y))), 5),
            1 if q == 0 => (Pop(pair_af(p, index)), 10),
            1 => match p {
                0 => (Ret(None), 10),
                1 => (Exx, 4),
                2 => (JpIndirect(hl), 4),
                _ => (LdSp(hl), 6),
            },
            2 => (Jp(Some(Condition::from_field(y))), 10),
            3 => match y {
                0 => (Jp(None), 10),
                1 => (Prefix(self::Prefix::Bits), 0),
                2 => (OutImmediate, 11),
                3 => (InImmediate, 11),
                4 => (ExSp(hl), 19),
                5 => (ExDeHl, 4),
                6 => (Di, 4),
                _ => (Ei, 4),
            },
            4 => (Call(Some(Condition::from_field(y))), 10),
            5 if q == 0 => (Push(pair_af(p, index)), 11),
            5 => match p {
                0 => (Call(None), 17),
                1 => (Prefix(self::Prefix::Index(IndexReg::IX)), 0),
                2 => (Prefix(self::Prefix::Extended), 0),
                _ => (Prefix(self::Prefix::Index(IndexReg::IY)), 0),
            },
            6 => (Alu(AluOp::from_field(y), Operand8::Immediate), 7),
            _ => (Rst(y * 8), 11),
        },
    };

    OpcodeEntry::new(instruction, cycles)
}

/// Extra cycles an index prefix adds to a base-space template: the prefix
/// fetch itself, plus the displacement fetch and address computation when
/// the template addresses (IX+d)/(IY+d).
pub fn index_penalty(instruction: &Instruction) -> u8 {
    const PREFIX_FETCH: u8 = 4;
    let layout = instruction.layout();
    let addressing = match instruction {
        // displacement and immediate fetches overlap
        Instruction::Ld8 {
            src: Operand8::Immediate,
            ..
        } if layout.displacement => 5,
        _ if layout.displacement => 8,
        _ => 0,
    };
    PREFIX_FETCH + addressing
}

/// 0xDD (IX) or 0xFD (IY) opcode space
pub fn decode_indexed(opcode: u8, index: IndexReg) -> OpcodeEntry {
    match opcode {
        0xDD | 0xFD | 0xED => OpcodeEntry::new(Instruction::PrefixRestart, 4),
        0xCB => OpcodeEntry::new(Instruction::Prefix(Prefix::Bits), 0),
        _ => {
            let entry = decode_base(opcode, Some(index));
            OpcodeEntry::new(
                entry.instruction,
                entry.cycles + index_penalty(&entry.instruction),
            )
        }
    }
}

/// 0xCB space, or the 0xDDCB/0xFDCB space when `index` is set.
///
/// The indexed form always operates on (IX+d)/(IY+d); for register fields
/// other than 6 the result is also copied into that register (undocumented).
pub fn decode_bits(opcode: u8, index: Option<IndexReg>) -> OpcodeEntry {
    use Instruction::*;

    let Fields { x, y, z, .. } = fields(opcode);
    let (op, copy) = match index {
        Some(ix) => (Operand8::IndexedMemory(ix), Reg8::from_field(z)),
        None => (reg_operand(z, None), None),
    };
    let (instruction, reg_cycles, hl_cycles, indexed_cycles) = match x {
        0 => (Rot(RotOp::from_field(y), op, copy), 8, 15, 23),
        1 => (Bit(y, op), 8, 12, 20),
        2 => (Res(y, op, copy), 8, 15, 23),
        _ => (Set(y, op, copy), 8, 15, 23),
    };
    let cycles = match (index, op.is_memory()) {
        (Some(_), _) => indexed_cycles,
        (None, true) => hl_cycles,
        (None, false) => reg_cycles,
    };
    OpcodeEntry::new(instruction, cycles)
}

/// 0xED space
pub fn decode_extended(opcode: u8) -> OpcodeEntry {
    use Instruction::*;

    const INTERRUPT_MODES: [u8; 8] = [0, 0, 1, 2, 0, 0, 1, 2];

    let Fields { x, y, z, p, q } = fields(opcode);
    let (instruction, cycles) = match x {
        1 => match z {
            0 => (InC(Reg8::from_field(y)), 12),
            1 => (OutC(Reg8::from_field(y)), 12),
            2 if q == 0 => (Sbc16(pair(p, None)), 15),
            2 => (Adc16(pair(p, None)), 15),
            3 if q == 0 => (Ld16Store(pair(p, None)), 20),
            3 => (Ld16Load(pair(p, None)), 20),
            4 => (Neg, 8),
            5 if y == 1 => (Reti, 14),
            5 => (Retn, 14),
            6 => (Im(INTERRUPT_MODES[y as usize]), 8),
            _ => match y {
                0 => (LdIA, 9),
                1 => (LdRA, 9),
                2 => (LdAI, 9),
                3 => (LdAR, 9),
                4 => (Rrd, 18),
                5 => (Rld, 18),
                _ => (Nop, 8),
            },
        },
        2 if z <= 3 && y >= 4 => {
            let kind = match z {
                0 => BlockKind::Ld,
                1 => BlockKind::Cp,
                2 => BlockKind::In,
                _ => BlockKind::Out,
            };
            let op = BlockOp {
                kind,
                increment: y & 1 == 0,
                repeat: y >= 6,
            };
            (Block(op), 16)
        }
        _ => (Undefined, 8),
    };
    OpcodeEntry::new(instruction, cycles)
}

/// A fully decoded instruction at a fixed address, for disassembly and
/// debugging front ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub address: u16,
    pub bytes: Vec<u8>,
    pub instruction: Instruction,
    pub values: OperandValues,
    pub cycles: u8,
}

impl Decoded {
    pub fn len(&self) -> u16 {
        self.bytes.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Address of the following instruction
    pub fn next_address(&self) -> u16 {
        self.address.wrapping_add(self.len())
    }
}

impl fmt::Display for Decoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = String::new();
        if write_text(
            &mut text,
            &self.instruction,
            self.values,
            self.address,
            self.len(),
        )
        .is_ok()
        {
            return f.write_str(&text);
        }

        // No mnemonic for this encoding: show the raw bytes
        f.write_str("DB ")?;
        for (i, byte) in self.bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "${:02X}", byte)?;
        }
        Ok(())
    }
}

struct ByteStream<F> {
    fetch: F,
    pos: u16,
    bytes: Vec<u8>,
}

impl<F: FnMut(u16) -> u8> ByteStream<F> {
    fn next(&mut self) -> u8 {
        let byte = (self.fetch)(self.pos);
        self.pos = self.pos.wrapping_add(1);
        self.bytes.push(byte);
        byte
    }

    fn unread(&mut self) {
        self.bytes.pop();
        self.pos = self.pos.wrapping_sub(1);
    }
}

/// Decodes the instruction at `address`, reading bytes through `fetch`
pub fn decode(address: u16, fetch: impl FnMut(u16) -> u8) -> Decoded {
    let tables = dispatch::tables();
    let mut stream = ByteStream {
        fetch,
        pos: address,
        bytes: Vec::with_capacity(4),
    };
    let mut values = OperandValues::default();

    let entry = match stream.next() {
        0xCB => tables.bits[stream.next() as usize],
        0xED => tables.extended[stream.next() as usize],
        prefix @ (0xDD | 0xFD) => {
            let index = if prefix == 0xDD {
                IndexReg::IX
            } else {
                IndexReg::IY
            };
            let opcode = stream.next();
            if opcode == 0xCB {
                values.displacement = Some(stream.next() as i8);
                tables.indexed_bits(index)[stream.next() as usize]
            } else {
                let entry = tables.indexed(index)[opcode as usize];
                if entry.instruction == Instruction::PrefixRestart {
                    stream.unread();
                }
                entry
            }
        }
        opcode => tables.base[opcode as usize],
    };

    let layout = entry.instruction.layout();
    if layout.displacement && values.displacement.is_none() {
        values.displacement = Some(stream.next() as i8);
    }
    values.immediate = match layout.immediate {
        Immediate::None => None,
        Immediate::Byte | Immediate::Relative => Some(stream.next() as u16),
        Immediate::Word => {
            let lo = stream.next() as u16;
            let hi = stream.next() as u16;
            Some((hi << 8) | lo)
        }
    };

    Decoded {
        address,
        bytes: stream.bytes,
        instruction: entry.instruction,
        values,
        cycles: entry.cycles,
    }
}
