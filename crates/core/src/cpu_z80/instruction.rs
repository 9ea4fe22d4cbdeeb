//! Z80 instruction model
//!
//! An `Instruction` is an opcode template: it names the operation and the
//! operand locations, but not the displacement or immediate bytes that follow
//! the opcode in the instruction stream. Those are fetched while executing,
//! or resolved by the decoder for disassembly.

use std::fmt;

/// Index register selected by a 0xDD (IX) or 0xFD (IY) prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexReg {
    IX,
    IY,
}

impl IndexReg {
    pub fn high(self) -> Reg8 {
        match self {
            IndexReg::IX => Reg8::IXH,
            IndexReg::IY => Reg8::IYH,
        }
    }

    pub fn low(self) -> Reg8 {
        match self {
            IndexReg::IX => Reg8::IXL,
            IndexReg::IY => Reg8::IYL,
        }
    }

    pub fn pair(self) -> Reg16 {
        match self {
            IndexReg::IX => Reg16::IX,
            IndexReg::IY => Reg16::IY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    A,
    IXH,
    IXL,
    IYH,
    IYL,
}

impl Reg8 {
    /// Register named by a 3-bit opcode field (6, the memory slot, excluded)
    pub fn from_field(field: u8) -> Option<Reg8> {
        match field & 7 {
            0 => Some(Reg8::B),
            1 => Some(Reg8::C),
            2 => Some(Reg8::D),
            3 => Some(Reg8::E),
            4 => Some(Reg8::H),
            5 => Some(Reg8::L),
            7 => Some(Reg8::A),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Reg8::B => "B",
            Reg8::C => "C",
            Reg8::D => "D",
            Reg8::E => "E",
            Reg8::H => "H",
            Reg8::L => "L",
            Reg8::A => "A",
            Reg8::IXH => "IXH",
            Reg8::IXL => "IXL",
            Reg8::IYH => "IYH",
            Reg8::IYL => "IYL",
        }
    }

    pub fn is_index_half(self) -> bool {
        matches!(self, Reg8::IXH | Reg8::IXL | Reg8::IYH | Reg8::IYL)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg16 {
    BC,
    DE,
    HL,
    SP,
    AF,
    IX,
    IY,
}

impl Reg16 {
    pub fn name(self) -> &'static str {
        match self {
            Reg16::BC => "BC",
            Reg16::DE => "DE",
            Reg16::HL => "HL",
            Reg16::SP => "SP",
            Reg16::AF => "AF",
            Reg16::IX => "IX",
            Reg16::IY => "IY",
        }
    }
}

/// 8-bit operand location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand8 {
    Register8(Reg8),
    /// (BC), (DE) or (HL)
    Indirect(Reg16),
    /// (IX+d) / (IY+d); the displacement follows the opcode
    IndexedMemory(IndexReg),
    /// (nn); the address follows the opcode
    DirectMemory,
    /// n
    Immediate,
}

impl Operand8 {
    pub fn is_memory(self) -> bool {
        matches!(
            self,
            Operand8::Indirect(_) | Operand8::IndexedMemory(_) | Operand8::DirectMemory
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    NZ,
    Z,
    NC,
    C,
    PO,
    PE,
    P,
    M,
}

impl Condition {
    pub fn from_field(field: u8) -> Condition {
        match field & 7 {
            0 => Condition::NZ,
            1 => Condition::Z,
            2 => Condition::NC,
            3 => Condition::C,
            4 => Condition::PO,
            5 => Condition::PE,
            6 => Condition::P,
            _ => Condition::M,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Condition::NZ => "NZ",
            Condition::Z => "Z",
            Condition::NC => "NC",
            Condition::C => "C",
            Condition::PO => "PO",
            Condition::PE => "PE",
            Condition::P => "P",
            Condition::M => "M",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    pub fn from_field(field: u8) -> AluOp {
        match field & 7 {
            0 => AluOp::Add,
            1 => AluOp::Adc,
            2 => AluOp::Sub,
            3 => AluOp::Sbc,
            4 => AluOp::And,
            5 => AluOp::Xor,
            6 => AluOp::Or,
            _ => AluOp::Cp,
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            AluOp::Add => "ADD A,",
            AluOp::Adc => "ADC A,",
            AluOp::Sub => "SUB ",
            AluOp::Sbc => "SBC A,",
            AluOp::And => "AND ",
            AluOp::Xor => "XOR ",
            AluOp::Or => "OR ",
            AluOp::Cp => "CP ",
        }
    }
}

/// Rotate/shift group of the 0xCB space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RotOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    /// Undocumented: shift left, set bit 0
    Sll,
    Srl,
}

impl RotOp {
    pub fn from_field(field: u8) -> RotOp {
        match field & 7 {
            0 => RotOp::Rlc,
            1 => RotOp::Rrc,
            2 => RotOp::Rl,
            3 => RotOp::Rr,
            4 => RotOp::Sla,
            5 => RotOp::Sra,
            6 => RotOp::Sll,
            _ => RotOp::Srl,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            RotOp::Rlc => "RLC",
            RotOp::Rrc => "RRC",
            RotOp::Rl => "RL",
            RotOp::Rr => "RR",
            RotOp::Sla => "SLA",
            RotOp::Sra => "SRA",
            RotOp::Sll => "SLL",
            RotOp::Srl => "SRL",
        }
    }
}

/// Accumulator-only rotates of the base space (RLCA, RRCA, RLA, RRA)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccRot {
    Rlca,
    Rrca,
    Rla,
    Rra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Ld,
    Cp,
    In,
    Out,
}

/// One of the sixteen block transfer/compare/IO instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockOp {
    pub kind: BlockKind,
    pub increment: bool,
    pub repeat: bool,
}

impl BlockOp {
    pub fn mnemonic(self) -> &'static str {
        match (self.kind, self.increment, self.repeat) {
            (BlockKind::Ld, true, false) => "LDI",
            (BlockKind::Ld, false, false) => "LDD",
            (BlockKind::Ld, true, true) => "LDIR",
            (BlockKind::Ld, false, true) => "LDDR",
            (BlockKind::Cp, true, false) => "CPI",
            (BlockKind::Cp, false, false) => "CPD",
            (BlockKind::Cp, true, true) => "CPIR",
            (BlockKind::Cp, false, true) => "CPDR",
            (BlockKind::In, true, false) => "INI",
            (BlockKind::In, false, false) => "IND",
            (BlockKind::In, true, true) => "INIR",
            (BlockKind::In, false, true) => "INDR",
            (BlockKind::Out, true, false) => "OUTI",
            (BlockKind::Out, false, false) => "OUTD",
            (BlockKind::Out, true, true) => "OTIR",
            (BlockKind::Out, false, true) => "OTDR",
        }
    }
}

/// Opcode prefixes of the base space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prefix {
    Bits,
    Extended,
    Index(IndexReg),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Nop,
    Halt,
    Di,
    Ei,
    Im(u8),
    ExAfAf,
    Exx,
    ExDeHl,
    /// EX (SP),HL/IX/IY
    ExSp(Reg16),

    Djnz,
    Jr(Option<Condition>),
    Jp(Option<Condition>),
    /// JP (HL)/(IX)/(IY)
    JpIndirect(Reg16),
    Call(Option<Condition>),
    Ret(Option<Condition>),
    Retn,
    Reti,
    Rst(u8),

    Ld8 { dst: Operand8, src: Operand8 },
    /// LD rr,nn
    Ld16Immediate(Reg16),
    /// LD rr,(nn)
    Ld16Load(Reg16),
    /// LD (nn),rr
    Ld16Store(Reg16),
    /// LD SP,HL/IX/IY
    LdSp(Reg16),
    LdAI,
    LdAR,
    LdIA,
    LdRA,
    Push(Reg16),
    Pop(Reg16),

    Alu(AluOp, Operand8),
    Inc8(Operand8),
    Dec8(Operand8),
    Inc16(Reg16),
    Dec16(Reg16),
    Add16(Reg16, Reg16),
    Adc16(Reg16),
    Sbc16(Reg16),

    AccRotate(AccRot),
    Daa,
    Cpl,
    Scf,
    Ccf,
    Neg,
    Rrd,
    Rld,

    /// Rotate/shift; the register is the undocumented copy-back target of
    /// the indexed-bit space
    Rot(RotOp, Operand8, Option<Reg8>),
    Bit(u8, Operand8),
    Res(u8, Operand8, Option<Reg8>),
    Set(u8, Operand8, Option<Reg8>),

    /// IN A,(n)
    InImmediate,
    /// OUT (n),A
    OutImmediate,
    /// IN r,(C); `None` only updates flags
    InC(Option<Reg8>),
    /// OUT (C),r; `None` writes zero
    OutC(Option<Reg8>),
    Block(BlockOp),

    /// Switch into another opcode space
    Prefix(Prefix),
    /// A 0xDD/0xFD prefix followed by another prefix: costs one fetch and
    /// restarts decoding at the second prefix
    PrefixRestart,
    /// Undefined opcode of the extended space, behaves as a no-op
    Undefined,
}

/// Trailing bytes an instruction consumes after its opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperandLayout {
    pub displacement: bool,
    pub immediate: Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Immediate {
    #[default]
    None,
    Byte,
    Word,
    Relative,
}

impl Instruction {
    /// Operand bytes following the opcode byte(s), in stream order
    pub fn layout(&self) -> OperandLayout {
        fn visit(layout: &mut OperandLayout, op: &Operand8) {
            match op {
                Operand8::IndexedMemory(_) => layout.displacement = true,
                Operand8::Immediate => layout.immediate = Immediate::Byte,
                Operand8::DirectMemory => layout.immediate = Immediate::Word,
                _ => {}
            }
        }

        let mut layout = OperandLayout::default();
        match self {
            Instruction::Ld8 { dst, src } => {
                visit(&mut layout, dst);
                visit(&mut layout, src);
            }
            Instruction::Alu(_, op)
            | Instruction::Inc8(op)
            | Instruction::Dec8(op)
            | Instruction::Rot(_, op, _)
            | Instruction::Bit(_, op)
            | Instruction::Res(_, op, _)
            | Instruction::Set(_, op, _) => visit(&mut layout, op),
            Instruction::Djnz | Instruction::Jr(_) => layout.immediate = Immediate::Relative,
            Instruction::Jp(_)
            | Instruction::Call(_)
            | Instruction::Ld16Immediate(_)
            | Instruction::Ld16Load(_)
            | Instruction::Ld16Store(_) => layout.immediate = Immediate::Word,
            Instruction::InImmediate | Instruction::OutImmediate => {
                layout.immediate = Immediate::Byte
            }
            _ => {}
        }
        layout
    }

    /// Whether this template reads or writes through an index register
    pub fn uses_index(&self) -> bool {
        let operand_indexed = |op: &Operand8| match op {
            Operand8::IndexedMemory(_) => true,
            Operand8::Register8(r) => r.is_index_half(),
            _ => false,
        };
        let pair_indexed = |r: &Reg16| matches!(r, Reg16::IX | Reg16::IY);
        match self {
            Instruction::Ld8 { dst, src } => operand_indexed(dst) || operand_indexed(src),
            Instruction::Alu(_, op)
            | Instruction::Inc8(op)
            | Instruction::Dec8(op)
            | Instruction::Rot(_, op, _)
            | Instruction::Bit(_, op)
            | Instruction::Res(_, op, _)
            | Instruction::Set(_, op, _) => operand_indexed(op),
            Instruction::ExSp(r)
            | Instruction::JpIndirect(r)
            | Instruction::Ld16Immediate(r)
            | Instruction::Ld16Load(r)
            | Instruction::Ld16Store(r)
            | Instruction::LdSp(r)
            | Instruction::Push(r)
            | Instruction::Pop(r)
            | Instruction::Inc16(r)
            | Instruction::Dec16(r) => pair_indexed(r),
            Instruction::Add16(dst, src) => pair_indexed(dst) || pair_indexed(src),
            _ => false,
        }
    }
}

/// Operand values pulled from the instruction stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperandValues {
    pub displacement: Option<i8>,
    pub immediate: Option<u16>,
}

/// Writes assembly text for `instr` at `address`, substituting operand values.
///
/// Returns `fmt::Error` for templates that have no mnemonic so the caller can
/// fall back to raw bytes.
pub(crate) fn write_text(
    out: &mut impl fmt::Write,
    instr: &Instruction,
    values: OperandValues,
    address: u16,
    length: u16,
) -> fmt::Result {
    let imm = values.immediate.unwrap_or(0);
    let disp = values.displacement.unwrap_or(0);
    let op8 = |op: &Operand8| -> String {
        match op {
            Operand8::Register8(r) => r.name().to_string(),
            Operand8::Indirect(rr) => format!("({})", rr.name()),
            Operand8::IndexedMemory(ix) => {
                let sign = if disp < 0 { '-' } else { '+' };
                format!("({}{}${:02X})", ix.pair().name(), sign, disp.unsigned_abs())
            }
            Operand8::DirectMemory => format!("(${:04X})", imm),
            Operand8::Immediate => format!("${:02X}", imm as u8),
        }
    };
    let copy = |target: &Option<Reg8>| match target {
        Some(r) => format!(",{}", r.name()),
        None => String::new(),
    };
    let cond = |c: &Option<Condition>| match c {
        Some(c) => format!("{},", c.name()),
        None => String::new(),
    };
    let relative = || address.wrapping_add(length).wrapping_add(imm as i8 as u16);

    match instr {
        Instruction::Nop => write!(out, "NOP"),
        Instruction::Halt => write!(out, "HALT"),
        Instruction::Di => write!(out, "DI"),
        Instruction::Ei => write!(out, "EI"),
        Instruction::Im(mode) => write!(out, "IM {}", mode),
        Instruction::ExAfAf => write!(out, "EX AF,AF'"),
        Instruction::Exx => write!(out, "EXX"),
        Instruction::ExDeHl => write!(out, "EX DE,HL"),
        Instruction::ExSp(rr) => write!(out, "EX (SP),{}", rr.name()),
        Instruction::Djnz => write!(out, "DJNZ ${:04X}", relative()),
        Instruction::Jr(c) => write!(out, "JR {}${:04X}", cond(c), relative()),
        Instruction::Jp(c) => write!(out, "JP {}${:04X}", cond(c), imm),
        Instruction::JpIndirect(rr) => write!(out, "JP ({})", rr.name()),
        Instruction::Call(c) => write!(out, "CALL {}${:04X}", cond(c), imm),
        Instruction::Ret(Some(c)) => write!(out, "RET {}", c.name()),
        Instruction::Ret(None) => write!(out, "RET"),
        Instruction::Retn => write!(out, "RETN"),
        Instruction::Reti => write!(out, "RETI"),
        Instruction::Rst(vector) => write!(out, "RST ${:02X}", vector),
        Instruction::Ld8 { dst, src } => write!(out, "LD {},{}", op8(dst), op8(src)),
        Instruction::Ld16Immediate(rr) => write!(out, "LD {},${:04X}", rr.name(), imm),
        Instruction::Ld16Load(rr) => write!(out, "LD {},(${:04X})", rr.name(), imm),
        Instruction::Ld16Store(rr) => write!(out, "LD (${:04X}),{}", imm, rr.name()),
        Instruction::LdSp(rr) => write!(out, "LD SP,{}", rr.name()),
        Instruction::LdAI => write!(out, "LD A,I"),
        Instruction::LdAR => write!(out, "LD A,R"),
        Instruction::LdIA => write!(out, "LD I,A"),
        Instruction::LdRA => write!(out, "LD R,A"),
        Instruction::Push(rr) => write!(out, "PUSH {}", rr.name()),
        Instruction::Pop(rr) => write!(out, "POP {}", rr.name()),
        Instruction::Alu(op, src) => write!(out, "{}{}", op.prefix(), op8(src)),
        Instruction::Inc8(op) => write!(out, "INC {}", op8(op)),
        Instruction::Dec8(op) => write!(out, "DEC {}", op8(op)),
        Instruction::Inc16(rr) => write!(out, "INC {}", rr.name()),
        Instruction::Dec16(rr) => write!(out, "DEC {}", rr.name()),
        Instruction::Add16(dst, src) => write!(out, "ADD {},{}", dst.name(), src.name()),
        Instruction::Adc16(rr) => write!(out, "ADC HL,{}", rr.name()),
        Instruction::Sbc16(rr) => write!(out, "SBC HL,{}", rr.name()),
        Instruction::AccRotate(rot) => write!(
            out,
            "{}",
            match rot {
                AccRot::Rlca => "RLCA",
                AccRot::Rrca => "RRCA",
                AccRot::Rla => "RLA",
                AccRot::Rra => "RRA",
            }
        ),
        Instruction::Daa => write!(out, "DAA"),
        Instruction::Cpl => write!(out, "CPL"),
        Instruction::Scf => write!(out, "SCF"),
        Instruction::Ccf => write!(out, "CCF"),
        Instruction::Neg => write!(out, "NEG"),
        Instruction::Rrd => write!(out, "RRD"),
        Instruction::Rld => write!(out, "RLD"),
        Instruction::Rot(rot, op, target) => {
            write!(out, "{} {}{}", rot.mnemonic(), op8(op), copy(target))
        }
        Instruction::Bit(bit, op) => write!(out, "BIT {},{}", bit, op8(op)),
        Instruction::Res(bit, op, target) => {
            write!(out, "RES {},{}{}", bit, op8(op), copy(target))
        }
        Instruction::Set(bit, op, target) => {
            write!(out, "SET {},{}{}", bit, op8(op), copy(target))
        }
        Instruction::InImmediate => write!(out, "IN A,(${:02X})", imm as u8),
        Instruction::OutImmediate => write!(out, "OUT (${:02X}),A", imm as u8),
        Instruction::InC(Some(r)) => write!(out, "IN {},(C)", r.name()),
        Instruction::InC(None) => write!(out, "IN (C)"),
        Instruction::OutC(Some(r)) => write!(out, "OUT (C),{}", r.name()),
        Instruction::OutC(None) => write!(out, "OUT (C),0"),
        Instruction::Block(op) => write!(out, "{}", op.mnemonic()),
        Instruction::Prefix(_) | Instruction::PrefixRestart | Instruction::Undefined => {
            Err(fmt::Error)
        }
    }
}
