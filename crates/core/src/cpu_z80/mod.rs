//! Zilog Z80 CPU core
//!
//! Instructions are executed from the precomputed tables in [`dispatch`]:
//! the opcode byte picks an [`OpcodeEntry`], and the executor matches on its
//! [`Instruction`] template, pulling displacement and immediate bytes from
//! the instruction stream as the template's operands are resolved.
//!
//! The undocumented parts of the instruction set are implemented: the IXH,
//! IXL, IYH and IYL halves, SLL, the DDCB/FDCB register copies, the X/Y
//! flag bits and the ED mirrors. Undefined ED opcodes behave as 8-cycle
//! NOPs.

pub mod alu;
pub mod decoder;
pub mod dispatch;
pub mod instruction;
pub mod registers;


use serde::{Deserialize, Serialize};

use crate::logging::{log, LogCategory, LogLevel};

use decoder::OpcodeEntry;
use dispatch::DispatchTables;
use instruction::{BlockKind, BlockOp, Condition, Instruction, Operand8, Prefix, Reg16, Reg8};

pub use decoder::Decoded;
pub use registers::Registers;
use registers::{FLAG_C, FLAG_PV, FLAG_S, FLAG_Z};

/// Memory and I/O interface for the Z80 CPU
pub trait MemoryZ80 {
    /// Read a byte from memory
    fn read(&self, addr: u16) -> u8;

    /// Write a byte to memory
    fn write(&mut self, addr: u16, val: u8);

    /// Read from I/O port
    fn io_read(&mut self, port: u8) -> u8 {
        let _ = port;
        0xFF
    }

    /// Write to I/O port
    fn io_write(&mut self, port: u8, val: u8) {
        let _ = (port, val);
    }

    /// Level of the maskable interrupt line
    fn irq_asserted(&self) -> bool {
        false
    }

    /// Returns true once per non-maskable interrupt request
    fn take_nmi(&mut self) -> bool {
        false
    }

    /// Byte on the data bus during an interrupt acknowledge (IM 2 vector low byte)
    fn interrupt_data(&self) -> u8 {
        0xFF
    }
}

pub const NMI_VECTOR: u16 = 0x0066;
pub const IM1_VECTOR: u16 = 0x0038;

const NMI_CYCLES: u32 = 11;
const IM1_CYCLES: u32 = 13;
const IM2_CYCLES: u32 = 19;
const HALT_CYCLES: u32 = 4;

/// Serializable processor state, excluding the memory interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuZ80State {
    pub regs: Registers,
    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
    pub halted: bool,
    pub ei_pending: bool,
    pub cycles: u64,
}

/// Where a resolved 8-bit operand lives
#[derive(Debug, Clone, Copy)]
enum Location {
    Register(Reg8),
    Memory(u16),
    Value(u8),
}

/// Zilog Z80 CPU state
#[derive(Debug)]
pub struct CpuZ80<M: MemoryZ80> {
    pub regs: Registers,

    /// Interrupt flip-flops
    pub iff1: bool,
    pub iff2: bool,
    /// Interrupt mode (0, 1, or 2)
    pub im: u8,

    pub halted: bool,
    /// Set by EI; interrupts are enabled after the following instruction
    ei_pending: bool,
    /// Total cycles executed
    pub cycles: u64,
    /// Address of the most recently executed instruction
    last_pc: u16,

    tables: &'static DispatchTables,

    /// Memory interface
    pub memory: M,
}

impl<M: MemoryZ80> CpuZ80<M> {
    /// Create a new Z80 CPU
    pub fn new(memory: M) -> Self {
        let mut cpu = Self {
            regs: Registers::default(),
            iff1: false,
            iff2: false,
            im: 0,
            halted: false,
            ei_pending: false,
            cycles: 0,
            last_pc: 0,
            tables: dispatch::tables(),
            memory,
        };
        cpu.reset();
        cpu
    }

    /// Reset the CPU to its power-on state
    pub fn reset(&mut self) {
        self.regs = Registers {
            sp: 0xFFFF,
            ..Registers::default()
        };
        self.regs.set_af(0xFFFF);
        self.iff1 = false;
        self.iff2 = false;
        self.im = 0;
        self.halted = false;
        self.ei_pending = false;
        self.cycles = 0;
        self.last_pc = 0;
    }

    pub fn last_pc(&self) -> u16 {
        self.last_pc
    }

    pub fn state(&self) -> CpuZ80State {
        CpuZ80State {
            regs: self.regs.clone(),
            iff1: self.iff1,
            iff2: self.iff2,
            im: self.im,
            halted: self.halted,
            ei_pending: self.ei_pending,
            cycles: self.cycles,
        }
    }

    pub fn restore(&mut self, state: CpuZ80State) {
        self.regs = state.regs;
        self.iff1 = state.iff1;
        self.iff2 = state.iff2;
        self.im = state.im;
        self.halted = state.halted;
        self.ei_pending = state.ei_pending;
        self.cycles = state.cycles;
    }

    /// Decode the instruction at `addr` without executing it
    pub fn disassemble(&self, addr: u16) -> Decoded {
        decoder::decode(addr, |a| self.memory.read(a))
    }

    /// Execute one instruction, or accept one interrupt; returns cycles used
    pub fn step(&mut self) -> u32 {
        let cycles = self.step_inner();
        self.cycles += cycles as u64;
        cycles
    }

    fn step_inner(&mut self) -> u32 {
        if let Some(cycles) = self.service_interrupts() {
            return cycles;
        }

        if self.halted {
            self.regs.increment_r();
            return HALT_CYCLES;
        }

        // An EI executed last step takes effect once this instruction is done
        let enable_after = self.ei_pending;

        self.last_pc = self.regs.pc;
        log(LogCategory::CPU, LogLevel::Trace, || {
            format!("Z80: {:04X}  {}", self.last_pc, self.disassemble(self.last_pc))
        });

        let opcode = self.fetch_opcode();
        let cycles = self.execute(self.tables.base[opcode as usize]);

        if enable_after {
            self.ei_pending = false;
            self.iff1 = true;
            self.iff2 = true;
        }
        cycles
    }

    fn service_interrupts(&mut self) -> Option<u32> {
        if self.memory.take_nmi() {
            log(LogCategory::Interrupts, LogLevel::Debug, || {
                format!("Z80: NMI accepted at PC={:04X}", self.regs.pc)
            });
            self.halted = false;
            self.iff2 = self.iff1;
            self.iff1 = false;
            self.regs.increment_r();
            self.push(self.regs.pc);
            self.regs.pc = NMI_VECTOR;
            return Some(NMI_CYCLES);
        }

        if self.iff1 && self.memory.irq_asserted() {
            log(LogCategory::Interrupts, LogLevel::Trace, || {
                format!("Z80: IRQ accepted in IM {} at PC={:04X}", self.im, self.regs.pc)
            });
            self.halted = false;
            self.iff1 = false;
            self.iff2 = false;
            self.regs.increment_r();
            self.push(self.regs.pc);
            let (target, cycles) = match self.im {
                2 => {
                    let pointer = ((self.regs.i as u16) << 8) | self.memory.interrupt_data() as u16;
                    (self.read_word(pointer), IM2_CYCLES)
                }
                // IM 0 on this bus sees 0xFF, which is RST 38h
                _ => (IM1_VECTOR, IM1_CYCLES),
            };
            self.regs.pc = target;
            return Some(cycles);
        }

        None
    }

    /// Opcode fetch (M1): advances R
    fn fetch_opcode(&mut self) -> u8 {
        self.regs.increment_r();
        self.fetch_byte()
    }

    fn fetch_byte(&mut self) -> u8 {
        let val = self.memory.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        val
    }

    fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch_byte() as u16;
        let hi = self.fetch_byte() as u16;
        (hi << 8) | lo
    }

    fn read_word(&self, addr: u16) -> u16 {
        let lo = self.memory.read(addr) as u16;
        let hi = self.memory.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn write_word(&mut self, addr: u16, val: u16) {
        self.memory.write(addr, val as u8);
        self.memory.write(addr.wrapping_add(1), (val >> 8) as u8);
    }

    fn push(&mut self, val: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.memory.write(self.regs.sp, (val >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.memory.write(self.regs.sp, val as u8);
    }

    fn pop(&mut self) -> u16 {
        let val = self.read_word(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        val
    }

    fn reg8(&self, r: Reg8) -> u8 {
        match r {
            Reg8::A => self.regs.a,
            Reg8::B => self.regs.b,
            Reg8::C => self.regs.c,
            Reg8::D => self.regs.d,
            Reg8::E => self.regs.e,
            Reg8::H => self.regs.h,
            Reg8::L => self.regs.l,
            Reg8::IXH => self.regs.ixh(),
            Reg8::IXL => self.regs.ixl(),
            Reg8::IYH => self.regs.iyh(),
            Reg8::IYL => self.regs.iyl(),
        }
    }

    fn set_reg8(&mut self, r: Reg8, val: u8) {
        match r {
            Reg8::A => self.regs.a = val,
            Reg8::B => self.regs.b = val,
            Reg8::C => self.regs.c = val,
            Reg8::D => self.regs.d = val,
            Reg8::E => self.regs.e = val,
            Reg8::H => self.regs.h = val,
            Reg8::L => self.regs.l = val,
            Reg8::IXH => self.regs.set_ixh(val),
            Reg8::IXL => self.regs.set_ixl(val),
            Reg8::IYH => self.regs.set_iyh(val),
            Reg8::IYL => self.regs.set_iyl(val),
        }
    }

    fn reg16(&self, rr: Reg16) -> u16 {
        match rr {
            Reg16::AF => self.regs.af(),
            Reg16::BC => self.regs.bc(),
            Reg16::DE => self.regs.de(),
            Reg16::HL => self.regs.hl(),
            Reg16::SP => self.regs.sp,
            Reg16::IX => self.regs.ix,
            Reg16::IY => self.regs.iy,
        }
    }

    fn set_reg16(&mut self, rr: Reg16, val: u16) {
        match rr {
            Reg16::AF => self.regs.set_af(val),
            Reg16::BC => self.regs.set_bc(val),
            Reg16::DE => self.regs.set_de(val),
            Reg16::HL => self.regs.set_hl(val),
            Reg16::SP => self.regs.sp = val,
            Reg16::IX => self.regs.ix = val,
            Reg16::IY => self.regs.iy = val,
        }
    }

    /// Resolve an operand, consuming its bytes from the instruction stream
    fn resolve(&mut self, op: Operand8) -> Location {
        match op {
            Operand8::Register8(r) => Location::Register(r),
            Operand8::Indirect(rr) => Location::Memory(self.reg16(rr)),
            Operand8::IndexedMemory(index) => {
                let d = self.fetch_byte() as i8;
                Location::Memory(self.reg16(index.pair()).wrapping_add(d as u16))
            }
            Operand8::DirectMemory => Location::Memory(self.fetch_word()),
            Operand8::Immediate => Location::Value(self.fetch_byte()),
        }
    }

    fn load(&self, loc: Location) -> u8 {
        match loc {
            Location::Register(r) => self.reg8(r),
            Location::Memory(addr) => self.memory.read(addr),
            Location::Value(v) => v,
        }
    }

    fn store(&mut self, loc: Location, val: u8) {
        match loc {
            Location::Register(r) => self.set_reg8(r, val),
            Location::Memory(addr) => self.memory.write(addr, val),
            // immediates are never destinations
            Location::Value(_) => {}
        }
    }

    fn condition(&self, cond: Condition) -> bool {
        let f = self.regs.f;
        match cond {
            Condition::NZ => f & FLAG_Z == 0,
            Condition::Z => f & FLAG_Z != 0,
            Condition::NC => f & FLAG_C == 0,
            Condition::C => f & FLAG_C != 0,
            Condition::PO => f & FLAG_PV == 0,
            Condition::PE => f & FLAG_PV != 0,
            Condition::P => f & FLAG_S == 0,
            Condition::M => f & FLAG_S != 0,
        }
    }

    fn relative_jump(&mut self, offset: i8) {
        self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
    }

    /// Execute one table entry; returns total cycles including prefixes
    fn execute(&mut self, entry: OpcodeEntry) -> u32 {
        use Instruction::*;

        let base = entry.cycles as u32;
        let f = self.regs.f;
        let a = self.regs.a;

        match entry.instruction {
            Nop => {}
            Undefined => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!("Z80: undefined opcode at {:04X} treated as NOP", self.last_pc)
                });
            }
            Halt => {
                log(LogCategory::CPU, LogLevel::Trace, || {
                    format!("Z80: HALT at {:04X}", self.last_pc)
                });
                self.halted = true;
            }
            Di => {
                self.iff1 = false;
                self.iff2 = false;
            }
            Ei => self.ei_pending = true,
            Im(mode) => self.im = mode,
            ExAfAf => self.regs.swap_af(),
            Exx => self.regs.swap_main(),
            ExDeHl => {
                let de = self.regs.de();
                self.regs.set_de(self.regs.hl());
                self.regs.set_hl(de);
            }
            ExSp(rr) => {
                let sp = self.regs.sp;
                let top = self.read_word(sp);
                self.write_word(sp, self.reg16(rr));
                self.set_reg16(rr, top);
            }
            Djnz => {
                let offset = self.fetch_byte() as i8;
                self.regs.b = self.regs.b.wrapping_sub(1);
                if self.regs.b != 0 {
                    self.relative_jump(offset);
                    return base + 5;
                }
            }
            Jr(cond) => {
                let offset = self.fetch_byte() as i8;
                match cond {
                    None => self.relative_jump(offset),
                    Some(c) if self.condition(c) => {
                        self.relative_jump(offset);
                        return base + 5;
                    }
                    Some(_) => {}
                }
            }
            Jp(cond) => {
                let target = self.fetch_word();
                if cond.map_or(true, |c| self.condition(c)) {
                    self.regs.pc = target;
                }
            }
            JpIndirect(rr) => self.regs.pc = self.reg16(rr),
            Call(cond) => {
                let target = self.fetch_word();
                if cond.map_or(true, |c| self.condition(c)) {
                    self.push(self.regs.pc);
                    self.regs.pc = target;
                    if cond.is_some() {
                        return base + 7;
                    }
                }
            }
            Ret(None) => self.regs.pc = self.pop(),
            Ret(Some(c)) => {
                if self.condition(c) {
                    self.regs.pc = self.pop();
                    return base + 6;
                }
            }
            Retn | Reti => {
                self.regs.pc = self.pop();
                self.iff1 = self.iff2;
            }
            Rst(vector) => {
                self.push(self.regs.pc);
                self.regs.pc = vector as u16;
            }
            Ld8 { dst, src } => {
                let dst = self.resolve(dst);
                let src = self.resolve(src);
                let val = self.load(src);
                self.store(dst, val);
            }
            Ld16Immediate(rr) => {
                let val = self.fetch_word();
                self.set_reg16(rr, val);
            }
            Ld16Load(rr) => {
                let addr = self.fetch_word();
                let val = self.read_word(addr);
                self.set_reg16(rr, val);
            }
            Ld16Store(rr) => {
                let addr = self.fetch_word();
                self.write_word(addr, self.reg16(rr));
            }
            LdSp(rr) => self.regs.sp = self.reg16(rr),
            LdAI => {
                self.regs.a = self.regs.i;
                self.regs.f = alu::ld_a_ir(self.regs.i, f, self.iff2);
            }
            LdAR => {
                self.regs.a = self.regs.r;
                self.regs.f = alu::ld_a_ir(self.regs.r, f, self.iff2);
            }
            LdIA => self.regs.i = a,
            LdRA => self.regs.r = a,
            Push(rr) => self.push(self.reg16(rr)),
            Pop(rr) => {
                let val = self.pop();
                self.set_reg16(rr, val);
            }
            Alu(op, src) => {
                let src = self.resolve(src);
                let val = self.load(src);
                let (r, flags) = alu::alu8(op, a, val, f);
                self.regs.a = r;
                self.regs.f = flags;
            }
            Inc8(op) => {
                let loc = self.resolve(op);
                let (r, flags) = alu::inc8(self.load(loc), f);
                self.store(loc, r);
                self.regs.f = flags;
            }
            Dec8(op) => {
                let loc = self.resolve(op);
                let (r, flags) = alu::dec8(self.load(loc), f);
                self.store(loc, r);
                self.regs.f = flags;
            }
            Inc16(rr) => self.set_reg16(rr, self.reg16(rr).wrapping_add(1)),
            Dec16(rr) => self.set_reg16(rr, self.reg16(rr).wrapping_sub(1)),
            Add16(dst, src) => {
                let (r, flags) = alu::add16(self.reg16(dst), self.reg16(src), f);
                self.set_reg16(dst, r);
                self.regs.f = flags;
            }
            Adc16(rr) => {
                let (r, flags) = alu::adc16(self.regs.hl(), self.reg16(rr), f);
                self.regs.set_hl(r);
                self.regs.f = flags;
            }
            Sbc16(rr) => {
                let (r, flags) = alu::sbc16(self.regs.hl(), self.reg16(rr), f);
                self.regs.set_hl(r);
                self.regs.f = flags;
            }
            AccRotate(rot) => (self.regs.a, self.regs.f) = alu::acc_rotate(rot, a, f),
            Daa => (self.regs.a, self.regs.f) = alu::daa(a, f),
            Cpl => (self.regs.a, self.regs.f) = alu::cpl(a, f),
            Scf => self.regs.f = alu::scf(a, f),
            Ccf => self.regs.f = alu::ccf(a, f),
            Neg => (self.regs.a, self.regs.f) = alu::neg(a),
            Rrd | Rld => {
                let hl = self.regs.hl();
                let m = self.memory.read(hl);
                let (r, m, flags) = if entry.instruction == Rrd {
                    alu::rrd(a, m, f)
                } else {
                    alu::rld(a, m, f)
                };
                self.memory.write(hl, m);
                self.regs.a = r;
                self.regs.f = flags;
            }
            Rot(_, op, _) | Bit(_, op) | Res(_, op, _) | Set(_, op, _) => {
                let loc = self.resolve(op);
                self.bit_operation(entry.instruction, loc);
            }
            InImmediate => {
                let port = self.fetch_byte();
                self.regs.a = self.memory.io_read(port);
            }
            OutImmediate => {
                let port = self.fetch_byte();
                self.memory.io_write(port, a);
            }
            InC(target) => {
                let val = self.memory.io_read(self.regs.c);
                self.regs.f = alu::in_flags(val, f);
                if let Some(r) = target {
                    self.set_reg8(r, val);
                }
            }
            OutC(source) => {
                let val = source.map_or(0, |r| self.reg8(r));
                self.memory.io_write(self.regs.c, val);
            }
            Block(op) => return base + self.block(op),
            Instruction::Prefix(prefix) => return self.execute_prefixed(prefix),
            PrefixRestart => {
                // The second prefix byte starts a new instruction
                self.regs.pc = self.regs.pc.wrapping_sub(1);
            }
        }

        base
    }

    fn execute_prefixed(&mut self, prefix: Prefix) -> u32 {
        let opcode = self.fetch_opcode();
        match prefix {
            Prefix::Bits => self.execute(self.tables.bits[opcode as usize]),
            Prefix::Extended => self.execute(self.tables.extended[opcode as usize]),
            Prefix::Index(index) if opcode == 0xCB => {
                // DD CB d op: displacement precedes the opcode, which is not an M1 fetch
                let d = self.fetch_byte() as i8;
                let sub = self.fetch_byte();
                let entry = self.tables.indexed_bits(index)[sub as usize];
                let addr = self.reg16(index.pair()).wrapping_add(d as u16);
                self.bit_operation(entry.instruction, Location::Memory(addr));
                entry.cycles as u32
            }
            Prefix::Index(index) => self.execute(self.tables.indexed(index)[opcode as usize]),
        }
    }

    /// Rotate/shift, BIT, RES and SET on a resolved operand
    fn bit_operation(&mut self, instruction: Instruction, loc: Location) {
        let val = self.load(loc);
        let f = self.regs.f;
        let (result, copy) = match instruction {
            Instruction::Rot(op, _, copy) => {
                let (r, flags) = alu::rotate(op, val, f);
                self.regs.f = flags;
                (r, copy)
            }
            Instruction::Bit(n, _) => {
                let xy_source = match loc {
                    Location::Memory(addr) => (addr >> 8) as u8,
                    _ => val,
                };
                self.regs.f = alu::bit(n, val, f, xy_source);
                return;
            }
            Instruction::Res(n, _, copy) => (val & !(1 << n), copy),
            Instruction::Set(n, _, copy) => (val | (1 << n), copy),
            _ => return,
        };
        self.store(loc, result);
        if let Some(r) = copy {
            self.set_reg8(r, result);
        }
    }

    /// One iteration of a block instruction; returns extra cycles when it repeats
    fn block(&mut self, op: BlockOp) -> u32 {
        let step = |v: u16| {
            if op.increment {
                v.wrapping_add(1)
            } else {
                v.wrapping_sub(1)
            }
        };
        let hl = self.regs.hl();
        let f = self.regs.f;

        let again = match op.kind {
            BlockKind::Ld => {
                let val = self.memory.read(hl);
                let de = self.regs.de();
                self.memory.write(de, val);
                self.regs.set_hl(step(hl));
                self.regs.set_de(step(de));
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                self.regs.f = alu::block_load_flags(f, self.regs.a, val, bc);
                bc != 0
            }
            BlockKind::Cp => {
                let val = self.memory.read(hl);
                self.regs.set_hl(step(hl));
                let bc = self.regs.bc().wrapping_sub(1);
                self.regs.set_bc(bc);
                self.regs.f = alu::block_compare_flags(f, self.regs.a, val, bc);
                bc != 0 && self.regs.a != val
            }
            BlockKind::In => {
                let val = self.memory.io_read(self.regs.c);
                self.memory.write(hl, val);
                self.regs.set_hl(step(hl));
                self.regs.b = self.regs.b.wrapping_sub(1);
                let c = step(self.regs.c as u16) as u8;
                let k = val as u16 + c as u16;
                self.regs.f = alu::block_io_flags(val, self.regs.b, k);
                self.regs.b != 0
            }
            BlockKind::Out => {
                let val = self.memory.read(hl);
                self.regs.b = self.regs.b.wrapping_sub(1);
                self.memory.io_write(self.regs.c, val);
                self.regs.set_hl(step(hl));
                let k = val as u16 + self.regs.l as u16;
                self.regs.f = alu::block_io_flags(val, self.regs.b, k);
                self.regs.b != 0
            }
        };

        if op.repeat && again {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            5
        } else {
            0
        }
    }
}

impl<M: MemoryZ80> crate::Cpu for CpuZ80<M> {
    fn reset(&mut self) {
        self.reset();
    }

    fn step(&mut self) -> u32 {
        self.step()
    }
}
