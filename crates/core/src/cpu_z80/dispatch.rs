//! Precomputed opcode tables, one per opcode space.
//!
//! Built once on first use and shared by every processor instance.

use std::sync::OnceLock;

use super::decoder::{decode_base, decode_bits, decode_extended, decode_indexed, OpcodeEntry};
use super::instruction::IndexReg;

pub type OpcodeTable = [OpcodeEntry; 256];

#[derive(Debug)]
pub struct DispatchTables {
    pub base: OpcodeTable,
    pub bits: OpcodeTable,
    pub extended: OpcodeTable,
    pub ix: OpcodeTable,
    pub iy: OpcodeTable,
    pub ix_bits: OpcodeTable,
    pub iy_bits: OpcodeTable,
}

impl DispatchTables {
    fn build() -> Self {
        Self {
            base: std::array::from_fn(|op| decode_base(op as u8, None)),
            bits: std::array::from_fn(|op| decode_bits(op as u8, None)),
            extended: std::array::from_fn(|op| decode_extended(op as u8)),
            ix: std::array::from_fn(|op| decode_indexed(op as u8, IndexReg::IX)),
            iy: std::array::from_fn(|op| decode_indexed(op as u8, IndexReg::IY)),
            ix_bits: std::array::from_fn(|op| decode_bits(op as u8, Some(IndexReg::IX))),
            iy_bits: std::array::from_fn(|op| decode_bits(op as u8, Some(IndexReg::IY))),
        }
    }

    pub fn indexed(&self, index: IndexReg) -> &OpcodeTable {
        match index {
            IndexReg::IX => &self.ix,
            IndexReg::IY => &self.iy,
        }
    }

    pub fn indexed_bits(&self, index: IndexReg) -> &OpcodeTable {
        match index {
            IndexReg::IX => &self.ix_bits,
            IndexReg::IY => &self.iy_bits,
        }
    }
}

pub fn tables() -> &'static DispatchTables {
    static TABLES: OnceLock<DispatchTables> = OnceLock::new();
    TABLES.get_or_init(DispatchTables::build)
}
