//! Two-way assembler and disassembler for the WDC 65816.
//!
//! The assembler accepts source across multiple modules, sizes and places
//! every instruction under a static model of the processor status bits
//! (`e`, `m`, `x`, `c`), and emits bytes into an [`OutputSink`]. The
//! disassembler walks a ROM image from seed addresses, propagating the
//! same flag model along statically evident control flow, and recovers a
//! labeled instruction listing.

pub mod addr;
pub mod addressing;
pub mod assembler;
pub mod directive;
pub mod disassembler;
pub mod error;
pub mod exec;
pub mod expr;
pub mod flags;
pub mod instruction;
pub mod module;
pub mod opcodes;
pub mod parse;
pub mod ranges;
pub mod rom;
pub mod sink;
pub mod statement;
pub mod token;

pub use crate::{
    addr::{Addr, NumericType},
    assembler::Assembler,
    disassembler::{Disassembler, Disassembly},
    error::{Error, Location, Result},
    flags::{BitState, StatusFlags},
    instruction::{Instruction, ReturnConvention},
    module::Module,
    rom::{Mapping, Rom, RomIdentitySink, RomOverwriter},
    sink::{OutputSink, VecSink},
};
