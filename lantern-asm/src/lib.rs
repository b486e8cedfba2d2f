//! Instruction set primitives of the Lantern register bytecode.
//!
//! The Lantern bytecode is a register-based, 16-bit-code-unit instruction
//! stream produced from a class-file compiler.  This crate owns everything
//! the AOT compiler needs to know about it: the opcode table (one source of
//! truth emitting formats, control-flow flags, dataflow attributes and
//! analysis attributes), the instruction decoder, the method-body input
//! model, and the LEB128 codec used by the emitted metadata tables.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

#[macro_use]
mod macros;

pub mod dataflow;
mod format;
mod insn;
pub mod leb128;
mod method;
mod opcode;

pub use format::Format;
pub use insn::{
    ArrayDataPayload, DecodedInstruction, PackedSwitchPayload, SparseSwitchPayload,
    ARRAY_DATA_SIGNATURE, PACKED_SWITCH_SIGNATURE, SPARSE_SWITCH_SIGNATURE,
};
pub use method::{AccessFlags, InvokeType, MethodBody, MethodRef, TryItem};
pub use opcode::{OpFlags, Opcode};

/// A 16-bit code unit of the instruction stream.
pub type CodeUnit = u16;

/// Virtual register number.
pub type VReg = u16;

/// Marker for "no virtual register" in emitted register-map tables.
pub const INVALID_VREG: u16 = 0xffff;
