//! Ahead-of-time compiler core for the Lantern register bytecode.
//!
//! The compiler consumes whole classes at a time; this crate owns the
//! per-method pipeline.  A decoded [`lantern_asm::MethodBody`] is parsed into
//! a control-flow graph of mid-level IR, put into SSA form, optimized,
//! gated by a cost analyzer, lowered to target LIR, locally optimized and
//! assembled into relocatable native code plus its lookup metadata
//! (PC-to-bytecode tables, GC reference maps, register-map tables).  The
//! produced byte vectors are interned through a content-addressed dedupe
//! store shared by all compiler workers.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(unused_must_use)]

pub mod codegen;
pub mod compiled;
pub mod dedupe;
pub mod driver;
mod error;
mod flags;
pub mod lir;
pub mod mir;
pub mod target;

pub use error::{Bug, BugKind};
pub use flags::{CompilerFilter, DisableOpt, EnableDebug, InstructionSet};

/// SSA name; negative values are sentinels.
pub type SReg = i32;

/// "No SSA name".
pub const INVALID_SREG: SReg = -1;

/// SSA base vreg standing for the current-method pointer.
pub const SSA_METHOD_BASEREG: SReg = -2;

/// First compiler-temp base vreg; grows downward.
pub const SSA_CTEMP_BASEREG: SReg = SSA_METHOD_BASEREG - 1;
