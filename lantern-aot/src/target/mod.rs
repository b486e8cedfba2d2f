//! Target capability interface: register conventions, instruction sizing
//! and assembly for each supported ISA.

mod mips;
mod thumb2;
mod x86;

pub use mips::Mips;
pub use thumb2::Thumb2;
pub use x86::X86;

use crate::lir::{AssemblerStatus, Lir, LirList};
use crate::InstructionSet;

/// First floating-point register number; FP regs are `FP_REG_BASE + n`.
pub const FP_REG_BASE: u8 = 32;

/// Offset of the heap-object class pointer.
pub const OBJECT_CLASS_OFFSET: i32 = 0;
/// Offset of the array length word.
pub const ARRAY_LENGTH_OFFSET: i32 = 8;
/// Offset of the first array element (32-bit elements).
pub const ARRAY_DATA_OFFSET: i32 = 12;
/// Offset of a string's length field.
pub const STRING_COUNT_OFFSET: i32 = 8;
/// Offset of a string's backing char array.
pub const STRING_VALUE_OFFSET: i32 = 16;
/// Offset of the declaring class in a method object.
pub const METHOD_DECLARING_CLASS_OFFSET: i32 = 0;
/// Per-thread offset of the suspend-count word.
pub const THREAD_SUSPEND_COUNT_OFFSET: i32 = 0x20;
/// Per-thread offset of the pending-exception slot.
pub const THREAD_EXCEPTION_OFFSET: i32 = 0x24;
/// Per-thread offset of the current-thread object pointer.
pub const THREAD_SELF_OBJECT_OFFSET: i32 = 0x68;

/// Runtime helpers reachable at fixed offsets from the per-thread base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum QuickEntrypoint {
    AllocObject,
    AllocArray,
    CheckCast,
    InstanceofNonTrivial,
    InitializeStaticStorage,
    ResolveString,
    ResolveType,
    LockObject,
    UnlockObject,
    HandleFillArrayData,
    TestSuspend,
    DeliverException,
    ThrowNullPointer,
    ThrowDivZero,
    ThrowArrayBounds,
    Idivmod,
    Lmul,
    Ldiv,
    Lmod,
    Lshl,
    Lshr,
    Lushr,
    F2l,
    D2l,
    L2f,
    L2d,
    Fmod,
    Dmod,
    StringCompareTo,
    StringIndexOf,
    InvokeStaticTrampoline,
    InvokeDirectTrampoline,
    InvokeVirtualTrampoline,
    InvokeSuperTrampoline,
    InvokeInterfaceTrampoline,
    Get32Instance,
    Get64Instance,
    GetObjInstance,
    Set32Instance,
    Set64Instance,
    SetObjInstance,
    Get32Static,
    Get64Static,
    GetObjStatic,
    Set32Static,
    Set64Static,
    SetObjStatic,
}

impl QuickEntrypoint {
    /// Fixed offset from the thread base.
    pub fn thread_offset(self) -> i32 {
        0x100 + (self as i32) * 4
    }
}

/// Register conventions of one target.
pub struct TargetRegs {
    /// Caller-save scratch registers, allocation order.
    pub core_temps: &'static [u8],
    /// Callee-save registers available for promotion.
    pub preserved_core: &'static [u8],
    /// FP scratch registers.
    pub fp_temps: &'static [u8],
    /// Callee-save FP registers available for promotion.
    pub preserved_fp: &'static [u8],
    /// Argument registers, in order.
    pub arg_regs: &'static [u8],
    /// Primary return register.
    pub ret0: u8,
    /// High-word return register.
    pub ret1: u8,
    /// FP return register.
    pub fret0: u8,
    /// Stack pointer.
    pub sp: u8,
    /// Link register, if the ISA has one.
    pub lr: Option<u8>,
    /// Per-thread base register.
    pub self_reg: u8,
    /// Dedicated suspend-count register, if reserved.
    pub suspend_reg: Option<u8>,
    /// Scratch register used to hold indirect call targets.
    pub invoke_tgt: u8,
    /// Callee-saved registers the compiler always spills (scratch it
    /// reserves beyond the ABI caller-save set).
    pub reserved_spill_mask: u32,
}

/// Everything the target-independent backend needs from an ISA.
pub trait Target: Send + Sync {
    /// Which ISA this is.
    fn isa(&self) -> InstructionSet;

    /// Register conventions.
    fn regs(&self) -> &'static TargetRegs;

    /// Byte size of one instruction at its current encoding width.
    fn inst_size(&self, lir: &Lir) -> u8;

    /// Encode every chained instruction into `buf`.  Returns
    /// [`AssemblerStatus::RetryAll`] after widening an out-of-range
    /// PC-relative instruction; the caller reassigns offsets and reruns.
    fn assemble(&self, lirs: &mut LirList, buf: &mut Vec<u8>) -> AssemblerStatus;

    /// Displacement base of switch tables: added to the anchor offset.
    fn switch_anchor_delta(&self) -> i32;

    /// True when switch tables hold absolute offsets instead of
    /// anchor-relative displacements.
    fn switch_absolute(&self) -> bool {
        false
    }

    /// Resource bits implicitly read by PC-relative loads; hoisting a load
    /// across a PC def is forbidden on ISAs where this is non-zero.
    fn pc_use_def_encoding(&self) -> u64;

    /// True when the ISA prefers two-operand ALU forms; the generator then
    /// copies into the destination first.
    fn two_operand_alu(&self) -> bool {
        false
    }

    /// True when multi-register push/pop exists (otherwise the prologue
    /// spills one store at a time).
    fn has_push_pop(&self) -> bool {
        false
    }
}

/// The code generator for an ISA.
pub fn target_for(isa: InstructionSet) -> &'static dyn Target {
    match isa {
        InstructionSet::Thumb2 => &Thumb2,
        InstructionSet::Mips => &Mips,
        InstructionSet::X86 => &X86,
    }
}

/// Branch displacement from `from` (pc of the instruction after adjust) to
/// `to`.
pub(crate) fn displacement(from: u32, pc_adjust: i32, to: u32) -> i32 {
    to as i32 - (from as i32 + pc_adjust)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entrypoints_have_distinct_offsets() {
        let a = QuickEntrypoint::AllocObject.thread_offset();
        let b = QuickEntrypoint::AllocArray.thread_offset();
        assert_ne!(a, b);
        assert_eq!(b - a, 4);
    }

    #[test]
    fn targets_expose_expected_conventions() {
        for isa in [
            InstructionSet::Thumb2,
            InstructionSet::Mips,
            InstructionSet::X86,
        ] {
            let t = target_for(isa);
            assert_eq!(t.isa(), isa);
            let regs = t.regs();
            assert!(!regs.core_temps.is_empty());
            assert!(!regs.preserved_core.is_empty());
            assert!(regs.arg_regs.len() >= 2);
        }
    }
}
