//! Per-opcode dataflow and analysis attribute bits.
//!
//! Both tables are emitted from the opcode declaration in `opcode.rs`; the
//! constants here give the individual bit positions their names.

/// Dataflow attribute bits (`u64` per opcode).
///
/// `UA`/`UB`/`UC` say which of the decoded operands are register uses, `DA`
/// that vA is a def; the `*_WIDE` bits widen the respective operand to a
/// register pair.  The remaining bits drive the optimizer: null/range check
/// positions are indices into the SSA `uses` array.
pub mod df {
    #![allow(missing_docs)]

    pub const NOP: u64 = 0;
    pub const UA: u64 = 1 << 0;
    pub const UB: u64 = 1 << 1;
    pub const UC: u64 = 1 << 2;
    pub const A_WIDE: u64 = 1 << 3;
    pub const B_WIDE: u64 = 1 << 4;
    pub const C_WIDE: u64 = 1 << 5;
    pub const DA: u64 = 1 << 6;
    pub const IS_MOVE: u64 = 1 << 7;
    pub const SETS_CONST: u64 = 1 << 8;
    pub const FORMAT_35C: u64 = 1 << 9;
    pub const FORMAT_3RC: u64 = 1 << 10;
    /// Null check of `uses[0]`.
    pub const NULL_CHK_0: u64 = 1 << 11;
    /// Null check of `uses[1]`.
    pub const NULL_CHK_1: u64 = 1 << 12;
    /// Null check of `uses[2]`.
    pub const NULL_CHK_2: u64 = 1 << 13;
    /// Null check of outgoing argument 0 (invokes on `this`).
    pub const NULL_CHK_OUT0: u64 = 1 << 14;
    /// Instruction defines a reference that cannot be null.
    pub const NON_NULL_DST: u64 = 1 << 15;
    /// Return value of the call cannot be null.
    pub const NON_NULL_RET: u64 = 1 << 16;
    /// Object copy transfers null-check state src[0] -> dst.
    pub const NULL_TRANSFER_0: u64 = 1 << 17;
    /// Phi transfers null-check state from all operands.
    pub const NULL_TRANSFER_N: u64 = 1 << 18;
    /// Range check of `uses[1]`.
    pub const RANGE_CHK_1: u64 = 1 << 19;
    /// Range check of `uses[2]`.
    pub const RANGE_CHK_2: u64 = 1 << 20;
    /// Range check of `uses[3]`.
    pub const RANGE_CHK_3: u64 = 1 << 21;
    pub const FP_A: u64 = 1 << 22;
    pub const FP_B: u64 = 1 << 23;
    pub const FP_C: u64 = 1 << 24;
    pub const CORE_A: u64 = 1 << 25;
    pub const CORE_B: u64 = 1 << 26;
    pub const CORE_C: u64 = 1 << 27;
    pub const REF_A: u64 = 1 << 28;
    pub const REF_B: u64 = 1 << 29;
    pub const REF_C: u64 = 1 << 30;
    /// Implicit use of the current-method pointer.
    pub const UMS: u64 = 1 << 31;

    pub const HAS_USES: u64 = UA | UB | UC;
    pub const HAS_DEFS: u64 = DA;
    pub const HAS_NULL_CHKS: u64 = NULL_CHK_0 | NULL_CHK_1 | NULL_CHK_2 | NULL_CHK_OUT0;
    pub const HAS_RANGE_CHKS: u64 = RANGE_CHK_1 | RANGE_CHK_2 | RANGE_CHK_3;
    pub const HAS_NR_CHKS: u64 = HAS_NULL_CHKS | HAS_RANGE_CHKS;
}

/// Method-analyzer attribute bits (`u32` per opcode).
pub mod an {
    #![allow(missing_docs)]

    pub const NONE: u32 = 1 << 0;
    pub const MATH: u32 = 1 << 1;
    pub const FP: u32 = 1 << 2;
    pub const SINGLE: u32 = 1 << 3;
    pub const DOUBLE: u32 = 1 << 4;
    pub const INT: u32 = 1 << 5;
    pub const LONG: u32 = 1 << 6;
    pub const BRANCH: u32 = 1 << 7;
    pub const INVOKE: u32 = 1 << 8;
    pub const ARRAYOP: u32 = 1 << 9;
    pub const HEAVYWEIGHT: u32 = 1 << 10;
    pub const SIMPLECONST: u32 = 1 << 11;
    pub const MOVE: u32 = 1 << 12;
    pub const SWITCH: u32 = 1 << 13;

    /// Ops allowed in a "computational" block for hot-loop detection.
    pub const COMPUTATIONAL: u32 = MATH | ARRAYOP | MOVE | SIMPLECONST;
}
