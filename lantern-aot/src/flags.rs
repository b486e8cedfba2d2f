//! Compilation control flags.

bitflags::bitflags! {
    /// Individually disableable optimizations.
    pub struct DisableOpt: u32 {
        /// LIR load/store elimination.
        const LOAD_STORE_ELIMINATION = 1 << 0;
        /// LIR load hoisting.
        const LOAD_HOISTING = 1 << 1;
        /// Redundant-load suppression during value tracking.
        const SUPPRESS_LOADS = 1 << 2;
        /// Null- and range-check elimination.
        const NULL_CHECK_ELIMINATION = 1 << 3;
        /// Register promotion.
        const PROMOTE_REGS = 1 << 4;
        /// Live-temp tracking across MIRs.
        const TRACK_LIVE_TEMPS = 1 << 5;
        /// Only optimizations that cannot change observable behavior.
        const SAFE_OPTIMIZATIONS = 1 << 6;
        /// Extended-basic-block optimizations.
        const BB_OPT = 1 << 7;
        /// Special-pattern matching of tiny methods.
        const MATCH = 1 << 8;
        /// Promotion of compiler temps.
        const PROMOTE_COMPILER_TEMPS = 1 << 9;
        /// Compare-and-branch fusion.
        const BRANCH_FUSING = 1 << 10;
    }
}

bitflags::bitflags! {
    /// Debug/diagnostic enables.
    pub struct EnableDebug: u32 {
        /// Verbose per-method logging.
        const VERBOSE = 1 << 0;
        /// Dump the CFG after each phase.
        const DUMP_CFG = 1 << 1;
        /// Re-verify dataflow info after SSA.
        const VERIFY_DATAFLOW = 1 << 2;
        /// Log arena usage of expensive methods.
        const SHOW_MEMORY_USAGE = 1 << 3;
        /// One-line arena summary per method.
        const SHOW_SUMMARY_MEMORY_USAGE = 1 << 4;
        /// Count eliminated null/range checks.
        const DUMP_CHECK_STATS = 1 << 5;
        /// Histogram opcodes of compiled methods.
        const COUNT_OPCODES = 1 << 6;
        /// Log the analyzer's skip statistics.
        const SHOW_FILTER_STATS = 1 << 7;
        /// Keep NOP'd LIRs visible in dumps.
        const SHOW_NOPS = 1 << 8;
    }
}

impl Default for DisableOpt {
    /// The default optimizer setting: everything on except LIR load/store
    /// elimination, which stays off until its alias model is revalidated.
    fn default() -> Self {
        DisableOpt::LOAD_STORE_ELIMINATION
    }
}

impl Default for EnableDebug {
    fn default() -> Self {
        EnableDebug::empty()
    }
}

/// How aggressively the analyzer gates compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum CompilerFilter {
    /// Compile everything.
    Everything,
    /// Compile nothing.
    InterpretOnly,
    /// Balance code size against speed.
    Balanced,
    /// Prefer small oat files.
    Space,
    /// Prefer fast code.
    Speed,
}

/// Target instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstructionSet {
    /// ARMv7 Thumb2.
    Thumb2,
    /// MIPS32.
    Mips,
    /// x86-32.
    X86,
}

impl InstructionSet {
    /// Required start alignment of method code.
    pub fn code_alignment(self) -> u32 {
        match self {
            InstructionSet::Thumb2 => 2,
            InstructionSet::Mips => 4,
            InstructionSet::X86 => 16,
        }
    }

    /// Delta added to a raw code address to form a callable pointer
    /// (Thumb2 sets the interworking bit).
    pub fn code_delta(self) -> u32 {
        match self {
            InstructionSet::Thumb2 => 1,
            InstructionSet::Mips | InstructionSet::X86 => 0,
        }
    }

    /// Stack alignment of the frame.
    pub fn stack_alignment(self) -> u32 {
        match self {
            InstructionSet::Thumb2 => 8,
            InstructionSet::Mips => 8,
            InstructionSet::X86 => 16,
        }
    }
}
