//! Mid-level IR: a control-flow graph of basic blocks, each holding a
//! doubly-linked list of MIR nodes wrapping decoded bytecode instructions.
//!
//! Blocks and MIRs live in typed pools inside [`MirGraph`] and reference one
//! another by id, so the cyclic predecessor/successor structure needs no
//! ownership tricks and the whole graph is freed with the compilation unit.

mod analysis;
mod build;
mod dataflow;
mod lvn;
mod opt;
mod ssa;
mod typing;

pub use analysis::MethodStats;
pub use lvn::{LocalValueNumbering, ARRAY_REF, NO_VALUE};
pub use opt::ConditionCode;
pub use typing::{RegLocation, RegLocationType};

use hashbrown::{HashMap, HashSet};
use lantern_arena::{BitVector, GrowableArray};
use lantern_asm::dataflow::df;
use lantern_asm::{AccessFlags, DecodedInstruction, InvokeType, Opcode};

use crate::{DisableOpt, EnableDebug, InstructionSet, SReg};

/// Basic-block id: an index into [`MirGraph`]'s block pool.
pub type BlockId = u32;

/// MIR id: an index into [`MirGraph`]'s node pool.
pub type MirId = u32;

/// Block role in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// Synthetic method entry.
    Entry,
    /// Synthetic method exit.
    Exit,
    /// Ordinary bytecode block.
    ByteCode,
    /// Exception-handling landing block.
    ExceptionHandling,
    /// Removed from the graph.
    Dead,
}

/// Compiler-internal pseudo-opcodes layered above the bytecode set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[allow(missing_docs)]
pub enum ExtOp {
    Phi,
    Copy,
    FusedCmplFloat,
    FusedCmpgFloat,
    FusedCmplDouble,
    FusedCmpgDouble,
    FusedCmpLong,
    Nop,
    NullCheck,
    RangeCheck,
    DivZeroCheck,
    Check,
    CheckPart2,
    Select,
}

impl ExtOp {
    /// Dataflow attributes of the pseudo-op.
    pub fn dataflow_attrs(self) -> u64 {
        match self {
            ExtOp::Phi => df::DA | df::NULL_TRANSFER_N,
            ExtOp::Copy => df::DA | df::UB | df::IS_MOVE,
            ExtOp::FusedCmplFloat | ExtOp::FusedCmpgFloat => {
                df::UA | df::UB | df::FP_A | df::FP_B
            }
            ExtOp::FusedCmplDouble | ExtOp::FusedCmpgDouble => {
                df::UA | df::A_WIDE | df::UB | df::B_WIDE | df::FP_A | df::FP_B
            }
            ExtOp::FusedCmpLong => {
                df::UA | df::A_WIDE | df::UB | df::B_WIDE | df::CORE_A | df::CORE_B
            }
            ExtOp::Nop => df::NOP,
            ExtOp::NullCheck => df::UA | df::NULL_CHK_0 | df::REF_A,
            ExtOp::RangeCheck => df::UA | df::UB,
            ExtOp::DivZeroCheck => df::UA | df::CORE_A,
            // Check pairs inherit behavior from the paired throwing MIR.
            ExtOp::Check | ExtOp::CheckPart2 => df::NOP,
            ExtOp::Select => df::DA | df::UB,
        }
    }
}

/// Opcode slot of a MIR: either real bytecode or an extended pseudo-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirOp {
    /// Decoded bytecode instruction.
    Code(Opcode),
    /// Compiler pseudo-op.
    Ext(ExtOp),
}

impl MirOp {
    /// Dataflow attributes.
    pub fn dataflow_attrs(self) -> u64 {
        match self {
            MirOp::Code(op) => op.dataflow_attrs(),
            MirOp::Ext(ext) => ext.dataflow_attrs(),
        }
    }

    /// The wrapped bytecode opcode, if any.
    pub fn code(self) -> Option<Opcode> {
        match self {
            MirOp::Code(op) => Some(op),
            MirOp::Ext(_) => None,
        }
    }

    /// True for extended pseudo-ops.
    pub fn is_ext(self) -> bool {
        matches!(self, MirOp::Ext(_))
    }
}

bitflags::bitflags! {
    /// Optimizer findings attached to individual MIRs.
    pub struct MirFlags: u16 {
        /// The null check of this MIR is provably redundant.
        const IGNORE_NULL_CHECK = 1 << 0;
        /// Only the null-check half of this MIR remains live.
        const NULL_CHECK_ONLY = 1 << 1;
        /// The range check of this MIR is provably redundant.
        const IGNORE_RANGE_CHECK = 1 << 2;
        /// Only the range-check half of this MIR remains live.
        const RANGE_CHECK_ONLY = 1 << 3;
        /// Invoke replaced by an inlined intrinsic sequence.
        const INLINED = 1 << 4;
        /// Invoke inlined under a devirtualization prediction.
        const INLINED_PRED = 1 << 5;
        /// Instruction was pulled in from a callee.
        const CALLEE = 1 << 6;
        /// Suspend check at this branch is suppressed.
        const IGNORE_SUSPEND_CHECK = 1 << 7;
        /// Duplicate flagged by value numbering.
        const DUP = 1 << 8;
        /// Transient traversal mark.
        const MARK = 1 << 9;
    }
}

/// Operand record of a MIR, mutable by the optimizer (unlike the decoder's
/// [`DecodedInstruction`], the opcode slot can hold pseudo-ops).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirInsn {
    /// Opcode slot.
    pub op: MirOp,
    /// vA operand.
    pub va: u32,
    /// vB operand / literal / index.
    pub vb: u32,
    /// Wide literal.
    pub vb_wide: u64,
    /// vC operand / literal.
    pub vc: u32,
    /// Explicit invoke argument registers.
    pub args: [u32; 5],
}

impl From<DecodedInstruction> for MirInsn {
    fn from(d: DecodedInstruction) -> Self {
        MirInsn {
            op: MirOp::Code(d.opcode),
            va: d.a,
            vb: d.b,
            vb_wide: d.b_wide,
            vc: d.c,
            args: d.args,
        }
    }
}

/// SSA uses/defs of one MIR.
///
/// Wide values keep the bytecode convention of occupying two consecutive
/// names, so a long add has four uses and two defs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SsaRep {
    /// SSA names consumed, in operand order.
    pub uses: Vec<SReg>,
    /// Parallel FP hints for `uses`.
    pub fp_use: Vec<bool>,
    /// SSA names defined.
    pub defs: Vec<SReg>,
    /// Parallel FP hints for `defs`.
    pub fp_def: Vec<bool>,
}

/// Side metadata of a MIR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirMeta {
    /// Nothing attached.
    None,
    /// For a `Check` pseudo-op: the paired throwing MIR.
    ThrowInsn(MirId),
    /// For a NOP'd MIR: the opcode it used to be.
    OriginalOp(MirOp),
    /// For a phi: predecessor block of each operand, parallel to `uses`.
    PhiIncoming(Vec<BlockId>),
}

/// One mid-level IR node.
#[derive(Debug, Clone)]
pub struct Mir {
    /// Operands.
    pub insn: MirInsn,
    /// Original bytecode offset in code units.
    pub offset: u32,
    /// Code units consumed by the instruction.
    pub width: u16,
    /// Source method for inlined code; 0 is the outermost method.
    pub m_unit_index: u16,
    /// Previous node in the owning block.
    pub prev: Option<MirId>,
    /// Next node in the owning block.
    pub next: Option<MirId>,
    /// SSA uses/defs; present after SSA conversion.
    pub ssa_rep: Option<SsaRep>,
    /// Optimizer findings.
    pub opt_flags: MirFlags,
    /// Pseudo-op metadata.
    pub meta: MirMeta,
}

impl Mir {
    fn new(insn: MirInsn, offset: u32, width: u16) -> Self {
        Mir {
            insn,
            offset,
            width,
            m_unit_index: 0,
            prev: None,
            next: None,
            ssa_rep: None,
            opt_flags: MirFlags::empty(),
            meta: MirMeta::None,
        }
    }
}

/// Kind of a block's one-to-many successor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessorKind {
    /// Exception handlers; key is the exception type index.
    Catch,
    /// Packed switch; key is the case value.
    PackedSwitch,
    /// Sparse switch; key is the case value.
    SparseSwitch,
}

/// Ordered successor table of a switch or throwing block.
#[derive(Debug, Clone)]
pub struct SuccessorList {
    /// Table kind.
    pub kind: SuccessorKind,
    /// (target block, key) in table order.
    pub entries: Vec<(BlockId, i32)>,
}

/// Per-block dataflow info.
#[derive(Debug, Clone)]
pub struct BlockDataFlow {
    /// VRegs used before definition in this block.
    pub use_v: BitVector,
    /// VRegs defined in this block.
    pub def_v: BitVector,
    /// VRegs live on entry.
    pub live_in_v: BitVector,
    /// Blocks needing a phi for this block's defs (scratch).
    pub phi_v: BitVector,
    /// vreg -> SSA name at the end of the block, filled during renaming.
    pub vreg_to_ssa_map: Vec<SReg>,
    /// SSA names known non-null at block end.
    pub ending_null_check_v: Option<BitVector>,
}

/// One basic block.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// This block's id.
    pub id: BlockId,
    /// Postorder DFS number; `usize::MAX` before computation.
    pub dfs_id: usize,
    /// Traversal mark.
    pub visited: bool,
    /// Excluded from traversals without being dead.
    pub hidden: bool,
    /// Block is an exception handler entry.
    pub catch_entry: bool,
    /// Block ends in an unconditional throw.
    pub explicit_throw: bool,
    /// Block ends in a two-way branch.
    pub conditional_branch: bool,
    /// Block ends in a return opcode.
    pub terminated_by_return: bool,
    /// Member of a return-dominating extended basic block.
    pub dominates_return: bool,
    /// Bytecode offset of the first instruction.
    pub start_offset: u32,
    /// Loop nesting depth, for use-count weighting.
    pub nesting_depth: u16,
    /// Role of the block.
    pub block_type: BlockType,
    /// First MIR, if any.
    pub first_mir: Option<MirId>,
    /// Last MIR, if any.
    pub last_mir: Option<MirId>,
    /// Fall-through successor.
    pub fall_through: Option<BlockId>,
    /// Branch-taken successor.
    pub taken: Option<BlockId>,
    /// Immediate dominator.
    pub i_dom: Option<BlockId>,
    /// Dataflow info; absent for hidden scaffolding blocks.
    pub data_flow: Option<BlockDataFlow>,
    /// Predecessor blocks.
    pub predecessors: GrowableArray<BlockId>,
    /// Dominator set over block ids.
    pub dominators: Option<BitVector>,
    /// Blocks immediately dominated by this one.
    pub i_dominated: Option<BitVector>,
    /// Dominance frontier.
    pub dom_frontier: Option<BitVector>,
    /// Catch or switch successor table.
    pub successor_list: Option<SuccessorList>,
}

impl BasicBlock {
    fn new(id: BlockId, block_type: BlockType) -> Self {
        BasicBlock {
            id,
            dfs_id: usize::MAX,
            visited: false,
            hidden: false,
            catch_entry: false,
            explicit_throw: false,
            conditional_branch: false,
            terminated_by_return: false,
            dominates_return: false,
            start_offset: 0,
            nesting_depth: 0,
            block_type,
            first_mir: None,
            last_mir: None,
            fall_through: None,
            taken: None,
            i_dom: None,
            data_flow: None,
            predecessors: GrowableArray::new(2),
            dominators: None,
            i_dominated: None,
            dom_frontier: None,
            successor_list: None,
        }
    }
}

/// Method attribute bits discovered during analysis.
pub mod method_attrs {
    /// No calls anywhere in the method.
    pub const IS_LEAF: u32 = 1 << 0;
    /// A simple loop was detected.
    pub const HAS_LOOP: u32 = 1 << 1;
}

/// Null/range check elimination counters, kept under `DUMP_CHECK_STATS`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckStats {
    /// Null checks required by the bytecode.
    pub null_checks: u32,
    /// Null checks proved redundant.
    pub null_checks_eliminated: u32,
    /// Range checks required by the bytecode.
    pub range_checks: u32,
    /// Range checks proved redundant.
    pub range_checks_eliminated: u32,
}

/// Tiny-method patterns the analyzer recognizes up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialCase {
    /// Not a recognized pattern.
    None,
    /// `return-void` and nothing else.
    NullMethod,
    /// Returns a constant.
    ConstFunction,
    /// Returns its own argument.
    Identity,
}

/// Method-wide facts the graph needs from the compilation unit.  Cloned in
/// rather than borrowed so the graph has no lifetime ties.
#[derive(Debug, Clone)]
pub struct MethodInfo {
    /// Total vregs in the frame.
    pub num_vregs: usize,
    /// Incoming argument words.
    pub num_ins: usize,
    /// Outgoing argument words.
    pub num_outs: usize,
    /// Access flags.
    pub access_flags: AccessFlags,
    /// Shorty of this method.
    pub shorty: String,
    /// How this method is invoked.
    pub invoke_type: InvokeType,
    /// Code units in the method.
    pub insns_size: usize,
    /// Target ISA.
    pub isa: InstructionSet,
    /// Disabled optimizations.
    pub disable_opt: DisableOpt,
    /// Debug enables.
    pub enable_debug: EnableDebug,
}

/// Signature facts for invoke targets, supplied by the resolver.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    entries: HashMap<u32, (String, String, String)>,
}

impl MethodTable {
    /// Empty table; every lookup falls back to conservative behavior.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `(class_descriptor, name, shorty)` for a method index.
    pub fn insert(&mut self, method_idx: u32, class: &str, name: &str, shorty: &str) {
        self.entries
            .insert(method_idx, (class.into(), name.into(), shorty.into()));
    }

    /// Shorty of an invoke target.
    pub fn shorty(&self, method_idx: u32) -> Option<&str> {
        self.entries.get(&method_idx).map(|e| e.2.as_str())
    }

    /// Full `(class, name, shorty)` signature of an invoke target.
    pub fn signature(&self, method_idx: u32) -> Option<(&str, &str, &str)> {
        self.entries
            .get(&method_idx)
            .map(|e| (e.0.as_str(), e.1.as_str(), e.2.as_str()))
    }
}

/// The MIR control-flow graph and its dataflow state.
pub struct MirGraph {
    /// Block pool, indexed by [`BlockId`].
    pub blocks: Vec<BasicBlock>,
    mirs: Vec<Mir>,
    /// The method's code units; switch and fill-array payloads are decoded
    /// from here again at lowering time.
    pub insns: Vec<u16>,
    /// Method-wide facts.
    pub info: MethodInfo,
    /// Invoke-target signatures.
    pub methods: MethodTable,

    entry_block: BlockId,
    exit_block: BlockId,
    pub(crate) cur_block: Option<BlockId>,
    block_map: HashMap<u32, BlockId>,
    /// Collapse cache: dead block id -> surviving block id.
    pub(crate) block_id_map: HashMap<BlockId, BlockId>,
    pub(crate) try_block_addr: BitVector,
    /// Bytecode offsets of catch entries, checked against the emitted
    /// bc-to-pc table after assembly.
    pub catches: HashSet<u32>,

    // SSA state.
    pub(crate) ssa_base_vregs: Vec<SReg>,
    pub(crate) ssa_subscripts: Vec<i32>,
    pub(crate) vreg_to_ssa_map: Vec<SReg>,
    pub(crate) ssa_last_defs: Vec<i32>,
    pub(crate) is_constant_v: BitVector,
    pub(crate) constant_values: Vec<i32>,
    /// Use counts weighted by nesting depth.
    pub(crate) use_counts: GrowableArray<u32>,
    /// Unweighted use counts.
    pub(crate) raw_use_counts: GrowableArray<u32>,
    pub(crate) num_reachable_blocks: usize,
    pub(crate) dfs_order: GrowableArray<BlockId>,
    pub(crate) dfs_post_order: GrowableArray<BlockId>,
    pub(crate) dom_post_order: GrowableArray<BlockId>,
    pub(crate) i_dom_list: Vec<i32>,
    pub(crate) def_block_matrix: Vec<BitVector>,
    pub(crate) temp_vreg_v: Option<BitVector>,
    pub(crate) temp_ssa_register_v: Option<BitVector>,
    pub(crate) def_count: usize,
    num_ssa_regs: usize,
    pub(crate) method_sreg: SReg,
    /// Method attribute bits (`method_attrs`).
    pub attributes: u32,
    /// Check-elimination counters.
    pub checkstats: CheckStats,
    /// Recognized tiny-method pattern.
    pub special_case: SpecialCase,
    /// Per-SSA-name locations, built after type inference.
    pub reg_locations: Vec<RegLocation>,
    /// Opcode histogram under `COUNT_OPCODES`.
    pub opcode_count: Option<Vec<u32>>,
}

impl MirGraph {
    /// Create an empty graph for the given method facts.
    pub fn new(info: MethodInfo, methods: MethodTable) -> Self {
        let num_vregs = info.num_vregs;
        let mut graph = MirGraph {
            blocks: Vec::new(),
            mirs: Vec::new(),
            insns: Vec::new(),
            info,
            methods,
            entry_block: 0,
            exit_block: 0,
            cur_block: None,
            block_map: HashMap::new(),
            block_id_map: HashMap::new(),
            try_block_addr: BitVector::new(1, true),
            catches: HashSet::new(),
            ssa_base_vregs: Vec::new(),
            ssa_subscripts: Vec::new(),
            vreg_to_ssa_map: vec![0; num_vregs],
            ssa_last_defs: vec![0; num_vregs],
            is_constant_v: BitVector::new(32, true),
            constant_values: Vec::new(),
            use_counts: GrowableArray::new(num_vregs.max(1)),
            raw_use_counts: GrowableArray::new(num_vregs.max(1)),
            num_reachable_blocks: 0,
            dfs_order: GrowableArray::new(4),
            dfs_post_order: GrowableArray::new(4),
            dom_post_order: GrowableArray::new(4),
            i_dom_list: Vec::new(),
            def_block_matrix: Vec::new(),
            temp_vreg_v: None,
            temp_ssa_register_v: None,
            def_count: 0,
            num_ssa_regs: 0,
            method_sreg: 0,
            attributes: 0,
            checkstats: CheckStats::default(),
            special_case: SpecialCase::None,
            reg_locations: Vec::new(),
            opcode_count: None,
        };
        let entry = graph.new_block(BlockType::Entry);
        let exit = graph.new_block(BlockType::Exit);
        graph.entry_block = entry;
        graph.exit_block = exit;
        graph
    }

    /// Allocate a block in the pool.
    pub fn new_block(&mut self, block_type: BlockType) -> BlockId {
        let id = self.blocks.len() as BlockId;
        self.blocks.push(BasicBlock::new(id, block_type));
        id
    }

    /// Allocate a MIR node.
    pub fn new_mir(&mut self, insn: MirInsn, offset: u32, width: u16) -> MirId {
        let id = self.mirs.len() as MirId;
        self.mirs.push(Mir::new(insn, offset, width));
        id
    }

    /// Entry block id.
    pub fn entry_block(&self) -> BlockId {
        self.entry_block
    }

    /// Exit block id.
    pub fn exit_block(&self) -> BlockId {
        self.exit_block
    }

    /// Shared access to a block.
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id as usize]
    }

    /// Mutable access to a block.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id as usize]
    }

    /// Shared access to a MIR.
    pub fn mir(&self, id: MirId) -> &Mir {
        &self.mirs[id as usize]
    }

    /// Mutable access to a MIR.
    pub fn mir_mut(&mut self, id: MirId) -> &mut Mir {
        &mut self.mirs[id as usize]
    }

    /// Number of blocks ever allocated (dead ones included).
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Number of MIR nodes ever allocated.
    pub fn num_mirs(&self) -> usize {
        self.mirs.len()
    }

    /// Number of reachable blocks after DFS.
    pub fn num_reachable_blocks(&self) -> usize {
        self.num_reachable_blocks
    }

    /// Number of SSA names.
    pub fn num_ssa_regs(&self) -> usize {
        self.num_ssa_regs
    }

    pub(crate) fn set_num_ssa_regs(&mut self, n: usize) {
        self.num_ssa_regs = n;
    }

    /// Map an SSA name back to its base vreg.
    pub fn sreg_to_vreg(&self, s_reg: SReg) -> SReg {
        self.ssa_base_vregs[s_reg as usize]
    }

    /// SSA subscript of a name.
    pub fn ssa_subscript(&self, s_reg: SReg) -> i32 {
        self.ssa_subscripts[s_reg as usize]
    }

    /// Printable `v3_2`-style name of an SSA reg.
    pub fn ssa_name(&self, s_reg: SReg) -> String {
        format!(
            "v{}_{}",
            self.sreg_to_vreg(s_reg),
            self.ssa_subscript(s_reg)
        )
    }

    /// True when the SSA name holds a known constant.
    pub fn is_const(&self, s_reg: SReg) -> bool {
        self.is_constant_v.is_bit_set(s_reg as usize)
    }

    /// The constant value of an SSA name.
    pub fn constant_value(&self, s_reg: SReg) -> i32 {
        debug_assert!(self.is_const(s_reg));
        self.constant_values[s_reg as usize]
    }

    /// The wide constant value starting at an SSA name.
    pub fn constant_value_wide(&self, s_reg: SReg) -> i64 {
        debug_assert!(self.is_const(s_reg));
        (self.constant_values[s_reg as usize + 1] as i64) << 32
            | (self.constant_values[s_reg as usize] as u32 as i64)
    }

    pub(crate) fn set_constant(&mut self, s_reg: SReg, value: i32) {
        self.is_constant_v.set_bit(s_reg as usize);
        if self.constant_values.len() <= s_reg as usize {
            self.constant_values.resize(s_reg as usize + 1, 0);
        }
        self.constant_values[s_reg as usize] = value;
    }

    pub(crate) fn set_constant_wide(&mut self, s_reg: SReg, value: i64) {
        self.set_constant(s_reg, value as i32);
        self.set_constant(s_reg + 1, (value >> 32) as i32);
        self.is_constant_v.set_bit(s_reg as usize + 1);
    }

    /// Weighted use count of an SSA name.
    pub fn use_count(&self, s_reg: SReg) -> u32 {
        self.use_counts.get(s_reg as usize)
    }

    /// Raw (unweighted) use count of an SSA name.
    pub fn raw_use_count(&self, s_reg: SReg) -> u32 {
        self.raw_use_counts.get(s_reg as usize)
    }

    /// SSA name of the current-method pointer.
    pub fn method_sreg(&self) -> SReg {
        self.method_sreg
    }

    /// Find the block starting at `offset`, if any.
    pub fn find_block(&self, offset: u32) -> Option<BlockId> {
        self.block_map.get(&offset).copied()
    }

    pub(crate) fn map_block(&mut self, offset: u32, id: BlockId) {
        self.block_map.insert(offset, id);
    }

    /// Preorder DFS ids of reachable blocks.
    pub fn dfs_order(&self) -> &[BlockId] {
        self.dfs_order.as_slice()
    }

    /// Postorder DFS ids of reachable blocks.
    pub fn dfs_post_order(&self) -> &[BlockId] {
        self.dfs_post_order.as_slice()
    }

    /// Append a MIR to the end of a block.
    pub fn append_mir(&mut self, bb: BlockId, mir: MirId) {
        let (first, last) = {
            let block = self.block(bb);
            (block.first_mir, block.last_mir)
        };
        debug_assert_eq!(first.is_none(), last.is_none());
        match last {
            None => {
                let block = self.block_mut(bb);
                block.first_mir = Some(mir);
                block.last_mir = Some(mir);
            }
            Some(tail) => {
                self.mir_mut(tail).next = Some(mir);
                self.mir_mut(mir).prev = Some(tail);
                self.block_mut(bb).last_mir = Some(mir);
            }
        }
    }

    /// Insert a MIR at the start of a block.
    pub fn prepend_mir(&mut self, bb: BlockId, mir: MirId) {
        let first = self.block(bb).first_mir;
        match first {
            None => {
                let block = self.block_mut(bb);
                block.first_mir = Some(mir);
                block.last_mir = Some(mir);
            }
            Some(head) => {
                self.mir_mut(head).prev = Some(mir);
                self.mir_mut(mir).next = Some(head);
                self.block_mut(bb).first_mir = Some(mir);
            }
        }
    }

    /// Insert `new_mir` after `current` inside `bb`.
    pub fn insert_mir_after(&mut self, bb: BlockId, current: MirId, new_mir: MirId) {
        let next = self.mir(current).next;
        self.mir_mut(new_mir).prev = Some(current);
        self.mir_mut(new_mir).next = next;
        self.mir_mut(current).next = Some(new_mir);
        match next {
            Some(n) => self.mir_mut(n).prev = Some(new_mir),
            None => self.block_mut(bb).last_mir = Some(new_mir),
        }
    }

    /// Iterate MIR ids of a block in order.
    pub fn block_mirs(&self, bb: BlockId) -> impl Iterator<Item = MirId> + '_ {
        let mut cursor = self.block(bb).first_mir;
        std::iter::from_fn(move || {
            let id = cursor?;
            cursor = self.mir(id).next;
            Some(id)
        })
    }

    /// Number of predecessors of a block.
    pub fn predecessor_count(&self, bb: BlockId) -> usize {
        self.block(bb).predecessors.size()
    }

    /// All successors of a block: taken, fall-through, then table entries.
    pub fn successors(&self, bb: BlockId) -> Vec<BlockId> {
        let block = self.block(bb);
        let mut out = Vec::new();
        if let Some(ft) = block.fall_through {
            out.push(ft);
        }
        if let Some(tk) = block.taken {
            out.push(tk);
        }
        if let Some(list) = &block.successor_list {
            out.extend(list.entries.iter().map(|&(b, _)| b));
        }
        out
    }

    /// True when `target` sits at or before `branch` in bytecode order.
    pub fn is_backedge(&self, branch: BlockId, target: Option<BlockId>) -> bool {
        match target {
            Some(t) => self.block(t).start_offset <= self.block(branch).start_offset,
            None => false,
        }
    }

    /// True when either outgoing edge of `branch` goes backwards.
    pub fn is_backwards_branch(&self, branch: BlockId) -> bool {
        self.is_backedge(branch, self.block(branch).taken)
            || self.is_backedge(branch, self.block(branch).fall_through)
    }

    /// Clear the `visited` mark on every block.
    pub fn clear_all_visited_flags(&mut self) {
        for block in &mut self.blocks {
            block.visited = false;
        }
    }

    /// Record an opcode for the histogram.
    pub(crate) fn count_opcode(&mut self, op: Opcode) {
        if let Some(counts) = &mut self.opcode_count {
            counts[op as u8 as usize] += 1;
        }
    }

    /// Enable opcode counting.
    pub fn enable_opcode_counting(&mut self) {
        self.opcode_count = Some(vec![0; 256]);
    }

    /// Find the `move-result*` consuming `mir`'s value, if one follows
    /// immediately (possibly across a single-predecessor fall-through edge).
    pub fn find_move_result(&self, bb: BlockId, mir: MirId) -> Option<MirId> {
        let mut bb = bb;
        let mut cursor = self.advance_mir(&mut bb, mir);
        while let Some(id) = cursor {
            match self.mir(id).insn.op {
                MirOp::Code(
                    Opcode::MoveResult | Opcode::MoveResultWide | Opcode::MoveResultObject,
                ) => return Some(id),
                // Keep going over pseudo-ops only.
                MirOp::Ext(_) => cursor = self.advance_mir(&mut bb, id),
                MirOp::Code(_) => return None,
            }
        }
        None
    }

    /// Step to the next MIR, crossing into a sole fall-through successor
    /// when the current block ends.
    pub(crate) fn advance_mir(&self, bb: &mut BlockId, mir: MirId) -> Option<MirId> {
        if let Some(next) = self.mir(mir).next {
            return Some(next);
        }
        let ft = self.block(*bb).fall_through?;
        if self.predecessor_count(ft) != 1 {
            return None;
        }
        *bb = ft;
        self.block(ft).first_mir
    }
}
