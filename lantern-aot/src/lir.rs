//! Low-level IR: one node per target machine instruction, plus pseudo-ops
//! that carry labels, safepoints and pool data through assembly.

use crate::mir::BlockId;

/// LIR id: an index into a [`LirList`] pool.
pub type LirId = u32;

/// Non-emitting opcodes.  These occupy no bytes except `Align4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum PseudoOp {
    /// Exported PC for a catch entry; lands in the bc-to-pc table.
    ExportedPc,
    /// Safepoint; lands in the pc-to-bc table and the GC map.
    SafepointPc,
    /// Branch target for a suspend-check launchpad.
    SuspendTarget,
    /// Branch target for a throw launchpad; operands carry the throw kind.
    ThrowTarget,
    /// Switch case label.
    CaseLabel,
    MethodEntry,
    MethodExit,
    /// Scheduling barrier.
    Barrier,
    EntryBlock,
    ExitBlock,
    /// Generic branch target.
    TargetLabel,
    /// Start of one bytecode instruction.
    BoundaryMarker,
    /// Emits 0 or 2 bytes so the next offset is 4-aligned.
    Align4,
    EhBlockLabel,
    NormalBlockLabel,
    /// 32-bit literal pool word; `operands[0]` is the value.
    LiteralWord,
    /// Code-address literal awaiting patching; records a code patch.
    LiteralCodeTarget,
    /// Method-pointer literal awaiting patching; records a method patch.
    LiteralMethodTarget,
}

/// Emitting opcodes, target-neutral; each assembles to exactly one
/// instruction of the selected ISA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MachineOp {
    Nop,
    // Moves.
    MovRR,
    MovRI,
    /// Load the high half of a 32-bit immediate (MIPS `lui`, Thumb2 `movt`).
    LuiRI,
    MvnRR,
    // Integer ALU, register and immediate forms.
    AddRRR,
    AddRRI,
    AdcRRR,
    SubRRR,
    SubRRI,
    SbcRRR,
    MulRRR,
    /// Unsigned set-on-less-than; carries long-add carries on MIPS.
    SltuRRR,
    AndRRR,
    AndRRI,
    OrRRR,
    OrRRI,
    XorRRR,
    XorRRI,
    LslRRR,
    LslRRI,
    LsrRRR,
    LsrRRI,
    AsrRRR,
    AsrRRI,
    NegRR,
    NotRR,
    CmpRR,
    CmpRI,
    // Memory.
    LoadWordDisp,
    LoadUHalfDisp,
    LoadSHalfDisp,
    LoadUByteDisp,
    LoadSByteDisp,
    StoreWordDisp,
    StoreHalfDisp,
    StoreByteDisp,
    /// Load from the literal pool; `target` is the pool LIR.
    LoadPcRel,
    /// Materialize the address of a PC-relative label (switch tables).
    AdrPcRel,
    // Floating point (single registers are even/odd pairs for doubles).
    FMovRR,
    FMovCoreFp,
    FMovFpCore,
    FAddS,
    FSubS,
    FMulS,
    FDivS,
    FAddD,
    FSubD,
    FMulD,
    FDivD,
    FNegS,
    FNegD,
    FSqrtD,
    FCmpS,
    FCmpD,
    FCvtIS,
    FCvtSI,
    FCvtID,
    FCvtDI,
    FCvtSD,
    FCvtDS,
    FLoadS,
    FStoreS,
    FLoadD,
    FStoreD,
    // Control flow.
    CondBr,
    Br,
    BlxReg,
    Bx,
    Ret,
    PushList,
    PopList,
    SpAdjust,
}

/// LIR opcode slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LirOp {
    /// Non-emitting.
    Pseudo(PseudoOp),
    /// Emitting.
    Machine(MachineOp),
}

impl LirOp {
    /// True for pseudo-ops.
    pub fn is_pseudo(self) -> bool {
        matches!(self, LirOp::Pseudo(_))
    }
}

/// Branch condition carried in `operands[0]` of a `CondBr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CondCode {
    Eq = 0,
    Ne = 1,
    Lt = 2,
    Ge = 3,
    Gt = 4,
    Le = 5,
    /// Unsigned lower (carry clear).
    Lo = 6,
    /// Unsigned higher or same (carry set).
    Hs = 7,
    /// Minus / negative.
    Mi = 8,
    /// Plus / positive or zero.
    Pl = 9,
    /// Unsigned higher.
    Hi = 10,
    /// Unsigned lower or same.
    Ls = 11,
}

impl CondCode {
    /// Decode from an operand slot.
    pub fn from_i32(raw: i32) -> CondCode {
        match raw {
            0 => CondCode::Eq,
            1 => CondCode::Ne,
            2 => CondCode::Lt,
            3 => CondCode::Ge,
            4 => CondCode::Gt,
            5 => CondCode::Le,
            6 => CondCode::Lo,
            7 => CondCode::Hs,
            8 => CondCode::Mi,
            9 => CondCode::Pl,
            10 => CondCode::Hi,
            _ => CondCode::Ls,
        }
    }

    /// The opposite sense.
    pub fn negate(self) -> CondCode {
        match self {
            CondCode::Eq => CondCode::Ne,
            CondCode::Ne => CondCode::Eq,
            CondCode::Lt => CondCode::Ge,
            CondCode::Ge => CondCode::Lt,
            CondCode::Gt => CondCode::Le,
            CondCode::Le => CondCode::Gt,
            CondCode::Lo => CondCode::Hs,
            CondCode::Hs => CondCode::Lo,
            CondCode::Mi => CondCode::Pl,
            CondCode::Pl => CondCode::Mi,
            CondCode::Hi => CondCode::Ls,
            CondCode::Ls => CondCode::Hi,
        }
    }
}

// Abstract resource-mask positions (the low bits encode physical registers).
/// Pessimistic "clobbers everything" position.
pub const ENCODE_MUST_NOT_ALIAS: u64 = 1 << 63;
/// Any heap reference.
pub const ENCODE_HEAP_REF: u64 = 1 << 62;
/// Literal-pool memory.
pub const ENCODE_LITERAL: u64 = 1 << 61;
/// A frame vreg slot.
pub const ENCODE_FRAME_REG: u64 = 1 << 60;
/// FP status word.
pub const ENCODE_FP_STATUS: u64 = 1 << 59;
/// Condition codes.
pub const ENCODE_CCODE: u64 = 1 << 58;
/// All memory kinds.
pub const ENCODE_MEM: u64 =
    ENCODE_MUST_NOT_ALIAS | ENCODE_HEAP_REF | ENCODE_LITERAL | ENCODE_FRAME_REG;
/// Everything; used as a scheduling barrier.
pub const ENCODE_ALL: u64 = !0;

// The FP register file tops out at bit 55; the abstract resources start at
// bit 58.
static_assertions::const_assert!(crate::target::FP_REG_BASE as u32 + 24 < 58);

/// Physical register resource bit.
pub fn encode_reg(reg: u8) -> u64 {
    1 << (reg & 63)
}

/// Pack a vreg access into `alias_info`.
pub fn encode_alias_info(vreg: u16, wide: bool) -> u32 {
    vreg as u32 | if wide { 0x8000_0000 } else { 0 }
}

/// Vreg of an `alias_info`.
pub fn alias_info_reg(info: u32) -> u16 {
    info as u16
}

/// Wide flag of an `alias_info`.
pub fn alias_info_wide(info: u32) -> bool {
    info & 0x8000_0000 != 0
}

// Per-opcode attribute bits, shared across targets.
/// Branch instruction.
pub const IS_BRANCH: u64 = 1 << 0;
/// Reads memory.
pub const IS_LOAD: u64 = 1 << 1;
/// Writes memory.
pub const IS_STORE: u64 = 1 << 2;
/// `operands[0]` is written.
pub const REG_DEF0: u64 = 1 << 3;
/// `operands[1]` is written (wide results).
pub const REG_DEF1: u64 = 1 << 4;
/// `operands[0]` is read.
pub const REG_USE0: u64 = 1 << 5;
/// `operands[1]` is read.
pub const REG_USE1: u64 = 1 << 6;
/// `operands[2]` is read.
pub const REG_USE2: u64 = 1 << 7;
/// Writes the condition codes.
pub const SETS_CCODES: u64 = 1 << 8;
/// Reads the condition codes.
pub const USES_CCODES: u64 = 1 << 9;
/// PC-relative; needs fixup when offsets move.
pub const NEEDS_FIXUP: u64 = 1 << 10;
/// Reads/writes a register list mask rather than single operands.
pub const USES_LIST0: u64 = 1 << 11;

/// Shared attribute table for [`MachineOp`].
pub fn machine_op_flags(op: MachineOp) -> u64 {
    use MachineOp::*;
    match op {
        Nop => 0,
        MovRR | MvnRR | NegRR | NotRR | FMovRR | FMovCoreFp | FMovFpCore => REG_DEF0 | REG_USE1,
        MovRI => REG_DEF0,
        LuiRI => REG_DEF0,
        // Add/sub set flags so the wide forms can consume the carry.
        AddRRR | SubRRR => REG_DEF0 | REG_USE1 | REG_USE2 | SETS_CCODES,
        MulRRR | SltuRRR | AndRRR | OrRRR | XorRRR | LslRRR | LsrRRR | AsrRRR => {
            REG_DEF0 | REG_USE1 | REG_USE2
        }
        AdcRRR | SbcRRR => REG_DEF0 | REG_USE1 | REG_USE2 | USES_CCODES | SETS_CCODES,
        AddRRI | SubRRI | AndRRI | OrRRI | XorRRI | LslRRI | LsrRRI | AsrRRI => {
            REG_DEF0 | REG_USE1
        }
        CmpRR => REG_USE0 | REG_USE1 | SETS_CCODES,
        CmpRI => REG_USE0 | SETS_CCODES,
        LoadWordDisp | LoadUHalfDisp | LoadSHalfDisp | LoadUByteDisp | LoadSByteDisp => {
            REG_DEF0 | REG_USE1 | IS_LOAD
        }
        StoreWordDisp | StoreHalfDisp | StoreByteDisp => REG_USE0 | REG_USE1 | IS_STORE,
        LoadPcRel => REG_DEF0 | IS_LOAD | NEEDS_FIXUP,
        AdrPcRel => REG_DEF0 | NEEDS_FIXUP,
        FAddS | FSubS | FMulS | FDivS | FAddD | FSubD | FMulD | FDivD => {
            REG_DEF0 | REG_USE1 | REG_USE2
        }
        FNegS | FNegD | FSqrtD | FCvtIS | FCvtSI | FCvtID | FCvtDI | FCvtSD | FCvtDS => {
            REG_DEF0 | REG_USE1
        }
        FCmpS | FCmpD => REG_USE0 | REG_USE1 | SETS_CCODES,
        FLoadS | FLoadD => REG_DEF0 | REG_USE1 | IS_LOAD,
        FStoreS | FStoreD => REG_USE0 | REG_USE1 | IS_STORE,
        CondBr => IS_BRANCH | USES_CCODES | NEEDS_FIXUP,
        Br => IS_BRANCH | NEEDS_FIXUP,
        BlxReg => IS_BRANCH | REG_USE0,
        Bx => IS_BRANCH | REG_USE0,
        Ret => IS_BRANCH,
        PushList => USES_LIST0 | IS_STORE,
        PopList => USES_LIST0 | IS_LOAD,
        SpAdjust => 0,
    }
}

/// Assembly outcome of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblerStatus {
    /// All instructions fit.
    Success,
    /// An instruction was widened; offsets must be reassigned and assembly
    /// rerun.
    RetryAll,
}

bitflags::bitflags! {
    struct LirStateFlags: u8 {
        const IS_NOP = 1 << 0;
        const PCREL_FIXUP = 1 << 1;
    }
}

/// One LIR node.
#[derive(Debug, Clone)]
pub struct Lir {
    /// Native offset, assigned by the assembler driver.
    pub offset: u32,
    /// Bytecode offset this instruction implements.
    pub bc_offset: u32,
    /// Opcode.
    pub op: LirOp,
    /// Operand slots; meaning depends on the opcode.
    pub operands: [i32; 5],
    /// Branch/load target LIR.
    pub target: Option<LirId>,
    /// Resources read.
    pub use_mask: u64,
    /// Resources written.
    pub def_mask: u64,
    /// Frame-slot aliasing info for loads/stores.
    pub alias_info: u32,
    /// Instruction byte size at the current encoding width.
    pub size: u8,
    flags: LirStateFlags,
    /// Previous node.
    pub prev: Option<LirId>,
    /// Next node.
    pub next: Option<LirId>,
}

impl Lir {
    /// Squashed by an optimization?
    pub fn is_nop(&self) -> bool {
        self.flags.contains(LirStateFlags::IS_NOP)
    }

    /// Mark squashed.
    pub fn set_nop(&mut self) {
        self.flags |= LirStateFlags::IS_NOP;
    }
}

/// Doubly-linked list of LIRs in a typed pool.
#[derive(Default)]
pub struct LirList {
    nodes: Vec<Lir>,
    first: Option<LirId>,
    last: Option<LirId>,
}

impl LirList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node without linking it into the instruction chain.
    pub fn alloc(&mut self, op: LirOp, bc_offset: u32, operands: [i32; 5]) -> LirId {
        let id = self.nodes.len() as LirId;
        self.nodes.push(Lir {
            offset: 0,
            bc_offset,
            op,
            operands,
            target: None,
            use_mask: 0,
            def_mask: 0,
            alias_info: 0,
            size: 0,
            flags: LirStateFlags::empty(),
            prev: None,
            next: None,
        });
        id
    }

    /// Append a node to the chain.
    pub fn append(&mut self, id: LirId) {
        match self.last {
            None => {
                self.first = Some(id);
                self.last = Some(id);
            }
            Some(tail) => {
                self.nodes[tail as usize].next = Some(id);
                self.nodes[id as usize].prev = Some(tail);
                self.last = Some(id);
            }
        }
    }

    /// Insert `new_id` before `at`.
    pub fn insert_before(&mut self, at: LirId, new_id: LirId) {
        let prev = self.nodes[at as usize].prev;
        self.nodes[new_id as usize].prev = prev;
        self.nodes[new_id as usize].next = Some(at);
        self.nodes[at as usize].prev = Some(new_id);
        match prev {
            Some(p) => self.nodes[p as usize].next = Some(new_id),
            None => self.first = Some(new_id),
        }
    }

    /// Insert `new_id` after `at`.
    pub fn insert_after(&mut self, at: LirId, new_id: LirId) {
        let next = self.nodes[at as usize].next;
        self.nodes[new_id as usize].next = next;
        self.nodes[new_id as usize].prev = Some(at);
        self.nodes[at as usize].next = Some(new_id);
        match next {
            Some(n) => self.nodes[n as usize].prev = Some(new_id),
            None => self.last = Some(new_id),
        }
    }

    /// First chained node.
    pub fn first(&self) -> Option<LirId> {
        self.first
    }

    /// Last chained node.
    pub fn last(&self) -> Option<LirId> {
        self.last
    }

    /// Shared access.
    pub fn get(&self, id: LirId) -> &Lir {
        &self.nodes[id as usize]
    }

    /// Mutable access.
    pub fn get_mut(&mut self, id: LirId) -> &mut Lir {
        &mut self.nodes[id as usize]
    }

    /// Iterate the chain in order.
    pub fn iter(&self) -> impl Iterator<Item = LirId> + '_ {
        let mut cursor = self.first;
        std::iter::from_fn(move || {
            let id = cursor?;
            cursor = self.nodes[id as usize].next;
            Some(id)
        })
    }

    /// Total nodes allocated (chained or not).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when nothing was allocated.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Switch-table record carried from lowering to assembly.
#[derive(Debug, Clone)]
pub struct SwitchTable {
    /// The lowered `packed-switch`/`sparse-switch` MIR's block.
    pub block: BlockId,
    /// Bytecode offset of the switch instruction.
    pub bc_offset: u32,
    /// Case keys (packed tables hold `first_key..`).
    pub keys: Vec<i32>,
    /// Case target labels.
    pub targets: Vec<LirId>,
    /// The dispatch anchor instruction displacements are measured from.
    pub anchor: LirId,
    /// Unchained label standing for the installed table's data offset.
    pub table_label: LirId,
    /// True for packed tables (no keys emitted).
    pub packed: bool,
    /// Assigned data offset.
    pub offset: u32,
}

/// Fill-array-data record.
#[derive(Debug, Clone)]
pub struct FillArrayData {
    /// Raw 16-bit payload units, header included.
    pub units: Vec<u16>,
    /// Bytecode offset of the instruction.
    pub bc_offset: u32,
    /// Assigned data offset.
    pub offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_links_append_and_insert() {
        let mut list = LirList::new();
        let a = list.alloc(LirOp::Machine(MachineOp::Nop), 0, [0; 5]);
        let b = list.alloc(LirOp::Machine(MachineOp::Nop), 0, [0; 5]);
        let c = list.alloc(LirOp::Machine(MachineOp::Nop), 0, [0; 5]);
        list.append(a);
        list.append(c);
        list.insert_before(c, b);
        let order: Vec<LirId> = list.iter().collect();
        assert_eq!(order, vec![a, b, c]);
        let d = list.alloc(LirOp::Machine(MachineOp::Nop), 0, [0; 5]);
        list.insert_after(c, d);
        assert_eq!(list.last(), Some(d));
    }

    #[test]
    fn alias_info_roundtrip() {
        let info = encode_alias_info(17, true);
        assert_eq!(alias_info_reg(info), 17);
        assert!(alias_info_wide(info));
        assert!(!alias_info_wide(encode_alias_info(17, false)));
    }

    #[test]
    fn cond_negation_is_involutive() {
        for raw in 0..12 {
            let cc = CondCode::from_i32(raw);
            assert_eq!(cc.negate().negate(), cc);
        }
    }
}
