//! MIR to LIR lowering and native-code production.
//!
//! The generator is target independent; everything ISA-specific comes
//! through the [`Target`] capability trait.

mod assemble;
mod gen;
mod local_opt;
mod ralloc;

pub use ralloc::PromotionRecord;

use hashbrown::HashMap;
use lantern_asm::MethodRef;
use tracing::debug;

use crate::compiled::Patch;
use crate::lir::{
    self, machine_op_flags, CondCode, FillArrayData, LirId, LirList, LirOp, MachineOp,
    PseudoOp, SwitchTable, ENCODE_ALL, ENCODE_CCODE, ENCODE_HEAP_REF,
};
use crate::mir::{BlockId, BlockType, ExtOp, MirGraph, MirId, MirMeta, MirOp};
use crate::target::{QuickEntrypoint, Target};
use crate::{Bug, BugKind};

/// Resolved field facts the generator needs at field-access sites.
#[derive(Debug, Clone, Copy)]
pub struct FieldInfo {
    /// Byte offset inside the object (or the class for statics).
    pub offset: i32,
    /// Volatile access requires barriers.
    pub is_volatile: bool,
    /// Whether the declaring class may still need initialization.
    pub needs_class_init: bool,
}

/// Field-index to resolved-info table supplied by the resolver; unresolved
/// indices take the slow helper path.
#[derive(Debug, Clone, Default)]
pub struct FieldTable {
    entries: HashMap<u32, FieldInfo>,
}

impl FieldTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resolved field.
    pub fn insert(&mut self, field_idx: u32, info: FieldInfo) {
        self.entries.insert(field_idx, info);
    }

    /// Lookup.
    pub fn get(&self, field_idx: u32) -> Option<FieldInfo> {
        self.entries.get(&field_idx).copied()
    }
}

/// Pending throw launchpad: label, helper, and the kind of throw.
struct ThrowPad {
    label: LirId,
    entrypoint: QuickEntrypoint,
    bc_offset: u32,
}

/// Pending suspend launchpad: where to call the helper and where to resume.
struct SuspendPad {
    label: LirId,
    resume: LirId,
    bc_offset: u32,
}

/// The per-method code generator.
pub struct Codegen<'a> {
    pub(crate) target: &'static dyn Target,
    /// The graph being lowered.
    pub graph: &'a mut MirGraph,
    pub(crate) fields: &'a FieldTable,
    pub(crate) mref: &'a MethodRef,

    /// The LIR under construction.
    pub lirs: LirList,
    block_labels: HashMap<BlockId, LirId>,
    boundary_map: HashMap<u32, LirId>,
    pub(crate) literal_list: Vec<LirId>,
    pub(crate) code_literal_list: Vec<LirId>,
    pub(crate) method_literal_list: Vec<LirId>,
    /// Switch records for table installation.
    pub switch_tables: Vec<SwitchTable>,
    pub(crate) fill_array_data: Vec<FillArrayData>,
    throw_pads: Vec<ThrowPad>,
    suspend_pads: Vec<SuspendPad>,

    /// Final machine code plus installed data pools.
    pub code_buffer: Vec<u8>,
    pub(crate) data_offset: u32,
    pub(crate) total_size: u32,
    pub(crate) current_bc_offset: u32,

    // Register state.
    free_temps: Vec<u8>,
    free_fp_temps: Vec<u8>,
    pub(crate) promotion: Vec<PromotionRecord>,
    pub(crate) num_core_spills: usize,
    pub(crate) num_fp_spills: usize,
    /// Frame size in bytes, aligned to the target stack alignment.
    pub frame_size: u32,
    /// Callee-saved core registers written by the prologue.
    pub core_spill_mask: u32,
    /// Callee-saved FP registers written by the prologue.
    pub fp_spill_mask: u32,
    /// `(phys << 16 | vreg)` entries; the sort key is stripped at encode.
    pub(crate) core_vmap: Vec<u32>,
    pub(crate) fp_vmap: Vec<u32>,

    // Emitted metadata.
    pub(crate) pc2bc: Vec<(u32, u32)>,
    pub(crate) bc2pc: Vec<(u32, u32)>,
    /// LEB128 {total, pc2bc count, pairs}.
    pub encoded_mapping_table: Vec<u8>,
    /// LEB128 register-map table.
    pub vmap_table: Vec<u8>,
    /// Hash-indexed native-pc to reference-bitmap table.
    pub native_gc_map: Vec<u8>,
    /// Code/method patch records for the linker.
    pub patches: Vec<Patch>,
}

impl<'a> Codegen<'a> {
    /// Build a generator over an optimized graph.
    pub fn new(
        target: &'static dyn Target,
        graph: &'a mut MirGraph,
        fields: &'a FieldTable,
        mref: &'a MethodRef,
    ) -> Self {
        let num_vregs = graph.info.num_vregs;
        Codegen {
            target,
            graph,
            fields,
            mref,
            lirs: LirList::new(),
            block_labels: HashMap::new(),
            boundary_map: HashMap::new(),
            literal_list: Vec::new(),
            code_literal_list: Vec::new(),
            method_literal_list: Vec::new(),
            switch_tables: Vec::new(),
            fill_array_data: Vec::new(),
            throw_pads: Vec::new(),
            suspend_pads: Vec::new(),
            code_buffer: Vec::new(),
            data_offset: 0,
            total_size: 0,
            current_bc_offset: 0,
            free_temps: Vec::new(),
            free_fp_temps: Vec::new(),
            promotion: vec![PromotionRecord::default(); num_vregs],
            num_core_spills: 0,
            num_fp_spills: 0,
            frame_size: 0,
            core_spill_mask: 0,
            fp_spill_mask: 0,
            core_vmap: Vec::new(),
            fp_vmap: Vec::new(),
            pc2bc: Vec::new(),
            bc2pc: Vec::new(),
            encoded_mapping_table: Vec::new(),
            vmap_table: Vec::new(),
            native_gc_map: Vec::new(),
            patches: Vec::new(),
        }
    }

    /// Run register allocation, lowering, local optimization and assembly.
    pub fn materialize(&mut self, reference_maps: &[(u32, Vec<u8>)]) -> Result<(), Bug> {
        self.do_promotion();
        self.method_mir_to_lir()?;
        if self.lirs.first().is_some() {
            self.assemble_lir(reference_maps)?;
        }
        Ok(())
    }

    /// Lower every block in preorder.
    fn method_mir_to_lir(&mut self) -> Result<(), Bug> {
        // One label per block, created up front for forward branches.
        for id in 0..self.graph.num_blocks() as BlockId {
            let kind = match self.graph.block(id).block_type {
                BlockType::ExceptionHandling => PseudoOp::EhBlockLabel,
                _ => PseudoOp::NormalBlockLabel,
            };
            let label = self.lirs.alloc(LirOp::Pseudo(kind), 0, [id as i32, 0, 0, 0, 0]);
            self.block_labels.insert(id, label);
        }

        let order: Vec<BlockId> = self.graph.dfs_order().to_vec();
        for bb in order {
            self.compile_block(bb)?;
        }
        self.handle_launchpads();
        Ok(())
    }

    fn compile_block(&mut self, bb: BlockId) -> Result<(), Bug> {
        let block_type = self.graph.block(bb).block_type;
        if matches!(block_type, BlockType::Dead | BlockType::ExceptionHandling)
            || self.graph.block(bb).hidden
        {
            return Ok(());
        }
        let label = self.block_labels[&bb];
        {
            let node = self.lirs.get_mut(label);
            node.def_mask = ENCODE_ALL;
        }
        self.lirs.append(label);

        let mut head_seen = false;
        if self.graph.block(bb).catch_entry {
            self.current_bc_offset = self.graph.block(bb).start_offset;
            let pc = self.new_pseudo(PseudoOp::ExportedPc);
            self.lirs.get_mut(pc).def_mask = ENCODE_ALL;
            head_seen = true;
        }

        self.reset_temps();

        match block_type {
            BlockType::Entry => self.gen_entry_sequence(),
            BlockType::Exit => self.gen_exit_sequence(),
            _ => {}
        }

        for mir in self.graph.block_mirs(bb).collect::<Vec<_>>() {
            self.reset_temps();
            self.current_bc_offset = self.graph.mir(mir).offset;

            let boundary = self.new_pseudo(PseudoOp::BoundaryMarker);
            self.boundary_map
                .entry(self.current_bc_offset)
                .or_insert(boundary);
            if !head_seen {
                // First instruction of the block is a scheduling barrier.
                self.lirs.get_mut(boundary).def_mask = ENCODE_ALL;
                head_seen = true;
            }

            let mut op = self.graph.mir(mir).insn.op;
            if op == MirOp::Ext(ExtOp::Check) {
                // Fold the check and work halves: emit the real op here with
                // its exception edges; the work half becomes a placeholder.
                let MirMeta::ThrowInsn(work) = self.graph.mir(mir).meta else {
                    return Err(Bug::new(
                        BugKind::MalformedGraph,
                        "check half without paired work MIR",
                    ));
                };
                let work_insn = self.graph.mir(work).insn;
                let work_rep = self.graph.mir(work).ssa_rep.clone();
                let my_rep = self.graph.mir(mir).ssa_rep.clone();
                let my_flags = self.graph.mir(mir).opt_flags;
                let work_flags = self.graph.mir(work).opt_flags;
                self.graph.mir_mut(mir).insn = work_insn;
                self.graph.mir_mut(mir).ssa_rep = work_rep;
                self.graph.mir_mut(mir).opt_flags = my_flags | work_flags;
                self.graph.mir_mut(work).ssa_rep = my_rep;
                self.graph.mir_mut(work).insn.op = MirOp::Ext(ExtOp::CheckPart2);
                op = self.graph.mir(mir).insn.op;
            }

            match op {
                MirOp::Ext(ext) => self.gen_extended_mir(bb, mir, ext)?,
                MirOp::Code(_) => self.gen_bytecode_insn(bb, mir)?,
            }
        }

        if head_seen {
            // Local load/store cleanup over the just-emitted extent.
            let tail = self.lirs.last().expect("block emitted LIRs");
            self.apply_local_optimizations(label, tail);
            if let Some(ft) = self.graph.block(bb).fall_through {
                if self.graph.block(ft).block_type != BlockType::ExceptionHandling {
                    let target = self.block_labels[&ft];
                    self.op_unconditional_branch(target);
                }
            }
        }
        Ok(())
    }

    // ---- LIR emission helpers ----

    pub(crate) fn new_lir(&mut self, op: MachineOp, operands: [i32; 5]) -> LirId {
        let id = self
            .lirs
            .alloc(LirOp::Machine(op), self.current_bc_offset, operands);
        self.setup_resource_masks(id);
        self.lirs.append(id);
        id
    }

    pub(crate) fn new_pseudo(&mut self, op: PseudoOp) -> LirId {
        let id = self
            .lirs
            .alloc(LirOp::Pseudo(op), self.current_bc_offset, [0; 5]);
        self.lirs.append(id);
        id
    }

    /// A label node not yet placed in the chain.
    pub(crate) fn raw_label(&mut self) -> LirId {
        let id = self
            .lirs
            .alloc(LirOp::Pseudo(PseudoOp::TargetLabel), self.current_bc_offset, [0; 5]);
        self.lirs.get_mut(id).def_mask = ENCODE_ALL;
        id
    }

    /// Place a previously created label here.
    pub(crate) fn place_label(&mut self, label: LirId) {
        self.lirs.append(label);
    }

    fn setup_resource_masks(&mut self, id: LirId) {
        let (op, operands) = {
            let lir = self.lirs.get(id);
            match lir.op {
                LirOp::Machine(op) => (op, lir.operands),
                LirOp::Pseudo(_) => return,
            }
        };
        let flags = machine_op_flags(op);
        let mut use_mask = 0u64;
        let mut def_mask = 0u64;
        if flags & lir::REG_DEF0 != 0 {
            def_mask |= lir::encode_reg(operands[0] as u8);
        }
        if flags & lir::REG_DEF1 != 0 {
            def_mask |= lir::encode_reg(operands[1] as u8);
        }
        if flags & lir::REG_USE0 != 0 {
            use_mask |= lir::encode_reg(operands[0] as u8);
        }
        if flags & lir::REG_USE1 != 0 {
            use_mask |= lir::encode_reg(operands[1] as u8);
        }
        if flags & lir::REG_USE2 != 0 {
            use_mask |= lir::encode_reg(operands[2] as u8);
        }
        if flags & lir::USES_LIST0 != 0 {
            for reg in 0..16u8 {
                if operands[0] & (1 << reg) != 0 {
                    if op == MachineOp::PushList {
                        use_mask |= lir::encode_reg(reg);
                    } else {
                        def_mask |= lir::encode_reg(reg);
                    }
                }
            }
        }
        if flags & lir::IS_LOAD != 0 {
            use_mask |= ENCODE_HEAP_REF;
        }
        if flags & lir::IS_STORE != 0 {
            def_mask |= ENCODE_HEAP_REF;
        }
        if flags & lir::SETS_CCODES != 0 {
            def_mask |= ENCODE_CCODE;
        }
        if flags & lir::USES_CCODES != 0 {
            use_mask |= ENCODE_CCODE;
        }
        if flags & lir::IS_BRANCH != 0 {
            use_mask |= self.target.pc_use_def_encoding();
        }
        if op == MachineOp::LoadPcRel {
            use_mask = (use_mask & !ENCODE_HEAP_REF) | lir::ENCODE_LITERAL;
            use_mask |= self.target.pc_use_def_encoding();
        }
        let node = self.lirs.get_mut(id);
        node.use_mask = use_mask;
        node.def_mask = def_mask;
    }

    /// Re-type the memory resource of a load/store as a frame access and
    /// attach its vreg aliasing info.
    pub(crate) fn annotate_vreg_access(&mut self, id: LirId, vreg: u16, wide: bool) {
        let node = self.lirs.get_mut(id);
        let flags = match node.op {
            LirOp::Machine(op) => machine_op_flags(op),
            LirOp::Pseudo(_) => return,
        };
        if flags & lir::IS_LOAD != 0 {
            node.use_mask = (node.use_mask & !ENCODE_HEAP_REF) | lir::ENCODE_FRAME_REG;
        }
        if flags & lir::IS_STORE != 0 {
            node.def_mask = (node.def_mask & !ENCODE_HEAP_REF) | lir::ENCODE_FRAME_REG;
        }
        node.alias_info = lir::encode_alias_info(vreg, wide);
    }

    /// Attach a safepoint after a suspendable LIR.
    pub(crate) fn mark_safepoint(&mut self) {
        let pc = self.new_pseudo(PseudoOp::SafepointPc);
        // Full barrier: nothing schedules across a safepoint.
        self.lirs.get_mut(pc).def_mask = ENCODE_ALL;
    }

    pub(crate) fn op_unconditional_branch(&mut self, target: LirId) -> LirId {
        let id = self.new_lir(MachineOp::Br, [0; 5]);
        self.lirs.get_mut(id).target = Some(target);
        id
    }

    pub(crate) fn op_cond_branch(&mut self, cc: CondCode, target: LirId) -> LirId {
        let id = self.new_lir(MachineOp::CondBr, [cc as i32, 0, 0, 0, 0]);
        self.lirs.get_mut(id).target = Some(target);
        id
    }

    /// Branch to the label of `bb`.
    pub(crate) fn branch_to_block(&mut self, cc: Option<CondCode>, bb: BlockId) -> LirId {
        let label = self.block_labels[&bb];
        match cc {
            Some(cc) => self.op_cond_branch(cc, label),
            None => self.op_unconditional_branch(label),
        }
    }

    /// Indirect call through a runtime helper slot, with safepoint.
    pub(crate) fn call_helper(&mut self, ep: QuickEntrypoint, safepoint: bool) {
        let regs = self.target.regs();
        let tgt = regs.invoke_tgt;
        let load = self.new_lir(
            MachineOp::LoadWordDisp,
            [tgt as i32, regs.self_reg as i32, ep.thread_offset(), 0, 0],
        );
        // Thread-block slots never alias program data.
        self.lirs.get_mut(load).use_mask &= !ENCODE_HEAP_REF;
        self.new_lir(MachineOp::BlxReg, [tgt as i32, 0, 0, 0, 0]);
        if safepoint {
            self.mark_safepoint();
        }
    }

    /// A branch to a (possibly shared) throw launchpad.
    pub(crate) fn throw_branch(&mut self, cc: CondCode, ep: QuickEntrypoint) {
        let label = self.raw_label();
        self.throw_pads.push(ThrowPad {
            label,
            entrypoint: ep,
            bc_offset: self.current_bc_offset,
        });
        self.op_cond_branch(cc, label);
    }

    /// Suspend check unless suppressed for this MIR.
    pub(crate) fn gen_suspend_test(&mut self, mir: Option<MirId>) {
        if let Some(mir) = mir {
            if self.graph.suspend_check_suppressed(mir) {
                debug!(offset = self.current_bc_offset, "suspend check suppressed");
                return;
            }
        }
        let regs = self.target.regs();
        let self_reg = regs.self_reg as i32;
        let tmp = self.alloc_temp();
        let load = self.new_lir(
            MachineOp::LoadWordDisp,
            [
                tmp as i32,
                self_reg,
                crate::target::THREAD_SUSPEND_COUNT_OFFSET,
                0,
                0,
            ],
        );
        self.lirs.get_mut(load).use_mask &= !ENCODE_HEAP_REF;
        self.new_lir(MachineOp::CmpRI, [tmp as i32, 0, 0, 0, 0]);
        let pad_label = self.raw_label();
        let resume = self.raw_label();
        self.op_cond_branch(CondCode::Ne, pad_label);
        self.place_label(resume);
        self.suspend_pads.push(SuspendPad {
            label: pad_label,
            resume,
            bc_offset: self.current_bc_offset,
        });
        self.free_temp(tmp);
    }

    /// Emit the deferred suspend and throw launchpads after the method body.
    fn handle_launchpads(&mut self) {
        let suspend_pads = std::mem::take(&mut self.suspend_pads);
        for pad in suspend_pads {
            self.current_bc_offset = pad.bc_offset;
            let marker = self.lirs.get_mut(pad.label);
            marker.op = LirOp::Pseudo(PseudoOp::SuspendTarget);
            self.lirs.append(pad.label);
            self.call_helper(QuickEntrypoint::TestSuspend, true);
            self.op_unconditional_branch(pad.resume);
        }
        let throw_pads = std::mem::take(&mut self.throw_pads);
        for pad in throw_pads {
            self.current_bc_offset = pad.bc_offset;
            let marker = self.lirs.get_mut(pad.label);
            marker.op = LirOp::Pseudo(PseudoOp::ThrowTarget);
            self.lirs.append(pad.label);
            self.call_helper(pad.entrypoint, true);
        }
    }

    // ---- misc accessors used across submodules ----

    pub(crate) fn block_label(&self, bb: BlockId) -> LirId {
        self.block_labels[&bb]
    }

    pub(crate) fn is_pseudo(&self, id: LirId) -> bool {
        self.lirs.get(id).op.is_pseudo()
    }

    pub(crate) fn lir_flags(&self, id: LirId) -> u64 {
        match self.lirs.get(id).op {
            LirOp::Machine(op) => machine_op_flags(op),
            LirOp::Pseudo(_) => 0,
        }
    }
}
