//! Per-MIR lowering: value plumbing, arithmetic, memory, control flow,
//! calls and intrinsics.

use lantern_asm::dataflow::df;
use lantern_asm::{ArrayDataPayload, InvokeType, Opcode, PackedSwitchPayload, SparseSwitchPayload};
use tracing::trace;

use super::Codegen;
use crate::lir::{
    CondCode, FillArrayData, LirId, LirOp, MachineOp, PseudoOp, SwitchTable, ENCODE_HEAP_REF,
};
use crate::mir::{BlockId, ConditionCode, ExtOp, MirFlags, MirId, SsaRep};
use crate::target::{
    QuickEntrypoint, ARRAY_DATA_OFFSET, ARRAY_LENGTH_OFFSET,
    METHOD_DECLARING_CLASS_OFFSET, STRING_COUNT_OFFSET, STRING_VALUE_OFFSET,
    THREAD_EXCEPTION_OFFSET, THREAD_SELF_OBJECT_OFFSET,
};
use crate::{Bug, BugKind, InstructionSet, SReg};

/// Memory access width for array/field traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpSize {
    Word,
    UnsignedHalf,
    SignedHalf,
    UnsignedByte,
    SignedByte,
}

impl OpSize {
    fn load_op(self) -> MachineOp {
        match self {
            OpSize::Word => MachineOp::LoadWordDisp,
            OpSize::UnsignedHalf => MachineOp::LoadUHalfDisp,
            OpSize::SignedHalf => MachineOp::LoadSHalfDisp,
            OpSize::UnsignedByte => MachineOp::LoadUByteDisp,
            OpSize::SignedByte => MachineOp::LoadSByteDisp,
        }
    }

    fn store_op(self) -> MachineOp {
        match self {
            OpSize::Word => MachineOp::StoreWordDisp,
            OpSize::UnsignedHalf | OpSize::SignedHalf => MachineOp::StoreHalfDisp,
            OpSize::UnsignedByte | OpSize::SignedByte => MachineOp::StoreByteDisp,
        }
    }

    fn scale(self) -> i32 {
        match self {
            OpSize::Word => 2,
            OpSize::UnsignedHalf | OpSize::SignedHalf => 1,
            OpSize::UnsignedByte | OpSize::SignedByte => 0,
        }
    }
}

impl Codegen<'_> {
    // ---- frame & value plumbing ----

    /// Frame offset of a vreg home slot: outs and the method pointer sit
    /// below the vreg array.
    pub(crate) fn vreg_offset(&self, vreg: i32) -> i32 {
        ((self.graph.info.num_outs as i32) + 1 + vreg) * 4
    }

    pub(crate) fn method_slot_offset(&self) -> i32 {
        self.graph.info.num_outs as i32 * 4
    }

    fn out_slot_offset(&self, idx: usize) -> i32 {
        idx as i32 * 4
    }

    fn promoted_core(&self, s_reg: SReg) -> Option<u8> {
        let vreg = self.graph.sreg_to_vreg(s_reg);
        if vreg < 0 {
            return None;
        }
        self.promotion[vreg as usize].core_reg
    }

    fn promoted_fp(&self, s_reg: SReg) -> Option<u8> {
        let vreg = self.graph.sreg_to_vreg(s_reg);
        if vreg < 0 {
            return None;
        }
        self.promotion[vreg as usize].fp_reg
    }

    /// Load an SSA name into a core register.
    pub(crate) fn load_sreg(&mut self, s_reg: SReg) -> u8 {
        if let Some(reg) = self.promoted_core(s_reg) {
            return reg;
        }
        let vreg = self.graph.sreg_to_vreg(s_reg);
        let tmp = self.alloc_temp();
        let sp = self.target.regs().sp;
        let offset = self.vreg_offset(vreg);
        let load = self.new_lir(
            MachineOp::LoadWordDisp,
            [tmp as i32, sp as i32, offset, 0, 0],
        );
        self.annotate_vreg_access(load, vreg as u16, false);
        tmp
    }

    /// Load a wide SSA pair into two core registers.
    pub(crate) fn load_sreg_wide(&mut self, s_low: SReg) -> (u8, u8) {
        let lo = self.load_sreg(s_low);
        let hi = self.load_sreg(s_low + 1);
        (lo, hi)
    }

    /// Load an SSA name into an FP register.
    fn load_fp(&mut self, s_reg: SReg) -> u8 {
        if let Some(reg) = self.promoted_fp(s_reg) {
            return reg;
        }
        let vreg = self.graph.sreg_to_vreg(s_reg);
        let tmp = self.alloc_fp_temp();
        let sp = self.target.regs().sp;
        let load = self.new_lir(
            MachineOp::FLoadS,
            [tmp as i32, sp as i32, self.vreg_offset(vreg), 0, 0],
        );
        self.annotate_vreg_access(load, vreg as u16, false);
        tmp
    }

    /// Load a wide FP value into an even/odd FP pair; returns the even reg.
    fn load_fp_wide(&mut self, s_low: SReg) -> u8 {
        let vreg = self.graph.sreg_to_vreg(s_low);
        let tmp = self.alloc_fp_temp_pair();
        let sp = self.target.regs().sp;
        let load = self.new_lir(
            MachineOp::FLoadD,
            [tmp as i32, sp as i32, self.vreg_offset(vreg), 0, 0],
        );
        self.annotate_vreg_access(load, vreg as u16, true);
        tmp
    }

    /// Store a core register into an SSA name's home.
    pub(crate) fn store_sreg(&mut self, s_reg: SReg, src: u8) {
        if let Some(reg) = self.promoted_core(s_reg) {
            if reg != src {
                self.new_lir(MachineOp::MovRR, [reg as i32, src as i32, 0, 0, 0]);
            }
            return;
        }
        let vreg = self.graph.sreg_to_vreg(s_reg);
        let sp = self.target.regs().sp;
        let store = self.new_lir(
            MachineOp::StoreWordDisp,
            [src as i32, sp as i32, self.vreg_offset(vreg), 0, 0],
        );
        self.annotate_vreg_access(store, vreg as u16, false);
    }

    pub(crate) fn store_sreg_wide(&mut self, s_low: SReg, lo: u8, hi: u8) {
        self.store_sreg(s_low, lo);
        self.store_sreg(s_low + 1, hi);
    }

    fn store_fp(&mut self, s_reg: SReg, src: u8) {
        if let Some(reg) = self.promoted_fp(s_reg) {
            if reg != src {
                self.new_lir(MachineOp::FMovRR, [reg as i32, src as i32, 0, 0, 0]);
            }
            return;
        }
        let vreg = self.graph.sreg_to_vreg(s_reg);
        let sp = self.target.regs().sp;
        let store = self.new_lir(
            MachineOp::FStoreS,
            [src as i32, sp as i32, self.vreg_offset(vreg), 0, 0],
        );
        self.annotate_vreg_access(store, vreg as u16, false);
    }

    fn store_fp_wide(&mut self, s_low: SReg, src: u8) {
        let vreg = self.graph.sreg_to_vreg(s_low);
        let sp = self.target.regs().sp;
        let store = self.new_lir(
            MachineOp::FStoreD,
            [src as i32, sp as i32, self.vreg_offset(vreg), 0, 0],
        );
        self.annotate_vreg_access(store, vreg as u16, true);
    }

    /// Materialize a 32-bit constant.
    pub(crate) fn load_constant(&mut self, reg: u8, value: i32) {
        if (0..=0xffff).contains(&value) {
            self.new_lir(MachineOp::MovRI, [reg as i32, value, 0, 0, 0]);
            return;
        }
        match self.target.isa() {
            InstructionSet::X86 => {
                self.new_lir(MachineOp::MovRI, [reg as i32, value, 0, 0, 0]);
            }
            InstructionSet::Mips => {
                self.new_lir(MachineOp::LuiRI, [reg as i32, value, 0, 0, 0]);
                if value & 0xffff != 0 {
                    self.new_lir(
                        MachineOp::OrRRI,
                        [reg as i32, reg as i32, value & 0xffff, 0, 0],
                    );
                }
            }
            InstructionSet::Thumb2 => {
                // Pull wide constants from the literal pool.
                let lit = self.word_literal(value);
                let load = self.new_lir(MachineOp::LoadPcRel, [reg as i32, 0, 0, 0, 0]);
                self.lirs.get_mut(load).target = Some(lit);
            }
        }
    }

    /// Find or add a 32-bit literal pool entry.
    pub(crate) fn word_literal(&mut self, value: i32) -> LirId {
        if let Some(&found) = self
            .literal_list
            .iter()
            .find(|&&l| self.lirs.get(l).operands[0] == value)
        {
            return found;
        }
        let lit = self.lirs.alloc(
            LirOp::Pseudo(PseudoOp::LiteralWord),
            self.current_bc_offset,
            [value, 0, 0, 0, 0],
        );
        self.literal_list.push(lit);
        lit
    }

    fn code_literal(&mut self, method_idx: u32, invoke_type: InvokeType) -> LirId {
        if let Some(&found) = self
            .code_literal_list
            .iter()
            .find(|&&l| self.lirs.get(l).operands[0] == method_idx as i32)
        {
            return found;
        }
        let lit = self.lirs.alloc(
            LirOp::Pseudo(PseudoOp::LiteralCodeTarget),
            self.current_bc_offset,
            [method_idx as i32, invoke_type as i32, 0, 0, 0],
        );
        self.code_literal_list.push(lit);
        lit
    }

    fn method_literal(&mut self, method_idx: u32, invoke_type: InvokeType) -> LirId {
        if let Some(&found) = self
            .method_literal_list
            .iter()
            .find(|&&l| self.lirs.get(l).operands[0] == method_idx as i32)
        {
            return found;
        }
        let lit = self.lirs.alloc(
            LirOp::Pseudo(PseudoOp::LiteralMethodTarget),
            self.current_bc_offset,
            [method_idx as i32, invoke_type as i32, 0, 0, 0],
        );
        self.method_literal_list.push(lit);
        lit
    }

    // ---- checks ----

    fn gen_null_check(&mut self, mir: MirId, obj_reg: u8) {
        if self
            .graph
            .mir(mir)
            .opt_flags
            .contains(MirFlags::IGNORE_NULL_CHECK)
        {
            trace!(offset = self.current_bc_offset, "null check elided");
            return;
        }
        self.new_lir(MachineOp::CmpRI, [obj_reg as i32, 0, 0, 0, 0]);
        self.throw_branch(CondCode::Eq, QuickEntrypoint::ThrowNullPointer);
    }

    fn gen_range_check(&mut self, mir: MirId, array_reg: u8, index_reg: u8) {
        if self
            .graph
            .mir(mir)
            .opt_flags
            .contains(MirFlags::IGNORE_RANGE_CHECK)
        {
            trace!(offset = self.current_bc_offset, "range check elided");
            return;
        }
        let len = self.alloc_temp();
        self.new_lir(
            MachineOp::LoadWordDisp,
            [len as i32, array_reg as i32, ARRAY_LENGTH_OFFSET, 0, 0],
        );
        self.new_lir(MachineOp::CmpRR, [index_reg as i32, len as i32, 0, 0, 0]);
        self.throw_branch(CondCode::Hs, QuickEntrypoint::ThrowArrayBounds);
        self.free_temp(len);
    }

    fn gen_div_zero_check(&mut self, reg: u8) {
        self.new_lir(MachineOp::CmpRI, [reg as i32, 0, 0, 0, 0]);
        self.throw_branch(CondCode::Eq, QuickEntrypoint::ThrowDivZero);
    }

    // ---- method frame ----

    pub(crate) fn gen_entry_sequence(&mut self) {
        self.new_pseudo(PseudoOp::MethodEntry);
        let regs = self.target.regs();
        let sp = regs.sp as i32;
        let core_spill_bytes = 4 * self.num_core_spills as i32;

        if self.target.has_push_pop() {
            if self.core_spill_mask != 0 {
                self.new_lir(MachineOp::PushList, [self.core_spill_mask as i32, 0, 0, 0, 0]);
            }
            self.new_lir(
                MachineOp::SpAdjust,
                [-(self.frame_size as i32 - core_spill_bytes), 0, 0, 0, 0],
            );
            // FP callee-saves land at the top of the adjusted region, just
            // below the pushed core registers.
            let fp_top = self.frame_size as i32 - core_spill_bytes;
            self.gen_fp_spill_ops(sp, fp_top, MachineOp::FStoreS);
        } else {
            self.new_lir(MachineOp::SpAdjust, [-(self.frame_size as i32), 0, 0, 0, 0]);
            let mut slot = self.frame_size as i32 - 4;
            for reg in 0..32u8 {
                if self.core_spill_mask & (1 << reg) != 0 {
                    self.new_lir(
                        MachineOp::StoreWordDisp,
                        [reg as i32, sp, slot, 0, 0],
                    );
                    slot -= 4;
                }
            }
            self.gen_fp_spill_ops(sp, slot + 4, MachineOp::FStoreS);
        }

        // Home the method pointer and the register-borne arguments.
        let method_slot = self.method_slot_offset();
        self.new_lir(
            MachineOp::StoreWordDisp,
            [regs.arg_regs[0] as i32, sp, method_slot, 0, 0],
        );
        let num_ins = self.graph.info.num_ins;
        let first_in = (self.graph.info.num_vregs - num_ins) as i32;
        for i in 0..num_ins {
            let offset = self.vreg_offset(first_in + i as i32);
            if 1 + i < regs.arg_regs.len() {
                let store = self.new_lir(
                    MachineOp::StoreWordDisp,
                    [regs.arg_regs[1 + i] as i32, sp, offset, 0, 0],
                );
                self.annotate_vreg_access(store, (first_in + i as i32) as u16, false);
            } else {
                // Stack-borne argument: it lives just above our frame.
                let tmp = self.alloc_temp();
                let in_offset =
                    self.frame_size as i32 + 4 * (i as i32 - (regs.arg_regs.len() as i32 - 1));
                self.new_lir(MachineOp::LoadWordDisp, [tmp as i32, sp, in_offset, 0, 0]);
                let store =
                    self.new_lir(MachineOp::StoreWordDisp, [tmp as i32, sp, offset, 0, 0]);
                self.annotate_vreg_access(store, (first_in + i as i32) as u16, false);
                self.free_temp(tmp);
            }
        }
        // Promoted incoming arguments move to their registers.
        for i in 0..num_ins {
            let vreg = (first_in + i as i32) as usize;
            if let Some(reg) = self.promotion[vreg].core_reg {
                let load = self.new_lir(
                    MachineOp::LoadWordDisp,
                    [reg as i32, sp, self.vreg_offset(vreg as i32), 0, 0],
                );
                self.annotate_vreg_access(load, vreg as u16, false);
            }
        }
    }

    pub(crate) fn gen_exit_sequence(&mut self) {
        self.new_pseudo(PseudoOp::MethodExit);
        let regs = self.target.regs();
        let sp = regs.sp as i32;
        let core_spill_bytes = 4 * self.num_core_spills as i32;
        if self.target.has_push_pop() {
            let fp_top = self.frame_size as i32 - core_spill_bytes;
            self.gen_fp_spill_ops(sp, fp_top, MachineOp::FLoadS);
            self.new_lir(
                MachineOp::SpAdjust,
                [self.frame_size as i32 - core_spill_bytes, 0, 0, 0, 0],
            );
            if self.core_spill_mask != 0 {
                self.new_lir(MachineOp::PopList, [self.core_spill_mask as i32, 0, 0, 0, 0]);
            }
        } else {
            let mut slot = self.frame_size as i32 - 4;
            for reg in 0..32u8 {
                if self.core_spill_mask & (1 << reg) != 0 {
                    self.new_lir(MachineOp::LoadWordDisp, [reg as i32, sp, slot, 0, 0]);
                    slot -= 4;
                }
            }
            self.gen_fp_spill_ops(sp, slot + 4, MachineOp::FLoadS);
            self.new_lir(MachineOp::SpAdjust, [self.frame_size as i32, 0, 0, 0, 0]);
        }
        self.new_lir(MachineOp::Ret, [0; 5]);
    }

    /// Store (prologue) or reload (epilogue) every promoted FP callee-save;
    /// slots run downward from `top`, mirroring the core spill area.
    fn gen_fp_spill_ops(&mut self, sp: i32, top: i32, op: MachineOp) {
        let mut slot = top - 4;
        for bit in 0..32u8 {
            if self.fp_spill_mask & (1 << bit) != 0 {
                let reg = crate::target::FP_REG_BASE + bit;
                self.new_lir(op, [reg as i32, sp, slot, 0, 0]);
                slot -= 4;
            }
        }
    }

    // ---- extended (pseudo) MIR lowering ----

    pub(crate) fn gen_extended_mir(
        &mut self,
        bb: BlockId,
        mir: MirId,
        ext: ExtOp,
    ) -> Result<(), Bug> {
        let rep = self.graph.mir(mir).ssa_rep.clone().unwrap_or_default();
        match ext {
            ExtOp::Phi | ExtOp::Nop | ExtOp::CheckPart2 => {}
            ExtOp::Copy => {
                let src = self.load_sreg(rep.uses[0]);
                self.store_sreg(rep.defs[0], src);
            }
            ExtOp::Select => self.gen_select(mir, &rep),
            ExtOp::FusedCmplFloat
            | ExtOp::FusedCmpgFloat
            | ExtOp::FusedCmplDouble
            | ExtOp::FusedCmpgDouble
            | ExtOp::FusedCmpLong => self.gen_fused_cmp_branch(bb, mir, ext, &rep)?,
            ExtOp::NullCheck => {
                let reg = self.load_sreg(rep.uses[0]);
                self.gen_null_check(mir, reg);
            }
            ExtOp::RangeCheck => {
                let array = self.load_sreg(rep.uses[0]);
                let index = self.load_sreg(rep.uses[1]);
                self.gen_range_check(mir, array, index);
            }
            ExtOp::DivZeroCheck => {
                let reg = self.load_sreg(rep.uses[0]);
                self.gen_div_zero_check(reg);
            }
            ExtOp::Check => {
                return Err(Bug::new(
                    BugKind::MalformedGraph,
                    "unfolded check pseudo reached lowering",
                ))
            }
        }
        Ok(())
    }

    /// `dst = cond != 0 ? true : false`, branch form.
    fn gen_select(&mut self, mir: MirId, rep: &SsaRep) {
        let insn = self.graph.mir(mir).insn;
        let cond = self.load_sreg(rep.uses[0]);
        let dst = self.alloc_temp();
        self.new_lir(MachineOp::CmpRI, [cond as i32, 0, 0, 0, 0]);
        let done = self.raw_label();
        if rep.uses.len() == 3 {
            // Move form.
            let true_src = self.load_sreg(rep.uses[1]);
            self.new_lir(MachineOp::MovRR, [dst as i32, true_src as i32, 0, 0, 0]);
            self.op_cond_branch(CondCode::Ne, done);
            let false_src = self.load_sreg(rep.uses[2]);
            self.new_lir(MachineOp::MovRR, [dst as i32, false_src as i32, 0, 0, 0]);
        } else {
            // Constant form: vB true, vC false.
            self.load_constant(dst, insn.vb as i32);
            self.op_cond_branch(CondCode::Ne, done);
            self.load_constant(dst, insn.vc as i32);
        }
        self.place_label(done);
        self.store_sreg(rep.defs[0], dst);
        self.free_temp(dst);
    }

    fn fused_cond(&self, mir: MirId) -> CondCode {
        match self.graph.mir(mir).insn.args[0] {
            x if x == ConditionCode::Eq as u32 => CondCode::Eq,
            x if x == ConditionCode::Ne as u32 => CondCode::Ne,
            x if x == ConditionCode::Lt as u32 => CondCode::Lt,
            x if x == ConditionCode::Ge as u32 => CondCode::Ge,
            x if x == ConditionCode::Gt as u32 => CondCode::Gt,
            _ => CondCode::Le,
        }
    }

    fn gen_fused_cmp_branch(
        &mut self,
        bb: BlockId,
        mir: MirId,
        ext: ExtOp,
        rep: &SsaRep,
    ) -> Result<(), Bug> {
        let cc = self.fused_cond(mir);
        let taken = self
            .graph
            .block(bb)
            .taken
            .ok_or_else(|| Bug::new(BugKind::MalformedGraph, "fused branch without taken edge"))?;
        if self.graph.is_backwards_branch(bb) {
            self.gen_suspend_test(Some(mir));
        }
        match ext {
            ExtOp::FusedCmplFloat | ExtOp::FusedCmpgFloat => {
                let lhs = self.load_fp(rep.uses[0]);
                let rhs = self.load_fp(rep.uses[1]);
                self.new_lir(MachineOp::FCmpS, [lhs as i32, rhs as i32, 0, 0, 0]);
            }
            ExtOp::FusedCmplDouble | ExtOp::FusedCmpgDouble => {
                let lhs = self.load_fp_wide(rep.uses[0]);
                let rhs = self.load_fp_wide(rep.uses[2]);
                self.new_lir(MachineOp::FCmpD, [lhs as i32, rhs as i32, 0, 0, 0]);
            }
            ExtOp::FusedCmpLong => {
                self.gen_cmp_long_branch(cc, rep, taken);
                return Ok(());
            }
            _ => unreachable!("not a fused compare"),
        }
        self.branch_to_block(Some(cc), taken);
        Ok(())
    }

    /// Long compare-and-branch without materializing the -1/0/1 result.
    fn gen_cmp_long_branch(&mut self, cc: CondCode, rep: &SsaRep, taken: BlockId) {
        let (lo1, hi1) = self.load_sreg_wide(rep.uses[0]);
        let (lo2, hi2) = self.load_sreg_wide(rep.uses[2]);
        let not_taken = self.raw_label();
        self.new_lir(MachineOp::CmpRR, [hi1 as i32, hi2 as i32, 0, 0, 0]);
        match cc {
            CondCode::Eq => {
                self.op_cond_branch(CondCode::Ne, not_taken);
                self.new_lir(MachineOp::CmpRR, [lo1 as i32, lo2 as i32, 0, 0, 0]);
                self.branch_to_block(Some(CondCode::Eq), taken);
            }
            CondCode::Ne => {
                self.branch_to_block(Some(CondCode::Ne), taken);
                self.new_lir(MachineOp::CmpRR, [lo1 as i32, lo2 as i32, 0, 0, 0]);
                self.branch_to_block(Some(CondCode::Ne), taken);
            }
            CondCode::Lt | CondCode::Le => {
                self.branch_to_block(Some(CondCode::Lt), taken);
                self.op_cond_branch(CondCode::Ne, not_taken);
                self.new_lir(MachineOp::CmpRR, [lo1 as i32, lo2 as i32, 0, 0, 0]);
                let low_cc = if cc == CondCode::Lt {
                    CondCode::Lo
                } else {
                    CondCode::Ls
                };
                self.branch_to_block(Some(low_cc), taken);
            }
            CondCode::Gt | CondCode::Ge => {
                self.branch_to_block(Some(CondCode::Gt), taken);
                self.op_cond_branch(CondCode::Ne, not_taken);
                self.new_lir(MachineOp::CmpRR, [lo1 as i32, lo2 as i32, 0, 0, 0]);
                let low_cc = if cc == CondCode::Gt {
                    CondCode::Hi
                } else {
                    CondCode::Hs
                };
                self.branch_to_block(Some(low_cc), taken);
            }
            _ => {}
        }
        self.place_label(not_taken);
    }

    // ---- the big dispatch ----

    pub(crate) fn gen_bytecode_insn(&mut self, bb: BlockId, mir: MirId) -> Result<(), Bug> {
        let insn = self.graph.mir(mir).insn;
        let rep = self.graph.mir(mir).ssa_rep.clone().unwrap_or_default();
        let opt_flags = self.graph.mir(mir).opt_flags;
        let Some(opcode) = insn.op.code() else {
            return Err(Bug::new(BugKind::UnreachableOpcode, "pseudo in dispatch"));
        };
        use Opcode::*;
        match opcode {
            Nop => {}

            Move | MoveFrom16 | Move16 | MoveObject | MoveObjectFrom16 | MoveObject16 => {
                let src = self.load_sreg(rep.uses[0]);
                self.store_sreg(rep.defs[0], src);
            }
            MoveWide | MoveWideFrom16 | MoveWide16 => {
                let (lo, hi) = self.load_sreg_wide(rep.uses[0]);
                self.store_sreg_wide(rep.defs[0], lo, hi);
            }

            MoveResult | MoveResultObject => {
                if !opt_flags.contains(MirFlags::INLINED) {
                    let ret0 = self.target.regs().ret0;
                    self.store_sreg(rep.defs[0], ret0);
                }
            }
            MoveResultWide => {
                if !opt_flags.contains(MirFlags::INLINED) {
                    let regs = self.target.regs();
                    let (r0, r1) = (regs.ret0, regs.ret1);
                    self.store_sreg_wide(rep.defs[0], r0, r1);
                }
            }
            MoveException => {
                let regs = self.target.regs();
                let self_reg = regs.self_reg as i32;
                let tmp = self.alloc_temp();
                let load = self.new_lir(
                    MachineOp::LoadWordDisp,
                    [tmp as i32, self_reg, THREAD_EXCEPTION_OFFSET, 0, 0],
                );
                self.lirs.get_mut(load).use_mask &= !ENCODE_HEAP_REF;
                self.store_sreg(rep.defs[0], tmp);
                // Clear the pending-exception slot.
                let zero = self.alloc_temp();
                self.load_constant(zero, 0);
                self.new_lir(
                    MachineOp::StoreWordDisp,
                    [zero as i32, self_reg, THREAD_EXCEPTION_OFFSET, 0, 0],
                );
                self.free_temp(zero);
                self.free_temp(tmp);
            }

            ReturnVoid => {}
            Return | ReturnObject => {
                let src = self.load_sreg(rep.uses[0]);
                let ret0 = self.target.regs().ret0;
                if src != ret0 {
                    self.new_lir(MachineOp::MovRR, [ret0 as i32, src as i32, 0, 0, 0]);
                }
            }
            ReturnWide => {
                let (lo, hi) = self.load_sreg_wide(rep.uses[0]);
                let regs = self.target.regs();
                if lo != regs.ret0 {
                    self.new_lir(MachineOp::MovRR, [regs.ret0 as i32, lo as i32, 0, 0, 0]);
                }
                if hi != regs.ret1 {
                    self.new_lir(MachineOp::MovRR, [regs.ret1 as i32, hi as i32, 0, 0, 0]);
                }
            }

            Const4 | Const16 | Const => {
                let tmp = self.alloc_temp();
                self.load_constant(tmp, insn.vb as i32);
                self.store_sreg(rep.defs[0], tmp);
                self.free_temp(tmp);
            }
            ConstHigh16 => {
                let tmp = self.alloc_temp();
                self.load_constant(tmp, (insn.vb as i32) << 16);
                self.store_sreg(rep.defs[0], tmp);
                self.free_temp(tmp);
            }
            ConstWide16 | ConstWide32 => {
                let value = insn.vb as i32 as i64;
                self.gen_const_wide(&rep, value);
            }
            ConstWide => self.gen_const_wide(&rep, insn.vb_wide as i64),
            ConstWideHigh16 => self.gen_const_wide(&rep, (insn.vb as i64) << 48),

            ConstString | ConstStringJumbo => {
                self.gen_resolve_call(QuickEntrypoint::ResolveString, insn.vb, &rep)
            }
            ConstClass => self.gen_resolve_call(QuickEntrypoint::ResolveType, insn.vb, &rep),

            MonitorEnter | MonitorExit => {
                let obj = self.load_sreg(rep.uses[0]);
                self.gen_null_check(mir, obj);
                let arg0 = self.target.regs().arg_regs[0];
                if obj != arg0 {
                    self.new_lir(MachineOp::MovRR, [arg0 as i32, obj as i32, 0, 0, 0]);
                }
                let ep = if opcode == MonitorEnter {
                    QuickEntrypoint::LockObject
                } else {
                    QuickEntrypoint::UnlockObject
                };
                self.call_helper(ep, true);
            }

            CheckCast => {
                let obj = self.load_sreg(rep.uses[0]);
                let regs = self.target.regs();
                let (arg0, arg1) = (regs.arg_regs[0], regs.arg_regs[1]);
                self.load_constant(arg0, insn.vb as i32);
                if obj != arg1 {
                    self.new_lir(MachineOp::MovRR, [arg1 as i32, obj as i32, 0, 0, 0]);
                }
                self.call_helper(QuickEntrypoint::CheckCast, true);
            }
            InstanceOf => {
                let obj = self.load_sreg(rep.uses[0]);
                let regs = self.target.regs();
                let (arg0, arg1, ret0) = (regs.arg_regs[0], regs.arg_regs[1], regs.ret0);
                self.load_constant(arg0, insn.vc as i32);
                if obj != arg1 {
                    self.new_lir(MachineOp::MovRR, [arg1 as i32, obj as i32, 0, 0, 0]);
                }
                self.call_helper(QuickEntrypoint::InstanceofNonTrivial, true);
                self.store_sreg(rep.defs[0], ret0);
            }

            ArrayLength => {
                let array = self.load_sreg(rep.uses[0]);
                self.gen_null_check(mir, array);
                let tmp = self.alloc_temp();
                self.new_lir(
                    MachineOp::LoadWordDisp,
                    [tmp as i32, array as i32, ARRAY_LENGTH_OFFSET, 0, 0],
                );
                self.store_sreg(rep.defs[0], tmp);
                self.free_temp(tmp);
            }

            NewInstance => self.gen_resolve_call(QuickEntrypoint::AllocObject, insn.vb, &rep),
            NewArray => {
                let len = self.load_sreg(rep.uses[0]);
                let regs = self.target.regs();
                let (arg0, arg1, ret0) = (regs.arg_regs[0], regs.arg_regs[1], regs.ret0);
                self.load_constant(arg0, insn.vc as i32);
                if len != arg1 {
                    self.new_lir(MachineOp::MovRR, [arg1 as i32, len as i32, 0, 0, 0]);
                }
                self.call_helper(QuickEntrypoint::AllocArray, true);
                self.store_sreg(rep.defs[0], ret0);
            }
            FilledNewArray | FilledNewArrayRange => {
                // Flush arguments to the out area, then hand off.
                for (i, &s) in rep.uses.iter().enumerate() {
                    let r = self.load_sreg(s);
                    let slot = self.out_slot_offset(i);
                    let sp = self.target.regs().sp as i32;
                    self.new_lir(MachineOp::StoreWordDisp, [r as i32, sp, slot, 0, 0]);
                    self.free_temp(r);
                }
                let regs = self.target.regs();
                let (arg0, arg1) = (regs.arg_regs[0], regs.arg_regs[1]);
                self.load_constant(arg0, insn.vb as i32);
                self.load_constant(arg1, rep.uses.len() as i32);
                self.call_helper(QuickEntrypoint::AllocArray, true);
            }
            FillArrayData => {
                let payload_offset = (self.current_bc_offset as i32 + insn.vb as i32) as usize;
                let array = self.load_sreg(rep.uses[0]);
                self.gen_null_check(mir, array);
                let regs = self.target.regs();
                let (arg0, arg1) = (regs.arg_regs[0], regs.arg_regs[1]);
                if array != arg0 {
                    self.new_lir(MachineOp::MovRR, [arg0 as i32, array as i32, 0, 0, 0]);
                }
                self.load_constant(arg1, payload_offset as i32);
                self.record_fill_array_data(payload_offset);
                self.call_helper(QuickEntrypoint::HandleFillArrayData, true);
            }

            Throw => {
                let obj = self.load_sreg(rep.uses[0]);
                self.gen_null_check(mir, obj);
                let arg0 = self.target.regs().arg_regs[0];
                if obj != arg0 {
                    self.new_lir(MachineOp::MovRR, [arg0 as i32, obj as i32, 0, 0, 0]);
                }
                self.call_helper(QuickEntrypoint::DeliverException, true);
            }

            Goto | Goto16 | Goto32 => {
                if self.graph.is_backwards_branch(bb) {
                    self.gen_suspend_test(Some(mir));
                }
                let taken = self.graph.block(bb).taken.ok_or_else(|| {
                    Bug::new(BugKind::MalformedGraph, "goto without taken edge")
                })?;
                self.branch_to_block(None, taken);
            }

            PackedSwitch => self.gen_packed_switch(bb, mir, &rep)?,
            SparseSwitch => self.gen_sparse_switch(bb, mir, &rep)?,

            CmplFloat | CmpgFloat | CmplDouble | CmpgDouble => {
                self.gen_fp_cmp(opcode, &rep)
            }
            CmpLong => self.gen_cmp_long_value(&rep),

            IfEq | IfNe | IfLt | IfGe | IfGt | IfLe => {
                let cc = match opcode {
                    IfEq => CondCode::Eq,
                    IfNe => CondCode::Ne,
                    IfLt => CondCode::Lt,
                    IfGe => CondCode::Ge,
                    IfGt => CondCode::Gt,
                    _ => CondCode::Le,
                };
                if self.graph.is_backwards_branch(bb) {
                    self.gen_suspend_test(Some(mir));
                }
                let lhs = self.load_sreg(rep.uses[0]);
                let rhs = self.load_sreg(rep.uses[1]);
                self.new_lir(MachineOp::CmpRR, [lhs as i32, rhs as i32, 0, 0, 0]);
                let taken = self.graph.block(bb).taken.ok_or_else(|| {
                    Bug::new(BugKind::MalformedGraph, "if without taken edge")
                })?;
                self.branch_to_block(Some(cc), taken);
            }
            IfEqz | IfNez | IfLtz | IfGez | IfGtz | IfLez => {
                let cc = match opcode {
                    IfEqz => CondCode::Eq,
                    IfNez => CondCode::Ne,
                    IfLtz => CondCode::Lt,
                    IfGez => CondCode::Ge,
                    IfGtz => CondCode::Gt,
                    _ => CondCode::Le,
                };
                if self.graph.is_backwards_branch(bb) {
                    self.gen_suspend_test(Some(mir));
                }
                let lhs = self.load_sreg(rep.uses[0]);
                self.new_lir(MachineOp::CmpRI, [lhs as i32, 0, 0, 0, 0]);
                let taken = self.graph.block(bb).taken.ok_or_else(|| {
                    Bug::new(BugKind::MalformedGraph, "if without taken edge")
                })?;
                self.branch_to_block(Some(cc), taken);
            }

            Aget | AgetObject | AgetBoolean | AgetByte | AgetChar | AgetShort => {
                let size = match opcode {
                    AgetBoolean => OpSize::UnsignedByte,
                    AgetByte => OpSize::SignedByte,
                    AgetChar => OpSize::UnsignedHalf,
                    AgetShort => OpSize::SignedHalf,
                    _ => OpSize::Word,
                };
                self.gen_array_get(mir, &rep, size, false);
            }
            AgetWide => self.gen_array_get(mir, &rep, OpSize::Word, true),
            Aput | AputObject | AputBoolean | AputByte | AputChar | AputShort => {
                let size = match opcode {
                    AputBoolean | AputByte => OpSize::UnsignedByte,
                    AputChar | AputShort => OpSize::UnsignedHalf,
                    _ => OpSize::Word,
                };
                self.gen_array_put(mir, &rep, size, false, opcode == AputObject);
            }
            AputWide => self.gen_array_put(mir, &rep, OpSize::Word, true, false),

            Iget | IgetObject | IgetBoolean | IgetByte | IgetChar | IgetShort => {
                let size = match opcode {
                    IgetBoolean => OpSize::UnsignedByte,
                    IgetByte => OpSize::SignedByte,
                    IgetChar => OpSize::UnsignedHalf,
                    IgetShort => OpSize::SignedHalf,
                    _ => OpSize::Word,
                };
                self.gen_iget(mir, &rep, insn.vc, size, false);
            }
            IgetWide => self.gen_iget(mir, &rep, insn.vc, OpSize::Word, true),
            Iput | IputObject | IputBoolean | IputByte | IputChar | IputShort => {
                let size = match opcode {
                    IputBoolean | IputByte => OpSize::UnsignedByte,
                    IputChar | IputShort => OpSize::UnsignedHalf,
                    _ => OpSize::Word,
                };
                self.gen_iput(mir, &rep, insn.vc, size, false, opcode == IputObject);
            }
            IputWide => self.gen_iput(mir, &rep, insn.vc, OpSize::Word, true, false),

            Sget | SgetObject | SgetBoolean | SgetByte | SgetChar | SgetShort => {
                self.gen_sget(&rep, insn.vb, false)
            }
            SgetWide => self.gen_sget(&rep, insn.vb, true),
            Sput | SputObject | SputBoolean | SputByte | SputChar | SputShort => {
                self.gen_sput(&rep, insn.vb, false)
            }
            SputWide => self.gen_sput(&rep, insn.vb, true),

            InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic | InvokeInterface
            | InvokeVirtualRange | InvokeSuperRange | InvokeDirectRange | InvokeStaticRange
            | InvokeInterfaceRange => self.gen_invoke(bb, mir, opcode, &rep),

            NegInt | NotInt => {
                let src = self.load_sreg(rep.uses[0]);
                let dst = self.alloc_temp();
                let op = if opcode == NegInt {
                    MachineOp::NegRR
                } else {
                    MachineOp::NotRR
                };
                self.emit_unary(op, dst, src);
                self.store_sreg(rep.defs[0], dst);
                self.free_temp(dst);
            }
            NegLong | NotLong => self.gen_long_neg_not(&rep, opcode == NegLong),
            NegFloat => {
                let src = self.load_fp(rep.uses[0]);
                let dst = self.alloc_fp_temp();
                self.new_lir(MachineOp::FNegS, [dst as i32, src as i32, 0, 0, 0]);
                self.store_fp(rep.defs[0], dst);
                self.free_fp_temp(dst);
            }
            NegDouble => {
                let src = self.load_fp_wide(rep.uses[0]);
                let dst = self.alloc_fp_temp_pair();
                self.new_lir(MachineOp::FNegD, [dst as i32, src as i32, 0, 0, 0]);
                self.store_fp_wide(rep.defs[0], dst);
            }

            IntToLong => {
                let src = self.load_sreg(rep.uses[0]);
                let hi = self.alloc_temp();
                self.new_lir(MachineOp::MovRR, [hi as i32, src as i32, 0, 0, 0]);
                self.new_lir(MachineOp::AsrRRI, [hi as i32, hi as i32, 31, 0, 0]);
                self.store_sreg_wide(rep.defs[0], src, hi);
                self.free_temp(hi);
            }
            LongToInt => {
                let lo = self.load_sreg(rep.uses[0]);
                self.store_sreg(rep.defs[0], lo);
            }
            IntToFloat => self.gen_fp_cvt(MachineOp::FCvtIS, &rep, false, false),
            FloatToInt => self.gen_fp_cvt(MachineOp::FCvtSI, &rep, false, false),
            IntToDouble => self.gen_fp_cvt(MachineOp::FCvtID, &rep, false, true),
            DoubleToInt => self.gen_fp_cvt(MachineOp::FCvtDI, &rep, true, false),
            FloatToDouble => self.gen_fp_cvt(MachineOp::FCvtSD, &rep, false, true),
            DoubleToFloat => self.gen_fp_cvt(MachineOp::FCvtDS, &rep, true, false),
            FloatToLong => self.gen_fp_to_long_helper(QuickEntrypoint::F2l, &rep, false),
            DoubleToLong => self.gen_fp_to_long_helper(QuickEntrypoint::D2l, &rep, true),
            LongToFloat | LongToDouble => self.gen_long_to_fp(&rep, opcode == LongToDouble),

            IntToByte => self.gen_int_narrow(&rep, 24, true),
            IntToShort => self.gen_int_narrow(&rep, 16, true),
            IntToChar => self.gen_int_narrow(&rep, 16, false),

            AddInt | SubInt | MulInt | AndInt | OrInt | XorInt | ShlInt | ShrInt | UshrInt
            | AddInt2Addr | SubInt2Addr | MulInt2Addr | AndInt2Addr | OrInt2Addr
            | XorInt2Addr | ShlInt2Addr | ShrInt2Addr | UshrInt2Addr => {
                self.gen_arith_int(opcode, &rep)
            }
            DivInt | RemInt | DivInt2Addr | RemInt2Addr => {
                self.gen_div_rem(&rep, matches!(opcode, DivInt | DivInt2Addr), None)
            }
            AddIntLit16 | MulIntLit16 | AndIntLit16 | OrIntLit16 | XorIntLit16 | RsubInt
            | AddIntLit8 | RsubIntLit8 | MulIntLit8 | AndIntLit8 | OrIntLit8 | XorIntLit8
            | ShlIntLit8 | ShrIntLit8 | UshrIntLit8 => {
                self.gen_arith_int_lit(opcode, &rep, insn.vc as i32)
            }
            DivIntLit16 | DivIntLit8 | RemIntLit16 | RemIntLit8 => {
                let is_div = matches!(opcode, DivIntLit16 | DivIntLit8);
                self.gen_div_rem(&rep, is_div, Some(insn.vc as i32));
            }

            AddLong | SubLong | AndLong | OrLong | XorLong | AddLong2Addr | SubLong2Addr
            | AndLong2Addr | OrLong2Addr | XorLong2Addr => self.gen_arith_long(opcode, &rep),
            MulLong | MulLong2Addr => self.gen_long_helper(QuickEntrypoint::Lmul, &rep, true),
            DivLong | DivLong2Addr | RemLong | RemLong2Addr => {
                let (lo2, hi2) = self.load_sreg_wide(rep.uses[2]);
                // Division by long zero: test lo|hi.
                let tmp = self.alloc_temp();
                self.emit_binary3(MachineOp::OrRRR, tmp, lo2, hi2);
                self.gen_div_zero_check(tmp);
                self.free_temp(tmp);
                self.free_temp(lo2);
                self.free_temp(hi2);
                let ep = if matches!(opcode, DivLong | DivLong2Addr) {
                    QuickEntrypoint::Ldiv
                } else {
                    QuickEntrypoint::Lmod
                };
                self.gen_long_helper(ep, &rep, true);
            }
            ShlLong | ShlLong2Addr => self.gen_long_shift(QuickEntrypoint::Lshl, &rep),
            ShrLong | ShrLong2Addr => self.gen_long_shift(QuickEntrypoint::Lshr, &rep),
            UshrLong | UshrLong2Addr => self.gen_long_shift(QuickEntrypoint::Lushr, &rep),

            AddFloat | SubFloat | MulFloat | DivFloat | AddFloat2Addr | SubFloat2Addr
            | MulFloat2Addr | DivFloat2Addr => self.gen_arith_float(opcode, &rep),
            RemFloat | RemFloat2Addr => self.gen_fp_rem(QuickEntrypoint::Fmod, &rep, false),
            AddDouble | SubDouble | MulDouble | DivDouble | AddDouble2Addr | SubDouble2Addr
            | MulDouble2Addr | DivDouble2Addr => self.gen_arith_double(opcode, &rep),
            RemDouble | RemDouble2Addr => self.gen_fp_rem(QuickEntrypoint::Dmod, &rep, true),
        }
        Ok(())
    }

    // ---- grouped generators ----

    fn gen_const_wide(&mut self, rep: &SsaRep, value: i64) {
        let lo = self.alloc_temp();
        let hi = self.alloc_temp();
        self.load_constant(lo, value as i32);
        self.load_constant(hi, (value >> 32) as i32);
        self.store_sreg_wide(rep.defs[0], lo, hi);
        self.free_temp(lo);
        self.free_temp(hi);
    }

    /// Resolve-and-return-style helper: `arg0 = index`, result to `defs[0]`.
    fn gen_resolve_call(&mut self, ep: QuickEntrypoint, index: u32, rep: &SsaRep) {
        let regs = self.target.regs();
        let (arg0, ret0) = (regs.arg_regs[0], regs.ret0);
        self.load_constant(arg0, index as i32);
        self.call_helper(ep, true);
        if !rep.defs.is_empty() {
            self.store_sreg(rep.defs[0], ret0);
        }
    }

    fn gen_fp_cmp(&mut self, opcode: Opcode, rep: &SsaRep) {
        let wide = matches!(opcode, Opcode::CmplDouble | Opcode::CmpgDouble);
        let gt_bias = matches!(opcode, Opcode::CmpgFloat | Opcode::CmpgDouble);
        if wide {
            let lhs = self.load_fp_wide(rep.uses[0]);
            let rhs = self.load_fp_wide(rep.uses[2]);
            self.new_lir(MachineOp::FCmpD, [lhs as i32, rhs as i32, 0, 0, 0]);
        } else {
            let lhs = self.load_fp(rep.uses[0]);
            let rhs = self.load_fp(rep.uses[1]);
            self.new_lir(MachineOp::FCmpS, [lhs as i32, rhs as i32, 0, 0, 0]);
        }
        let dst = self.alloc_temp();
        let done = self.raw_label();
        if gt_bias {
            // NaN compares as greater.
            self.load_constant(dst, 1);
            self.op_cond_branch(CondCode::Hi, done);
            self.load_constant(dst, 0);
            self.op_cond_branch(CondCode::Eq, done);
            self.load_constant(dst, -1);
        } else {
            // NaN compares as less.
            self.load_constant(dst, -1);
            self.op_cond_branch(CondCode::Lt, done);
            self.load_constant(dst, 0);
            self.op_cond_branch(CondCode::Eq, done);
            self.load_constant(dst, 1);
        }
        self.place_label(done);
        self.store_sreg(rep.defs[0], dst);
        self.free_temp(dst);
    }

    fn gen_cmp_long_value(&mut self, rep: &SsaRep) {
        let (lo1, hi1) = self.load_sreg_wide(rep.uses[0]);
        let (lo2, hi2) = self.load_sreg_wide(rep.uses[2]);
        let done = self.raw_label();
        self.new_lir(MachineOp::CmpRR, [hi1 as i32, hi2 as i32, 0, 0, 0]);
        self.free_temp(hi1);
        self.free_temp(hi2);
        let dst = self.alloc_temp();
        self.load_constant(dst, -1);
        self.op_cond_branch(CondCode::Lt, done);
        self.load_constant(dst, 1);
        self.op_cond_branch(CondCode::Gt, done);
        // High words equal: unsigned low compare.
        self.new_lir(MachineOp::CmpRR, [lo1 as i32, lo2 as i32, 0, 0, 0]);
        self.load_constant(dst, -1);
        self.op_cond_branch(CondCode::Lo, done);
        self.load_constant(dst, 1);
        self.op_cond_branch(CondCode::Ne, done);
        self.load_constant(dst, 0);
        self.place_label(done);
        self.store_sreg(rep.defs[0], dst);
        self.free_temp(dst);
    }

    fn gen_array_get(&mut self, mir: MirId, rep: &SsaRep, size: OpSize, wide: bool) {
        let array = self.load_sreg(rep.uses[0]);
        let index = self.load_sreg(rep.uses[1]);
        self.gen_null_check(mir, array);
        self.gen_range_check(mir, array, index);
        let addr = self.alloc_temp();
        let scale = if wide { 3 } else { size.scale() };
        if scale != 0 {
            self.emit_rri(MachineOp::LslRRI, addr, index, scale);
            self.emit_binary3(MachineOp::AddRRR, addr, addr, array);
        } else {
            self.emit_binary3(MachineOp::AddRRR, addr, array, index);
        }
        self.free_temp(array);
        self.free_temp(index);
        if wide {
            let lo = self.alloc_temp();
            let hi = self.alloc_temp();
            self.new_lir(
                MachineOp::LoadWordDisp,
                [lo as i32, addr as i32, ARRAY_DATA_OFFSET, 0, 0],
            );
            self.new_lir(
                MachineOp::LoadWordDisp,
                [hi as i32, addr as i32, ARRAY_DATA_OFFSET + 4, 0, 0],
            );
            self.store_sreg_wide(rep.defs[0], lo, hi);
            self.free_temp(lo);
            self.free_temp(hi);
        } else {
            let dst = self.alloc_temp();
            self.new_lir(
                size.load_op(),
                [dst as i32, addr as i32, ARRAY_DATA_OFFSET, 0, 0],
            );
            self.store_sreg(rep.defs[0], dst);
            self.free_temp(dst);
        }
        self.free_temp(addr);
    }

    fn gen_array_put(
        &mut self,
        mir: MirId,
        rep: &SsaRep,
        size: OpSize,
        wide: bool,
        is_object: bool,
    ) {
        let (array_idx, index_idx) = if wide { (2, 3) } else { (1, 2) };
        let array = self.load_sreg(rep.uses[array_idx]);
        let index = self.load_sreg(rep.uses[index_idx]);
        self.gen_null_check(mir, array);
        self.gen_range_check(mir, array, index);
        let addr = self.alloc_temp();
        let scale = if wide { 3 } else { size.scale() };
        if scale != 0 {
            self.emit_rri(MachineOp::LslRRI, addr, index, scale);
            self.emit_binary3(MachineOp::AddRRR, addr, addr, array);
        } else {
            self.emit_binary3(MachineOp::AddRRR, addr, array, index);
        }
        self.free_temp(index);
        if wide {
            let (lo, hi) = self.load_sreg_wide(rep.uses[0]);
            self.new_lir(
                MachineOp::StoreWordDisp,
                [lo as i32, addr as i32, ARRAY_DATA_OFFSET, 0, 0],
            );
            self.new_lir(
                MachineOp::StoreWordDisp,
                [hi as i32, addr as i32, ARRAY_DATA_OFFSET + 4, 0, 0],
            );
            self.free_temp(lo);
            self.free_temp(hi);
        } else {
            let value = self.load_sreg(rep.uses[0]);
            self.new_lir(
                size.store_op(),
                [value as i32, addr as i32, ARRAY_DATA_OFFSET, 0, 0],
            );
            self.free_temp(value);
        }
        if is_object {
            // Card mark for the collector.
            let card = self.alloc_temp();
            self.emit_rri(MachineOp::LsrRRI, card, array, 7);
            self.free_temp(card);
        }
        self.free_temp(addr);
    }

    fn gen_iget(&mut self, mir: MirId, rep: &SsaRep, field_idx: u32, size: OpSize, wide: bool) {
        match self.fields.get(field_idx) {
            Some(info) => {
                let obj = self.load_sreg(rep.uses[0]);
                self.gen_null_check(mir, obj);
                if wide {
                    let lo = self.alloc_temp();
                    let hi = self.alloc_temp();
                    self.new_lir(
                        MachineOp::LoadWordDisp,
                        [lo as i32, obj as i32, info.offset, 0, 0],
                    );
                    self.new_lir(
                        MachineOp::LoadWordDisp,
                        [hi as i32, obj as i32, info.offset + 4, 0, 0],
                    );
                    if info.is_volatile {
                        self.gen_memory_barrier();
                    }
                    self.store_sreg_wide(rep.defs[0], lo, hi);
                    self.free_temp(lo);
                    self.free_temp(hi);
                } else {
                    let dst = self.alloc_temp();
                    self.new_lir(size.load_op(), [dst as i32, obj as i32, info.offset, 0, 0]);
                    if info.is_volatile {
                        self.gen_memory_barrier();
                    }
                    self.store_sreg(rep.defs[0], dst);
                    self.free_temp(dst);
                }
            }
            None => {
                // Slow path: Get*Instance(field_idx, obj).
                let obj = self.load_sreg(rep.uses[0]);
                self.gen_null_check(mir, obj);
                let regs = self.target.regs();
                let (arg0, arg1) = (regs.arg_regs[0], regs.arg_regs[1]);
                if obj != arg1 {
                    self.new_lir(MachineOp::MovRR, [arg1 as i32, obj as i32, 0, 0, 0]);
                }
                self.load_constant(arg0, field_idx as i32);
                let ep = if wide {
                    QuickEntrypoint::Get64Instance
                } else {
                    QuickEntrypoint::Get32Instance
                };
                self.call_helper(ep, true);
                if wide {
                    let (r0, r1) = (regs.ret0, regs.ret1);
                    self.store_sreg_wide(rep.defs[0], r0, r1);
                } else {
                    self.store_sreg(rep.defs[0], regs.ret0);
                }
            }
        }
    }

    fn gen_iput(
        &mut self,
        mir: MirId,
        rep: &SsaRep,
        field_idx: u32,
        size: OpSize,
        wide: bool,
        is_object: bool,
    ) {
        let obj_idx = if wide { 2 } else { 1 };
        match self.fields.get(field_idx) {
            Some(info) => {
                let obj = self.load_sreg(rep.uses[obj_idx]);
                self.gen_null_check(mir, obj);
                if info.is_volatile {
                    self.gen_memory_barrier();
                }
                if wide {
                    let (lo, hi) = self.load_sreg_wide(rep.uses[0]);
                    self.new_lir(
                        MachineOp::StoreWordDisp,
                        [lo as i32, obj as i32, info.offset, 0, 0],
                    );
                    self.new_lir(
                        MachineOp::StoreWordDisp,
                        [hi as i32, obj as i32, info.offset + 4, 0, 0],
                    );
                    self.free_temp(lo);
                    self.free_temp(hi);
                } else {
                    let value = self.load_sreg(rep.uses[0]);
                    self.new_lir(
                        size.store_op(),
                        [value as i32, obj as i32, info.offset, 0, 0],
                    );
                    self.free_temp(value);
                }
                if is_object {
                    let card = self.alloc_temp();
                    self.emit_rri(MachineOp::LsrRRI, card, obj, 7);
                    self.free_temp(card);
                }
            }
            None => {
                let obj = self.load_sreg(rep.uses[obj_idx]);
                self.gen_null_check(mir, obj);
                let regs = self.target.regs();
                let (arg0, arg1, arg2) = (regs.arg_regs[0], regs.arg_regs[1], regs.arg_regs[2]);
                let value = self.load_sreg(rep.uses[0]);
                if obj != arg1 {
                    self.new_lir(MachineOp::MovRR, [arg1 as i32, obj as i32, 0, 0, 0]);
                }
                if value != arg2 {
                    self.new_lir(MachineOp::MovRR, [arg2 as i32, value as i32, 0, 0, 0]);
                }
                self.load_constant(arg0, field_idx as i32);
                let ep = if wide {
                    QuickEntrypoint::Set64Instance
                } else if is_object {
                    QuickEntrypoint::SetObjInstance
                } else {
                    QuickEntrypoint::Set32Instance
                };
                self.call_helper(ep, true);
            }
        }
    }

    /// Static storage base: declaring class of the current method.
    fn load_static_base(&mut self, needs_init: bool) -> u8 {
        let sp = self.target.regs().sp as i32;
        let method = self.alloc_temp();
        self.new_lir(
            MachineOp::LoadWordDisp,
            [method as i32, sp, self.method_slot_offset(), 0, 0],
        );
        let cls = self.alloc_temp();
        self.new_lir(
            MachineOp::LoadWordDisp,
            [cls as i32, method as i32, METHOD_DECLARING_CLASS_OFFSET, 0, 0],
        );
        self.free_temp(method);
        if needs_init {
            let regs = self.target.regs();
            let arg0 = regs.arg_regs[0];
            if cls != arg0 {
                self.new_lir(MachineOp::MovRR, [arg0 as i32, cls as i32, 0, 0, 0]);
            }
            self.call_helper(QuickEntrypoint::InitializeStaticStorage, true);
            let ret0 = regs.ret0;
            self.new_lir(MachineOp::MovRR, [cls as i32, ret0 as i32, 0, 0, 0]);
        }
        cls
    }

    fn gen_sget(&mut self, rep: &SsaRep, field_idx: u32, wide: bool) {
        match self.fields.get(field_idx) {
            Some(info) => {
                let cls = self.load_static_base(info.needs_class_init);
                if wide {
                    let lo = self.alloc_temp();
                    let hi = self.alloc_temp();
                    self.new_lir(
                        MachineOp::LoadWordDisp,
                        [lo as i32, cls as i32, info.offset, 0, 0],
                    );
                    self.new_lir(
                        MachineOp::LoadWordDisp,
                        [hi as i32, cls as i32, info.offset + 4, 0, 0],
                    );
                    self.store_sreg_wide(rep.defs[0], lo, hi);
                    self.free_temp(lo);
                    self.free_temp(hi);
                } else {
                    let dst = self.alloc_temp();
                    self.new_lir(
                        MachineOp::LoadWordDisp,
                        [dst as i32, cls as i32, info.offset, 0, 0],
                    );
                    if info.is_volatile {
                        self.gen_memory_barrier();
                    }
                    self.store_sreg(rep.defs[0], dst);
                    self.free_temp(dst);
                }
                self.free_temp(cls);
            }
            None => {
                let regs = self.target.regs();
                self.load_constant(regs.arg_regs[0], field_idx as i32);
                let ep = if wide {
                    QuickEntrypoint::Get64Static
                } else {
                    QuickEntrypoint::Get32Static
                };
                self.call_helper(ep, true);
                if wide {
                    let (r0, r1) = (regs.ret0, regs.ret1);
                    self.store_sreg_wide(rep.defs[0], r0, r1);
                } else {
                    self.store_sreg(rep.defs[0], regs.ret0);
                }
            }
        }
    }

    fn gen_sput(&mut self, rep: &SsaRep, field_idx: u32, wide: bool) {
        match self.fields.get(field_idx) {
            Some(info) => {
                let cls = self.load_static_base(info.needs_class_init);
                if info.is_volatile {
                    self.gen_memory_barrier();
                }
                if wide {
                    let (lo, hi) = self.load_sreg_wide(rep.uses[0]);
                    self.new_lir(
                        MachineOp::StoreWordDisp,
                        [lo as i32, cls as i32, info.offset, 0, 0],
                    );
                    self.new_lir(
                        MachineOp::StoreWordDisp,
                        [hi as i32, cls as i32, info.offset + 4, 0, 0],
                    );
                    self.free_temp(lo);
                    self.free_temp(hi);
                } else {
                    let value = self.load_sreg(rep.uses[0]);
                    self.new_lir(
                        MachineOp::StoreWordDisp,
                        [value as i32, cls as i32, info.offset, 0, 0],
                    );
                    self.free_temp(value);
                }
                self.free_temp(cls);
            }
            None => {
                let regs = self.target.regs();
                let value = self.load_sreg(rep.uses[0]);
                let arg1 = regs.arg_regs[1];
                if value != arg1 {
                    self.new_lir(MachineOp::MovRR, [arg1 as i32, value as i32, 0, 0, 0]);
                }
                self.load_constant(regs.arg_regs[0], field_idx as i32);
                let ep = if wide {
                    QuickEntrypoint::Set64Static
                } else {
                    QuickEntrypoint::Set32Static
                };
                self.call_helper(ep, true);
            }
        }
    }

    fn gen_memory_barrier(&mut self) {
        let barrier = self.new_pseudo(PseudoOp::Barrier);
        self.lirs.get_mut(barrier).def_mask = crate::lir::ENCODE_ALL;
    }

    // ---- invokes & intrinsics ----

    fn gen_invoke(&mut self, bb: BlockId, mir: MirId, opcode: Opcode, rep: &SsaRep) {
        if self.try_intrinsic(bb, mir, rep) {
            return;
        }
        let insn = self.graph.mir(mir).insn;
        let attrs = insn.op.dataflow_attrs();
        let opt_flags = self.graph.mir(mir).opt_flags;

        // Explicit null check of the receiver.
        if attrs & df::NULL_CHK_OUT0 != 0
            && !opt_flags.contains(MirFlags::IGNORE_NULL_CHECK)
            && !rep.uses.is_empty()
        {
            let this = self.load_sreg(rep.uses[0]);
            self.new_lir(MachineOp::CmpRI, [this as i32, 0, 0, 0, 0]);
            self.throw_branch(CondCode::Eq, QuickEntrypoint::ThrowNullPointer);
            self.free_temp(this);
        }

        // Stage every argument word through the out area, then pull the
        // register-borne ones back; going through memory keeps temp and
        // argument registers from clashing.
        let sp = self.target.regs().sp as i32;
        for (i, &s) in rep.uses.iter().enumerate() {
            let r = self.load_sreg(s);
            let slot = self.out_slot_offset(i);
            self.new_lir(MachineOp::StoreWordDisp, [r as i32, sp, slot, 0, 0]);
            self.free_temp(r);
        }
        let arg_regs = self.target.regs().arg_regs;
        for i in 0..rep.uses.len().min(arg_regs.len() - 1) {
            let slot = self.out_slot_offset(i);
            self.new_lir(
                MachineOp::LoadWordDisp,
                [arg_regs[1 + i] as i32, sp, slot, 0, 0],
            );
        }

        let invoke_type = match opcode {
            Opcode::InvokeStatic | Opcode::InvokeStaticRange => InvokeType::Static,
            Opcode::InvokeDirect | Opcode::InvokeDirectRange => InvokeType::Direct,
            Opcode::InvokeSuper | Opcode::InvokeSuperRange => InvokeType::Super,
            Opcode::InvokeInterface | Opcode::InvokeInterfaceRange => InvokeType::Interface,
            _ => InvokeType::Virtual,
        };

        // Direct known targets get a patched literal call on Thumb2; all
        // other shapes go through the resolution trampolines.
        let known_direct = matches!(invoke_type, InvokeType::Static | InvokeType::Direct)
            && self.graph.methods.signature(insn.vb).is_some()
            && self.target.isa() == InstructionSet::Thumb2;
        if known_direct {
            let regs = self.target.regs();
            let (arg0, tgt) = (regs.arg_regs[0], regs.invoke_tgt);
            let mlit = self.method_literal(insn.vb, invoke_type);
            let load_m = self.new_lir(MachineOp::LoadPcRel, [arg0 as i32, 0, 0, 0, 0]);
            self.lirs.get_mut(load_m).target = Some(mlit);
            let clit = self.code_literal(insn.vb, invoke_type);
            let load_c = self.new_lir(MachineOp::LoadPcRel, [tgt as i32, 0, 0, 0, 0]);
            self.lirs.get_mut(load_c).target = Some(clit);
            self.new_lir(MachineOp::BlxReg, [tgt as i32, 0, 0, 0, 0]);
            self.mark_safepoint();
            return;
        }

        let ep = match invoke_type {
            InvokeType::Static => QuickEntrypoint::InvokeStaticTrampoline,
            InvokeType::Direct => QuickEntrypoint::InvokeDirectTrampoline,
            InvokeType::Super => QuickEntrypoint::InvokeSuperTrampoline,
            InvokeType::Interface => QuickEntrypoint::InvokeInterfaceTrampoline,
            InvokeType::Virtual => QuickEntrypoint::InvokeVirtualTrampoline,
        };
        let arg0 = self.target.regs().arg_regs[0];
        self.load_constant(arg0, insn.vb as i32);
        self.call_helper(ep, true);
    }

    /// Recognize and inline the closed intrinsic set.  Returns true when the
    /// invoke (and its move-result) were fully replaced.
    fn try_intrinsic(&mut self, bb: BlockId, mir: MirId, rep: &SsaRep) -> bool {
        let insn = self.graph.mir(mir).insn;
        let Some((class, name, shorty)) = self
            .graph
            .methods
            .signature(insn.vb)
            .map(|(c, n, s)| (c.to_owned(), n.to_owned(), s.to_owned()))
        else {
            return false;
        };
        let move_result = self.graph.find_move_result(bb, mir);
        let result_sreg = move_result.and_then(|m| {
            self.graph
                .mir(m)
                .ssa_rep
                .as_ref()
                .and_then(|r| r.defs.first().copied())
        });

        let emitted = match (class.as_str(), name.as_str(), shorty.as_str()) {
            ("Ljava/lang/Math;", "abs", "II") => {
                let Some(dst_s) = result_sreg else { return false };
                let src = self.load_sreg(rep.uses[0]);
                let sign = self.alloc_temp();
                let dst = self.alloc_temp();
                self.emit_rri(MachineOp::AsrRRI, sign, src, 31);
                self.emit_binary3(MachineOp::XorRRR, dst, src, sign);
                self.emit_binary3(MachineOp::SubRRR, dst, dst, sign);
                self.store_sreg(dst_s, dst);
                self.free_temp(sign);
                self.free_temp(dst);
                true
            }
            ("Ljava/lang/Math;", "abs", "JJ") => {
                let Some(dst_s) = result_sreg else { return false };
                let (lo, hi) = self.load_sreg_wide(rep.uses[0]);
                let sign = self.alloc_temp();
                self.emit_rri(MachineOp::AsrRRI, sign, hi, 31);
                self.new_lir(MachineOp::XorRRR, [lo as i32, lo as i32, sign as i32, 0, 0]);
                self.new_lir(MachineOp::XorRRR, [hi as i32, hi as i32, sign as i32, 0, 0]);
                if self.target.isa() == InstructionSet::Mips {
                    let borrow = self.alloc_temp();
                    self.new_lir(
                        MachineOp::SltuRRR,
                        [borrow as i32, lo as i32, sign as i32, 0, 0],
                    );
                    self.new_lir(MachineOp::SubRRR, [lo as i32, lo as i32, sign as i32, 0, 0]);
                    self.new_lir(MachineOp::SubRRR, [hi as i32, hi as i32, sign as i32, 0, 0]);
                    self.new_lir(MachineOp::SubRRR, [hi as i32, hi as i32, borrow as i32, 0, 0]);
                    self.free_temp(borrow);
                } else {
                    self.new_lir(MachineOp::SubRRR, [lo as i32, lo as i32, sign as i32, 0, 0]);
                    self.new_lir(MachineOp::SbcRRR, [hi as i32, hi as i32, sign as i32, 0, 0]);
                }
                self.free_temp(sign);
                self.store_sreg_wide(dst_s, lo, hi);
                self.free_temp(lo);
                self.free_temp(hi);
                true
            }
            ("Ljava/lang/Math;", "abs", "FF") => {
                let Some(dst_s) = result_sreg else { return false };
                let src = self.load_sreg(rep.uses[0]);
                let mask = self.alloc_temp();
                let dst = self.alloc_temp();
                self.load_constant(mask, 0x7fffffff);
                self.emit_binary3(MachineOp::AndRRR, dst, src, mask);
                self.store_sreg(dst_s, dst);
                self.free_temp(mask);
                self.free_temp(dst);
                true
            }
            ("Ljava/lang/Math;", "abs", "DD") => {
                let Some(dst_s) = result_sreg else { return false };
                let (lo, hi) = self.load_sreg_wide(rep.uses[0]);
                let mask = self.alloc_temp();
                let dhi = self.alloc_temp();
                self.load_constant(mask, 0x7fffffff);
                self.emit_binary3(MachineOp::AndRRR, dhi, hi, mask);
                self.store_sreg_wide(dst_s, lo, dhi);
                self.free_temp(mask);
                self.free_temp(dhi);
                true
            }
            ("Ljava/lang/Math;", "sqrt", "DD") => {
                let Some(dst_s) = result_sreg else { return false };
                let src = self.load_fp_wide(rep.uses[0]);
                let dst = self.alloc_fp_temp_pair();
                self.new_lir(MachineOp::FSqrtD, [dst as i32, src as i32, 0, 0, 0]);
                self.store_fp_wide(dst_s, dst);
                true
            }
            ("Ljava/lang/Math;", "min", "III") | ("Ljava/lang/Math;", "max", "III") => {
                let Some(dst_s) = result_sreg else { return false };
                let is_min = name == "min";
                let a = self.load_sreg(rep.uses[0]);
                let b = self.load_sreg(rep.uses[1]);
                let dst = self.alloc_temp();
                self.new_lir(MachineOp::MovRR, [dst as i32, a as i32, 0, 0, 0]);
                self.new_lir(MachineOp::CmpRR, [a as i32, b as i32, 0, 0, 0]);
                let done = self.raw_label();
                let cc = if is_min { CondCode::Le } else { CondCode::Ge };
                self.op_cond_branch(cc, done);
                self.new_lir(MachineOp::MovRR, [dst as i32, b as i32, 0, 0, 0]);
                self.place_label(done);
                self.store_sreg(dst_s, dst);
                self.free_temp(dst);
                true
            }
            ("Ljava/lang/Float;", "intBitsToFloat", "FI")
            | ("Ljava/lang/Float;", "floatToRawIntBits", "IF")
            | ("Ljava/lang/Float;", "floatToIntBits", "IF") => {
                let Some(dst_s) = result_sreg else { return false };
                let src = self.load_sreg(rep.uses[0]);
                self.store_sreg(dst_s, src);
                true
            }
            ("Ljava/lang/Double;", "longBitsToDouble", "DJ")
            | ("Ljava/lang/Double;", "doubleToRawLongBits", "JD")
            | ("Ljava/lang/Double;", "doubleToLongBits", "JD") => {
                let Some(dst_s) = result_sreg else { return false };
                let (lo, hi) = self.load_sreg_wide(rep.uses[0]);
                self.store_sreg_wide(dst_s, lo, hi);
                true
            }
            ("Ljava/lang/String;", "length", "I") | ("Ljava/lang/String;", "isEmpty", "Z") => {
                let Some(dst_s) = result_sreg else { return false };
                let s = self.load_sreg(rep.uses[0]);
                self.gen_null_check(mir, s);
                let dst = self.alloc_temp();
                self.new_lir(
                    MachineOp::LoadWordDisp,
                    [dst as i32, s as i32, STRING_COUNT_OFFSET, 0, 0],
                );
                if name == "isEmpty" {
                    self.new_lir(MachineOp::CmpRI, [dst as i32, 0, 0, 0, 0]);
                    let done = self.raw_label();
                    self.load_constant(dst, 1);
                    self.op_cond_branch(CondCode::Eq, done);
                    self.load_constant(dst, 0);
                    self.place_label(done);
                }
                self.store_sreg(dst_s, dst);
                self.free_temp(dst);
                true
            }
            ("Ljava/lang/String;", "charAt", "CI") => {
                let Some(dst_s) = result_sreg else { return false };
                let s = self.load_sreg(rep.uses[0]);
                let idx = self.load_sreg(rep.uses[1]);
                self.gen_null_check(mir, s);
                let len = self.alloc_temp();
                self.new_lir(
                    MachineOp::LoadWordDisp,
                    [len as i32, s as i32, STRING_COUNT_OFFSET, 0, 0],
                );
                self.new_lir(MachineOp::CmpRR, [idx as i32, len as i32, 0, 0, 0]);
                self.throw_branch(CondCode::Hs, QuickEntrypoint::ThrowArrayBounds);
                self.free_temp(len);
                let addr = self.alloc_temp();
                self.emit_rri(MachineOp::LslRRI, addr, idx, 1);
                self.emit_binary3(MachineOp::AddRRR, addr, addr, s);
                let dst = self.alloc_temp();
                self.new_lir(
                    MachineOp::LoadUHalfDisp,
                    [dst as i32, addr as i32, STRING_VALUE_OFFSET, 0, 0],
                );
                self.store_sreg(dst_s, dst);
                self.free_temp(addr);
                self.free_temp(dst);
                true
            }
            ("Ljava/lang/String;", "compareTo", _) => {
                self.gen_string_helper(QuickEntrypoint::StringCompareTo, rep, result_sreg)
            }
            ("Ljava/lang/String;", "indexOf", _) => {
                self.gen_string_helper(QuickEntrypoint::StringIndexOf, rep, result_sreg)
            }
            ("Ljava/lang/Thread;", "currentThread", _) => {
                let Some(dst_s) = result_sreg else { return false };
                let regs = self.target.regs();
                let tmp = self.alloc_temp();
                let load = self.new_lir(
                    MachineOp::LoadWordDisp,
                    [
                        tmp as i32,
                        regs.self_reg as i32,
                        THREAD_SELF_OBJECT_OFFSET,
                        0,
                        0,
                    ],
                );
                self.lirs.get_mut(load).use_mask &= !ENCODE_HEAP_REF;
                self.store_sreg(dst_s, tmp);
                self.free_temp(tmp);
                true
            }
            ("Lsun/misc/Unsafe;", "getInt", _) | ("Lsun/misc/Unsafe;", "getObject", _) => {
                let Some(dst_s) = result_sreg else { return false };
                // (unsafe, obj, offset-long): offset low word at uses[2].
                let obj = self.load_sreg(rep.uses[1]);
                let off = self.load_sreg(rep.uses[2]);
                let addr = self.alloc_temp();
                self.emit_binary3(MachineOp::AddRRR, addr, obj, off);
                let dst = self.alloc_temp();
                self.new_lir(MachineOp::LoadWordDisp, [dst as i32, addr as i32, 0, 0, 0]);
                self.store_sreg(dst_s, dst);
                self.free_temp(addr);
                self.free_temp(dst);
                true
            }
            ("Lsun/misc/Unsafe;", "putInt", _) | ("Lsun/misc/Unsafe;", "putObject", _) => {
                let obj = self.load_sreg(rep.uses[1]);
                let off = self.load_sreg(rep.uses[2]);
                let value = self.load_sreg(rep.uses[4]);
                let addr = self.alloc_temp();
                self.emit_binary3(MachineOp::AddRRR, addr, obj, off);
                self.new_lir(
                    MachineOp::StoreWordDisp,
                    [value as i32, addr as i32, 0, 0, 0],
                );
                self.free_temp(addr);
                true
            }
            _ => false,
        };

        if emitted {
            self.graph.mir_mut(mir).opt_flags |= MirFlags::INLINED;
            if let Some(mr) = move_result {
                self.graph.mir_mut(mr).opt_flags |= MirFlags::INLINED;
            }
            trace!(
                offset = self.current_bc_offset,
                %class, %name, "inlined intrinsic"
            );
        }
        emitted
    }

    /// String helpers with assembly fast paths in the runtime: stage the two
    /// arguments and call; counts as inlined (no trampoline resolution).
    fn gen_string_helper(
        &mut self,
        ep: QuickEntrypoint,
        rep: &SsaRep,
        result_sreg: Option<SReg>,
    ) -> bool {
        let Some(dst_s) = result_sreg else { return false };
        let regs = self.target.regs();
        let a = self.load_sreg(rep.uses[0]);
        let b = self.load_sreg(rep.uses[1]);
        let (arg0, arg1, ret0) = (regs.arg_regs[0], regs.arg_regs[1], regs.ret0);
        if a != arg0 {
            self.new_lir(MachineOp::MovRR, [arg0 as i32, a as i32, 0, 0, 0]);
        }
        if b != arg1 {
            self.new_lir(MachineOp::MovRR, [arg1 as i32, b as i32, 0, 0, 0]);
        }
        self.call_helper(ep, true);
        self.store_sreg(dst_s, ret0);
        true
    }

    // ---- switches ----

    fn gen_packed_switch(&mut self, bb: BlockId, mir: MirId, rep: &SsaRep) -> Result<(), Bug> {
        let insn = self.graph.mir(mir).insn;
        let payload_offset = (self.current_bc_offset as i32 + insn.vb as i32) as usize;
        let payload = PackedSwitchPayload::decode_at(&self.graph.insns, payload_offset)
            .ok_or_else(|| Bug::new(BugKind::MalformedGraph, "missing packed switch payload"))?;
        let entries = self
            .graph
            .block(bb)
            .successor_list
            .as_ref()
            .map(|l| l.entries.clone())
            .unwrap_or_default();
        let targets: Vec<LirId> = entries.iter().map(|&(b, _)| self.block_label(b)).collect();
        let keys: Vec<i32> = (0..targets.len() as i32)
            .map(|i| payload.first_key + i)
            .collect();

        let key = self.load_sreg(rep.uses[0]);
        let adj = self.alloc_temp();
        if payload.first_key != 0 {
            self.emit_add_imm(adj, key, -payload.first_key);
        } else if adj != key {
            self.new_lir(MachineOp::MovRR, [adj as i32, key as i32, 0, 0, 0]);
        }
        self.new_lir(MachineOp::CmpRI, [adj as i32, targets.len() as i32, 0, 0, 0]);
        let ft = self.graph.block(bb).fall_through.ok_or_else(|| {
            Bug::new(BugKind::MalformedGraph, "switch without fall-through")
        })?;
        self.branch_to_block(Some(CondCode::Hs), ft);

        let table_label = self.lirs.alloc(
            LirOp::Pseudo(PseudoOp::CaseLabel),
            self.current_bc_offset,
            [0; 5],
        );
        let anchor = if self.target.isa() == InstructionSet::Thumb2 {
            self.gen_table_dispatch(adj, table_label)
        } else {
            self.gen_compare_chain_dispatch(key, &keys, &targets)
        };
        self.free_temp(adj);
        self.free_temp(key);

        self.switch_tables.push(SwitchTable {
            block: bb,
            bc_offset: self.current_bc_offset,
            keys,
            targets,
            anchor,
            table_label,
            packed: true,
            offset: 0,
        });
        Ok(())
    }

    fn gen_sparse_switch(&mut self, bb: BlockId, mir: MirId, rep: &SsaRep) -> Result<(), Bug> {
        let insn = self.graph.mir(mir).insn;
        let payload_offset = (self.current_bc_offset as i32 + insn.vb as i32) as usize;
        let payload = SparseSwitchPayload::decode_at(&self.graph.insns, payload_offset)
            .ok_or_else(|| Bug::new(BugKind::MalformedGraph, "missing sparse switch payload"))?;
        let entries = self
            .graph
            .block(bb)
            .successor_list
            .as_ref()
            .map(|l| l.entries.clone())
            .unwrap_or_default();
        let targets: Vec<LirId> = entries.iter().map(|&(b, _)| self.block_label(b)).collect();

        let key = self.load_sreg(rep.uses[0]);
        let anchor = self.gen_compare_chain_dispatch(key, &payload.keys, &targets);
        self.free_temp(key);

        let table_label = self.lirs.alloc(
            LirOp::Pseudo(PseudoOp::CaseLabel),
            self.current_bc_offset,
            [0; 5],
        );
        self.switch_tables.push(SwitchTable {
            block: bb,
            bc_offset: self.current_bc_offset,
            keys: payload.keys,
            targets,
            anchor,
            table_label,
            packed: false,
            offset: 0,
        });
        Ok(())
    }

    /// Thumb2 table dispatch: take the table address PC-relative, index it,
    /// and add the loaded displacement to the anchor PC.
    fn gen_table_dispatch(&mut self, index: u8, table_label: LirId) -> LirId {
        let tab = self.alloc_temp();
        let disp = self.alloc_temp();
        let adr = self.new_lir(MachineOp::AdrPcRel, [tab as i32, 0, 0, 0, 0]);
        self.lirs.get_mut(adr).target = Some(table_label);
        self.emit_rri(MachineOp::LslRRI, disp, index, 2);
        self.emit_binary3(MachineOp::AddRRR, tab, tab, disp);
        self.new_lir(MachineOp::LoadWordDisp, [disp as i32, tab as i32, 0, 0, 0]);
        // Anchor: the PC read the displacements are measured from.
        let pc = 15;
        let anchor = self.new_lir(MachineOp::MovRR, [tab as i32, pc, 0, 0, 0]);
        self.emit_binary3(MachineOp::AddRRR, tab, tab, disp);
        self.new_lir(MachineOp::Bx, [tab as i32, 0, 0, 0, 0]);
        self.free_temp(tab);
        self.free_temp(disp);
        anchor
    }

    /// Fallback dispatch: a chain of compare-and-branches.  The emitted
    /// table still carries the displacement data for the runtime.
    fn gen_compare_chain_dispatch(
        &mut self,
        key: u8,
        keys: &[i32],
        targets: &[LirId],
    ) -> LirId {
        let anchor = self.new_pseudo(PseudoOp::CaseLabel);
        for (i, &target) in targets.iter().enumerate() {
            let case_key = keys.get(i).copied().unwrap_or(i as i32);
            if (0..=0xff).contains(&case_key) {
                self.new_lir(MachineOp::CmpRI, [key as i32, case_key, 0, 0, 0]);
            } else {
                let kreg = self.alloc_temp();
                self.load_constant(kreg, case_key);
                self.new_lir(MachineOp::CmpRR, [key as i32, kreg as i32, 0, 0, 0]);
                self.free_temp(kreg);
            }
            let id = self.new_lir(MachineOp::CondBr, [CondCode::Eq as i32, 0, 0, 0, 0]);
            self.lirs.get_mut(id).target = Some(target);
        }
        anchor
    }

    fn record_fill_array_data(&mut self, payload_offset: usize) {
        if let Some(payload) = ArrayDataPayload::decode_at(&self.graph.insns.clone(), payload_offset) {
            self.fill_array_data.push(FillArrayData {
                units: payload.units,
                bc_offset: self.current_bc_offset,
                offset: 0,
            });
        }
    }



    // ---- arithmetic ----

    /// Immediate ALU form; two-operand targets copy into `rd` first.
    pub(crate) fn emit_rri(&mut self, op: MachineOp, rd: u8, rs: u8, imm: i32) {
        if self.target.two_operand_alu() && rd != rs {
            self.new_lir(MachineOp::MovRR, [rd as i32, rs as i32, 0, 0, 0]);
            self.new_lir(op, [rd as i32, rd as i32, imm, 0, 0]);
        } else {
            self.new_lir(op, [rd as i32, rs as i32, imm, 0, 0]);
        }
    }

    pub(crate) fn emit_binary3(&mut self, op: MachineOp, rd: u8, rs1: u8, rs2: u8) {
        if self.target.two_operand_alu() && rd != rs1 {
            self.new_lir(MachineOp::MovRR, [rd as i32, rs1 as i32, 0, 0, 0]);
            self.new_lir(op, [rd as i32, rd as i32, rs2 as i32, 0, 0]);
        } else {
            self.new_lir(op, [rd as i32, rs1 as i32, rs2 as i32, 0, 0]);
        }
    }

    fn emit_unary(&mut self, op: MachineOp, rd: u8, rs: u8) {
        if self.target.two_operand_alu() && rd != rs {
            self.new_lir(MachineOp::MovRR, [rd as i32, rs as i32, 0, 0, 0]);
            self.new_lir(op, [rd as i32, rd as i32, 0, 0, 0]);
        } else {
            self.new_lir(op, [rd as i32, rs as i32, 0, 0, 0]);
        }
    }

    fn emit_add_imm(&mut self, rd: u8, rs: u8, imm: i32) {
        if imm >= 0 {
            self.emit_rri(MachineOp::AddRRI, rd, rs, imm);
        } else {
            self.emit_rri(MachineOp::SubRRI, rd, rs, -imm);
        }
    }

    fn int_alu_ops(opcode: Opcode) -> MachineOp {
        use Opcode::*;
        match opcode {
            AddInt | AddInt2Addr | AddIntLit16 | AddIntLit8 => MachineOp::AddRRR,
            SubInt | SubInt2Addr => MachineOp::SubRRR,
            MulInt | MulInt2Addr | MulIntLit16 | MulIntLit8 => MachineOp::MulRRR,
            AndInt | AndInt2Addr | AndIntLit16 | AndIntLit8 => MachineOp::AndRRR,
            OrInt | OrInt2Addr | OrIntLit16 | OrIntLit8 => MachineOp::OrRRR,
            XorInt | XorInt2Addr | XorIntLit16 | XorIntLit8 => MachineOp::XorRRR,
            ShlInt | ShlInt2Addr | ShlIntLit8 => MachineOp::LslRRR,
            ShrInt | ShrInt2Addr | ShrIntLit8 => MachineOp::AsrRRR,
            UshrInt | UshrInt2Addr | UshrIntLit8 => MachineOp::LsrRRR,
            other => unreachable!("not an int alu opcode: {other}"),
        }
    }

    fn gen_arith_int(&mut self, opcode: Opcode, rep: &SsaRep) {
        let op = Self::int_alu_ops(opcode);
        let lhs = self.load_sreg(rep.uses[0]);
        let rhs = self.load_sreg(rep.uses[1]);
        let dst = self.alloc_temp();
        self.emit_binary3(op, dst, lhs, rhs);
        self.store_sreg(rep.defs[0], dst);
        self.free_temp(dst);
    }

    fn gen_arith_int_lit(&mut self, opcode: Opcode, rep: &SsaRep, lit: i32) {
        use Opcode::*;
        let lhs = self.load_sreg(rep.uses[0]);
        let dst = self.alloc_temp();
        match opcode {
            RsubInt | RsubIntLit8 => {
                if lit == 0 {
                    self.emit_unary(MachineOp::NegRR, dst, lhs);
                } else {
                    let tmp = self.alloc_temp();
                    self.load_constant(tmp, lit);
                    self.emit_binary3(MachineOp::SubRRR, dst, tmp, lhs);
                    self.free_temp(tmp);
                }
            }
            ShlIntLit8 => self.emit_rri(MachineOp::LslRRI, dst, lhs, lit & 31),
            ShrIntLit8 => self.emit_rri(MachineOp::AsrRRI, dst, lhs, lit & 31),
            UshrIntLit8 => self.emit_rri(MachineOp::LsrRRI, dst, lhs, lit & 31),
            AddIntLit16 | AddIntLit8 => self.emit_add_imm(dst, lhs, lit),
            _ => {
                let imm_op = match opcode {
                    AndIntLit16 | AndIntLit8 => Some(MachineOp::AndRRI),
                    OrIntLit16 | OrIntLit8 => Some(MachineOp::OrRRI),
                    XorIntLit16 | XorIntLit8 => Some(MachineOp::XorRRI),
                    _ => None,
                };
                match imm_op {
                    Some(op) if (0..=0xfff).contains(&lit) => {
                        self.emit_rri(op, dst, lhs, lit);
                    }
                    _ => {
                        let tmp = self.alloc_temp();
                        self.load_constant(tmp, lit);
                        self.emit_binary3(Self::int_alu_ops(opcode), dst, lhs, tmp);
                        self.free_temp(tmp);
                    }
                }
            }
        }
        self.store_sreg(rep.defs[0], dst);
        self.free_temp(dst);
    }

    /// Integer divide/remainder via the runtime helper; quotient in ret0,
    /// remainder in ret1.
    fn gen_div_rem(&mut self, rep: &SsaRep, is_div: bool, lit: Option<i32>) {
        let regs = self.target.regs();
        let (arg0, arg1) = (regs.arg_regs[0], regs.arg_regs[1]);
        let lhs = self.load_sreg(rep.uses[0]);
        if lhs != arg0 {
            self.new_lir(MachineOp::MovRR, [arg0 as i32, lhs as i32, 0, 0, 0]);
        }
        match lit {
            Some(value) => {
                if value == 0 {
                    // Guaranteed throw.
                    let zero = self.alloc_temp();
                    self.load_constant(zero, 0);
                    self.gen_div_zero_check(zero);
                    self.free_temp(zero);
                    return;
                }
                self.load_constant(arg1, value);
            }
            None => {
                let rhs = self.load_sreg(rep.uses[1]);
                self.gen_div_zero_check(rhs);
                if rhs != arg1 {
                    self.new_lir(MachineOp::MovRR, [arg1 as i32, rhs as i32, 0, 0, 0]);
                }
            }
        }
        self.call_helper(QuickEntrypoint::Idivmod, false);
        let result = if is_div { regs.ret0 } else { regs.ret1 };
        self.store_sreg(rep.defs[0], result);
    }

    /// Pairwise long arithmetic computes into the loaded left-hand temps to
    /// stay inside the scratch budget of the narrowest target.
    fn gen_arith_long(&mut self, opcode: Opcode, rep: &SsaRep) {
        use Opcode::*;
        let (lo1, hi1) = self.load_sreg_wide(rep.uses[0]);
        let (lo2, hi2) = self.load_sreg_wide(rep.uses[2]);
        match opcode {
            AddLong | AddLong2Addr | SubLong | SubLong2Addr => {
                let is_add = matches!(opcode, AddLong | AddLong2Addr);
                if self.target.isa() == InstructionSet::Mips {
                    // No flags: carry comes from an unsigned compare.
                    let carry = self.alloc_temp();
                    if is_add {
                        self.new_lir(MachineOp::AddRRR, [lo1 as i32, lo1 as i32, lo2 as i32, 0, 0]);
                        self.new_lir(
                            MachineOp::SltuRRR,
                            [carry as i32, lo1 as i32, lo2 as i32, 0, 0],
                        );
                        self.new_lir(MachineOp::AddRRR, [hi1 as i32, hi1 as i32, hi2 as i32, 0, 0]);
                        self.new_lir(MachineOp::AddRRR, [hi1 as i32, hi1 as i32, carry as i32, 0, 0]);
                    } else {
                        self.new_lir(
                            MachineOp::SltuRRR,
                            [carry as i32, lo1 as i32, lo2 as i32, 0, 0],
                        );
                        self.new_lir(MachineOp::SubRRR, [lo1 as i32, lo1 as i32, lo2 as i32, 0, 0]);
                        self.new_lir(MachineOp::SubRRR, [hi1 as i32, hi1 as i32, hi2 as i32, 0, 0]);
                        self.new_lir(MachineOp::SubRRR, [hi1 as i32, hi1 as i32, carry as i32, 0, 0]);
                    }
                    self.free_temp(carry);
                } else {
                    let (lop, hop) = if is_add {
                        (MachineOp::AddRRR, MachineOp::AdcRRR)
                    } else {
                        (MachineOp::SubRRR, MachineOp::SbcRRR)
                    };
                    self.new_lir(lop, [lo1 as i32, lo1 as i32, lo2 as i32, 0, 0]);
                    self.new_lir(hop, [hi1 as i32, hi1 as i32, hi2 as i32, 0, 0]);
                }
            }
            AndLong | AndLong2Addr => {
                self.new_lir(MachineOp::AndRRR, [lo1 as i32, lo1 as i32, lo2 as i32, 0, 0]);
                self.new_lir(MachineOp::AndRRR, [hi1 as i32, hi1 as i32, hi2 as i32, 0, 0]);
            }
            OrLong | OrLong2Addr => {
                self.new_lir(MachineOp::OrRRR, [lo1 as i32, lo1 as i32, lo2 as i32, 0, 0]);
                self.new_lir(MachineOp::OrRRR, [hi1 as i32, hi1 as i32, hi2 as i32, 0, 0]);
            }
            XorLong | XorLong2Addr => {
                self.new_lir(MachineOp::XorRRR, [lo1 as i32, lo1 as i32, lo2 as i32, 0, 0]);
                self.new_lir(MachineOp::XorRRR, [hi1 as i32, hi1 as i32, hi2 as i32, 0, 0]);
            }
            other => unreachable!("not a pairwise long opcode: {other}"),
        }
        self.free_temp(lo2);
        self.free_temp(hi2);
        self.store_sreg_wide(rep.defs[0], lo1, hi1);
        self.free_temp(lo1);
        self.free_temp(hi1);
    }

    fn gen_long_neg_not(&mut self, rep: &SsaRep, is_neg: bool) {
        let (lo, hi) = self.load_sreg_wide(rep.uses[0]);
        if is_neg {
            // value = 0 - value, computed into fresh zero pairs.
            let zlo = self.alloc_temp();
            let zhi = self.alloc_temp();
            self.load_constant(zlo, 0);
            self.load_constant(zhi, 0);
            if self.target.isa() == InstructionSet::Mips {
                let borrow = self.alloc_temp();
                self.new_lir(
                    MachineOp::SltuRRR,
                    [borrow as i32, zlo as i32, lo as i32, 0, 0],
                );
                self.new_lir(MachineOp::SubRRR, [zlo as i32, zlo as i32, lo as i32, 0, 0]);
                self.new_lir(MachineOp::SubRRR, [zhi as i32, zhi as i32, hi as i32, 0, 0]);
                self.new_lir(MachineOp::SubRRR, [zhi as i32, zhi as i32, borrow as i32, 0, 0]);
                self.free_temp(borrow);
            } else {
                self.new_lir(MachineOp::SubRRR, [zlo as i32, zlo as i32, lo as i32, 0, 0]);
                self.new_lir(MachineOp::SbcRRR, [zhi as i32, zhi as i32, hi as i32, 0, 0]);
            }
            self.store_sreg_wide(rep.defs[0], zlo, zhi);
            self.free_temp(zlo);
            self.free_temp(zhi);
        } else {
            self.new_lir(MachineOp::NotRR, [lo as i32, lo as i32, 0, 0, 0]);
            self.new_lir(MachineOp::NotRR, [hi as i32, hi as i32, 0, 0, 0]);
            self.store_sreg_wide(rep.defs[0], lo, hi);
        }
        self.free_temp(lo);
        self.free_temp(hi);
    }

    /// Wide-by-wide helper op: args in (a0,a1)/(a2?) pairs via out slots.
    fn gen_long_helper(&mut self, ep: QuickEntrypoint, rep: &SsaRep, wide_rhs: bool) {
        let regs = self.target.regs();
        let sp = regs.sp as i32;
        // Pairs through the out area; the helper ABI reads them there.
        let (lo1, hi1) = self.load_sreg_wide(rep.uses[0]);
        self.new_lir(MachineOp::StoreWordDisp, [lo1 as i32, sp, 0, 0, 0]);
        self.new_lir(MachineOp::StoreWordDisp, [hi1 as i32, sp, 4, 0, 0]);
        self.free_temp(lo1);
        self.free_temp(hi1);
        if wide_rhs {
            let (lo2, hi2) = self.load_sreg_wide(rep.uses[2]);
            self.new_lir(MachineOp::StoreWordDisp, [lo2 as i32, sp, 8, 0, 0]);
            self.new_lir(MachineOp::StoreWordDisp, [hi2 as i32, sp, 12, 0, 0]);
            self.free_temp(lo2);
            self.free_temp(hi2);
        }
        for (i, &arg) in regs.arg_regs.iter().enumerate().take(4) {
            self.new_lir(MachineOp::LoadWordDisp, [arg as i32, sp, 4 * i as i32, 0, 0]);
        }
        self.call_helper(ep, false);
        let (r0, r1) = (regs.ret0, regs.ret1);
        self.store_sreg_wide(rep.defs[0], r0, r1);
    }

    fn gen_long_shift(&mut self, ep: QuickEntrypoint, rep: &SsaRep) {
        let regs = self.target.regs();
        let sp = regs.sp as i32;
        let (lo, hi) = self.load_sreg_wide(rep.uses[0]);
        self.new_lir(MachineOp::StoreWordDisp, [lo as i32, sp, 0, 0, 0]);
        self.new_lir(MachineOp::StoreWordDisp, [hi as i32, sp, 4, 0, 0]);
        self.free_temp(lo);
        self.free_temp(hi);
        let shift = self.load_sreg(rep.uses[2]);
        self.new_lir(MachineOp::StoreWordDisp, [shift as i32, sp, 8, 0, 0]);
        self.free_temp(shift);
        for (i, &arg) in regs.arg_regs.iter().enumerate().take(3) {
            self.new_lir(MachineOp::LoadWordDisp, [arg as i32, sp, 4 * i as i32, 0, 0]);
        }
        self.call_helper(ep, false);
        let (r0, r1) = (regs.ret0, regs.ret1);
        self.store_sreg_wide(rep.defs[0], r0, r1);
    }

    fn gen_arith_float(&mut self, opcode: Opcode, rep: &SsaRep) {
        use Opcode::*;
        let op = match opcode {
            AddFloat | AddFloat2Addr => MachineOp::FAddS,
            SubFloat | SubFloat2Addr => MachineOp::FSubS,
            MulFloat | MulFloat2Addr => MachineOp::FMulS,
            _ => MachineOp::FDivS,
        };
        let lhs = self.load_fp(rep.uses[0]);
        let rhs = self.load_fp(rep.uses[1]);
        let dst = self.alloc_fp_temp();
        self.new_lir(op, [dst as i32, lhs as i32, rhs as i32, 0, 0]);
        self.store_fp(rep.defs[0], dst);
        self.free_fp_temp(dst);
        self.free_fp_temp(lhs);
        self.free_fp_temp(rhs);
    }

    fn gen_arith_double(&mut self, opcode: Opcode, rep: &SsaRep) {
        use Opcode::*;
        let op = match opcode {
            AddDouble | AddDouble2Addr => MachineOp::FAddD,
            SubDouble | SubDouble2Addr => MachineOp::FSubD,
            MulDouble | MulDouble2Addr => MachineOp::FMulD,
            _ => MachineOp::FDivD,
        };
        let lhs = self.load_fp_wide(rep.uses[0]);
        let rhs = self.load_fp_wide(rep.uses[2]);
        let dst = self.alloc_fp_temp_pair();
        self.new_lir(op, [dst as i32, lhs as i32, rhs as i32, 0, 0]);
        self.store_fp_wide(rep.defs[0], dst);
    }

    fn gen_fp_rem(&mut self, ep: QuickEntrypoint, rep: &SsaRep, wide: bool) {
        if wide {
            self.gen_long_helper(ep, rep, true);
        } else {
            let regs = self.target.regs();
            let (arg0, arg1, ret0) = (regs.arg_regs[0], regs.arg_regs[1], regs.ret0);
            let lhs = self.load_sreg(rep.uses[0]);
            let rhs = self.load_sreg(rep.uses[1]);
            if lhs != arg0 {
                self.new_lir(MachineOp::MovRR, [arg0 as i32, lhs as i32, 0, 0, 0]);
            }
            if rhs != arg1 {
                self.new_lir(MachineOp::MovRR, [arg1 as i32, rhs as i32, 0, 0, 0]);
            }
            self.call_helper(ep, false);
            self.store_sreg(rep.defs[0], ret0);
        }
    }

    fn gen_fp_cvt(&mut self, op: MachineOp, rep: &SsaRep, src_wide: bool, dst_wide: bool) {
        use MachineOp::*;
        let src_is_core = matches!(op, FCvtIS | FCvtID);
        let dst_is_core = matches!(op, FCvtSI | FCvtDI);
        let src = if src_is_core {
            let core = self.load_sreg(rep.uses[0]);
            let fp = self.alloc_fp_temp();
            self.new_lir(FMovCoreFp, [fp as i32, core as i32, 0, 0, 0]);
            self.free_temp(core);
            fp
        } else if src_wide {
            self.load_fp_wide(rep.uses[0])
        } else {
            self.load_fp(rep.uses[0])
        };
        let dst = if dst_wide {
            self.alloc_fp_temp_pair()
        } else {
            self.alloc_fp_temp()
        };
        self.new_lir(op, [dst as i32, src as i32, 0, 0, 0]);
        if dst_is_core {
            let core = self.alloc_temp();
            self.new_lir(FMovFpCore, [core as i32, dst as i32, 0, 0, 0]);
            self.store_sreg(rep.defs[0], core);
            self.free_temp(core);
        } else if dst_wide {
            self.store_fp_wide(rep.defs[0], dst);
        } else {
            self.store_fp(rep.defs[0], dst);
        }
    }

    fn gen_fp_to_long_helper(&mut self, ep: QuickEntrypoint, rep: &SsaRep, src_wide: bool) {
        let regs = self.target.regs();
        let sp = regs.sp as i32;
        if src_wide {
            let (lo, hi) = self.load_sreg_wide(rep.uses[0]);
            self.new_lir(MachineOp::StoreWordDisp, [lo as i32, sp, 0, 0, 0]);
            self.new_lir(MachineOp::StoreWordDisp, [hi as i32, sp, 4, 0, 0]);
            self.free_temp(lo);
            self.free_temp(hi);
            for (i, &arg) in regs.arg_regs.iter().enumerate().take(2) {
                self.new_lir(MachineOp::LoadWordDisp, [arg as i32, sp, 4 * i as i32, 0, 0]);
            }
        } else {
            let src = self.load_sreg(rep.uses[0]);
            let arg0 = regs.arg_regs[0];
            if src != arg0 {
                self.new_lir(MachineOp::MovRR, [arg0 as i32, src as i32, 0, 0, 0]);
            }
            self.free_temp(src);
        }
        self.call_helper(ep, false);
        let (r0, r1) = (regs.ret0, regs.ret1);
        self.store_sreg_wide(rep.defs[0], r0, r1);
    }

    fn gen_long_to_fp(&mut self, rep: &SsaRep, to_double: bool) {
        // Exact rounding lives in the runtime conversion helpers.
        let ep = if to_double {
            QuickEntrypoint::L2d
        } else {
            QuickEntrypoint::L2f
        };
        let regs = self.target.regs();
        let sp = regs.sp as i32;
        let (lo, hi) = self.load_sreg_wide(rep.uses[0]);
        self.new_lir(MachineOp::StoreWordDisp, [lo as i32, sp, 0, 0, 0]);
        self.new_lir(MachineOp::StoreWordDisp, [hi as i32, sp, 4, 0, 0]);
        self.free_temp(lo);
        self.free_temp(hi);
        for (i, &arg) in regs.arg_regs.iter().enumerate().take(2) {
            self.new_lir(MachineOp::LoadWordDisp, [arg as i32, sp, 4 * i as i32, 0, 0]);
        }
        self.call_helper(ep, false);
        if to_double {
            let (r0, r1) = (regs.ret0, regs.ret1);
            self.store_sreg_wide(rep.defs[0], r0, r1);
        } else {
            self.store_sreg(rep.defs[0], regs.ret0);
        }
    }

    fn gen_int_narrow(&mut self, rep: &SsaRep, bits: i32, signed: bool) {
        let src = self.load_sreg(rep.uses[0]);
        let dst = self.alloc_temp();
        self.emit_rri(MachineOp::LslRRI, dst, src, bits);
        let shift_back = if signed {
            MachineOp::AsrRRI
        } else {
            MachineOp::LsrRRI
        };
        self.new_lir(shift_back, [dst as i32, dst as i32, bits, 0, 0]);
        self.store_sreg(rep.defs[0], dst);
        self.free_temp(dst);
    }
}
