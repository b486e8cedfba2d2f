//! MIR optimizer passes, run in pipeline order after SSA.

use lantern_arena::BitVector;
use lantern_asm::dataflow::df;
use lantern_asm::{AccessFlags, Opcode};
use tracing::{info, trace};

use super::{
    BlockId, BlockType, ExtOp, LocalValueNumbering, MirFlags, MirGraph, MirId, MirMeta, MirOp,
};
use crate::{DisableOpt, EnableDebug, InstructionSet, SReg};

/// Condition code carried by a fused compare-and-branch in `args[0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum ConditionCode {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectKind {
    None,
    Const,
    Move,
    Goto,
}

impl MirGraph {
    /// Make the common case the fall-through path: a block that exists only
    /// to throw, reached by the taken edge of a conditional branch, gets the
    /// branch flipped so the throw leaves the hot path.
    pub fn code_layout(&mut self) {
        for bb in 0..self.num_blocks() as BlockId {
            self.layout_block(bb);
        }
    }

    fn layout_block(&mut self, bb: BlockId) {
        if !self.block(bb).explicit_throw {
            return;
        }
        let mut walker = bb;
        loop {
            if self.block(walker).block_type == BlockType::Entry
                || self.predecessor_count(walker) != 1
            {
                break;
            }
            let prev = self.block(walker).predecessors.get(0);
            if self.block(prev).conditional_branch {
                if self.block(prev).fall_through == Some(walker) {
                    break; // already laid out
                }
                debug_assert_eq!(self.block(prev).taken, Some(walker));
                let branch = self.block(prev).last_mir.expect("conditional branch MIR");
                let opcode = self
                    .mir(branch)
                    .insn
                    .op
                    .code()
                    .expect("conditional branch opcode");
                self.mir_mut(branch).insn.op = MirOp::Code(opcode.negated_if());
                let prev_block = self.block_mut(prev);
                std::mem::swap(&mut prev_block.taken, &mut prev_block.fall_through);
                break;
            }
            walker = prev;
        }
    }

    /// Tag SSA names holding known 32/64-bit constants.
    pub fn propagate_constants(&mut self) {
        self.is_constant_v = BitVector::new(self.num_ssa_regs(), true);
        self.constant_values = vec![0; self.num_ssa_regs()];
        for bb in 0..self.num_blocks() as BlockId {
            self.do_constant_propagation(bb);
        }
    }

    fn do_constant_propagation(&mut self, bb: BlockId) {
        for mir in self.block_mirs(bb).collect::<Vec<_>>() {
            let insn = self.mir(mir).insn;
            let attrs = insn.op.dataflow_attrs();
            if attrs & df::HAS_DEFS == 0 {
                continue;
            }
            let Some(rep) = self.mir(mir).ssa_rep.clone() else {
                continue;
            };
            if attrs & df::SETS_CONST != 0 && rep.uses.is_empty() {
                let Some(code) = insn.op.code() else { continue };
                match code {
                    Opcode::Const4 | Opcode::Const16 | Opcode::Const => {
                        self.set_constant(rep.defs[0], insn.vb as i32);
                    }
                    Opcode::ConstHigh16 => {
                        self.set_constant(rep.defs[0], (insn.vb as i32) << 16);
                    }
                    Opcode::ConstWide16 | Opcode::ConstWide32 => {
                        self.set_constant_wide(rep.defs[0], insn.vb as i32 as i64);
                    }
                    Opcode::ConstWide => {
                        self.set_constant_wide(rep.defs[0], insn.vb_wide as i64);
                    }
                    Opcode::ConstWideHigh16 => {
                        self.set_constant_wide(rep.defs[0], (insn.vb as i64) << 48);
                    }
                    _ => {}
                }
            } else if attrs & df::IS_MOVE != 0 && !rep.uses.is_empty() {
                let wide = attrs & df::A_WIDE != 0;
                if wide {
                    if rep.uses.len() >= 2
                        && self.is_const(rep.uses[0])
                        && self.is_const(rep.uses[1])
                    {
                        let value = self.constant_value_wide(rep.uses[0]);
                        self.set_constant_wide(rep.defs[0], value);
                    }
                } else if self.is_const(rep.uses[0]) {
                    let value = self.constant_value(rep.uses[0]);
                    self.set_constant(rep.defs[0], value);
                }
            }
        }
    }

    /// Iterative forward null-check elimination over preorder DFS.
    pub fn null_check_elimination(&mut self) {
        if self
            .info
            .disable_opt
            .contains(DisableOpt::NULL_CHECK_ELIMINATION)
        {
            return;
        }
        for bb in 0..self.num_blocks() as BlockId {
            if let Some(df_info) = self.block_mut(bb).data_flow.as_mut() {
                df_info.ending_null_check_v = Some(BitVector::new(0, true));
            }
        }
        let order: Vec<BlockId> = self.dfs_order.as_slice().to_vec();
        let mut change = true;
        while change {
            change = false;
            for &bb in &order {
                change |= self.eliminate_null_checks(bb);
            }
        }
    }

    fn eliminate_null_checks(&mut self, bb: BlockId) -> bool {
        if self.block(bb).data_flow.is_none() {
            return false;
        }
        let mut state = BitVector::new(self.num_ssa_regs(), true);

        let block = self.block(bb);
        if block.block_type == BlockType::Entry || block.catch_entry {
            // Conservative start; only "this" is known non-null.
            if !self.info.access_flags.contains(AccessFlags::STATIC) {
                let this_reg = self.info.num_vregs - self.info.num_ins;
                state.set_bit(this_reg);
            }
        } else if block.predecessors.size() == 1 {
            let pred = block.predecessors.get(0);
            if let Some(pred_v) = self
                .block(pred)
                .data_flow
                .as_ref()
                .and_then(|d| d.ending_null_check_v.as_ref())
            {
                state.copy_from(pred_v);
            }
            if self.block(pred).block_type == BlockType::ByteCode {
                // A branch on zero teaches its surviving edge that the
                // tested reference is non-null.
                if let Some(last) = self.block(pred).last_mir {
                    let last_op = self.mir(last).insn.op.code();
                    let edge_learns = match last_op {
                        Some(Opcode::IfEqz) => self.block(pred).fall_through == Some(bb),
                        Some(Opcode::IfNez) => self.block(pred).taken == Some(bb),
                        _ => false,
                    };
                    if edge_learns {
                        if let Some(rep) = &self.mir(last).ssa_rep {
                            state.set_bit(rep.uses[0] as usize);
                        }
                    }
                }
            }
        } else {
            // Merge: intersect all incoming states.
            let preds: Vec<BlockId> = block.predecessors.as_slice().to_vec();
            let mut first = true;
            for pred in preds {
                let Some(pred_v) = self
                    .block(pred)
                    .data_flow
                    .as_ref()
                    .and_then(|d| d.ending_null_check_v.as_ref())
                else {
                    continue;
                };
                if first {
                    state.copy_from(pred_v);
                    first = false;
                } else {
                    state.intersect(pred_v);
                }
            }
        }

        for mir in self.block_mirs(bb).collect::<Vec<_>>() {
            let Some(rep) = self.mir(mir).ssa_rep.clone() else {
                continue;
            };
            let insn = self.mir(mir).insn;
            let attrs = insn.op.dataflow_attrs();

            if attrs & df::NON_NULL_DST != 0 && !rep.defs.is_empty() {
                state.set_bit(rep.defs[0] as usize);
            }

            if attrs & df::NON_NULL_RET != 0 {
                // The move-result-object consuming this call defines a
                // non-null reference.
                if let Some(move_result) = self.find_move_result(bb, mir) {
                    if self.mir(move_result).insn.op.code() == Some(Opcode::MoveResultObject) {
                        if let Some(mr_rep) = &self.mir(move_result).ssa_rep {
                            state.set_bit(mr_rep.defs[0] as usize);
                        }
                    }
                }
            }

            if attrs & (df::NULL_TRANSFER_0 | df::NULL_TRANSFER_N) != 0 && !rep.defs.is_empty() {
                let operands = if attrs & df::NULL_TRANSFER_0 != 0 {
                    1
                } else {
                    rep.uses.len()
                };
                let null_checked = rep.uses[..operands]
                    .iter()
                    .all(|&s| state.is_bit_set(s as usize));
                if null_checked {
                    state.set_bit(rep.defs[0] as usize);
                }
            }

            if attrs & df::HAS_NULL_CHKS != 0
                && !self.mir(mir).opt_flags.contains(MirFlags::IGNORE_NULL_CHECK)
            {
                let src_idx = if attrs & df::NULL_CHK_1 != 0 {
                    1
                } else if attrs & df::NULL_CHK_2 != 0 {
                    2
                } else {
                    0
                };
                let src_sreg = rep.uses[src_idx];
                if state.is_bit_set(src_sreg as usize) {
                    self.mir_mut(mir).opt_flags |= MirFlags::IGNORE_NULL_CHECK;
                } else {
                    state.set_bit(src_sreg as usize);
                }
            }
        }

        let df_info = self.block_mut(bb).data_flow.as_mut().expect("df info");
        let ending = df_info
            .ending_null_check_v
            .as_mut()
            .expect("ending null check set");
        let changed = !state.same_bits_set(ending);
        if changed {
            ending.copy_from(&state);
        }
        changed
    }

    /// Merge blocks whose terminating `Check` is provably redundant with
    /// their fall-through work half, killing the exception edge.
    pub fn basic_block_combine(&mut self) {
        let order: Vec<BlockId> = self.dfs_order.as_slice().to_vec();
        for bb in order {
            self.combine_blocks(bb);
        }
    }

    fn combine_blocks(&mut self, bb: BlockId) {
        loop {
            let block = self.block(bb);
            if block.first_mir.is_none()
                || block.data_flow.is_none()
                || matches!(
                    block.block_type,
                    BlockType::ExceptionHandling | BlockType::Exit | BlockType::Dead
                )
            {
                return;
            }
            let Some(taken) = block.taken else { return };
            if self.block(taken).block_type != BlockType::ExceptionHandling {
                return;
            }
            let last = self.block(bb).last_mir.expect("non-empty block");
            if self.mir(last).insn.op != MirOp::Ext(ExtOp::Check) {
                return;
            }
            let MirMeta::ThrowInsn(work) = self.mir(last).meta else {
                return;
            };
            let work_attrs = self.mir(work).insn.op.dataflow_attrs();
            let work_flags = self.mir(work).opt_flags;
            let mut can_combine = true;
            if work_attrs & df::HAS_NULL_CHKS != 0 {
                can_combine &= work_flags.contains(MirFlags::IGNORE_NULL_CHECK);
            }
            if work_attrs & df::HAS_RANGE_CHKS != 0 {
                can_combine &= work_flags.contains(MirFlags::IGNORE_RANGE_CHECK);
            }
            if !can_combine {
                return;
            }

            let bb_next = self.block(bb).fall_through.expect("work half");
            debug_assert!(!self.block(bb_next).catch_entry);
            debug_assert_eq!(self.predecessor_count(bb_next), 1);

            // Overwrite the check half with the real op.
            let work_mir = self.mir(work).clone();
            let work_next = self.mir(work).next;
            let prev = self.mir(last).prev;
            {
                let dst = self.mir_mut(last);
                dst.insn = work_mir.insn;
                dst.ssa_rep = work_mir.ssa_rep;
                dst.opt_flags = work_mir.opt_flags;
                dst.meta = MirMeta::None;
                dst.prev = prev;
                dst.next = work_next;
            }
            if let Some(next) = self.mir(last).next {
                self.mir_mut(next).prev = Some(last);
            }

            // Splice in the rest of the work block.
            let next_succ = self.block_mut(bb_next).successor_list.take();
            let next_ft = self.block(bb_next).fall_through;
            let next_taken = self.block(bb_next).taken;
            let next_last = self.block(bb_next).last_mir;
            let next_return = self.block(bb_next).terminated_by_return;

            let old_taken = self.block(bb).taken.expect("exception edge");
            self.block_mut(old_taken).block_type = BlockType::Dead;

            let block = self.block_mut(bb);
            block.successor_list = next_succ;
            block.fall_through = next_ft;
            block.taken = next_taken;
            block.terminated_by_return = next_return;
            if next_last != Some(work) {
                block.last_mir = next_last;
            } else {
                block.last_mir = Some(last);
            }

            for succ in self.successors(bb) {
                self.replace_pred_after_combine(succ, bb_next, bb);
            }

            self.block_mut(bb_next).block_type = BlockType::Dead;
            self.block_id_map.insert(bb_next, bb);
            trace!(block = bb, merged = bb_next, "combined check pair");
        }
    }

    fn replace_pred_after_combine(&mut self, bb: BlockId, old: BlockId, new: BlockId) {
        let preds = &mut self.block_mut(bb).predecessors;
        for i in 0..preds.size() {
            if preds.get(i) == old {
                preds.put(i, new);
            }
        }
    }

    /// Extended-basic-block optimizations: local value numbering,
    /// compare-branch fusion, suspend-check suppression and diamond select.
    pub fn basic_block_optimization(&mut self) {
        if self.info.disable_opt.contains(DisableOpt::BB_OPT) {
            return;
        }
        let heads = self.build_extended_bb_list();
        for head in heads {
            self.basic_block_opt(head);
        }
    }

    /// Chain blocks with single-predecessor fall-throughs into extended
    /// basic blocks; marks return-dominating chains.
    fn build_extended_bb_list(&mut self) -> Vec<BlockId> {
        self.clear_all_visited_flags();
        let mut heads = Vec::new();
        let order: Vec<BlockId> = self.dfs_order.as_slice().to_vec();
        for bb in order {
            if self.block(bb).visited || self.block(bb).hidden {
                continue;
            }
            heads.push(bb);
            let mut chain = Vec::new();
            let mut cursor = Some(bb);
            let mut terminated_by_return = false;
            while let Some(cur) = cursor {
                self.block_mut(cur).visited = true;
                terminated_by_return |= self.block(cur).terminated_by_return;
                chain.push(cur);
                cursor = self.next_dominated_block(cur);
            }
            if terminated_by_return {
                for member in chain {
                    self.block_mut(member).dominates_return = true;
                }
            }
        }
        heads
    }

    fn next_dominated_block(&self, bb: BlockId) -> Option<BlockId> {
        let block = self.block(bb);
        if block.block_type == BlockType::Dead {
            return None;
        }
        let next = if block.taken.is_some() && block.fall_through.is_none() {
            let tk = block.taken.unwrap();
            match self.block(tk).block_type {
                BlockType::ByteCode | BlockType::Exit => Some(tk),
                _ => None,
            }
        } else if block.taken.is_none() {
            block.fall_through
        } else {
            None
        };
        let next = next?;
        if self.block(next).visited || self.predecessor_count(next) != 1 {
            return None;
        }
        Some(next)
    }

    fn basic_block_opt(&mut self, head: BlockId) {
        if self.block(head).block_type == BlockType::Dead {
            return;
        }
        let mut lvn = LocalValueNumbering::new();
        let mut bb = Some(head);
        while let Some(cur) = bb {
            for mir in self.block_mirs(cur).collect::<Vec<_>>() {
                let _ = lvn.get_value_number(self, mir);
                let opcode = self.mir(mir).insn.op;
                match opcode.code() {
                    Some(
                        Opcode::CmplFloat
                        | Opcode::CmplDouble
                        | Opcode::CmpgFloat
                        | Opcode::CmpgDouble
                        | Opcode::CmpLong,
                    ) => self.try_fuse_compare(cur, mir),
                    Some(
                        Opcode::Goto
                        | Opcode::Goto16
                        | Opcode::Goto32
                        | Opcode::IfEq
                        | Opcode::IfNe
                        | Opcode::IfLt
                        | Opcode::IfGe
                        | Opcode::IfGt
                        | Opcode::IfLe
                        | Opcode::IfEqz
                        | Opcode::IfNez
                        | Opcode::IfLtz
                        | Opcode::IfGez
                        | Opcode::IfGtz
                        | Opcode::IfLez,
                    ) => {
                        // A backwards branch into a return-dominating region
                        // needs no suspend check.
                        let taken = self.block(cur).taken;
                        let ft = self.block(cur).fall_through;
                        let suppress = (self.is_backedge(cur, taken)
                            && taken.map(|t| self.block(t).dominates_return).unwrap_or(false))
                            || (self.is_backedge(cur, ft)
                                && ft.map(|t| self.block(t).dominates_return).unwrap_or(false));
                        if suppress {
                            self.mir_mut(mir).opt_flags |= MirFlags::IGNORE_SUSPEND_CHECK;
                            trace!(
                                offset = self.mir(mir).offset,
                                "suppressed suspend check on branch to return"
                            );
                        }
                    }
                    _ => {}
                }
                if self.info.isa == InstructionSet::Thumb2
                    && matches!(
                        self.mir(mir).insn.op.code(),
                        Some(Opcode::IfEqz | Opcode::IfNez)
                    )
                {
                    self.try_select(cur, mir);
                }
            }
            bb = self.next_dominated_block(cur);
        }
    }

    /// Fuse a float/long compare into the immediately following zero-branch
    /// when the compare's result is used only there.
    fn try_fuse_compare(&mut self, _bb: BlockId, mir: MirId) {
        if self.info.disable_opt.contains(DisableOpt::BRANCH_FUSING) {
            return;
        }
        let Some(next) = self.mir(mir).next else { return };
        let ccode = match self.mir(next).insn.op.code() {
            Some(Opcode::IfEqz) => ConditionCode::Eq,
            Some(Opcode::IfNez) => ConditionCode::Ne,
            Some(Opcode::IfLtz) => ConditionCode::Lt,
            Some(Opcode::IfGez) => ConditionCode::Ge,
            Some(Opcode::IfGtz) => ConditionCode::Gt,
            Some(Opcode::IfLez) => ConditionCode::Le,
            _ => return,
        };
        let def = {
            let rep = self.mir(mir).ssa_rep.as_ref().expect("cmp ssa rep");
            rep.defs[0]
        };
        let next_use = {
            let rep = self.mir(next).ssa_rep.as_ref().expect("if ssa rep");
            rep.uses[0]
        };
        if def != next_use || self.raw_use_count(def) != 1 {
            return;
        }
        let fused = match self.mir(mir).insn.op.code().expect("cmp opcode") {
            Opcode::CmplFloat => ExtOp::FusedCmplFloat,
            Opcode::CmpgFloat => ExtOp::FusedCmpgFloat,
            Opcode::CmplDouble => ExtOp::FusedCmplDouble,
            Opcode::CmpgDouble => ExtOp::FusedCmpgDouble,
            Opcode::CmpLong => ExtOp::FusedCmpLong,
            other => unreachable!("not a fusible compare: {other}"),
        };
        // The branch inherits the compare's operands; the compare dies.
        let cmp_rep = self.mir(mir).ssa_rep.clone().expect("cmp ssa rep");
        {
            let next_mir = self.mir_mut(next);
            next_mir.insn.op = MirOp::Ext(fused);
            next_mir.insn.args[0] = ccode as u32;
            let rep = next_mir.ssa_rep.as_mut().expect("if ssa rep");
            rep.uses = cmp_rep.uses;
            rep.fp_use = cmp_rep.fp_use;
            rep.defs.clear();
            rep.fp_def.clear();
        }
        let original = self.mir(mir).insn.op;
        let cmp = self.mir_mut(mir);
        cmp.insn.op = MirOp::Ext(ExtOp::Nop);
        cmp.meta = MirMeta::OriginalOp(original);
        if let Some(rep) = cmp.ssa_rep.as_mut() {
            rep.uses.clear();
            rep.fp_use.clear();
            rep.defs.clear();
            rep.fp_def.clear();
        }
    }

    /// Rewrite the two-armed constant/move diamond into a `Select` MIR.
    ///
    /// After rewriting, `Select` reads as `dst = cond != 0 ? vB : vC`.  Both
    /// diamond orientations are recognized: the arm carrying the goto may be
    /// either edge of the branch.
    fn try_select(&mut self, bb: BlockId, mir: MirId) {
        let Some(ft) = self.block(bb).fall_through else {
            return;
        };
        let Some(tk) = self.block(bb).taken else {
            return;
        };
        if self.predecessor_count(tk) != 1 || self.predecessor_count(ft) != 1 {
            return;
        }
        let ft_ft = self.block(ft).fall_through;
        let ft_tk = self.block(ft).taken;
        let tk_ft = self.block(tk).fall_through;
        let tk_tk = self.block(tk).taken;
        // One arm branches to the join, the other falls into it.
        let (goto_arm, fall_arm, join) = if tk_ft.is_none() && ft_tk.is_none() && tk_tk == ft_ft
        {
            match tk_tk {
                Some(join) => (tk, ft, join),
                None => return,
            }
        } else if ft_ft.is_none() && tk_tk.is_none() && ft_tk == tk_ft {
            match ft_tk {
                Some(join) => (ft, tk, join),
                None => return,
            }
        } else {
            return;
        };

        // At minimum, the branch back to the join needs no suspend check.
        if let Some(last) = self.block(goto_arm).last_mir {
            if self.select_kind(last) == SelectKind::Goto {
                self.mir_mut(last).opt_flags |= MirFlags::IGNORE_SUSPEND_CHECK;
            }
        }

        // The goto arm holds assignment + goto; the falling arm just the
        // assignment.
        let (Some(fall_first), Some(fall_last)) =
            (self.block(fall_arm).first_mir, self.block(fall_arm).last_mir)
        else {
            return;
        };
        let (Some(goto_first), Some(goto_last)) =
            (self.block(goto_arm).first_mir, self.block(goto_arm).last_mir)
        else {
            return;
        };
        if fall_first != fall_last
            || goto_first == goto_last
            || self.mir(goto_first).next != Some(goto_last)
        {
            return;
        }
        let fall_kind = self.select_kind(fall_first);
        if !matches!(fall_kind, SelectKind::Move | SelectKind::Const)
            || fall_kind != self.select_kind(goto_first)
            || self.select_kind(goto_last) != SelectKind::Goto
        {
            return;
        }

        // "True" is the arm executed when the tested register is non-zero:
        // the fall-through edge of IF_EQZ, the taken edge of IF_NEZ.
        let (mut if_true, mut if_false) = (goto_first, fall_first);
        let true_is_ft = self.mir(mir).insn.op.code() == Some(Opcode::IfEqz);
        let goto_arm_is_ft = self.block(bb).fall_through == Some(goto_arm);
        if true_is_ft != goto_arm_is_ft {
            std::mem::swap(&mut if_true, &mut if_false);
        }

        let true_def = self.mir(if_true).ssa_rep.as_ref().expect("ssa rep").defs[0];
        let Some(phi) = self.find_phi(join, true_def) else {
            return;
        };
        if self.mir(if_true).insn.va != self.mir(if_false).insn.va {
            return;
        }
        let (tk, ft) = (goto_arm, fall_arm);

        let mut const_form = self.select_kind(if_true) == SelectKind::Const;
        if self.select_kind(if_true) == SelectKind::Move {
            let true_src = self.mir(if_true).ssa_rep.as_ref().expect("rep").uses[0];
            let false_src = self.mir(if_false).ssa_rep.as_ref().expect("rep").uses[0];
            if self.is_const(true_src) && self.is_const(false_src) {
                const_form = true;
                let tv = self.constant_value(true_src);
                let fv = self.constant_value(false_src);
                self.mir_mut(if_true).insn.vb = tv as u32;
                self.mir_mut(if_false).insn.vb = fv as u32;
            }
        }

        let cond_use = self.mir(mir).ssa_rep.as_ref().expect("rep").uses[0];
        let fp_def0 = self.mir(if_true).ssa_rep.as_ref().expect("rep").fp_def[0];
        {
            let sel = self.mir_mut(mir);
            sel.insn.op = MirOp::Ext(ExtOp::Select);
            let rep = sel.ssa_rep.as_mut().expect("rep");
            if const_form {
                // vB/vC carry the true/false constants.
                rep.uses = vec![cond_use];
                rep.fp_use = vec![false];
            } else {
                rep.uses = vec![cond_use, 0, 0]; // sources patched below
                rep.fp_use = vec![fp_def0; 3];
            }
            rep.defs = vec![0]; // patched below
            rep.fp_def = vec![fp_def0];
        }
        if const_form {
            let tv = self.mir(if_true).insn.vb;
            let fv = self.mir(if_false).insn.vb;
            let sel = self.mir_mut(mir);
            sel.insn.vb = tv;
            sel.insn.vc = fv;
        } else {
            let ts = self.mir(if_true).ssa_rep.as_ref().expect("rep").uses[0];
            let fs = self.mir(if_false).ssa_rep.as_ref().expect("rep").uses[0];
            let rep = self.mir_mut(mir).ssa_rep.as_mut().expect("rep");
            rep.uses[1] = ts;
            rep.uses[2] = fs;
        }

        // Take over the phi's destination; shrink or delete the phi.
        let phi_uses = self.mir(phi).ssa_rep.as_ref().expect("rep").uses.clone();
        if phi_uses.len() == 2 {
            let phi_def = self.mir(phi).ssa_rep.as_ref().expect("rep").defs[0];
            self.mir_mut(mir).ssa_rep.as_mut().expect("rep").defs[0] = phi_def;
            let original = self.mir(phi).insn.op;
            let phi_mir = self.mir_mut(phi);
            phi_mir.insn.op = MirOp::Ext(ExtOp::Nop);
            phi_mir.meta = MirMeta::OriginalOp(original);
        } else {
            let live_def = self.mir(if_true).ssa_rep.as_ref().expect("rep").defs[0];
            let dead_def = self.mir(if_false).ssa_rep.as_ref().expect("rep").defs[0];
            self.mir_mut(mir).ssa_rep.as_mut().expect("rep").defs[0] = live_def;
            let MirMeta::PhiIncoming(mut incoming) = self.mir(phi).meta.clone() else {
                return;
            };
            let rep = self.mir_mut(phi).ssa_rep.as_mut().expect("rep");
            for (i, u) in rep.uses.iter().enumerate() {
                if *u == live_def {
                    incoming[i] = bb;
                }
            }
            if let Some(pos) = rep.uses.iter().position(|&u| u == dead_def) {
                let last = rep.uses.len() - 1;
                rep.uses.swap(pos, last);
                incoming.swap(pos, last);
                rep.uses.pop();
                rep.fp_use.pop();
                incoming.pop();
            }
            self.mir_mut(phi).meta = MirMeta::PhiIncoming(incoming);
        }

        // Drop both arms; control falls through to the join.
        self.block_mut(bb).taken = None;
        self.block_mut(bb).fall_through = Some(join);
        self.block_mut(tk).block_type = BlockType::Dead;
        for arm_mir in self.block_mirs(ft).collect::<Vec<_>>() {
            let original = self.mir(arm_mir).insn.op;
            let m = self.mir_mut(arm_mir);
            m.insn.op = MirOp::Ext(ExtOp::Nop);
            m.meta = MirMeta::OriginalOp(original);
        }
        self.block_mut(ft).hidden = true;
        self.replace_pred_after_combine(join, ft, bb);
        self.block_mut(join).predecessors.delete(tk);
        trace!(block = bb, "rewrote diamond into select");
    }

    fn select_kind(&self, mir: MirId) -> SelectKind {
        match self.mir(mir).insn.op.code() {
            Some(
                Opcode::Move
                | Opcode::MoveObject
                | Opcode::Move16
                | Opcode::MoveObject16
                | Opcode::MoveFrom16
                | Opcode::MoveObjectFrom16,
            ) => SelectKind::Move,
            Some(Opcode::Const4 | Opcode::Const16 | Opcode::Const) => SelectKind::Const,
            Some(Opcode::Goto | Opcode::Goto16 | Opcode::Goto32) => SelectKind::Goto,
            _ => SelectKind::None,
        }
    }

    fn find_phi(&self, bb: BlockId, ssa_name: SReg) -> Option<MirId> {
        self.block_mirs(bb)
            .take_while(|&m| self.mir(m).insn.op == MirOp::Ext(ExtOp::Phi))
            .find(|&m| {
                self.mir(m)
                    .ssa_rep
                    .as_ref()
                    .map(|r| r.uses.contains(&ssa_name))
                    .unwrap_or(false)
            })
    }

    /// Count surviving vs eliminated checks; logged under
    /// `DUMP_CHECK_STATS`.
    pub fn dump_check_stats(&mut self) {
        if !self
            .info
            .enable_debug
            .contains(EnableDebug::DUMP_CHECK_STATS)
        {
            return;
        }
        let mut stats = super::CheckStats::default();
        for bb in 0..self.num_blocks() as BlockId {
            if self.block(bb).data_flow.is_none() {
                continue;
            }
            for mir in self.block_mirs(bb) {
                if self.mir(mir).ssa_rep.is_none() {
                    continue;
                }
                let attrs = self.mir(mir).insn.op.dataflow_attrs();
                let flags = self.mir(mir).opt_flags;
                if attrs & df::HAS_NULL_CHKS != 0 {
                    stats.null_checks += 1;
                    if flags.contains(MirFlags::IGNORE_NULL_CHECK) {
                        stats.null_checks_eliminated += 1;
                    }
                }
                if attrs & df::HAS_RANGE_CHKS != 0 {
                    stats.range_checks += 1;
                    if flags.contains(MirFlags::IGNORE_RANGE_CHECK) {
                        stats.range_checks_eliminated += 1;
                    }
                }
            }
        }
        self.checkstats = stats;
        info!(
            null_checks = stats.null_checks,
            null_eliminated = stats.null_checks_eliminated,
            range_checks = stats.range_checks,
            range_eliminated = stats.range_checks_eliminated,
            "check elimination stats"
        );
    }

    /// True when the optimizer suppressed the suspend check at `mir`.
    pub fn suspend_check_suppressed(&self, mir: MirId) -> bool {
        self.mir(mir)
            .opt_flags
            .contains(MirFlags::IGNORE_SUSPEND_CHECK)
    }
}
