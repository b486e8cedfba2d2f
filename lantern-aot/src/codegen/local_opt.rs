//! Local LIR optimizations: load/store elimination over must-alias frame
//! slots, load hoisting to hide memory latency, and removal of branches to
//! the next instruction.

use tracing::trace;

use super::Codegen;
use crate::lir::{
    alias_info_reg, alias_info_wide, LirId, LirOp, MachineOp, PseudoOp, ENCODE_ALL,
    ENCODE_FRAME_REG, ENCODE_HEAP_REF, ENCODE_LITERAL, ENCODE_MEM, IS_BRANCH, IS_LOAD, IS_STORE,
    USES_CCODES,
};
use crate::{DisableOpt, InstructionSet};

/// Hoisting scans at most this many earlier instructions.
const MAX_HOIST_DISTANCE: usize = 20;
/// Assumed load latency in slots.
const LD_LATENCY: usize = 2;
/// Extra slack after a load-load dependency.
const LDLD_DISTANCE: usize = 4;

fn check_reg_dep(use_mask: u64, def_mask: u64, check_use: u64, check_def: u64) -> bool {
    (def_mask & check_use) != 0 || ((use_mask | def_mask) & check_def) != 0
}

fn regs_clobber(info1: u32, info2: u32) -> bool {
    let reg1_lo = alias_info_reg(info1) as i32;
    let reg1_hi = reg1_lo + alias_info_wide(info1) as i32;
    let reg2_lo = alias_info_reg(info2) as i32;
    let reg2_hi = reg2_lo + alias_info_wide(info2) as i32;
    reg1_lo == reg2_lo || reg1_lo == reg2_hi || reg1_hi == reg2_lo
}

impl Codegen<'_> {
    /// Run both passes over the extent emitted for one block.
    pub(crate) fn apply_local_optimizations(&mut self, head: LirId, tail: LirId) {
        if head == tail {
            return;
        }
        if !self
            .graph
            .info
            .disable_opt
            .contains(DisableOpt::LOAD_STORE_ELIMINATION)
        {
            self.apply_load_store_elimination(head, tail);
        }
        if !self
            .graph
            .info
            .disable_opt
            .contains(DisableOpt::LOAD_HOISTING)
        {
            self.apply_load_hoisting(head, tail);
        }
    }

    fn same_reg_class(&self, reg1: i32, reg2: i32) -> bool {
        let fp_base = crate::target::FP_REG_BASE as i32;
        (reg1 >= fp_base) == (reg2 >= fp_base)
    }

    /// Top-down scan squashing redundant loads and sinking dead stores.
    fn apply_load_store_elimination(&mut self, head: LirId, tail: LirId) {
        if head == tail {
            return;
        }
        let mut this_id = self.lirs.get(tail).prev;
        while let Some(this_lir) = this_id {
            if this_lir == head {
                break;
            }
            let prev = self.lirs.get(this_lir).prev;
            if self.is_pseudo(this_lir) || self.lirs.get(this_lir).is_nop() {
                this_id = prev;
                continue;
            }
            let this_flags = self.lir_flags(this_lir);
            if this_flags & IS_BRANCH != 0 || this_flags & (IS_LOAD | IS_STORE) == 0 {
                this_id = prev;
                continue;
            }

            let native_reg = self.lirs.get(this_lir).operands[0];
            let is_this_load = this_flags & IS_LOAD != 0;
            let this_mem_mask =
                (self.lirs.get(this_lir).use_mask | self.lirs.get(this_lir).def_mask) & ENCODE_MEM;
            // Only frame and literal accesses can be fully disambiguated.
            if this_mem_mask & (ENCODE_LITERAL | ENCODE_FRAME_REG) == 0 {
                this_id = prev;
                continue;
            }
            let stop_def_mask = self.lirs.get(this_lir).def_mask & !ENCODE_MEM;
            let stop_use_mask = if self.target.isa() == InstructionSet::X86 {
                (IS_BRANCH | self.lirs.get(this_lir).use_mask) & !ENCODE_MEM
            } else {
                (self.target.pc_use_def_encoding() | self.lirs.get(this_lir).use_mask)
                    & !ENCODE_MEM
            };

            let mut sink_distance = 0usize;
            let mut check_id = self.lirs.get(this_lir).next;
            while let Some(check_lir) = check_id {
                if check_lir == tail {
                    break;
                }
                let next = self.lirs.get(check_lir).next;
                if self.is_pseudo(check_lir) || self.lirs.get(check_lir).is_nop() {
                    check_id = next;
                    continue;
                }
                let check_flags = self.lir_flags(check_lir);
                let check_mem_mask = (self.lirs.get(check_lir).use_mask
                    | self.lirs.get(check_lir).def_mask)
                    & ENCODE_MEM;
                let alias_condition = this_mem_mask & check_mem_mask;
                let mut stop_here = false;

                if check_mem_mask != ENCODE_MEM && alias_condition != 0 {
                    let is_check_load = check_flags & IS_LOAD != 0;
                    if alias_condition == ENCODE_LITERAL {
                        if self.lirs.get(check_lir).alias_info
                            == self.lirs.get(this_lir).alias_info
                            && self.same_reg_class(
                                self.lirs.get(check_lir).operands[0],
                                native_reg,
                            )
                        {
                            // Same literal already in a register.
                            self.squash_or_move(check_lir, native_reg);
                        }
                    } else if alias_condition == ENCODE_FRAME_REG {
                        if self.lirs.get(check_lir).alias_info
                            == self.lirs.get(this_lir).alias_info
                        {
                            let compatible = self.same_reg_class(
                                self.lirs.get(check_lir).operands[0],
                                native_reg,
                            );
                            if is_check_load {
                                if compatible {
                                    // RAR or RAW: the value is live in a reg.
                                    self.squash_or_move(check_lir, native_reg);
                                } else {
                                    stop_here = true;
                                }
                            } else if !is_this_load && !is_check_load {
                                // WAW: the earlier store is dead.
                                self.lirs.get_mut(this_lir).set_nop();
                                trace!("squashed dead store");
                                stop_here = true;
                            } else {
                                // WAR: register value killed.
                                stop_here = true;
                            }
                        } else if regs_clobber(
                            self.lirs.get(this_lir).alias_info,
                            self.lirs.get(check_lir).alias_info,
                        ) {
                            stop_here = true;
                        }
                    }
                    if stop_here {
                        // Fall through to the sink decision below.
                    } else if self.lirs.get(check_lir).is_nop() {
                        check_id = next;
                        continue;
                    }
                }

                if !stop_here {
                    stop_here = check_reg_dep(
                        stop_use_mask,
                        stop_def_mask,
                        self.lirs.get(check_lir).use_mask,
                        self.lirs.get(check_lir).def_mask,
                    );
                }

                if stop_here {
                    let mut check_lir = check_lir;
                    if self.target.isa() == InstructionSet::X86 {
                        // Don't sink a store between a flags producer and
                        // the branch that reads them.
                        let flags = self.lir_flags(check_lir);
                        if sink_distance > 0
                            && flags & IS_BRANCH != 0
                            && flags & USES_CCODES != 0
                        {
                            if let Some(p) = self.lirs.get(check_lir).prev {
                                check_lir = p;
                                sink_distance -= 1;
                            }
                        }
                    }
                    if sink_distance > 0 && !is_this_load {
                        // Sink the store just before the dependency.
                        let node = self.lirs.get(this_lir).clone();
                        let new_id =
                            self.lirs
                                .alloc(node.op, node.bc_offset, node.operands);
                        {
                            let fresh = self.lirs.get_mut(new_id);
                            fresh.use_mask = node.use_mask;
                            fresh.def_mask = node.def_mask;
                            fresh.alias_info = node.alias_info;
                            fresh.target = node.target;
                        }
                        self.lirs.insert_before(check_lir, new_id);
                        self.lirs.get_mut(this_lir).set_nop();
                        trace!("sank store past {sink_distance} instructions");
                    }
                    break;
                } else if !self.lirs.get(check_lir).is_nop() {
                    sink_distance += 1;
                }
                check_id = next;
            }
            this_id = prev;
        }
    }

    /// A later load of the same slot becomes a register move (or nothing).
    fn squash_or_move(&mut self, check_lir: LirId, native_reg: i32) {
        let check_reg = self.lirs.get(check_lir).operands[0];
        if check_reg != native_reg {
            let op = if check_reg >= crate::target::FP_REG_BASE as i32 {
                MachineOp::FMovRR
            } else {
                MachineOp::MovRR
            };
            let bc = self.lirs.get(check_lir).bc_offset;
            let mv = self.lirs.alloc(LirOp::Machine(op), bc, [check_reg, native_reg, 0, 0, 0]);
            self.lirs.get_mut(mv).def_mask = crate::lir::encode_reg(check_reg as u8);
            self.lirs.get_mut(mv).use_mask = crate::lir::encode_reg(native_reg as u8);
            self.lirs.insert_after(check_lir, mv);
        }
        self.lirs.get_mut(check_lir).set_nop();
        trace!("squashed redundant load");
    }

    /// Bottom-up scan moving loads earlier to hide their latency.
    fn apply_load_hoisting(&mut self, head: LirId, tail: LirId) {
        if head == tail {
            return;
        }
        let mut this_id = self.lirs.get(head).next;
        while let Some(this_lir) = this_id {
            if this_lir == tail {
                break;
            }
            let next = self.lirs.get(this_lir).next;
            if self.is_pseudo(this_lir)
                || self.lirs.get(this_lir).is_nop()
                || self.lir_flags(this_lir) & IS_LOAD == 0
            {
                this_id = next;
                continue;
            }

            let mut stop_use_all_mask = self.lirs.get(this_lir).use_mask;
            if self.target.isa() != InstructionSet::X86
                && stop_use_all_mask & ENCODE_HEAP_REF != 0
            {
                // Heap refs order against PC-relative forms too.
                stop_use_all_mask |= self.target.pc_use_def_encoding();
            }
            let stop_use_reg_mask = stop_use_all_mask & !ENCODE_MEM;
            let stop_def_reg_mask = self.lirs.get(this_lir).def_mask & !ENCODE_MEM;

            // Collect up to MAX_HOIST_DISTANCE independent predecessors.
            let mut prev_inst_list: Vec<LirId> = Vec::new();
            let mut stop_here = false;
            let mut check_id = self.lirs.get(this_lir).prev;
            while let Some(check_lir) = check_id {
                if check_lir == head {
                    break;
                }
                let prev = self.lirs.get(check_lir).prev;
                if self.lirs.get(check_lir).is_nop() {
                    check_id = prev;
                    continue;
                }
                let check_mem_mask = self.lirs.get(check_lir).def_mask & ENCODE_MEM;
                let alias_condition = stop_use_all_mask & check_mem_mask;
                stop_here = false;
                if check_mem_mask != ENCODE_MEM && alias_condition != 0 {
                    if alias_condition == ENCODE_FRAME_REG {
                        if self.lirs.get(check_lir).alias_info
                            == self.lirs.get(this_lir).alias_info
                            || regs_clobber(
                                self.lirs.get(this_lir).alias_info,
                                self.lirs.get(check_lir).alias_info,
                            )
                        {
                            stop_here = true;
                        }
                    } else {
                        // Heap refs may alias anything.
                        stop_here = true;
                    }
                    if stop_here {
                        prev_inst_list.push(check_lir);
                        break;
                    }
                }
                if !stop_here {
                    stop_here = check_reg_dep(
                        stop_use_reg_mask,
                        stop_def_reg_mask,
                        self.lirs.get(check_lir).use_mask,
                        self.lirs.get(check_lir).def_mask,
                    );
                }
                if stop_here || !self.is_pseudo(check_lir) {
                    prev_inst_list.push(check_lir);
                    if prev_inst_list.len() == MAX_HOIST_DISTANCE {
                        break;
                    }
                }
                if stop_here {
                    break;
                }
                check_id = prev;
            }

            if !stop_here && prev_inst_list.len() < MAX_HOIST_DISTANCE {
                prev_inst_list.push(head);
            }

            if prev_inst_list.len() >= 2 {
                let mut first_slot = prev_inst_list.len() as isize - 2;
                let dep_lir = prev_inst_list[prev_inst_list.len() - 1];
                if !self.is_pseudo(dep_lir) && self.lir_flags(dep_lir) & IS_LOAD != 0 {
                    first_slot -= LDLD_DISTANCE as isize;
                }
                let mut slot = first_slot;
                while slot >= 0 {
                    let cur_lir = prev_inst_list[slot as usize];
                    let prev_lir = prev_inst_list[slot as usize + 1];

                    if self.lirs.get(prev_lir).def_mask == ENCODE_ALL {
                        if self.lir_flags(cur_lir) & IS_LOAD != 0 {
                            slot -= 1;
                            continue;
                        }
                        if (slot as usize) < LD_LATENCY {
                            break;
                        }
                    }
                    // Never cross a barrier label or safepoint.
                    if matches!(
                        self.lirs.get(prev_lir).op,
                        LirOp::Pseudo(
                            PseudoOp::TargetLabel | PseudoOp::SafepointPc | PseudoOp::Barrier
                        )
                    ) {
                        break;
                    }
                    let prev_is_load = !self.is_pseudo(prev_lir)
                        && self.lir_flags(prev_lir) & IS_LOAD != 0;
                    if (prev_is_load
                        && self.lirs.get(cur_lir).use_mask & self.lirs.get(prev_lir).def_mask
                            != 0)
                        || (slot as usize) < LD_LATENCY
                    {
                        break;
                    }
                    slot -= 1;
                }

                if slot >= 0 {
                    let cur_lir = prev_inst_list[slot as usize];
                    let node = self.lirs.get(this_lir).clone();
                    let new_id = self.lirs.alloc(node.op, node.bc_offset, node.operands);
                    {
                        let fresh = self.lirs.get_mut(new_id);
                        fresh.use_mask = node.use_mask;
                        fresh.def_mask = node.def_mask;
                        fresh.alias_info = node.alias_info;
                        fresh.target = node.target;
                    }
                    self.lirs.insert_before(cur_lir, new_id);
                    self.lirs.get_mut(this_lir).set_nop();
                    trace!("hoisted load {} slots earlier", slot);
                }
            }
            this_id = next;
        }
    }

    /// NOP unconditional branches whose target is the next real LIR; run
    /// after offsets are first assigned.
    pub(crate) fn remove_redundant_branches(&mut self) {
        let ids: Vec<LirId> = self.lirs.iter().collect();
        for id in ids {
            let node = self.lirs.get(id);
            if node.is_nop() || node.op != LirOp::Machine(MachineOp::Br) {
                continue;
            }
            let Some(target) = node.target else { continue };
            // Walk forward over pseudo ops.
            let mut cursor = node.next;
            let mut redundant = false;
            while let Some(c) = cursor {
                if c == target {
                    redundant = true;
                    break;
                }
                if !self.is_pseudo(c) && !self.lirs.get(c).is_nop() {
                    break;
                }
                cursor = self.lirs.get(c).next;
            }
            if redundant {
                self.lirs.get_mut(id).set_nop();
                trace!("removed branch to next instruction");
            }
        }
    }

}
