//! Per-block use/def collection, SSA operand conversion and use counting.

use lantern_arena::BitVector;
use lantern_asm::dataflow::df;

use super::{BlockDataFlow, BlockId, MirGraph, SReg, SsaRep};
use crate::SSA_METHOD_BASEREG;

impl MirGraph {
    /// Allocate SSA bookkeeping and per-block dataflow records.
    pub(crate) fn initialize_ssa_conversion(&mut self) {
        let num_vregs = self.info.num_vregs;
        self.ssa_base_vregs = Vec::with_capacity(num_vregs + self.def_count + 32);
        self.ssa_subscripts = Vec::with_capacity(num_vregs + self.def_count + 32);
        // Name i is vreg i with subscript 0 on entry.
        for v in 0..num_vregs {
            self.ssa_base_vregs.push(v as SReg);
            self.ssa_subscripts.push(0);
            self.vreg_to_ssa_map[v] = v as SReg;
            self.ssa_last_defs[v] = 0;
        }
        self.method_sreg = self.add_new_sreg(SSA_METHOD_BASEREG);

        let num_blocks = self.num_blocks();
        for block in &mut self.blocks {
            block.data_flow = Some(BlockDataFlow {
                use_v: BitVector::new(num_vregs, false),
                def_v: BitVector::new(num_vregs, false),
                live_in_v: BitVector::new(num_vregs, false),
                phi_v: BitVector::new(num_blocks, false),
                vreg_to_ssa_map: Vec::new(),
                ending_null_check_v: None,
            });
        }
    }

    /// New SSA name for `v_reg` (which may be a negative special base).
    pub(crate) fn add_new_sreg(&mut self, v_reg: SReg) -> SReg {
        let ssa_reg = self.ssa_base_vregs.len() as SReg;
        self.ssa_base_vregs.push(v_reg);
        if v_reg >= 0 {
            self.ssa_last_defs[v_reg as usize] += 1;
            self.ssa_subscripts.push(self.ssa_last_defs[v_reg as usize]);
            self.vreg_to_ssa_map[v_reg as usize] = ssa_reg;
        } else {
            self.ssa_subscripts.push(0);
        }
        ssa_reg
    }

    /// Collect block-local use/def/live-in vregs for every block.
    pub(crate) fn find_local_live_in(&mut self, bb: BlockId) {
        let Some(df_info) = self.block(bb).data_flow.clone() else {
            return;
        };
        let mut use_v = df_info.use_v;
        let mut def_v = df_info.def_v;
        let mut live_in_v = df_info.live_in_v;

        let mut handle_use = |use_v: &mut BitVector, def_v: &BitVector, live: &mut BitVector, v: u32| {
            use_v.set_bit(v as usize);
            if !def_v.is_bit_set(v as usize) {
                live.set_bit(v as usize);
            }
        };

        for mir in self.block_mirs(bb).collect::<Vec<_>>() {
            let insn = self.mir(mir).insn;
            let attrs = insn.op.dataflow_attrs();
            if attrs & df::HAS_USES != 0 {
                if attrs & df::UA != 0 {
                    handle_use(&mut use_v, &def_v, &mut live_in_v, insn.va);
                    if attrs & df::A_WIDE != 0 {
                        handle_use(&mut use_v, &def_v, &mut live_in_v, insn.va + 1);
                    }
                }
                if attrs & df::UB != 0 {
                    handle_use(&mut use_v, &def_v, &mut live_in_v, insn.vb);
                    if attrs & df::B_WIDE != 0 {
                        handle_use(&mut use_v, &def_v, &mut live_in_v, insn.vb + 1);
                    }
                }
                if attrs & df::UC != 0 {
                    handle_use(&mut use_v, &def_v, &mut live_in_v, insn.vc);
                    if attrs & df::C_WIDE != 0 {
                        handle_use(&mut use_v, &def_v, &mut live_in_v, insn.vc + 1);
                    }
                }
            }
            if attrs & df::FORMAT_35C != 0 {
                for i in 0..insn.va as usize {
                    handle_use(&mut use_v, &def_v, &mut live_in_v, insn.args[i]);
                }
            }
            if attrs & df::FORMAT_3RC != 0 {
                for i in 0..insn.va {
                    handle_use(&mut use_v, &def_v, &mut live_in_v, insn.vc + i);
                }
            }
            if attrs & df::HAS_DEFS != 0 {
                def_v.set_bit(insn.va as usize);
                if attrs & df::A_WIDE != 0 {
                    def_v.set_bit(insn.va as usize + 1);
                }
                self.def_count += if attrs & df::A_WIDE != 0 { 2 } else { 1 };
            }
        }

        let df_info = self.block_mut(bb).data_flow.as_mut().expect("df info");
        df_info.use_v = use_v;
        df_info.def_v = def_v;
        df_info.live_in_v = live_in_v;
    }

    /// Rewrite one block's MIRs to SSA uses/defs using the current rename
    /// map.  Call order is managed by the renaming walk.
    pub(crate) fn do_ssa_conversion(&mut self, bb: BlockId) {
        for mir in self.block_mirs(bb).collect::<Vec<_>>() {
            let insn = self.mir(mir).insn;
            let attrs = insn.op.dataflow_attrs();

            let mut rep = SsaRep::default();
            let fp_a = attrs & df::FP_A != 0;
            let fp_b = attrs & df::FP_B != 0;
            let fp_c = attrs & df::FP_C != 0;

            let mut push_use = |rep: &mut SsaRep, map: &[SReg], v: u32, fp: bool| {
                rep.uses.push(map[v as usize]);
                rep.fp_use.push(fp);
            };

            if attrs & df::FORMAT_35C != 0 {
                for i in 0..insn.va as usize {
                    push_use(&mut rep, &self.vreg_to_ssa_map, insn.args[i], false);
                }
            } else if attrs & df::FORMAT_3RC != 0 {
                for i in 0..insn.va {
                    push_use(&mut rep, &self.vreg_to_ssa_map, insn.vc + i, false);
                }
            } else {
                if attrs & df::UA != 0 {
                    push_use(&mut rep, &self.vreg_to_ssa_map, insn.va, fp_a);
                    if attrs & df::A_WIDE != 0 {
                        push_use(&mut rep, &self.vreg_to_ssa_map, insn.va + 1, fp_a);
                    }
                }
                if attrs & df::UB != 0 {
                    push_use(&mut rep, &self.vreg_to_ssa_map, insn.vb, fp_b);
                    if attrs & df::B_WIDE != 0 {
                        push_use(&mut rep, &self.vreg_to_ssa_map, insn.vb + 1, fp_b);
                    }
                }
                if attrs & df::UC != 0 {
                    push_use(&mut rep, &self.vreg_to_ssa_map, insn.vc, fp_c);
                    if attrs & df::C_WIDE != 0 {
                        push_use(&mut rep, &self.vreg_to_ssa_map, insn.vc + 1, fp_c);
                    }
                }
            }

            if attrs & df::HAS_DEFS != 0 {
                rep.defs.push(self.add_new_sreg(insn.va as SReg));
                rep.fp_def.push(fp_a);
                if attrs & df::A_WIDE != 0 {
                    rep.defs.push(self.add_new_sreg(insn.va as SReg + 1));
                    rep.fp_def.push(fp_a);
                }
            }

            self.mir_mut(mir).ssa_rep = Some(rep);
        }

        // Snapshot the rename map; phi-operand fill reads it per edge.
        let snapshot = self.vreg_to_ssa_map.clone();
        self.block_mut(bb)
            .data_flow
            .as_mut()
            .expect("df info")
            .vreg_to_ssa_map = snapshot;
    }

    /// Count uses of every SSA name, weighted by loop nesting.
    pub fn method_use_count(&mut self) {
        self.use_counts.reset();
        self.raw_use_counts.reset();
        for _ in 0..self.num_ssa_regs() {
            self.use_counts.insert(0);
            self.raw_use_counts.insert(0);
        }
        let block_ids: Vec<BlockId> = self.dfs_order.as_slice().to_vec();
        for bb in block_ids {
            if self.block(bb).block_type != super::BlockType::ByteCode {
                continue;
            }
            let weight = self.block(bb).nesting_depth.min(16) as u32;
            for mir in self.block_mirs(bb).collect::<Vec<_>>() {
                let Some(rep) = self.mir(mir).ssa_rep.clone() else {
                    continue;
                };
                for &s_reg in &rep.uses {
                    self.raw_use_counts.increment(s_reg as usize);
                    let old = self.use_counts.get(s_reg as usize);
                    self.use_counts.put(s_reg as usize, old + (1 << weight));
                }
            }
        }
    }

    /// Debug-only predecessor consistency check: every block must be listed
    /// as a successor of each of its predecessors.
    pub(crate) fn verify_pred_info(&self) -> bool {
        for block in &self.blocks {
            if block.hidden || block.block_type == super::BlockType::Dead {
                continue;
            }
            for pred in block.predecessors.iter() {
                if !self.successors(pred).contains(&block.id) {
                    return false;
                }
            }
        }
        true
    }

}
