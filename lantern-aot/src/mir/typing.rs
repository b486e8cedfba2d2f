//! Per-SSA-name location records and iterative type/width inference.

use lantern_asm::dataflow::df;
use lantern_asm::Opcode;
use tracing::debug;

use super::{BlockId, BlockType, ExtOp, MirGraph, MirOp};
use crate::{DisableOpt, SReg};

/// Where a value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegLocationType {
    /// Home frame slot.
    Frame,
    /// Promoted to a physical register.
    PhysReg,
    /// Compiler-introduced temp.
    CompilerTemp,
    /// Not a value.
    Invalid,
}

/// "No physical register assigned."
pub const INVALID_REG: u8 = 0xff;

/// Location and inferred type of one SSA name.
///
/// Types are inferred, not declared: the same frame slot may hold a float in
/// one path and an int in another, and the inference keeps booleans for each
/// evidence kind rather than a single tag.
#[derive(Debug, Clone, Copy)]
pub struct RegLocation {
    /// Storage class.
    pub location: RegLocationType,
    /// Occupies a register pair.
    pub wide: bool,
    /// Some type evidence seen.
    pub defined: bool,
    /// Known-constant value.
    pub is_const: bool,
    /// Used as floating point.
    pub fp: bool,
    /// Used as non-FP scalar.
    pub core: bool,
    /// Holds a GC-visible reference.
    pub ref_: bool,
    /// High word of a wide pair.
    pub high_word: bool,
    /// Describes the home location.
    pub home: bool,
    /// Low physical register when promoted.
    pub low_reg: u8,
    /// High physical register when promoted and wide.
    pub high_reg: u8,
    /// The SSA name this record describes.
    pub s_reg_low: SReg,
    /// Original SSA name, before any renumbering.
    pub orig_sreg: SReg,
}

impl RegLocation {
    /// An invalid location.
    pub fn bad() -> Self {
        RegLocation {
            location: RegLocationType::Invalid,
            wide: false,
            defined: false,
            is_const: false,
            fp: false,
            core: false,
            ref_: false,
            high_word: false,
            home: false,
            low_reg: INVALID_REG,
            high_reg: INVALID_REG,
            s_reg_low: crate::INVALID_SREG,
            orig_sreg: crate::INVALID_SREG,
        }
    }

    fn frame(s_reg: SReg) -> Self {
        RegLocation {
            location: RegLocationType::Frame,
            s_reg_low: s_reg,
            orig_sreg: s_reg,
            ..RegLocation::bad()
        }
    }
}

impl MirGraph {
    /// Allocate one location record per SSA name and run inference.
    pub fn build_reg_locations(&mut self) {
        let num = self.num_ssa_regs();
        self.reg_locations = (0..num).map(|i| RegLocation::frame(i as SReg)).collect();
        for i in 0..num {
            self.reg_locations[i].is_const = self.is_const(i as SReg);
        }
        let method_sreg = self.method_sreg() as usize;
        if method_sreg < num {
            let loc = &mut self.reg_locations[method_sreg];
            loc.ref_ = true;
            loc.defined = true;
        }
        self.infer_types();
    }

    /// Iterative fixpoint over preorder DFS refining fp/core/ref/wide bits.
    /// The lattice only moves upward so a handful of passes suffice.
    fn infer_types(&mut self) {
        let order: Vec<BlockId> = self.dfs_order.as_slice().to_vec();
        let mut changed = true;
        while changed {
            changed = false;
            for &bb in &order {
                changed |= self.infer_types_in_block(bb);
            }
        }
    }

    fn set_fp(&mut self, index: SReg, is_fp: bool) -> bool {
        let loc = &mut self.reg_locations[index as usize];
        if is_fp && !loc.fp {
            loc.fp = true;
            loc.defined = true;
            return true;
        }
        false
    }

    fn set_core(&mut self, index: SReg, is_core: bool) -> bool {
        let loc = &mut self.reg_locations[index as usize];
        if is_core && !loc.defined {
            loc.core = true;
            loc.defined = true;
            return true;
        }
        false
    }

    fn set_ref(&mut self, index: SReg, is_ref: bool) -> bool {
        let loc = &mut self.reg_locations[index as usize];
        if is_ref && !loc.defined {
            loc.ref_ = true;
            loc.defined = true;
            return true;
        }
        false
    }

    fn set_wide(&mut self, index: SReg, is_wide: bool) -> bool {
        let loc = &mut self.reg_locations[index as usize];
        if is_wide && !loc.wide {
            loc.wide = true;
            return true;
        }
        false
    }

    fn set_high(&mut self, index: SReg, is_high: bool) -> bool {
        let loc = &mut self.reg_locations[index as usize];
        if is_high && !loc.high_word {
            loc.high_word = true;
            return true;
        }
        false
    }

    fn infer_types_in_block(&mut self, bb: BlockId) -> bool {
        let block_type = self.block(bb).block_type;
        if block_type != BlockType::ByteCode && block_type != BlockType::Entry {
            return false;
        }
        let mut changed = false;
        for mir in self.block_mirs(bb).collect::<Vec<_>>() {
            let Some(rep) = self.mir(mir).ssa_rep.clone() else {
                continue;
            };
            let insn = self.mir(mir).insn;
            let attrs = insn.op.dataflow_attrs();

            // Defs.
            if attrs & df::DA != 0 && !rep.defs.is_empty() {
                changed |= self.set_core(rep.defs[0], attrs & df::CORE_A != 0);
                changed |= self.set_ref(rep.defs[0], attrs & df::REF_A != 0);
                changed |= self.set_fp(rep.defs[0], attrs & df::FP_A != 0);
                if attrs & df::A_WIDE != 0 && rep.defs.len() > 1 {
                    changed |= self.set_wide(rep.defs[0], true);
                    changed |= self.set_wide(rep.defs[1], true);
                    changed |= self.set_high(rep.defs[1], true);
                }
            }

            // Uses, in operand order.
            let mut next = 0usize;
            let mut handle_use = |graph: &mut MirGraph,
                                  next: &mut usize,
                                  wide: bool,
                                  core: bool,
                                  reff: bool,
                                  fp: bool|
             -> bool {
                let mut ch = false;
                if *next >= rep.uses.len() {
                    return false;
                }
                ch |= graph.set_core(rep.uses[*next], core);
                ch |= graph.set_ref(rep.uses[*next], reff);
                ch |= graph.set_fp(rep.uses[*next], fp);
                if wide && *next + 1 < rep.uses.len() {
                    ch |= graph.set_wide(rep.uses[*next], true);
                    ch |= graph.set_wide(rep.uses[*next + 1], true);
                    ch |= graph.set_high(rep.uses[*next + 1], true);
                    *next += 2;
                } else {
                    *next += 1;
                }
                ch
            };
            if attrs & df::UA != 0 {
                changed |= handle_use(
                    self,
                    &mut next,
                    attrs & df::A_WIDE != 0,
                    attrs & df::CORE_A != 0,
                    attrs & df::REF_A != 0,
                    attrs & df::FP_A != 0,
                );
            }
            if attrs & df::UB != 0 {
                changed |= handle_use(
                    self,
                    &mut next,
                    attrs & df::B_WIDE != 0,
                    attrs & df::CORE_B != 0,
                    attrs & df::REF_B != 0,
                    attrs & df::FP_B != 0,
                );
            }
            if attrs & df::UC != 0 {
                changed |= handle_use(
                    self,
                    &mut next,
                    attrs & df::C_WIDE != 0,
                    attrs & df::CORE_C != 0,
                    attrs & df::REF_C != 0,
                    attrs & df::FP_C != 0,
                );
            }

            // Returns type through the method shorty.
            if matches!(
                insn.op.code(),
                Some(Opcode::Return | Opcode::ReturnWide | Opcode::ReturnObject)
            ) {
                let ret_char = self.info.shorty.as_bytes()[0];
                changed |= self.apply_shorty_char(ret_char, &rep.uses, 0);
            }

            // Invoke argument and result types through the target shorty.
            if attrs & (df::FORMAT_35C | df::FORMAT_3RC) != 0 {
                changed |= self.infer_invoke_types(bb, mir, &rep.uses);
            }

            // Copies and phis union the evidence of all operands.
            if attrs & (df::IS_MOVE | df::NULL_TRANSFER_N) != 0 && !rep.defs.is_empty() {
                let is_phi = insn.op == MirOp::Ext(ExtOp::Phi);
                let mut loc = self.reg_locations[rep.defs[0] as usize];
                let mut defined_fp = loc.defined && loc.fp;
                let mut defined_core = loc.defined && loc.core;
                let mut defined_ref = loc.defined && loc.ref_;
                let mut is_wide = loc.wide || (attrs & df::A_WIDE != 0);
                let mut is_high = is_phi && loc.wide && loc.high_word;
                for &use_reg in &rep.uses {
                    loc = self.reg_locations[use_reg as usize];
                    defined_fp |= loc.defined && loc.fp;
                    defined_core |= loc.defined && loc.core;
                    defined_ref |= loc.defined && loc.ref_;
                    is_wide |= loc.wide;
                    is_high |= is_phi && loc.wide && loc.high_word;
                }
                if defined_fp && (defined_core || defined_ref) {
                    // Irreconcilable views of the slot; keep it in the frame.
                    debug!(
                        s_reg = rep.defs[0],
                        "fp/core type conflict, disabling promotion"
                    );
                    self.info.disable_opt |= DisableOpt::PROMOTE_REGS;
                }
                changed |= self.set_fp(rep.defs[0], defined_fp);
                changed |= self.set_core(rep.defs[0], defined_core);
                changed |= self.set_ref(rep.defs[0], defined_ref);
                changed |= self.set_wide(rep.defs[0], is_wide);
                changed |= self.set_high(rep.defs[0], is_high);
                if attrs & df::A_WIDE != 0 && rep.defs.len() > 1 {
                    changed |= self.set_wide(rep.defs[1], true);
                    changed |= self.set_high(rep.defs[1], true);
                }
                for &use_reg in &rep.uses {
                    changed |= self.set_fp(use_reg, defined_fp);
                    changed |= self.set_core(use_reg, defined_core);
                    changed |= self.set_ref(use_reg, defined_ref);
                    changed |= self.set_wide(use_reg, is_wide);
                }
            }
        }
        changed
    }

    fn apply_shorty_char(&mut self, c: u8, uses: &[SReg], at: usize) -> bool {
        let mut changed = false;
        if at >= uses.len() {
            return false;
        }
        match c {
            b'I' | b'Z' | b'B' | b'S' | b'C' => changed |= self.set_core(uses[at], true),
            b'J' => {
                changed |= self.set_core(uses[at], true);
                if at + 1 < uses.len() {
                    changed |= self.set_core(uses[at + 1], true);
                    changed |= self.set_wide(uses[at], true);
                    changed |= self.set_wide(uses[at + 1], true);
                    changed |= self.set_high(uses[at + 1], true);
                }
            }
            b'F' => changed |= self.set_fp(uses[at], true),
            b'D' => {
                changed |= self.set_fp(uses[at], true);
                if at + 1 < uses.len() {
                    changed |= self.set_fp(uses[at + 1], true);
                    changed |= self.set_wide(uses[at], true);
                    changed |= self.set_wide(uses[at + 1], true);
                    changed |= self.set_high(uses[at + 1], true);
                }
            }
            b'L' => changed |= self.set_ref(uses[at], true),
            _ => {}
        }
        changed
    }

    fn infer_invoke_types(&mut self, bb: BlockId, mir: super::MirId, uses: &[SReg]) -> bool {
        let insn = self.mir(mir).insn;
        let mut changed = false;
        let target_idx = insn.vb;
        let Some(shorty) = self.methods.shorty(target_idx).map(str::to_owned) else {
            return false;
        };
        let shorty = shorty.as_bytes();

        // FP results are only visible through the following move-result.
        if matches!(shorty.first(), Some(b'F' | b'D')) {
            if let Some(move_result) = self.find_move_result(bb, mir) {
                if self.mir(move_result).insn.op.code() != Some(Opcode::MoveResultObject) {
                    let defs = self
                        .mir(move_result)
                        .ssa_rep
                        .clone()
                        .unwrap_or_default()
                        .defs;
                    if let Some(rep) = self.mir_mut(move_result).ssa_rep.as_mut() {
                        if !rep.fp_def.is_empty() {
                            rep.fp_def[0] = true;
                        }
                        if rep.fp_def.len() > 1 {
                            rep.fp_def[1] = true;
                        }
                    }
                    if !defs.is_empty() {
                        changed |= self.set_fp(defs[0], true);
                    }
                    if shorty.first() == Some(&b'D') && defs.len() > 1 {
                        changed |= self.set_fp(defs[1], true);
                    }
                }
            }
        }

        let is_static = matches!(
            self.mir(mir).insn.op.code(),
            Some(Opcode::InvokeStatic | Opcode::InvokeStaticRange)
        );
        let mut next = 0usize;
        if !is_static {
            // Implicit this.
            if !uses.is_empty() {
                changed |= self.set_ref(uses[0], true);
                self.reg_locations[uses[0] as usize].defined = true;
            }
            next = 1;
        }
        for &c in shorty.iter().skip(1) {
            changed |= self.apply_shorty_char(c, uses, next);
            next += match c {
                b'J' | b'D' => 2,
                _ => 1,
            };
        }
        changed
    }
}
