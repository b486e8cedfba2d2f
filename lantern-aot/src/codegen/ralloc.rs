//! Scratch-register pools and simple promotion of hot vregs to preserved
//! registers.

use itertools::Itertools;
use tracing::debug;

use super::Codegen;
use crate::DisableOpt;

/// Where a vreg's home migrated during promotion.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromotionRecord {
    /// Promoted core register, if any.
    pub core_reg: Option<u8>,
    /// Promoted FP register, if any.
    pub fp_reg: Option<u8>,
}

impl Codegen<'_> {
    /// Simple linear-scan promotion: weighted use counts are aggregated per
    /// vreg, sorted, and the hottest candidates get preserved physical
    /// registers subject to their inferred fp/core typing.
    pub(crate) fn do_promotion(&mut self) {
        let regs = self.target.regs();
        let mut core_mask = regs.reserved_spill_mask;
        if let Some(lr) = regs.lr {
            core_mask |= 1 << lr;
        }

        if !self
            .graph
            .info
            .disable_opt
            .contains(DisableOpt::PROMOTE_REGS)
        {
            let num_vregs = self.graph.info.num_vregs;
            #[derive(Default, Clone, Copy)]
            struct Candidate {
                weight: u64,
                fp: bool,
                core_or_ref: bool,
                wide: bool,
            }
            let mut candidates = vec![Candidate::default(); num_vregs];
            for s_reg in 0..self.graph.num_ssa_regs() as i32 {
                let vreg = self.graph.sreg_to_vreg(s_reg);
                if vreg < 0 || vreg as usize >= num_vregs {
                    continue;
                }
                let loc = self.graph.reg_locations[s_reg as usize];
                let c = &mut candidates[vreg as usize];
                c.weight += self.graph.use_count(s_reg) as u64;
                c.fp |= loc.fp;
                c.core_or_ref |= loc.core || loc.ref_;
                c.wide |= loc.wide;
            }

            let order: Vec<usize> = (0..num_vregs)
                .sorted_by_key(|&v| std::cmp::Reverse(candidates[v].weight))
                .collect();
            let mut core_iter = regs.preserved_core.iter();
            let mut fp_iter = regs.preserved_fp.iter();
            for vreg in order {
                let c = candidates[vreg];
                if c.weight == 0 {
                    break;
                }
                // Wide pairs and fp/core conflicts stay in the frame.
                if c.wide || (c.fp && c.core_or_ref) {
                    continue;
                }
                if c.fp {
                    if let Some(&reg) = fp_iter.next() {
                        self.promotion[vreg].fp_reg = Some(reg);
                        self.fp_spill_mask |= 1 << (reg - crate::target::FP_REG_BASE);
                        self.fp_vmap.push((reg as u32) << 16 | vreg as u32);
                        debug!(vreg, reg, "promoted to fp register");
                    }
                } else if let Some(&reg) = core_iter.next() {
                    self.promotion[vreg].core_reg = Some(reg);
                    core_mask |= 1 << reg;
                    self.core_vmap.push((reg as u32) << 16 | vreg as u32);
                    debug!(vreg, reg, "promoted to core register");
                }
            }
        }

        self.core_spill_mask = core_mask;
        self.num_core_spills = core_mask.count_ones() as usize;
        self.num_fp_spills = self.fp_spill_mask.count_ones() as usize;
        self.frame_size = self.compute_frame_size();
    }

    /// Spills, a filler word, the vreg array, outgoing args, compiler temps
    /// and the method pointer, rounded to the target stack alignment.
    pub(crate) fn compute_frame_size(&self) -> u32 {
        let info = &self.graph.info;
        let words = self.num_core_spills
            + self.num_fp_spills
            + 1 // filler
            + info.num_vregs
            + info.num_outs
            + 1; // method pointer
        let raw = (words * 4) as u32;
        let align = self.target.isa().stack_alignment();
        (raw + align - 1) & !(align - 1)
    }

    // ---- scratch pools, reset per MIR ----

    pub(crate) fn reset_temps(&mut self) {
        // Allocation pops from the back, so the argument registers at the
        // front of the list are handed out last.
        let regs = self.target.regs();
        self.free_temps = regs.core_temps.to_vec();
        self.free_fp_temps = regs.fp_temps.to_vec();
    }

    pub(crate) fn alloc_temp(&mut self) -> u8 {
        self.free_temps
            .pop()
            .expect("scratch core registers exhausted")
    }

    pub(crate) fn free_temp(&mut self, reg: u8) {
        let regs = self.target.regs();
        if regs.core_temps.contains(&reg) && !self.free_temps.contains(&reg) {
            self.free_temps.push(reg);
        }
    }

    pub(crate) fn alloc_fp_temp(&mut self) -> u8 {
        self.free_fp_temps
            .pop()
            .expect("scratch fp registers exhausted")
    }

    /// An even/odd FP pair for double values; returns the even register.
    pub(crate) fn alloc_fp_temp_pair(&mut self) -> u8 {
        let pos = self
            .free_fp_temps
            .iter()
            .rposition(|&r| {
                (r - crate::target::FP_REG_BASE) % 2 == 0
                    && (self.free_fp_temps.contains(&(r + 1))
                        || !self.target.regs().fp_temps.contains(&(r + 1)))
            })
            .expect("no fp register pair free");
        let reg = self.free_fp_temps.remove(pos);
        if let Some(odd) = self.free_fp_temps.iter().position(|&r| r == reg + 1) {
            self.free_fp_temps.remove(odd);
        }
        reg
    }

    pub(crate) fn free_fp_temp(&mut self, reg: u8) {
        let regs = self.target.regs();
        if regs.fp_temps.contains(&reg) && !self.free_fp_temps.contains(&reg) {
            self.free_fp_temps.push(reg);
        }
    }
}
