//! Static method-cost analysis: decide whether compiling is worth it.

use lantern_asm::dataflow::an;
use lantern_asm::AccessFlags;
use tracing::info;

use super::{BlockId, BlockType, MirGraph, MirOp, SpecialCase};
use crate::{CompilerFilter, EnableDebug};

/// Everything below this is compiled even under the Space filter.
pub const TINY_METHOD_THRESHOLD: usize = 20;
/// Small-method cutoff in code units.
pub const SMALL_METHOD_THRESHOLD: usize = 60;
/// Large-method cutoff in code units.
pub const LARGE_METHOD_THRESHOLD: usize = 600;
/// Methods above this are presumed machine-generated.
pub const HUGE_METHOD_THRESHOLD: usize = 10000;

/// Counted ops inside a detected loop weigh this much more.
const LOOP_SCALE_FACTOR: u32 = 25;

/// Opcode-attribute histogram of one method.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodStats {
    /// Weighted instruction count.
    pub bytecode_instructions: u32,
    /// Arithmetic ops.
    pub math_ops: u32,
    /// Floating-point ops.
    pub fp_ops: u32,
    /// Array ops.
    pub array_ops: u32,
    /// Branches.
    pub branch_ops: u32,
    /// Runtime-helper-bound ops.
    pub heavyweight_ops: u32,
    /// A tight all-computational loop was seen.
    pub has_computational_loop: bool,
    /// A switch was seen.
    pub has_switch: bool,
    /// math_ops / instructions.
    pub math_ratio: f32,
    /// fp_ops / instructions.
    pub fp_ratio: f32,
    /// array_ops / instructions.
    pub array_ratio: f32,
    /// branch_ops / instructions.
    pub branch_ratio: f32,
    /// heavyweight_ops / instructions.
    pub heavyweight_ratio: f32,
}

impl MirGraph {
    /// Should this method be left to the interpreter?
    pub fn skip_compilation(&mut self, compiler_filter: CompilerFilter) -> bool {
        match compiler_filter {
            CompilerFilter::Everything => return false,
            CompilerFilter::InterpretOnly => return true,
            _ => {}
        }

        let (small_cutoff, default_cutoff) = match compiler_filter {
            CompilerFilter::Balanced => (SMALL_METHOD_THRESHOLD, LARGE_METHOD_THRESHOLD),
            CompilerFilter::Space => (TINY_METHOD_THRESHOLD, SMALL_METHOD_THRESHOLD),
            CompilerFilter::Speed => (HUGE_METHOD_THRESHOLD, HUGE_METHOD_THRESHOLD),
            _ => unreachable!("filter handled above"),
        };

        let num_insns = self.info.insns_size;
        // Assume the default decision; analysis below may flip it.
        let mut skip_compilation = num_insns >= default_cutoff;

        // Huge methods are likely machine generated; presume skip but let
        // the histogram reclaim them.
        if num_insns > HUGE_METHOD_THRESHOLD {
            skip_compilation = true;
        } else if compiler_filter == CompilerFilter::Speed {
            return false;
        }

        // Class initializers run once; never worth compiling.
        if self
            .info
            .access_flags
            .contains(AccessFlags::CONSTRUCTOR | AccessFlags::STATIC)
        {
            return true;
        }

        // Recognized template: the canned pattern is nearly free.
        if self.special_case != SpecialCase::None {
            return false;
        }

        if num_insns < small_cutoff {
            return false;
        }

        let mut stats = MethodStats::default();
        self.clear_all_visited_flags();
        for bb in 0..self.num_blocks() as BlockId {
            self.analyze_block(bb, &mut stats);
        }
        self.compute_skip_compilation(&mut stats, skip_compilation)
    }

    /// Scan one super-block (fall-through chain up to a branch), scaling
    /// counts when it closes a simple loop.
    fn analyze_block(&mut self, bb: BlockId, stats: &mut MethodStats) {
        if self.block(bb).visited || self.block(bb).block_type != BlockType::ByteCode {
            return;
        }

        // Treat blocks split by exception edges as one block: follow
        // fall-through edges until an explicit branch.
        let mut ending_bb = bb;
        if self.block(ending_bb).last_mir.is_some() {
            loop {
                let last = self.block(ending_bb).last_mir.expect("non-empty block");
                let flags = self.analysis_attrs(self.mir(last).insn.op);
                if flags & an::BRANCH != 0 {
                    break;
                }
                match self.block(ending_bb).fall_through {
                    Some(ft) if self.block(ft).last_mir.is_some() => ending_bb = ft,
                    _ => break,
                }
            }
        }

        // Cheap loop forms: for/while (conditional back to the head) and
        // do-while (taken straight back).
        let mut loop_scale_factor = 1u32;
        let ending = self.block(ending_bb);
        if let (Some(tk), None) = (ending.taken, ending.fall_through) {
            if self.block(tk).taken == Some(bb) || self.block(tk).fall_through == Some(bb) {
                loop_scale_factor = LOOP_SCALE_FACTOR;
            }
        }
        if self.block(ending_bb).taken == Some(bb) {
            loop_scale_factor = LOOP_SCALE_FACTOR;
        }

        let mut computational_block = true;
        let mut has_math = false;
        let mut tbb = bb;
        loop {
            self.block_mut(tbb).visited = true;
            for mir in self.block_mirs(tbb).collect::<Vec<_>>() {
                let op = self.mir(mir).insn.op;
                if op.is_ext() {
                    continue;
                }
                let flags = self.analysis_attrs(op);
                stats.bytecode_instructions += loop_scale_factor;
                if flags & an::BRANCH == 0 {
                    computational_block &= flags & an::COMPUTATIONAL != 0;
                } else {
                    stats.branch_ops += loop_scale_factor;
                }
                if flags & an::MATH != 0 {
                    stats.math_ops += loop_scale_factor;
                    has_math = true;
                }
                if flags & an::FP != 0 {
                    stats.fp_ops += loop_scale_factor;
                }
                if flags & an::ARRAYOP != 0 {
                    stats.array_ops += loop_scale_factor;
                }
                if flags & an::HEAVYWEIGHT != 0 {
                    stats.heavyweight_ops += loop_scale_factor;
                }
                if flags & an::SWITCH != 0 {
                    stats.has_switch = true;
                }
            }
            if tbb == ending_bb {
                break;
            }
            match self.block(tbb).fall_through {
                Some(ft) => tbb = ft,
                None => break,
            }
        }
        if has_math && computational_block && loop_scale_factor > 1 {
            stats.has_computational_loop = true;
        }
    }

    fn analysis_attrs(&self, op: MirOp) -> u32 {
        match op {
            MirOp::Code(code) => code.analysis_attrs(),
            MirOp::Ext(_) => an::NONE,
        }
    }

    fn compute_skip_compilation(
        &mut self,
        stats: &mut MethodStats,
        skip_default: bool,
    ) -> bool {
        let count = stats.bytecode_instructions.max(1) as f32;
        stats.math_ratio = stats.math_ops as f32 / count;
        stats.fp_ratio = stats.fp_ops as f32 / count;
        stats.branch_ratio = stats.branch_ops as f32 / count;
        stats.array_ratio = stats.array_ops as f32 / count;
        stats.heavyweight_ratio = stats.heavyweight_ops as f32 / count;

        if self
            .info
            .enable_debug
            .contains(EnableDebug::SHOW_FILTER_STATS)
        {
            info!(
                instructions = stats.bytecode_instructions,
                math = stats.math_ratio,
                fp = stats.fp_ratio,
                branch = stats.branch_ratio,
                heavyweight = stats.heavyweight_ratio,
                array = stats.array_ratio,
                hot_loop = stats.has_computational_loop,
                "method filter stats"
            );
        }

        // Computation intensive?
        if stats.has_computational_loop && stats.heavyweight_ratio < 0.04 {
            return false;
        }
        // Complex, logic intensive?
        if self.info.insns_size > SMALL_METHOD_THRESHOLD && stats.branch_ratio > 0.3 {
            return false;
        }
        // Significant floating point?
        if stats.fp_ratio > 0.05 {
            return false;
        }
        // Significant generic math?
        if stats.math_ratio > 0.3 {
            return false;
        }
        // Array intensive?
        if stats.array_ratio > 0.1 {
            return false;
        }
        // Switches gain a lot from compiled dispatch.
        if stats.has_switch {
            return false;
        }
        // Big and dominated by helper calls: let the interpreter have it.
        if self.info.insns_size > SMALL_METHOD_THRESHOLD && stats.heavyweight_ratio > 0.3 {
            return true;
        }
        skip_default
    }
}
