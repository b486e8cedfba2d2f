//! The per-method compilation driver and the cross-method shared state:
//! the arena pool, the dedupe stores and the patch lists.

use std::mem::size_of;
use std::sync::{Arc, Mutex};

use lantern_arena::{AllocKind, ArenaAllocator, ArenaPool};
use lantern_asm::{InvokeType, MethodBody, MethodRef};
use tracing::{debug, info};

use crate::codegen::{Codegen, FieldTable};
use crate::compiled::{CompiledMethod, Patch};
use crate::dedupe::DedupeSet;
use crate::mir::{BasicBlock, MethodInfo, MethodTable, Mir, MirGraph};
use crate::target::target_for;
use crate::{Bug, CompilerFilter, DisableOpt, EnableDebug, InstructionSet};

/// Compiler-wide configuration.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Target ISA.
    pub isa: InstructionSet,
    /// Analyzer gate.
    pub filter: CompilerFilter,
    /// Disabled optimizations.
    pub disable_opt: DisableOpt,
    /// Debug enables.
    pub enable_debug: EnableDebug,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            isa: InstructionSet::Thumb2,
            filter: CompilerFilter::Balanced,
            disable_opt: DisableOpt::default(),
            enable_debug: EnableDebug::default(),
        }
    }
}

/// Shared compiler state.  One instance serves every worker thread; each
/// method compilation is confined to its calling thread and the only
/// cross-thread traffic goes through the pool, the dedupe sets and the
/// patch lists, each behind its own mutex.
pub struct Compiler {
    options: CompilerOptions,
    pool: Arc<ArenaPool>,
    dedupe_code: DedupeSet,
    dedupe_mapping_table: DedupeSet,
    dedupe_vmap_table: DedupeSet,
    dedupe_gc_map: DedupeSet,
    code_patches: Mutex<Vec<Patch>>,
    method_patches: Mutex<Vec<Patch>>,
}

impl Compiler {
    /// Create a compiler with its own arena pool and dedupe stores.
    pub fn new(options: CompilerOptions) -> Self {
        Compiler {
            options,
            pool: ArenaPool::new(),
            dedupe_code: DedupeSet::new(),
            dedupe_mapping_table: DedupeSet::new(),
            dedupe_vmap_table: DedupeSet::new(),
            dedupe_gc_map: DedupeSet::new(),
            code_patches: Mutex::new(Vec::new()),
            method_patches: Mutex::new(Vec::new()),
        }
    }

    /// Options in effect.
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// The optimization-disable set after target adjustments.
    pub fn effective_disable_opt(&self) -> DisableOpt {
        let mut flags = self.options.disable_opt;
        if self.options.isa == InstructionSet::Mips {
            // The MIPS backend runs with the optional optimizations off
            // until its resource model is revalidated.
            flags |= DisableOpt::LOAD_STORE_ELIMINATION
                | DisableOpt::LOAD_HOISTING
                | DisableOpt::SUPPRESS_LOADS
                | DisableOpt::NULL_CHECK_ELIMINATION
                | DisableOpt::PROMOTE_REGS
                | DisableOpt::TRACK_LIVE_TEMPS
                | DisableOpt::SAFE_OPTIMIZATIONS
                | DisableOpt::BB_OPT
                | DisableOpt::MATCH
                | DisableOpt::PROMOTE_COMPILER_TEMPS;
        }
        // A bitcode-based backend would force BRANCH_FUSING off here; the
        // quick path never needs to.
        flags
    }

    /// Compile one method.  `Ok(None)` means the analyzer deferred the
    /// method to the interpreter; `Err` is an internal compiler bug.
    pub fn compile_method(
        &self,
        body: &MethodBody,
        mref: &MethodRef,
        invoke_type: InvokeType,
        methods: &MethodTable,
        fields: &FieldTable,
    ) -> Result<Option<CompiledMethod>, Bug> {
        debug!(method = %mref.name, class = %mref.class_descriptor, "compiling");
        let mut arena = ArenaAllocator::new(Arc::clone(&self.pool));

        let enable_debug = self.options.enable_debug;
        let info = MethodInfo {
            num_vregs: body.registers_size as usize,
            num_ins: body.ins_size as usize,
            num_outs: body.outs_size as usize,
            access_flags: body.access_flags,
            shorty: mref.shorty.clone(),
            invoke_type,
            insns_size: body.insns.len(),
            isa: self.options.isa,
            disable_opt: self.effective_disable_opt(),
            enable_debug,
        };
        let mut graph = MirGraph::new(info, methods.clone());
        if enable_debug.contains(EnableDebug::COUNT_OPCODES) {
            graph.enable_opcode_counting();
        }

        // Build the raw MIR graph.
        graph.build(body);
        arena.charge(AllocKind::Mir, graph.num_mirs() * size_of::<Mir>());
        arena.charge(
            AllocKind::BasicBlock,
            graph.num_blocks() * size_of::<BasicBlock>(),
        );

        // Gate on the cost analyzer.
        if graph.skip_compilation(self.options.filter) {
            debug!(method = %mref.name, "deferred to interpreter");
            return Ok(None);
        }

        // Code layout, SSA, and the optimizer pipeline.
        graph.code_layout();
        graph.ssa_transformation()?;
        arena.charge(
            AllocKind::DfInfo,
            graph.num_ssa_regs() * size_of::<crate::SReg>() * 2,
        );
        graph.propagate_constants();
        graph.method_use_count();
        graph.null_check_elimination();
        graph.basic_block_combine();
        graph.basic_block_optimization();
        graph.dump_check_stats();

        // Describe every SSA name for the backend.
        graph.build_reg_locations();
        arena.charge(
            AllocKind::RegAlloc,
            graph.reg_locations.len() * size_of::<crate::mir::RegLocation>(),
        );

        let target = target_for(self.options.isa);
        let mut cg = Codegen::new(target, &mut graph, fields, mref);
        cg.materialize(&body.reference_maps)?;
        arena.charge(AllocKind::Lir, cg.lirs.len() * size_of::<crate::lir::Lir>());

        if cg.code_buffer.is_empty() {
            debug!(method = %mref.name, "no code produced, deferred");
            return Ok(None);
        }

        // Stage the artifacts through the arena, then intern canonical
        // copies; the arena memory dies with this compilation.
        let code = self.intern(&self.dedupe_code, &mut arena, &cg.code_buffer);
        let mapping_table =
            self.intern(&self.dedupe_mapping_table, &mut arena, &cg.encoded_mapping_table);
        let vmap_table = self.intern(&self.dedupe_vmap_table, &mut arena, &cg.vmap_table);
        let native_gc_map = self.intern(&self.dedupe_gc_map, &mut arena, &cg.native_gc_map);

        let patches = cg.patches.clone();
        {
            let mut code_patches = self.code_patches.lock().expect("patch list poisoned");
            let mut method_patches = self.method_patches.lock().expect("patch list poisoned");
            for patch in &patches {
                match patch {
                    Patch::Code { .. } => code_patches.push(patch.clone()),
                    Patch::Method { .. } => method_patches.push(patch.clone()),
                }
            }
        }

        let result = CompiledMethod {
            isa: self.options.isa,
            code,
            frame_size_in_bytes: cg.frame_size,
            core_spill_mask: cg.core_spill_mask,
            fp_spill_mask: cg.fp_spill_mask,
            mapping_table,
            vmap_table,
            native_gc_map,
            patches,
        };

        if enable_debug.contains(EnableDebug::SHOW_MEMORY_USAGE)
            && arena.bytes_allocated() > 5 * 1024 * 1024
        {
            info!(method = %mref.name, stats = %arena.mem_stats(), "arena usage");
        }
        if enable_debug.contains(EnableDebug::SHOW_SUMMARY_MEMORY_USAGE) {
            info!(
                method = %mref.name,
                bytes = arena.bytes_allocated(),
                blocks = graph.num_blocks(),
                "meminfo"
            );
        }
        debug!(method = %mref.name, code_bytes = result.code.len(), "compiled");
        Ok(Some(result))
    }

    fn intern(
        &self,
        set: &DedupeSet,
        arena: &mut ArenaAllocator,
        data: &[u8],
    ) -> Arc<Vec<u8>> {
        let staged = arena.alloc(data.len().max(1), AllocKind::Data);
        arena.bytes_mut(staged)[..data.len()].copy_from_slice(data);
        set.add(arena.bytes(staged)[..data.len()].to_vec())
    }

    /// Code patches accumulated so far; read after workers join.
    pub fn code_patches(&self) -> Vec<Patch> {
        self.code_patches.lock().expect("patch list poisoned").clone()
    }

    /// Method patches accumulated so far; read after workers join.
    pub fn method_patches(&self) -> Vec<Patch> {
        self.method_patches
            .lock()
            .expect("patch list poisoned")
            .clone()
    }

    /// Arenas currently idle in the pool.
    pub fn idle_arenas(&self) -> usize {
        self.pool.idle_arenas()
    }
}
