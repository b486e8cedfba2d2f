//! End-to-end scenarios through the full per-method pipeline.

mod common;

use std::sync::Arc;

use common::*;
use lantern_aot::codegen::{Codegen, FieldTable};
use lantern_aot::compiled::{CompiledMethod, MappingTable};
use lantern_aot::driver::{Compiler, CompilerOptions};
use lantern_aot::lir::{LirOp, MachineOp};
use lantern_aot::mir::{MethodInfo, MethodTable, MirFlags, MirGraph};
use lantern_aot::target::target_for;
use lantern_aot::{CompilerFilter, DisableOpt, EnableDebug, InstructionSet};
use lantern_asm::{InvokeType, MethodBody, PACKED_SWITCH_SIGNATURE};

fn options(isa: InstructionSet, filter: CompilerFilter) -> CompilerOptions {
    CompilerOptions {
        isa,
        filter,
        disable_opt: DisableOpt::default(),
        enable_debug: EnableDebug::default(),
    }
}

fn run_graph_pipeline(body: &MethodBody, methods: MethodTable, isa: InstructionSet) -> MirGraph {
    let info = MethodInfo {
        num_vregs: body.registers_size as usize,
        num_ins: body.ins_size as usize,
        num_outs: body.outs_size as usize,
        access_flags: body.access_flags,
        shorty: "V".into(),
        invoke_type: InvokeType::Static,
        insns_size: body.insns.len(),
        isa,
        disable_opt: DisableOpt::default(),
        enable_debug: EnableDebug::default(),
    };
    let mut graph = MirGraph::new(info, methods);
    graph.build(body);
    graph.code_layout();
    graph.ssa_transformation().expect("ssa");
    graph.propagate_constants();
    graph.method_use_count();
    graph.null_check_elimination();
    graph.basic_block_combine();
    graph.basic_block_optimization();
    graph.build_reg_locations();
    graph
}

#[test]
fn empty_body_method_compiles_to_return_sequence() {
    let body = static_body(vec![RETURN_VOID], 1, 0, 0);
    let mref = method_ref("V", "empty");
    let compiler = Compiler::new(options(InstructionSet::Thumb2, CompilerFilter::Speed));
    let compiled = compiler
        .compile_method(&body, &mref, InvokeType::Static, &MethodTable::new(), &FieldTable::new())
        .expect("no bug")
        .expect("compiled under Speed");

    assert!(!compiled.code.is_empty());
    assert_eq!(compiled.frame_size_in_bytes % 8, 0);
    // No calls, no catches: the mapping table is empty both ways.
    let table = MappingTable::decode(&compiled.mapping_table).expect("decodes");
    assert!(table.pc2bc.is_empty());
    assert!(table.bc2pc.is_empty());
    // The GC map is present with a well-formed header and no entries.
    assert!(compiled.native_gc_map.len() >= 4);
    let entries = compiled.native_gc_map[2] as usize | (compiled.native_gc_map[3] as usize) << 8;
    assert_eq!(entries, 0);
}

#[test]
fn empty_body_graph_shape() {
    let body = static_body(vec![RETURN_VOID], 1, 0, 0);
    let graph = run_graph_pipeline(&body, MethodTable::new(), InstructionSet::Thumb2);
    // Entry -> body -> exit, one MIR, no phis.
    assert_eq!(graph.num_reachable_blocks(), 3);
    assert_eq!(graph.num_mirs(), 1);
    assert!(graph.verify_ssa_single_def());
}

#[test]
fn protected_field_get_combines_check_pair() {
    // new-instance proves the receiver non-null, so the split iget's check
    // half merges back with its work half and the exception edge dies.
    let insns = vec![
        0x22, 5,                    // 0: new-instance v0, type@5
        0x52 | (1 << 8), 3,         // 2: iget v1, v0, field@3
        RETURN_VOID,                // 4
        RETURN_VOID,                // 5: catch handler
    ];
    let mut body = static_body(insns, 2, 0, 2);
    body.tries = vec![lantern_asm::TryItem {
        start_offset: 2,
        insn_count: 2,
        handlers: vec![(u32::MAX, 5)],
    }];
    let graph = run_graph_pipeline(&body, MethodTable::new(), InstructionSet::Thumb2);

    // No surviving block ends in a check pseudo-op.
    use lantern_aot::mir::{BlockType, ExtOp, MirOp};
    for block in &graph.blocks {
        if block.block_type == BlockType::Dead {
            continue;
        }
        if let Some(last) = block.last_mir {
            assert_ne!(
                graph.mir(last).insn.op,
                MirOp::Ext(ExtOp::Check),
                "check pseudo survived block combining"
            );
        }
    }

    // And the whole method still compiles.
    let mref = method_ref("V", "combine");
    let compiler = Compiler::new(options(InstructionSet::Thumb2, CompilerFilter::Speed));
    compiler
        .compile_method(&body, &mref, InvokeType::Static, &MethodTable::new(), &FieldTable::new())
        .expect("no bug")
        .expect("compiled");
}

#[test]
fn diamond_select_rewrites_to_select_mir() {
    use lantern_aot::mir::{ExtOp, MirOp};
    // if-eqz v2 -> v0 = 2; else v0 = 1; return v0
    let insns = vec![
        insn_21t(0x38, 2, 4)[0], insn_21t(0x38, 2, 4)[1], // 0: if-eqz v2, +4
        const4(0, 1),                                     // 2: const/4 v0, #1
        goto(2),                                          // 3: goto +2
        const4(0, 2),                                     // 4: const/4 v0, #2
        return_reg(0),                                    // 5: return v0
    ];
    let body = static_body(insns, 3, 1, 0);
    let graph = run_graph_pipeline(&body, MethodTable::new(), InstructionSet::Thumb2);

    let select = (0..graph.num_mirs() as u32)
        .find(|&m| graph.mir(m).insn.op == MirOp::Ext(ExtOp::Select))
        .expect("diamond rewritten to select");
    let insn = graph.mir(select).insn;
    assert_eq!(insn.vb, 1, "true (non-zero) value");
    assert_eq!(insn.vc, 2, "false (zero) value");
    // The join phi was consumed by the select.
    let phis = (0..graph.num_mirs() as u32)
        .filter(|&m| graph.mir(m).insn.op == MirOp::Ext(ExtOp::Phi))
        .count();
    assert_eq!(phis, 0);
}

#[test]
fn packed_switch_table_roundtrip() {
    // Displacements in the installed table are relative to the dispatch
    // anchor plus the Thumb2 PC delta.
    let insns = vec![
        0x2b, 8, 0,                 // 0: packed-switch v0, table at +8
        RETURN_VOID,                // 3: fall-through
        RETURN_VOID,                // 4: case 10
        RETURN_VOID,                // 5: case 11
        RETURN_VOID,                // 6: case 12
        NOP,                        // 7: pad to even offset
        PACKED_SWITCH_SIGNATURE, 3, // 8: payload: 3 entries
        10, 0,                      // first_key = 10
        4, 0, 5, 0, 6, 0,           // targets +4, +5, +6
    ];
    let body = static_body(insns, 1, 1, 0);
    let info = MethodInfo {
        num_vregs: 1,
        num_ins: 1,
        num_outs: 0,
        access_flags: body.access_flags,
        shorty: "VI".into(),
        invoke_type: InvokeType::Static,
        insns_size: body.insns.len(),
        isa: InstructionSet::Thumb2,
        disable_opt: DisableOpt::default(),
        enable_debug: EnableDebug::default(),
    };
    let mut graph = MirGraph::new(info, MethodTable::new());
    graph.build(&body);
    graph.code_layout();
    graph.ssa_transformation().expect("ssa");
    graph.propagate_constants();
    graph.method_use_count();
    graph.null_check_elimination();
    graph.basic_block_combine();
    graph.basic_block_optimization();
    graph.build_reg_locations();

    let mref = method_ref("VI", "dispatch");
    let fields = FieldTable::new();
    let target = target_for(InstructionSet::Thumb2);
    let mut cg = Codegen::new(target, &mut graph, &fields, &mref);
    cg.materialize(&body.reference_maps).expect("materialize");

    assert_eq!(cg.switch_tables.len(), 1);
    let table = &cg.switch_tables[0];
    assert!(table.packed);
    assert_eq!(table.keys, vec![10, 11, 12]);
    let anchor_offset = cg.lirs.get(table.anchor).offset as i32;
    let base = anchor_offset + target.switch_anchor_delta();
    for (i, &label) in table.targets.iter().enumerate() {
        let expect = cg.lirs.get(label).offset as i32 - base;
        let at = table.offset as usize + 4 * i;
        let got = i32::from_le_bytes(cg.code_buffer[at..at + 4].try_into().unwrap());
        assert_eq!(got, expect, "displacement {i}");
    }
}

#[test]
fn math_abs_invoke_is_inlined() {
    use lantern_asm::Opcode;
    let mut methods = MethodTable::new();
    methods.insert(7, "Ljava/lang/Math;", "abs", "II");
    // invoke-static {v1}, Math.abs; move-result v0; return v0
    let insns = vec![
        0x71 | (1 << 12), 7, 0x0001, // 0: invoke-static {v1}, method@7
        0x0a, 0x0f | (0 << 8),       // 3: move-result v0; 4: return v0
    ];
    let body = static_body(insns, 2, 1, 1);
    let info = MethodInfo {
        num_vregs: 2,
        num_ins: 1,
        num_outs: 1,
        access_flags: body.access_flags,
        shorty: "II".into(),
        invoke_type: InvokeType::Static,
        insns_size: body.insns.len(),
        isa: InstructionSet::Thumb2,
        disable_opt: DisableOpt::default(),
        enable_debug: EnableDebug::default(),
    };
    let mut graph = MirGraph::new(info, methods);
    graph.build(&body);
    graph.code_layout();
    graph.ssa_transformation().expect("ssa");
    graph.propagate_constants();
    graph.method_use_count();
    graph.null_check_elimination();
    graph.basic_block_combine();
    graph.basic_block_optimization();
    graph.build_reg_locations();

    let mref = method_ref("II", "callAbs");
    let fields = FieldTable::new();
    let mut cg = Codegen::new(target_for(InstructionSet::Thumb2), &mut graph, &fields, &mref);
    cg.materialize(&body.reference_maps).expect("materialize");

    // Both halves are marked inlined and no call instruction was emitted.
    let inlined: Vec<bool> = (0..cg.graph.num_mirs() as u32)
        .filter(|&m| {
            matches!(
                cg.graph.mir(m).insn.op.code(),
                Some(Opcode::InvokeStatic | Opcode::MoveResult)
            )
        })
        .map(|m| cg.graph.mir(m).opt_flags.contains(MirFlags::INLINED))
        .collect();
    assert_eq!(inlined, vec![true, true]);
    let calls = cg
        .lirs
        .iter()
        .filter(|&id| cg.lirs.get(id).op == LirOp::Machine(MachineOp::BlxReg))
        .count();
    assert_eq!(calls, 0, "intrinsic must not fall back to a call");
}

#[test]
fn identical_code_dedupes_to_one_instance() {
    let compiler = Compiler::new(options(InstructionSet::Thumb2, CompilerFilter::Speed));
    let methods = MethodTable::new();
    let fields = FieldTable::new();
    let body = static_body(vec![const4(0, 3), return_reg(0)], 1, 0, 0);
    let a = compiler
        .compile_method(&body, &method_ref("I", "three_a"), InvokeType::Static, &methods, &fields)
        .expect("no bug")
        .expect("compiled");
    let b = compiler
        .compile_method(&body, &method_ref("I", "three_b"), InvokeType::Static, &methods, &fields)
        .expect("no bug")
        .expect("compiled");
    assert!(Arc::ptr_eq(&a.code, &b.code));
    assert!(Arc::ptr_eq(&a.mapping_table, &b.mapping_table));
    assert!(Arc::ptr_eq(&a.vmap_table, &b.vmap_table));
}

#[test]
fn arena_returns_to_pool_between_methods() {
    let compiler = Compiler::new(options(InstructionSet::Thumb2, CompilerFilter::Speed));
    let body = static_body(vec![RETURN_VOID], 1, 0, 0);
    compiler
        .compile_method(
            &body,
            &method_ref("V", "first"),
            InvokeType::Static,
            &MethodTable::new(),
            &FieldTable::new(),
        )
        .expect("no bug");
    assert!(compiler.idle_arenas() >= 1);
}

#[test]
fn code_alignment_and_pointer_helpers() {
    let body = static_body(vec![RETURN_VOID], 1, 0, 0);
    let compiler = Compiler::new(options(InstructionSet::Thumb2, CompilerFilter::Speed));
    let compiled = compiler
        .compile_method(&body, &method_ref("V", "align"), InvokeType::Static, &MethodTable::new(), &FieldTable::new())
        .expect("no bug")
        .expect("compiled");
    assert_eq!(CompiledMethod::align_code(1, InstructionSet::X86), 16);
    // Thumb2 pointers flip the interworking bit.
    assert_eq!(compiled.code_pointer(0x1000), 0x1001);
}
