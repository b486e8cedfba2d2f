//! Structural properties of the SSA form and the analyzer's gate.

mod common;

use common::*;
use lantern_aot::mir::{BlockType, ExtOp, MethodInfo, MethodTable, MirGraph, MirMeta, MirOp};
use lantern_aot::{CompilerFilter, DisableOpt, EnableDebug, InstructionSet};
use lantern_asm::{AccessFlags, InvokeType, MethodBody};

fn graph_for(body: &MethodBody, shorty: &str) -> MirGraph {
    let info = MethodInfo {
        num_vregs: body.registers_size as usize,
        num_ins: body.ins_size as usize,
        num_outs: body.outs_size as usize,
        access_flags: body.access_flags,
        shorty: shorty.into(),
        invoke_type: InvokeType::Static,
        insns_size: body.insns.len(),
        isa: InstructionSet::Thumb2,
        // Keep the diamond intact so phi properties stay observable.
        disable_opt: DisableOpt::default() | DisableOpt::BB_OPT,
        enable_debug: EnableDebug::default(),
    };
    let mut graph = MirGraph::new(info, MethodTable::new());
    graph.build(body);
    graph.code_layout();
    graph.ssa_transformation().expect("ssa");
    graph.propagate_constants();
    graph.method_use_count();
    graph
}

/// A diamond with a loop back-edge, exercising phis and dominators.
fn looped_diamond() -> MethodBody {
    let insns = vec![
        insn_21t(0x38, 2, 4)[0], insn_21t(0x38, 2, 4)[1], // 0: if-eqz v2, +4
        const4(0, 1),                                     // 2: v0 = 1
        goto(2),                                          // 3: goto join
        const4(0, 2),                                     // 4: v0 = 2
        insn_21t(0x39, 0, -5)[0], insn_21t(0x39, 0, -5)[1], // 5: if-nez v0, -5 (loop)
        return_reg(0),                                    // 7: return v0
    ];
    static_body(insns, 3, 1, 0)
}

#[test]
fn ssa_names_have_single_defs() {
    let graph = graph_for(&looped_diamond(), "II");
    assert!(graph.verify_ssa_single_def());
    assert!(graph.num_ssa_regs() >= graph.info.num_vregs);
}

#[test]
fn entry_dominates_every_reachable_block() {
    let graph = graph_for(&looped_diamond(), "II");
    let entry = graph.entry_block();
    for &bb in graph.dfs_order() {
        let dominators = graph
            .block(bb)
            .dominators
            .as_ref()
            .expect("dominators computed");
        assert!(
            dominators.is_bit_set(entry as usize),
            "entry must dominate block {bb}"
        );
    }
}

#[test]
fn dominator_sets_extend_idom_chains() {
    let graph = graph_for(&looped_diamond(), "II");
    let entry = graph.entry_block();
    for &bb in graph.dfs_order() {
        if bb == entry {
            continue;
        }
        let idom = graph.block(bb).i_dom.expect("idom assigned");
        let doms = graph.block(bb).dominators.as_ref().expect("dominators");
        let idom_doms = graph.block(idom).dominators.as_ref().expect("dominators");
        assert!(doms.is_bit_set(idom as usize));
        for bit in idom_doms.iter() {
            assert!(
                doms.is_bit_set(bit),
                "dominators({bb}) must include dominators(idom)"
            );
        }
    }
}

#[test]
fn phi_operands_match_predecessors() {
    let graph = graph_for(&looped_diamond(), "II");
    let mut saw_phi = false;
    for &bb in graph.dfs_order() {
        for mir in graph.block_mirs(bb).collect::<Vec<_>>() {
            if graph.mir(mir).insn.op != MirOp::Ext(ExtOp::Phi) {
                continue;
            }
            saw_phi = true;
            let rep = graph.mir(mir).ssa_rep.as_ref().expect("phi ssa rep");
            assert_eq!(rep.uses.len(), graph.predecessor_count(bb));
            let MirMeta::PhiIncoming(incoming) = &graph.mir(mir).meta else {
                panic!("phi without incoming blocks");
            };
            let preds: Vec<u32> = graph.block(bb).predecessors.iter().collect();
            assert_eq!(incoming, &preds);
        }
    }
    assert!(saw_phi, "the diamond merge must produce a phi");
}

#[test]
fn phis_only_at_block_starts() {
    let graph = graph_for(&looped_diamond(), "II");
    for &bb in graph.dfs_order() {
        let mut body_started = false;
        for mir in graph.block_mirs(bb).collect::<Vec<_>>() {
            if graph.mir(mir).insn.op == MirOp::Ext(ExtOp::Phi) {
                assert!(!body_started, "phi after a non-phi MIR in block {bb}");
            } else {
                body_started = true;
            }
        }
    }
}

#[test]
fn constant_propagation_tags_both_arms() {
    let graph = graph_for(&looped_diamond(), "II");
    let mut const_defs = 0;
    for &bb in graph.dfs_order() {
        for mir in graph.block_mirs(bb).collect::<Vec<_>>() {
            if graph.mir(mir).insn.op.code() == Some(lantern_asm::Opcode::Const4) {
                let def = graph.mir(mir).ssa_rep.as_ref().expect("rep").defs[0];
                assert!(graph.is_const(def));
                const_defs += 1;
            }
        }
    }
    assert_eq!(const_defs, 2);
}

#[test]
fn class_initializers_are_skipped() {
    let mut body = static_body(vec![RETURN_VOID], 1, 0, 0);
    body.access_flags = AccessFlags::STATIC | AccessFlags::CONSTRUCTOR;
    let mut graph = graph_for(&body, "V");
    assert!(graph.skip_compilation(CompilerFilter::Balanced));
    // But never under Everything.
    assert!(!graph.skip_compilation(CompilerFilter::Everything));
}

#[test]
fn interpret_only_defers_everything() {
    let body = static_body(vec![RETURN_VOID], 1, 0, 0);
    let mut graph = graph_for(&body, "V");
    assert!(graph.skip_compilation(CompilerFilter::InterpretOnly));
}

#[rstest::rstest]
#[case(CompilerFilter::Balanced)]
#[case(CompilerFilter::Space)]
#[case(CompilerFilter::Speed)]
fn tiny_methods_compile_under_every_filter(#[case] filter: CompilerFilter) {
    let body = static_body(vec![const4(0, 1), return_reg(0)], 1, 0, 0);
    let mut graph = graph_for(&body, "I");
    assert!(!graph.skip_compilation(filter), "filter {filter:?}");
}

#[test]
fn fused_compare_consumes_the_cmp() {
    // cmp-long v0, v2, v4; if-ltz v0 -> branch; fusion leaves no live cmp.
    let insns = vec![
        0x31, 0x02 | (0x04 << 8),                         // 0: cmp-long v0, v2, v4
        insn_21t(0x3a, 0, 3)[0], insn_21t(0x3a, 0, 3)[1], // 2: if-ltz v0, +3
        RETURN_VOID,                                      // 4
        RETURN_VOID,                                      // 5: taken target
    ];
    let body = static_body(insns, 6, 4, 0);
    let info = MethodInfo {
        num_vregs: 6,
        num_ins: 4,
        num_outs: 0,
        access_flags: body.access_flags,
        shorty: "VJJ".into(),
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

    let fused = (0..graph.num_mirs() as u32)
        .filter(|&m| graph.mir(m).insn.op == MirOp::Ext(ExtOp::FusedCmpLong))
        .count();
    assert_eq!(fused, 1);
    let live_cmps = (0..graph.num_mirs() as u32)
        .filter(|&m| graph.mir(m).insn.op.code() == Some(lantern_asm::Opcode::CmpLong))
        .count();
    assert_eq!(live_cmps, 0, "the compare must be squashed into the branch");
}

#[test]
fn dead_blocks_stay_out_of_traversals() {
    let graph = graph_for(&looped_diamond(), "II");
    for &bb in graph.dfs_order() {
        assert_ne!(graph.block(bb).block_type, BlockType::Dead);
    }
}
