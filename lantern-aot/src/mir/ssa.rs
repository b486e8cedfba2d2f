//! SSA transformation: DFS orders, dominators, dominance frontiers, phi
//! insertion and renaming.

use lantern_arena::BitVector;
use tracing::trace;

use super::{BlockId, BlockType, ExtOp, MirGraph, MirInsn, MirMeta, MirOp};
use crate::{Bug, BugKind, EnableDebug, SReg};

const NOT_VISITED: i32 = -1;

impl MirGraph {
    /// Run the full SSA pipeline.
    pub fn ssa_transformation(&mut self) -> Result<(), Bug> {
        self.compute_dfs_orders();
        self.compute_dominators()?;
        self.initialize_ssa_conversion();
        self.compute_def_block_matrix();
        self.insert_phi_nodes();

        self.clear_all_visited_flags();
        self.rename_ssa_registers();
        self.finish_ssa_naming();

        self.temp_ssa_register_v = Some(BitVector::new(self.num_ssa_regs(), false));
        self.insert_phi_node_operands();

        if self.info.enable_debug.contains(EnableDebug::VERIFY_DATAFLOW) && !self.verify_pred_info()
        {
            return Err(Bug::new(
                BugKind::MalformedGraph,
                "predecessor info inconsistent after SSA",
            ));
        }
        Ok(())
    }

    /// Iterative forward DFS from the entry block along all successor kinds;
    /// records preorder and postorder, and numbers blocks by postorder.
    pub(crate) fn compute_dfs_orders(&mut self) {
        self.dfs_order.reset();
        self.dfs_post_order.reset();
        self.clear_all_visited_flags();

        let entry = self.entry_block();
        self.block_mut(entry).visited = true;
        self.dfs_order.insert(entry);
        let mut stack = vec![entry];
        while let Some(&curr) = stack.last() {
            match self.next_unvisited_successor(curr) {
                Some(next) => {
                    self.block_mut(next).visited = true;
                    self.dfs_order.insert(next);
                    stack.push(next);
                }
                None => {
                    self.block_mut(curr).dfs_id = self.dfs_post_order.size();
                    self.dfs_post_order.insert(curr);
                    stack.pop();
                }
            }
        }
        self.num_reachable_blocks = self.dfs_order.size();
    }

    fn needs_visit(&self, bb: Option<BlockId>) -> Option<BlockId> {
        bb.filter(|&b| !self.block(b).visited && !self.block(b).hidden)
    }

    fn next_unvisited_successor(&self, bb: BlockId) -> Option<BlockId> {
        let block = self.block(bb);
        self.needs_visit(block.fall_through)
            .or_else(|| self.needs_visit(block.taken))
            .or_else(|| {
                block.successor_list.as_ref().and_then(|list| {
                    list.entries
                        .iter()
                        .find_map(|&(b, _)| self.needs_visit(Some(b)))
                })
            })
    }

    /// For every vreg, the set of blocks defining it.  Incoming parameters
    /// count as defined in the entry block.
    pub(crate) fn compute_def_block_matrix(&mut self) {
        let num_registers = self.info.num_vregs;
        let num_blocks = self.num_blocks();
        self.def_block_matrix = (0..num_registers)
            .map(|_| BitVector::new(num_blocks, false))
            .collect();

        let all_blocks: Vec<BlockId> = (0..num_blocks as BlockId).collect();
        for &bb in &all_blocks {
            self.find_local_live_in(bb);
        }
        for &bb in &all_blocks {
            let Some(df_info) = self.block(bb).data_flow.as_ref() else {
                continue;
            };
            let defs: Vec<usize> = df_info.def_v.iter().collect();
            for v in defs {
                self.def_block_matrix[v].set_bit(bb as usize);
            }
        }

        let entry = self.entry_block();
        let first_in = num_registers - self.info.num_ins;
        for in_reg in first_in..num_registers {
            self.def_block_matrix[in_reg].set_bit(entry as usize);
        }
    }

    /// Cooper/Harvey/Kennedy iterative dominator computation over postorder
    /// ranks, then materialized dominator sets and frontiers.
    pub(crate) fn compute_dominators(&mut self) -> Result<(), Bug> {
        let num_reachable = self.num_reachable_blocks;
        let num_total = self.num_blocks();

        let reachable: Vec<BlockId> = self.dfs_order.as_slice().to_vec();
        for &bb in &reachable {
            self.initialize_domination_info(bb, num_total);
        }

        self.i_dom_list = vec![NOT_VISITED; num_reachable];
        let entry = self.entry_block();
        debug_assert_eq!(self.block(entry).dfs_id, num_reachable - 1);
        let entry_dfs_id = self.block(entry).dfs_id;
        self.i_dom_list[entry_dfs_id] = entry_dfs_id as i32;

        // Fixpoint over reverse postorder.
        let rpo: Vec<BlockId> = {
            let mut order = self.dfs_post_order.as_slice().to_vec();
            order.reverse();
            order
        };
        let mut change = true;
        while change {
            change = false;
            for &bb in &rpo {
                if bb == entry {
                    continue;
                }
                change |= self.compute_block_idom(bb)?;
            }
        }

        let entry_id = entry as usize;
        {
            let doms = self.block_mut(entry).dominators.as_mut().expect("dom set");
            doms.clear_all();
            doms.set_bit(entry_id);
        }
        self.block_mut(entry).i_dom = None;

        for &bb in &reachable {
            self.set_dominators(bb);
        }
        for &bb in &rpo {
            self.compute_block_dominators(bb);
        }

        self.compute_dom_post_order(entry);
        let dom_order: Vec<BlockId> = self.dom_post_order.as_slice().to_vec();
        for bb in dom_order {
            self.compute_dominance_frontier(bb);
        }
        Ok(())
    }

    fn initialize_domination_info(&mut self, bb: BlockId, num_total_blocks: usize) {
        let block = self.block_mut(bb);
        let mut dominators = BitVector::new(num_total_blocks, false);
        dominators.set_initial_bits(num_total_blocks);
        block.dominators = Some(dominators);
        block.i_dominated = Some(BitVector::new(num_total_blocks, false));
        block.dom_frontier = Some(BitVector::new(num_total_blocks, false));
    }

    /// Intersect two idom chains by walking up postorder ranks.
    fn find_common_parent(&self, mut block1: i32, mut block2: i32) -> Result<i32, Bug> {
        while block1 != block2 {
            while block1 < block2 {
                block1 = self.i_dom_list[block1 as usize];
                if block1 == NOT_VISITED {
                    return Err(Bug::new(
                        BugKind::DominatorIntersection,
                        "idom chain hit an unvisited block",
                    ));
                }
            }
            while block2 < block1 {
                block2 = self.i_dom_list[block2 as usize];
                if block2 == NOT_VISITED {
                    return Err(Bug::new(
                        BugKind::DominatorIntersection,
                        "idom chain hit an unvisited block",
                    ));
                }
            }
        }
        Ok(block1)
    }

    fn compute_block_idom(&mut self, bb: BlockId) -> Result<bool, Bug> {
        // Find the first processed predecessor.
        let preds: Vec<BlockId> = self.block(bb).predecessors.as_slice().to_vec();
        let mut idom = NOT_VISITED;
        for &pred in &preds {
            let pred_dfs = self.block(pred).dfs_id;
            if pred_dfs == usize::MAX {
                continue; // unreachable predecessor
            }
            if self.i_dom_list[pred_dfs] != NOT_VISITED {
                idom = pred_dfs as i32;
                break;
            }
        }
        if idom == NOT_VISITED {
            return Err(Bug::new(
                BugKind::DominatorIntersection,
                format!("block {bb} has no processed predecessor in RPO walk"),
            ));
        }
        for &pred in &preds {
            let pred_dfs = self.block(pred).dfs_id;
            if pred_dfs == usize::MAX || self.i_dom_list[pred_dfs] == NOT_VISITED {
                continue;
            }
            idom = self.find_common_parent(pred_dfs as i32, idom)?;
        }

        let dfs_id = self.block(bb).dfs_id;
        if self.i_dom_list[dfs_id] != idom {
            self.i_dom_list[dfs_id] = idom;
            return Ok(true);
        }
        Ok(false)
    }

    fn set_dominators(&mut self, bb: BlockId) {
        let entry = self.entry_block();
        if bb == entry {
            return;
        }
        let idom_dfs_idx = self.i_dom_list[self.block(bb).dfs_id];
        debug_assert_ne!(idom_dfs_idx, NOT_VISITED);
        let i_dom = self.dfs_post_order.get(idom_dfs_idx as usize);
        self.block_mut(bb).i_dom = Some(i_dom);
        self.block_mut(i_dom)
            .i_dominated
            .as_mut()
            .expect("i_dominated")
            .set_bit(bb as usize);
    }

    fn compute_block_dominators(&mut self, bb: BlockId) {
        let entry = self.entry_block();
        if bb == entry {
            return;
        }
        let idom = self.block(bb).i_dom.expect("idom set");
        let idom_doms = self
            .block(idom)
            .dominators
            .as_ref()
            .expect("dominators")
            .clone();
        let doms = self.block_mut(bb).dominators.as_mut().expect("dominators");
        doms.copy_from(&idom_doms);
        doms.set_bit(bb as usize);
    }

    /// Postorder walk of the dominator tree; also performs the cheap loop
    /// detection used by the analyzer and nesting-depth weighting.
    fn compute_dom_post_order(&mut self, entry: BlockId) {
        self.dom_post_order.reset();
        self.clear_all_visited_flags();
        self.block_mut(entry).visited = true;
        // (block, cursor into its i_dominated set)
        let mut work_stack: Vec<(BlockId, Vec<BlockId>)> = vec![(entry, self.dominated_of(entry))];
        while let Some((curr, children)) = work_stack.last_mut() {
            let next = children.iter().find(|&&c| {
                let b = self.block(c);
                !b.visited && !b.hidden
            });
            match next {
                Some(&child) => {
                    self.block_mut(child).visited = true;
                    let grandchildren = self.dominated_of(child);
                    work_stack.push((child, grandchildren));
                }
                None => {
                    let curr = *curr;
                    self.dom_post_order.insert(curr);
                    work_stack.pop();
                    // Hacky loop detection.
                    let taken = self.block(curr).taken;
                    if let Some(tk) = taken {
                        let dominated = self
                            .block(curr)
                            .dominators
                            .as_ref()
                            .map(|d| d.is_bit_set(tk as usize))
                            .unwrap_or(false);
                        if dominated {
                            self.attributes |= super::method_attrs::HAS_LOOP;
                            self.bump_loop_nesting(tk);
                        }
                    }
                }
            }
        }
    }

    fn dominated_of(&self, bb: BlockId) -> Vec<BlockId> {
        self.block(bb)
            .i_dominated
            .as_ref()
            .map(|v| v.iter().map(|i| i as BlockId).collect())
            .unwrap_or_default()
    }

    /// Weight everything dominated by a loop head one level deeper.
    fn bump_loop_nesting(&mut self, head: BlockId) {
        let members: Vec<BlockId> = self
            .dfs_order
            .as_slice()
            .iter()
            .copied()
            .filter(|&b| {
                self.block(b)
                    .dominators
                    .as_ref()
                    .map(|d| d.is_bit_set(head as usize))
                    .unwrap_or(false)
            })
            .collect();
        for bb in members {
            let block = self.block_mut(bb);
            block.nesting_depth = block.nesting_depth.saturating_add(1);
        }
    }

    fn check_for_dominance_frontier(&mut self, dom_bb: BlockId, succ_bb: BlockId) {
        let succ = self.block(succ_bb);
        if succ.i_dom != Some(dom_bb)
            && succ.block_type == BlockType::ByteCode
            && !succ.hidden
        {
            self.block_mut(dom_bb)
                .dom_frontier
                .as_mut()
                .expect("dom frontier")
                .set_bit(succ_bb as usize);
        }
    }

    fn compute_dominance_frontier(&mut self, bb: BlockId) {
        // DF_local: successors not immediately dominated by bb.
        for succ in self.successors(bb) {
            self.check_for_dominance_frontier(bb, succ);
        }
        // DF_up: frontiers of dominated blocks.
        for dominated in self.dominated_of(bb) {
            let up: Vec<usize> = self
                .block(dominated)
                .dom_frontier
                .as_ref()
                .expect("dom frontier")
                .iter()
                .collect();
            for df_up in up {
                self.check_for_dominance_frontier(bb, df_up as BlockId);
            }
        }
    }

    /// Iterative backward liveness, then phi insertion over the pruned
    /// dominance frontier of each vreg's def blocks.
    pub(crate) fn insert_phi_nodes(&mut self) {
        let num_blocks = self.num_blocks();
        let num_vregs = self.info.num_vregs;

        // live_in fixpoint over postorder.
        let post: Vec<BlockId> = self.dfs_post_order.as_slice().to_vec();
        let mut change = true;
        while change {
            change = false;
            for &bb in &post {
                change |= self.compute_block_live_ins(bb);
            }
        }

        let mut phi_blocks = BitVector::new(num_blocks, false);
        let mut tmp_blocks = BitVector::new(num_blocks, false);
        let mut input_blocks = BitVector::new(num_blocks, false);

        for v_reg in (0..num_vregs).rev() {
            input_blocks.copy_from(&self.def_block_matrix[v_reg]);
            phi_blocks.clear_all();
            loop {
                tmp_blocks.clear_all();
                let inputs: Vec<usize> = input_blocks.iter().collect();
                for def_bb in inputs {
                    if let Some(frontier) = self.block(def_bb as BlockId).dom_frontier.as_ref() {
                        tmp_blocks.union(frontier);
                    }
                }
                if phi_blocks.same_bits_set(&tmp_blocks) {
                    break;
                }
                phi_blocks.copy_from(&tmp_blocks);
                input_blocks.copy_from(&phi_blocks);
                input_blocks.union(&self.def_block_matrix[v_reg]);
            }

            let targets: Vec<usize> = phi_blocks.iter().collect();
            for idx in targets {
                let phi_bb = idx as BlockId;
                // Clobbered before use: no phi needed.
                let live_in = self
                    .block(phi_bb)
                    .data_flow
                    .as_ref()
                    .map(|df| df.live_in_v.is_bit_set(v_reg))
                    .unwrap_or(false);
                if !live_in {
                    continue;
                }
                let offset = self.block(phi_bb).start_offset;
                let insn = MirInsn {
                    op: MirOp::Ext(ExtOp::Phi),
                    va: v_reg as u32,
                    vb: 0,
                    vb_wide: 0,
                    vc: 0,
                    args: [0; 5],
                };
                let phi = self.new_mir(insn, offset, 0);
                self.prepend_mir(phi_bb, phi);
            }
        }
    }

    /// live_in = use + (successor live_in - def), for one block.  Returns
    /// whether the set changed.
    fn compute_block_live_ins(&mut self, bb: BlockId) -> bool {
        let Some(df_info) = self.block(bb).data_flow.as_ref() else {
            return false;
        };
        let mut temp = df_info.live_in_v.clone();
        let def_v = df_info.def_v.clone();
        for succ in self.successors(bb) {
            if let Some(succ_df) = self.block(succ).data_flow.as_ref() {
                // temp |= succ.live_in & !def
                for idx in succ_df.live_in_v.iter() {
                    if !def_v.is_bit_set(idx) {
                        temp.set_bit(idx);
                    }
                }
            }
        }
        let df_info = self.block_mut(bb).data_flow.as_mut().expect("df info");
        if !temp.same_bits_set(&df_info.live_in_v) {
            df_info.live_in_v.copy_from(&temp);
            return true;
        }
        false
    }

    /// Preorder renaming walk with map snapshot/restore, as an explicit
    /// stack rather than recursion.
    fn rename_ssa_registers(&mut self) {
        let entry = self.entry_block();
        // (pending children, rename-map snapshot restored before each child)
        let mut stack: Vec<(Vec<BlockId>, Vec<SReg>)> = Vec::new();
        self.visit_for_rename(entry);
        stack.push((self.rename_children(entry), self.vreg_to_ssa_map.clone()));
        while let Some(top) = stack.len().checked_sub(1) {
            match stack[top].0.pop() {
                Some(child) => {
                    self.vreg_to_ssa_map = stack[top].1.clone();
                    if self.block(child).visited || self.block(child).hidden {
                        continue;
                    }
                    self.visit_for_rename(child);
                    stack.push((self.rename_children(child), self.vreg_to_ssa_map.clone()));
                }
                None => {
                    stack.pop();
                }
            }
        }
    }

    fn visit_for_rename(&mut self, bb: BlockId) {
        self.block_mut(bb).visited = true;
        self.do_ssa_conversion(bb);
    }

    fn rename_children(&self, bb: BlockId) -> Vec<BlockId> {
        // Reverse so pops visit fall-through first, matching the recursive
        // formulation.
        let mut out = self.successors(bb);
        out.reverse();
        out
    }

    /// Point each phi's uses at the predecessors' final SSA names.
    pub(crate) fn insert_phi_node_operands(&mut self) {
        let reachable: Vec<BlockId> = self.dfs_order.as_slice().to_vec();
        for bb in reachable {
            let phis: Vec<super::MirId> = self
                .block_mirs(bb)
                .take_while(|&m| self.mir(m).insn.op == MirOp::Ext(ExtOp::Phi))
                .collect();
            for phi in phis {
                let v_reg = self.mir(phi).insn.va as usize;
                let preds: Vec<BlockId> = self.block(bb).predecessors.as_slice().to_vec();
                let mut uses = Vec::with_capacity(preds.len());
                let mut incoming = Vec::with_capacity(preds.len());
                for pred in preds {
                    let s_reg = self.block(pred).data_flow.as_ref().expect("df info")
                        .vreg_to_ssa_map[v_reg];
                    uses.push(s_reg);
                    incoming.push(pred);
                }
                trace!(block = bb, v_reg, operands = uses.len(), "phi operands");
                let mir = self.mir_mut(phi);
                let rep = mir.ssa_rep.as_mut().expect("phi ssa rep");
                let num = uses.len();
                rep.fp_use = vec![false; num];
                rep.uses = uses;
                mir.meta = MirMeta::PhiIncoming(incoming);
            }
        }
    }

    /// Verify the single-def SSA property; used by tests and the dataflow
    /// verifier.
    pub fn verify_ssa_single_def(&self) -> bool {
        let mut seen = vec![false; self.num_ssa_regs()];
        for bb in self.dfs_order.as_slice() {
            for mir in self.block_mirs(*bb) {
                if let Some(rep) = &self.mir(mir).ssa_rep {
                    for &def in &rep.defs {
                        if seen[def as usize] {
                            return false;
                        }
                        seen[def as usize] = true;
                    }
                }
            }
        }
        true
    }
}

impl MirGraph {
    /// Refresh the cached SSA-name count after renaming.
    pub(crate) fn finish_ssa_naming(&mut self) {
        let n = self.ssa_base_vregs.len();
        self.set_num_ssa_regs(n);
    }
}
