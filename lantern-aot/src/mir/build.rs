//! CFG construction from the decoded instruction stream.

use lantern_asm::{
    ArrayDataPayload, DecodedInstruction, MethodBody, OpFlags, Opcode, PackedSwitchPayload,
    SparseSwitchPayload,
};
use tracing::trace;

use super::{
    BlockId, BlockType, ExtOp, MirGraph, MirId, MirOp, SpecialCase, SuccessorKind, SuccessorList,
};
use crate::DisableOpt;

impl MirGraph {
    /// Parse the method body into basic blocks.
    pub fn build(&mut self, body: &MethodBody) {
        self.insns = body.insns.clone();
        self.process_try_catch_blocks(body);

        // First real block; the entry block falls through to it.
        let first = self.new_block(BlockType::ByteCode);
        self.map_block(0, first);
        let entry = self.entry_block();
        self.block_mut(entry).fall_through = Some(first);
        self.block_mut(first).predecessors.insert(entry);

        let mut cur_block = Some(first);
        let insns = &body.insns;
        let mut offset = 0usize;
        while offset < insns.len() {
            if is_payload_at(insns, offset) {
                // Switch/array payloads are data; they end the instruction
                // walk for this region.
                offset += payload_size_at(insns, offset);
                cur_block = None;
                continue;
            }
            let Some(decoded) = DecodedInstruction::decode_at(insns, offset) else {
                trace!(offset, "undecodable unit, abandoning trailing region");
                break;
            };
            let width = decoded.size_in_code_units() as u16;
            let opcode = decoded.opcode;
            self.count_opcode(opcode);

            let bb = match cur_block {
                Some(bb) => bb,
                // Dead region after a payload; decode into an orphan block
                // head if a branch targets it, otherwise skip.
                None => match self.find_block(offset as u32) {
                    Some(bb) => {
                        cur_block = Some(bb);
                        bb
                    }
                    None => {
                        offset += width as usize;
                        continue;
                    }
                },
            };

            let mir = self.new_mir(decoded.into(), offset as u32, width);
            self.append_mir(bb, mir);

            let flags = opcode.flags();
            let next_offset = offset as u32 + width as u32;
            let have_more_code = (next_offset as usize) < insns.len();

            let mut ending_block = bb;
            if flags.contains(OpFlags::BRANCH) {
                ending_block =
                    self.process_can_branch(bb, &decoded, offset as u32, width, have_more_code);
            } else if flags.contains(OpFlags::RETURN) {
                self.block_mut(bb).terminated_by_return = true;
                let exit = self.exit_block();
                self.block_mut(bb).fall_through = Some(exit);
                self.block_mut(exit).predecessors.insert(bb);
                if have_more_code {
                    self.find_or_create_block(next_offset, false);
                }
            } else if flags.contains(OpFlags::SWITCH) {
                self.process_can_switch(bb, &decoded, offset as u32, body);
            } else if flags.contains(OpFlags::THROW) {
                ending_block =
                    self.process_can_throw(bb, mir, &decoded, offset as u32, width, body);
            }
            cur_block = Some(ending_block);

            offset = next_offset as usize;

            // A previously created block head at the next offset closes the
            // current block; connect through fall-through when control
            // continues.
            if let Some(next_block) = self.find_block(offset as u32) {
                if let Some(cb) = cur_block {
                    if self.block(cb).fall_through.is_none()
                        && flags.contains(OpFlags::CONTINUE)
                        && next_block != cb
                    {
                        self.block_mut(cb).fall_through = Some(next_block);
                        self.block_mut(next_block).predecessors.insert(cb);
                    }
                }
                cur_block = Some(next_block);
            }
        }

        if !self.info.disable_opt.contains(DisableOpt::MATCH) {
            self.detect_special_case(body);
        }
    }

    /// Mark try-covered offsets and pre-create handler entry blocks.
    fn process_try_catch_blocks(&mut self, body: &MethodBody) {
        for try_item in &body.tries {
            for off in try_item.start_offset..try_item.start_offset + try_item.insn_count {
                self.try_block_addr.set_bit(off as usize);
            }
        }
        let handler_offsets: Vec<u32> = body
            .tries
            .iter()
            .flat_map(|t| t.handlers.iter().map(|&(_, off)| off))
            .collect();
        for off in handler_offsets {
            self.find_or_create_block(off, false);
        }
    }

    /// Find the block headed at `offset`, creating (and splitting an
    /// enclosing block) as needed.
    fn find_or_create_block(&mut self, offset: u32, split: bool) -> BlockId {
        if let Some(bb) = self.find_block(offset) {
            return bb;
        }
        if split {
            if let Some(enclosing) = self.find_enclosing_block(offset) {
                return self.split_block(offset, enclosing);
            }
        }
        let bb = self.new_block(BlockType::ByteCode);
        self.block_mut(bb).start_offset = offset;
        self.map_block(offset, bb);
        bb
    }

    fn find_enclosing_block(&self, offset: u32) -> Option<BlockId> {
        for block in &self.blocks {
            if block.block_type != BlockType::ByteCode {
                continue;
            }
            let (Some(first), Some(last)) = (block.first_mir, block.last_mir) else {
                continue;
            };
            if self.mir(first).offset < offset && offset <= self.mir(last).offset {
                return Some(block.id);
            }
        }
        None
    }

    /// Split `orig` at the MIR whose offset equals `code_offset`; the tail
    /// moves to a new bottom block.
    fn split_block(&mut self, code_offset: u32, orig: BlockId) -> BlockId {
        let split_at = self
            .block_mirs(orig)
            .find(|&m| self.mir(m).offset == code_offset)
            .expect("split offset must start an instruction");

        let bottom = self.new_block(BlockType::ByteCode);
        self.block_mut(bottom).start_offset = code_offset;

        // Move the tail of the instruction list.
        let prev = self.mir(split_at).prev;
        let orig_last = self.block(orig).last_mir;
        self.block_mut(bottom).first_mir = Some(split_at);
        self.block_mut(bottom).last_mir = orig_last;
        self.mir_mut(split_at).prev = None;
        if let Some(p) = prev {
            self.mir_mut(p).next = None;
        }
        self.block_mut(orig).last_mir = prev;
        if prev.is_none() {
            self.block_mut(orig).first_mir = None;
        }

        // The bottom block inherits the outgoing edges.
        let (taken, fall_through, successor_list) = {
            let ob = self.block_mut(orig);
            let t = ob.taken.take();
            let f = ob.fall_through.take();
            let s = ob.successor_list.take();
            (t, f, s)
        };
        let term = self.block(orig).terminated_by_return;
        self.block_mut(bottom).taken = taken;
        self.block_mut(bottom).fall_through = fall_through;
        self.block_mut(bottom).successor_list = successor_list;
        self.block_mut(bottom).terminated_by_return = term;
        self.block_mut(orig).terminated_by_return = false;
        for succ in self.successors(bottom) {
            self.replace_predecessor(succ, orig, bottom);
        }

        self.block_mut(orig).fall_through = Some(bottom);
        self.block_mut(bottom).predecessors.insert(orig);
        self.map_block(code_offset, bottom);
        bottom
    }

    fn replace_predecessor(&mut self, bb: BlockId, old: BlockId, new: BlockId) {
        let preds = &mut self.block_mut(bb).predecessors;
        for i in 0..preds.size() {
            if preds.get(i) == old {
                preds.put(i, new);
            }
        }
    }

    fn process_can_branch(
        &mut self,
        bb: BlockId,
        decoded: &DecodedInstruction,
        offset: u32,
        width: u16,
        have_more_code: bool,
    ) -> BlockId {
        let target = (offset as i32 + decoded.branch_target()) as u32;
        let conditional = !matches!(
            decoded.opcode,
            Opcode::Goto | Opcode::Goto16 | Opcode::Goto32
        );
        self.block_mut(bb).conditional_branch = conditional;

        let taken = self.find_or_create_block(target, true);
        // Splitting may have moved the branch itself into the bottom block.
        let bb = self.owning_block(offset).unwrap_or(bb);
        self.block_mut(bb).taken = Some(taken);
        self.block_mut(taken).predecessors.insert(bb);

        if decoded.opcode.flags().contains(OpFlags::CONTINUE) {
            let ft = self.find_or_create_block(offset + width as u32, true);
            self.block_mut(bb).fall_through = Some(ft);
            self.block_mut(ft).predecessors.insert(bb);
        } else if have_more_code {
            // Head a block for any (possibly dead) code after the goto.
            self.find_or_create_block(offset + width as u32, false);
        }
        bb
    }

    /// The block whose instruction span covers `offset` and contains an
    /// instruction starting there.
    fn owning_block(&self, offset: u32) -> Option<BlockId> {
        self.blocks
            .iter()
            .find(|b| {
                b.block_type == BlockType::ByteCode
                    && self
                        .block_mirs_raw(b.first_mir)
                        .any(|m| self.mir(m).offset == offset)
            })
            .map(|b| b.id)
    }

    fn block_mirs_raw(&self, first: Option<MirId>) -> impl Iterator<Item = MirId> + '_ {
        let mut cursor = first;
        std::iter::from_fn(move || {
            let id = cursor?;
            cursor = self.mir(id).next;
            Some(id)
        })
    }

    fn process_can_switch(
        &mut self,
        bb: BlockId,
        decoded: &DecodedInstruction,
        offset: u32,
        body: &MethodBody,
    ) {
        let table_offset = (offset as i32 + decoded.imm_b()) as usize;
        let (kind, pairs): (SuccessorKind, Vec<(i32, i32)>) = match decoded.opcode {
            Opcode::PackedSwitch => {
                let payload = PackedSwitchPayload::decode_at(&body.insns, table_offset)
                    .expect("packed switch payload");
                (
                    SuccessorKind::PackedSwitch,
                    payload
                        .targets
                        .iter()
                        .enumerate()
                        .map(|(i, &t)| (t, payload.first_key + i as i32))
                        .collect(),
                )
            }
            Opcode::SparseSwitch => {
                let payload = SparseSwitchPayload::decode_at(&body.insns, table_offset)
                    .expect("sparse switch payload");
                (
                    SuccessorKind::SparseSwitch,
                    payload
                        .targets
                        .iter()
                        .zip(payload.keys.iter())
                        .map(|(&t, &k)| (t, k))
                        .collect(),
                )
            }
            other => unreachable!("not a switch opcode: {other}"),
        };

        let mut entries = Vec::with_capacity(pairs.len());
        for (target, key) in pairs {
            let case_block = self.find_or_create_block((offset as i32 + target) as u32, true);
            self.block_mut(case_block).predecessors.insert(bb);
            entries.push((case_block, key));
        }
        self.block_mut(bb).successor_list = Some(SuccessorList { kind, entries });

        let width = decoded.size_in_code_units() as u32;
        let ft = self.find_or_create_block(offset + width, false);
        self.block_mut(bb).fall_through = Some(ft);
        self.block_mut(ft).predecessors.insert(bb);
    }

    fn process_can_throw(
        &mut self,
        bb: BlockId,
        mir: MirId,
        decoded: &DecodedInstruction,
        offset: u32,
        width: u16,
        body: &MethodBody,
    ) -> BlockId {
        let in_try_block = self.try_block_addr.is_bit_set(offset as usize);
        if in_try_block {
            let mut entries = Vec::new();
            for try_item in &body.tries {
                if offset < try_item.start_offset
                    || offset >= try_item.start_offset + try_item.insn_count
                {
                    continue;
                }
                for &(type_idx, handler_off) in &try_item.handlers {
                    let catch_block = self.find_or_create_block(handler_off, false);
                    self.block_mut(catch_block).block_type = BlockType::ByteCode;
                    self.block_mut(catch_block).catch_entry = true;
                    self.catches.insert(handler_off);
                    self.block_mut(catch_block).predecessors.insert(bb);
                    entries.push((catch_block, type_idx as i32));
                }
            }
            if !entries.is_empty() {
                self.block_mut(bb).successor_list = Some(SuccessorList {
                    kind: SuccessorKind::Catch,
                    entries,
                });
            }
        }

        if decoded.opcode == Opcode::Throw {
            self.block_mut(bb).explicit_throw = true;
            if (offset + width as u32) < body.insns.len() as u32 {
                self.find_or_create_block(offset + width as u32, false);
            }
            return bb;
        }

        let attrs = decoded.opcode.dataflow_attrs();
        if attrs & lantern_asm::dataflow::df::HAS_NR_CHKS == 0 {
            // Throws from inside the operation (calls, allocation, resolve):
            // the block ends here with its catch edges; control resumes in a
            // fresh fall-through block.
            let cont = self.find_or_create_block(offset + width as u32, false);
            self.block_mut(bb).fall_through = Some(cont);
            self.block_mut(cont).predecessors.insert(bb);
            return cont;
        }

        // A null/range-checking instruction is split: the check half ends
        // this block and owns the exception edges, the work half heads the
        // fall-through block.  The block-combine pass undoes the split once
        // the checks are proved redundant.
        let eh_block = self.new_block(BlockType::ExceptionHandling);
        self.block_mut(eh_block).start_offset = offset;
        self.block_mut(bb).taken = Some(eh_block);
        self.block_mut(eh_block).predecessors.insert(bb);

        let work_block = self.new_block(BlockType::ByteCode);
        self.block_mut(work_block).start_offset = offset;
        self.block_mut(bb).fall_through = Some(work_block);
        self.block_mut(work_block).predecessors.insert(bb);

        let work_insn = self.mir(mir).insn;
        let work = self.new_mir(work_insn, offset, width);
        self.append_mir(work_block, work);
        self.mir_mut(mir).insn.op = MirOp::Ext(ExtOp::Check);
        // Pair the halves both ways: the combine pass follows check -> work,
        // value numbering propagates eliminated checks work -> check.
        self.mir_mut(mir).meta = super::MirMeta::ThrowInsn(work);
        self.mir_mut(work).meta = super::MirMeta::ThrowInsn(mir);

        work_block
    }

    /// Recognize the tiny-method templates the skip filter always compiles.
    fn detect_special_case(&mut self, body: &MethodBody) {
        let Some(first) = self.find_block(0) else {
            return;
        };
        let mirs: Vec<MirId> = self.block_mirs(first).collect();
        let op_at = |i: usize| self.mir(mirs[i]).insn.op.code();
        self.special_case = match mirs.len() {
            1 if op_at(0) == Some(Opcode::ReturnVoid) => SpecialCase::NullMethod,
            1 if matches!(op_at(0), Some(Opcode::Return | Opcode::ReturnObject)) => {
                let va = self.mir(mirs[0]).insn.va;
                let first_in = (body.registers_size - body.ins_size) as u32;
                if va >= first_in {
                    SpecialCase::Identity
                } else {
                    SpecialCase::None
                }
            }
            2 => {
                let is_const = matches!(
                    op_at(0),
                    Some(Opcode::Const4 | Opcode::Const16 | Opcode::Const)
                );
                let is_return = matches!(op_at(1), Some(Opcode::Return));
                let same_reg = self.mir(mirs[0]).insn.va == self.mir(mirs[1]).insn.va;
                if is_const && is_return && same_reg {
                    SpecialCase::ConstFunction
                } else {
                    SpecialCase::None
                }
            }
            _ => SpecialCase::None,
        };
    }
}

fn is_payload_at(insns: &[u16], offset: usize) -> bool {
    matches!(
        insns[offset],
        lantern_asm::PACKED_SWITCH_SIGNATURE
            | lantern_asm::SPARSE_SWITCH_SIGNATURE
            | lantern_asm::ARRAY_DATA_SIGNATURE
    )
}

fn payload_size_at(insns: &[u16], offset: usize) -> usize {
    match insns[offset] {
        lantern_asm::PACKED_SWITCH_SIGNATURE => {
            let size = insns[offset + 1] as usize;
            size * 2 + 4
        }
        lantern_asm::SPARSE_SWITCH_SIGNATURE => {
            let size = insns[offset + 1] as usize;
            size * 4 + 2
        }
        lantern_asm::ARRAY_DATA_SIGNATURE => {
            let width = insns[offset + 1] as usize;
            let count = insns[offset + 2] as usize | (insns[offset + 3] as usize) << 16;
            ArrayDataPayload::units_for(width, count)
        }
        _ => unreachable!("not a payload"),
    }
}
