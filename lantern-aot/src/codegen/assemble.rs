//! Offset assignment, iterative assembly and installation of the data
//! pools, plus production of the mapping, GC-map and register-map tables.

use lantern_asm::leb128;
use lantern_asm::InvokeType;
use tracing::{debug, trace};

use super::Codegen;
use crate::compiled::Patch;
use crate::lir::{AssemblerStatus, LirId, LirOp, PseudoOp};
use crate::{Bug, BugKind};

/// Widening retries before the assembler gives up; exceeding this is a
/// compiler bug, not an input property.
pub const MAX_ASSEMBLER_RETRIES: u32 = 50;

fn push_word(buf: &mut Vec<u8>, data: i32) {
    buf.extend_from_slice(&data.to_le_bytes());
}

fn align_buffer(buf: &mut Vec<u8>, offset: u32) {
    while (buf.len() as u32) < offset {
        buf.push(0);
    }
}

/// Multiplicative hash over native offsets for the GC-map index.
fn gc_map_hash(native_offset: u32) -> u32 {
    native_offset.wrapping_mul(0x9e37_79b9) >> 16
}

impl Codegen<'_> {
    /// Assemble iteratively, install pools and produce the metadata tables.
    pub(crate) fn assemble_lir(&mut self, reference_maps: &[(u32, Vec<u8>)]) -> Result<(), Bug> {
        self.remove_redundant_branches();
        self.assign_offsets();

        let mut retries = 0u32;
        loop {
            self.code_buffer.clear();
            match self.target.assemble(&mut self.lirs, &mut self.code_buffer) {
                AssemblerStatus::Success => break,
                AssemblerStatus::RetryAll => {
                    retries += 1;
                    if retries > MAX_ASSEMBLER_RETRIES {
                        return Err(Bug::new(
                            BugKind::AssemblerRetriesExhausted,
                            format!("assembly did not converge in {MAX_ASSEMBLER_RETRIES} retries"),
                        ));
                    }
                    trace!(retries, "widened instruction, reassigning offsets");
                    self.assign_offsets();
                }
            }
        }
        self.install_literal_pools();
        self.install_switch_tables();
        self.install_fill_array_data();
        debug_assert_eq!(self.code_buffer.len() as u32, self.total_size);

        self.create_mapping_tables()?;
        self.create_native_gc_map(reference_maps);
        self.create_vmap_table();
        Ok(())
    }

    /// Walk the LIRs assigning offsets, then lay the pools behind the code.
    fn assign_offsets(&mut self) {
        let mut offset = self.assign_insn_offsets();

        // Literal pool is word aligned.
        offset = (offset + 3) & !3;
        self.data_offset = offset;

        for list in [
            self.literal_list.clone(),
            self.code_literal_list.clone(),
            self.method_literal_list.clone(),
        ] {
            for lit in list {
                self.lirs.get_mut(lit).offset = offset;
                offset += 4;
            }
        }

        for i in 0..self.switch_tables.len() {
            let (table_label, len, packed) = {
                let t = &self.switch_tables[i];
                (t.table_label, t.targets.len() as u32, t.packed)
            };
            self.switch_tables[i].offset = offset;
            self.lirs.get_mut(table_label).offset = offset;
            offset += if packed { 4 * len } else { 8 * len };
        }

        for i in 0..self.fill_array_data.len() {
            self.fill_array_data[i].offset = offset;
            offset += (self.fill_array_data[i].units.len() as u32 * 2 + 3) & !3;
        }

        self.total_size = offset;
    }

    fn assign_insn_offsets(&mut self) -> u32 {
        let mut offset = 0u32;
        let ids: Vec<LirId> = self.lirs.iter().collect();
        for id in ids {
            let size = {
                let node = self.lirs.get(id);
                match node.op {
                    LirOp::Machine(_) if !node.is_nop() => {
                        if node.size == 0 {
                            self.target.inst_size(node)
                        } else {
                            node.size
                        }
                    }
                    _ => 0,
                }
            };
            let node = self.lirs.get_mut(id);
            node.offset = offset;
            if let LirOp::Machine(_) = node.op {
                node.size = size;
            }
            if node.op == LirOp::Pseudo(PseudoOp::Align4) {
                if offset & 2 != 0 {
                    node.operands[0] = 1;
                    offset += 2;
                } else {
                    node.operands[0] = 0;
                }
            } else {
                offset += size as u32;
            }
        }
        offset
    }

    /// Append literal words; code and method literals leave patch records
    /// for the linker.
    fn install_literal_pools(&mut self) {
        align_buffer(&mut self.code_buffer, self.data_offset);
        for lit in self.literal_list.clone() {
            push_word(&mut self.code_buffer, self.lirs.get(lit).operands[0]);
        }
        for lit in self.code_literal_list.clone() {
            let node = self.lirs.get(lit);
            let target_method_idx = node.operands[0] as u32;
            let target_invoke_type = invoke_type_from(node.operands[1]);
            self.patches.push(Patch::Code {
                referrer_class_idx: self.mref.class_idx,
                referrer_method_idx: self.mref.method_idx,
                referrer_invoke_type: target_invoke_type,
                target_method_idx,
                target_invoke_type,
                literal_offset: self.code_buffer.len() as u32,
            });
            // Unique patch cookie keyed by the target keeps dedupe sound.
            push_word(&mut self.code_buffer, target_method_idx as i32);
        }
        for lit in self.method_literal_list.clone() {
            let node = self.lirs.get(lit);
            let target_method_idx = node.operands[0] as u32;
            let target_invoke_type = invoke_type_from(node.operands[1]);
            self.patches.push(Patch::Method {
                referrer_class_idx: self.mref.class_idx,
                referrer_method_idx: self.mref.method_idx,
                referrer_invoke_type: target_invoke_type,
                target_method_idx,
                target_invoke_type,
                literal_offset: self.code_buffer.len() as u32,
            });
            push_word(&mut self.code_buffer, target_method_idx as i32);
        }
    }

    /// Displacement tables: packed emits targets only, sparse emits
    /// (key, target) pairs.  Displacements are measured from the anchor
    /// plus the ISA delta, or absolute where the target dictates.
    fn install_switch_tables(&mut self) {
        for table in self.switch_tables.clone() {
            align_buffer(&mut self.code_buffer, table.offset);
            let anchor_offset = self.lirs.get(table.anchor).offset as i32;
            let base = if self.target.switch_absolute() {
                0
            } else {
                anchor_offset + self.target.switch_anchor_delta()
            };
            debug!(
                bc_offset = table.bc_offset,
                base, entries = table.targets.len(),
                "installing switch table"
            );
            for (i, &target) in table.targets.iter().enumerate() {
                let disp = self.lirs.get(target).offset as i32 - base;
                if !table.packed {
                    push_word(&mut self.code_buffer, table.keys[i]);
                }
                push_word(&mut self.code_buffer, disp);
            }
        }
    }

    fn install_fill_array_data(&mut self) {
        for record in self.fill_array_data.clone() {
            align_buffer(&mut self.code_buffer, record.offset);
            for unit in record.units {
                self.code_buffer.extend_from_slice(&unit.to_le_bytes());
            }
            let aligned_len = (self.code_buffer.len() as u32 + 3) & !3;
            align_buffer(&mut self.code_buffer, aligned_len);
        }
    }

    /// Collect pc-to-bc pairs from safepoints and bc-to-pc pairs from
    /// exported PCs, verify catch coverage, and LEB128-encode the table.
    fn create_mapping_tables(&mut self) -> Result<(), Bug> {
        self.pc2bc.clear();
        self.bc2pc.clear();
        let ids: Vec<LirId> = self.lirs.iter().collect();
        for id in ids {
            let node = self.lirs.get(id);
            if node.is_nop() {
                continue;
            }
            match node.op {
                LirOp::Pseudo(PseudoOp::SafepointPc) => {
                    self.pc2bc.push((node.offset, node.bc_offset));
                }
                LirOp::Pseudo(PseudoOp::ExportedPc) => {
                    self.bc2pc.push((node.offset, node.bc_offset));
                }
                _ => {}
            }
        }

        // Every catch entry must have an exported native PC.
        for &catch_offset in &self.graph.catches {
            if !self.bc2pc.iter().any(|&(_, bc)| bc == catch_offset) {
                return Err(Bug::new(
                    BugKind::CatchEntryUnmapped,
                    format!("catch entry at bytecode offset {catch_offset} has no native pc"),
                ));
            }
        }

        let total_entries = (self.pc2bc.len() + self.bc2pc.len()) as u32;
        let mut encoded = Vec::new();
        leb128::write_unsigned(&mut encoded, total_entries);
        leb128::write_unsigned(&mut encoded, self.pc2bc.len() as u32);
        for &(native, bc) in self.pc2bc.iter().chain(self.bc2pc.iter()) {
            leb128::write_unsigned(&mut encoded, native);
            leb128::write_unsigned(&mut encoded, bc);
        }
        self.encoded_mapping_table = encoded;
        Ok(())
    }

    /// Open-addressed (native pc -> reference bitmap) table.  The header
    /// packs the native-offset byte width, the bitmap byte width and the
    /// entry count.
    fn create_native_gc_map(&mut self, reference_maps: &[(u32, Vec<u8>)]) {
        let entries = self.pc2bc.len();
        let references_width = (self.graph.info.num_vregs + 7) / 8;
        let max_native_offset = self
            .pc2bc
            .iter()
            .map(|&(native, _)| native)
            .max()
            .unwrap_or(0);
        let mut native_offset_width = 0usize;
        let mut remaining = max_native_offset;
        while remaining != 0 {
            native_offset_width += 1;
            remaining >>= 8;
        }
        if entries > 0 && native_offset_width == 0 {
            native_offset_width = 1;
        }

        let entry_width = native_offset_width + references_width;
        let mut table = vec![0u8; entry_width * entries + 4];
        debug_assert!(native_offset_width < 8);
        debug_assert!(references_width < 1 << 13);
        table[0] = (native_offset_width as u8 & 7) | ((references_width << 3) & 0xff) as u8;
        table[1] = ((references_width >> 5) & 0xff) as u8;
        table[2] = (entries & 0xff) as u8;
        table[3] = ((entries >> 8) & 0xff) as u8;

        let mut in_use = vec![false; entries];
        for &(native, bc) in &self.pc2bc {
            let mut index = (gc_map_hash(native) as usize) % entries.max(1);
            while in_use[index] {
                index = (index + 1) % entries;
            }
            in_use[index] = true;
            let at = index * entry_width + 4;
            for i in 0..native_offset_width {
                table[at + i] = ((native >> (8 * i)) & 0xff) as u8;
            }
            let refs = reference_maps
                .iter()
                .find(|&&(offset, _)| offset == bc)
                .map(|(_, map)| map.as_slice());
            if let Some(refs) = refs {
                let n = refs.len().min(references_width);
                table[at + native_offset_width..at + native_offset_width + n]
                    .copy_from_slice(&refs[..n]);
            }
        }
        self.native_gc_map = table;
    }

    /// Sorted core register map, a separator standing in for the return
    /// address, then the FP map; LEB128 with a count prefix.
    fn create_vmap_table(&mut self) {
        let mut raw: Vec<u16> = Vec::new();
        let mut core = self.core_vmap.clone();
        core.sort_unstable();
        for entry in core {
            // Strip the physical-register sort key.
            raw.push((entry & 0xffff) as u16);
        }
        if self.frame_size > 0 {
            raw.push(lantern_asm::INVALID_VREG);
        } else {
            debug_assert_eq!(self.core_spill_mask.count_ones(), 0);
            debug_assert_eq!(self.fp_spill_mask.count_ones(), 0);
        }
        for entry in &self.fp_vmap {
            raw.push((entry & 0xffff) as u16);
        }
        let mut encoded = Vec::new();
        leb128::write_unsigned(&mut encoded, raw.len() as u32);
        for value in raw {
            leb128::write_unsigned(&mut encoded, value as u32);
        }
        self.vmap_table = encoded;
    }
}

fn invoke_type_from(raw: i32) -> InvokeType {
    match raw {
        0 => InvokeType::Static,
        1 => InvokeType::Direct,
        2 => InvokeType::Virtual,
        3 => InvokeType::Super,
        _ => InvokeType::Interface,
    }
}
