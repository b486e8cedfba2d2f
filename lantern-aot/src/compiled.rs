//! Output artifacts: relocatable native methods and their patch records.

use std::sync::Arc;

use lantern_asm::InvokeType;

use crate::InstructionSet;

/// A linker fixup recorded while installing code/method literals.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Patch {
    /// Literal holding the native-code address of another method.
    Code {
        /// Class of the calling method.
        referrer_class_idx: u16,
        /// The calling method.
        referrer_method_idx: u32,
        /// How the referrer reaches the target.
        referrer_invoke_type: InvokeType,
        /// Target method index.
        target_method_idx: u32,
        /// Resolved dispatch kind of the target.
        target_invoke_type: InvokeType,
        /// Byte offset of the literal inside `code`.
        literal_offset: u32,
    },
    /// Literal holding the runtime method object of another method.
    Method {
        /// Class of the calling method.
        referrer_class_idx: u16,
        /// The calling method.
        referrer_method_idx: u32,
        /// How the referrer reaches the target.
        referrer_invoke_type: InvokeType,
        /// Target method index.
        target_method_idx: u32,
        /// Resolved dispatch kind of the target.
        target_invoke_type: InvokeType,
        /// Byte offset of the literal inside `code`.
        literal_offset: u32,
    },
}

/// One compiled method: native code plus its lookup metadata.  The byte
/// vectors are canonical instances interned through the dedupe store, so
/// identical artifacts across methods share storage.
#[derive(Debug, Clone)]
pub struct CompiledMethod {
    /// Target ISA the code was produced for.
    pub isa: InstructionSet,
    /// Native instructions and installed data pools, little endian.
    pub code: Arc<Vec<u8>>,
    /// Frame size in bytes, aligned to the target stack alignment.
    pub frame_size_in_bytes: u32,
    /// Callee-saved core registers written by the prologue.
    pub core_spill_mask: u32,
    /// Callee-saved FP registers written by the prologue.
    pub fp_spill_mask: u32,
    /// LEB128 {total, pc2bc count, (native pc, bc) pairs}.
    pub mapping_table: Arc<Vec<u8>>,
    /// LEB128 promoted-register map.
    pub vmap_table: Arc<Vec<u8>>,
    /// Hash-indexed native-pc to reference-bitmap table.
    pub native_gc_map: Arc<Vec<u8>>,
    /// Fixups for the linker.
    pub patches: Vec<Patch>,
}

impl CompiledMethod {
    /// Round `offset` up to the ISA's code alignment.
    pub fn align_code(offset: u32, isa: InstructionSet) -> u32 {
        let align = isa.code_alignment();
        (offset + align - 1) & !(align - 1)
    }

    /// Delta added to a raw code address to form a callable pointer; Thumb2
    /// sets the interworking bit.
    pub fn code_delta(&self) -> u32 {
        self.isa.code_delta()
    }

    /// A callable address for code placed at `address`.
    pub fn code_pointer(&self, address: u32) -> u32 {
        address | self.code_delta()
    }
}

/// Decoded view of a mapping table, for consumers and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingTable {
    /// (native pc, bytecode offset) pairs for safepoints.
    pub pc2bc: Vec<(u32, u32)>,
    /// (native pc, bytecode offset) pairs for catch entries.
    pub bc2pc: Vec<(u32, u32)>,
}

impl MappingTable {
    /// Decode the LEB128 wire form.
    pub fn decode(data: &[u8]) -> Option<MappingTable> {
        use lantern_asm::leb128::read_unsigned;
        let mut cursor = 0usize;
        let total = read_unsigned(data, &mut cursor)? as usize;
        let pc2bc_count = read_unsigned(data, &mut cursor)? as usize;
        if pc2bc_count > total {
            return None;
        }
        let mut pc2bc = Vec::with_capacity(pc2bc_count);
        for _ in 0..pc2bc_count {
            let native = read_unsigned(data, &mut cursor)?;
            let bc = read_unsigned(data, &mut cursor)?;
            pc2bc.push((native, bc));
        }
        let mut bc2pc = Vec::with_capacity(total - pc2bc_count);
        for _ in 0..total - pc2bc_count {
            let native = read_unsigned(data, &mut cursor)?;
            let bc = read_unsigned(data, &mut cursor)?;
            bc2pc.push((native, bc));
        }
        Some(MappingTable { pc2bc, bc2pc })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_asm::leb128::write_unsigned;
    use test_case::test_case;

    #[test_case(InstructionSet::Thumb2, 3, 4)]
    #[test_case(InstructionSet::Mips, 5, 8)]
    #[test_case(InstructionSet::X86, 17, 32)]
    fn code_alignment(isa: InstructionSet, offset: u32, expect: u32) {
        assert_eq!(CompiledMethod::align_code(offset, isa), expect);
    }

    #[test]
    fn mapping_table_roundtrip() {
        let pairs = [(0u32, 0u32), (8, 3), (20, 9)];
        let catch_pairs = [(32u32, 12u32)];
        let mut data = Vec::new();
        write_unsigned(&mut data, (pairs.len() + catch_pairs.len()) as u32);
        write_unsigned(&mut data, pairs.len() as u32);
        for &(n, b) in pairs.iter().chain(catch_pairs.iter()) {
            write_unsigned(&mut data, n);
            write_unsigned(&mut data, b);
        }
        let decoded = MappingTable::decode(&data).expect("decodes");
        assert_eq!(decoded.pc2bc, pairs.to_vec());
        assert_eq!(decoded.bc2pc, catch_pairs.to_vec());
    }

    #[test]
    fn truncated_mapping_table_is_rejected() {
        let mut data = Vec::new();
        write_unsigned(&mut data, 2);
        write_unsigned(&mut data, 2);
        write_unsigned(&mut data, 4);
        assert_eq!(MappingTable::decode(&data), None);
    }
}
