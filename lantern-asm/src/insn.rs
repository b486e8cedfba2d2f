//! Instruction decoding.

use crate::format::Format;
use crate::opcode::Opcode;
use crate::CodeUnit;

/// First code unit of a packed-switch payload.
pub const PACKED_SWITCH_SIGNATURE: u16 = 0x0100;
/// First code unit of a sparse-switch payload.
pub const SPARSE_SWITCH_SIGNATURE: u16 = 0x0200;
/// First code unit of an array-data payload.
pub const ARRAY_DATA_SIGNATURE: u16 = 0x0300;

/// A decoded instruction.
///
/// `a`/`b`/`c` carry whatever the format assigns to vA/vB/vC: register
/// numbers, signed immediates (stored sign-extended), branch offsets or
/// constant-pool indices.  Wide literals land in `b_wide`; the five explicit
/// argument registers of a 35c invoke land in `args`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    /// Opcode.
    pub opcode: Opcode,
    /// vA operand.
    pub a: u32,
    /// vB operand (or index / immediate).
    pub b: u32,
    /// 64-bit literal for k51l.
    pub b_wide: u64,
    /// vC operand.
    pub c: u32,
    /// Argument registers of a 35c format invoke.
    pub args: [u32; 5],
}

impl DecodedInstruction {
    /// Width of this instruction in code units.
    pub fn size_in_code_units(&self) -> usize {
        self.opcode.format().size_in_code_units()
    }

    /// vB as a sign-extended 32-bit immediate.
    pub fn imm_b(&self) -> i32 {
        self.b as i32
    }

    /// vC as a sign-extended 32-bit immediate.
    pub fn imm_c(&self) -> i32 {
        self.c as i32
    }

    /// Branch target as a relative code-unit offset.
    pub fn branch_target(&self) -> i32 {
        match self.opcode.format() {
            Format::k10t => self.a as i32,
            Format::k20t | Format::k30t => self.a as i32,
            Format::k21t | Format::k31t => self.b as i32,
            Format::k22t => self.c as i32,
            _ => panic!("branch_target on non-branch format {:?}", self.opcode.format()),
        }
    }

    /// Decode the instruction starting at `insns[offset]`.
    ///
    /// Returns `None` for unassigned opcode bytes or a truncated stream;
    /// payload pseudo-instructions are not decoded here (they are data, not
    /// instructions).
    pub fn decode_at(insns: &[CodeUnit], offset: usize) -> Option<DecodedInstruction> {
        let unit0 = *insns.get(offset)?;
        let opcode = Opcode::from_u8((unit0 & 0xff) as u8)?;
        let format = opcode.format();
        if offset + format.size_in_code_units() > insns.len() {
            return None;
        }
        let hi = |n: usize| insns[offset + n] as u32;

        let mut insn = DecodedInstruction {
            opcode,
            a: 0,
            b: 0,
            b_wide: 0,
            c: 0,
            args: [0; 5],
        };
        let aa = (unit0 >> 8) as u32;
        let nib_a = ((unit0 >> 8) & 0xf) as u32;
        let nib_b = (unit0 >> 12) as u32;
        match format {
            Format::k10x => {}
            Format::k12x => {
                insn.a = nib_a;
                insn.b = nib_b;
            }
            Format::k11n => {
                insn.a = nib_a;
                // Sign-extend the 4-bit literal.
                insn.b = ((nib_b as i32) << 28 >> 28) as u32;
            }
            Format::k11x => insn.a = aa,
            Format::k10t => insn.a = (aa as u8 as i8) as i32 as u32,
            Format::k20t => insn.a = hi(1) as u16 as i16 as i32 as u32,
            Format::k22x => {
                insn.a = aa;
                insn.b = hi(1);
            }
            Format::k21t | Format::k21s => {
                insn.a = aa;
                insn.b = hi(1) as u16 as i16 as i32 as u32;
            }
            Format::k21h => {
                insn.a = aa;
                insn.b = hi(1);
            }
            Format::k21c => {
                insn.a = aa;
                insn.b = hi(1);
            }
            Format::k23x => {
                insn.a = aa;
                insn.b = hi(1) & 0xff;
                insn.c = hi(1) >> 8;
            }
            Format::k22b => {
                insn.a = aa;
                insn.b = hi(1) & 0xff;
                insn.c = ((hi(1) >> 8) as u8 as i8) as i32 as u32;
            }
            Format::k22t | Format::k22s => {
                insn.a = nib_a;
                insn.b = nib_b;
                insn.c = hi(1) as u16 as i16 as i32 as u32;
            }
            Format::k22c => {
                insn.a = nib_a;
                insn.b = nib_b;
                insn.c = hi(1);
            }
            Format::k32x => {
                insn.a = hi(1);
                insn.b = hi(2);
            }
            Format::k30t => insn.a = hi(1) | (hi(2) << 16),
            Format::k31t | Format::k31i | Format::k31c => {
                insn.a = aa;
                insn.b = hi(1) | (hi(2) << 16);
            }
            Format::k35c => {
                insn.a = nib_b; // argument count
                insn.b = hi(1);
                let regs = hi(2);
                insn.args = [
                    regs & 0xf,
                    (regs >> 4) & 0xf,
                    (regs >> 8) & 0xf,
                    (regs >> 12) & 0xf,
                    nib_a, // vG rides in the first unit
                ];
            }
            Format::k3rc => {
                insn.a = aa; // argument count
                insn.b = hi(1);
                insn.c = hi(2); // first register of the range
            }
            Format::k51l => {
                insn.a = aa;
                insn.b_wide = hi(1) as u64
                    | (hi(2) as u64) << 16
                    | (hi(3) as u64) << 32
                    | (hi(4) as u64) << 48;
            }
        }
        Some(insn)
    }
}

/// Decoded packed-switch payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedSwitchPayload {
    /// Case value of the first target.
    pub first_key: i32,
    /// Branch targets, relative to the switch instruction.
    pub targets: Vec<i32>,
}

impl PackedSwitchPayload {
    /// Decode at `insns[offset]`; `None` when the signature or size is wrong.
    pub fn decode_at(insns: &[CodeUnit], offset: usize) -> Option<Self> {
        if *insns.get(offset)? != PACKED_SWITCH_SIGNATURE {
            return None;
        }
        let size = *insns.get(offset + 1)? as usize;
        let read32 =
            |at: usize| Some(insns.get(at)?.to_owned() as u32 | (*insns.get(at + 1)? as u32) << 16);
        let first_key = read32(offset + 2)? as i32;
        let mut targets = Vec::with_capacity(size);
        for i in 0..size {
            targets.push(read32(offset + 4 + 2 * i)? as i32);
        }
        Some(PackedSwitchPayload { first_key, targets })
    }

    /// Payload footprint in code units.
    pub fn size_in_code_units(&self) -> usize {
        self.targets.len() * 2 + 4
    }
}

/// Decoded sparse-switch payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SparseSwitchPayload {
    /// Case values, sorted ascending.
    pub keys: Vec<i32>,
    /// Branch targets, parallel to `keys`.
    pub targets: Vec<i32>,
}

impl SparseSwitchPayload {
    /// Decode at `insns[offset]`.
    pub fn decode_at(insns: &[CodeUnit], offset: usize) -> Option<Self> {
        if *insns.get(offset)? != SPARSE_SWITCH_SIGNATURE {
            return None;
        }
        let size = *insns.get(offset + 1)? as usize;
        let read32 =
            |at: usize| Some(insns.get(at)?.to_owned() as u32 | (*insns.get(at + 1)? as u32) << 16);
        let mut keys = Vec::with_capacity(size);
        let mut targets = Vec::with_capacity(size);
        for i in 0..size {
            keys.push(read32(offset + 2 + 2 * i)? as i32);
        }
        for i in 0..size {
            targets.push(read32(offset + 2 + 2 * size + 2 * i)? as i32);
        }
        Some(SparseSwitchPayload { keys, targets })
    }

    /// Payload footprint in code units.
    pub fn size_in_code_units(&self) -> usize {
        self.keys.len() * 4 + 2
    }
}

/// Decoded fill-array-data payload: raw element bytes plus geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDataPayload {
    /// Bytes per element.
    pub element_width: usize,
    /// Element count.
    pub element_count: usize,
    /// The raw table as 16-bit units, header included.
    pub units: Vec<u16>,
}

impl ArrayDataPayload {
    /// Decode at `insns[offset]`.
    pub fn decode_at(insns: &[CodeUnit], offset: usize) -> Option<Self> {
        if *insns.get(offset)? != ARRAY_DATA_SIGNATURE {
            return None;
        }
        let element_width = *insns.get(offset + 1)? as usize;
        let element_count =
            *insns.get(offset + 2)? as usize | (*insns.get(offset + 3)? as usize) << 16;
        let total = Self::units_for(element_width, element_count);
        if offset + total > insns.len() {
            return None;
        }
        Some(ArrayDataPayload {
            element_width,
            element_count,
            units: insns[offset..offset + total].to_vec(),
        })
    }

    /// Payload footprint in code units for the given geometry.
    pub fn units_for(element_width: usize, element_count: usize) -> usize {
        (element_width * element_count + 1) / 2 + 4
    }

    /// Payload footprint in code units.
    pub fn size_in_code_units(&self) -> usize {
        Self::units_for(self.element_width, self.element_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn decode(units: &[u16]) -> DecodedInstruction {
        DecodedInstruction::decode_at(units, 0).expect("decodes")
    }

    #[test]
    fn decode_k12x_nibbles() {
        // move v3, v14
        let insn = decode(&[0x01 | (0x3 << 8) | (0xe << 12)]);
        assert_eq!(insn.opcode, Opcode::Move);
        assert_eq!((insn.a, insn.b), (3, 14));
    }

    #[test]
    fn decode_k11n_sign_extends() {
        // const/4 v0, -1
        let insn = decode(&[0x12 | (0x0 << 8) | (0xf << 12)]);
        assert_eq!(insn.opcode, Opcode::Const4);
        assert_eq!(insn.imm_b(), -1);
    }

    #[test_case(&[0x28 | (0xfe << 8)], -2; "goto backwards")]
    #[test_case(&[0x29, 0x0010], 16; "goto16 forwards")]
    fn decode_goto_targets(units: &[u16], expect: i32) {
        assert_eq!(decode(units).branch_target(), expect);
    }

    #[test]
    fn decode_k22t() {
        // if-eq v2, v7, -8
        let insn = decode(&[0x32 | (0x2 << 8) | (0x7 << 12), 0xfff8]);
        assert_eq!((insn.a, insn.b), (2, 7));
        assert_eq!(insn.branch_target(), -8);
    }

    #[test]
    fn decode_k23x() {
        // add-int v1, v2, v3
        let insn = decode(&[0x90 | (1 << 8), 0x02 | (0x03 << 8)]);
        assert_eq!((insn.a, insn.b, insn.c), (1, 2, 3));
    }

    #[test]
    fn decode_k22b_sign_extends_literal() {
        // add-int/lit8 v0, v1, -3
        let insn = decode(&[0xd8, 0x01 | (0xfd << 8)]);
        assert_eq!((insn.a, insn.b), (0, 1));
        assert_eq!(insn.imm_c(), -3);
    }

    #[test]
    fn decode_k35c_invoke() {
        // invoke-static {v0, v1, v2}, method@7
        let unit0 = 0x71u16 | (3 << 12);
        let insn = decode(&[unit0, 7, 0x0210]);
        assert_eq!(insn.a, 3);
        assert_eq!(insn.b, 7);
        assert_eq!(&insn.args[..3], &[0, 1, 2]);
    }

    #[test]
    fn decode_k51l_wide_literal() {
        // const-wide v2, 0x1122334455667788
        let insn = decode(&[0x18 | (2 << 8), 0x7788, 0x5566, 0x3344, 0x1122]);
        assert_eq!(insn.a, 2);
        assert_eq!(insn.b_wide, 0x1122_3344_5566_7788);
    }

    #[test]
    fn decode_packed_switch_payload() {
        let units = [
            PACKED_SWITCH_SIGNATURE,
            3,      // size
            10, 0,  // first key
            4, 0,   // +4
            8, 0,   // +8
            12, 0,  // +12
        ];
        let payload = PackedSwitchPayload::decode_at(&units, 0).expect("payload");
        assert_eq!(payload.first_key, 10);
        assert_eq!(payload.targets, vec![4, 8, 12]);
        assert_eq!(payload.size_in_code_units(), 10);
    }

    #[test]
    fn decode_sparse_switch_payload() {
        let units = [
            SPARSE_SWITCH_SIGNATURE,
            2,
            0xfff6, 0xffff, // key -10
            100, 0,         // key 100
            6, 0,           // target +6
            10, 0,          // target +10
        ];
        let payload = SparseSwitchPayload::decode_at(&units, 0).expect("payload");
        assert_eq!(payload.keys, vec![-10, 100]);
        assert_eq!(payload.targets, vec![6, 10]);
    }

    #[test]
    fn decode_array_data_payload() {
        let units = [ARRAY_DATA_SIGNATURE, 2, 3, 0, 0x0102, 0x0304, 0x0506];
        let payload = ArrayDataPayload::decode_at(&units, 0).expect("payload");
        assert_eq!(payload.element_width, 2);
        assert_eq!(payload.element_count, 3);
        assert_eq!(payload.size_in_code_units(), 7);
    }

    #[test]
    fn truncated_stream_is_rejected() {
        // add-int needs two units.
        assert_eq!(DecodedInstruction::decode_at(&[0x90], 0), None);
    }
}
