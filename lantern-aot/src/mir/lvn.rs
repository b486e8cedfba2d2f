//! Local value numbering over one extended basic block.

use hashbrown::{HashMap, HashSet};
use lantern_asm::Opcode;
use tracing::trace;

use super::{ExtOp, MirFlags, MirGraph, MirId, MirMeta, MirOp};
use crate::SReg;

/// "No value" sentinel.
pub const NO_VALUE: u16 = 0xffff;
/// Synthetic op used to key array-reference side effects.
pub const ARRAY_REF: u16 = 0xfffe;

/// Value-number state for one extended basic block.
///
/// Keys are `op<<48 | operand1<<32 | operand2<<16 | modifier`; value numbers
/// are drawn from a monotonically increasing 16-bit counter.  The value
/// number of a value never changes for the life of this structure.
#[derive(Default)]
pub struct LocalValueNumbering {
    sreg_value_map: HashMap<SReg, u16>,
    sreg_wide_value_map: HashMap<SReg, u16>,
    value_map: HashMap<u64, u16>,
    memory_version_map: HashMap<u32, u16>,
    null_checked: HashSet<u16>,
}

impl LocalValueNumbering {
    /// Fresh state.
    pub fn new() -> Self {
        Self::default()
    }

    fn build_key(op: u16, operand1: u16, operand2: u16, modifier: u16) -> u64 {
        (op as u64) << 48 | (operand1 as u64) << 32 | (operand2 as u64) << 16 | modifier as u64
    }

    /// Value number for the key, allocating one on first sight.
    pub fn lookup_value(&mut self, op: u16, operand1: u16, operand2: u16, modifier: u16) -> u16 {
        let key = Self::build_key(op, operand1, operand2, modifier);
        let next = self.value_map.len() as u16 + 1;
        *self.value_map.entry(key).or_insert(next)
    }

    /// Does the key already have a value number?
    pub fn value_exists(&self, op: u16, operand1: u16, operand2: u16, modifier: u16) -> bool {
        self.value_map
            .contains_key(&Self::build_key(op, operand1, operand2, modifier))
    }

    fn memory_version(&mut self, base: u16, field: u16) -> u16 {
        let key = (base as u32) << 16 | field as u32;
        *self.memory_version_map.entry(key).or_insert(0)
    }

    fn advance_memory_version(&mut self, base: u16, field: u16) {
        let key = (base as u32) << 16 | field as u32;
        self.memory_version_map
            .entry(key)
            .and_modify(|v| *v += 1)
            .or_insert(0);
    }

    fn set_operand_value(&mut self, s_reg: SReg, value: u16) {
        let prev = self.sreg_value_map.insert(s_reg, value);
        debug_assert!(prev.is_none() || prev == Some(value));
    }

    fn operand_value(&mut self, s_reg: SReg) -> u16 {
        if let Some(&v) = self.sreg_value_map.get(&s_reg) {
            return v;
        }
        // First use.
        let v = self.lookup_value(NO_VALUE, s_reg as u16, NO_VALUE, NO_VALUE);
        self.sreg_value_map.insert(s_reg, v);
        v
    }

    fn set_operand_value_wide(&mut self, s_reg: SReg, value: u16) {
        let prev = self.sreg_wide_value_map.insert(s_reg, value);
        debug_assert!(prev.is_none() || prev == Some(value));
    }

    fn operand_value_wide(&mut self, s_reg: SReg) -> u16 {
        if let Some(&v) = self.sreg_wide_value_map.get(&s_reg) {
            return v;
        }
        let v = self.lookup_value(NO_VALUE, s_reg as u16, NO_VALUE, NO_VALUE);
        self.sreg_wide_value_map.insert(s_reg, v);
        v
    }

    /// Value-number one MIR, marking redundant null/range checks as it goes.
    /// Opaque, side-effecting opcodes produce no value.
    pub fn get_value_number(&mut self, graph: &mut MirGraph, mir_id: MirId) -> u16 {
        let insn = graph.mir(mir_id).insn;
        let rep = graph.mir(mir_id).ssa_rep.clone().unwrap_or_default();
        let use_at = |i: usize| rep.uses[i];
        let def_at = |i: usize| rep.defs[i];
        let op_key = match insn.op {
            MirOp::Code(op) => op as u8 as u16,
            MirOp::Ext(_) => NO_VALUE,
        };
        let mut res = NO_VALUE;

        let code = match insn.op {
            MirOp::Code(op) => op,
            MirOp::Ext(ExtOp::Copy) => {
                let v = self.operand_value(use_at(0));
                self.set_operand_value(def_at(0), v);
                return v;
            }
            // Phis only appear at extended-BB heads; other pseudo-ops are
            // opaque here.
            MirOp::Ext(_) => return NO_VALUE,
        };

        use Opcode::*;
        match code {
            // Opaque: control flow, calls, monitors, stores to the caller.
            Nop | ReturnVoid | Return | ReturnObject | ReturnWide | MonitorEnter
            | MonitorExit | Goto | Goto16 | Goto32 | CheckCast | Throw | FillArrayData
            | FilledNewArray | FilledNewArrayRange | PackedSwitch | SparseSwitch | IfEq
            | IfNe | IfLt | IfGe | IfGt | IfLe | IfEqz | IfNez | IfLtz | IfGez | IfGtz
            | IfLez | InvokeVirtual | InvokeSuper | InvokeDirect | InvokeStatic
            | InvokeInterface | InvokeVirtualRange | InvokeSuperRange | InvokeDirectRange
            | InvokeStaticRange | InvokeInterfaceRange => {}

            // One unpredictable result: unique by defining name.
            MoveException | MoveResult | MoveResultObject | InstanceOf | NewInstance
            | ConstString | ConstStringJumbo | ConstClass | NewArray => {
                res = self.operand_value(def_at(0));
                self.set_operand_value(def_at(0), res);
            }
            MoveResultWide => {
                res = self.operand_value_wide(def_at(0));
                self.set_operand_value_wide(def_at(0), res);
            }

            Move | MoveFrom16 | Move16 | MoveObject | MoveObjectFrom16 | MoveObject16 => {
                res = self.operand_value(use_at(0));
                self.set_operand_value(def_at(0), res);
            }
            MoveWide | MoveWideFrom16 | MoveWide16 => {
                res = self.operand_value_wide(use_at(0));
                self.set_operand_value_wide(def_at(0), res);
            }

            Const4 | Const16 | Const => {
                res = self.lookup_value(
                    Opcode::Const as u16,
                    insn.vb as u16,
                    (insn.vb >> 16) as u16,
                    0,
                );
                self.set_operand_value(def_at(0), res);
            }
            ConstHigh16 => {
                res = self.lookup_value(Opcode::Const as u16, 0, insn.vb as u16, 0);
                self.set_operand_value(def_at(0), res);
            }
            ConstWide16 | ConstWide32 => {
                let low = self.lookup_value(
                    Opcode::Const as u16,
                    insn.vb as u16,
                    (insn.vb >> 16) as u16,
                    1,
                );
                let high = if insn.vb & 0x8000_0000 != 0 {
                    self.lookup_value(Opcode::Const as u16, 0xffff, 0xffff, 2)
                } else {
                    self.lookup_value(Opcode::Const as u16, 0, 0, 2)
                };
                res = self.lookup_value(Opcode::Const as u16, low, high, 3);
                self.set_operand_value_wide(def_at(0), res);
            }
            ConstWide => {
                let low_word = insn.vb_wide as u32;
                let high_word = (insn.vb_wide >> 32) as u32;
                let low = self.lookup_value(
                    Opcode::Const as u16,
                    low_word as u16,
                    (low_word >> 16) as u16,
                    1,
                );
                let high = self.lookup_value(
                    Opcode::Const as u16,
                    high_word as u16,
                    (high_word >> 16) as u16,
                    2,
                );
                res = self.lookup_value(Opcode::Const as u16, low, high, 3);
                self.set_operand_value_wide(def_at(0), res);
            }
            ConstWideHigh16 => {
                let low = self.lookup_value(Opcode::Const as u16, 0, 0, 1);
                let high = self.lookup_value(Opcode::Const as u16, 0, insn.vb as u16, 2);
                res = self.lookup_value(Opcode::Const as u16, low, high, 3);
                self.set_operand_value_wide(def_at(0), res);
            }

            // Narrow unary over a narrow operand.
            ArrayLength | NegInt | NotInt | NegFloat | IntToByte | IntToShort | IntToChar
            | IntToFloat | FloatToInt => {
                let operand1 = self.operand_value(use_at(0));
                res = self.lookup_value(op_key, operand1, NO_VALUE, NO_VALUE);
                self.set_operand_value(def_at(0), res);
            }
            // Narrow result from a wide operand.
            LongToFloat | LongToInt | DoubleToFloat | DoubleToInt => {
                let operand1 = self.operand_value_wide(use_at(0));
                res = self.lookup_value(op_key, operand1, NO_VALUE, NO_VALUE);
                self.set_operand_value(def_at(0), res);
            }
            // Wide result from a wide operand.
            DoubleToLong | LongToDouble | NegLong | NotLong | NegDouble => {
                let operand1 = self.operand_value_wide(use_at(0));
                res = self.lookup_value(op_key, operand1, NO_VALUE, NO_VALUE);
                self.set_operand_value_wide(def_at(0), res);
            }
            // Wide result from a narrow operand.
            FloatToDouble | FloatToLong | IntToDouble | IntToLong => {
                let operand1 = self.operand_value(use_at(0));
                res = self.lookup_value(op_key, operand1, NO_VALUE, NO_VALUE);
                self.set_operand_value_wide(def_at(0), res);
            }

            // Narrow result from two wide operands.
            CmplDouble | CmpgDouble | CmpLong => {
                let operand1 = self.operand_value_wide(use_at(0));
                let operand2 = self.operand_value_wide(use_at(2));
                res = self.lookup_value(op_key, operand1, operand2, NO_VALUE);
                self.set_operand_value(def_at(0), res);
            }

            // Narrow binary.
            CmplFloat | CmpgFloat | AddInt | AddInt2Addr | MulInt | MulInt2Addr | AndInt
            | AndInt2Addr | OrInt | OrInt2Addr | XorInt | XorInt2Addr | SubInt
            | SubInt2Addr | DivInt | DivInt2Addr | RemInt | RemInt2Addr | ShlInt
            | ShlInt2Addr | ShrInt | ShrInt2Addr | UshrInt | UshrInt2Addr | AddFloat
            | SubFloat | MulFloat | DivFloat | RemFloat | AddFloat2Addr | SubFloat2Addr
            | MulFloat2Addr | DivFloat2Addr | RemFloat2Addr => {
                let operand1 = self.operand_value(use_at(0));
                let operand2 = self.operand_value(use_at(1));
                res = self.lookup_value(op_key, operand1, operand2, NO_VALUE);
                self.set_operand_value(def_at(0), res);
            }

            // Wide binary (second operand at uses[2]).
            AddLong | SubLong | MulLong | DivLong | RemLong | AndLong | OrLong | XorLong
            | AddLong2Addr | SubLong2Addr | MulLong2Addr | DivLong2Addr | RemLong2Addr
            | AndLong2Addr | OrLong2Addr | XorLong2Addr | AddDouble | SubDouble
            | MulDouble | DivDouble | RemDouble | AddDouble2Addr | SubDouble2Addr
            | MulDouble2Addr | DivDouble2Addr | RemDouble2Addr | ShlLong | ShrLong
            | UshrLong | ShlLong2Addr | ShrLong2Addr | UshrLong2Addr => {
                let operand1 = self.operand_value_wide(use_at(0));
                let operand2 = self.operand_value_wide(use_at(2));
                res = self.lookup_value(op_key, operand1, operand2, NO_VALUE);
                self.set_operand_value_wide(def_at(0), res);
            }

            // Binary with an embedded literal.
            AddIntLit16 | RsubInt | MulIntLit16 | DivIntLit16 | RemIntLit16 | AndIntLit16
            | OrIntLit16 | XorIntLit16 | AddIntLit8 | RsubIntLit8 | MulIntLit8
            | DivIntLit8 | RemIntLit8 | AndIntLit8 | OrIntLit8 | XorIntLit8 | ShlIntLit8
            | ShrIntLit8 | UshrIntLit8 => {
                let operand1 = self.operand_value(use_at(0));
                let operand2 = self.lookup_value(Opcode::Const as u16, insn.vc as u16, 0, 0);
                res = self.lookup_value(op_key, operand1, operand2, NO_VALUE);
                self.set_operand_value(def_at(0), res);
            }

            Aget | AgetWide | AgetObject | AgetBoolean | AgetByte | AgetChar | AgetShort => {
                let array = self.operand_value(use_at(0));
                self.note_null_check(graph, mir_id, array);
                let index = self.operand_value(use_at(1));
                if self.value_exists(ARRAY_REF, array, index, NO_VALUE) {
                    trace!(offset = graph.mir(mir_id).offset, "redundant range check");
                    graph.mir_mut(mir_id).opt_flags |= MirFlags::IGNORE_RANGE_CHECK;
                }
                self.propagate_check_flags(graph, mir_id);
                // Side effect: note the range check as done.
                let _ = self.lookup_value(ARRAY_REF, array, index, NO_VALUE);
                let memory_version = self.memory_version(array, NO_VALUE);
                res = self.lookup_value(ARRAY_REF, array, index, memory_version);
                if code == AgetWide {
                    self.set_operand_value_wide(def_at(0), res);
                } else {
                    self.set_operand_value(def_at(0), res);
                }
            }

            Aput | AputWide | AputObject | AputBoolean | AputByte | AputChar | AputShort => {
                let (array_idx, index_idx) = if code == AputWide { (2, 3) } else { (1, 2) };
                let array = self.operand_value(use_at(array_idx));
                self.note_null_check(graph, mir_id, array);
                let index = self.operand_value(use_at(index_idx));
                if self.value_exists(ARRAY_REF, array, index, NO_VALUE) {
                    graph.mir_mut(mir_id).opt_flags |= MirFlags::IGNORE_RANGE_CHECK;
                }
                self.propagate_check_flags(graph, mir_id);
                let _ = self.lookup_value(ARRAY_REF, array, index, NO_VALUE);
                // The store invalidates loads through this array.
                self.advance_memory_version(array, NO_VALUE);
            }

            Iget | IgetWide | IgetObject | IgetBoolean | IgetByte | IgetChar | IgetShort => {
                let base = self.operand_value(use_at(0));
                self.note_null_check(graph, mir_id, base);
                self.propagate_check_flags(graph, mir_id);
                let field = insn.vc as u16;
                let memory_version = self.memory_version(base, field);
                res = self.lookup_value(op_key, base, field, memory_version);
                if code == IgetWide {
                    self.set_operand_value_wide(def_at(0), res);
                } else {
                    self.set_operand_value(def_at(0), res);
                }
            }

            Iput | IputWide | IputObject | IputBoolean | IputByte | IputChar | IputShort => {
                let base_idx = if code == IputWide { 2 } else { 1 };
                let base = self.operand_value(use_at(base_idx));
                self.note_null_check(graph, mir_id, base);
                self.propagate_check_flags(graph, mir_id);
                // Any object of this type may alias.
                self.advance_memory_version(NO_VALUE, insn.vc as u16);
            }

            Sget | SgetWide | SgetObject | SgetBoolean | SgetByte | SgetChar | SgetShort => {
                let field = insn.vb as u16;
                let memory_version = self.memory_version(NO_VALUE, field);
                res = self.lookup_value(op_key, NO_VALUE, field, memory_version);
                if code == SgetWide {
                    self.set_operand_value_wide(def_at(0), res);
                } else {
                    self.set_operand_value(def_at(0), res);
                }
            }

            Sput | SputWide | SputObject | SputBoolean | SputByte | SputChar | SputShort => {
                self.advance_memory_version(NO_VALUE, insn.vb as u16);
            }
        }
        res
    }

    fn note_null_check(&mut self, graph: &mut MirGraph, mir_id: MirId, base_vn: u16) {
        if self.null_checked.contains(&base_vn) {
            trace!(offset = graph.mir(mir_id).offset, "redundant null check");
            graph.mir_mut(mir_id).opt_flags |= MirFlags::IGNORE_NULL_CHECK;
        } else {
            self.null_checked.insert(base_vn);
        }
    }

    /// Mirror eliminated checks onto the paired check half, if this MIR is
    /// the work half of a split throwing instruction.
    fn propagate_check_flags(&self, graph: &mut MirGraph, mir_id: MirId) {
        if let MirMeta::ThrowInsn(check) = graph.mir(mir_id).meta {
            let flags = graph.mir(mir_id).opt_flags;
            graph.mir_mut(check).opt_flags |= flags;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_numbers_are_stable() {
        let mut lvn = LocalValueNumbering::new();
        let a = lvn.lookup_value(5, 1, 2, NO_VALUE);
        let b = lvn.lookup_value(5, 1, 2, NO_VALUE);
        assert_eq!(a, b);
        let c = lvn.lookup_value(5, 2, 1, NO_VALUE);
        assert_ne!(a, c);
    }

    #[test]
    fn memory_version_advances_on_store() {
        let mut lvn = LocalValueNumbering::new();
        assert_eq!(lvn.memory_version(3, 7), 0);
        lvn.advance_memory_version(3, 7);
        assert_eq!(lvn.memory_version(3, 7), 1);
        // Other locations unaffected.
        assert_eq!(lvn.memory_version(3, 8), 0);
    }

    #[test]
    fn operand_first_use_is_unique() {
        let mut lvn = LocalValueNumbering::new();
        let v1 = lvn.operand_value(10);
        let v2 = lvn.operand_value(11);
        assert_ne!(v1, v2);
        assert_eq!(lvn.operand_value(10), v1);
    }
}
