//! ARMv7 Thumb2 code generator backend.

use super::{displacement, Target, TargetRegs, FP_REG_BASE};
use crate::lir::{
    AssemblerStatus, CondCode, Lir, LirId, LirList, LirOp, MachineOp, PseudoOp,
};
use crate::InstructionSet;

/// Thumb2 target singleton.
pub struct Thumb2;

const R0: u8 = 0;
const R12: u8 = 12;
const SP: u8 = 13;
const LR: u8 = 14;
const PC: u8 = 15;

static REGS: TargetRegs = TargetRegs {
    core_temps: &[0, 1, 2, 3, 12],
    preserved_core: &[5, 6, 7, 8, 10, 11],
    fp_temps: &[
        FP_REG_BASE,
        FP_REG_BASE + 1,
        FP_REG_BASE + 2,
        FP_REG_BASE + 3,
        FP_REG_BASE + 4,
        FP_REG_BASE + 5,
        FP_REG_BASE + 6,
        FP_REG_BASE + 7,
    ],
    preserved_fp: &[
        FP_REG_BASE + 16,
        FP_REG_BASE + 17,
        FP_REG_BASE + 18,
        FP_REG_BASE + 19,
        FP_REG_BASE + 20,
        FP_REG_BASE + 21,
        FP_REG_BASE + 22,
        FP_REG_BASE + 23,
    ],
    arg_regs: &[0, 1, 2, 3],
    ret0: R0,
    ret1: 1,
    fret0: FP_REG_BASE,
    sp: SP,
    lr: Some(LR),
    self_reg: 9,
    suspend_reg: Some(4),
    reserved_spill_mask: 0,
    invoke_tgt: R12,
};

fn arm_cond(cc: CondCode) -> u32 {
    match cc {
        CondCode::Eq => 0x0,
        CondCode::Ne => 0x1,
        CondCode::Hs => 0x2,
        CondCode::Lo => 0x3,
        CondCode::Mi => 0x4,
        CondCode::Pl => 0x5,
        CondCode::Ge => 0xa,
        CondCode::Lt => 0xb,
        CondCode::Gt => 0xc,
        CondCode::Le => 0xd,
        CondCode::Hi => 0x8,
        CondCode::Ls => 0x9,
    }
}

fn push16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn push32_units(buf: &mut Vec<u8>, value: u32) {
    // Thumb2 32-bit encodings are stored as two little-endian halfwords,
    // high halfword first.
    push16(buf, (value >> 16) as u16);
    push16(buf, value as u16);
}

impl Target for Thumb2 {
    fn isa(&self) -> InstructionSet {
        InstructionSet::Thumb2
    }

    fn regs(&self) -> &'static TargetRegs {
        &REGS
    }

    fn inst_size(&self, lir: &Lir) -> u8 {
        let LirOp::Machine(op) = lir.op else { return 0 };
        use MachineOp::*;
        match op {
            Nop | MovRR | Ret | Bx | BlxReg => 2,
            // Short forms first; assembly widens on range overflow.
            CondBr | Br => 2,
            _ => 4,
        }
    }

    fn assemble(&self, lirs: &mut LirList, buf: &mut Vec<u8>) -> AssemblerStatus {
        let ids: Vec<LirId> = lirs.iter().collect();
        for id in ids {
            let lir = lirs.get(id).clone();
            if lir.is_nop() {
                continue;
            }
            match lir.op {
                LirOp::Pseudo(PseudoOp::Align4) => {
                    if lir.operands[0] == 1 {
                        push16(buf, 0xbf00); // nop
                    }
                }
                LirOp::Pseudo(_) => {}
                LirOp::Machine(op) => {
                    debug_assert_eq!(buf.len() as u32, lir.offset);
                    if let Some(widened) = self.encode(lirs, &lir, op, buf) {
                        lirs.get_mut(id).size = widened;
                        return AssemblerStatus::RetryAll;
                    }
                }
            }
        }
        AssemblerStatus::Success
    }

    fn switch_anchor_delta(&self) -> i32 {
        // The dispatch reads PC, which runs 4 ahead in Thumb state.
        4
    }

    fn pc_use_def_encoding(&self) -> u64 {
        crate::lir::encode_reg(PC)
    }

    fn has_push_pop(&self) -> bool {
        true
    }
}

impl Thumb2 {
    /// Encode one instruction.  Returns `Some(new_size)` when the
    /// instruction does not fit its current width and got widened.
    fn encode(
        &self,
        lirs: &LirList,
        lir: &Lir,
        op: MachineOp,
        buf: &mut Vec<u8>,
    ) -> Option<u8> {
        use MachineOp::*;
        let ops = lir.operands;
        let rd = ops[0] as u32 & 0xf;
        let rn = ops[1] as u32 & 0xf;
        let rm = ops[2] as u32 & 0xf;
        let target_offset = lir.target.map(|t| lirs.get(t).offset);
        match op {
            Nop => push16(buf, 0xbf00),
            MovRR => {
                let d = ops[0] as u32;
                let m = ops[1] as u32;
                push16(
                    buf,
                    0x4600 | ((d & 8) << 4) as u16 | ((m & 0xf) << 3) as u16 | (d & 7) as u16,
                );
            }
            MovRI => {
                // MOVW: 16-bit immediate.
                let imm = ops[1] as u32 & 0xffff;
                let insn = 0xf240_0000
                    | ((imm & 0xf000) << 4)
                    | ((imm & 0x0800) << 15)
                    | ((imm & 0x0700) << 4)
                    | (rd << 8)
                    | (imm & 0xff);
                push32_units(buf, insn);
            }
            LuiRI => {
                // MOVT: high 16 bits of the immediate.
                let imm = (ops[1] as u32 >> 16) & 0xffff;
                let insn = 0xf2c0_0000
                    | ((imm & 0xf000) << 4)
                    | ((imm & 0x0800) << 15)
                    | ((imm & 0x0700) << 4)
                    | (rd << 8)
                    | (imm & 0xff);
                push32_units(buf, insn);
            }
            MvnRR => push32_units(buf, 0xea6f_0000 | (rd << 8) | rn),
            AddRRR => push32_units(buf, 0xeb10_0000 | (rn << 16) | (rd << 8) | rm), // adds
            AdcRRR => push32_units(buf, 0xeb50_0000 | (rn << 16) | (rd << 8) | rm),
            SubRRR => push32_units(buf, 0xebb0_0000 | (rn << 16) | (rd << 8) | rm), // subs
            SbcRRR => push32_units(buf, 0xeb70_0000 | (rn << 16) | (rd << 8) | rm),
            MulRRR => push32_units(buf, 0xfb00_f000 | (rn << 16) | (rd << 8) | rm),
            SltuRRR => unreachable!("sltu is only emitted on MIPS"),
            AndRRR => push32_units(buf, 0xea00_0000 | (rn << 16) | (rd << 8) | rm),
            OrRRR => push32_units(buf, 0xea40_0000 | (rn << 16) | (rd << 8) | rm),
            XorRRR => push32_units(buf, 0xea80_0000 | (rn << 16) | (rd << 8) | rm),
            LslRRR => push32_units(buf, 0xfa00_f000 | (rn << 16) | (rd << 8) | rm),
            LsrRRR => push32_units(buf, 0xfa20_f000 | (rn << 16) | (rd << 8) | rm),
            AsrRRR => push32_units(buf, 0xfa40_f000 | (rn << 16) | (rd << 8) | rm),
            AddRRI | SubRRI | AndRRI | OrRRI | XorRRI => {
                let base: u32 = match op {
                    AddRRI => 0xf200_0000,
                    SubRRI => 0xf2a0_0000,
                    AndRRI => 0xf000_0000,
                    OrRRI => 0xf040_0000,
                    _ => 0xf080_0000,
                };
                let imm = ops[2] as u32 & 0xfff;
                push32_units(buf, base | (rn << 16) | (rd << 8) | imm);
            }
            LslRRI | LsrRRI | AsrRRI => {
                let ty: u32 = match op {
                    LslRRI => 0,
                    LsrRRI => 1,
                    _ => 2,
                };
                let imm = ops[2] as u32 & 0x1f;
                let insn = 0xea4f_0000
                    | (rd << 8)
                    | rn
                    | ((imm & 0x1c) << 10)
                    | ((imm & 3) << 6)
                    | (ty << 4);
                push32_units(buf, insn);
            }
            NegRR => push32_units(buf, 0xf1d0_0000 | (rn << 16) | (rd << 8)),
            NotRR => push32_units(buf, 0xea6f_0000 | (rd << 8) | rn),
            CmpRR => push16(buf, 0x4280 | ((rn & 7) << 3) as u16 | (rd & 7) as u16),
            CmpRI => {
                let imm = ops[1] as u32 & 0xff;
                push32_units(buf, 0xf1b0_0f00 | (rd << 16) | imm);
            }
            LoadWordDisp | LoadUHalfDisp | LoadSHalfDisp | LoadUByteDisp | LoadSByteDisp => {
                let base: u32 = match op {
                    LoadWordDisp => 0xf8d0_0000,
                    LoadUHalfDisp => 0xf8b0_0000,
                    LoadSHalfDisp => 0xf9b0_0000,
                    LoadUByteDisp => 0xf890_0000,
                    _ => 0xf990_0000,
                };
                let disp = ops[2] as u32 & 0xfff;
                push32_units(buf, base | (rn << 16) | (rd << 12) | disp);
            }
            StoreWordDisp | StoreHalfDisp | StoreByteDisp => {
                let base: u32 = match op {
                    StoreWordDisp => 0xf8c0_0000,
                    StoreHalfDisp => 0xf8a0_0000,
                    _ => 0xf880_0000,
                };
                let disp = ops[2] as u32 & 0xfff;
                push32_units(buf, base | (rn << 16) | (rd << 12) | disp);
            }
            AdrPcRel => {
                let lit = target_offset.expect("adr target");
                let pc = (lir.offset + 4) & !3;
                let disp = lit as i32 - pc as i32;
                debug_assert!((0..4096).contains(&disp), "adr out of range");
                let imm = disp as u32 & 0xfff;
                let insn = 0xf20f_0000
                    | ((imm & 0x800) << 15)
                    | ((imm & 0x700) << 4)
                    | (rd << 8)
                    | (imm & 0xff);
                push32_units(buf, insn);
            }
            LoadPcRel => {
                let lit = target_offset.expect("literal target");
                let pc = (lir.offset + 4) & !3;
                let disp = lit as i32 - pc as i32;
                debug_assert!((0..4096).contains(&disp), "literal out of range");
                if ops[0] as u8 >= FP_REG_BASE {
                    // VLDR s-reg, [pc, #imm8*4]
                    let sd = ops[0] as u32 - FP_REG_BASE as u32;
                    let insn = 0xed9f_0a00
                        | ((sd >> 1) << 12)
                        | ((sd & 1) << 22)
                        | ((disp as u32 >> 2) & 0xff);
                    push32_units(buf, insn);
                } else {
                    push32_units(buf, 0xf8df_0000 | (rd << 12) | (disp as u32 & 0xfff));
                }
            }
            FMovRR => push32_units(buf, 0xeeb0_0a40 | fp_dm(ops[0], ops[1])),
            FMovCoreFp => push32_units(buf, 0xee00_0a10 | (rn << 12) | fp_n(ops[0])),
            FMovFpCore => push32_units(buf, 0xee10_0a10 | (rd << 12) | fp_n(ops[1])),
            FAddS => push32_units(buf, 0xee30_0a00 | fp_dnm(ops[0], ops[1], ops[2])),
            FSubS => push32_units(buf, 0xee30_0a40 | fp_dnm(ops[0], ops[1], ops[2])),
            FMulS => push32_units(buf, 0xee20_0a00 | fp_dnm(ops[0], ops[1], ops[2])),
            FDivS => push32_units(buf, 0xee80_0a00 | fp_dnm(ops[0], ops[1], ops[2])),
            FAddD => push32_units(buf, 0xee30_0b00 | fp_dnm(ops[0], ops[1], ops[2])),
            FSubD => push32_units(buf, 0xee30_0b40 | fp_dnm(ops[0], ops[1], ops[2])),
            FMulD => push32_units(buf, 0xee20_0b00 | fp_dnm(ops[0], ops[1], ops[2])),
            FDivD => push32_units(buf, 0xee80_0b00 | fp_dnm(ops[0], ops[1], ops[2])),
            FNegS => push32_units(buf, 0xeeb1_0a40 | fp_dm(ops[0], ops[1])),
            FNegD => push32_units(buf, 0xeeb1_0b40 | fp_dm(ops[0], ops[1])),
            FSqrtD => push32_units(buf, 0xeeb1_0bc0 | fp_dm(ops[0], ops[1])),
            FCmpS => push32_units(buf, 0xeeb4_0a40 | fp_dm(ops[0], ops[1])),
            FCmpD => push32_units(buf, 0xeeb4_0b40 | fp_dm(ops[0], ops[1])),
            FCvtIS => push32_units(buf, 0xeeb8_0ac0 | fp_dm(ops[0], ops[1])),
            FCvtSI => push32_units(buf, 0xeebd_0a40 | fp_dm(ops[0], ops[1])),
            FCvtID => push32_units(buf, 0xeeb8_0bc0 | fp_dm(ops[0], ops[1])),
            FCvtDI => push32_units(buf, 0xeebd_0b40 | fp_dm(ops[0], ops[1])),
            FCvtSD => push32_units(buf, 0xeeb7_0ac0 | fp_dm(ops[0], ops[1])),
            FCvtDS => push32_units(buf, 0xeeb7_0bc0 | fp_dm(ops[0], ops[1])),
            FLoadS | FLoadD => {
                let disp = (ops[2] as u32 >> 2) & 0xff;
                let wide = if op == FLoadD { 0x100 } else { 0 };
                push32_units(buf, 0xed90_0a00 | wide | (rn << 16) | (fp_n(ops[0]) << 12) | disp);
            }
            FStoreS | FStoreD => {
                let disp = (ops[2] as u32 >> 2) & 0xff;
                let wide = if op == FStoreD { 0x100 } else { 0 };
                push32_units(buf, 0xed80_0a00 | wide | (rn << 16) | (fp_n(ops[0]) << 12) | disp);
            }
            CondBr => {
                let cc = arm_cond(CondCode::from_i32(ops[0]));
                let disp = displacement(lir.offset, 4, target_offset.expect("branch target"));
                if lir.size == 2 {
                    if !(-256..256).contains(&disp) {
                        return Some(4);
                    }
                    push16(buf, 0xd000 | (cc << 8) as u16 | ((disp >> 1) & 0xff) as u16);
                } else {
                    // T3 conditional branch, +-1MB.
                    let imm = (disp >> 1) as u32;
                    let insn = 0xf000_8000
                        | (cc << 22)
                        | ((imm & 0x3f800) << 5)
                        | ((imm >> 18 & 1) << 13)
                        | ((imm >> 19 & 1) << 11)
                        | (imm & 0x7ff)
                        | ((imm >> 11 & 0x3f) << 16);
                    push32_units(buf, insn);
                }
            }
            Br => {
                let disp = displacement(lir.offset, 4, target_offset.expect("branch target"));
                if lir.size == 2 {
                    if !(-2048..2048).contains(&disp) {
                        return Some(4);
                    }
                    push16(buf, 0xe000 | ((disp >> 1) & 0x7ff) as u16);
                } else {
                    // T4 unconditional branch, +-16MB.
                    let imm = (disp >> 1) as u32;
                    push32_units(
                        buf,
                        0xf000_9000 | ((imm >> 11) & 0x3ff) << 16 | (imm & 0x7ff),
                    );
                }
            }
            BlxReg => push16(buf, 0x4780 | ((ops[0] as u16 & 0xf) << 3)),
            Bx => push16(buf, 0x4700 | ((ops[0] as u16 & 0xf) << 3)),
            Ret => push16(buf, 0x4700 | ((LR as u16) << 3)), // bx lr
            PushList => push32_units(buf, 0xe92d_0000 | (ops[0] as u32 & 0xffff)),
            PopList => push32_units(buf, 0xe8bd_0000 | (ops[0] as u32 & 0xffff)),
            SpAdjust => {
                let amount = ops[0];
                if amount < 0 {
                    push32_units(buf, 0xf2ad_0000 | ((SP as u32) << 8) | ((-amount) as u32 & 0xfff));
                } else {
                    push32_units(buf, 0xf20d_0000 | ((SP as u32) << 8) | (amount as u32 & 0xfff));
                }
            }
        }
        None
    }
}

fn fp_n(reg: i32) -> u32 {
    (reg as u32).saturating_sub(FP_REG_BASE as u32) & 0x1f
}

fn fp_dm(d: i32, m: i32) -> u32 {
    (fp_n(d) >> 1) << 12 | ((fp_n(d) & 1) << 22) | (fp_n(m) >> 1) | ((fp_n(m) & 1) << 5)
}

fn fp_dnm(d: i32, n: i32, m: i32) -> u32 {
    fp_dm(d, m) | ((fp_n(n) >> 1) << 16) | ((fp_n(n) & 1) << 7)
}
