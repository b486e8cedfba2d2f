//! MIPS32 code generator backend.
//!
//! Branch delay slots are filled with `nop`, so every branch-class LIR
//! occupies eight bytes.  Integer compares materialize into the assembler
//! temporary `$at`, which the following conditional branch tests; FP
//! compares set the FPU condition flag consumed by `bc1t`/`bc1f`.

use super::{displacement, Target, TargetRegs, FP_REG_BASE};
use crate::lir::{
    AssemblerStatus, CondCode, Lir, LirId, LirList, LirOp, MachineOp, PseudoOp,
};
use crate::InstructionSet;

/// MIPS32 target singleton.
pub struct Mips;

const AT: u32 = 1;
const ZERO: u32 = 0;
const SP: u8 = 29;
const RA: u8 = 31;

static REGS: TargetRegs = TargetRegs {
    core_temps: &[8, 9, 10, 11, 12, 13, 14, 15, 24],
    preserved_core: &[18, 19, 20, 21, 22, 23],
    fp_temps: &[
        FP_REG_BASE,
        FP_REG_BASE + 2,
        FP_REG_BASE + 4,
        FP_REG_BASE + 6,
        FP_REG_BASE + 8,
        FP_REG_BASE + 10,
    ],
    preserved_fp: &[
        FP_REG_BASE + 20,
        FP_REG_BASE + 22,
        FP_REG_BASE + 24,
        FP_REG_BASE + 26,
    ],
    arg_regs: &[4, 5, 6, 7],
    ret0: 2,
    ret1: 3,
    fret0: FP_REG_BASE,
    sp: SP,
    lr: Some(RA),
    self_reg: 17,
    suspend_reg: Some(16),
    reserved_spill_mask: 0,
    invoke_tgt: 25,
};

fn push32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn r_type(funct: u32, rd: u32, rs: u32, rt: u32) -> u32 {
    (rs << 21) | (rt << 16) | (rd << 11) | funct
}

fn i_type(op: u32, rt: u32, rs: u32, imm: i32) -> u32 {
    (op << 26) | (rs << 21) | (rt << 16) | (imm as u32 & 0xffff)
}

fn fp_reg(reg: i32) -> u32 {
    (reg as u32).saturating_sub(FP_REG_BASE as u32) & 0x1f
}

impl Target for Mips {
    fn isa(&self) -> InstructionSet {
        InstructionSet::Mips
    }

    fn regs(&self) -> &'static TargetRegs {
        &REGS
    }

    fn inst_size(&self, lir: &Lir) -> u8 {
        let LirOp::Machine(op) = lir.op else { return 0 };
        use MachineOp::*;
        match op {
            // Branch plus its delay-slot nop.
            CondBr | Br | BlxReg | Bx | Ret => 8,
            _ => 4,
        }
    }

    fn assemble(&self, lirs: &mut LirList, buf: &mut Vec<u8>) -> AssemblerStatus {
        let ids: Vec<LirId> = lirs.iter().collect();
        let mut last_was_fp_cmp = false;
        for id in ids {
            let lir = lirs.get(id).clone();
            if lir.is_nop() {
                continue;
            }
            match lir.op {
                LirOp::Pseudo(PseudoOp::Align4) => {
                    debug_assert_eq!(lir.operands[0], 0, "MIPS code is always 4-aligned");
                }
                LirOp::Pseudo(_) => {}
                LirOp::Machine(op) => {
                    debug_assert_eq!(buf.len() as u32, lir.offset);
                    self.encode(lirs, &lir, op, last_was_fp_cmp, buf);
                    last_was_fp_cmp =
                        matches!(op, MachineOp::FCmpS | MachineOp::FCmpD);
                }
            }
        }
        AssemblerStatus::Success
    }

    fn switch_anchor_delta(&self) -> i32 {
        0
    }

    fn pc_use_def_encoding(&self) -> u64 {
        0
    }
}

impl Mips {
    fn encode(
        &self,
        lirs: &LirList,
        lir: &Lir,
        op: MachineOp,
        after_fp_cmp: bool,
        buf: &mut Vec<u8>,
    ) {
        use MachineOp::*;
        let ops = lir.operands;
        let rd = ops[0] as u32 & 0x1f;
        let rs = ops[1] as u32 & 0x1f;
        let rt = ops[2] as u32 & 0x1f;
        let target_offset = lir.target.map(|t| lirs.get(t).offset);
        match op {
            Nop => push32(buf, 0),
            MovRR => push32(buf, r_type(0x21, rd, rs, ZERO)), // addu rd, rs, zero
            MovRI => push32(buf, i_type(0x0d, rd, ZERO, ops[1])), // ori rd, zero, imm
            MvnRR | NotRR => push32(buf, r_type(0x27, rd, rs, ZERO)), // nor
            AddRRR => push32(buf, r_type(0x21, rd, rs, rt)),
            SubRRR => push32(buf, r_type(0x23, rd, rs, rt)),
            AdcRRR | SbcRRR => unreachable!("MIPS long carries use sltu sequences"),
            SltuRRR => push32(buf, r_type(0x2b, rd, rs, rt)),
            MulRRR => push32(buf, (0x1c << 26) | r_type(0x02, rd, rs, rt)), // mul
            AndRRR => push32(buf, r_type(0x24, rd, rs, rt)),
            OrRRR => push32(buf, r_type(0x25, rd, rs, rt)),
            XorRRR => push32(buf, r_type(0x26, rd, rs, rt)),
            LslRRR => push32(buf, r_type(0x04, rd, rt, rs)), // sllv
            LsrRRR => push32(buf, r_type(0x06, rd, rt, rs)),
            AsrRRR => push32(buf, r_type(0x07, rd, rt, rs)),
            AddRRI => push32(buf, i_type(0x09, rd, rs, ops[2])),
            SubRRI => push32(buf, i_type(0x09, rd, rs, -ops[2])),
            AndRRI => push32(buf, i_type(0x0c, rd, rs, ops[2])),
            OrRRI => push32(buf, i_type(0x0d, rd, rs, ops[2])),
            XorRRI => push32(buf, i_type(0x0e, rd, rs, ops[2])),
            LslRRI => push32(buf, (rs << 16) | (rd << 11) | (((ops[2] as u32) & 0x1f) << 6
            )), // sll rd, rs, sa
            LsrRRI => push32(
                buf,
                (rs << 16) | (rd << 11) | (((ops[2] as u32) & 0x1f) << 6) | 0x02,
            ),
            AsrRRI => push32(
                buf,
                (rs << 16) | (rd << 11) | (((ops[2] as u32) & 0x1f) << 6) | 0x03,
            ),
            NegRR => push32(buf, r_type(0x23, rd, ZERO, rs)),
            LuiRI => push32(buf, i_type(0x0f, rd, ZERO, (ops[1] >> 16) & 0xffff)),
            CmpRR => push32(buf, r_type(0x23, AT, rd, rs)), // subu at, op0, op1
            CmpRI => push32(buf, i_type(0x09, AT, rd, -ops[1])), // at = rs - imm
            LoadWordDisp => push32(buf, i_type(0x23, rd, rs, ops[2])),
            LoadUHalfDisp => push32(buf, i_type(0x25, rd, rs, ops[2])),
            LoadSHalfDisp => push32(buf, i_type(0x21, rd, rs, ops[2])),
            LoadUByteDisp => push32(buf, i_type(0x24, rd, rs, ops[2])),
            LoadSByteDisp => push32(buf, i_type(0x20, rd, rs, ops[2])),
            StoreWordDisp => push32(buf, i_type(0x2b, rd, rs, ops[2])),
            StoreHalfDisp => push32(buf, i_type(0x29, rd, rs, ops[2])),
            StoreByteDisp => push32(buf, i_type(0x28, rd, rs, ops[2])),
            LoadPcRel | AdrPcRel => {
                // The generator materializes constants with lui/ori and
                // switches with compare chains on MIPS; PC-relative forms
                // never reach this assembler.
                unreachable!("pc-relative forms are not emitted on MIPS")
            }
            FMovRR => push32(buf, 0x4600_0006 | (fp_reg(ops[1]) << 11) | (fp_reg(ops[0]) << 6)),
            FMovCoreFp => push32(buf, 0x4480_0000 | (rn_of(ops[1]) << 16) | (fp_reg(ops[0]) << 11)),
            FMovFpCore => push32(buf, 0x4400_0000 | (rd << 16) | (fp_reg(ops[1]) << 11)),
            FAddS => push32(buf, fp3(0x10, 0x00, ops)),
            FSubS => push32(buf, fp3(0x10, 0x01, ops)),
            FMulS => push32(buf, fp3(0x10, 0x02, ops)),
            FDivS => push32(buf, fp3(0x10, 0x03, ops)),
            FAddD => push32(buf, fp3(0x11, 0x00, ops)),
            FSubD => push32(buf, fp3(0x11, 0x01, ops)),
            FMulD => push32(buf, fp3(0x11, 0x02, ops)),
            FDivD => push32(buf, fp3(0x11, 0x03, ops)),
            FNegS => push32(buf, fp2(0x10, 0x07, ops)),
            FNegD => push32(buf, fp2(0x11, 0x07, ops)),
            FSqrtD => push32(buf, fp2(0x11, 0x04, ops)),
            FCmpS => push32(
                buf,
                0x4600_0032 | (fp_reg(ops[0]) << 11) | (fp_reg(ops[1]) << 16),
            ),
            FCmpD => push32(
                buf,
                0x4620_0032 | (fp_reg(ops[0]) << 11) | (fp_reg(ops[1]) << 16),
            ),
            FCvtIS => push32(buf, fp2(0x14, 0x20, ops)), // cvt.s.w
            FCvtSI => push32(buf, fp2(0x10, 0x24, ops)), // cvt.w.s
            FCvtID => push32(buf, fp2(0x14, 0x21, ops)),
            FCvtDI => push32(buf, fp2(0x11, 0x24, ops)),
            FCvtSD => push32(buf, fp2(0x10, 0x21, ops)),
            FCvtDS => push32(buf, fp2(0x11, 0x20, ops)),
            FLoadS => push32(buf, i_type(0x31, fp_reg(ops[0]), rs, ops[2])), // lwc1
            FStoreS => push32(buf, i_type(0x39, fp_reg(ops[0]), rs, ops[2])), // swc1
            FLoadD => push32(buf, i_type(0x35, fp_reg(ops[0]), rs, ops[2])), // ldc1
            FStoreD => push32(buf, i_type(0x3d, fp_reg(ops[0]), rs, ops[2])), // sdc1
            CondBr => {
                let disp = displacement(lir.offset, 4, target_offset.expect("branch target"));
                let insn_disp = disp >> 2;
                let cc = CondCode::from_i32(ops[0]);
                let insn = if after_fp_cmp {
                    // bc1t / bc1f
                    match cc {
                        CondCode::Eq => 0x4501_0000 | (insn_disp as u32 & 0xffff),
                        _ => 0x4500_0000 | (insn_disp as u32 & 0xffff),
                    }
                } else {
                    match cc {
                        CondCode::Eq => i_type(0x04, ZERO, AT, insn_disp), // beq at, zero
                        CondCode::Ne => i_type(0x05, ZERO, AT, insn_disp),
                        CondCode::Lt | CondCode::Lo | CondCode::Mi => {
                            i_type(0x01, 0x00, AT, insn_disp) // bltz at
                        }
                        CondCode::Ge | CondCode::Hs | CondCode::Pl => {
                            i_type(0x01, 0x01, AT, insn_disp) // bgez at
                        }
                        CondCode::Gt | CondCode::Hi => i_type(0x07, ZERO, AT, insn_disp), // bgtz
                        CondCode::Le | CondCode::Ls => i_type(0x06, ZERO, AT, insn_disp), // blez
                    }
                };
                push32(buf, insn);
                push32(buf, 0); // delay slot
            }
            Br => {
                let disp = displacement(lir.offset, 4, target_offset.expect("branch target"));
                push32(buf, i_type(0x04, ZERO, ZERO, disp >> 2)); // beq zero, zero
                push32(buf, 0);
            }
            BlxReg => {
                push32(buf, r_type(0x09, RA as u32, ops[0] as u32 & 0x1f, ZERO)); // jalr
                push32(buf, 0);
            }
            Bx => {
                push32(buf, r_type(0x08, ZERO, ops[0] as u32 & 0x1f, ZERO)); // jr
                push32(buf, 0);
            }
            Ret => {
                push32(buf, r_type(0x08, ZERO, RA as u32, ZERO)); // jr ra
                push32(buf, 0);
            }
            PushList | PopList => {
                unreachable!("register lists are expanded on MIPS")
            }
            SpAdjust => push32(buf, i_type(0x09, SP as u32, SP as u32, ops[0])),
        }
    }
}

fn rn_of(reg: i32) -> u32 {
    reg as u32 & 0x1f
}

fn fp3(fmt: u32, funct: u32, ops: [i32; 5]) -> u32 {
    (0x11 << 26)
        | (fmt << 21)
        | (fp_reg(ops[2]) << 16)
        | (fp_reg(ops[1]) << 11)
        | (fp_reg(ops[0]) << 6)
        | funct
}

fn fp2(fmt: u32, funct: u32, ops: [i32; 5]) -> u32 {
    (0x11 << 26) | (fmt << 21) | (fp_reg(ops[1]) << 11) | (fp_reg(ops[0]) << 6) | funct
}
