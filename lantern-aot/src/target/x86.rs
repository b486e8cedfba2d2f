//! x86-32 code generator backend.
//!
//! The generator runs in two-operand mode here: three-operand ALU LIRs
//! always arrive with `operands[1] == operands[0]`.  The per-thread base is
//! modeled as pseudo-register 15 and lowered to an `fs:` segment access.

use super::{displacement, Target, TargetRegs, FP_REG_BASE};
use crate::lir::{
    AssemblerStatus, CondCode, Lir, LirId, LirList, LirOp, MachineOp, PseudoOp,
};
use crate::InstructionSet;

/// x86-32 target singleton.
pub struct X86;

const ESP: u8 = 4;
/// Pseudo-register standing for the fs-based thread block.
pub const THREAD_REG: u8 = 15;

static REGS: TargetRegs = TargetRegs {
    // ebx is reserved scratch; the prologue saves it unconditionally.
    core_temps: &[0, 1, 2, 3],
    preserved_core: &[5, 6, 7],
    fp_temps: &[
        FP_REG_BASE,
        FP_REG_BASE + 1,
        FP_REG_BASE + 2,
        FP_REG_BASE + 3,
        FP_REG_BASE + 4,
        FP_REG_BASE + 5,
    ],
    preserved_fp: &[FP_REG_BASE + 6, FP_REG_BASE + 7],
    arg_regs: &[0, 1, 2],
    ret0: 0,
    ret1: 2,
    fret0: FP_REG_BASE,
    sp: ESP,
    lr: None,
    self_reg: THREAD_REG,
    suspend_reg: None,
    invoke_tgt: 0,
    reserved_spill_mask: 1 << 3,
};

fn x86_cond(cc: CondCode) -> u8 {
    match cc {
        CondCode::Eq => 0x4,
        CondCode::Ne => 0x5,
        CondCode::Lt => 0xc,
        CondCode::Ge => 0xd,
        CondCode::Gt => 0xf,
        CondCode::Le => 0xe,
        CondCode::Lo => 0x2,
        CondCode::Hs => 0x3,
        CondCode::Mi => 0x8,
        CondCode::Pl => 0x9,
        CondCode::Hi => 0x7,
        CondCode::Ls => 0x6,
    }
}

fn modrm_disp32(buf: &mut Vec<u8>, reg: u8, base: u8) {
    if base == THREAD_REG {
        // fs:[disp32]; the segment prefix was pushed by the caller.
        buf.push(0x05 | (reg & 7) << 3);
    } else if base == ESP {
        buf.push(0x84 | (reg & 7) << 3);
        buf.push(0x24); // SIB: base=esp
    } else {
        buf.push(0x80 | (reg & 7) << 3 | (base & 7));
    }
}

fn push_disp32(buf: &mut Vec<u8>, disp: i32) {
    buf.extend_from_slice(&disp.to_le_bytes());
}

fn xmm(reg: i32) -> u8 {
    (reg as u8).saturating_sub(FP_REG_BASE) & 7
}

fn mem_size(base: u8) -> u8 {
    // opcode + modrm + disp32, +1 SIB for esp, +1 segment prefix for fs.
    match base {
        b if b == THREAD_REG => 7,
        b if b == ESP => 7,
        _ => 6,
    }
}

impl Target for X86 {
    fn isa(&self) -> InstructionSet {
        InstructionSet::X86
    }

    fn regs(&self) -> &'static TargetRegs {
        &REGS
    }

    fn inst_size(&self, lir: &Lir) -> u8 {
        let LirOp::Machine(op) = lir.op else { return 0 };
        use MachineOp::*;
        match op {
            Nop => 1,
            MovRR | MvnRR | NotRR | NegRR | CmpRR => 2,
            MovRI => 5,
            LuiRI => 5,
            AddRRR | AdcRRR | SubRRR | SbcRRR | AndRRR | OrRRR | XorRRR | SltuRRR => 2,
            MulRRR => 3,
            LslRRR | LsrRRR | AsrRRR => 2, // shift by cl
            AddRRI | SubRRI | AndRRI | OrRRI | XorRRI | CmpRI => 6,
            LslRRI | LsrRRI | AsrRRI => 3,
            LoadWordDisp | StoreWordDisp => mem_size(lir.operands[1] as u8),
            LoadUHalfDisp | LoadSHalfDisp | LoadUByteDisp | LoadSByteDisp => {
                mem_size(lir.operands[1] as u8) + 1
            }
            StoreHalfDisp => mem_size(lir.operands[1] as u8) + 1,
            StoreByteDisp => mem_size(lir.operands[1] as u8),
            LoadPcRel => 5,
            AdrPcRel => 5,
            FMovRR | FAddS | FSubS | FMulS | FDivS | FAddD | FSubD | FMulD | FDivD
            | FSqrtD | FCmpS | FCmpD | FCvtIS | FCvtSI | FCvtID | FCvtDI | FCvtSD
            | FCvtDS => 4,
            FMovCoreFp | FMovFpCore => 4,
            FNegS | FNegD => 4,
            FLoadS | FLoadD | FStoreS | FStoreD => mem_size(lir.operands[1] as u8) + 2,
            CondBr => lir.size.max(2),
            Br => lir.size.max(2),
            BlxReg | Bx => 2,
            Ret => 1,
            PushList | PopList => (lir.operands[0] as u32).count_ones() as u8,
            SpAdjust => 6,
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
                        buf.push(0x66);
                        buf.push(0x90);
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
        0
    }

    fn switch_absolute(&self) -> bool {
        true
    }

    fn pc_use_def_encoding(&self) -> u64 {
        0
    }

    fn two_operand_alu(&self) -> bool {
        true
    }

    fn has_push_pop(&self) -> bool {
        true
    }
}

impl X86 {
    fn encode(
        &self,
        lirs: &LirList,
        lir: &Lir,
        op: MachineOp,
        buf: &mut Vec<u8>,
    ) -> Option<u8> {
        use MachineOp::*;
        let ops = lir.operands;
        let rd = ops[0] as u8;
        let rs = ops[1] as u8;
        let rm = ops[2] as u8;
        let target_offset = lir.target.map(|t| lirs.get(t).offset);
        let rr = |buf: &mut Vec<u8>, opcode: u8, reg: u8, r_m: u8| {
            buf.push(opcode);
            buf.push(0xc0 | (reg & 7) << 3 | (r_m & 7));
        };
        match op {
            Nop => buf.push(0x90),
            MovRR => rr(buf, 0x8b, rd, rs),
            AdrPcRel => unreachable!("x86 switches use compare chains"),
            MovRI | LuiRI | LoadPcRel => {
                // mov r32, imm32; pc-relative pool loads become immediate
                // materialization of the pool value on x86.
                let value = match op {
                    LoadPcRel => lirs.get(lir.target.expect("literal")).operands[0],
                    _ => ops[1],
                };
                buf.push(0xb8 | (rd & 7));
                push_disp32(buf, value);
            }
            MvnRR | NotRR => {
                if rd != rs {
                    // Generator guarantees two-operand form.
                    debug_assert_eq!(rd, rs);
                }
                rr(buf, 0xf7, 2, rd);
            }
            NegRR => rr(buf, 0xf7, 3, rd),
            AddRRR => rr(buf, 0x03, rd, rm),
            SltuRRR => unreachable!("sltu is only emitted on MIPS"),
            AdcRRR => rr(buf, 0x13, rd, rm),
            SubRRR => rr(buf, 0x2b, rd, rm),
            SbcRRR => rr(buf, 0x1b, rd, rm),
            AndRRR => rr(buf, 0x23, rd, rm),
            OrRRR => rr(buf, 0x0b, rd, rm),
            XorRRR => rr(buf, 0x33, rd, rm),
            MulRRR => {
                buf.push(0x0f);
                buf.push(0xaf);
                buf.push(0xc0 | (rd & 7) << 3 | (rm & 7));
            }
            LslRRR => rr(buf, 0xd3, 4, rd),
            LsrRRR => rr(buf, 0xd3, 5, rd),
            AsrRRR => rr(buf, 0xd3, 7, rd),
            AddRRI | SubRRI | AndRRI | OrRRI | XorRRI => {
                let ext: u8 = match op {
                    AddRRI => 0,
                    OrRRI => 1,
                    AndRRI => 4,
                    XorRRI => 6,
                    _ => 5,
                };
                buf.push(0x81);
                buf.push(0xc0 | ext << 3 | (rd & 7));
                push_disp32(buf, ops[2]);
            }
            LslRRI | LsrRRI | AsrRRI => {
                let ext: u8 = match op {
                    LslRRI => 4,
                    LsrRRI => 5,
                    _ => 7,
                };
                buf.push(0xc1);
                buf.push(0xc0 | ext << 3 | (rd & 7));
                buf.push(ops[2] as u8 & 0x1f);
            }
            CmpRR => rr(buf, 0x3b, rd, rs),
            CmpRI => {
                buf.push(0x81);
                buf.push(0xc0 | 7 << 3 | (rd & 7));
                push_disp32(buf, ops[1]);
            }
            LoadWordDisp | LoadUHalfDisp | LoadSHalfDisp | LoadUByteDisp | LoadSByteDisp => {
                if rs == THREAD_REG {
                    buf.push(0x64); // fs:
                }
                match op {
                    LoadWordDisp => buf.push(0x8b),
                    LoadUHalfDisp => {
                        buf.push(0x0f);
                        buf.push(0xb7);
                    }
                    LoadSHalfDisp => {
                        buf.push(0x0f);
                        buf.push(0xbf);
                    }
                    LoadUByteDisp => {
                        buf.push(0x0f);
                        buf.push(0xb6);
                    }
                    _ => {
                        buf.push(0x0f);
                        buf.push(0xbe);
                    }
                }
                modrm_disp32(buf, rd, rs);
                push_disp32(buf, ops[2]);
            }
            StoreWordDisp | StoreHalfDisp | StoreByteDisp => {
                if rs == THREAD_REG {
                    buf.push(0x64);
                }
                match op {
                    StoreWordDisp => buf.push(0x89),
                    StoreHalfDisp => {
                        buf.push(0x66);
                        buf.push(0x89);
                    }
                    _ => buf.push(0x88),
                }
                modrm_disp32(buf, rd, rs);
                push_disp32(buf, ops[2]);
            }
            FMovRR => sse(buf, 0xf3, 0x10, xmm(ops[0]), xmm(ops[1])),
            FMovCoreFp => sse(buf, 0x66, 0x6e, xmm(ops[0]), rs & 7),
            FMovFpCore => sse(buf, 0x66, 0x7e, xmm(ops[1]), rd & 7),
            FAddS => sse(buf, 0xf3, 0x58, xmm(ops[0]), xmm(ops[2])),
            FSubS => sse(buf, 0xf3, 0x5c, xmm(ops[0]), xmm(ops[2])),
            FMulS => sse(buf, 0xf3, 0x59, xmm(ops[0]), xmm(ops[2])),
            FDivS => sse(buf, 0xf3, 0x5e, xmm(ops[0]), xmm(ops[2])),
            FAddD => sse(buf, 0xf2, 0x58, xmm(ops[0]), xmm(ops[2])),
            FSubD => sse(buf, 0xf2, 0x5c, xmm(ops[0]), xmm(ops[2])),
            FMulD => sse(buf, 0xf2, 0x59, xmm(ops[0]), xmm(ops[2])),
            FDivD => sse(buf, 0xf2, 0x5e, xmm(ops[0]), xmm(ops[2])),
            FNegS => sse(buf, 0x0f, 0x57, xmm(ops[0]), xmm(ops[1])), // xorps sign
            FNegD => sse(buf, 0x66, 0x57, xmm(ops[0]), xmm(ops[1])),
            FSqrtD => sse(buf, 0xf2, 0x51, xmm(ops[0]), xmm(ops[1])),
            FCmpS => sse(buf, 0x0f, 0x2e, xmm(ops[0]), xmm(ops[1])), // ucomiss
            FCmpD => sse(buf, 0x66, 0x2e, xmm(ops[0]), xmm(ops[1])),
            FCvtIS => sse(buf, 0xf3, 0x2a, xmm(ops[0]), rs & 7), // cvtsi2ss
            FCvtSI => sse(buf, 0xf3, 0x2c, rd & 7, xmm(ops[1])), // cvttss2si
            FCvtID => sse(buf, 0xf2, 0x2a, xmm(ops[0]), rs & 7),
            FCvtDI => sse(buf, 0xf2, 0x2c, rd & 7, xmm(ops[1])),
            FCvtSD => sse(buf, 0xf3, 0x5a, xmm(ops[0]), xmm(ops[1])),
            FCvtDS => sse(buf, 0xf2, 0x5a, xmm(ops[0]), xmm(ops[1])),
            FLoadS | FLoadD | FStoreS | FStoreD => {
                let prefix: u8 = if matches!(op, FLoadS | FStoreS) { 0xf3 } else { 0xf2 };
                let opcode: u8 = if matches!(op, FLoadS | FLoadD) { 0x10 } else { 0x11 };
                buf.push(prefix);
                buf.push(0x0f);
                buf.push(opcode);
                modrm_disp32(buf, xmm(ops[0]), rs);
                push_disp32(buf, ops[2]);
                // Pad to the declared size so offsets stay stable.
                while (buf.len() as u32) < lir.offset + lir.size as u32 {
                    buf.push(0x90);
                }
            }
            CondBr => {
                let disp_short =
                    displacement(lir.offset, 2, target_offset.expect("branch target"));
                if lir.size == 2 {
                    if !(-128..128).contains(&disp_short) {
                        return Some(6);
                    }
                    buf.push(0x70 | x86_cond(CondCode::from_i32(ops[0])));
                    buf.push(disp_short as u8);
                } else {
                    let disp = displacement(lir.offset, 6, target_offset.expect("target"));
                    buf.push(0x0f);
                    buf.push(0x80 | x86_cond(CondCode::from_i32(ops[0])));
                    push_disp32(buf, disp);
                }
            }
            Br => {
                let disp_short =
                    displacement(lir.offset, 2, target_offset.expect("branch target"));
                if lir.size == 2 {
                    if !(-128..128).contains(&disp_short) {
                        return Some(5);
                    }
                    buf.push(0xeb);
                    buf.push(disp_short as u8);
                } else {
                    let disp = displacement(lir.offset, 5, target_offset.expect("target"));
                    buf.push(0xe9);
                    push_disp32(buf, disp);
                }
            }
            BlxReg => {
                buf.push(0xff);
                buf.push(0xd0 | (rd & 7)); // call r32
            }
            Bx => {
                buf.push(0xff);
                buf.push(0xe0 | (rd & 7)); // jmp r32
            }
            Ret => buf.push(0xc3),
            PushList => {
                for reg in 0..8u8 {
                    if ops[0] & (1 << reg) != 0 {
                        buf.push(0x50 | reg);
                    }
                }
            }
            PopList => {
                for reg in (0..8u8).rev() {
                    if ops[0] & (1 << reg) != 0 {
                        buf.push(0x58 | reg);
                    }
                }
            }
            SpAdjust => {
                buf.push(0x81);
                let (ext, amount) = if ops[0] < 0 { (5u8, -ops[0]) } else { (0u8, ops[0]) };
                buf.push(0xc0 | ext << 3 | ESP);
                push_disp32(buf, amount);
            }
        }
        // Keep declared sizes authoritative: pad any shortfall.
        while (buf.len() as u32) < lir.offset + lir.size as u32 {
            buf.push(0x90);
        }
        debug_assert!(buf.len() as u32 <= lir.offset + lir.size as u32);
        None
    }
}

fn sse(buf: &mut Vec<u8>, prefix: u8, opcode: u8, reg: u8, r_m: u8) {
    if prefix != 0x0f {
        buf.push(prefix);
    }
    buf.push(0x0f);
    buf.push(opcode);
    buf.push(0xc0 | (reg & 7) << 3 | (r_m & 7));
}
