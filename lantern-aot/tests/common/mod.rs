//! Shared builders for pipeline tests.
#![allow(dead_code)] // not every helper is used by every test binary

use lantern_asm::{AccessFlags, MethodBody, MethodRef};

pub fn static_body(insns: Vec<u16>, registers: u16, ins: u16, outs: u16) -> MethodBody {
    MethodBody {
        insns,
        registers_size: registers,
        ins_size: ins,
        outs_size: outs,
        access_flags: AccessFlags::STATIC,
        tries: Vec::new(),
        reference_maps: Vec::new(),
        image_version: 35,
    }
}

pub fn method_ref(shorty: &str, name: &str) -> MethodRef {
    MethodRef {
        class_idx: 1,
        method_idx: 42,
        shorty: shorty.into(),
        class_descriptor: "LMain;".into(),
        name: name.into(),
    }
}

/// k21t: `op vAA, +target`.
pub fn insn_21t(op: u8, a: u8, target: i16) -> [u16; 2] {
    [op as u16 | (a as u16) << 8, target as u16]
}

/// k11n: `const/4 vA, #imm`.
pub fn const4(a: u8, value: i8) -> u16 {
    0x12 | (a as u16) << 8 | ((value as u16) & 0xf) << 12
}

/// k10t: `goto +target`.
pub fn goto(target: i8) -> u16 {
    0x28 | (target as u8 as u16) << 8
}

/// k11x: `return vAA`.
pub fn return_reg(a: u8) -> u16 {
    0x0f | (a as u16) << 8
}

pub const RETURN_VOID: u16 = 0x0e;
pub const NOP: u16 = 0x00;
