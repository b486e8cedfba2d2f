//! Decoded method input model.
//!
//! The container-file parser and resolver live outside the compiler; what
//! arrives here is one method's code item plus the identity needed for
//! patch records and helper-call decisions.

use crate::CodeUnit;

bitflags::bitflags! {
    /// Method access flags relevant to compilation.
    pub struct AccessFlags: u32 {
        /// `static` method; no implicit `this` argument.
        const STATIC = 0x0008;
        /// `final`.
        const FINAL = 0x0010;
        /// `synchronized`; entry/exit monitor the receiver or class.
        const SYNCHRONIZED = 0x0020;
        /// `native`.
        const NATIVE = 0x0100;
        /// Constructor (`<init>` or `<clinit>`).
        const CONSTRUCTOR = 0x10000;
    }
}

/// How a call site reaches its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[allow(missing_docs)]
pub enum InvokeType {
    Static,
    Direct,
    Virtual,
    Super,
    Interface,
}

/// One entry of the try/handler table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryItem {
    /// First protected code unit.
    pub start_offset: u32,
    /// Number of protected code units.
    pub insn_count: u32,
    /// Handlers as (exception type index, handler code offset); a type index
    /// of `u32::MAX` is the catch-all.
    pub handlers: Vec<(u32, u32)>,
}

/// Identity of a method inside its class image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MethodRef {
    /// Class-definition index in the image.
    pub class_idx: u16,
    /// Method index in the image.
    pub method_idx: u32,
    /// Shorty descriptor: return type first, then argument types, one
    /// character each (`V I J F D L` and the narrow int flavors).
    pub shorty: String,
    /// Declaring class descriptor, for intrinsic matching.
    pub class_descriptor: String,
    /// Method name.
    pub name: String,
}

impl MethodRef {
    /// Words of the return value (0, 1 or 2).
    pub fn return_words(&self) -> usize {
        match self.shorty.as_bytes().first() {
            Some(b'V') => 0,
            Some(b'J') | Some(b'D') => 2,
            _ => 1,
        }
    }
}

/// A decoded method body: the instruction stream plus frame geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    /// Instruction stream in 16-bit code units.
    pub insns: Vec<CodeUnit>,
    /// Total virtual registers in the frame.
    pub registers_size: u16,
    /// Incoming argument words (tail of the register file).
    pub ins_size: u16,
    /// Outgoing argument words needed by contained calls.
    pub outs_size: u16,
    /// Access flags.
    pub access_flags: AccessFlags,
    /// Try/handler table, ordered by start offset.
    pub tries: Vec<TryItem>,
    /// Per-bytecode-offset reference bitmaps produced by the verifier, used
    /// for the native GC map.  Each entry is (offset, bitmap over vregs).
    /// May be empty when the verifier did not run.
    pub reference_maps: Vec<(u32, Vec<u8>)>,
    /// Image format version; gates a few boundary policies.
    pub image_version: u32,
}

impl MethodBody {
    /// Number of code units.
    pub fn insns_size(&self) -> usize {
        self.insns.len()
    }

    /// True when the method has no implicit `this`.
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }

    /// Register holding `this` for instance methods.
    pub fn this_reg(&self) -> u32 {
        debug_assert!(!self.is_static());
        (self.registers_size - self.ins_size) as u32
    }

    /// Bytes of a GC reference bitmap covering every register.
    pub fn reference_map_width(&self) -> usize {
        (self.registers_size as usize + 7) / 8
    }

    /// Reference bitmap for `offset`, if the verifier provided one.
    pub fn reference_map_at(&self, offset: u32) -> Option<&[u8]> {
        self.reference_maps
            .iter()
            .find(|(at, _)| *at == offset)
            .map(|(_, map)| map.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(registers: u16, ins: u16, flags: AccessFlags) -> MethodBody {
        MethodBody {
            insns: vec![0x0e],
            registers_size: registers,
            ins_size: ins,
            outs_size: 0,
            access_flags: flags,
            tries: Vec::new(),
            reference_maps: Vec::new(),
            image_version: 35,
        }
    }

    #[test]
    fn this_reg_is_first_in() {
        let b = body(5, 2, AccessFlags::empty());
        assert_eq!(b.this_reg(), 3);
    }

    #[test]
    fn shorty_return_words() {
        let mut r = MethodRef {
            class_idx: 0,
            method_idx: 0,
            shorty: "V".into(),
            class_descriptor: "LMain;".into(),
            name: "main".into(),
        };
        assert_eq!(r.return_words(), 0);
        r.shorty = "JI".into();
        assert_eq!(r.return_words(), 2);
        r.shorty = "LI".into();
        assert_eq!(r.return_words(), 1);
    }

    #[test]
    fn reference_map_lookup() {
        let mut b = body(9, 0, AccessFlags::STATIC);
        b.reference_maps = vec![(0, vec![0b0000_0100, 0b1]), (4, vec![0, 0])];
        assert_eq!(b.reference_map_width(), 2);
        assert_eq!(b.reference_map_at(0), Some(&[0b0000_0100, 0b1][..]));
        assert_eq!(b.reference_map_at(2), None);
    }
}
