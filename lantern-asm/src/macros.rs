//! Opcode declaration macro.
//!
//! One table row per opcode carries everything downstream passes consult:
//! the raw byte, the encoding format, control-flow flags, dataflow
//! attributes and method-analyzer attributes.  The macro expands the table
//! into the `Opcode` enum and its constant lookup methods so the lists can
//! never drift apart.

macro_rules! opcodes {
    (
        $(
            $raw:literal => $name:ident, $fmt:ident,
                [$( $flag:ident )|*], [$( $df:ident )|*], [$( $an:ident )|*];
        )*
    ) => {
        /// Instruction opcodes of the Lantern bytecode.
        ///
        /// Gaps in the numbering are slots the bytecode format reserves but
        /// does not assign; `from_u8` rejects them.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
                 strum::Display, strum::EnumIter)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u8)]
        #[allow(missing_docs)]
        pub enum Opcode {
            $( $name = $raw, )*
        }

        impl Opcode {
            /// Decode the opcode byte; `None` for unassigned slots.
            pub const fn from_u8(raw: u8) -> Option<Self> {
                match raw {
                    $( $raw => Some(Self::$name), )*
                    _ => None,
                }
            }

            /// Encoding format.
            pub const fn format(self) -> Format {
                match self {
                    $( Self::$name => Format::$fmt, )*
                }
            }

            /// Control-flow flags.
            pub const fn flags(self) -> OpFlags {
                match self {
                    $( Self::$name =>
                        OpFlags::from_bits_truncate(0 $( | OpFlags::$flag.bits() )*), )*
                }
            }

            /// Dataflow attributes (see [`crate::dataflow::df`]).
            pub const fn dataflow_attrs(self) -> u64 {
                match self {
                    $( Self::$name => 0 $( | $crate::dataflow::df::$df )*, )*
                }
            }

            /// Analyzer attributes (see [`crate::dataflow::an`]).
            pub const fn analysis_attrs(self) -> u32 {
                match self {
                    $( Self::$name => 0 $( | $crate::dataflow::an::$an )*, )*
                }
            }
        }
    };
}
