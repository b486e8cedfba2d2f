//! The opcode table.

use crate::format::Format;

bitflags::bitflags! {
    /// Control-flow properties of an opcode.
    pub struct OpFlags: u8 {
        /// Execution can fall through to the next instruction.
        const CONTINUE = 1 << 0;
        /// Explicit branch (conditional or not).
        const BRANCH = 1 << 1;
        /// Multi-way branch through a payload table.
        const SWITCH = 1 << 2;
        /// Can raise an exception.
        const THROW = 1 << 3;
        /// Leaves the method.
        const RETURN = 1 << 4;
        /// Method call.
        const INVOKE = 1 << 5;
    }
}

opcodes! {
    0x00 => Nop, k10x, [CONTINUE], [NOP], [NONE];

    0x01 => Move, k12x, [CONTINUE], [DA|UB|IS_MOVE], [MOVE];
    0x02 => MoveFrom16, k22x, [CONTINUE], [DA|UB|IS_MOVE], [MOVE];
    0x03 => Move16, k32x, [CONTINUE], [DA|UB|IS_MOVE], [MOVE];
    0x04 => MoveWide, k12x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|IS_MOVE], [MOVE];
    0x05 => MoveWideFrom16, k22x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|IS_MOVE], [MOVE];
    0x06 => MoveWide16, k32x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|IS_MOVE], [MOVE];
    0x07 => MoveObject, k12x, [CONTINUE], [DA|UB|IS_MOVE|NULL_TRANSFER_0|REF_A|REF_B], [MOVE];
    0x08 => MoveObjectFrom16, k22x, [CONTINUE], [DA|UB|IS_MOVE|NULL_TRANSFER_0|REF_A|REF_B], [MOVE];
    0x09 => MoveObject16, k32x, [CONTINUE], [DA|UB|IS_MOVE|NULL_TRANSFER_0|REF_A|REF_B], [MOVE];
    0x0a => MoveResult, k11x, [CONTINUE], [DA], [MOVE];
    0x0b => MoveResultWide, k11x, [CONTINUE], [DA|A_WIDE], [MOVE];
    0x0c => MoveResultObject, k11x, [CONTINUE], [DA|REF_A], [MOVE];
    0x0d => MoveException, k11x, [CONTINUE], [DA|REF_A|NON_NULL_DST], [MOVE];

    0x0e => ReturnVoid, k10x, [RETURN], [NOP], [BRANCH];
    0x0f => Return, k11x, [RETURN], [UA], [BRANCH];
    0x10 => ReturnWide, k11x, [RETURN], [UA|A_WIDE], [BRANCH];
    0x11 => ReturnObject, k11x, [RETURN], [UA|REF_A], [BRANCH];

    0x12 => Const4, k11n, [CONTINUE], [DA|SETS_CONST], [SIMPLECONST];
    0x13 => Const16, k21s, [CONTINUE], [DA|SETS_CONST], [SIMPLECONST];
    0x14 => Const, k31i, [CONTINUE], [DA|SETS_CONST], [SIMPLECONST];
    0x15 => ConstHigh16, k21h, [CONTINUE], [DA|SETS_CONST], [SIMPLECONST];
    0x16 => ConstWide16, k21s, [CONTINUE], [DA|A_WIDE|SETS_CONST], [SIMPLECONST];
    0x17 => ConstWide32, k31i, [CONTINUE], [DA|A_WIDE|SETS_CONST], [SIMPLECONST];
    0x18 => ConstWide, k51l, [CONTINUE], [DA|A_WIDE|SETS_CONST], [SIMPLECONST];
    0x19 => ConstWideHigh16, k21h, [CONTINUE], [DA|A_WIDE|SETS_CONST], [SIMPLECONST];
    0x1a => ConstString, k21c, [CONTINUE|THROW], [DA|REF_A|NON_NULL_DST|UMS], [HEAVYWEIGHT];
    0x1b => ConstStringJumbo, k31c, [CONTINUE|THROW], [DA|REF_A|NON_NULL_DST|UMS], [HEAVYWEIGHT];
    0x1c => ConstClass, k21c, [CONTINUE|THROW], [DA|REF_A|NON_NULL_DST|UMS], [HEAVYWEIGHT];

    0x1d => MonitorEnter, k11x, [CONTINUE|THROW], [UA|NULL_CHK_0|REF_A], [HEAVYWEIGHT];
    0x1e => MonitorExit, k11x, [CONTINUE|THROW], [UA|NULL_CHK_0|REF_A], [HEAVYWEIGHT];

    0x1f => CheckCast, k21c, [CONTINUE|THROW], [UA|REF_A|UMS], [HEAVYWEIGHT];
    0x20 => InstanceOf, k22c, [CONTINUE|THROW], [DA|UB|CORE_A|REF_B|UMS], [HEAVYWEIGHT];
    0x21 => ArrayLength, k12x, [CONTINUE|THROW], [DA|UB|NULL_CHK_0|CORE_A|REF_B], [ARRAYOP];
    0x22 => NewInstance, k21c, [CONTINUE|THROW], [DA|REF_A|NON_NULL_DST|UMS], [HEAVYWEIGHT];
    0x23 => NewArray, k22c, [CONTINUE|THROW], [DA|UB|REF_A|CORE_B|NON_NULL_DST|UMS], [HEAVYWEIGHT];
    0x24 => FilledNewArray, k35c, [CONTINUE|THROW], [FORMAT_35C|NON_NULL_RET|UMS], [HEAVYWEIGHT];
    0x25 => FilledNewArrayRange, k3rc, [CONTINUE|THROW], [FORMAT_3RC|NON_NULL_RET|UMS], [HEAVYWEIGHT];
    0x26 => FillArrayData, k31t, [CONTINUE|THROW], [UA|REF_A|NULL_CHK_0], [ARRAYOP|HEAVYWEIGHT];

    0x27 => Throw, k11x, [THROW], [UA|REF_A|NULL_CHK_0], [HEAVYWEIGHT|BRANCH];

    0x28 => Goto, k10t, [BRANCH], [NOP], [BRANCH];
    0x29 => Goto16, k20t, [BRANCH], [NOP], [BRANCH];
    0x2a => Goto32, k30t, [BRANCH], [NOP], [BRANCH];
    0x2b => PackedSwitch, k31t, [CONTINUE|SWITCH], [UA|CORE_A], [SWITCH|BRANCH];
    0x2c => SparseSwitch, k31t, [CONTINUE|SWITCH], [UA|CORE_A], [SWITCH|BRANCH];

    0x2d => CmplFloat, k23x, [CONTINUE], [DA|UB|UC|CORE_A|FP_B|FP_C], [MATH|FP|SINGLE];
    0x2e => CmpgFloat, k23x, [CONTINUE], [DA|UB|UC|CORE_A|FP_B|FP_C], [MATH|FP|SINGLE];
    0x2f => CmplDouble, k23x, [CONTINUE], [DA|UB|B_WIDE|UC|C_WIDE|CORE_A|FP_B|FP_C], [MATH|FP|DOUBLE];
    0x30 => CmpgDouble, k23x, [CONTINUE], [DA|UB|B_WIDE|UC|C_WIDE|CORE_A|FP_B|FP_C], [MATH|FP|DOUBLE];
    0x31 => CmpLong, k23x, [CONTINUE], [DA|UB|B_WIDE|UC|C_WIDE|CORE_A|CORE_B|CORE_C], [MATH|LONG];

    0x32 => IfEq, k22t, [CONTINUE|BRANCH], [UA|UB], [BRANCH];
    0x33 => IfNe, k22t, [CONTINUE|BRANCH], [UA|UB], [BRANCH];
    0x34 => IfLt, k22t, [CONTINUE|BRANCH], [UA|UB|CORE_A|CORE_B], [BRANCH];
    0x35 => IfGe, k22t, [CONTINUE|BRANCH], [UA|UB|CORE_A|CORE_B], [BRANCH];
    0x36 => IfGt, k22t, [CONTINUE|BRANCH], [UA|UB|CORE_A|CORE_B], [BRANCH];
    0x37 => IfLe, k22t, [CONTINUE|BRANCH], [UA|UB|CORE_A|CORE_B], [BRANCH];
    0x38 => IfEqz, k21t, [CONTINUE|BRANCH], [UA], [BRANCH];
    0x39 => IfNez, k21t, [CONTINUE|BRANCH], [UA], [BRANCH];
    0x3a => IfLtz, k21t, [CONTINUE|BRANCH], [UA|CORE_A], [BRANCH];
    0x3b => IfGez, k21t, [CONTINUE|BRANCH], [UA|CORE_A], [BRANCH];
    0x3c => IfGtz, k21t, [CONTINUE|BRANCH], [UA|CORE_A], [BRANCH];
    0x3d => IfLez, k21t, [CONTINUE|BRANCH], [UA|CORE_A], [BRANCH];

    0x44 => Aget, k23x, [CONTINUE|THROW], [DA|UB|UC|NULL_CHK_0|RANGE_CHK_1|CORE_A|REF_B|CORE_C], [MATH|ARRAYOP];
    0x45 => AgetWide, k23x, [CONTINUE|THROW], [DA|A_WIDE|UB|UC|NULL_CHK_0|RANGE_CHK_1|REF_B|CORE_C], [MATH|ARRAYOP];
    0x46 => AgetObject, k23x, [CONTINUE|THROW], [DA|UB|UC|NULL_CHK_0|RANGE_CHK_1|REF_A|REF_B|CORE_C], [MATH|ARRAYOP];
    0x47 => AgetBoolean, k23x, [CONTINUE|THROW], [DA|UB|UC|NULL_CHK_0|RANGE_CHK_1|CORE_A|REF_B|CORE_C], [MATH|ARRAYOP];
    0x48 => AgetByte, k23x, [CONTINUE|THROW], [DA|UB|UC|NULL_CHK_0|RANGE_CHK_1|CORE_A|REF_B|CORE_C], [MATH|ARRAYOP];
    0x49 => AgetChar, k23x, [CONTINUE|THROW], [DA|UB|UC|NULL_CHK_0|RANGE_CHK_1|CORE_A|REF_B|CORE_C], [MATH|ARRAYOP];
    0x4a => AgetShort, k23x, [CONTINUE|THROW], [DA|UB|UC|NULL_CHK_0|RANGE_CHK_1|CORE_A|REF_B|CORE_C], [MATH|ARRAYOP];
    0x4b => Aput, k23x, [CONTINUE|THROW], [UA|UB|UC|NULL_CHK_1|RANGE_CHK_2|CORE_A|REF_B|CORE_C], [MATH|ARRAYOP];
    0x4c => AputWide, k23x, [CONTINUE|THROW], [UA|A_WIDE|UB|UC|NULL_CHK_2|RANGE_CHK_3|REF_B|CORE_C], [MATH|ARRAYOP];
    0x4d => AputObject, k23x, [CONTINUE|THROW], [UA|UB|UC|NULL_CHK_1|RANGE_CHK_2|REF_A|REF_B|CORE_C|UMS], [MATH|ARRAYOP|HEAVYWEIGHT];
    0x4e => AputBoolean, k23x, [CONTINUE|THROW], [UA|UB|UC|NULL_CHK_1|RANGE_CHK_2|CORE_A|REF_B|CORE_C], [MATH|ARRAYOP];
    0x4f => AputByte, k23x, [CONTINUE|THROW], [UA|UB|UC|NULL_CHK_1|RANGE_CHK_2|CORE_A|REF_B|CORE_C], [MATH|ARRAYOP];
    0x50 => AputChar, k23x, [CONTINUE|THROW], [UA|UB|UC|NULL_CHK_1|RANGE_CHK_2|CORE_A|REF_B|CORE_C], [MATH|ARRAYOP];
    0x51 => AputShort, k23x, [CONTINUE|THROW], [UA|UB|UC|NULL_CHK_1|RANGE_CHK_2|CORE_A|REF_B|CORE_C], [MATH|ARRAYOP];

    0x52 => Iget, k22c, [CONTINUE|THROW], [DA|UB|NULL_CHK_0|CORE_A|REF_B], [NONE];
    0x53 => IgetWide, k22c, [CONTINUE|THROW], [DA|A_WIDE|UB|NULL_CHK_0|REF_B], [NONE];
    0x54 => IgetObject, k22c, [CONTINUE|THROW], [DA|UB|NULL_CHK_0|REF_A|REF_B], [NONE];
    0x55 => IgetBoolean, k22c, [CONTINUE|THROW], [DA|UB|NULL_CHK_0|CORE_A|REF_B], [NONE];
    0x56 => IgetByte, k22c, [CONTINUE|THROW], [DA|UB|NULL_CHK_0|CORE_A|REF_B], [NONE];
    0x57 => IgetChar, k22c, [CONTINUE|THROW], [DA|UB|NULL_CHK_0|CORE_A|REF_B], [NONE];
    0x58 => IgetShort, k22c, [CONTINUE|THROW], [DA|UB|NULL_CHK_0|CORE_A|REF_B], [NONE];
    0x59 => Iput, k22c, [CONTINUE|THROW], [UA|UB|NULL_CHK_1|CORE_A|REF_B], [NONE];
    0x5a => IputWide, k22c, [CONTINUE|THROW], [UA|A_WIDE|UB|NULL_CHK_2|REF_B], [NONE];
    0x5b => IputObject, k22c, [CONTINUE|THROW], [UA|UB|NULL_CHK_1|REF_A|REF_B|UMS], [HEAVYWEIGHT];
    0x5c => IputBoolean, k22c, [CONTINUE|THROW], [UA|UB|NULL_CHK_1|CORE_A|REF_B], [NONE];
    0x5d => IputByte, k22c, [CONTINUE|THROW], [UA|UB|NULL_CHK_1|CORE_A|REF_B], [NONE];
    0x5e => IputChar, k22c, [CONTINUE|THROW], [UA|UB|NULL_CHK_1|CORE_A|REF_B], [NONE];
    0x5f => IputShort, k22c, [CONTINUE|THROW], [UA|UB|NULL_CHK_1|CORE_A|REF_B], [NONE];

    0x60 => Sget, k21c, [CONTINUE|THROW], [DA|CORE_A|UMS], [NONE];
    0x61 => SgetWide, k21c, [CONTINUE|THROW], [DA|A_WIDE|UMS], [NONE];
    0x62 => SgetObject, k21c, [CONTINUE|THROW], [DA|REF_A|UMS], [NONE];
    0x63 => SgetBoolean, k21c, [CONTINUE|THROW], [DA|CORE_A|UMS], [NONE];
    0x64 => SgetByte, k21c, [CONTINUE|THROW], [DA|CORE_A|UMS], [NONE];
    0x65 => SgetChar, k21c, [CONTINUE|THROW], [DA|CORE_A|UMS], [NONE];
    0x66 => SgetShort, k21c, [CONTINUE|THROW], [DA|CORE_A|UMS], [NONE];
    0x67 => Sput, k21c, [CONTINUE|THROW], [UA|CORE_A|UMS], [NONE];
    0x68 => SputWide, k21c, [CONTINUE|THROW], [UA|A_WIDE|UMS], [NONE];
    0x69 => SputObject, k21c, [CONTINUE|THROW], [UA|REF_A|UMS], [HEAVYWEIGHT];
    0x6a => SputBoolean, k21c, [CONTINUE|THROW], [UA|CORE_A|UMS], [NONE];
    0x6b => SputByte, k21c, [CONTINUE|THROW], [UA|CORE_A|UMS], [NONE];
    0x6c => SputChar, k21c, [CONTINUE|THROW], [UA|CORE_A|UMS], [NONE];
    0x6d => SputShort, k21c, [CONTINUE|THROW], [UA|CORE_A|UMS], [NONE];

    0x6e => InvokeVirtual, k35c, [CONTINUE|THROW|INVOKE], [FORMAT_35C|NULL_CHK_OUT0|UMS], [INVOKE|HEAVYWEIGHT];
    0x6f => InvokeSuper, k35c, [CONTINUE|THROW|INVOKE], [FORMAT_35C|NULL_CHK_OUT0|UMS], [INVOKE|HEAVYWEIGHT];
    0x70 => InvokeDirect, k35c, [CONTINUE|THROW|INVOKE], [FORMAT_35C|NULL_CHK_OUT0|UMS], [INVOKE|HEAVYWEIGHT];
    0x71 => InvokeStatic, k35c, [CONTINUE|THROW|INVOKE], [FORMAT_35C|UMS], [INVOKE|HEAVYWEIGHT];
    0x72 => InvokeInterface, k35c, [CONTINUE|THROW|INVOKE], [FORMAT_35C|NULL_CHK_OUT0|UMS], [INVOKE|HEAVYWEIGHT];
    0x74 => InvokeVirtualRange, k3rc, [CONTINUE|THROW|INVOKE], [FORMAT_3RC|NULL_CHK_OUT0|UMS], [INVOKE|HEAVYWEIGHT];
    0x75 => InvokeSuperRange, k3rc, [CONTINUE|THROW|INVOKE], [FORMAT_3RC|NULL_CHK_OUT0|UMS], [INVOKE|HEAVYWEIGHT];
    0x76 => InvokeDirectRange, k3rc, [CONTINUE|THROW|INVOKE], [FORMAT_3RC|NULL_CHK_OUT0|UMS], [INVOKE|HEAVYWEIGHT];
    0x77 => InvokeStaticRange, k3rc, [CONTINUE|THROW|INVOKE], [FORMAT_3RC|UMS], [INVOKE|HEAVYWEIGHT];
    0x78 => InvokeInterfaceRange, k3rc, [CONTINUE|THROW|INVOKE], [FORMAT_3RC|NULL_CHK_OUT0|UMS], [INVOKE|HEAVYWEIGHT];

    0x7b => NegInt, k12x, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0x7c => NotInt, k12x, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0x7d => NegLong, k12x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|CORE_A|CORE_B], [MATH|LONG];
    0x7e => NotLong, k12x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|CORE_A|CORE_B], [MATH|LONG];
    0x7f => NegFloat, k12x, [CONTINUE], [DA|UB|FP_A|FP_B], [MATH|FP|SINGLE];
    0x80 => NegDouble, k12x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|FP_A|FP_B], [MATH|FP|DOUBLE];
    0x81 => IntToLong, k12x, [CONTINUE], [DA|A_WIDE|UB|CORE_A|CORE_B], [MATH|INT];
    0x82 => IntToFloat, k12x, [CONTINUE], [DA|UB|FP_A|CORE_B], [MATH|FP|SINGLE];
    0x83 => IntToDouble, k12x, [CONTINUE], [DA|A_WIDE|UB|FP_A|CORE_B], [MATH|FP|DOUBLE];
    0x84 => LongToInt, k12x, [CONTINUE], [DA|UB|B_WIDE|CORE_A|CORE_B], [MATH|LONG];
    0x85 => LongToFloat, k12x, [CONTINUE], [DA|UB|B_WIDE|FP_A|CORE_B], [MATH|FP|SINGLE];
    0x86 => LongToDouble, k12x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|FP_A|CORE_B], [MATH|FP|DOUBLE];
    0x87 => FloatToInt, k12x, [CONTINUE], [DA|UB|CORE_A|FP_B], [MATH|FP|SINGLE];
    0x88 => FloatToLong, k12x, [CONTINUE], [DA|A_WIDE|UB|CORE_A|FP_B], [MATH|FP|SINGLE];
    0x89 => FloatToDouble, k12x, [CONTINUE], [DA|A_WIDE|UB|FP_A|FP_B], [MATH|FP|SINGLE];
    0x8a => DoubleToInt, k12x, [CONTINUE], [DA|UB|B_WIDE|CORE_A|FP_B], [MATH|FP|DOUBLE];
    0x8b => DoubleToLong, k12x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|CORE_A|FP_B], [MATH|FP|DOUBLE];
    0x8c => DoubleToFloat, k12x, [CONTINUE], [DA|UB|B_WIDE|FP_A|FP_B], [MATH|FP|DOUBLE];
    0x8d => IntToByte, k12x, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0x8e => IntToChar, k12x, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0x8f => IntToShort, k12x, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];

    0x90 => AddInt, k23x, [CONTINUE], [DA|UB|UC|CORE_A|CORE_B|CORE_C], [MATH|INT];
    0x91 => SubInt, k23x, [CONTINUE], [DA|UB|UC|CORE_A|CORE_B|CORE_C], [MATH|INT];
    0x92 => MulInt, k23x, [CONTINUE], [DA|UB|UC|CORE_A|CORE_B|CORE_C], [MATH|INT];
    0x93 => DivInt, k23x, [CONTINUE|THROW], [DA|UB|UC|CORE_A|CORE_B|CORE_C], [MATH|INT];
    0x94 => RemInt, k23x, [CONTINUE|THROW], [DA|UB|UC|CORE_A|CORE_B|CORE_C], [MATH|INT];
    0x95 => AndInt, k23x, [CONTINUE], [DA|UB|UC|CORE_A|CORE_B|CORE_C], [MATH|INT];
    0x96 => OrInt, k23x, [CONTINUE], [DA|UB|UC|CORE_A|CORE_B|CORE_C], [MATH|INT];
    0x97 => XorInt, k23x, [CONTINUE], [DA|UB|UC|CORE_A|CORE_B|CORE_C], [MATH|INT];
    0x98 => ShlInt, k23x, [CONTINUE], [DA|UB|UC|CORE_A|CORE_B|CORE_C], [MATH|INT];
    0x99 => ShrInt, k23x, [CONTINUE], [DA|UB|UC|CORE_A|CORE_B|CORE_C], [MATH|INT];
    0x9a => UshrInt, k23x, [CONTINUE], [DA|UB|UC|CORE_A|CORE_B|CORE_C], [MATH|INT];
    0x9b => AddLong, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|CORE_A|CORE_B|CORE_C], [MATH|LONG];
    0x9c => SubLong, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|CORE_A|CORE_B|CORE_C], [MATH|LONG];
    0x9d => MulLong, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|CORE_A|CORE_B|CORE_C], [MATH|LONG];
    0x9e => DivLong, k23x, [CONTINUE|THROW], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|CORE_A|CORE_B|CORE_C], [MATH|LONG|HEAVYWEIGHT];
    0x9f => RemLong, k23x, [CONTINUE|THROW], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|CORE_A|CORE_B|CORE_C], [MATH|LONG|HEAVYWEIGHT];
    0xa0 => AndLong, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|CORE_A|CORE_B|CORE_C], [MATH|LONG];
    0xa1 => OrLong, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|CORE_A|CORE_B|CORE_C], [MATH|LONG];
    0xa2 => XorLong, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|CORE_A|CORE_B|CORE_C], [MATH|LONG];
    0xa3 => ShlLong, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|CORE_A|CORE_B|CORE_C], [MATH|LONG];
    0xa4 => ShrLong, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|CORE_A|CORE_B|CORE_C], [MATH|LONG];
    0xa5 => UshrLong, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|CORE_A|CORE_B|CORE_C], [MATH|LONG];
    0xa6 => AddFloat, k23x, [CONTINUE], [DA|UB|UC|FP_A|FP_B|FP_C], [MATH|FP|SINGLE];
    0xa7 => SubFloat, k23x, [CONTINUE], [DA|UB|UC|FP_A|FP_B|FP_C], [MATH|FP|SINGLE];
    0xa8 => MulFloat, k23x, [CONTINUE], [DA|UB|UC|FP_A|FP_B|FP_C], [MATH|FP|SINGLE];
    0xa9 => DivFloat, k23x, [CONTINUE], [DA|UB|UC|FP_A|FP_B|FP_C], [MATH|FP|SINGLE];
    0xaa => RemFloat, k23x, [CONTINUE], [DA|UB|UC|FP_A|FP_B|FP_C], [MATH|FP|SINGLE|HEAVYWEIGHT];
    0xab => AddDouble, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|FP_A|FP_B|FP_C], [MATH|FP|DOUBLE];
    0xac => SubDouble, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|FP_A|FP_B|FP_C], [MATH|FP|DOUBLE];
    0xad => MulDouble, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|FP_A|FP_B|FP_C], [MATH|FP|DOUBLE];
    0xae => DivDouble, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|FP_A|FP_B|FP_C], [MATH|FP|DOUBLE];
    0xaf => RemDouble, k23x, [CONTINUE], [DA|A_WIDE|UB|B_WIDE|UC|C_WIDE|FP_A|FP_B|FP_C], [MATH|FP|DOUBLE|HEAVYWEIGHT];

    0xb0 => AddInt2Addr, k12x, [CONTINUE], [DA|UA|UB|CORE_A|CORE_B], [MATH|INT];
    0xb1 => SubInt2Addr, k12x, [CONTINUE], [DA|UA|UB|CORE_A|CORE_B], [MATH|INT];
    0xb2 => MulInt2Addr, k12x, [CONTINUE], [DA|UA|UB|CORE_A|CORE_B], [MATH|INT];
    0xb3 => DivInt2Addr, k12x, [CONTINUE|THROW], [DA|UA|UB|CORE_A|CORE_B], [MATH|INT];
    0xb4 => RemInt2Addr, k12x, [CONTINUE|THROW], [DA|UA|UB|CORE_A|CORE_B], [MATH|INT];
    0xb5 => AndInt2Addr, k12x, [CONTINUE], [DA|UA|UB|CORE_A|CORE_B], [MATH|INT];
    0xb6 => OrInt2Addr, k12x, [CONTINUE], [DA|UA|UB|CORE_A|CORE_B], [MATH|INT];
    0xb7 => XorInt2Addr, k12x, [CONTINUE], [DA|UA|UB|CORE_A|CORE_B], [MATH|INT];
    0xb8 => ShlInt2Addr, k12x, [CONTINUE], [DA|UA|UB|CORE_A|CORE_B], [MATH|INT];
    0xb9 => ShrInt2Addr, k12x, [CONTINUE], [DA|UA|UB|CORE_A|CORE_B], [MATH|INT];
    0xba => UshrInt2Addr, k12x, [CONTINUE], [DA|UA|UB|CORE_A|CORE_B], [MATH|INT];
    0xbb => AddLong2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|B_WIDE|CORE_A|CORE_B], [MATH|LONG];
    0xbc => SubLong2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|B_WIDE|CORE_A|CORE_B], [MATH|LONG];
    0xbd => MulLong2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|B_WIDE|CORE_A|CORE_B], [MATH|LONG];
    0xbe => DivLong2Addr, k12x, [CONTINUE|THROW], [DA|A_WIDE|UA|UB|B_WIDE|CORE_A|CORE_B], [MATH|LONG|HEAVYWEIGHT];
    0xbf => RemLong2Addr, k12x, [CONTINUE|THROW], [DA|A_WIDE|UA|UB|B_WIDE|CORE_A|CORE_B], [MATH|LONG|HEAVYWEIGHT];
    0xc0 => AndLong2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|B_WIDE|CORE_A|CORE_B], [MATH|LONG];
    0xc1 => OrLong2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|B_WIDE|CORE_A|CORE_B], [MATH|LONG];
    0xc2 => XorLong2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|B_WIDE|CORE_A|CORE_B], [MATH|LONG];
    0xc3 => ShlLong2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|CORE_A|CORE_B], [MATH|LONG];
    0xc4 => ShrLong2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|CORE_A|CORE_B], [MATH|LONG];
    0xc5 => UshrLong2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|CORE_A|CORE_B], [MATH|LONG];
    0xc6 => AddFloat2Addr, k12x, [CONTINUE], [DA|UA|UB|FP_A|FP_B], [MATH|FP|SINGLE];
    0xc7 => SubFloat2Addr, k12x, [CONTINUE], [DA|UA|UB|FP_A|FP_B], [MATH|FP|SINGLE];
    0xc8 => MulFloat2Addr, k12x, [CONTINUE], [DA|UA|UB|FP_A|FP_B], [MATH|FP|SINGLE];
    0xc9 => DivFloat2Addr, k12x, [CONTINUE], [DA|UA|UB|FP_A|FP_B], [MATH|FP|SINGLE];
    0xca => RemFloat2Addr, k12x, [CONTINUE], [DA|UA|UB|FP_A|FP_B], [MATH|FP|SINGLE|HEAVYWEIGHT];
    0xcb => AddDouble2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|B_WIDE|FP_A|FP_B], [MATH|FP|DOUBLE];
    0xcc => SubDouble2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|B_WIDE|FP_A|FP_B], [MATH|FP|DOUBLE];
    0xcd => MulDouble2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|B_WIDE|FP_A|FP_B], [MATH|FP|DOUBLE];
    0xce => DivDouble2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|B_WIDE|FP_A|FP_B], [MATH|FP|DOUBLE];
    0xcf => RemDouble2Addr, k12x, [CONTINUE], [DA|A_WIDE|UA|UB|B_WIDE|FP_A|FP_B], [MATH|FP|DOUBLE|HEAVYWEIGHT];

    0xd0 => AddIntLit16, k22s, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xd1 => RsubInt, k22s, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xd2 => MulIntLit16, k22s, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xd3 => DivIntLit16, k22s, [CONTINUE|THROW], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xd4 => RemIntLit16, k22s, [CONTINUE|THROW], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xd5 => AndIntLit16, k22s, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xd6 => OrIntLit16, k22s, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xd7 => XorIntLit16, k22s, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xd8 => AddIntLit8, k22b, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xd9 => RsubIntLit8, k22b, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xda => MulIntLit8, k22b, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xdb => DivIntLit8, k22b, [CONTINUE|THROW], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xdc => RemIntLit8, k22b, [CONTINUE|THROW], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xdd => AndIntLit8, k22b, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xde => OrIntLit8, k22b, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xdf => XorIntLit8, k22b, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xe0 => ShlIntLit8, k22b, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xe1 => ShrIntLit8, k22b, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
    0xe2 => UshrIntLit8, k22b, [CONTINUE], [DA|UB|CORE_A|CORE_B], [MATH|INT];
}

impl Opcode {
    /// True for the `invoke-*` family.
    pub fn is_invoke(self) -> bool {
        self.flags().contains(OpFlags::INVOKE)
    }

    /// True when execution never falls through.
    pub fn ends_block(self) -> bool {
        !self.flags().contains(OpFlags::CONTINUE)
    }

    /// Flip the sense of a two-way branch.  Only valid for `if-*` opcodes.
    pub fn negated_if(self) -> Opcode {
        match self {
            Opcode::IfEq => Opcode::IfNe,
            Opcode::IfNe => Opcode::IfEq,
            Opcode::IfLt => Opcode::IfGe,
            Opcode::IfGe => Opcode::IfLt,
            Opcode::IfGt => Opcode::IfLe,
            Opcode::IfLe => Opcode::IfGt,
            Opcode::IfEqz => Opcode::IfNez,
            Opcode::IfNez => Opcode::IfEqz,
            Opcode::IfLtz => Opcode::IfGez,
            Opcode::IfGez => Opcode::IfLtz,
            Opcode::IfGtz => Opcode::IfLez,
            Opcode::IfLez => Opcode::IfGtz,
            other => panic!("negated_if on non-if opcode {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::df;
    use strum::IntoEnumIterator;
    use test_case::test_case;

    #[test]
    fn roundtrip_all_assigned_opcodes() {
        for op in Opcode::iter() {
            assert_eq!(Opcode::from_u8(op as u8), Some(op));
        }
    }

    #[test]
    fn unassigned_slots_are_rejected() {
        for raw in [0x3eu8, 0x43, 0x73, 0x79, 0x7a, 0xe3, 0xff] {
            assert_eq!(Opcode::from_u8(raw), None);
        }
    }

    #[test_case(Opcode::Goto => true)]
    #[test_case(Opcode::ReturnVoid => true)]
    #[test_case(Opcode::Throw => true)]
    #[test_case(Opcode::AddInt => false)]
    #[test_case(Opcode::IfEq => false; "conditional branches fall through")]
    fn ends_block(op: Opcode) -> bool {
        op.ends_block()
    }

    #[test]
    fn aget_checks_array_then_index() {
        let attrs = Opcode::Aget.dataflow_attrs();
        assert!(attrs & df::NULL_CHK_0 != 0);
        assert!(attrs & df::RANGE_CHK_1 != 0);
        let attrs = Opcode::AputWide.dataflow_attrs();
        assert!(attrs & df::NULL_CHK_2 != 0);
        assert!(attrs & df::RANGE_CHK_3 != 0);
    }

    #[test]
    fn wide_ops_mark_both_halves() {
        let attrs = Opcode::AddLong.dataflow_attrs();
        assert!(attrs & df::A_WIDE != 0);
        assert!(attrs & df::B_WIDE != 0);
        assert!(attrs & df::C_WIDE != 0);
        // Long shifts take a narrow shift count.
        assert_eq!(Opcode::ShlLong.dataflow_attrs() & df::C_WIDE, 0);
    }

    #[test]
    fn negated_if_is_involutive() {
        for op in [
            Opcode::IfEq,
            Opcode::IfNe,
            Opcode::IfLt,
            Opcode::IfGe,
            Opcode::IfGt,
            Opcode::IfLe,
            Opcode::IfEqz,
            Opcode::IfNez,
            Opcode::IfLtz,
            Opcode::IfGez,
            Opcode::IfGtz,
            Opcode::IfLez,
        ] {
            assert_eq!(op.negated_if().negated_if(), op);
        }
    }
}
