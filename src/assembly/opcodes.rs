//! The CIL opcode table (ECMA-335 Partition III).
//!
//! Every opcode the rewriter understands is a variant of [`OpCode`]. The table attached to each
//! variant carries the mnemonic, encoding, operand kind, control flow behavior and stack effect,
//! which is everything the normalizer and the stack analysis need. Opcodes that are valid CIL
//! but absent from this table (the `conv.ovf.*` family, `mkrefany`, `ckfinite`, ...) can not be
//! represented in a [`crate::assembly::MethodBody`] at all.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

/// The kind of operand an opcode carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    None,
    /// Signed 8-bit immediate (`ldc.i4.s`)
    Int8,
    /// Signed 32-bit immediate
    Int32,
    /// Signed 64-bit immediate
    Int64,
    /// 32-bit float immediate
    Float32,
    /// 64-bit float immediate
    Float64,
    /// User string
    String,
    /// Local variable index encoded in one byte
    ShortLocal,
    /// Local variable index encoded in two bytes
    Local,
    /// Argument index encoded in one byte
    ShortArgument,
    /// Argument index encoded in two bytes
    Argument,
    /// Method reference token
    Method,
    /// Field reference token
    Field,
    /// Type reference
    Type,
    /// Any metadata token (`ldtoken`)
    Token,
    /// Stand-alone signature (`calli`)
    Signature,
    /// Branch target with a one byte displacement
    ShortBranch,
    /// Branch target with a four byte displacement
    Branch,
    /// Jump table
    Switch,
}

impl OperandKind {
    /// Encoded size in bytes, or `None` for the variable sized switch table.
    #[must_use]
    pub const fn size(&self) -> Option<u32> {
        match self {
            OperandKind::None => Some(0),
            OperandKind::Int8
            | OperandKind::ShortLocal
            | OperandKind::ShortArgument
            | OperandKind::ShortBranch => Some(1),
            OperandKind::Local | OperandKind::Argument => Some(2),
            OperandKind::Int32
            | OperandKind::Float32
            | OperandKind::String
            | OperandKind::Method
            | OperandKind::Field
            | OperandKind::Type
            | OperandKind::Token
            | OperandKind::Signature
            | OperandKind::Branch => Some(4),
            OperandKind::Int64 | OperandKind::Float64 => Some(8),
            OperandKind::Switch => None,
        }
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Conditional branch to another location
    ConditionalBranch,
    /// Always branches to another location (unconditional jump)
    UnconditionalBranch,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Multi-way branch (switch statement)
    Switch,
    /// Exception throwing
    Throw,
    /// End of finally, fault or filter block
    EndFinally,
    /// Leave protected region (try/catch/finally)
    Leave,
}

/// Stack effect of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackEffect {
    /// Pops and pushes a fixed number of values
    Fixed {
        /// Number of items popped from stack
        pops: u8,
        /// Number of items pushed to stack
        pushes: u8,
    },
    /// Depends on the called method's signature
    Call,
    /// Pops the constructor arguments and pushes the new object
    NewObj,
    /// Pops the return value of the current method, if any
    Return,
    /// Not modeled (`calli`, `jmp`)
    Unsupported,
}

const fn fixed(pops: u8, pushes: u8) -> StackEffect {
    StackEffect::Fixed { pops, pushes }
}

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCodeInfo {
    /// Mnemonic as printed by ildasm
    pub mnemonic: &'static str,
    /// Encoded value, `0xFExx` for two byte opcodes
    pub value: u16,
    /// Operand carried by the instruction
    pub operand: OperandKind,
    /// Control flow behavior
    pub flow: FlowType,
    /// Stack behavior
    pub stack: StackEffect,
}

const fn op(
    mnemonic: &'static str,
    value: u16,
    operand: OperandKind,
    flow: FlowType,
    stack: StackEffect,
) -> OpCodeInfo {
    OpCodeInfo {
        mnemonic,
        value,
        operand,
        flow,
        stack,
    }
}

/// A CIL opcode.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Serialize, Deserialize)]
pub enum OpCode {
    Nop,
    Break,
    Ldarg0,
    Ldarg1,
    Ldarg2,
    Ldarg3,
    Ldloc0,
    Ldloc1,
    Ldloc2,
    Ldloc3,
    Stloc0,
    Stloc1,
    Stloc2,
    Stloc3,
    LdargS,
    LdargaS,
    StargS,
    LdlocS,
    LdlocaS,
    StlocS,
    Ldnull,
    LdcI4M1,
    LdcI40,
    LdcI41,
    LdcI42,
    LdcI43,
    LdcI44,
    LdcI45,
    LdcI46,
    LdcI47,
    LdcI48,
    LdcI4S,
    LdcI4,
    LdcI8,
    LdcR4,
    LdcR8,
    Dup,
    Pop,
    Jmp,
    Call,
    Calli,
    Ret,
    BrS,
    BrfalseS,
    BrtrueS,
    BeqS,
    BgeS,
    BgtS,
    BleS,
    BltS,
    BneUnS,
    BgeUnS,
    BgtUnS,
    BleUnS,
    BltUnS,
    Br,
    Brfalse,
    Brtrue,
    Beq,
    Bge,
    Bgt,
    Ble,
    Blt,
    BneUn,
    BgeUn,
    BgtUn,
    BleUn,
    BltUn,
    Switch,
    LdindI1,
    LdindU1,
    LdindI2,
    LdindU2,
    LdindI4,
    LdindU4,
    LdindI8,
    LdindI,
    LdindR4,
    LdindR8,
    LdindRef,
    StindRef,
    StindI1,
    StindI2,
    StindI4,
    StindI8,
    StindR4,
    StindR8,
    Add,
    Sub,
    Mul,
    Div,
    DivUn,
    Rem,
    RemUn,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    ShrUn,
    Neg,
    Not,
    ConvI1,
    ConvI2,
    ConvI4,
    ConvI8,
    ConvR4,
    ConvR8,
    ConvU4,
    ConvU8,
    Callvirt,
    Cpobj,
    Ldobj,
    Ldstr,
    Newobj,
    Castclass,
    Isinst,
    ConvRUn,
    Unbox,
    Throw,
    Ldfld,
    Ldflda,
    Stfld,
    Ldsfld,
    Ldsflda,
    Stsfld,
    Stobj,
    Box,
    Newarr,
    Ldlen,
    Ldelema,
    LdelemI1,
    LdelemU1,
    LdelemI2,
    LdelemU2,
    LdelemI4,
    LdelemU4,
    LdelemI8,
    LdelemI,
    LdelemR4,
    LdelemR8,
    LdelemRef,
    StelemI,
    StelemI1,
    StelemI2,
    StelemI4,
    StelemI8,
    StelemR4,
    StelemR8,
    StelemRef,
    Ldelem,
    Stelem,
    UnboxAny,
    Ldtoken,
    ConvU2,
    ConvU1,
    ConvI,
    Endfinally,
    Leave,
    LeaveS,
    StindI,
    ConvU,
    Arglist,
    Ceq,
    Cgt,
    CgtUn,
    Clt,
    CltUn,
    Ldftn,
    Ldvirtftn,
    Ldarg,
    Ldarga,
    Starg,
    Ldloc,
    Ldloca,
    Stloc,
    Localloc,
    Endfilter,
    Initobj,
    Rethrow,
    Sizeof,
}

impl OpCode {
    /// Returns the static description of this opcode.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub const fn info(self) -> OpCodeInfo {
        use FlowType::{
            Call as C, ConditionalBranch as CB, EndFinally as EF, Leave as L, Return as R,
            Sequential as S, Switch as SW, Throw as T, UnconditionalBranch as UB,
        };
        use OperandKind as K;

        match self {
            OpCode::Nop => op("nop", 0x00, K::None, S, fixed(0, 0)),
            OpCode::Break => op("break", 0x01, K::None, S, fixed(0, 0)),
            OpCode::Ldarg0 => op("ldarg.0", 0x02, K::None, S, fixed(0, 1)),
            OpCode::Ldarg1 => op("ldarg.1", 0x03, K::None, S, fixed(0, 1)),
            OpCode::Ldarg2 => op("ldarg.2", 0x04, K::None, S, fixed(0, 1)),
            OpCode::Ldarg3 => op("ldarg.3", 0x05, K::None, S, fixed(0, 1)),
            OpCode::Ldloc0 => op("ldloc.0", 0x06, K::None, S, fixed(0, 1)),
            OpCode::Ldloc1 => op("ldloc.1", 0x07, K::None, S, fixed(0, 1)),
            OpCode::Ldloc2 => op("ldloc.2", 0x08, K::None, S, fixed(0, 1)),
            OpCode::Ldloc3 => op("ldloc.3", 0x09, K::None, S, fixed(0, 1)),
            OpCode::Stloc0 => op("stloc.0", 0x0A, K::None, S, fixed(1, 0)),
            OpCode::Stloc1 => op("stloc.1", 0x0B, K::None, S, fixed(1, 0)),
            OpCode::Stloc2 => op("stloc.2", 0x0C, K::None, S, fixed(1, 0)),
            OpCode::Stloc3 => op("stloc.3", 0x0D, K::None, S, fixed(1, 0)),
            OpCode::LdargS => op("ldarg.s", 0x0E, K::ShortArgument, S, fixed(0, 1)),
            OpCode::LdargaS => op("ldarga.s", 0x0F, K::ShortArgument, S, fixed(0, 1)),
            OpCode::StargS => op("starg.s", 0x10, K::ShortArgument, S, fixed(1, 0)),
            OpCode::LdlocS => op("ldloc.s", 0x11, K::ShortLocal, S, fixed(0, 1)),
            OpCode::LdlocaS => op("ldloca.s", 0x12, K::ShortLocal, S, fixed(0, 1)),
            OpCode::StlocS => op("stloc.s", 0x13, K::ShortLocal, S, fixed(1, 0)),
            OpCode::Ldnull => op("ldnull", 0x14, K::None, S, fixed(0, 1)),
            OpCode::LdcI4M1 => op("ldc.i4.m1", 0x15, K::None, S, fixed(0, 1)),
            OpCode::LdcI40 => op("ldc.i4.0", 0x16, K::None, S, fixed(0, 1)),
            OpCode::LdcI41 => op("ldc.i4.1", 0x17, K::None, S, fixed(0, 1)),
            OpCode::LdcI42 => op("ldc.i4.2", 0x18, K::None, S, fixed(0, 1)),
            OpCode::LdcI43 => op("ldc.i4.3", 0x19, K::None, S, fixed(0, 1)),
            OpCode::LdcI44 => op("ldc.i4.4", 0x1A, K::None, S, fixed(0, 1)),
            OpCode::LdcI45 => op("ldc.i4.5", 0x1B, K::None, S, fixed(0, 1)),
            OpCode::LdcI46 => op("ldc.i4.6", 0x1C, K::None, S, fixed(0, 1)),
            OpCode::LdcI47 => op("ldc.i4.7", 0x1D, K::None, S, fixed(0, 1)),
            OpCode::LdcI48 => op("ldc.i4.8", 0x1E, K::None, S, fixed(0, 1)),
            OpCode::LdcI4S => op("ldc.i4.s", 0x1F, K::Int8, S, fixed(0, 1)),
            OpCode::LdcI4 => op("ldc.i4", 0x20, K::Int32, S, fixed(0, 1)),
            OpCode::LdcI8 => op("ldc.i8", 0x21, K::Int64, S, fixed(0, 1)),
            OpCode::LdcR4 => op("ldc.r4", 0x22, K::Float32, S, fixed(0, 1)),
            OpCode::LdcR8 => op("ldc.r8", 0x23, K::Float64, S, fixed(0, 1)),
            OpCode::Dup => op("dup", 0x25, K::None, S, fixed(1, 2)),
            OpCode::Pop => op("pop", 0x26, K::None, S, fixed(1, 0)),
            OpCode::Jmp => op("jmp", 0x27, K::Method, C, StackEffect::Unsupported),
            OpCode::Call => op("call", 0x28, K::Method, C, StackEffect::Call),
            OpCode::Calli => op("calli", 0x29, K::Signature, C, StackEffect::Unsupported),
            OpCode::Ret => op("ret", 0x2A, K::None, R, StackEffect::Return),
            OpCode::BrS => op("br.s", 0x2B, K::ShortBranch, UB, fixed(0, 0)),
            OpCode::BrfalseS => op("brfalse.s", 0x2C, K::ShortBranch, CB, fixed(1, 0)),
            OpCode::BrtrueS => op("brtrue.s", 0x2D, K::ShortBranch, CB, fixed(1, 0)),
            OpCode::BeqS => op("beq.s", 0x2E, K::ShortBranch, CB, fixed(2, 0)),
            OpCode::BgeS => op("bge.s", 0x2F, K::ShortBranch, CB, fixed(2, 0)),
            OpCode::BgtS => op("bgt.s", 0x30, K::ShortBranch, CB, fixed(2, 0)),
            OpCode::BleS => op("ble.s", 0x31, K::ShortBranch, CB, fixed(2, 0)),
            OpCode::BltS => op("blt.s", 0x32, K::ShortBranch, CB, fixed(2, 0)),
            OpCode::BneUnS => op("bne.un.s", 0x33, K::ShortBranch, CB, fixed(2, 0)),
            OpCode::BgeUnS => op("bge.un.s", 0x34, K::ShortBranch, CB, fixed(2, 0)),
            OpCode::BgtUnS => op("bgt.un.s", 0x35, K::ShortBranch, CB, fixed(2, 0)),
            OpCode::BleUnS => op("ble.un.s", 0x36, K::ShortBranch, CB, fixed(2, 0)),
            OpCode::BltUnS => op("blt.un.s", 0x37, K::ShortBranch, CB, fixed(2, 0)),
            OpCode::Br => op("br", 0x38, K::Branch, UB, fixed(0, 0)),
            OpCode::Brfalse => op("brfalse", 0x39, K::Branch, CB, fixed(1, 0)),
            OpCode::Brtrue => op("brtrue", 0x3A, K::Branch, CB, fixed(1, 0)),
            OpCode::Beq => op("beq", 0x3B, K::Branch, CB, fixed(2, 0)),
            OpCode::Bge => op("bge", 0x3C, K::Branch, CB, fixed(2, 0)),
            OpCode::Bgt => op("bgt", 0x3D, K::Branch, CB, fixed(2, 0)),
            OpCode::Ble => op("ble", 0x3E, K::Branch, CB, fixed(2, 0)),
            OpCode::Blt => op("blt", 0x3F, K::Branch, CB, fixed(2, 0)),
            OpCode::BneUn => op("bne.un", 0x40, K::Branch, CB, fixed(2, 0)),
            OpCode::BgeUn => op("bge.un", 0x41, K::Branch, CB, fixed(2, 0)),
            OpCode::BgtUn => op("bgt.un", 0x42, K::Branch, CB, fixed(2, 0)),
            OpCode::BleUn => op("ble.un", 0x43, K::Branch, CB, fixed(2, 0)),
            OpCode::BltUn => op("blt.un", 0x44, K::Branch, CB, fixed(2, 0)),
            OpCode::Switch => op("switch", 0x45, K::Switch, SW, fixed(1, 0)),
            OpCode::LdindI1 => op("ldind.i1", 0x46, K::None, S, fixed(1, 1)),
            OpCode::LdindU1 => op("ldind.u1", 0x47, K::None, S, fixed(1, 1)),
            OpCode::LdindI2 => op("ldind.i2", 0x48, K::None, S, fixed(1, 1)),
            OpCode::LdindU2 => op("ldind.u2", 0x49, K::None, S, fixed(1, 1)),
            OpCode::LdindI4 => op("ldind.i4", 0x4A, K::None, S, fixed(1, 1)),
            OpCode::LdindU4 => op("ldind.u4", 0x4B, K::None, S, fixed(1, 1)),
            OpCode::LdindI8 => op("ldind.i8", 0x4C, K::None, S, fixed(1, 1)),
            OpCode::LdindI => op("ldind.i", 0x4D, K::None, S, fixed(1, 1)),
            OpCode::LdindR4 => op("ldind.r4", 0x4E, K::None, S, fixed(1, 1)),
            OpCode::LdindR8 => op("ldind.r8", 0x4F, K::None, S, fixed(1, 1)),
            OpCode::LdindRef => op("ldind.ref", 0x50, K::None, S, fixed(1, 1)),
            OpCode::StindRef => op("stind.ref", 0x51, K::None, S, fixed(2, 0)),
            OpCode::StindI1 => op("stind.i1", 0x52, K::None, S, fixed(2, 0)),
            OpCode::StindI2 => op("stind.i2", 0x53, K::None, S, fixed(2, 0)),
            OpCode::StindI4 => op("stind.i4", 0x54, K::None, S, fixed(2, 0)),
            OpCode::StindI8 => op("stind.i8", 0x55, K::None, S, fixed(2, 0)),
            OpCode::StindR4 => op("stind.r4", 0x56, K::None, S, fixed(2, 0)),
            OpCode::StindR8 => op("stind.r8", 0x57, K::None, S, fixed(2, 0)),
            OpCode::Add => op("add", 0x58, K::None, S, fixed(2, 1)),
            OpCode::Sub => op("sub", 0x59, K::None, S, fixed(2, 1)),
            OpCode::Mul => op("mul", 0x5A, K::None, S, fixed(2, 1)),
            OpCode::Div => op("div", 0x5B, K::None, S, fixed(2, 1)),
            OpCode::DivUn => op("div.un", 0x5C, K::None, S, fixed(2, 1)),
            OpCode::Rem => op("rem", 0x5D, K::None, S, fixed(2, 1)),
            OpCode::RemUn => op("rem.un", 0x5E, K::None, S, fixed(2, 1)),
            OpCode::And => op("and", 0x5F, K::None, S, fixed(2, 1)),
            OpCode::Or => op("or", 0x60, K::None, S, fixed(2, 1)),
            OpCode::Xor => op("xor", 0x61, K::None, S, fixed(2, 1)),
            OpCode::Shl => op("shl", 0x62, K::None, S, fixed(2, 1)),
            OpCode::Shr => op("shr", 0x63, K::None, S, fixed(2, 1)),
            OpCode::ShrUn => op("shr.un", 0x64, K::None, S, fixed(2, 1)),
            OpCode::Neg => op("neg", 0x65, K::None, S, fixed(1, 1)),
            OpCode::Not => op("not", 0x66, K::None, S, fixed(1, 1)),
            OpCode::ConvI1 => op("conv.i1", 0x67, K::None, S, fixed(1, 1)),
            OpCode::ConvI2 => op("conv.i2", 0x68, K::None, S, fixed(1, 1)),
            OpCode::ConvI4 => op("conv.i4", 0x69, K::None, S, fixed(1, 1)),
            OpCode::ConvI8 => op("conv.i8", 0x6A, K::None, S, fixed(1, 1)),
            OpCode::ConvR4 => op("conv.r4", 0x6B, K::None, S, fixed(1, 1)),
            OpCode::ConvR8 => op("conv.r8", 0x6C, K::None, S, fixed(1, 1)),
            OpCode::ConvU4 => op("conv.u4", 0x6D, K::None, S, fixed(1, 1)),
            OpCode::ConvU8 => op("conv.u8", 0x6E, K::None, S, fixed(1, 1)),
            OpCode::Callvirt => op("callvirt", 0x6F, K::Method, C, StackEffect::Call),
            OpCode::Cpobj => op("cpobj", 0x70, K::Type, S, fixed(2, 0)),
            OpCode::Ldobj => op("ldobj", 0x71, K::Type, S, fixed(1, 1)),
            OpCode::Ldstr => op("ldstr", 0x72, K::String, S, fixed(0, 1)),
            OpCode::Newobj => op("newobj", 0x73, K::Method, C, StackEffect::NewObj),
            OpCode::Castclass => op("castclass", 0x74, K::Type, S, fixed(1, 1)),
            OpCode::Isinst => op("isinst", 0x75, K::Type, S, fixed(1, 1)),
            OpCode::ConvRUn => op("conv.r.un", 0x76, K::None, S, fixed(1, 1)),
            OpCode::Unbox => op("unbox", 0x79, K::Type, S, fixed(1, 1)),
            OpCode::Throw => op("throw", 0x7A, K::None, T, fixed(1, 0)),
            OpCode::Ldfld => op("ldfld", 0x7B, K::Field, S, fixed(1, 1)),
            OpCode::Ldflda => op("ldflda", 0x7C, K::Field, S, fixed(1, 1)),
            OpCode::Stfld => op("stfld", 0x7D, K::Field, S, fixed(2, 0)),
            OpCode::Ldsfld => op("ldsfld", 0x7E, K::Field, S, fixed(0, 1)),
            OpCode::Ldsflda => op("ldsflda", 0x7F, K::Field, S, fixed(0, 1)),
            OpCode::Stsfld => op("stsfld", 0x80, K::Field, S, fixed(1, 0)),
            OpCode::Stobj => op("stobj", 0x81, K::Type, S, fixed(2, 0)),
            OpCode::Box => op("box", 0x8C, K::Type, S, fixed(1, 1)),
            OpCode::Newarr => op("newarr", 0x8D, K::Type, S, fixed(1, 1)),
            OpCode::Ldlen => op("ldlen", 0x8E, K::None, S, fixed(1, 1)),
            OpCode::Ldelema => op("ldelema", 0x8F, K::Type, S, fixed(2, 1)),
            OpCode::LdelemI1 => op("ldelem.i1", 0x90, K::None, S, fixed(2, 1)),
            OpCode::LdelemU1 => op("ldelem.u1", 0x91, K::None, S, fixed(2, 1)),
            OpCode::LdelemI2 => op("ldelem.i2", 0x92, K::None, S, fixed(2, 1)),
            OpCode::LdelemU2 => op("ldelem.u2", 0x93, K::None, S, fixed(2, 1)),
            OpCode::LdelemI4 => op("ldelem.i4", 0x94, K::None, S, fixed(2, 1)),
            OpCode::LdelemU4 => op("ldelem.u4", 0x95, K::None, S, fixed(2, 1)),
            OpCode::LdelemI8 => op("ldelem.i8", 0x96, K::None, S, fixed(2, 1)),
            OpCode::LdelemI => op("ldelem.i", 0x97, K::None, S, fixed(2, 1)),
            OpCode::LdelemR4 => op("ldelem.r4", 0x98, K::None, S, fixed(2, 1)),
            OpCode::LdelemR8 => op("ldelem.r8", 0x99, K::None, S, fixed(2, 1)),
            OpCode::LdelemRef => op("ldelem.ref", 0x9A, K::None, S, fixed(2, 1)),
            OpCode::StelemI => op("stelem.i", 0x9B, K::None, S, fixed(3, 0)),
            OpCode::StelemI1 => op("stelem.i1", 0x9C, K::None, S, fixed(3, 0)),
            OpCode::StelemI2 => op("stelem.i2", 0x9D, K::None, S, fixed(3, 0)),
            OpCode::StelemI4 => op("stelem.i4", 0x9E, K::None, S, fixed(3, 0)),
            OpCode::StelemI8 => op("stelem.i8", 0x9F, K::None, S, fixed(3, 0)),
            OpCode::StelemR4 => op("stelem.r4", 0xA0, K::None, S, fixed(3, 0)),
            OpCode::StelemR8 => op("stelem.r8", 0xA1, K::None, S, fixed(3, 0)),
            OpCode::StelemRef => op("stelem.ref", 0xA2, K::None, S, fixed(3, 0)),
            OpCode::Ldelem => op("ldelem", 0xA3, K::Type, S, fixed(2, 1)),
            OpCode::Stelem => op("stelem", 0xA4, K::Type, S, fixed(3, 0)),
            OpCode::UnboxAny => op("unbox.any", 0xA5, K::Type, S, fixed(1, 1)),
            OpCode::Ldtoken => op("ldtoken", 0xD0, K::Token, S, fixed(0, 1)),
            OpCode::ConvU2 => op("conv.u2", 0xD1, K::None, S, fixed(1, 1)),
            OpCode::ConvU1 => op("conv.u1", 0xD2, K::None, S, fixed(1, 1)),
            OpCode::ConvI => op("conv.i", 0xD3, K::None, S, fixed(1, 1)),
            OpCode::Endfinally => op("endfinally", 0xDC, K::None, EF, fixed(0, 0)),
            OpCode::Leave => op("leave", 0xDD, K::Branch, L, fixed(0, 0)),
            OpCode::LeaveS => op("leave.s", 0xDE, K::ShortBranch, L, fixed(0, 0)),
            OpCode::StindI => op("stind.i", 0xDF, K::None, S, fixed(2, 0)),
            OpCode::ConvU => op("conv.u", 0xE0, K::None, S, fixed(1, 1)),
            OpCode::Arglist => op("arglist", 0xFE00, K::None, S, fixed(0, 1)),
            OpCode::Ceq => op("ceq", 0xFE01, K::None, S, fixed(2, 1)),
            OpCode::Cgt => op("cgt", 0xFE02, K::None, S, fixed(2, 1)),
            OpCode::CgtUn => op("cgt.un", 0xFE03, K::None, S, fixed(2, 1)),
            OpCode::Clt => op("clt", 0xFE04, K::None, S, fixed(2, 1)),
            OpCode::CltUn => op("clt.un", 0xFE05, K::None, S, fixed(2, 1)),
            OpCode::Ldftn => op("ldftn", 0xFE06, K::Method, S, fixed(0, 1)),
            OpCode::Ldvirtftn => op("ldvirtftn", 0xFE07, K::Method, S, fixed(1, 1)),
            OpCode::Ldarg => op("ldarg", 0xFE09, K::Argument, S, fixed(0, 1)),
            OpCode::Ldarga => op("ldarga", 0xFE0A, K::Argument, S, fixed(0, 1)),
            OpCode::Starg => op("starg", 0xFE0B, K::Argument, S, fixed(1, 0)),
            OpCode::Ldloc => op("ldloc", 0xFE0C, K::Local, S, fixed(0, 1)),
            OpCode::Ldloca => op("ldloca", 0xFE0D, K::Local, S, fixed(0, 1)),
            OpCode::Stloc => op("stloc", 0xFE0E, K::Local, S, fixed(1, 0)),
            OpCode::Localloc => op("localloc", 0xFE0F, K::None, S, fixed(1, 1)),
            OpCode::Endfilter => op("endfilter", 0xFE11, K::None, EF, fixed(1, 0)),
            OpCode::Initobj => op("initobj", 0xFE15, K::Type, S, fixed(1, 0)),
            OpCode::Rethrow => op("rethrow", 0xFE1A, K::None, T, fixed(0, 0)),
            OpCode::Sizeof => op("sizeof", 0xFE1C, K::Type, S, fixed(0, 1)),
        }
    }

    /// The ildasm mnemonic, e.g. `ldc.i4.s`.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        self.info().mnemonic
    }

    /// The kind of operand this opcode carries.
    #[must_use]
    pub const fn operand_kind(self) -> OperandKind {
        self.info().operand
    }

    /// Control flow behavior.
    #[must_use]
    pub const fn flow(self) -> FlowType {
        self.info().flow
    }

    /// Encoded size of the opcode itself (1 or 2 bytes).
    #[must_use]
    pub const fn size(self) -> u32 {
        if self.info().value > 0xFF {
            2
        } else {
            1
        }
    }

    /// Looks up an opcode by mnemonic.
    #[must_use]
    pub fn from_mnemonic(mnemonic: &str) -> Option<OpCode> {
        OpCode::iter().find(|opcode| opcode.mnemonic() == mnemonic)
    }

    /// Looks up an opcode by encoded value (`0xFExx` for two byte opcodes).
    #[must_use]
    pub fn from_value(value: u16) -> Option<OpCode> {
        OpCode::iter().find(|opcode| opcode.info().value == value)
    }

    /// Returns `true` for every opcode that transfers control to an explicit target.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(
            self.info().flow,
            FlowType::ConditionalBranch
                | FlowType::UnconditionalBranch
                | FlowType::Switch
                | FlowType::Leave
        )
    }

    /// Returns `true` for `call` and `callvirt`.
    #[must_use]
    pub const fn is_call(self) -> bool {
        matches!(self, OpCode::Call | OpCode::Callvirt)
    }

    /// The long form of a short branch.
    #[must_use]
    pub const fn long_branch(self) -> Option<OpCode> {
        Some(match self {
            OpCode::BrS => OpCode::Br,
            OpCode::BrfalseS => OpCode::Brfalse,
            OpCode::BrtrueS => OpCode::Brtrue,
            OpCode::BeqS => OpCode::Beq,
            OpCode::BgeS => OpCode::Bge,
            OpCode::BgtS => OpCode::Bgt,
            OpCode::BleS => OpCode::Ble,
            OpCode::BltS => OpCode::Blt,
            OpCode::BneUnS => OpCode::BneUn,
            OpCode::BgeUnS => OpCode::BgeUn,
            OpCode::BgtUnS => OpCode::BgtUn,
            OpCode::BleUnS => OpCode::BleUn,
            OpCode::BltUnS => OpCode::BltUn,
            OpCode::LeaveS => OpCode::Leave,
            _ => return None,
        })
    }

    /// The short form of a long branch.
    #[must_use]
    pub const fn short_branch(self) -> Option<OpCode> {
        Some(match self {
            OpCode::Br => OpCode::BrS,
            OpCode::Brfalse => OpCode::BrfalseS,
            OpCode::Brtrue => OpCode::BrtrueS,
            OpCode::Beq => OpCode::BeqS,
            OpCode::Bge => OpCode::BgeS,
            OpCode::Bgt => OpCode::BgtS,
            OpCode::Ble => OpCode::BleS,
            OpCode::Blt => OpCode::BltS,
            OpCode::BneUn => OpCode::BneUnS,
            OpCode::BgeUn => OpCode::BgeUnS,
            OpCode::BgtUn => OpCode::BgtUnS,
            OpCode::BleUn => OpCode::BleUnS,
            OpCode::BltUn => OpCode::BltUnS,
            OpCode::Leave => OpCode::LeaveS,
            _ => return None,
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
