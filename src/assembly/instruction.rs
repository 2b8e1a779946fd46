//! Instructions and operands of an editable method body.
//!
//! Unlike a decoded byte stream, branch targets here are [`InstrId`] handles to other
//! instructions of the same [`crate::assembly::InstructionList`], and member operands are
//! [`Token`]s into the owning module's [`crate::metadata::ReferenceTable`]. Offsets are only
//! meaningful after [`crate::assembly::compact`] has laid the body out.

use serde::{Deserialize, Serialize};

use crate::{
    assembly::{
        list::InstrId,
        opcodes::{OpCode, OperandKind},
    },
    metadata::{Token, TypeSig},
    Error, Result,
};

/// Represents an immediate value type embedded in CIL instructions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

/// The operand of an [`Instruction`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant embedded in instruction)
    Immediate(Immediate),
    /// User string literal
    String(String),
    /// Local variable index
    Local(u16),
    /// Method argument index, `this` is argument 0 of instance methods
    Argument(u16),
    /// Member or metadata token reference
    Token(Token),
    /// Type operand
    Type(TypeSig),
    /// Branch target
    Target(InstrId),
    /// Switch jump table
    Switch(Vec<InstrId>),
}

impl Operand {
    /// Human readable name of the operand kind, used in error messages.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Operand::None => "no operand",
            Operand::Immediate(_) => "immediate",
            Operand::String(_) => "string",
            Operand::Local(_) => "local",
            Operand::Argument(_) => "argument",
            Operand::Token(_) => "token",
            Operand::Type(_) => "type",
            Operand::Target(_) => "branch target",
            Operand::Switch(_) => "switch table",
        }
    }
}

/// A single instruction of a method body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The operand, whose variant must agree with [`OpCode::operand_kind`]
    pub operand: Operand,
    /// Byte offset inside the body, valid after layout
    #[serde(default)]
    pub offset: u32,
}

impl Instruction {
    /// Creates an instruction.
    #[must_use]
    pub fn new(opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            opcode,
            operand,
            offset: 0,
        }
    }

    /// Creates an instruction without operand.
    #[must_use]
    pub fn simple(opcode: OpCode) -> Self {
        Self::new(opcode, Operand::None)
    }

    /// `ldstr value`
    pub fn ldstr(value: impl Into<String>) -> Self {
        Self::new(OpCode::Ldstr, Operand::String(value.into()))
    }

    /// `call method`
    #[must_use]
    pub fn call(method: Token) -> Self {
        Self::new(OpCode::Call, Operand::Token(method))
    }

    /// `callvirt method`
    #[must_use]
    pub fn callvirt(method: Token) -> Self {
        Self::new(OpCode::Callvirt, Operand::Token(method))
    }

    /// `ldarg index`
    #[must_use]
    pub fn ldarg(index: u16) -> Self {
        Self::new(OpCode::Ldarg, Operand::Argument(index))
    }

    /// `ldloc index`
    #[must_use]
    pub fn ldloc(index: u16) -> Self {
        Self::new(OpCode::Ldloc, Operand::Local(index))
    }

    /// `ldloca index`
    #[must_use]
    pub fn ldloca(index: u16) -> Self {
        Self::new(OpCode::Ldloca, Operand::Local(index))
    }

    /// `stloc index`
    #[must_use]
    pub fn stloc(index: u16) -> Self {
        Self::new(OpCode::Stloc, Operand::Local(index))
    }

    /// `ldc.i4 value`
    #[must_use]
    pub fn ldc_i4(value: i32) -> Self {
        Self::new(OpCode::LdcI4, Operand::Immediate(Immediate::Int32(value)))
    }

    /// A branch of kind `opcode` to `target`.
    #[must_use]
    pub fn branch(opcode: OpCode, target: InstrId) -> Self {
        Self::new(opcode, Operand::Target(target))
    }

    /// The member token operand, if any.
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }

    /// The string literal operand, if any.
    #[must_use]
    pub fn string(&self) -> Option<&str> {
        match &self.operand {
            Operand::String(value) => Some(value),
            _ => None,
        }
    }

    /// Every instruction this instruction may jump to.
    #[must_use]
    pub fn targets(&self) -> Vec<InstrId> {
        match &self.operand {
            Operand::Target(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Encoded size of the instruction in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        let operand = match (&self.operand, self.opcode.operand_kind().size()) {
            (Operand::Switch(targets), None) => {
                #[allow(clippy::cast_possible_truncation)]
                let count = targets.len() as u32;
                4 + 4 * count
            }
            (_, Some(size)) => size,
            (_, None) => 4,
        };
        self.opcode.size() + operand
    }

    /// Checks that the operand variant agrees with the opcode.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidOperand`] on a mismatch, including local and argument
    /// indices that do not fit the one byte encoding of the short forms.
    pub fn check_operand(&self) -> Result<()> {
        let expected = self.opcode.operand_kind();
        let valid = match (expected, &self.operand) {
            (OperandKind::None, Operand::None)
            | (OperandKind::Int8, Operand::Immediate(Immediate::Int8(_)))
            | (OperandKind::Int32, Operand::Immediate(Immediate::Int32(_)))
            | (OperandKind::Int64, Operand::Immediate(Immediate::Int64(_)))
            | (OperandKind::Float32, Operand::Immediate(Immediate::Float32(_)))
            | (OperandKind::Float64, Operand::Immediate(Immediate::Float64(_)))
            | (OperandKind::String, Operand::String(_))
            | (OperandKind::Local, Operand::Local(_))
            | (OperandKind::Argument, Operand::Argument(_))
            | (OperandKind::Method | OperandKind::Field, Operand::Token(_))
            | (OperandKind::Type | OperandKind::Token, Operand::Type(_) | Operand::Token(_))
            | (OperandKind::Signature, Operand::Token(_))
            | (OperandKind::ShortBranch | OperandKind::Branch, Operand::Target(_))
            | (OperandKind::Switch, Operand::Switch(_)) => true,
            (OperandKind::ShortLocal, Operand::Local(index))
            | (OperandKind::ShortArgument, Operand::Argument(index)) => *index <= 0xFF,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(Error::InvalidOperand {
                mnemonic: self.opcode.mnemonic(),
                expected: expected_name(expected),
            })
        }
    }
}

fn expected_name(kind: OperandKind) -> &'static str {
    match kind {
        OperandKind::None => "no operand",
        OperandKind::Int8 => "int8 immediate",
        OperandKind::Int32 => "int32 immediate",
        OperandKind::Int64 => "int64 immediate",
        OperandKind::Float32 => "float32 immediate",
        OperandKind::Float64 => "float64 immediate",
        OperandKind::String => "string",
        OperandKind::ShortLocal => "local index below 256",
        OperandKind::Local => "local index",
        OperandKind::ShortArgument => "argument index below 256",
        OperandKind::Argument => "argument index",
        OperandKind::Method => "method token",
        OperandKind::Field => "field token",
        OperandKind::Type | OperandKind::Token => "type or token",
        OperandKind::Signature => "signature token",
        OperandKind::ShortBranch | OperandKind::Branch => "branch target",
        OperandKind::Switch => "switch table",
    }
}
