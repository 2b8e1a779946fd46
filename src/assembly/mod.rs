//! Editable CIL method bodies.
//!
//! This module holds everything needed to edit the code of a single method without breaking
//! it: the opcode table, the arena backed instruction list with stable instruction handles,
//! exception handlers, the stack depth analysis and the normalizer that moves a body between
//! its compact encoding and the expanded editing form.
//!
//! # Key Components
//!
//! - [`OpCode`] - The opcode table with operand kinds, flow and stack effects
//! - [`Instruction`] / [`Operand`] - One instruction of an editable body
//! - [`InstructionList`] / [`InstrId`] - Ordered instructions with identities that survive edits
//! - [`MethodBody`] - Instructions, locals and exception handlers
//! - [`expand`] / [`compact`] - Normalization before and after editing
//! - [`compute_max_stack`] - Stack depth analysis
//!
//! # Examples
//!
//! ```rust
//! use cilpatch::assembly::{compact, expand, Instruction, MethodBody, OpCode};
//! use cilpatch::metadata::{ReferenceTable, TypeSig};
//!
//! let mut body = MethodBody::from_instructions([
//!     Instruction::simple(OpCode::Ldarg1),
//!     Instruction::simple(OpCode::Ret),
//! ]);
//! expand(&mut body)?;
//! assert_eq!(body.instructions.iter().next().map(|(_, i)| i.opcode), Some(OpCode::Ldarg));
//!
//! compact(&mut body, &ReferenceTable::new(), &TypeSig::I4)?;
//! assert_eq!(body.max_stack, 1);
//! # Ok::<(), cilpatch::Error>(())
//! ```

mod body;
mod exceptions;
mod instruction;
mod list;
mod normalize;
mod opcodes;
mod stack;

pub use body::MethodBody;
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use instruction::{Immediate, Instruction, Operand};
pub use list::{InstrId, InstructionList, Iter};
pub use normalize::{compact, compute_offsets, expand};
pub use opcodes::{FlowType, OpCode, OpCodeInfo, OperandKind, StackEffect};
pub use stack::{compute_max_stack, stack_effect};
