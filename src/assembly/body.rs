//! Editable method bodies.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    assembly::{
        exceptions::ExceptionHandler,
        instruction::{Instruction, Operand},
        list::{InstrId, InstructionList},
    },
    metadata::TypeSig,
    Error, Result,
};

/// The code of one method: instructions, locals and exception handlers.
///
/// `max_stack`, `code_size` and the instruction offsets are derived data; they are rebuilt by
/// [`crate::assembly::compact`] after every edit and never maintained by hand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodBody {
    /// The instruction stream
    pub instructions: InstructionList,
    /// Local variable types, indexed by local number
    pub locals: Vec<TypeSig>,
    /// Exception handling clauses
    pub exception_handlers: Vec<ExceptionHandler>,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// Zero-initialize locals on entry
    pub init_locals: bool,
    /// Encoded size of the instruction stream in bytes
    pub code_size: u32,
}

impl MethodBody {
    /// Creates a body from a sequence of instructions without branches.
    #[must_use]
    pub fn from_instructions(instructions: impl IntoIterator<Item = Instruction>) -> Self {
        MethodBody {
            instructions: instructions.into_iter().collect(),
            init_locals: true,
            ..Self::default()
        }
    }

    /// Appends a local variable and returns its index.
    ///
    /// # Errors
    ///
    /// Fails if the method already declares 65535 locals.
    pub fn add_local(&mut self, local_type: TypeSig) -> Result<u16> {
        let index = u16::try_from(self.locals.len())
            .ok()
            .filter(|index| *index < u16::MAX)
            .ok_or_else(|| malformed_error!("Too many locals"))?;
        self.locals.push(local_type);
        Ok(index)
    }

    /// Every instruction referenced by a branch or an exception handler.
    #[must_use]
    pub fn referenced_instructions(&self) -> HashSet<InstrId> {
        let mut referenced: HashSet<InstrId> = self
            .instructions
            .iter()
            .flat_map(|(_, instruction)| instruction.targets())
            .collect();
        for handler in &self.exception_handlers {
            referenced.extend(handler.boundaries());
        }
        referenced
    }

    /// Checks that every branch target and handler boundary is part of the body and that
    /// every local operand names a declared local.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::DanglingReference`] for the first violation.
    pub fn validate(&self) -> Result<()> {
        for (position, (_, instruction)) in self.instructions.iter().enumerate() {
            for target in instruction.targets() {
                if !self.instructions.contains(target) {
                    return Err(Error::DanglingReference(format!(
                        "'{}' at position {position} targets a detached instruction",
                        instruction.opcode
                    )));
                }
            }
            if let Operand::Local(index) = instruction.operand {
                if usize::from(index) >= self.locals.len() {
                    return Err(Error::DanglingReference(format!(
                        "'{}' at position {position} uses undeclared local {index}",
                        instruction.opcode
                    )));
                }
            }
        }

        for (index, handler) in self.exception_handlers.iter().enumerate() {
            if let Some(boundary) = handler
                .boundaries()
                .into_iter()
                .find(|boundary| !self.instructions.contains(*boundary))
            {
                return Err(Error::DanglingReference(format!(
                    "exception handler {index} references detached instruction #{}",
                    boundary.index()
                )));
            }
        }

        Ok(())
    }
}
