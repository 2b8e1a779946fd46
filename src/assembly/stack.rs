//! Evaluation stack depth analysis.
//!
//! Walks every reachable instruction once, propagating the stack depth along control flow
//! edges. The depth on entry to an instruction must be the same on every path reaching it; a
//! conflict, an underflow or control running off the end of the body is reported as an error
//! so a miscompiled body is never written back.

use std::collections::HashMap;

use crate::{
    assembly::{
        body::MethodBody,
        instruction::Instruction,
        list::InstrId,
        opcodes::{FlowType, StackEffect},
    },
    metadata::{MethodRef, ReferenceTable, TypeSig},
    Error, Result,
};

/// Number of values popped and pushed by `instruction`.
///
/// `return_type` is the return type of the method owning the instruction, which decides what
/// `ret` pops.
///
/// # Errors
///
/// Returns [`crate::Error::UnsupportedInstruction`] for opcodes whose stack effect is not
/// modeled and [`crate::Error::InvalidOperand`] for calls through tokens that are missing from
/// `references`.
pub fn stack_effect(
    instruction: &Instruction,
    references: &ReferenceTable,
    return_type: &TypeSig,
) -> Result<(u32, u32)> {
    match instruction.opcode.info().stack {
        StackEffect::Fixed { pops, pushes } => Ok((u32::from(pops), u32::from(pushes))),
        StackEffect::Call => {
            let method = called_method(instruction, references)?;
            let pops = u32::try_from(method.pops())
                .map_err(|_| malformed_error!("Too many call arguments"))?;
            Ok((pops, u32::from(!method.return_type().is_void())))
        }
        StackEffect::NewObj => {
            let method = called_method(instruction, references)?;
            let pops = u32::try_from(method.signature.parameters.len())
                .map_err(|_| malformed_error!("Too many constructor arguments"))?;
            Ok((pops, 1))
        }
        StackEffect::Return => Ok((u32::from(!return_type.is_void()), 0)),
        StackEffect::Unsupported => Err(Error::UnsupportedInstruction(instruction.opcode.mnemonic())),
    }
}

// A call through a token the module never imported is a defect of this body alone.
fn called_method<'r>(
    instruction: &Instruction,
    references: &'r ReferenceTable,
) -> Result<&'r MethodRef> {
    instruction
        .token()
        .and_then(|token| references.method(token).ok())
        .ok_or(Error::InvalidOperand {
            mnemonic: instruction.opcode.mnemonic(),
            expected: "imported method token",
        })
}

struct DepthMap {
    depths: Vec<Option<u32>>,
    worklist: Vec<usize>,
}

impl DepthMap {
    fn record(&mut self, position: usize, depth: u32) -> Result<()> {
        match self.depths.get(position).copied() {
            Some(None) => {
                self.depths[position] = Some(depth);
                self.worklist.push(position);
                Ok(())
            }
            Some(Some(expected)) if expected != depth => Err(Error::StackMismatch {
                position,
                expected,
                found: depth,
            }),
            Some(Some(_)) => Ok(()),
            None => Err(Error::FallThrough),
        }
    }
}

fn position_of(positions: &HashMap<InstrId, usize>, id: InstrId) -> Result<usize> {
    positions.get(&id).copied().ok_or_else(|| {
        Error::DanglingReference(format!("instruction #{} is not in the body", id.index()))
    })
}

/// Computes the maximum evaluation stack depth of `body`.
///
/// # Errors
///
/// Returns [`crate::Error::StackUnderflow`], [`crate::Error::StackMismatch`] or
/// [`crate::Error::FallThrough`] for inconsistent bodies, and the errors of [`stack_effect`].
pub fn compute_max_stack(
    body: &MethodBody,
    references: &ReferenceTable,
    return_type: &TypeSig,
) -> Result<u16> {
    let order: Vec<(InstrId, &Instruction)> = body.instructions.iter().collect();
    if order.is_empty() {
        return Ok(0);
    }

    let positions: HashMap<InstrId, usize> = order
        .iter()
        .enumerate()
        .map(|(position, (id, _))| (*id, position))
        .collect();

    let mut map = DepthMap {
        depths: vec![None; order.len()],
        worklist: Vec::new(),
    };
    map.record(0, 0)?;
    for handler in &body.exception_handlers {
        let entry = u32::from(handler.pushes_exception());
        map.record(position_of(&positions, handler.handler_start)?, entry)?;
        if let Some(filter) = handler.filter_start {
            map.record(position_of(&positions, filter)?, 1)?;
        }
    }

    let mut max_depth = 0u32;
    while let Some(position) = map.worklist.pop() {
        let depth = map.depths[position].unwrap_or_default();
        let instruction = order[position].1;

        let (pops, pushes) = stack_effect(instruction, references, return_type)?;
        if depth < pops {
            return Err(Error::StackUnderflow {
                position,
                mnemonic: instruction.opcode.mnemonic(),
            });
        }
        let after = depth - pops + pushes;
        max_depth = max_depth.max(depth).max(after);

        match instruction.opcode.flow() {
            FlowType::Sequential | FlowType::Call => map.record(position + 1, after)?,
            FlowType::ConditionalBranch | FlowType::Switch => {
                for target in instruction.targets() {
                    map.record(position_of(&positions, target)?, after)?;
                }
                map.record(position + 1, after)?;
            }
            FlowType::UnconditionalBranch => {
                for target in instruction.targets() {
                    map.record(position_of(&positions, target)?, after)?;
                }
            }
            FlowType::Leave => {
                for target in instruction.targets() {
                    map.record(position_of(&positions, target)?, 0)?;
                }
            }
            FlowType::Return | FlowType::Throw | FlowType::EndFinally => {}
        }
    }

    u16::try_from(max_depth).map_err(|_| malformed_error!("Stack depth exceeds u16 range"))
}
