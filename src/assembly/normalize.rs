//! Method body normalization.
//!
//! [`expand`] puts a body into the canonical editing form: every local and argument access
//! carries an explicit index, every integer constant is a plain `ldc.i4` and every branch uses
//! its long form. Rewrites never have to care about encoding limits in that form.
//!
//! [`compact`] is the inverse, run after editing. It picks the smallest encoding of every
//! instruction, shrinks branches whose displacement fits in a byte, lays out offsets and
//! recomputes `max_stack`. Both operations reject instruction shapes they do not understand
//! instead of guessing.

use crate::{
    assembly::{
        body::MethodBody,
        instruction::{Immediate, Instruction, Operand},
        opcodes::OpCode,
        stack::compute_max_stack,
    },
    metadata::{ReferenceTable, TypeSig},
    Result,
};

/// Rewrites `body` into its expanded form.
///
/// Expanding an expanded body is a no-op.
///
/// # Errors
///
/// Returns [`crate::Error::InvalidOperand`] if an instruction carries an operand that does not
/// fit its opcode and [`crate::Error::DanglingReference`] if a branch or handler refers to an
/// instruction outside the body.
pub fn expand(body: &mut MethodBody) -> Result<()> {
    for id in body.instructions.ids() {
        if let Some(instruction) = body.instructions.get_mut(id) {
            instruction.check_operand()?;
            if let Some((opcode, operand)) = expanded_form(instruction) {
                instruction.opcode = opcode;
                instruction.operand = operand;
            }
        }
    }

    body.validate()
}

fn expanded_form(instruction: &Instruction) -> Option<(OpCode, Operand)> {
    let operand = instruction.operand.clone();
    let form = match instruction.opcode {
        OpCode::Ldarg0 => (OpCode::Ldarg, Operand::Argument(0)),
        OpCode::Ldarg1 => (OpCode::Ldarg, Operand::Argument(1)),
        OpCode::Ldarg2 => (OpCode::Ldarg, Operand::Argument(2)),
        OpCode::Ldarg3 => (OpCode::Ldarg, Operand::Argument(3)),
        OpCode::LdargS => (OpCode::Ldarg, operand),
        OpCode::LdargaS => (OpCode::Ldarga, operand),
        OpCode::StargS => (OpCode::Starg, operand),
        OpCode::Ldloc0 => (OpCode::Ldloc, Operand::Local(0)),
        OpCode::Ldloc1 => (OpCode::Ldloc, Operand::Local(1)),
        OpCode::Ldloc2 => (OpCode::Ldloc, Operand::Local(2)),
        OpCode::Ldloc3 => (OpCode::Ldloc, Operand::Local(3)),
        OpCode::LdlocS => (OpCode::Ldloc, operand),
        OpCode::LdlocaS => (OpCode::Ldloca, operand),
        OpCode::Stloc0 => (OpCode::Stloc, Operand::Local(0)),
        OpCode::Stloc1 => (OpCode::Stloc, Operand::Local(1)),
        OpCode::Stloc2 => (OpCode::Stloc, Operand::Local(2)),
        OpCode::Stloc3 => (OpCode::Stloc, Operand::Local(3)),
        OpCode::StlocS => (OpCode::Stloc, operand),
        OpCode::LdcI4M1 => ldc(-1),
        OpCode::LdcI40 => ldc(0),
        OpCode::LdcI41 => ldc(1),
        OpCode::LdcI42 => ldc(2),
        OpCode::LdcI43 => ldc(3),
        OpCode::LdcI44 => ldc(4),
        OpCode::LdcI45 => ldc(5),
        OpCode::LdcI46 => ldc(6),
        OpCode::LdcI47 => ldc(7),
        OpCode::LdcI48 => ldc(8),
        OpCode::LdcI4S => match operand {
            Operand::Immediate(Immediate::Int8(value)) => ldc(i32::from(value)),
            _ => return None,
        },
        opcode => (opcode.long_branch()?, operand),
    };
    Some(form)
}

fn ldc(value: i32) -> (OpCode, Operand) {
    (OpCode::LdcI4, Operand::Immediate(Immediate::Int32(value)))
}

/// Rewrites `body` into its most compact encoding and recomputes the derived data.
///
/// `return_type` is the return type of the method owning the body.
///
/// # Errors
///
/// Everything [`expand`] rejects, plus the stack analysis errors of
/// [`crate::assembly::compute_max_stack`].
pub fn compact(body: &mut MethodBody, references: &ReferenceTable, return_type: &TypeSig) -> Result<()> {
    expand(body)?;

    for id in body.instructions.ids() {
        if let Some(instruction) = body.instructions.get_mut(id) {
            if let Some((opcode, operand)) = compact_form(instruction) {
                instruction.opcode = opcode;
                instruction.operand = operand;
            }
        }
    }

    optimize_branches(body)?;
    body.max_stack = compute_max_stack(body, references, return_type)?;
    Ok(())
}

fn compact_form(instruction: &Instruction) -> Option<(OpCode, Operand)> {
    let short = |opcode: OpCode, index: u16| (index <= 0xFF).then(|| (opcode, instruction.operand.clone()));

    match (instruction.opcode, &instruction.operand) {
        (OpCode::Ldarg, Operand::Argument(index)) => match index {
            0 => Some((OpCode::Ldarg0, Operand::None)),
            1 => Some((OpCode::Ldarg1, Operand::None)),
            2 => Some((OpCode::Ldarg2, Operand::None)),
            3 => Some((OpCode::Ldarg3, Operand::None)),
            _ => short(OpCode::LdargS, *index),
        },
        (OpCode::Ldarga, Operand::Argument(index)) => short(OpCode::LdargaS, *index),
        (OpCode::Starg, Operand::Argument(index)) => short(OpCode::StargS, *index),
        (OpCode::Ldloc, Operand::Local(index)) => match index {
            0 => Some((OpCode::Ldloc0, Operand::None)),
            1 => Some((OpCode::Ldloc1, Operand::None)),
            2 => Some((OpCode::Ldloc2, Operand::None)),
            3 => Some((OpCode::Ldloc3, Operand::None)),
            _ => short(OpCode::LdlocS, *index),
        },
        (OpCode::Ldloca, Operand::Local(index)) => short(OpCode::LdlocaS, *index),
        (OpCode::Stloc, Operand::Local(index)) => match index {
            0 => Some((OpCode::Stloc0, Operand::None)),
            1 => Some((OpCode::Stloc1, Operand::None)),
            2 => Some((OpCode::Stloc2, Operand::None)),
            3 => Some((OpCode::Stloc3, Operand::None)),
            _ => short(OpCode::StlocS, *index),
        },
        (OpCode::LdcI4, Operand::Immediate(Immediate::Int32(value))) => {
            let opcode = match value {
                -1 => OpCode::LdcI4M1,
                0 => OpCode::LdcI40,
                1 => OpCode::LdcI41,
                2 => OpCode::LdcI42,
                3 => OpCode::LdcI43,
                4 => OpCode::LdcI44,
                5 => OpCode::LdcI45,
                6 => OpCode::LdcI46,
                7 => OpCode::LdcI47,
                8 => OpCode::LdcI48,
                _ => {
                    return i8::try_from(*value)
                        .ok()
                        .map(|value| (OpCode::LdcI4S, Operand::Immediate(Immediate::Int8(value))))
                }
            };
            Some((opcode, Operand::None))
        }
        _ => None,
    }
}

/// Assigns byte offsets to every instruction and returns the code size.
///
/// # Errors
///
/// Fails if the body grows beyond the 4 GiB offset range.
pub fn compute_offsets(body: &mut MethodBody) -> Result<u32> {
    let mut offset = 0u32;
    for id in body.instructions.ids() {
        if let Some(instruction) = body.instructions.get_mut(id) {
            instruction.offset = offset;
            offset = offset
                .checked_add(instruction.size())
                .ok_or_else(|| malformed_error!("Method body exceeds u32 range"))?;
        }
    }
    body.code_size = offset;
    Ok(offset)
}

/// Converts long branches to short branches where the displacement fits in a byte.
///
/// Shrinking a branch only ever moves instructions closer together, so a branch that fits
/// once keeps fitting. Each round may let further branches fit; rounds repeat until nothing
/// changes.
fn optimize_branches(body: &mut MethodBody) -> Result<()> {
    const MAX_ITERATIONS: usize = 100;

    for _ in 0..MAX_ITERATIONS {
        compute_offsets(body)?;

        let shrinkable: Vec<_> = body
            .instructions
            .iter()
            .filter(|(_, instruction)| instruction.opcode.short_branch().is_some())
            .filter_map(|(id, instruction)| {
                let Operand::Target(target) = instruction.operand else {
                    return None;
                };
                let target = body.instructions.get(target)?;
                let end = i64::from(instruction.offset) + i64::from(instruction.size());
                let displacement = i64::from(target.offset) - end;
                (-128..=127).contains(&displacement).then_some(id)
            })
            .collect();

        if shrinkable.is_empty() {
            break;
        }

        for id in shrinkable {
            if let Some(instruction) = body.instructions.get_mut(id) {
                if let Some(short) = instruction.opcode.short_branch() {
                    instruction.opcode = short;
                }
            }
        }
    }

    compute_offsets(body)?;
    Ok(())
}
