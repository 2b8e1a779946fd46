mod fixtures;

pub use fixtures::{data_module, helper_module, playmaker_module, prepatcher_module};
pub use machine::{Machine, Place, Value};

use crate::{
    assembly::{Immediate, MethodBody, Operand},
    metadata::{MemberRef, Module, ReferenceTable},
};

/// One line per instruction: the mnemonic, then the operand.
///
/// Member tokens print as full names, branch targets as the position of the target.
pub fn disassemble(body: &MethodBody, references: &ReferenceTable) -> Vec<String> {
    body.instructions
        .iter()
        .map(|(_, instruction)| {
            let mnemonic = instruction.opcode.mnemonic();
            let position = |id| {
                body.instructions
                    .position(id)
                    .map_or_else(|| "?".to_string(), |p| p.to_string())
            };
            let operand = match &instruction.operand {
                Operand::None => return mnemonic.to_string(),
                Operand::Immediate(Immediate::Int8(v)) => v.to_string(),
                Operand::Immediate(Immediate::Int32(v)) => v.to_string(),
                Operand::Immediate(Immediate::Int64(v)) => v.to_string(),
                Operand::Immediate(Immediate::Float32(v)) => v.to_string(),
                Operand::Immediate(Immediate::Float64(v)) => v.to_string(),
                Operand::String(value) => format!("\"{value}\""),
                Operand::Local(index) | Operand::Argument(index) => index.to_string(),
                Operand::Token(token) => match references.get(*token) {
                    Ok(MemberRef::Method(method)) => method.full_name(),
                    Ok(MemberRef::Field(field)) => field.full_name(),
                    Err(_) => token.to_string(),
                },
                Operand::Type(sig) => sig.full_name(),
                Operand::Target(target) => position(*target),
                Operand::Switch(targets) => targets
                    .iter()
                    .map(|target| position(*target))
                    .collect::<Vec<_>>()
                    .join(","),
            };
            format!("{mnemonic} {operand}")
        })
        .collect()
}

/// Serialized form of a whole module, for before/after comparisons.
pub fn snapshot(module: &Module) -> String {
    serde_json::to_string_pretty(module).unwrap()
}
