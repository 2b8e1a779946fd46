use std::collections::HashSet;

use crate::{
    assembly::{InstrId, Instruction, OpCode},
    metadata::{AssemblyResolver, FieldRef, Module, ReferenceTable},
    patching::{
        field_access::{accessors::Accessors, FieldAccessConfig},
        rewriter::{Replacement, RewriteContext, RewriteRule},
    },
    Error, Result,
};

/// Replaces loads, stores and address loads of tracked fields with accessor calls.
///
/// | Matched       | Replacement                                                       |
/// |---------------|-------------------------------------------------------------------|
/// | `ldfld f`     | `ldstr "f"; call get`                                             |
/// | `stfld f`     | `stloc tmp; ldstr "f"; ldloc tmp; call set`                       |
/// | `ldflda f`    | `dup; ldstr "f"; call get; stloc tmp; ldloca tmp` + write back    |
///
/// The address form only applies when the next instruction is a static `void` call taking the
/// address as its single by-ref parameter and nothing branches to that call. The value is
/// written back through the setter right after the call returns. Every other `ldflda` is a miss.
pub(crate) struct FieldAccessRule {
    tracked_type: String,
    fields: HashSet<String>,
    accessors: Accessors,
}

impl FieldAccessRule {
    /// Builds the rule for the tracked type of `config` in `module`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if the module lacks the tracked type and the resolver's
    /// errors if the generic accessors can not be found.
    pub fn new(
        module: &Module,
        config: &FieldAccessConfig,
        resolver: &AssemblyResolver,
    ) -> Result<Self> {
        let tracked = module
            .find_type(&config.tracked_type)
            .ok_or_else(|| Error::TypeNotFound(config.tracked_type.clone()))?;

        let fields: HashSet<String> = tracked
            .fields
            .iter()
            .filter_map(|token| module.field_def(*token))
            .filter(|field| !field.is_private() && !field.is_static() && !field.is_not_serialized())
            .map(|field| field.name.clone())
            .collect();
        log::debug!("Tracking {} fields of {}", fields.len(), config.tracked_type);

        Ok(FieldAccessRule {
            tracked_type: config.tracked_type.clone(),
            fields,
            accessors: Accessors::new(module, tracked, config, resolver)?,
        })
    }

    /// Number of fields whose accesses are rewritten.
    pub fn tracked_fields(&self) -> usize {
        self.fields.len()
    }

    fn tracks(&self, field: &FieldRef) -> bool {
        field.declaring_type.full_name() == self.tracked_type && self.fields.contains(&field.name)
    }

    fn rewrite_address(
        &mut self,
        site: InstrId,
        field: &FieldRef,
        ctx: &mut RewriteContext<'_>,
    ) -> Result<Option<Replacement>> {
        let Some(next) = ctx.body.instructions.next(site) else {
            return Ok(None);
        };
        let next_instruction = ctx.instruction(next)?;
        if next_instruction.opcode != OpCode::Call {
            return Ok(None);
        }
        let Some(callee) = next_instruction
            .token()
            .and_then(|token| ctx.references.method(token).ok())
        else {
            return Ok(None);
        };

        let single_by_ref = !callee.signature.has_this
            && callee.return_type().is_void()
            && matches!(callee.parameter_types().as_slice(), [param] if param.is_by_ref());
        if !single_by_ref || ctx.body.referenced_instructions().contains(&next) {
            return Ok(None);
        }

        let local = ctx.scratch_local(&field.field_type)?;
        let getter = self.accessors.getter(ctx.references, &field.field_type);
        let setter = self.accessors.setter(ctx.references, &field.field_type);

        Ok(Some(
            Replacement::new(vec![
                Instruction::simple(OpCode::Dup),
                Instruction::ldstr(&field.name),
                getter.instruction(),
                Instruction::stloc(local),
                Instruction::ldloca(local),
            ])
            .with_trailer(vec![
                Instruction::ldstr(&field.name),
                Instruction::ldloc(local),
                setter.instruction(),
            ]),
        ))
    }
}

impl RewriteRule for FieldAccessRule {
    fn name(&self) -> &'static str {
        "FieldAccess"
    }

    fn matches(&self, instruction: &Instruction, references: &ReferenceTable) -> bool {
        if !matches!(
            instruction.opcode,
            OpCode::Ldfld | OpCode::Stfld | OpCode::Ldflda
        ) {
            return false;
        }
        instruction
            .token()
            .and_then(|token| references.field(token).ok())
            .is_some_and(|field| self.tracks(field))
    }

    fn rewrite(
        &mut self,
        site: InstrId,
        ctx: &mut RewriteContext<'_>,
    ) -> Result<Option<Replacement>> {
        let instruction = ctx.instruction(site)?;
        let opcode = instruction.opcode;
        let token = instruction.token().ok_or(Error::InvalidOperand {
            mnemonic: opcode.mnemonic(),
            expected: "field token",
        })?;
        let field = ctx.references.field(token)?.clone();

        match opcode {
            OpCode::Ldfld => {
                let getter = self.accessors.getter(ctx.references, &field.field_type);
                Ok(Some(Replacement::new(vec![
                    Instruction::ldstr(&field.name),
                    getter.instruction(),
                ])))
            }
            OpCode::Stfld => {
                let local = ctx.scratch_local(&field.field_type)?;
                let setter = self.accessors.setter(ctx.references, &field.field_type);
                Ok(Some(Replacement::new(vec![
                    Instruction::stloc(local),
                    Instruction::ldstr(&field.name),
                    Instruction::ldloc(local),
                    setter.instruction(),
                ])))
            }
            OpCode::Ldflda => self.rewrite_address(site, &field, ctx),
            _ => Ok(None),
        }
    }
}
