//! Guards the reflective type lookup of the FSM runtime against known bad type names.
//!
//! Some state machines reference type names that no longer exist. Every failed lookup walks all
//! loaded assemblies, which stalls the game when such a scene loads. This pass
//!
//! 1. seeds the runtime's lookup dictionary with the correct type for a renamed one, at the end
//!    of the reflection helper's static constructor, and
//! 2. makes the global lookup return `null` immediately for a namespace prefix that can never
//!    resolve to a type.

use crate::{
    assembly::{InstrId, Instruction, OpCode, Operand},
    metadata::{FieldRef, MethodRef, MethodSig, Module, Token, TypeSig},
    patching::{
        pass::{PatchEnvironment, PatchReport, Patcher},
        rewriter::{apply_replacement, edit_method, Replacement},
    },
    Error, Result,
};

/// Pass installing the type lookup guards.
#[derive(Debug, Clone)]
pub struct TypeLookupGuardPatcher {
    /// Simple name of the reflection helper type
    pub type_name: String,
    /// Static dictionary field mapping type names to types
    pub lookup_field: String,
    /// Lookup method that receives the type name as its first argument
    pub lookup_method: String,
    /// Type name to seed, and the assembly qualified name it really resolves to
    pub seeded: (String, String),
    /// Name for which the lookup returns `null` straight away
    pub rejected: String,
}

impl Default for TypeLookupGuardPatcher {
    fn default() -> Self {
        TypeLookupGuardPatcher {
            type_name: "ReflectionUtils".to_string(),
            lookup_field: "typeLookup".to_string(),
            lookup_method: "GetGlobalType".to_string(),
            seeded: (
                "TMProOldOld.TextAlignmentOptions".to_string(),
                "TMProOld.TextAlignmentOptions, Assembly-CSharp".to_string(),
            ),
            rejected: "HutongGames.PlayMaker.Actions.".to_string(),
        }
    }
}

fn type_class() -> TypeSig {
    TypeSig::Class("System.Type".to_string())
}

impl TypeLookupGuardPatcher {
    fn seed_lookup(
        &self,
        module: &mut Module,
        cctor: Token,
        lookup: FieldRef,
    ) -> Result<bool> {
        let get_type = MethodRef::new(
            type_class(),
            "GetType",
            MethodSig::static_method(type_class(), vec![TypeSig::String]),
        );
        let set_item = MethodRef::new(
            lookup.field_type.clone(),
            "set_Item",
            MethodSig::instance_method(TypeSig::Void, vec![TypeSig::Var(0), TypeSig::Var(1)]),
        );

        let (method, references) = module
            .method_and_references_mut(cctor)
            .ok_or_else(|| Error::DanglingReference(cctor.to_string()))?;
        let (name, fixed_name) = &self.seeded;

        edit_method(method, references, |body, references| {
            let Some(ret) = last_ret(body) else {
                log::info!("Static constructor has no ret, not seeding the type lookup");
                return Ok(false);
            };
            let sequence = vec![
                Instruction::new(OpCode::Ldsfld, Operand::Token(references.import(lookup))),
                Instruction::ldstr(name),
                Instruction::ldstr(fixed_name),
                Instruction::call(references.import(get_type)),
                Instruction::callvirt(references.import(set_item)),
                Instruction::simple(OpCode::Ret),
            ];
            apply_replacement(body, ret, Replacement::new(sequence))?;
            Ok(true)
        })
    }

    fn guard_lookup(&self, module: &mut Module, lookup: Token) -> Result<bool> {
        let op_equality = MethodRef::new(
            TypeSig::String,
            "op_Equality",
            MethodSig::static_method(TypeSig::Boolean, vec![TypeSig::String, TypeSig::String]),
        );

        let (method, references) = module
            .method_and_references_mut(lookup)
            .ok_or_else(|| Error::DanglingReference(lookup.to_string()))?;

        edit_method(method, references, |body, references| {
            let Some(first) = body.instructions.first() else {
                return Ok(false);
            };
            let guard = [
                Instruction::ldarg(0),
                Instruction::ldstr(&self.rejected),
                Instruction::call(references.import(op_equality)),
                Instruction::branch(OpCode::Brfalse, first),
                Instruction::simple(OpCode::Ldnull),
                Instruction::simple(OpCode::Ret),
            ];
            for instruction in guard {
                body.instructions.insert_before(first, instruction)?;
            }
            Ok(true)
        })
    }
}

fn last_ret(body: &crate::assembly::MethodBody) -> Option<InstrId> {
    body.instructions
        .ids()
        .into_iter()
        .rev()
        .find(|id| body.instructions.get(*id).is_some_and(|i| i.opcode == OpCode::Ret))
}

fn tally(report: &mut PatchReport, outcome: Result<bool>, method: &str) -> Result<()> {
    match outcome {
        Ok(true) => {
            log::info!("Patched {method}");
            report.methods_patched += 1;
            report.replaced += 1;
            Ok(())
        }
        Ok(false) => Ok(()),
        Err(e) if e.is_method_scoped() => {
            log::warn!("Leaving {method} unpatched: {e}");
            report.failed_methods += 1;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

impl Patcher for TypeLookupGuardPatcher {
    fn name(&self) -> &'static str {
        "TypeLookupGuard"
    }

    fn description(&self) -> &'static str {
        "Short-circuits reflective lookups of type names that can not resolve"
    }

    fn patch(&self, module: &mut Module, _env: &PatchEnvironment<'_>) -> Result<PatchReport> {
        let mut report = PatchReport::default();

        let Some(ty) = module.top_level_types().find(|ty| ty.name == self.type_name) else {
            log::info!("Could not find type {} in {}", self.type_name, module.name);
            return Ok(report);
        };

        let methods: Vec<_> = ty
            .methods
            .iter()
            .filter_map(|token| module.method_def(*token))
            .collect();
        let cctor = methods
            .iter()
            .find(|m| m.is_constructor() && m.is_static() && m.has_body())
            .map(|m| m.token);
        let lookup_method = methods
            .iter()
            .find(|m| m.name == self.lookup_method && m.has_body())
            .map(|m| m.token);
        let lookup_field = ty
            .fields
            .iter()
            .filter_map(|token| module.field_def(*token))
            .find(|f| f.name == self.lookup_field && f.is_static())
            .map(|f| module.field_ref(f));

        let Some(cctor) = cctor else {
            log::info!("Could not find static constructor of {}", self.type_name);
            return Ok(report);
        };
        match lookup_field {
            Some(field) => {
                let seeded = self.seed_lookup(module, cctor, field);
                tally(&mut report, seeded, ".cctor")?;
            }
            None => log::info!("Could not find static field {}", self.lookup_field),
        }

        let Some(lookup_method) = lookup_method else {
            log::info!("Could not find {}", self.lookup_method);
            return Ok(report);
        };
        let guarded = self.guard_lookup(module, lookup_method);
        tally(&mut report, guarded, &self.lookup_method)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::AssemblyResolver,
        patching::PatcherConfig,
        test::{disassemble, playmaker_module, Machine, Value},
    };

    fn patch(module: &mut Module) -> PatchReport {
        let config = PatcherConfig::new();
        let resolver = AssemblyResolver::new();
        let env = PatchEnvironment::new(&config, &resolver);
        TypeLookupGuardPatcher::default().patch(module, &env).unwrap()
    }

    fn body<'a>(module: &'a Module, name: &str) -> &'a crate::assembly::MethodBody {
        module
            .all_methods()
            .find(|m| m.name == name)
            .and_then(|m| m.body.as_ref())
            .unwrap()
    }

    #[test]
    fn static_constructor_seeds_the_lookup() {
        let mut module = playmaker_module();
        let report = patch(&mut module);
        assert_eq!(report.methods_patched, 2);

        let listing = disassemble(body(&module, ".cctor"), &module.references);
        assert_eq!(
            &listing[listing.len() - 6..],
            [
                "ldsfld System.Collections.Generic.Dictionary`2<System.String,System.Type> HutongGames.PlayMaker.ReflectionUtils::typeLookup",
                "ldstr \"TMProOldOld.TextAlignmentOptions\"",
                "ldstr \"TMProOld.TextAlignmentOptions, Assembly-CSharp\"",
                "call System.Type System.Type::GetType(System.String)",
                "callvirt System.Void System.Collections.Generic.Dictionary`2<System.String,System.Type>::set_Item(!0,!1)",
                "ret",
            ]
        );
    }

    #[test]
    fn rejected_name_returns_null() {
        let mut module = playmaker_module();
        patch(&mut module);
        let lookup = body(&module, "GetGlobalType");

        let mut machine = Machine::new();
        let result = machine
            .run(
                lookup,
                &module.references,
                vec![Value::Str("HutongGames.PlayMaker.Actions.".into())],
            )
            .unwrap();
        assert_eq!(result, Some(Value::Null));
        assert_eq!(machine.calls(), ["String::op_Equality(HutongGames.PlayMaker.Actions.)"]);

        let mut machine = Machine::new();
        let result = machine
            .run(lookup, &module.references, vec![Value::Str("Fsm".into())])
            .unwrap();
        assert_eq!(result, Some(Value::Str("Fsm".into())));
    }

    #[test]
    fn branches_into_the_lookup_still_reach_the_original_code() {
        let mut module = playmaker_module();
        patch(&mut module);
        let lookup = body(&module, "GetGlobalType");
        let listing = disassemble(lookup, &module.references);
        assert_eq!(listing[0], "ldarg.0");
        assert_eq!(listing[3], "brfalse.s 6");
        assert_eq!(lookup.exception_handlers.len(), 0);
    }

    #[test]
    fn absent_type_is_not_an_error() {
        let mut module = Module::new("Other");
        let report = patch(&mut module);
        assert!(!report.changed());
    }
}
