//! Routes the reflective bulk read of variables through the by-name getter.
//!
//! `VariableExtensions.GetVariables<T>(obj, predicate)` collects the values of all fields of a
//! given type by calling `FieldInfo.GetValue(obj)` and unboxing the result. Those reads bypass
//! the accessor layer, so this pass turns
//!
//! ```text
//! ldloc    fieldInfo           ldarg    obj
//! ldarg    obj          =>     ldloc    fieldInfo
//! callvirt GetValue            callvirt FieldInfo::get_Name
//! unbox.any T                  call     GetVariable<T>
//! ```
//!
//! The window is rewritten in place; no instruction is added or removed.

use crate::{
    assembly::{InstrId, Instruction, OpCode, Operand},
    metadata::{MethodQuery, MethodRef, MethodSig, Module, Token, TypeSig},
    patching::{
        pass::{PatchEnvironment, PatchReport, Patcher},
        rewriter::{describe_method, edit_method},
    },
    Error, Result,
};

const EXTENSIONS_TYPE: &str = "TeamCherry.SharedUtils.VariableExtensions";

/// Pass rewriting the reflective read in `GetVariables`.
#[derive(Debug, Clone, Default)]
pub struct ReflectiveGetterPatcher;

impl ReflectiveGetterPatcher {
    /// Creates the pass.
    #[must_use]
    pub fn new() -> Self {
        ReflectiveGetterPatcher
    }
}

fn field_info() -> TypeSig {
    TypeSig::Class("System.Reflection.FieldInfo".to_string())
}

fn takes_selector(method: &crate::metadata::MethodDef) -> bool {
    matches!(
        method.signature.parameters.get(1),
        Some(TypeSig::GenericInst { base, .. }) if base.full_name() == "System.Func`2"
    )
}

/// Finds `callvirt FieldInfo::GetValue` and returns the four instruction window around it.
fn find_window(
    body: &crate::assembly::MethodBody,
    references: &crate::metadata::ReferenceTable,
    method_name: &str,
) -> Result<[InstrId; 4]> {
    let unexpected = |message: &str| Error::UnexpectedShape {
        method: method_name.to_string(),
        message: message.to_string(),
    };

    let get_value = body
        .instructions
        .iter()
        .find(|(_, instruction)| {
            instruction.opcode == OpCode::Callvirt
                && instruction
                    .token()
                    .and_then(|token| references.method(token).ok())
                    .is_some_and(|m| m.name == "GetValue" && m.declaring_type == field_info())
        })
        .map(|(id, _)| id)
        .ok_or_else(|| unexpected("no call to FieldInfo::GetValue"))?;

    let list = &body.instructions;
    let load_object = list.prev(get_value);
    let load_field = load_object.and_then(|id| list.prev(id));
    let unbox = list.next(get_value);
    let (Some(load_field), Some(load_object), Some(unbox)) = (load_field, load_object, unbox)
    else {
        return Err(unexpected("GetValue is not surrounded by its operands"));
    };

    let opcode = |id: InstrId| list.get(id).map(|i| i.opcode);
    if opcode(load_field) != Some(OpCode::Ldloc) {
        return Err(unexpected("first instruction is not ldloc"));
    }
    if opcode(load_object) != Some(OpCode::Ldarg) {
        return Err(unexpected("second instruction is not ldarg"));
    }
    if !matches!(opcode(unbox), Some(OpCode::Unbox | OpCode::UnboxAny)) {
        return Err(unexpected("fourth instruction is not unbox"));
    }
    Ok([load_field, load_object, get_value, unbox])
}

fn rewrite_window(
    body: &mut crate::assembly::MethodBody,
    window: [InstrId; 4],
    get_name: Token,
    get_variable: Token,
) -> Result<()> {
    let [load_field, load_object, get_value, unbox] = window;
    let dangling = |id: InstrId| Error::DanglingReference(format!("instruction #{}", id.index()));
    let list = &mut body.instructions;

    let first = list.get(load_field).cloned().ok_or_else(|| dangling(load_field))?;
    let second = list.get(load_object).cloned().ok_or_else(|| dangling(load_object))?;
    *list.get_mut(load_field).ok_or_else(|| dangling(load_field))? = second;
    *list.get_mut(load_object).ok_or_else(|| dangling(load_object))? = first;

    *list.get_mut(get_value).ok_or_else(|| dangling(get_value))? = Instruction::callvirt(get_name);
    *list.get_mut(unbox).ok_or_else(|| dangling(unbox))? = Instruction::call(get_variable);
    Ok(())
}

impl Patcher for ReflectiveGetterPatcher {
    fn name(&self) -> &'static str {
        "ReflectiveGetter"
    }

    fn description(&self) -> &'static str {
        "Routes reflective variable reads through GetVariable<T>"
    }

    fn patch(&self, module: &mut Module, _env: &PatchEnvironment<'_>) -> Result<PatchReport> {
        let ty = module
            .find_type(EXTENSIONS_TYPE)
            .ok_or_else(|| Error::TypeNotFound(EXTENSIONS_TYPE.to_string()))?;

        let target = ty
            .methods
            .iter()
            .filter_map(|token| module.method_def(*token))
            .find(|m| m.name == "GetVariables" && m.has_body() && takes_selector(m))
            .map(|m| m.token);
        let getter = MethodQuery::new(EXTENSIONS_TYPE, "GetVariable")
            .generic_parameters(1)
            .parameter_count(2)
            .resolve(module)
            .ok()
            .map(|m| module.method_ref(m));

        let (Some(target), Some(getter)) = (target, getter) else {
            log::info!("GetVariables or GetVariable not found in {}, nothing to do", module.name);
            return Ok(PatchReport::default());
        };

        let method_name = describe_method(module, target);
        log::info!("Found method {method_name}");

        let get_name = MethodRef::new(
            field_info(),
            "get_Name",
            MethodSig::instance_method(TypeSig::String, Vec::new()),
        );

        let (method, references) = module
            .method_and_references_mut(target)
            .ok_or_else(|| Error::DanglingReference(method_name.clone()))?;
        edit_method(method, references, |body, references| {
            let window = find_window(body, references, &method_name)?;
            let value_type = match body.instructions.get(window[3]).map(|i| &i.operand) {
                Some(Operand::Type(value_type)) => value_type.clone(),
                _ => {
                    return Err(Error::UnexpectedShape {
                        method: method_name.clone(),
                        message: "unbox without a type operand".to_string(),
                    })
                }
            };

            let get_name = references.import(get_name);
            let get_variable = references.import(getter.instantiate(vec![value_type]));
            rewrite_window(body, window, get_name, get_variable)?;
            Ok(true)
        })?;

        Ok(PatchReport {
            methods_patched: 1,
            replaced: 1,
            ..PatchReport::default()
        })
    }
}
