//! By-name accessors used in place of direct field access.

use std::collections::HashMap;

use crate::{
    assembly::{Instruction, OpCode, Operand},
    metadata::{AssemblyResolver, MethodQuery, MethodRef, Module, ReferenceTable, Token, TypeDef, TypeSig},
    patching::field_access::FieldAccessConfig,
    Result,
};

/// A call to an accessor, ready to be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Accessor {
    pub token: Token,
    pub opcode: OpCode,
}

impl Accessor {
    pub fn instruction(self) -> Instruction {
        Instruction::new(self.opcode, Operand::Token(self.token))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Access {
    Get,
    Set,
}

/// The typed accessors declared on the tracked type plus the generic fallback pair.
///
/// Typed accessors are instance methods and are called with `callvirt`. The generic accessors
/// are static extension methods instantiated per field type and called with `call`; their
/// instantiations are memoized per type.
#[derive(Debug)]
pub(crate) struct Accessors {
    typed_getters: HashMap<TypeSig, MethodRef>,
    typed_setters: HashMap<TypeSig, MethodRef>,
    generic_getter: MethodRef,
    generic_setter: MethodRef,
    instantiations: HashMap<(Access, TypeSig), Token>,
}

impl Accessors {
    pub fn new(
        module: &Module,
        tracked: &TypeDef,
        config: &FieldAccessConfig,
        resolver: &AssemblyResolver,
    ) -> Result<Self> {
        let mut typed_getters = HashMap::new();
        let mut typed_setters = HashMap::new();

        for method in tracked.methods.iter().filter_map(|token| module.method_def(*token)) {
            let signature = &method.signature;
            if let Some(suffix) = method.name.strip_prefix("Get") {
                if config.accessor_suffixes.iter().any(|s| s == suffix)
                    && signature.parameters.len() == 1
                {
                    register(&mut typed_getters, signature.return_type.clone(), module, method);
                }
            } else if let Some(suffix) = method.name.strip_prefix("Set") {
                if config.accessor_suffixes.iter().any(|s| s == suffix)
                    && signature.parameters.len() == 2
                {
                    register(&mut typed_setters, signature.parameters[1].clone(), module, method);
                }
            }
        }

        let generic_getter = resolver.resolve_method(
            &config.generic_accessor_module,
            &MethodQuery::new(&config.generic_accessor_type, &config.generic_getter)
                .generic_parameters(1)
                .parameter_count(2),
        )?;
        let generic_setter = resolver.resolve_method(
            &config.generic_accessor_module,
            &MethodQuery::new(&config.generic_accessor_type, &config.generic_setter)
                .generic_parameters(1)
                .parameter_count(3),
        )?;

        log::debug!(
            "{} typed getters, {} typed setters on {}",
            typed_getters.len(),
            typed_setters.len(),
            module.type_full_name(tracked)
        );

        Ok(Accessors {
            typed_getters,
            typed_setters,
            generic_getter,
            generic_setter,
            instantiations: HashMap::new(),
        })
    }

    /// The getter for fields of type `field_type`.
    pub fn getter(&mut self, references: &mut ReferenceTable, field_type: &TypeSig) -> Accessor {
        self.accessor(Access::Get, references, field_type)
    }

    /// The setter for fields of type `field_type`.
    pub fn setter(&mut self, references: &mut ReferenceTable, field_type: &TypeSig) -> Accessor {
        self.accessor(Access::Set, references, field_type)
    }

    fn accessor(
        &mut self,
        access: Access,
        references: &mut ReferenceTable,
        field_type: &TypeSig,
    ) -> Accessor {
        let typed = match access {
            Access::Get => self.typed_getters.get(field_type),
            Access::Set => self.typed_setters.get(field_type),
        };
        if let Some(method) = typed {
            return Accessor {
                token: references.import(method.clone()),
                opcode: OpCode::Callvirt,
            };
        }

        let key = (access, field_type.clone());
        if let Some(token) = self.instantiations.get(&key) {
            return Accessor {
                token: *token,
                opcode: OpCode::Call,
            };
        }

        let generic = match access {
            Access::Get => &self.generic_getter,
            Access::Set => &self.generic_setter,
        };
        let token = references.import(generic.instantiate(vec![field_type.clone()]));
        self.instantiations.insert(key, token);
        Accessor {
            token,
            opcode: OpCode::Call,
        }
    }
}

fn register(
    table: &mut HashMap<TypeSig, MethodRef>,
    value_type: TypeSig,
    module: &Module,
    method: &crate::metadata::MethodDef,
) {
    if let Some(existing) = table.get(&value_type) {
        log::warn!(
            "Ignoring accessor {}, {} already handles {value_type}",
            method.name,
            existing.name
        );
        return;
    }
    table.insert(value_type, module.method_ref(method));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{data_module, helper_module};

    #[test]
    fn typed_accessors_win_over_generic() {
        let module = data_module();
        let resolver = AssemblyResolver::new().with_module(helper_module());
        let config = FieldAccessConfig::new("Data");
        let tracked = module.find_type("Data").unwrap();
        let mut accessors = Accessors::new(&module, tracked, &config, &resolver).unwrap();

        let mut references = ReferenceTable::new();
        let get_int = accessors.getter(&mut references, &TypeSig::I4);
        assert_eq!(get_int.opcode, OpCode::Callvirt);
        assert_eq!(references.method(get_int.token).unwrap().name, "GetInt");

        let set_string = accessors.setter(&mut references, &TypeSig::String);
        assert_eq!(references.method(set_string.token).unwrap().name, "SetString");

        let get_long = accessors.getter(&mut references, &TypeSig::I8);
        assert_eq!(get_long.opcode, OpCode::Call);
        let method = references.method(get_long.token).unwrap();
        assert_eq!(method.name, "GetVariable");
        assert_eq!(method.return_type(), TypeSig::I8);

        let again = accessors.getter(&mut references, &TypeSig::I8);
        assert_eq!(again, get_long);
        let set_long = accessors.setter(&mut references, &TypeSig::I8);
        assert_ne!(set_long.token, get_long.token);
        assert_eq!(references.method(set_long.token).unwrap().pops(), 3);
    }

    #[test]
    fn missing_generic_accessor_is_fatal() {
        let module = data_module();
        let config = FieldAccessConfig::new("Data");
        let tracked = module.find_type("Data").unwrap();
        assert!(matches!(
            Accessors::new(&module, tracked, &config, &AssemblyResolver::new()),
            Err(crate::Error::ModuleNotFound(_))
        ));
    }
}
