//! Structural member references.
//!
//! A member reference describes a method or field by declaring type, name and signature. The
//! same description is used to match existing call sites and to build operands for newly
//! emitted instructions, so equality is purely structural.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::signatures::{MethodSig, TypeSig};

/// A reference to a method, possibly an instantiation of a generic method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    /// The type declaring the method
    pub declaring_type: TypeSig,
    /// Simple method name
    pub name: String,
    /// Declared signature (generic parameters left open)
    pub signature: MethodSig,
    /// Type arguments of a generic method instantiation, empty otherwise
    pub generic_arguments: Vec<TypeSig>,
}

impl MethodRef {
    /// Creates a reference to a non generic method.
    pub fn new(declaring_type: TypeSig, name: impl Into<String>, signature: MethodSig) -> Self {
        MethodRef {
            declaring_type,
            name: name.into(),
            signature,
            generic_arguments: Vec::new(),
        }
    }

    /// Instantiates this generic method with `arguments`.
    #[must_use]
    pub fn instantiate(&self, arguments: Vec<TypeSig>) -> MethodRef {
        MethodRef {
            generic_arguments: arguments,
            ..self.clone()
        }
    }

    /// Returns `true` if this reference instantiates a generic method.
    #[must_use]
    pub fn is_generic_instantiation(&self) -> bool {
        !self.generic_arguments.is_empty()
    }

    /// Return type with method generic arguments substituted.
    #[must_use]
    pub fn return_type(&self) -> TypeSig {
        self.signature.return_type.instantiate(&self.generic_arguments)
    }

    /// Parameter types with method generic arguments substituted.
    #[must_use]
    pub fn parameter_types(&self) -> Vec<TypeSig> {
        self.signature
            .parameters
            .iter()
            .map(|param| param.instantiate(&self.generic_arguments))
            .collect()
    }

    /// Number of values a call to this method pops, including `this`.
    #[must_use]
    pub fn pops(&self) -> usize {
        self.signature.argument_count()
    }

    /// Full name in the form `System.Int32 Ns.Type::Name<System.Int32>(System.String)`.
    #[must_use]
    pub fn full_name(&self) -> String {
        let generic = if self.generic_arguments.is_empty() {
            String::new()
        } else {
            let args: Vec<String> = self.generic_arguments.iter().map(TypeSig::full_name).collect();
            format!("<{}>", args.join(","))
        };

        format!(
            "{} {}::{}{}({})",
            self.signature.return_type.full_name(),
            self.declaring_type.full_name(),
            self.name,
            generic,
            self.signature.parameter_list()
        )
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// A reference to a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// The type declaring the field
    pub declaring_type: TypeSig,
    /// Field name
    pub name: String,
    /// Declared field type
    pub field_type: TypeSig,
}

impl FieldRef {
    /// Creates a field reference.
    pub fn new(declaring_type: TypeSig, name: impl Into<String>, field_type: TypeSig) -> Self {
        FieldRef {
            declaring_type,
            name: name.into(),
            field_type,
        }
    }

    /// Full name in the form `System.Int32 Ns.Type::field`.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!(
            "{} {}::{}",
            self.field_type.full_name(),
            self.declaring_type.full_name(),
            self.name
        )
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// Either kind of member reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemberRef {
    /// A method or generic method instantiation
    Method(MethodRef),
    /// A field
    Field(FieldRef),
}

impl MemberRef {
    /// The declaring type of the referenced member.
    #[must_use]
    pub fn declaring_type(&self) -> &TypeSig {
        match self {
            MemberRef::Method(method) => &method.declaring_type,
            MemberRef::Field(field) => &field.declaring_type,
        }
    }

    /// The simple name of the referenced member.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            MemberRef::Method(method) => &method.name,
            MemberRef::Field(field) => &field.name,
        }
    }
}

impl From<MethodRef> for MemberRef {
    fn from(method: MethodRef) -> Self {
        MemberRef::Method(method)
    }
}

impl From<FieldRef> for MemberRef {
    fn from(field: FieldRef) -> Self {
        MemberRef::Field(field)
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRef::Method(method) => fmt::Display::fmt(method, f),
            MemberRef::Field(field) => fmt::Display::fmt(field, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_variable() -> MethodRef {
        MethodRef::new(
            TypeSig::Class("Shared.VariableExtensions".to_string()),
            "GetVariable",
            MethodSig::static_method(TypeSig::MVar(0), vec![TypeSig::Object, TypeSig::String])
                .with_generic_parameters(1),
        )
    }

    #[test]
    fn generic_instantiation_substitutes_return_type() {
        let open = get_variable();
        assert!(!open.is_generic_instantiation());
        assert_eq!(open.return_type(), TypeSig::MVar(0));

        let closed = open.instantiate(vec![TypeSig::I4]);
        assert!(closed.is_generic_instantiation());
        assert_eq!(closed.return_type(), TypeSig::I4);
        assert_eq!(
            closed.full_name(),
            "!!0 Shared.VariableExtensions::GetVariable<System.Int32>(System.Object,System.String)"
        );
        assert_ne!(open, closed);
    }

    #[test]
    fn field_full_name() {
        let field = FieldRef::new(TypeSig::Class("Data".to_string()), "score", TypeSig::I4);
        assert_eq!(field.full_name(), "System.Int32 Data::score");

        let member = MemberRef::from(field);
        assert_eq!(member.name(), "score");
        assert_eq!(member.declaring_type().full_name(), "Data");
    }

    #[test]
    fn pops_include_this() {
        let instance = MethodRef::new(
            TypeSig::Class("Data".to_string()),
            "SetInt",
            MethodSig::instance_method(TypeSig::Void, vec![TypeSig::String, TypeSig::I4]),
        );
        assert_eq!(instance.pops(), 3);
        assert_eq!(get_variable().pops(), 2);
    }
}
