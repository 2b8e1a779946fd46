//! Type and method signatures.
//!
//! Signatures are kept in a structural form rather than as blob bytes. A [`TypeSig`] names a
//! type the way the CLR prints it (`System.Int32`, `Ns.Outer/Inner`, `List`1<System.String>`),
//! which is also the form used when matching member references by declaring type name.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A type as it appears in a field, local, parameter or return slot.
///
/// # Examples
///
/// ```rust
/// use cilpatch::metadata::TypeSig;
///
/// let dict = TypeSig::GenericInst {
///     base: Box::new(TypeSig::Class("System.Collections.Generic.Dictionary`2".to_string())),
///     args: vec![TypeSig::String, TypeSig::Class("System.Type".to_string())],
/// };
/// assert_eq!(
///     dict.full_name(),
///     "System.Collections.Generic.Dictionary`2<System.String,System.Type>"
/// );
/// assert_eq!(TypeSig::I4.by_ref().full_name(), "System.Int32&");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeSig {
    /// `System.Void`, only valid as a return type
    Void,
    /// `System.Boolean`
    Boolean,
    /// `System.Char`
    Char,
    /// `System.SByte`
    I1,
    /// `System.Byte`
    U1,
    /// `System.Int16`
    I2,
    /// `System.UInt16`
    U2,
    /// `System.Int32`
    I4,
    /// `System.UInt32`
    U4,
    /// `System.Int64`
    I8,
    /// `System.UInt64`
    U8,
    /// `System.Single`
    R4,
    /// `System.Double`
    R8,
    /// `System.String`
    String,
    /// `System.Object`
    Object,
    /// `System.IntPtr`
    IntPtr,
    /// `System.UIntPtr`
    UIntPtr,
    /// A reference type, by full name
    Class(String),
    /// A value type, by full name
    ValueType(String),
    /// A single dimensional, zero based array
    SzArray(Box<TypeSig>),
    /// A managed pointer (`ref T`)
    ByRef(Box<TypeSig>),
    /// An instantiated generic type
    GenericInst {
        /// The open generic type
        base: Box<TypeSig>,
        /// Type arguments in declaration order
        args: Vec<TypeSig>,
    },
    /// Generic parameter of the declaring type (`!n`)
    Var(u32),
    /// Generic parameter of the method (`!!n`)
    MVar(u32),
}

impl TypeSig {
    /// The full CLR name of this type.
    #[must_use]
    pub fn full_name(&self) -> String {
        match self {
            TypeSig::Void => "System.Void".to_string(),
            TypeSig::Boolean => "System.Boolean".to_string(),
            TypeSig::Char => "System.Char".to_string(),
            TypeSig::I1 => "System.SByte".to_string(),
            TypeSig::U1 => "System.Byte".to_string(),
            TypeSig::I2 => "System.Int16".to_string(),
            TypeSig::U2 => "System.UInt16".to_string(),
            TypeSig::I4 => "System.Int32".to_string(),
            TypeSig::U4 => "System.UInt32".to_string(),
            TypeSig::I8 => "System.Int64".to_string(),
            TypeSig::U8 => "System.UInt64".to_string(),
            TypeSig::R4 => "System.Single".to_string(),
            TypeSig::R8 => "System.Double".to_string(),
            TypeSig::String => "System.String".to_string(),
            TypeSig::Object => "System.Object".to_string(),
            TypeSig::IntPtr => "System.IntPtr".to_string(),
            TypeSig::UIntPtr => "System.UIntPtr".to_string(),
            TypeSig::Class(name) | TypeSig::ValueType(name) => name.clone(),
            TypeSig::SzArray(element) => format!("{}[]", element.full_name()),
            TypeSig::ByRef(element) => format!("{}&", element.full_name()),
            TypeSig::GenericInst { base, args } => {
                let args: Vec<String> = args.iter().map(TypeSig::full_name).collect();
                format!("{}<{}>", base.full_name(), args.join(","))
            }
            TypeSig::Var(index) => format!("!{index}"),
            TypeSig::MVar(index) => format!("!!{index}"),
        }
    }

    /// Returns `true` for `System.Void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, TypeSig::Void)
    }

    /// Returns `true` for managed pointers.
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        matches!(self, TypeSig::ByRef(_))
    }

    /// Wraps this type in a managed pointer.
    #[must_use]
    pub fn by_ref(self) -> TypeSig {
        TypeSig::ByRef(Box::new(self))
    }

    /// Replaces method generic parameters (`!!n`) with `method_args[n]`.
    ///
    /// Parameters without a matching argument are left open.
    #[must_use]
    pub fn instantiate(&self, method_args: &[TypeSig]) -> TypeSig {
        match self {
            TypeSig::MVar(index) => method_args
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeSig::SzArray(element) => TypeSig::SzArray(Box::new(element.instantiate(method_args))),
            TypeSig::ByRef(element) => TypeSig::ByRef(Box::new(element.instantiate(method_args))),
            TypeSig::GenericInst { base, args } => TypeSig::GenericInst {
                base: base.clone(),
                args: args.iter().map(|arg| arg.instantiate(method_args)).collect(),
            },
            _ => self.clone(),
        }
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}

/// The calling convention and shape of a method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSig {
    /// Instance method taking an implicit `this` argument
    pub has_this: bool,
    /// Declared return type
    pub return_type: TypeSig,
    /// Declared parameter types, excluding `this`
    pub parameters: Vec<TypeSig>,
    /// Number of generic parameters declared by the method
    pub generic_parameter_count: u32,
}

impl MethodSig {
    /// Signature of a static method.
    #[must_use]
    pub fn static_method(return_type: TypeSig, parameters: Vec<TypeSig>) -> Self {
        MethodSig {
            has_this: false,
            return_type,
            parameters,
            generic_parameter_count: 0,
        }
    }

    /// Signature of an instance method.
    #[must_use]
    pub fn instance_method(return_type: TypeSig, parameters: Vec<TypeSig>) -> Self {
        MethodSig {
            has_this: true,
            return_type,
            parameters,
            generic_parameter_count: 0,
        }
    }

    /// Marks the signature as declaring `count` generic parameters.
    #[must_use]
    pub fn with_generic_parameters(mut self, count: u32) -> Self {
        self.generic_parameter_count = count;
        self
    }

    /// Number of arguments the method takes, including `this`.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.parameters.len() + usize::from(self.has_this)
    }

    /// Comma separated parameter type names, as used in method full names.
    #[must_use]
    pub fn parameter_list(&self) -> String {
        let names: Vec<String> = self.parameters.iter().map(TypeSig::full_name).collect();
        names.join(",")
    }
}
