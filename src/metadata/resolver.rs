//! Member resolution across modules.
//!
//! A pass describes the helper members it needs logically, by declaring type, name and a few
//! signature discriminators, through a [`MethodQuery`]. The [`AssemblyResolver`] finds the one
//! definition matching the query in a loaded helper module and turns it into a reference
//! interned in the target module's [`ReferenceTable`].
//!
//! Resolution either finds exactly one member or fails: no match and several matches are both
//! reported as errors, never papered over.

use std::{collections::HashMap, fmt, path::Path};

use crate::{
    metadata::{
        members::MethodRef,
        module::{MethodDef, Module},
        references::ReferenceTable,
        signatures::TypeSig,
        token::Token,
    },
    Error, Result,
};

/// Logical description of a method to resolve.
///
/// # Examples
///
/// ```rust
/// use cilpatch::metadata::MethodQuery;
///
/// let query = MethodQuery::new("TeamCherry.SharedUtils.VariableExtensions", "GetVariable")
///     .generic(true)
///     .parameter_count(2);
/// assert_eq!(
///     query.to_string(),
///     "TeamCherry.SharedUtils.VariableExtensions::GetVariable (generic, 2 parameters)"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodQuery {
    /// Full name of the declaring type
    pub type_name: String,
    /// Method name
    pub name: String,
    /// Required number of declared parameters
    pub parameter_count: Option<usize>,
    /// Required genericity of the method
    pub generic: Option<bool>,
    /// Required number of generic parameters
    pub generic_parameters: Option<u32>,
    /// Required parameter types, in order
    pub parameter_types: Option<Vec<TypeSig>>,
    /// Required return type
    pub return_type: Option<TypeSig>,
    /// Required staticness
    pub is_static: Option<bool>,
}

impl MethodQuery {
    /// Matches every method called `name` on `type_name`.
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        MethodQuery {
            type_name: type_name.into(),
            name: name.into(),
            parameter_count: None,
            generic: None,
            generic_parameters: None,
            parameter_types: None,
            return_type: None,
            is_static: None,
        }
    }

    /// Requires `count` declared parameters.
    #[must_use]
    pub fn parameter_count(mut self, count: usize) -> Self {
        self.parameter_count = Some(count);
        self
    }

    /// Requires the method to be (or not be) generic.
    #[must_use]
    pub fn generic(mut self, generic: bool) -> Self {
        self.generic = Some(generic);
        self
    }

    /// Requires exactly `count` generic parameters.
    #[must_use]
    pub fn generic_parameters(mut self, count: u32) -> Self {
        self.generic_parameters = Some(count);
        self
    }

    /// Requires exactly these parameter types.
    #[must_use]
    pub fn parameter_types(mut self, types: Vec<TypeSig>) -> Self {
        self.parameter_types = Some(types);
        self
    }

    /// Requires this return type.
    #[must_use]
    pub fn return_type(mut self, return_type: TypeSig) -> Self {
        self.return_type = Some(return_type);
        self
    }

    /// Requires the method to be (or not be) static.
    #[must_use]
    pub fn is_static(mut self, is_static: bool) -> Self {
        self.is_static = Some(is_static);
        self
    }

    /// Returns `true` if `method` satisfies every discriminator of the query.
    ///
    /// The declaring type is not checked here, see [`MethodQuery::resolve`].
    #[must_use]
    pub fn matches(&self, method: &MethodDef) -> bool {
        let signature = &method.signature;
        method.name == self.name
            && self
                .parameter_count
                .map_or(true, |count| signature.parameters.len() == count)
            && self
                .generic
                .map_or(true, |generic| (signature.generic_parameter_count > 0) == generic)
            && self
                .generic_parameters
                .map_or(true, |count| signature.generic_parameter_count == count)
            && self
                .parameter_types
                .as_ref()
                .map_or(true, |types| signature.parameters == *types)
            && self
                .return_type
                .as_ref()
                .map_or(true, |return_type| signature.return_type == *return_type)
            && self
                .is_static
                .map_or(true, |is_static| method.is_static() == is_static)
    }

    /// Finds the single method of `module` matching the query.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TypeNotFound`] if the declaring type does not exist,
    /// [`crate::Error::MemberNotFound`] if no method matches and
    /// [`crate::Error::AmbiguousMember`] if several do.
    pub fn resolve<'a>(&self, module: &'a Module) -> Result<&'a MethodDef> {
        let ty = module
            .find_type(&self.type_name)
            .ok_or_else(|| Error::TypeNotFound(self.type_name.clone()))?;

        let candidates: Vec<&MethodDef> = ty
            .methods
            .iter()
            .filter_map(|token| module.method_def(*token))
            .filter(|method| self.matches(method))
            .collect();

        match candidates.as_slice() {
            [method] => Ok(method),
            [] => Err(Error::MemberNotFound {
                query: self.to_string(),
                module: module.name.clone(),
            }),
            _ => Err(Error::AmbiguousMember {
                query: self.to_string(),
                module: module.name.clone(),
                count: candidates.len(),
            }),
        }
    }
}

impl fmt::Display for MethodQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.type_name, self.name)?;

        let mut discriminators = Vec::new();
        if let Some(is_static) = self.is_static {
            discriminators.push(if is_static { "static" } else { "instance" }.to_string());
        }
        if let Some(generic) = self.generic {
            discriminators.push(if generic { "generic" } else { "non-generic" }.to_string());
        }
        if let Some(count) = self.generic_parameters {
            discriminators.push(format!("{count} generic parameters"));
        }
        if let Some(count) = self.parameter_count {
            discriminators.push(format!("{count} parameters"));
        }
        if let Some(types) = &self.parameter_types {
            let names: Vec<String> = types.iter().map(TypeSig::full_name).collect();
            discriminators.push(format!("({})", names.join(",")));
        }
        if let Some(return_type) = &self.return_type {
            discriminators.push(format!("returns {return_type}"));
        }

        if !discriminators.is_empty() {
            write!(f, " ({})", discriminators.join(", "))?;
        }
        Ok(())
    }
}

/// The set of helper modules a patch run may resolve members from.
#[derive(Debug, Default)]
pub struct AssemblyResolver {
    modules: HashMap<String, Module>,
}

fn module_key(name: &str) -> &str {
    name.strip_suffix(".dll").unwrap_or(name)
}

impl AssemblyResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `module` available for resolution, replacing a module of the same name.
    pub fn add(&mut self, module: Module) {
        if let Some(previous) = self.modules.insert(module.name.clone(), module) {
            log::debug!("Replacing helper module {}", previous.name);
        }
    }

    /// Builder form of [`AssemblyResolver::add`].
    #[must_use]
    pub fn with_module(mut self, module: Module) -> Self {
        self.add(module);
        self
    }

    /// Loads a helper module from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Module::load`].
    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        let module = Module::load(path)?;
        log::debug!("Loaded helper module {} from {}", module.name, path.display());
        self.add(module);
        Ok(())
    }

    /// Number of helper modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if no helper module is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// The helper module called `name`; a trailing `.dll` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ModuleNotFound`] if no such module is loaded.
    pub fn module(&self, name: &str) -> Result<&Module> {
        self.modules
            .get(module_key(name))
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }

    /// Resolves `query` in module `module_name` to a method reference.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ModuleNotFound`] and the errors of [`MethodQuery::resolve`].
    pub fn resolve_method(&self, module_name: &str, query: &MethodQuery) -> Result<MethodRef> {
        let module = self.module(module_name)?;
        let method = query.resolve(module)?;
        Ok(module.method_ref(method))
    }

    /// Resolves `query` and interns the result into `target`.
    ///
    /// # Errors
    ///
    /// See [`AssemblyResolver::resolve_method`].
    pub fn import_method(
        &self,
        target: &mut ReferenceTable,
        module_name: &str,
        query: &MethodQuery,
    ) -> Result<Token> {
        Ok(target.import(self.resolve_method(module_name, query)?))
    }
}
