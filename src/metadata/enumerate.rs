//! Flattened traversal of the types and methods of a module.
//!
//! Types are visited breadth-first by nesting level: every top-level type in declaration
//! order, then their nested types, and so on. The walk is lazy, deterministic for a given
//! module and can be restarted by calling [`Module::all_types`] again.

use std::collections::VecDeque;

use crate::metadata::module::{MethodDef, Module, TypeDef};

/// Iterator over every type definition of a module, nested types included.
pub struct TypeDefinitions<'a> {
    module: &'a Module,
    pending: VecDeque<&'a TypeDef>,
}

impl<'a> Iterator for TypeDefinitions<'a> {
    type Item = &'a TypeDef;

    fn next(&mut self) -> Option<Self::Item> {
        let ty = self.pending.pop_front()?;
        self.pending.extend(
            ty.nested_types
                .iter()
                .filter_map(|token| self.module.type_def(*token)),
        );
        Some(ty)
    }
}

/// Iterator over every method definition of every type yielded by [`TypeDefinitions`].
pub struct MethodDefinitions<'a> {
    module: &'a Module,
    types: TypeDefinitions<'a>,
    current: std::slice::Iter<'a, crate::metadata::token::Token>,
}

impl<'a> Iterator for MethodDefinitions<'a> {
    type Item = &'a MethodDef;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.current.next() {
                match self.module.method_def(*token) {
                    Some(method) => return Some(method),
                    None => continue,
                }
            }
            self.current = self.types.next()?.methods.iter();
        }
    }
}

impl Module {
    /// Every type of the module, top-level and nested at any depth, each exactly once.
    ///
    /// Interfaces are included; passes that have no use for them filter them out.
    #[must_use]
    pub fn all_types(&self) -> TypeDefinitions<'_> {
        TypeDefinitions {
            module: self,
            pending: self.top_level_types().collect(),
        }
    }

    /// Every method of every type returned by [`Module::all_types`].
    #[must_use]
    pub fn all_methods(&self) -> MethodDefinitions<'_> {
        MethodDefinitions {
            module: self,
            types: self.all_types(),
            current: [].iter(),
        }
    }
}
