//! Module model, member references and member resolution.
//!
//! Parsing the binary container of an assembly is not part of this crate; a module arrives
//! here already decoded (see [`Module::load`]) and this module holds the in-memory model the
//! rewriting passes operate on.
//!
//! # Key Components
//!
//! - [`Module`] - Type, field and method definitions plus the reference table
//! - [`token`] - Metadata tokens identifying definitions and references
//! - [`TypeSig`] / [`MethodSig`] - Type and method signatures
//! - [`MethodRef`] / [`FieldRef`] - Structural member references used as operands
//! - [`ReferenceTable`] - Module-local interning of imported references
//! - [`Module::all_types`] / [`Module::all_methods`] - Flattened traversal including nested types
//! - [`MethodQuery`] / [`AssemblyResolver`] - Resolution of helper members across modules
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilpatch::metadata::Module;
//! use std::path::Path;
//!
//! let module = Module::load(Path::new("Assembly-CSharp.json"))?;
//! for ty in module.all_types() {
//!     println!("{} ({} methods)", module.type_full_name(ty), ty.methods.len());
//! }
//! # Ok::<(), cilpatch::Error>(())
//! ```

mod enumerate;
mod members;
mod module;
mod references;
mod resolver;
mod signatures;
/// Metadata tokens
pub mod token;

pub use enumerate::{MethodDefinitions, TypeDefinitions};
pub use members::{FieldRef, MemberRef, MethodRef};
pub use module::{
    FieldAttributes, FieldDef, MethodAttributes, MethodDef, Module, TypeAttributes, TypeDef,
    NON_SERIALIZED_ATTRIBUTE,
};
pub use references::ReferenceTable;
pub use resolver::{AssemblyResolver, MethodQuery};
pub use signatures::{MethodSig, TypeSig};
pub use token::{TableId, Token};
