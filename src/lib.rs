// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # cilpatch
//!
//! Static rewriting of CIL method bodies, applied to .NET assemblies before the host process
//! loads them.
//!
//! `cilpatch` recognizes instruction patterns in method bodies (calls to a given member, loads,
//! stores and address-of operations on the fields of a tracked type) and replaces them with
//! longer instruction sequences, without breaking branch targets, exception handler ranges or
//! the evaluation stack. On top of this engine it ships the passes of a complete prepatcher:
//!
//! - **Call redirection** - route reflective calls such as `Assembly::GetTypes` to safe helpers
//! - **By-name field access** - turn every direct field access on a tracked data type into a
//!   call to a by-name accessor, so observers can intercept reads and writes
//! - **Patch cache** - remember which methods were rewritten so later runs replay only those
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cilpatch::prelude::*;
//! use std::path::Path;
//!
//! let mut module = Module::load(Path::new("Assembly-CSharp.json"))?;
//! let resolver = AssemblyResolver::new();
//! let config = PatcherConfig::default();
//! let env = PatchEnvironment::new(&config, &resolver)
//!     .with_target_path(Path::new("Managed/Assembly-CSharp.dll"));
//!
//! let registry = PatcherRegistry::standard();
//! for (name, report) in registry.patch(&mut module, &env)? {
//!     println!("{name}: {} accesses replaced", report.replaced);
//! }
//! module.save(Path::new("Assembly-CSharp.patched.json"))?;
//! # Ok::<(), cilpatch::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`assembly`] - Editable method bodies: opcodes, the instruction list, stack analysis and
//!   the normalizer
//! - [`metadata`] - The module model, member references, the enumerator and member resolution
//! - [`patching`] - The rewrite engine, the concrete passes, the patch cache and the registry
//! - [`Error`] and [`Result`] - Error handling
//!
//! Every edit follows the same discipline: the body is expanded into its explicit form, the
//! instructions are walked back to front, the first instruction of every match is overwritten
//! in place and the rest of the replacement is inserted after it, and the body is compacted
//! again. Instructions are arena nodes with stable handles, so branch targets and handler
//! boundaries never move.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use cilpatch::prelude::*;
///
/// let module = Module::new("Assembly-CSharp");
/// assert_eq!(module.all_types().count(), 0);
/// ```
pub mod prelude;

/// Editable CIL method bodies.
///
/// See the module documentation for the instruction model and the normalizer.
pub mod assembly;

/// In-memory module model, member references and member resolution.
pub mod metadata;

/// Rewrite engine, patch passes, patch cache and orchestration.
pub mod patching;

/// `cilpatch` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `cilpatch` Error type
///
/// # Examples
///
/// ```rust,no_run
/// use cilpatch::{metadata::Module, Error};
/// use std::path::Path;
///
/// match Module::load(Path::new("Assembly-CSharp.json")) {
///     Ok(module) => println!("Loaded {}", module.name),
///     Err(Error::Json(e)) => println!("Not a module file: {}", e),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;
