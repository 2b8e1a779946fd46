//! # cilpatch Prelude
//!
//! The types needed to load a module, run patch passes over it and inspect the result.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all cilpatch operations
pub use crate::Error;

/// The result type used throughout cilpatch
pub use crate::Result;

// ================================================================================================
// Module Model
// ================================================================================================

/// Module model and member references
pub use crate::metadata::{
    AssemblyResolver, FieldRef, MethodDef, MethodQuery, MethodRef, MethodSig, Module,
    ReferenceTable, Token, TypeDef, TypeSig,
};

// ================================================================================================
// Method Bodies
// ================================================================================================

/// Instruction model and normalization
pub use crate::assembly::{
    compact, expand, InstrId, Instruction, InstructionList, MethodBody, OpCode, Operand,
};

// ================================================================================================
// Patching
// ================================================================================================

/// Rewrite engine
pub use crate::patching::{rewrite_method, Replacement, RewriteContext, RewriteRule, RewriteStats};

/// Passes, cache and orchestration
pub use crate::patching::{
    PatchCache, PatchEnvironment, PatchReport, Patcher, PatcherConfig, PatcherRegistry,
};
