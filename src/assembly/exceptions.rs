//! Exception handler representation for editable method bodies.
//!
//! Handler boundaries reference instructions by identity. Ends are exclusive; an end of `None`
//! means the region runs to the end of the method body.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{assembly::list::InstrId, metadata::TypeSig};

bitflags! {
    /// Exception handler flags defining the type of exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause.
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause.
        const FILTER = 0x0001;
        /// A finally clause.
        const FINALLY = 0x0002;
        /// A fault clause (finally that executes only on exception).
        const FAULT = 0x0004;
    }
}

/// A protected region and its handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    /// Kind of clause
    pub flags: ExceptionHandlerFlags,
    /// First instruction of the protected region
    pub try_start: InstrId,
    /// First instruction after the protected region
    pub try_end: Option<InstrId>,
    /// First instruction of the handler
    pub handler_start: InstrId,
    /// First instruction after the handler
    pub handler_end: Option<InstrId>,
    /// First instruction of the filter block, for filter clauses
    pub filter_start: Option<InstrId>,
    /// Caught exception type, for typed clauses
    pub catch_type: Option<TypeSig>,
}

impl ExceptionHandler {
    /// A typed `catch` clause.
    #[must_use]
    pub fn catch(
        catch_type: TypeSig,
        try_start: InstrId,
        try_end: Option<InstrId>,
        handler_start: InstrId,
        handler_end: Option<InstrId>,
    ) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_start,
            try_end,
            handler_start,
            handler_end,
            filter_start: None,
            catch_type: Some(catch_type),
        }
    }

    /// A `finally` clause.
    #[must_use]
    pub fn finally(
        try_start: InstrId,
        try_end: Option<InstrId>,
        handler_start: InstrId,
        handler_end: Option<InstrId>,
    ) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start,
            try_end,
            handler_start,
            handler_end,
            filter_start: None,
            catch_type: None,
        }
    }

    /// Whether the handler is entered with the exception object on the stack.
    #[must_use]
    pub fn pushes_exception(&self) -> bool {
        !self
            .flags
            .intersects(ExceptionHandlerFlags::FINALLY | ExceptionHandlerFlags::FAULT)
    }

    /// All instructions this handler refers to.
    #[must_use]
    pub fn boundaries(&self) -> Vec<InstrId> {
        [
            Some(self.try_start),
            self.try_end,
            Some(self.handler_start),
            self.handler_end,
            self.filter_start,
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}
