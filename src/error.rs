use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The variants fall into a small number of groups, and the group decides how far a failure
/// propagates during a patch run.
///
/// # Error Categories
///
/// ## Resolution Errors (fatal for the current assembly pass)
/// - [`Error::ModuleNotFound`] - A reference module needed by a pass is not available
/// - [`Error::TypeNotFound`] - A type required by a pass does not exist in a module
/// - [`Error::MemberNotFound`] - No member matches a lookup description
/// - [`Error::AmbiguousMember`] - More than one member matches a lookup description
/// - [`Error::UnexpectedShape`] - A pass found code it does not know how to patch
///
/// ## Method Body Errors (fatal for the current method only)
/// - [`Error::UnsupportedInstruction`] - The normalizer or stack analysis met an opcode it can not handle
/// - [`Error::InvalidOperand`] - An opcode carries an operand of the wrong kind
/// - [`Error::StackUnderflow`] - An instruction pops more values than are available
/// - [`Error::StackMismatch`] - Two control flow paths reach an instruction with different depths
/// - [`Error::FallThrough`] - Execution can run past the last instruction
/// - [`Error::DanglingReference`] - A branch or handler boundary references a detached instruction
///
/// ## Patch Cache Errors
/// - [`Error::CacheMalformed`] - A cache block is missing its terminator
/// - [`Error::CacheReplay`] - A recorded method could not be patched again
///
/// ## I/O and External Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Json`] - Module (de)serialization errors
///
/// # Examples
///
/// ```rust,no_run
/// use cilpatch::{Error, metadata::Module};
/// use std::path::Path;
///
/// match Module::load(Path::new("Assembly-CSharp.json")) {
///     Ok(module) => println!("Loaded {}", module.name),
///     Err(Error::FileError(io_err)) => eprintln!("I/O error: {}", io_err),
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A structure could not be interpreted.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Module (de)serialization error.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// A reference module required by a pass was not registered.
    #[error("Reference module not found - {0}")]
    ModuleNotFound(String),

    /// A type required by a pass does not exist in the inspected module.
    #[error("Type not found - {0}")]
    TypeNotFound(String),

    /// No member matched a lookup description.
    #[error("No member matches {query} in {module}")]
    MemberNotFound {
        /// Human readable form of the lookup description
        query: String,
        /// The module that was searched
        module: String,
    },

    /// More than one member matched a lookup description.
    #[error("{count} members match {query} in {module}")]
    AmbiguousMember {
        /// Human readable form of the lookup description
        query: String,
        /// The module that was searched
        module: String,
        /// Number of candidates found
        count: usize,
    },

    /// A token does not point at a valid row of the reference table.
    #[error("Unresolved token - {0}")]
    UnresolvedToken(Token),

    /// An instruction shape is not understood by the normalizer or the stack analysis.
    #[error("Unsupported instruction '{0}'")]
    UnsupportedInstruction(&'static str),

    /// An opcode carries an operand of the wrong kind.
    #[error("Invalid operand for '{mnemonic}': expected {expected}")]
    InvalidOperand {
        /// Mnemonic of the offending instruction
        mnemonic: &'static str,
        /// Operand kind that was expected
        expected: &'static str,
    },

    /// An instruction pops more values than the evaluation stack holds.
    #[error("Stack underflow at instruction {position} ('{mnemonic}')")]
    StackUnderflow {
        /// Index of the instruction in the method body
        position: usize,
        /// Mnemonic of the offending instruction
        mnemonic: &'static str,
    },

    /// Two control flow paths reach an instruction with different stack depths.
    #[error("Stack depth mismatch at instruction {position}: {expected} vs {found}")]
    StackMismatch {
        /// Index of the instruction in the method body
        position: usize,
        /// Depth recorded by the first path
        expected: u32,
        /// Depth of the conflicting path
        found: u32,
    },

    /// Control can fall through the end of the method body.
    #[error("Control falls through the end of the method body")]
    FallThrough,

    /// A branch target or exception handler boundary is not part of the method body.
    #[error("Dangling instruction reference - {0}")]
    DanglingReference(String),

    /// A patch cache block was not terminated.
    #[error("Patch cache {path} is malformed at line {line}: {message}")]
    CacheMalformed {
        /// Path of the cache file
        path: String,
        /// 1-based line number where the problem was detected
        line: usize,
        /// Description of the problem
        message: String,
    },

    /// A method recorded in the patch cache could not be patched again.
    #[error("Failed to replay cached patch of {type_name} {method}")]
    CacheReplay {
        /// Full name of the declaring type
        type_name: String,
        /// Full name of the method
        method: String,
    },

    /// The code around a patch site does not have the shape a pass relies on.
    #[error("Unexpected code in {method}: {message}")]
    UnexpectedShape {
        /// Full name of the inspected method
        method: String,
        /// What was expected
        message: String,
    },
}

impl Error {
    /// Returns `true` if this error only invalidates the method being rewritten.
    ///
    /// Method scoped errors leave the method unmodified and the pass continues with the next
    /// method. Every other error aborts the pass for the whole assembly.
    #[must_use]
    pub fn is_method_scoped(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedInstruction(_)
                | Error::InvalidOperand { .. }
                | Error::StackUnderflow { .. }
                | Error::StackMismatch { .. }
                | Error::FallThrough
                | Error::DanglingReference(_)
                | Error::Malformed { .. }
        )
    }
}
