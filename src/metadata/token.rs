//! Metadata tokens identifying definitions and references inside a [`crate::metadata::Module`].
//!
//! Tokens follow the ECMA-335 layout: the high byte selects the table and the low 24 bits
//! hold the 1-based row. Only the tables the patcher works with are named in [`TableId`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// The metadata tables a [`Token`] can point into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TableId {
    /// Type definitions owned by the module
    TypeDef = 0x02,
    /// Field definitions owned by the module
    Field = 0x04,
    /// Method definitions owned by the module
    MethodDef = 0x06,
    /// Imported method and field references
    MemberRef = 0x0A,
    /// Generic method instantiations
    MethodSpec = 0x2B,
}

impl TableId {
    /// Maps the raw table byte of a token back to a [`TableId`].
    #[must_use]
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x02 => Some(TableId::TypeDef),
            0x04 => Some(TableId::Field),
            0x06 => Some(TableId::MethodDef),
            0x0A => Some(TableId::MemberRef),
            0x2B => Some(TableId::MethodSpec),
            _ => None,
        }
    }
}

/// A metadata token representing a reference to a metadata table entry.
///
/// Tokens in .NET metadata consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type
/// - The low 24 bits (bits 0-23) indicate the row index within that table
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token for `row` (1-based) of `table`.
    #[must_use]
    pub fn from_parts(table: TableId, row: u32) -> Self {
        Token((u32::from(table as u8) << 24) | (row & 0x00FF_FFFF))
    }

    /// Creates a token for the entry stored at `index` (0-based) of `table`.
    ///
    /// Rows are limited to 24 bits; larger indices wrap, which no module built by this crate
    /// reaches.
    #[must_use]
    pub fn from_index(table: TableId, index: usize) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        Self::from_parts(table, (index as u32).wrapping_add(1))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the table this token points into, if it is one of the known tables.
    #[must_use]
    pub fn table_id(&self) -> Option<TableId> {
        TableId::from_byte(self.table())
    }

    /// Returns `true` if the token points into `table`.
    #[must_use]
    pub fn is_table(&self, table: TableId) -> bool {
        self.table() == table as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Converts the 1-based row into a 0-based storage index.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.row().checked_sub(1).map(|row| row as usize)
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
