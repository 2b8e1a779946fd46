//! Module-local table of imported member references.
//!
//! Every method or field operand of an instruction is a [`Token`] into the owning module's
//! [`ReferenceTable`]. Importing the same logical member twice yields the same token, so
//! rewrites that emit many calls to one accessor share a single row.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    metadata::{
        members::{FieldRef, MemberRef, MethodRef},
        token::{TableId, Token},
    },
    Error, Result,
};

/// Interned member references of one module.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    entries: Vec<MemberRef>,
    lookup: HashMap<MemberRef, Token>,
}

impl ReferenceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of interned references.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been imported yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Interns `member` and returns its token.
    ///
    /// Generic method instantiations live in the `MethodSpec` table, everything else in
    /// `MemberRef`. A structurally identical member that was imported before keeps its token.
    pub fn import(&mut self, member: impl Into<MemberRef>) -> Token {
        let member = member.into();
        if let Some(token) = self.lookup.get(&member) {
            return *token;
        }

        let token = Token::from_index(table_of(&member), self.entries.len());

        self.entries.push(member.clone());
        self.lookup.insert(member, token);
        token
    }

    /// Returns the token of `member` if it was imported.
    #[must_use]
    pub fn find(&self, member: &MemberRef) -> Option<Token> {
        self.lookup.get(member).copied()
    }

    /// Looks up the reference behind `token`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnresolvedToken`] if the token does not name a row of this
    /// table.
    pub fn get(&self, token: Token) -> Result<&MemberRef> {
        if !token.is_table(TableId::MemberRef) && !token.is_table(TableId::MethodSpec) {
            return Err(Error::UnresolvedToken(token));
        }

        token
            .index()
            .and_then(|index| self.entries.get(index))
            .ok_or(Error::UnresolvedToken(token))
    }

    /// Looks up the method reference behind `token`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown or names a field.
    pub fn method(&self, token: Token) -> Result<&MethodRef> {
        match self.get(token)? {
            MemberRef::Method(method) => Ok(method),
            MemberRef::Field(_) => Err(Error::UnresolvedToken(token)),
        }
    }

    /// Looks up the field reference behind `token`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnresolvedToken`] if the token is unknown or names a method.
    pub fn field(&self, token: Token) -> Result<&FieldRef> {
        match self.get(token)? {
            MemberRef::Field(field) => Ok(field),
            MemberRef::Method(_) => Err(Error::UnresolvedToken(token)),
        }
    }

    /// Iterates over all references with their tokens, in import order.
    pub fn iter(&self) -> impl Iterator<Item = (Token, &MemberRef)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, member)| (Token::from_index(table_of(member), index), member))
    }
}

fn table_of(member: &MemberRef) -> TableId {
    match member {
        MemberRef::Method(method) if method.is_generic_instantiation() => TableId::MethodSpec,
        _ => TableId::MemberRef,
    }
}

impl From<Vec<MemberRef>> for ReferenceTable {
    fn from(entries: Vec<MemberRef>) -> Self {
        let mut table = ReferenceTable::new();
        for member in entries {
            let before = table.len();
            table.import(member);
            if table.len() == before {
                log::warn!("Duplicate member reference dropped while loading reference table");
            }
        }
        table
    }
}

impl Serialize for ReferenceTable {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ReferenceTable {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let entries = Vec::<MemberRef>::deserialize(deserializer)?;
        Ok(ReferenceTable::from(entries))
    }
}
