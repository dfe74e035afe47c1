//! Statement kinds, records and the packed value byte.
//!
//! ## Value Layout (1 byte)
//!
//! ```text
//! bits 0..2  kind code (Explicit=0, Axiom=1, Inferred=2, History=3)
//! bit  2     user flag
//! bit  3     statement identifier flag
//! ```
//!
//! The override flag is a per-call instruction and is never persisted.

use crate::error::{Error, Result};
use crate::spo::Spo;
use serde::{Deserialize, Serialize};
use std::fmt;

const KIND_MASK: u8 = 0b0000_0011;
const USER_FLAG: u8 = 0b0000_0100;
const SID_FLAG: u8 = 0b0000_1000;
const KNOWN_BITS: u8 = KIND_MASK | USER_FLAG | SID_FLAG;

/// How a statement came to be in the store.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    Explicit,
    Axiom,
    Inferred,
    /// Soft-delete marker, written by deletes when history is retained
    History,
}

impl StatementKind {
    /// Persisted code
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            StatementKind::Explicit => 0,
            StatementKind::Axiom => 1,
            StatementKind::Inferred => 2,
            StatementKind::History => 3,
        }
    }

    #[inline]
    pub fn from_code(code: u8) -> Self {
        match code & KIND_MASK {
            0 => StatementKind::Explicit,
            1 => StatementKind::Axiom,
            2 => StatementKind::Inferred,
            _ => StatementKind::History,
        }
    }

    /// Rank used when two live kinds are merged without override.
    fn strength(self) -> u8 {
        match self {
            StatementKind::Explicit => 3,
            StatementKind::Axiom => 2,
            StatementKind::Inferred => 1,
            StatementKind::History => 0,
        }
    }

    /// The stronger of two kinds (Explicit > Axiom > Inferred).
    pub fn max(self, other: Self) -> Self {
        if other.strength() > self.strength() {
            other
        } else {
            self
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StatementKind::Explicit => "Explicit",
            StatementKind::Axiom => "Axiom",
            StatementKind::Inferred => "Inferred",
            StatementKind::History => "History",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the last mutation call did to a record in the primary index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Modified {
    #[default]
    None,
    Inserted,
    Updated,
    Removed,
}

impl Modified {
    #[inline]
    pub fn is_modified(self) -> bool {
        self != Modified::None
    }
}

/// Decoded form of the packed value byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StatementValue {
    pub kind: StatementKind,
    pub user_flag: bool,
    pub statement_identifier: bool,
}

impl StatementValue {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            user_flag: false,
            statement_identifier: false,
        }
    }

    pub fn encode(self) -> u8 {
        let mut b = self.kind.code();
        if self.user_flag {
            b |= USER_FLAG;
        }
        if self.statement_identifier {
            b |= SID_FLAG;
        }
        b
    }

    pub fn decode(b: u8) -> Result<Self> {
        if b & !KNOWN_BITS != 0 {
            return Err(Error::invalid_value(format!("unknown bits in 0x{b:02x}")));
        }
        Ok(Self {
            kind: StatementKind::from_code(b),
            user_flag: b & USER_FLAG != 0,
            statement_identifier: b & SID_FLAG != 0,
        })
    }

    /// Decode a stored index value, which must be exactly one byte.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        match bytes {
            [b] => Self::decode(*b),
            _ => Err(Error::invalid_value(format!(
                "expected 1 value byte, found {}",
                bytes.len()
            ))),
        }
    }
}

/// A statement handed to, or returned from, the relation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StatementRecord {
    pub spo: Spo,
    pub kind: StatementKind,
    /// Replace the stored kind even when it is stronger
    pub override_kind: bool,
    pub user_flag: bool,
    /// This statement is named by an inline statement identifier
    pub statement_identifier: bool,
    modified: Modified,
}

impl StatementRecord {
    pub fn new(spo: Spo, kind: StatementKind) -> Self {
        Self {
            spo,
            kind,
            override_kind: false,
            user_flag: false,
            statement_identifier: false,
            modified: Modified::None,
        }
    }

    pub fn explicit(spo: Spo) -> Self {
        Self::new(spo, StatementKind::Explicit)
    }

    pub fn inferred(spo: Spo) -> Self {
        Self::new(spo, StatementKind::Inferred)
    }

    pub fn axiom(spo: Spo) -> Self {
        Self::new(spo, StatementKind::Axiom)
    }

    /// Rebuild a record from a stored tuple and its value.
    pub fn from_stored(spo: Spo, value: StatementValue) -> Self {
        Self {
            spo,
            kind: value.kind,
            override_kind: false,
            user_flag: value.user_flag,
            statement_identifier: value.statement_identifier,
            modified: Modified::None,
        }
    }

    pub fn with_override(mut self, override_kind: bool) -> Self {
        self.override_kind = override_kind;
        self
    }

    pub fn with_user_flag(mut self, user_flag: bool) -> Self {
        self.user_flag = user_flag;
        self
    }

    pub fn with_statement_identifier(mut self, sid: bool) -> Self {
        self.statement_identifier = sid;
        self
    }

    pub fn value(&self) -> StatementValue {
        StatementValue {
            kind: self.kind,
            user_flag: self.user_flag,
            statement_identifier: self.statement_identifier,
        }
    }

    #[inline]
    pub fn modified(&self) -> Modified {
        self.modified
    }

    #[inline]
    pub fn is_modified(&self) -> bool {
        self.modified.is_modified()
    }

    #[inline]
    pub fn set_modified(&mut self, modified: Modified) {
        self.modified = modified;
    }

    /// Decide what, if anything, writing this record over `existing` stores.
    ///
    /// Returns the value byte to write and how the record was modified, or
    /// `None` when the stored state stays as it is.
    ///
    /// - absent: insert (a History record over an absent tuple is a no-op)
    /// - History over a live kind: retire it, keeping its flags
    /// - live kind over History: resurrect with the incoming value
    /// - override: write whenever the value differs
    /// - otherwise: keep the stronger kind and OR the flags
    pub fn resolve_write(&self, existing: Option<u8>) -> Result<Option<(u8, Modified)>> {
        let incoming = self.value();
        let Some(old_byte) = existing else {
            if self.kind == StatementKind::History {
                return Ok(None);
            }
            return Ok(Some((incoming.encode(), Modified::Inserted)));
        };
        let old = StatementValue::decode(old_byte)?;

        let next = if self.kind == StatementKind::History {
            if old.kind == StatementKind::History {
                return Ok(None);
            }
            StatementValue {
                kind: StatementKind::History,
                ..old
            }
        } else if old.kind == StatementKind::History || self.override_kind {
            incoming
        } else {
            StatementValue {
                kind: old.kind.max(incoming.kind),
                user_flag: old.user_flag || incoming.user_flag,
                statement_identifier: old.statement_identifier || incoming.statement_identifier,
            }
        };

        let next_byte = next.encode();
        if next_byte == old_byte {
            Ok(None)
        } else {
            Ok(Some((next_byte, Modified::Updated)))
        }
    }
}

impl fmt::Display for StatementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.spo, self.kind)?;
        if self.user_flag {
            write!(f, " [user]")?;
        }
        if self.statement_identifier {
            write!(f, " [sid]")?;
        }
        Ok(())
    }
}
