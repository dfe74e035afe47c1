//! # Quadex Core
//!
//! Pure data layer for RDF statement indices.
//!
//! This crate provides:
//! - Internal values (`Iv`) with an order-preserving byte encoding
//! - Statement tuples (`Spo`), access patterns (`SpoPattern`) and object ranges
//! - Statement kinds, records and the packed one-byte value
//! - Key orders for triples (SPO, POS, OSP) and quads (SPOC, POCS, OCSP, CSPO, PCSO, SOPC)
//! - Justification keys
//!
//! ## Design Principles
//!
//! 1. **No I/O**: Everything here is pure encoding, decoding and comparison
//! 2. **Byte order is value order**: Every key compares byte-wise exactly as
//!    its tuple compares under the key order's comparator
//! 3. **Canonical decode**: Any key order decodes back to `(s, p, o, c)`

pub mod codec;
pub mod error;
pub mod iv;
pub mod justification;
pub mod key_order;
pub mod spo;
pub mod statement;

pub use codec::{successor, KeyBuilder};
pub use error::{Error, Result};
pub use iv::{Iv, TermId, TermKind};
pub use justification::Justification;
pub use key_order::KeyOrder;
pub use spo::{ObjectRange, Position, Slot, Spo, SpoPattern};
pub use statement::{Modified, StatementKind, StatementRecord, StatementValue};
