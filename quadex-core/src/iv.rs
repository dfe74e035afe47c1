//! Internal values (identifiers) stored in statement keys.
//!
//! An [`Iv`] is the internal stand-in for an RDF value. The term dictionary
//! assigns dictionary ids to URIs, literals and blank nodes; small integers
//! and statement identifiers are inlined directly into the key.
//!
//! ## Byte Encoding
//!
//! Every `Iv` has an order-preserving, prefix-free byte encoding. Byte-wise
//! comparison of two encodings agrees with the derived `Ord` on `Iv`:
//!
//! | Flag | Variant | Payload |
//! |------|---------|---------|
//! | `0x11` | URI term | 8-byte big-endian id |
//! | `0x12` | blank node term | 8-byte big-endian id |
//! | `0x13` | literal term | 8-byte big-endian id |
//! | `0x20` | inline integer | 8-byte big-endian, sign bit flipped |
//! | `0x30` | statement identifier | nested encodings of s, p, o |
//!
//! The absent context of a quad is encoded as the single byte `0x00`; see
//! [`crate::codec`].

use crate::error::{Error, Result};
use crate::spo::Spo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Flag byte for an absent (null) context.
pub const NULL_FLAG: u8 = 0x00;
const URI_FLAG: u8 = 0x11;
const BNODE_FLAG: u8 = 0x12;
const LITERAL_FLAG: u8 = 0x13;
const INT_FLAG: u8 = 0x20;
const SID_FLAG: u8 = 0x30;

const SIGN_BIT: u64 = 1 << 63;

/// Kind of dictionary term.
///
/// Declaration order is the sort order and must match the flag bytes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TermKind {
    Uri,
    BNode,
    Literal,
}

impl TermKind {
    fn flag(self) -> u8 {
        match self {
            TermKind::Uri => URI_FLAG,
            TermKind::BNode => BNODE_FLAG,
            TermKind::Literal => LITERAL_FLAG,
        }
    }

    fn suffix(self) -> char {
        match self {
            TermKind::Uri => 'U',
            TermKind::BNode => 'B',
            TermKind::Literal => 'L',
        }
    }
}

/// Dictionary-assigned term reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TermId {
    pub kind: TermKind,
    pub id: u64,
}

impl TermId {
    #[inline]
    pub fn new(kind: TermKind, id: u64) -> Self {
        Self { kind, id }
    }
}

/// An internal value.
///
/// Variant declaration order is the sort order and must match the flag bytes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Iv {
    /// Dictionary term (URI, blank node or literal)
    Term(TermId),
    /// Inline signed integer
    Int(i64),
    /// Inline statement identifier naming a (s, p, o) tuple
    Sid(Arc<Spo>),
}

impl Iv {
    /// URI term with the given dictionary id
    #[inline]
    pub fn uri(id: u64) -> Self {
        Iv::Term(TermId::new(TermKind::Uri, id))
    }

    /// Blank node term with the given dictionary id
    #[inline]
    pub fn bnode(id: u64) -> Self {
        Iv::Term(TermId::new(TermKind::BNode, id))
    }

    /// Literal term with the given dictionary id
    #[inline]
    pub fn literal(id: u64) -> Self {
        Iv::Term(TermId::new(TermKind::Literal, id))
    }

    /// Inline integer
    #[inline]
    pub fn int(v: i64) -> Self {
        Iv::Int(v)
    }

    /// Inline statement identifier for a triple.
    ///
    /// Any context on `spo` is dropped: statement identifiers name triples.
    pub fn sid(spo: Spo) -> Self {
        Iv::Sid(Arc::new(spo.without_context()))
    }

    /// The tuple inlined by a statement identifier, if this is one.
    pub fn as_sid(&self) -> Option<&Spo> {
        match self {
            Iv::Sid(spo) => Some(spo),
            _ => None,
        }
    }

    #[inline]
    pub fn is_sid(&self) -> bool {
        matches!(self, Iv::Sid(_))
    }

    /// Number of bytes `encode_into` appends.
    pub fn encoded_len(&self) -> usize {
        match self {
            Iv::Term(_) | Iv::Int(_) => 9,
            Iv::Sid(spo) => 1 + spo.s.encoded_len() + spo.p.encoded_len() + spo.o.encoded_len(),
        }
    }

    /// Append the order-preserving encoding of this value to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Iv::Term(t) => {
                buf.push(t.kind.flag());
                buf.extend_from_slice(&t.id.to_be_bytes());
            }
            Iv::Int(v) => {
                buf.push(INT_FLAG);
                buf.extend_from_slice(&((*v as u64) ^ SIGN_BIT).to_be_bytes());
            }
            Iv::Sid(spo) => {
                buf.push(SID_FLAG);
                spo.s.encode_into(buf);
                spo.p.encode_into(buf);
                spo.o.encode_into(buf);
            }
        }
    }

    /// Decode one value from the front of `bytes`.
    ///
    /// Returns the value and the number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Iv, usize)> {
        let (&flag, rest) = bytes
            .split_first()
            .ok_or_else(|| Error::invalid_key("unexpected end of key"))?;
        match flag {
            URI_FLAG | BNODE_FLAG | LITERAL_FLAG => {
                let id = read_u64(rest)?;
                let kind = match flag {
                    URI_FLAG => TermKind::Uri,
                    BNODE_FLAG => TermKind::BNode,
                    _ => TermKind::Literal,
                };
                Ok((Iv::Term(TermId::new(kind, id)), 9))
            }
            INT_FLAG => {
                let raw = read_u64(rest)?;
                Ok((Iv::Int((raw ^ SIGN_BIT) as i64), 9))
            }
            SID_FLAG => {
                let (s, a) = Iv::decode(rest)?;
                let (p, b) = Iv::decode(&rest[a..])?;
                let (o, c) = Iv::decode(&rest[a + b..])?;
                Ok((Iv::Sid(Arc::new(Spo::triple(s, p, o))), 1 + a + b + c))
            }
            NULL_FLAG => Err(Error::invalid_key("null value where a bound value is required")),
            other => Err(Error::invalid_key(format!("unknown value flag 0x{other:02x}"))),
        }
    }
}

fn read_u64(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::invalid_key("truncated value payload"))?;
    Ok(u64::from_be_bytes(arr))
}

impl fmt::Display for Iv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Iv::Term(t) => write!(f, "{}{}", t.id, t.kind.suffix()),
            Iv::Int(v) => write!(f, "{v}i"),
            Iv::Sid(spo) => write!(f, "<<{} {} {}>>", spo.s, spo.p, spo.o),
        }
    }
}

impl From<TermId> for Iv {
    fn from(t: TermId) -> Self {
        Iv::Term(t)
    }
}
