//! Justifications: proof edges from an entailed statement to the statements
//! that ground it.
//!
//! The key is the head tuple followed by each tail tuple, all encoded in the
//! relation's primary order. Every justification for a head shares the head's
//! encoding as a key prefix, so they are contiguous in the index.

use crate::codec::KeyBuilder;
use crate::error::{Error, Result};
use crate::key_order::KeyOrder;
use crate::spo::Spo;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Justification {
    pub head: Spo,
    pub tail: Vec<Spo>,
}

impl Justification {
    pub fn new(head: Spo, tail: Vec<Spo>) -> Self {
        Self { head, tail }
    }

    /// Encode the key for a relation in the given mode.
    pub fn encode_key(&self, kb: &mut KeyBuilder, quads: bool) -> Vec<u8> {
        let order = KeyOrder::primary(quads);
        kb.reset();
        order.append_key(kb, &self.head);
        for t in &self.tail {
            order.append_key(kb, t);
        }
        kb.key()
    }

    /// Key prefix shared by every justification of `head`.
    pub fn head_prefix(kb: &mut KeyBuilder, head: &Spo, quads: bool) -> Vec<u8> {
        KeyOrder::primary(quads).encode_key(kb, head)
    }

    pub fn decode_key(key: &[u8], quads: bool) -> Result<Self> {
        let order = KeyOrder::primary(quads);
        let (head, mut off) = order.decode_prefix(key)?;
        let mut tail = Vec::new();
        while off < key.len() {
            let (t, n) = order.decode_prefix(&key[off..])?;
            tail.push(t);
            off += n;
        }
        if tail.is_empty() {
            return Err(Error::invalid_key("justification without a tail"));
        }
        Ok(Self { head, tail })
    }
}

impl fmt::Display for Justification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <=", self.head)?;
        for t in &self.tail {
            write!(f, " {t}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iv::Iv;

    fn t(s: u64, p: u64, o: u64) -> Spo {
        Spo::triple(Iv::uri(s), Iv::uri(p), Iv::uri(o))
    }

    #[test]
    fn test_key_starts_with_head_prefix() {
        let mut kb = KeyBuilder::new();
        let j = Justification::new(t(1, 2, 3), vec![t(4, 5, 6), t(7, 8, 9)]);
        let key = j.encode_key(&mut kb, false);
        let prefix = Justification::head_prefix(&mut kb, &j.head, false);
        assert!(key.starts_with(&prefix));
        assert_eq!(Justification::decode_key(&key, false).unwrap(), j);
    }

    #[test]
    fn test_quad_justification() {
        let mut kb = KeyBuilder::new();
        let head = Spo::quad(Iv::uri(1), Iv::uri(2), Iv::uri(3), Some(Iv::uri(10)));
        let tail = Spo::quad(Iv::uri(4), Iv::uri(5), Iv::uri(6), None);
        let j = Justification::new(head, vec![tail]);
        let key = j.encode_key(&mut kb, true);
        assert_eq!(Justification::decode_key(&key, true).unwrap(), j);
    }

    #[test]
    fn test_head_only_key_is_rejected() {
        let mut kb = KeyBuilder::new();
        let key = Justification::head_prefix(&mut kb, &t(1, 2, 3), false);
        assert!(Justification::decode_key(&key, false).is_err());
    }
}
