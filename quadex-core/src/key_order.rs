//! Key orders for statement indices
//!
//! A relation keeps one sorted index per key order. Each order is a
//! permutation of the tuple slots:
//!
//! | Mode | Order | Slots | Use Case |
//! |------|-------|-------|----------|
//! | triples | SPO | s, p, o | Primary; subject lookups |
//! | triples | POS | p, o, s | Predicate and value lookups |
//! | triples | OSP | o, s, p | Reverse traversal |
//! | quads | SPOC | s, p, o, c | Primary; subject lookups |
//! | quads | POCS | p, o, c, s | Predicate and value lookups |
//! | quads | OCSP | o, c, s, p | Object lookups |
//! | quads | CSPO | c, s, p, o | Graph scans |
//! | quads | PCSO | p, c, s, o | Predicate within a graph |
//! | quads | SOPC | s, o, p, c | Subject-object joins |
//!
//! Keys are the concatenation of per-slot encodings in the order's slot
//! sequence. Decoding always rebuilds the tuple in canonical order.

use crate::codec::{decode_context, successor, KeyBuilder};
use crate::error::{Error, Result};
use crate::iv::Iv;
use crate::spo::{ObjectRange, Position, Slot, Spo, SpoPattern};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use Position::{C, O, P, S};

/// Key order enumeration
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyOrder {
    Spo,
    Pos,
    Osp,
    Spoc,
    Pocs,
    Ocsp,
    Cspo,
    Pcso,
    Sopc,
}

/// Everything that describes one key order.
struct KeyOrderRow {
    name: &'static str,
    slots: &'static [Position],
    primary: bool,
}

const SPO_ROW: KeyOrderRow = KeyOrderRow { name: "SPO", slots: &[S, P, O], primary: true };
const POS_ROW: KeyOrderRow = KeyOrderRow { name: "POS", slots: &[P, O, S], primary: false };
const OSP_ROW: KeyOrderRow = KeyOrderRow { name: "OSP", slots: &[O, S, P], primary: false };
const SPOC_ROW: KeyOrderRow = KeyOrderRow { name: "SPOC", slots: &[S, P, O, C], primary: true };
const POCS_ROW: KeyOrderRow = KeyOrderRow { name: "POCS", slots: &[P, O, C, S], primary: false };
const OCSP_ROW: KeyOrderRow = KeyOrderRow { name: "OCSP", slots: &[O, C, S, P], primary: false };
const CSPO_ROW: KeyOrderRow = KeyOrderRow { name: "CSPO", slots: &[C, S, P, O], primary: false };
const PCSO_ROW: KeyOrderRow = KeyOrderRow { name: "PCSO", slots: &[P, C, S, O], primary: false };
const SOPC_ROW: KeyOrderRow = KeyOrderRow { name: "SOPC", slots: &[S, O, P, C], primary: false };

const TRIPLE_ORDERS: [KeyOrder; 3] = [KeyOrder::Spo, KeyOrder::Pos, KeyOrder::Osp];

const QUAD_ORDERS: [KeyOrder; 6] = [
    KeyOrder::Spoc,
    KeyOrder::Pocs,
    KeyOrder::Ocsp,
    KeyOrder::Cspo,
    KeyOrder::Pcso,
    KeyOrder::Sopc,
];

/// Triple selection, indexed by `s << 2 | p << 1 | o` boundedness.
const TRIPLE_SELECT: [KeyOrder; 8] = [
    KeyOrder::Spo, // ---
    KeyOrder::Osp, // --o
    KeyOrder::Pos, // -p-
    KeyOrder::Pos, // -po
    KeyOrder::Spo, // s--
    KeyOrder::Osp, // s-o
    KeyOrder::Spo, // sp-
    KeyOrder::Spo, // spo
];

/// Quad selection, indexed by `s << 3 | p << 2 | o << 1 | c` boundedness.
const QUAD_SELECT: [KeyOrder; 16] = [
    KeyOrder::Spoc, // ----
    KeyOrder::Cspo, // ---c
    KeyOrder::Ocsp, // --o-
    KeyOrder::Ocsp, // --oc
    KeyOrder::Pocs, // -p--
    KeyOrder::Pcso, // -p-c
    KeyOrder::Pocs, // -po-
    KeyOrder::Pocs, // -poc
    KeyOrder::Spoc, // s---
    KeyOrder::Cspo, // s--c
    KeyOrder::Sopc, // s-o-
    KeyOrder::Ocsp, // s-oc
    KeyOrder::Spoc, // sp--
    KeyOrder::Cspo, // sp-c
    KeyOrder::Spoc, // spo-
    KeyOrder::Spoc, // spoc
];

impl KeyOrder {
    fn row(self) -> &'static KeyOrderRow {
        match self {
            KeyOrder::Spo => &SPO_ROW,
            KeyOrder::Pos => &POS_ROW,
            KeyOrder::Osp => &OSP_ROW,
            KeyOrder::Spoc => &SPOC_ROW,
            KeyOrder::Pocs => &POCS_ROW,
            KeyOrder::Ocsp => &OCSP_ROW,
            KeyOrder::Cspo => &CSPO_ROW,
            KeyOrder::Pcso => &PCSO_ROW,
            KeyOrder::Sopc => &SOPC_ROW,
        }
    }

    /// Every key order, triples first
    pub fn all() -> &'static [KeyOrder] {
        &[
            KeyOrder::Spo,
            KeyOrder::Pos,
            KeyOrder::Osp,
            KeyOrder::Spoc,
            KeyOrder::Pocs,
            KeyOrder::Ocsp,
            KeyOrder::Cspo,
            KeyOrder::Pcso,
            KeyOrder::Sopc,
        ]
    }

    /// The key orders of a triple or quad relation, primary first
    pub fn orders(quads: bool) -> &'static [KeyOrder] {
        if quads {
            &QUAD_ORDERS
        } else {
            &TRIPLE_ORDERS
        }
    }

    /// The natural order of a triple or quad relation
    pub fn primary(quads: bool) -> KeyOrder {
        if quads {
            KeyOrder::Spoc
        } else {
            KeyOrder::Spo
        }
    }

    #[inline]
    pub fn name(self) -> &'static str {
        self.row().name
    }

    /// Slots in key order
    #[inline]
    pub fn slots(self) -> &'static [Position] {
        self.row().slots
    }

    /// Number of slots in the key (3 or 4)
    #[inline]
    pub fn arity(self) -> usize {
        self.row().slots.len()
    }

    #[inline]
    pub fn is_quad(self) -> bool {
        self.arity() == 4
    }

    #[inline]
    pub fn is_primary(self) -> bool {
        self.row().primary
    }

    /// Index of `pos` within this order's key, if it participates
    pub fn key_index(self, pos: Position) -> Option<usize> {
        self.slots().iter().position(|&p| p == pos)
    }

    /// Fail unless this order belongs to a relation in the given mode.
    pub fn ensure_mode(self, quads: bool) -> Result<()> {
        if self.is_quad() == quads {
            Ok(())
        } else {
            Err(Error::incompatible(format!(
                "key order {} on a {} relation",
                self,
                if quads { "quad" } else { "triple" }
            )))
        }
    }

    /// Compare two tuples in this index's ordering
    pub fn compare(self, a: &Spo, b: &Spo) -> Ordering {
        for &pos in self.slots() {
            let ord = a.get(pos).cmp(&b.get(pos));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Select the cheapest order for a pattern.
    ///
    /// The bound slots of the pattern always form a prefix of the selected
    /// order's key, except for the fallbacks to the primary order. Context is
    /// ignored for triples.
    pub fn select(pattern: &SpoPattern, quads: bool) -> KeyOrder {
        let bit = |slot: &Slot| slot.is_bound() as usize;
        if quads {
            QUAD_SELECT[bit(&pattern.s) << 3
                | bit(&pattern.p) << 2
                | bit(&pattern.o) << 1
                | bit(&pattern.c)]
        } else {
            TRIPLE_SELECT[bit(&pattern.s) << 2 | bit(&pattern.p) << 1 | bit(&pattern.o)]
        }
    }

    /// Like [`KeyOrder::select`], but a fully bound pattern may use `hint`.
    ///
    /// Any order can answer a point lookup, so the hint keeps the lookup on
    /// the index the surrounding query is already reading. The hint is
    /// ignored when it does not belong to the relation's mode.
    pub fn select_with_hint(pattern: &SpoPattern, quads: bool, hint: Option<KeyOrder>) -> KeyOrder {
        match hint {
            Some(h) if h.is_quad() == quads && pattern.is_fully_bound(quads) => h,
            _ => Self::select(pattern, quads),
        }
    }

    /// Append the full key of `spo` to `kb` without resetting it.
    pub fn append_key(self, kb: &mut KeyBuilder, spo: &Spo) {
        for &pos in self.slots() {
            match pos {
                S => kb.append(&spo.s),
                P => kb.append(&spo.p),
                O => kb.append(&spo.o),
                C => kb.append_context(spo.c.as_ref()),
            };
        }
    }

    /// Encode the full key of `spo`.
    pub fn encode_key(self, kb: &mut KeyBuilder, spo: &Spo) -> Vec<u8> {
        kb.reset();
        self.append_key(kb, spo);
        kb.key()
    }

    /// Decode a full key back into a canonical tuple.
    pub fn decode_key(self, key: &[u8]) -> Result<Spo> {
        let (spo, used) = self.decode_prefix(key)?;
        if used != key.len() {
            return Err(Error::invalid_key(format!(
                "{} trailing bytes after {} key",
                key.len() - used,
                self
            )));
        }
        Ok(spo)
    }

    /// Decode one key from the front of `bytes`, returning the bytes used.
    pub fn decode_prefix(self, bytes: &[u8]) -> Result<(Spo, usize)> {
        let mut slots: [Option<Iv>; 4] = [None, None, None, None];
        let mut off = 0;
        for &pos in self.slots() {
            let rest = &bytes[off..];
            let (iv, n) = match pos {
                C => decode_context(rest)?,
                _ => {
                    let (iv, n) = Iv::decode(rest)?;
                    (Some(iv), n)
                }
            };
            slots[pos.index()] = iv;
            off += n;
        }
        let [s, p, o, c] = slots;
        let spo = Spo::from_slots(s, p, o, c).map_err(|e| Error::invalid_key(e.to_string()))?;
        Ok((spo, off))
    }

    /// Decode only the leading key component.
    ///
    /// Returns `None` for an absent context and the number of bytes used.
    pub fn decode_first(self, key: &[u8]) -> Result<(Option<Iv>, usize)> {
        match self.slots()[0] {
            C => decode_context(key),
            _ => Iv::decode(key).map(|(iv, n)| (Some(iv), n)),
        }
    }

    /// Append the bound prefix of `pattern`, optionally closing with an
    /// object range bound. Returns whether anything was appended.
    fn append_prefix(
        self,
        kb: &mut KeyBuilder,
        pattern: &SpoPattern,
        range_bound: Option<&Iv>,
    ) -> bool {
        kb.reset();
        for &pos in self.slots() {
            match pattern.slot(pos) {
                Slot::Bound(v) => {
                    kb.append(v);
                }
                Slot::Unbound => {
                    if pos == O && pattern.p.is_bound() {
                        if let Some(v) = range_bound {
                            kb.append(v);
                        }
                    }
                    break;
                }
            }
        }
        !kb.is_empty()
    }

    /// Inclusive lower key bound for a pattern, `None` for an open start.
    pub fn from_key(
        self,
        kb: &mut KeyBuilder,
        pattern: &SpoPattern,
        range: Option<&ObjectRange>,
    ) -> Option<Vec<u8>> {
        let bound = range.and_then(|r| r.from.as_ref());
        self.append_prefix(kb, pattern, bound).then(|| kb.key())
    }

    /// Exclusive upper key bound for a pattern, `None` for an open end.
    pub fn to_key(
        self,
        kb: &mut KeyBuilder,
        pattern: &SpoPattern,
        range: Option<&ObjectRange>,
    ) -> Result<Option<Vec<u8>>> {
        let bound = range.and_then(|r| r.to.as_ref());
        if self.append_prefix(kb, pattern, bound) {
            successor(kb.as_bytes()).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Number of leading key slots fixed by the pattern.
    pub fn bound_prefix_len(self, pattern: &SpoPattern) -> usize {
        self.slots()
            .iter()
            .take_while(|&&pos| pattern.slot(pos).is_bound())
            .count()
    }
}

impl fmt::Display for KeyOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for KeyOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        KeyOrder::all()
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::UnknownKeyOrder(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(s: u64, p: u64, o: u64, c: Option<u64>) -> Spo {
        Spo::quad(Iv::uri(s), Iv::uri(p), Iv::uri(o), c.map(Iv::uri))
    }

    #[test]
    fn test_orders_by_mode() {
        assert_eq!(KeyOrder::orders(false).len(), 3);
        assert_eq!(KeyOrder::orders(true).len(), 6);
        assert_eq!(KeyOrder::primary(false), KeyOrder::Spo);
        assert_eq!(KeyOrder::primary(true), KeyOrder::Spoc);
        for &k in KeyOrder::all() {
            assert_eq!(k.is_primary(), k == KeyOrder::primary(k.is_quad()));
        }
    }

    #[test]
    fn test_parse_and_display() {
        for &k in KeyOrder::all() {
            assert_eq!(k.to_string().parse::<KeyOrder>().unwrap(), k);
        }
        assert_eq!("pocs".parse::<KeyOrder>().unwrap(), KeyOrder::Pocs);
        assert!(matches!("XYZ".parse::<KeyOrder>(), Err(Error::UnknownKeyOrder(_))));
    }

    #[test]
    fn test_ensure_mode() {
        assert!(KeyOrder::Pos.ensure_mode(false).is_ok());
        assert!(matches!(
            KeyOrder::Pcso.ensure_mode(false),
            Err(Error::IncompatibleMode(_))
        ));
        assert!(KeyOrder::Osp.ensure_mode(true).is_err());
    }

    #[test]
    fn test_triple_selection() {
        let a = || Iv::uri(1);
        let cases = [
            (SpoPattern::wildcard(), KeyOrder::Spo),
            (SpoPattern::wildcard().with_s(a()), KeyOrder::Spo),
            (SpoPattern::wildcard().with_p(a()), KeyOrder::Pos),
            (SpoPattern::wildcard().with_o(a()), KeyOrder::Osp),
            (SpoPattern::wildcard().with_s(a()).with_p(a()), KeyOrder::Spo),
            (SpoPattern::wildcard().with_s(a()).with_o(a()), KeyOrder::Osp),
            (SpoPattern::wildcard().with_p(a()).with_o(a()), KeyOrder::Pos),
            (SpoPattern::new(a(), a(), a()), KeyOrder::Spo),
            // context is ignored for triples
            (SpoPattern::wildcard().with_c(a()), KeyOrder::Spo),
        ];
        for (pattern, expected) in cases {
            assert_eq!(KeyOrder::select(&pattern, false), expected, "{pattern}");
        }
    }

    #[test]
    fn test_locality_hint_only_for_fully_bound() {
        let full = SpoPattern::new(Iv::uri(1), Iv::uri(2), Iv::uri(3));
        assert_eq!(
            KeyOrder::select_with_hint(&full, false, Some(KeyOrder::Pos)),
            KeyOrder::Pos
        );
        let partial = SpoPattern::wildcard().with_s(Iv::uri(1));
        assert_eq!(
            KeyOrder::select_with_hint(&partial, false, Some(KeyOrder::Pos)),
            KeyOrder::Spo
        );
        assert_eq!(
            KeyOrder::select_with_hint(&full, false, Some(KeyOrder::Pocs)),
            KeyOrder::Spo
        );
    }

    #[test]
    fn test_compare_follows_slot_order() {
        let a = quad(1, 9, 5, Some(2));
        let b = quad(2, 1, 5, None);
        assert_eq!(KeyOrder::Spoc.compare(&a, &b), Ordering::Less);
        assert_eq!(KeyOrder::Pocs.compare(&a, &b), Ordering::Greater);
        assert_eq!(KeyOrder::Cspo.compare(&a, &b), Ordering::Greater);
        assert_eq!(KeyOrder::Ocsp.compare(&a, &a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut kb = KeyBuilder::new();
        let mut key = KeyOrder::Spo.encode_key(&mut kb, &quad(1, 2, 3, None));
        key.push(0);
        assert!(matches!(KeyOrder::Spo.decode_key(&key), Err(Error::InvalidKey(_))));
        assert!(KeyOrder::Spo.decode_key(&key[..10]).is_err());
    }

    #[test]
    fn test_range_keys_on_pos() {
        let mut kb = KeyBuilder::new();
        let pattern = SpoPattern::wildcard().with_p(Iv::uri(7));
        let range = ObjectRange::new(Some(Iv::int(10)), Some(Iv::int(20)));

        let from = KeyOrder::Pos.from_key(&mut kb, &pattern, Some(&range)).unwrap();
        let to = KeyOrder::Pos.to_key(&mut kb, &pattern, Some(&range)).unwrap().unwrap();

        let key_of = |o: i64| {
            let mut kb = KeyBuilder::new();
            KeyOrder::Pos.encode_key(&mut kb, &Spo::triple(Iv::uri(1), Iv::uri(7), Iv::int(o)))
        };
        let inside = |k: &Vec<u8>| k >= &from && k < &to;
        assert!(!inside(&key_of(9)));
        assert!(inside(&key_of(10)));
        assert!(inside(&key_of(20)));
        assert!(!inside(&key_of(21)));
    }

    #[test]
    fn test_range_ignored_without_bound_predicate() {
        let mut kb = KeyBuilder::new();
        let range = ObjectRange::new(Some(Iv::int(10)), None);
        let pattern = SpoPattern::wildcard().with_s(Iv::uri(1));
        let with = KeyOrder::Spo.from_key(&mut kb, &pattern, Some(&range));
        let without = KeyOrder::Spo.from_key(&mut kb, &pattern, None);
        assert_eq!(with, without);
    }

    #[test]
    fn test_wildcard_has_open_bounds() {
        let mut kb = KeyBuilder::new();
        let w = SpoPattern::wildcard();
        assert_eq!(KeyOrder::Spoc.from_key(&mut kb, &w, None), None);
        assert_eq!(KeyOrder::Spoc.to_key(&mut kb, &w, None).unwrap(), None);
    }
}
