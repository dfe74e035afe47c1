//! Statement tuples and access patterns.
//!
//! [`Spo`] is the canonical `(s, p, o, c?)` tuple. [`SpoPattern`] describes a
//! lookup: each slot is either [`Slot::Bound`] to a value or
//! [`Slot::Unbound`].

use crate::error::{Error, Result};
use crate::iv::Iv;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a slot in the canonical tuple.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Position {
    S,
    P,
    O,
    C,
}

impl Position {
    /// Canonical index (s=0, p=1, o=2, c=3)
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Position::S => 0,
            Position::P => 1,
            Position::O => 2,
            Position::C => 3,
        }
    }

    pub fn name(self) -> char {
        match self {
            Position::S => 'S',
            Position::P => 'P',
            Position::O => 'O',
            Position::C => 'C',
        }
    }
}

/// A statement tuple in canonical order.
///
/// `c` is `None` for triples, and for quads in the null (default) context.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Spo {
    pub s: Iv,
    pub p: Iv,
    pub o: Iv,
    pub c: Option<Iv>,
}

impl Spo {
    pub fn triple(s: Iv, p: Iv, o: Iv) -> Self {
        Self { s, p, o, c: None }
    }

    pub fn quad(s: Iv, p: Iv, o: Iv, c: Option<Iv>) -> Self {
        Self { s, p, o, c }
    }

    /// Build a tuple from optional slots, as handed over by a binding set.
    ///
    /// Subject, predicate and object are required; the context may be absent.
    pub fn from_slots(s: Option<Iv>, p: Option<Iv>, o: Option<Iv>, c: Option<Iv>) -> Result<Self> {
        match (s, p, o) {
            (Some(s), Some(p), Some(o)) => Ok(Self { s, p, o, c }),
            (s, p, o) => Err(Error::malformed(format!(
                "missing {}{}{}",
                if s.is_none() { "s" } else { "" },
                if p.is_none() { "p" } else { "" },
                if o.is_none() { "o" } else { "" },
            ))),
        }
    }

    /// The same triple with no context.
    pub fn without_context(mut self) -> Self {
        self.c = None;
        self
    }

    /// Value in the given position (`None` only for an absent context).
    pub fn get(&self, pos: Position) -> Option<&Iv> {
        match pos {
            Position::S => Some(&self.s),
            Position::P => Some(&self.p),
            Position::O => Some(&self.o),
            Position::C => self.c.as_ref(),
        }
    }
}

impl fmt::Display for Spo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "< {}, {}, {}", self.s, self.p, self.o)?;
        if let Some(c) = &self.c {
            write!(f, ", {c}")?;
        }
        write!(f, " >")
    }
}

/// One slot of an access pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Slot {
    Bound(Iv),
    #[default]
    Unbound,
}

impl Slot {
    #[inline]
    pub fn is_bound(&self) -> bool {
        matches!(self, Slot::Bound(_))
    }

    pub fn value(&self) -> Option<&Iv> {
        match self {
            Slot::Bound(v) => Some(v),
            Slot::Unbound => None,
        }
    }
}

impl From<Iv> for Slot {
    fn from(v: Iv) -> Self {
        Slot::Bound(v)
    }
}

impl From<Option<Iv>> for Slot {
    fn from(v: Option<Iv>) -> Self {
        v.map_or(Slot::Unbound, Slot::Bound)
    }
}

/// Access pattern over `(s, p, o, c)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct SpoPattern {
    pub s: Slot,
    pub p: Slot,
    pub o: Slot,
    pub c: Slot,
}

impl SpoPattern {
    /// Pattern with every slot unbound
    pub fn wildcard() -> Self {
        Self::default()
    }

    pub fn new(s: impl Into<Slot>, p: impl Into<Slot>, o: impl Into<Slot>) -> Self {
        Self {
            s: s.into(),
            p: p.into(),
            o: o.into(),
            c: Slot::Unbound,
        }
    }

    /// Fully bound pattern for an existing tuple
    pub fn exact(spo: &Spo) -> Self {
        Self {
            s: Slot::Bound(spo.s.clone()),
            p: Slot::Bound(spo.p.clone()),
            o: Slot::Bound(spo.o.clone()),
            c: spo.c.clone().into(),
        }
    }

    pub fn with_s(mut self, v: Iv) -> Self {
        self.s = Slot::Bound(v);
        self
    }

    pub fn with_p(mut self, v: Iv) -> Self {
        self.p = Slot::Bound(v);
        self
    }

    pub fn with_o(mut self, v: Iv) -> Self {
        self.o = Slot::Bound(v);
        self
    }

    pub fn with_c(mut self, v: Iv) -> Self {
        self.c = Slot::Bound(v);
        self
    }

    pub fn slot(&self, pos: Position) -> &Slot {
        match pos {
            Position::S => &self.s,
            Position::P => &self.p,
            Position::O => &self.o,
            Position::C => &self.c,
        }
    }

    /// Number of bound slots
    pub fn bound_count(&self) -> usize {
        [&self.s, &self.p, &self.o, &self.c]
            .into_iter()
            .filter(|s| s.is_bound())
            .count()
    }

    /// Whether every slot is bound (context ignored for triples)
    pub fn is_fully_bound(&self, quads: bool) -> bool {
        self.s.is_bound() && self.p.is_bound() && self.o.is_bound() && (!quads || self.c.is_bound())
    }

    /// Whether `spo` agrees with every bound slot.
    ///
    /// A bound context never matches a tuple without one.
    pub fn matches(&self, spo: &Spo) -> bool {
        [Position::S, Position::P, Position::O, Position::C]
            .into_iter()
            .all(|pos| match self.slot(pos) {
                Slot::Unbound => true,
                Slot::Bound(v) => spo.get(pos) == Some(v),
            })
    }
}

impl fmt::Display for SpoPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |slot: &Slot| match slot {
            Slot::Bound(v) => v.to_string(),
            Slot::Unbound => "?".to_string(),
        };
        write!(
            f,
            "({} {} {} {})",
            show(&self.s),
            show(&self.p),
            show(&self.o),
            show(&self.c)
        )
    }
}

/// Inclusive object-value range, applied when the predicate is bound and the
/// object is not.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ObjectRange {
    pub from: Option<Iv>,
    pub to: Option<Iv>,
}

impl ObjectRange {
    pub fn new(from: Option<Iv>, to: Option<Iv>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, v: &Iv) -> bool {
        self.from.as_ref().map_or(true, |f| v >= f) && self.to.as_ref().map_or(true, |t| v <= t)
    }
}
