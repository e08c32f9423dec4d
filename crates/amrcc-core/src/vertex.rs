// crates/amrcc-core/src/vertex.rs

//! Vertex identity and the value order that drives every sweep.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique cell identity on the block-decomposed grid: the owning
/// block's gid plus a linear index into the owner's bounds box.
///
/// The derived `Ord` is lexicographic over `(gid, index)`; it is the
/// tie-breaker for equal field values everywhere in the engine.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct AmrVertexId {
    /// Owning block.
    pub gid: i32,
    /// Linear address inside the owner's bounds box (x-fastest order).
    pub index: i64,
}

impl AmrVertexId {
    /// Construct a vertex id.
    #[inline]
    #[must_use]
    pub const fn new(gid: i32, index: i64) -> Self {
        Self { gid, index }
    }
}

impl fmt::Display for AmrVertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.gid, self.index)
    }
}

/// A `(value, vertex)` key; the unit of comparison in the sweep.
pub type SweepKey = (f64, AmrVertexId);

/// Sweep order over `(value, vertex)` keys under a polarity.
///
/// `negate = false` sweeps sublevel sets (minima are deep); `negate = true`
/// sweeps superlevel sets (maxima are deep). Equal values break toward the
/// smaller vertex id, so the order is total for finite values.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SweepOrder {
    negate: bool,
}

impl SweepOrder {
    /// Construct the order for the given polarity.
    #[inline]
    #[must_use]
    pub const fn new(negate: bool) -> Self {
        Self { negate }
    }

    /// Polarity flag.
    #[inline]
    #[must_use]
    pub const fn negate(&self) -> bool {
        self.negate
    }

    /// `a` comes strictly earlier in the sweep than `b` (`a` is deeper).
    #[inline]
    #[must_use]
    pub fn precedes(&self, a: SweepKey, b: SweepKey) -> bool {
        if a.0 == b.0 {
            a.1 < b.1
        } else if self.negate {
            a.0 > b.0
        } else {
            a.0 < b.0
        }
    }

    /// `a` comes no later in the sweep than `b`.
    #[inline]
    #[must_use]
    pub fn precedes_eq(&self, a: SweepKey, b: SweepKey) -> bool {
        !self.precedes(b, a)
    }

    /// The deeper of the two keys.
    #[inline]
    #[must_use]
    pub fn deeper(&self, a: SweepKey, b: SweepKey) -> SweepKey {
        if self.precedes(a, b) {
            a
        } else {
            b
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_order_is_lexicographic() {
        let a = AmrVertexId::new(0, 10);
        let b = AmrVertexId::new(0, 11);
        let c = AmrVertexId::new(1, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn sweep_order_respects_polarity() {
        let u = AmrVertexId::new(0, 0);
        let v = AmrVertexId::new(1, 0);

        let sub = SweepOrder::new(false);
        assert!(sub.precedes((1.0, u), (2.0, v)));
        assert!(!sub.precedes((2.0, v), (1.0, u)));

        let sup = SweepOrder::new(true);
        assert!(sup.precedes((2.0, v), (1.0, u)));
    }

    #[test]
    fn equal_values_break_toward_smaller_id() {
        let u = AmrVertexId::new(0, 3);
        let v = AmrVertexId::new(1, 0);
        for negate in [false, true] {
            let ord = SweepOrder::new(negate);
            assert!(ord.precedes((5.0, u), (5.0, v)));
            assert!(ord.precedes_eq((5.0, u), (5.0, u)));
        }
    }
}
