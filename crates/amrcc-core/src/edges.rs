// crates/amrcc-core/src/edges.rs

//! Cross-block edges between active cells.

use crate::vertex::AmrVertexId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-edge between two active cells in different blocks.
///
/// `from` always lives on the block that stores the edge; across refinement
/// levels the fine cell is the `from` side of the canonical orientation.
/// Symmetry after round one: block `from.gid` stores `(u, v)` iff block
/// `to.gid` stores `(v, u)`.
#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct AmrEdge {
    /// Endpoint owned by the storing block.
    pub from: AmrVertexId,
    /// Endpoint owned by the neighbour block.
    pub to: AmrVertexId,
}

impl AmrEdge {
    /// Construct an edge.
    #[inline]
    #[must_use]
    pub const fn new(from: AmrVertexId, to: AmrVertexId) -> Self {
        Self { from, to }
    }

    /// The same edge as seen from the other block.
    #[inline]
    #[must_use]
    pub const fn flipped(&self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }
}

impl fmt::Display for AmrEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}
