// crates/amrcc-core/src/triplet.rs

//! Triplet merge trees.
//!
//! Every node `u` stores a triplet `(u, saddle, parent)`: the branch born at
//! `u` joins the branch of `parent` at `saddle`. Roots carry the self-triplet
//! `(u, u, u)`. The representation is order-free: edges can be merged in any
//! order, and two trees over overlapping vertex sets are combined by
//! replaying triplets as merge events, which is what the exchange protocol
//! relies on.

use crate::error::{Error, Result};
use crate::vertex::{AmrVertexId, SweepKey, SweepOrder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One node of the tree.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// The vertex itself.
    pub vertex: AmrVertexId,
    /// Field value at the vertex.
    pub value: f64,
    /// Saddle through which this branch merges; `vertex` itself for roots
    /// and for regular (zero-persistence) vertices.
    pub saddle: AmrVertexId,
    /// Representative of the branch merged into; `vertex` itself for roots.
    pub parent: AmrVertexId,
}

/// A triplet merge tree (in general a forest) with a fixed polarity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TripletMergeTree {
    order: SweepOrder,
    nodes: BTreeMap<AmrVertexId, Node>,
}

impl TripletMergeTree {
    /// An empty tree sweeping sublevel (`negate = false`) or superlevel
    /// (`negate = true`) sets.
    #[must_use]
    pub fn new(negate: bool) -> Self {
        Self {
            order: SweepOrder::new(negate),
            nodes: BTreeMap::new(),
        }
    }

    /// Polarity flag.
    #[inline]
    #[must_use]
    pub const fn negate(&self) -> bool {
        self.order.negate()
    }

    /// The sweep order used by this tree.
    #[inline]
    #[must_use]
    pub const fn order(&self) -> SweepOrder {
        self.order
    }

    /// Number of nodes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `v` is a node.
    #[inline]
    #[must_use]
    pub fn contains(&self, v: AmrVertexId) -> bool {
        self.nodes.contains_key(&v)
    }

    /// Node lookup.
    #[inline]
    #[must_use]
    pub fn node(&self, v: AmrVertexId) -> Option<&Node> {
        self.nodes.get(&v)
    }

    /// Iterate nodes in vertex order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Sweep key of a node.
    ///
    /// # Panics
    /// Panics if `v` is not a node; internal callers only query inserted
    /// vertices.
    #[inline]
    #[must_use]
    pub fn key(&self, v: AmrVertexId) -> SweepKey {
        let n = self.nodes.get(&v).expect("triplet node present");
        (n.value, v)
    }

    /// Insert `v` as its own root. Re-adding an existing vertex is a no-op.
    pub fn add(&mut self, v: AmrVertexId, value: f64) {
        self.nodes.entry(v).or_insert(Node {
            vertex: v,
            value,
            saddle: v,
            parent: v,
        });
    }

    /// Representative of `u`'s component at sweep level `at`: follow parents
    /// through every merge whose saddle precedes-or-equals `at`.
    #[must_use]
    pub fn representative(&self, mut u: AmrVertexId, at: SweepKey) -> AmrVertexId {
        loop {
            let n = &self.nodes[&u];
            if n.parent == u {
                return u;
            }
            if self.order.precedes_eq(self.key(n.saddle), at) {
                u = n.parent;
            } else {
                return u;
            }
        }
    }

    /// Deepest vertex of `u`'s component in the fully merged tree.
    #[must_use]
    pub fn find_root(&self, mut u: AmrVertexId) -> AmrVertexId {
        loop {
            let n = &self.nodes[&u];
            if n.parent == u {
                return u;
            }
            u = n.parent;
        }
    }

    /// Merge the components of `u` and `v` through saddle `s`.
    ///
    /// The shallower representative is hooked under the deeper one and its
    /// previous merge event is replayed, so parents stay strictly deeper
    /// than their children.
    pub fn merge_at(&mut self, u: AmrVertexId, s: AmrVertexId, v: AmrVertexId) {
        let (mut u, mut s, mut v) = (u, s, v);
        loop {
            let sk = self.key(s);
            let mut a = self.representative(u, sk);
            let mut b = self.representative(v, sk);
            if a == b {
                return;
            }
            if self.order.precedes(self.key(b), self.key(a)) {
                std::mem::swap(&mut a, &mut b);
            }
            let (old_s, old_p) = {
                let n = &self.nodes[&b];
                (n.saddle, n.parent)
            };
            {
                let n = self.nodes.get_mut(&b).expect("triplet node present");
                n.saddle = s;
                n.parent = a;
            }
            if old_p == b {
                return;
            }
            u = a;
            s = old_s;
            v = old_p;
        }
    }

    /// Merge along a graph edge; the shallower endpoint is the saddle.
    pub fn merge_edge(&mut self, u: AmrVertexId, v: AmrVertexId) {
        if self.order.precedes(self.key(u), self.key(v)) {
            self.merge_at(u, v, v);
        } else {
            self.merge_at(v, u, u);
        }
    }

    /// Canonicalise parents: point each triplet at the representative of its
    /// component at the saddle level. Compression only; semantics unchanged.
    pub fn compress(&mut self) {
        let ids: Vec<AmrVertexId> = self.nodes.keys().copied().collect();
        for u in ids {
            let (s, p) = {
                let n = &self.nodes[&u];
                (n.saddle, n.parent)
            };
            if p == u {
                continue;
            }
            let canon = self.representative(p, self.key(s));
            if canon != p {
                self.nodes.get_mut(&u).expect("triplet node present").parent = canon;
            }
        }
    }

    /// Remove regular (degree-two) interior vertices that are not `special`
    /// and are not referenced as the saddle of a surviving branch.
    ///
    /// Branch extrema, roots, surviving saddles and special vertices stay,
    /// which keeps the node set closed under triplet references.
    pub fn sparsify<F>(&mut self, special: F)
    where
        F: Fn(AmrVertexId) -> bool,
    {
        self.compress();

        let mut keep: BTreeSet<AmrVertexId> = BTreeSet::new();
        for (id, n) in &self.nodes {
            if special(*id) || n.saddle != *id || n.parent == *id {
                keep.insert(*id);
            }
        }
        let saddles: Vec<AmrVertexId> = keep
            .iter()
            .map(|id| self.nodes[id].saddle)
            .collect();
        keep.extend(saddles);

        self.nodes.retain(|id, _| keep.contains(id));
    }

    /// Import another tree's nodes. New vertices are inserted with their
    /// triplets; for vertices already present the incoming triplet is
    /// replayed as a merge event, so both trees' merge histories survive.
    /// Re-importing the same nodes is a no-op.
    pub fn merge_fragment(&mut self, fragment: &[Node]) {
        let mut replay: Vec<(AmrVertexId, AmrVertexId, AmrVertexId)> = Vec::new();
        for n in fragment {
            if let Some(existing) = self.nodes.get(&n.vertex) {
                if (existing.saddle, existing.parent) != (n.saddle, n.parent)
                    && n.parent != n.vertex
                {
                    replay.push((n.vertex, n.saddle, n.parent));
                }
            } else {
                self.nodes.insert(n.vertex, *n);
            }
        }
        for (u, s, v) in replay {
            self.merge_at(u, s, v);
        }
    }

    /// Extract the component of `root` as a self-contained node list.
    #[must_use]
    pub fn component_nodes(&self, root: AmrVertexId) -> Vec<Node> {
        self.nodes
            .values()
            .filter(|n| self.find_root(n.vertex) == root)
            .copied()
            .collect()
    }

    /// Visit `(from, through, to)` triples in vertex order: one per branch
    /// (saddle differs from the vertex) and the self-triple for each root.
    /// Regular vertices, whose branch is born and dies at the same level,
    /// are skipped.
    pub fn traverse_persistence<F>(&self, mut f: F)
    where
        F: FnMut(&Node, &Node, &Node),
    {
        for n in self.nodes.values() {
            if n.saddle == n.vertex && n.parent != n.vertex {
                continue;
            }
            let s = &self.nodes[&n.saddle];
            let p = &self.nodes[&n.parent];
            f(n, s, p);
        }
    }

    /// Check the monotonicity invariant: every non-root parent strictly
    /// precedes its child and every saddle is preceded by its child.
    pub fn check_monotone(&self) -> Result<()> {
        for n in self.nodes.values() {
            if n.parent == n.vertex {
                continue;
            }
            let pk = self.key(n.parent);
            let uk = (n.value, n.vertex);
            if !self.order.precedes(pk, uk) {
                return Err(Error::protocol(
                    n.vertex.gid,
                    0,
                    format!("parent {} does not precede {}", n.parent, n.vertex),
                ));
            }
            let sk = self.key(n.saddle);
            if self.order.precedes(sk, uk) {
                return Err(Error::protocol(
                    n.vertex.gid,
                    0,
                    format!("saddle {} precedes branch vertex {}", n.saddle, n.vertex),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(i: i64) -> AmrVertexId {
        AmrVertexId::new(0, i)
    }

    /// 1-D superlevel profile with two peaks and a valley:
    /// index:  0    1    2    3    4
    /// value: 1.0  3.0  0.5  2.0  1.0
    fn two_peaks() -> TripletMergeTree {
        let values = [1.0, 3.0, 0.5, 2.0, 1.0];
        let mut t = TripletMergeTree::new(true);
        for (i, &val) in values.iter().enumerate() {
            t.add(v(i as i64), val);
        }
        for i in 0..4 {
            t.merge_edge(v(i), v(i + 1));
        }
        t.compress();
        t
    }

    #[test]
    fn two_peaks_pair_at_the_valley() {
        let t = two_peaks();
        assert_eq!(t.find_root(v(3)), v(1));
        assert_eq!(t.find_root(v(0)), v(1));

        // Branch born at the smaller peak dies at the valley.
        let n3 = t.node(v(3)).unwrap();
        assert_eq!(n3.saddle, v(2));
        assert_eq!(n3.parent, v(1));

        let mut pairs = Vec::new();
        let mut rays = Vec::new();
        t.traverse_persistence(|from, through, to| {
            if from.vertex == to.vertex {
                rays.push(from.value);
            } else {
                pairs.push((from.value, through.value));
            }
        });
        assert_eq!(rays, vec![3.0]);
        assert_eq!(pairs, vec![(2.0, 0.5)]);
    }

    #[test]
    fn merge_order_does_not_matter() {
        let values = [1.0, 3.0, 0.5, 2.0, 1.0];
        let edges = [(0, 1), (1, 2), (2, 3), (3, 4)];
        let reference = two_peaks();

        // A different edge insertion order must give the same roots and pairs.
        let mut t = TripletMergeTree::new(true);
        for (i, &val) in values.iter().enumerate() {
            t.add(v(i as i64), val);
        }
        for &(a, b) in edges.iter().rev() {
            t.merge_edge(v(b), v(a));
        }
        t.compress();

        for i in 0..5 {
            assert_eq!(t.find_root(v(i)), reference.find_root(v(i)));
        }
        assert_eq!(t.node(v(3)).unwrap().saddle, v(2));
    }

    #[test]
    fn monotone_after_merges() {
        let t = two_peaks();
        t.check_monotone().unwrap();
    }

    #[test]
    fn sublevel_polarity_swaps_extrema() {
        let values = [1.0, 3.0, 0.5, 2.0, 1.0];
        let mut t = TripletMergeTree::new(false);
        for (i, &val) in values.iter().enumerate() {
            t.add(v(i as i64), val);
        }
        for i in 0..4 {
            t.merge_edge(v(i), v(i + 1));
        }
        // The minimum is now the deepest vertex.
        assert_eq!(t.find_root(v(1)), v(2));
    }

    #[test]
    fn sparsify_keeps_structure_and_special() {
        let mut t = two_peaks();
        let before_root = t.find_root(v(3));
        t.sparsify(|u| u == v(4));

        // Peaks, valley saddle, and the special vertex survive;
        // the regular vertex 0 goes away.
        assert!(t.contains(v(1)));
        assert!(t.contains(v(2)));
        assert!(t.contains(v(3)));
        assert!(t.contains(v(4)));
        assert!(!t.contains(v(0)));
        assert_eq!(t.find_root(v(3)), before_root);
        t.check_monotone().unwrap();
    }

    #[test]
    fn fragment_replay_reconstructs_cross_tree_merges() {
        // Tree A over vertices {0,1,2}, tree B over {2,3,4} sharing vertex 2.
        let values = [1.0, 3.0, 0.5, 2.0, 1.0];
        let mut a = TripletMergeTree::new(true);
        for i in 0..3 {
            a.add(v(i), values[i as usize]);
        }
        a.merge_edge(v(0), v(1));
        a.merge_edge(v(1), v(2));

        let mut b = TripletMergeTree::new(true);
        for i in 2..5 {
            b.add(v(i), values[i as usize]);
        }
        b.merge_edge(v(2), v(3));
        b.merge_edge(v(3), v(4));

        let fragment: Vec<Node> = b.nodes().copied().collect();
        a.merge_fragment(&fragment);
        a.compress();

        for i in 0..5 {
            assert_eq!(a.find_root(v(i)), v(1));
        }
        assert_eq!(a.node(v(3)).unwrap().saddle, v(2));
        a.check_monotone().unwrap();

        // Importing the same fragment again changes nothing.
        let snapshot = a.clone();
        a.merge_fragment(&fragment);
        a.compress();
        assert_eq!(a, snapshot);
    }
}
