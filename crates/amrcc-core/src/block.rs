// crates/amrcc-core/src/block.rs

//! Per-block state: the masked box, the field, local and merged triplet
//! trees, components, and the disjoint-set bookkeeping that tracks how
//! components coalesce across blocks.

use crate::edges::AmrEdge;
use crate::error::{Error, Result};
use crate::grid::{point_add, scale_point, Bounds, Grid, Point3, DIM};
use crate::masked_box::{Mask, MaskedBox, NeighborLink};
use crate::triplet::TripletMergeTree;
use crate::vertex::AmrVertexId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Reader → engine handoff for one block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FabPatch {
    /// Block gid.
    pub gid: i32,
    /// Refinement level (0 = coarsest).
    pub level: i32,
    /// Cumulative refinement factor (1 at level 0).
    pub refinement: i32,
    /// Owned cells, in this block's refinement coordinates.
    pub core: Bounds,
    /// Owned-plus-ghost region, clipped to the domain.
    pub bounds: Bounds,
    /// Scalar field over `bounds` (the merge-tree function).
    pub field: Vec<f64>,
    /// Names of extra fields integrated per component.
    pub extra_names: Vec<String>,
    /// Extra field data over `bounds`, one vector per name.
    pub extras: Vec<Vec<f64>>,
    /// Neighbour geometry.
    pub links: Vec<NeighborLink>,
}

/// The six axis-aligned cell offsets.
pub const AXIS_NEIGHBORS: [Point3; 6] = [
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];

/// One connected component tracked by a block during the exchange.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Component {
    /// Current deepest vertex of the component (may be remote).
    pub root: AmrVertexId,
    /// Local-tree roots merged into this component.
    pub original_roots: BTreeSet<AmrVertexId>,
    /// Blocks this component currently knows it touches.
    pub current_neighbors: BTreeSet<i32>,
    /// Subset of `current_neighbors` already sent to.
    pub processed_neighbors: BTreeSet<i32>,
    /// Neighbour gids learned from received packets, folded into
    /// `current_neighbors` when records are consolidated.
    pub pending_neighbors: BTreeSet<i32>,
    /// Outgoing edges whose `from` endpoint lies in this component.
    pub outgoing_edges: Vec<AmrEdge>,
    /// Sparse merge tree of everything known about this component; this is
    /// what gets shipped to neighbours.
    pub tree: TripletMergeTree,
}

impl Component {
    /// A fresh component around a local root.
    #[must_use]
    pub fn new(root: AmrVertexId, edges: Vec<AmrEdge>, tree: TripletMergeTree) -> Self {
        let mut c = Self {
            root,
            original_roots: BTreeSet::from([root]),
            current_neighbors: BTreeSet::new(),
            processed_neighbors: BTreeSet::new(),
            pending_neighbors: BTreeSet::new(),
            outgoing_edges: edges,
            tree,
        };
        c.fill_current_neighbors();
        c
    }

    /// Recompute `current_neighbors` from the outgoing edges.
    pub fn fill_current_neighbors(&mut self) {
        self.current_neighbors = self
            .outgoing_edges
            .iter()
            .map(|e| e.to.gid)
            .collect();
    }

    /// Drop edges that did not survive symmetrisation and refresh the
    /// neighbour set.
    pub fn adjust_edges(&mut self, surviving: &BTreeSet<AmrEdge>) {
        let before = self.outgoing_edges.len();
        self.outgoing_edges.retain(|e| surviving.contains(e));
        if self.outgoing_edges.len() != before {
            self.fill_current_neighbors();
        }
    }

    /// Whether this component still owes a packet to `gid`.
    #[must_use]
    pub fn must_send_to(&self, gid: i32) -> bool {
        self.current_neighbors.contains(&gid) && !self.processed_neighbors.contains(&gid)
    }

    /// Whether every known neighbour has been talked to.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.current_neighbors.is_subset(&self.processed_neighbors)
    }
}

/// Integrated quantities of one component.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct IntegralValue {
    /// Raw count of active cells.
    pub n_cells: u64,
    /// Raw count of active vertices feeding the tree.
    pub n_vertices: u64,
    /// `cell_volume * value * scaling_factor` summed over active cells.
    pub total_mass: f64,
    /// Extra fields, integrated the same way, in `extra_names` order.
    pub extras: Vec<f64>,
}

impl IntegralValue {
    /// Fold another contribution into this one.
    pub fn merge(&mut self, other: &Self) {
        self.n_cells += other.n_cells;
        self.n_vertices += other.n_vertices;
        self.total_mass += other.total_mass;
        if self.extras.len() < other.extras.len() {
            self.extras.resize(other.extras.len(), 0.0);
        }
        for (a, b) in self.extras.iter_mut().zip(&other.extras) {
            *a += b;
        }
    }
}

/// Per-block engine state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentBlock {
    /// Block gid.
    pub gid: i32,
    /// Masked box.
    pub local: MaskedBox,
    /// Level-0 domain box.
    pub domain: Bounds,
    /// Sweep polarity.
    pub negate: bool,
    /// Field over bounds; retained for the integral pass.
    pub fab: Grid,
    /// Extra field names.
    pub extra_names: Vec<String>,
    /// Extra fields over bounds.
    pub extra_fabs: Vec<Grid>,
    /// Volume of one finest-level cell.
    pub cell_volume: f64,
    /// Neighbour geometry, kept for edge target arithmetic.
    pub links: Vec<NeighborLink>,

    /// Full local tree, extended in place by received fragments.
    pub current_tree: TripletMergeTree,
    /// Sparsified copy of the local tree, frozen after init.
    pub original_tree: TripletMergeTree,

    /// Sum of unmasked core values (pre-threshold), for the global mean.
    pub sum: f64,
    /// Count of unmasked core cells (pre-threshold).
    pub n_unmasked: u64,
    /// Post-init counts and sums, reduced for diagnostics.
    pub n_active: u64,
    /// Count of low cells after the threshold resolves.
    pub n_low: u64,
    /// Count of cells masked by finer blocks.
    pub n_masked: u64,
    /// Sum of active core values.
    pub sum_active: f64,
    /// Sum of low core values.
    pub sum_low: f64,
    /// Resolved absolute threshold.
    pub absolute_rho: f64,

    /// Components with at least one outgoing edge.
    pub components: Vec<Component>,
    /// Outgoing edges grouped by target gid.
    pub gid_to_outgoing_edges: BTreeMap<i32, Vec<AmrEdge>>,

    /// Local vertex → local-tree root, frozen after init.
    pub original_vertex_to_deepest: BTreeMap<AmrVertexId, AmrVertexId>,
    /// Vertex → deepest known so far across blocks.
    pub current_vertex_to_deepest: BTreeMap<AmrVertexId, AmrVertexId>,
    /// Vertex → deepest at global convergence.
    pub final_vertex_to_deepest: BTreeMap<AmrVertexId, AmrVertexId>,

    /// Disjoint-set parent over component roots.
    pub components_disjoint_set_parent: BTreeMap<AmrVertexId, AmrVertexId>,
    /// Union-by-size weights.
    pub components_disjoint_set_size: BTreeMap<AmrVertexId, u64>,
    /// Set representative → deepest vertex of the set.
    pub components_disjoint_set_deepest: BTreeMap<AmrVertexId, AmrVertexId>,

    /// Exchange round counter (for protocol diagnostics).
    pub round: u32,
    /// Whether all components were done at the last check.
    pub done: bool,

    /// Component root → integrated quantities.
    pub local_integral: BTreeMap<AmrVertexId, IntegralValue>,
}

impl ComponentBlock {
    /// Wrap a reader patch. The mask is resolved immediately; the LOW
    /// demotion and everything after it wait for [`ComponentBlock::init`]
    /// with the resolved absolute threshold.
    pub fn new(patch: FabPatch, domain: Bounds, negate: bool, cell_volume: f64) -> Result<Self> {
        let FabPatch {
            gid,
            level,
            refinement,
            core,
            bounds,
            field,
            extra_names,
            extras,
            links,
        } = patch;

        let fab = Grid::new(bounds, field)?;
        let extra_fabs = extras
            .into_iter()
            .map(|data| Grid::new(bounds, data))
            .collect::<Result<Vec<_>>>()?;

        let local = MaskedBox::new(gid, level, refinement, core, bounds, &links)?;

        // Pre-threshold statistics over unmasked core cells.
        let mut sum = 0.0;
        let mut n_unmasked = 0u64;
        for p in local.core_cells() {
            if !matches!(local.mask_at(p), Mask::MaskedByFiner(_)) {
                sum += fab.value(p);
                n_unmasked += 1;
            }
        }

        Ok(Self {
            gid,
            local,
            domain,
            negate,
            fab,
            extra_names,
            extra_fabs,
            cell_volume,
            links,
            current_tree: TripletMergeTree::new(negate),
            original_tree: TripletMergeTree::new(negate),
            sum,
            n_unmasked,
            n_active: 0,
            n_low: 0,
            n_masked: 0,
            sum_active: 0.0,
            sum_low: 0.0,
            absolute_rho: 0.0,
            components: Vec::new(),
            gid_to_outgoing_edges: BTreeMap::new(),
            original_vertex_to_deepest: BTreeMap::new(),
            current_vertex_to_deepest: BTreeMap::new(),
            final_vertex_to_deepest: BTreeMap::new(),
            components_disjoint_set_parent: BTreeMap::new(),
            components_disjoint_set_size: BTreeMap::new(),
            components_disjoint_set_deepest: BTreeMap::new(),
            round: 0,
            done: false,
            local_integral: BTreeMap::new(),
        })
    }

    /// Integral weight of this block's cells.
    #[inline]
    #[must_use]
    pub fn scaling_factor(&self) -> f64 {
        self.local.scaling_factor()
    }

    /// Resolve LOW cells, build the local tree, detect outgoing edges, and
    /// form the initial components.
    pub fn init(&mut self, absolute_rho: f64) -> Result<()> {
        self.absolute_rho = absolute_rho;
        self.local.set_low(&self.fab, absolute_rho);

        let (n_active, n_low, n_masked, _ghost) = self.local.mask_counts();
        self.n_active = n_active;
        self.n_low = n_low;
        self.n_masked = n_masked;
        self.sum_active = 0.0;
        self.sum_low = 0.0;
        for p in self.local.core_cells() {
            match self.local.mask_at(p) {
                Mask::Active => self.sum_active += self.fab.value(p),
                Mask::Low => self.sum_low += self.fab.value(p),
                _ => {}
            }
        }

        self.build_local_tree();
        self.original_tree = self.current_tree.clone();

        self.compute_outgoing_edges()?;

        // Endpoints of outgoing edges must survive sparsification, or the
        // shipped fragments could not anchor cross-block merges.
        let special: BTreeSet<AmrVertexId> = self
            .gid_to_outgoing_edges
            .values()
            .flatten()
            .map(|e| e.from)
            .collect();
        self.original_tree.sparsify(|u| special.contains(&u));

        self.compute_original_connected_components();
        Ok(())
    }

    /// Build the triplet tree over active cells with in-block 6-connectivity.
    fn build_local_tree(&mut self) {
        let mut tree = TripletMergeTree::new(self.negate);
        for p in self.local.active_cells() {
            tree.add(self.local.vertex_at(p), self.fab.value(p));
        }
        // Forward neighbours only, so each in-block edge merges once.
        for p in self.local.active_cells() {
            for offset in [[1, 0, 0], [0, 1, 0], [0, 0, 1]] {
                let q = point_add(p, offset);
                if self.local.bounds().contains(q) && self.local.is_active(q) {
                    tree.merge_edge(self.local.vertex_at(p), self.local.vertex_at(q));
                }
            }
        }
        tree.compress();

        self.original_vertex_to_deepest = tree
            .nodes()
            .map(|n| (n.vertex, tree.find_root(n.vertex)))
            .collect();
        self.current_vertex_to_deepest = self.original_vertex_to_deepest.clone();
        self.current_tree = tree;
    }

    /// Link geometry for a neighbour gid.
    fn link_to(&self, ngid: i32) -> Result<&NeighborLink> {
        self.links
            .iter()
            .find(|l| l.gid == ngid)
            .ok_or_else(|| Error::protocol(self.gid, self.round, format!("no link to gid {ngid}")))
    }

    /// Enumerate cross-block edges from active core cells.
    ///
    /// Same-or-coarser neighbours are reached through ghost cells whose
    /// locally visible value passes the threshold; regions masked by finer
    /// blocks get one optimistic edge per fine face cell, to be pruned by
    /// the round-one symmetrisation.
    fn compute_outgoing_edges(&mut self) -> Result<()> {
        let mut per_gid: BTreeMap<i32, Vec<AmrEdge>> = BTreeMap::new();
        let refinement = self.local.refinement();

        for p in self.local.core_cells() {
            if !self.local.is_active(p) {
                continue;
            }
            let from = self.local.vertex_at(p);

            for offset in AXIS_NEIGHBORS {
                let q = point_add(p, offset);
                if !self.local.bounds().contains(q) {
                    continue;
                }
                match self.local.mask_at(q) {
                    Mask::Active | Mask::Low => {}
                    Mask::Ghost(ngid) => {
                        if self.fab.value(q) < self.absolute_rho {
                            continue;
                        }
                        let link = self.link_to(ngid)?;
                        let qn = scale_point(q, refinement, link.refinement);
                        let to_index = link.bounds.index_of(qn).ok_or_else(|| {
                            Error::protocol(
                                self.gid,
                                self.round,
                                format!("ghost cell not inside bounds of link {ngid}"),
                            )
                        })?;
                        per_gid
                            .entry(ngid)
                            .or_default()
                            .push(AmrEdge::new(from, AmrVertexId::new(ngid, to_index)));
                    }
                    Mask::MaskedByFiner(ngid) => {
                        let link = self.link_to(ngid)?;
                        let ratio = link.refinement / refinement;
                        let base = scale_point(q, refinement, link.refinement);
                        let axis = (0..DIM)
                            .find(|&a| offset[a] != 0)
                            .expect("axis offset is nonzero");
                        let face = if offset[axis] > 0 {
                            base[axis]
                        } else {
                            base[axis] + ratio - 1
                        };
                        let others: Vec<usize> = (0..DIM).filter(|&a| a != axis).collect();
                        for i in 0..ratio {
                            for j in 0..ratio {
                                let mut f = base;
                                f[axis] = face;
                                f[others[0]] += i;
                                f[others[1]] += j;
                                let Some(to_index) = link.bounds.index_of(f) else {
                                    continue;
                                };
                                if !link.core.contains(f) {
                                    continue;
                                }
                                per_gid
                                    .entry(ngid)
                                    .or_default()
                                    .push(AmrEdge::new(from, AmrVertexId::new(ngid, to_index)));
                            }
                        }
                    }
                }
            }
        }

        self.gid_to_outgoing_edges = per_gid;
        Ok(())
    }

    /// Group outgoing edges by the local-tree root of their `from` endpoint
    /// and create one component per root; roots without outgoing edges never
    /// exchange and are final immediately.
    fn compute_original_connected_components(&mut self) {
        let mut per_root: BTreeMap<AmrVertexId, Vec<AmrEdge>> = BTreeMap::new();
        for edges in self.gid_to_outgoing_edges.values() {
            for e in edges {
                let root = self.original_vertex_to_deepest[&e.from];
                per_root.entry(root).or_default().push(*e);
            }
        }

        // Every local root enters the disjoint set, exchanging or not.
        let roots: BTreeSet<AmrVertexId> =
            self.original_vertex_to_deepest.values().copied().collect();
        for root in &roots {
            self.disjoint_set_add(*root);
        }

        let mut components = Vec::with_capacity(per_root.len());
        for (root, edges) in per_root {
            let fragment = self.original_tree.component_nodes(root);
            let mut tree = TripletMergeTree::new(self.negate);
            tree.merge_fragment(&fragment);
            components.push(Component::new(root, edges, tree));
        }
        self.components = components;
    }

    // ---- disjoint set over component roots ----

    /// Register a root if it is new.
    pub fn disjoint_set_add(&mut self, v: AmrVertexId) {
        if !self.components_disjoint_set_parent.contains_key(&v) {
            self.components_disjoint_set_parent.insert(v, v);
            self.components_disjoint_set_size.insert(v, 1);
            self.components_disjoint_set_deepest.insert(v, v);
        }
    }

    /// Find with path compression.
    pub fn disjoint_set_find(&mut self, v: AmrVertexId) -> AmrVertexId {
        let mut root = v;
        loop {
            let p = self.components_disjoint_set_parent[&root];
            if p == root {
                break;
            }
            root = p;
        }
        // Path compression.
        let mut cur = v;
        while cur != root {
            let p = self.components_disjoint_set_parent[&cur];
            self.components_disjoint_set_parent.insert(cur, root);
            cur = p;
        }
        root
    }

    /// Union by size; the deepest representative of the merged set is taken
    /// from the current tree's value order.
    pub fn connect_components(&mut self, a: AmrVertexId, b: AmrVertexId) {
        let ra = self.disjoint_set_find(a);
        let rb = self.disjoint_set_find(b);
        if ra == rb {
            return;
        }
        let sa = self.components_disjoint_set_size[&ra];
        let sb = self.components_disjoint_set_size[&rb];
        let (big, small) = if sa >= sb { (ra, rb) } else { (rb, ra) };

        let da = self.components_disjoint_set_deepest[&ra];
        let db = self.components_disjoint_set_deepest[&rb];
        let order = self.current_tree.order();
        let deepest = order
            .deeper(self.current_tree.key(da), self.current_tree.key(db))
            .1;

        self.components_disjoint_set_parent.insert(small, big);
        self.components_disjoint_set_size.insert(big, sa + sb);
        self.components_disjoint_set_size.remove(&small);
        self.components_disjoint_set_deepest.insert(big, deepest);
        self.components_disjoint_set_deepest.remove(&small);
    }

    /// Whether two roots are in the same global component, as known so far.
    pub fn are_components_connected(&mut self, a: AmrVertexId, b: AmrVertexId) -> bool {
        self.disjoint_set_find(a) == self.disjoint_set_find(b)
    }

    /// Deepest vertex of the set containing `v`.
    pub fn deepest_of(&mut self, v: AmrVertexId) -> AmrVertexId {
        let r = self.disjoint_set_find(v);
        self.components_disjoint_set_deepest[&r]
    }

    /// Number of components that still owe packets.
    #[must_use]
    pub fn n_undone_components(&self) -> usize {
        self.components.iter().filter(|c| !c.is_done()).count()
    }

    /// Refresh the done flag from component state.
    pub fn update_done(&mut self) {
        self.done = self.n_undone_components() == 0;
    }

    /// Rewrite `current_vertex_to_deepest` after merges: every entry maps to
    /// the root of its component in the merged tree.
    pub fn repair_current_deepest(&mut self) {
        let tree = &self.current_tree;
        for (v, deepest) in &mut self.current_vertex_to_deepest {
            if tree.contains(*v) {
                *deepest = tree.find_root(*v);
            }
        }
    }

    /// Freeze the converged component assignment.
    pub fn compute_final_connected_components(&mut self) {
        self.repair_current_deepest();
        self.final_vertex_to_deepest = self.current_vertex_to_deepest.clone();
        // Roots map to themselves so the assignment is idempotent.
        let roots: BTreeSet<AmrVertexId> =
            self.final_vertex_to_deepest.values().copied().collect();
        for r in roots {
            self.final_vertex_to_deepest.insert(r, r);
        }
    }

    /// Accumulate every active core cell into the integral of its final
    /// component; mass-like quantities carry the cell volume and the
    /// refinement scaling, counts stay raw.
    pub fn compute_local_integral(&mut self) {
        let scaling = self.scaling_factor();
        let mut integral: BTreeMap<AmrVertexId, IntegralValue> = BTreeMap::new();

        for p in self.local.core_cells() {
            if !self.local.is_active(p) {
                continue;
            }
            let v = self.local.vertex_at(p);
            let root = self.final_vertex_to_deepest[&v];
            let entry = integral.entry(root).or_insert_with(|| IntegralValue {
                extras: vec![0.0; self.extra_fabs.len()],
                ..IntegralValue::default()
            });
            entry.n_cells += 1;
            entry.n_vertices += 1;
            entry.total_mass += self.cell_volume * self.fab.value(p) * scaling;
            for (acc, fab) in entry.extras.iter_mut().zip(&self.extra_fabs) {
                *acc += self.cell_volume * fab.value(p) * scaling;
            }
        }

        self.local_integral = integral;
    }

    /// Position of a locally owned vertex in level-0 coordinates.
    #[must_use]
    pub fn coarsened_position(&self, v: AmrVertexId) -> Point3 {
        let p = self.local.position_of(v);
        scale_point(p, self.local.refinement(), 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch_of(
        gid: i32,
        core: Bounds,
        domain: Bounds,
        value: impl Fn(Point3) -> f64,
        links: Vec<NeighborLink>,
    ) -> FabPatch {
        let bounds = core.grown(1).clipped_to(&domain);
        let field = bounds.cells().map(value).collect();
        FabPatch {
            gid,
            level: 0,
            refinement: 1,
            core,
            bounds,
            field,
            extra_names: Vec::new(),
            extras: Vec::new(),
            links,
        }
    }

    #[test]
    fn local_tree_covers_active_cells() {
        let domain = Bounds::new([0, 0, 0], [3, 3, 3]);
        let core = Bounds::new([0, 0, 0], [3, 3, 3]);
        let patch = patch_of(0, core, domain, |_| 1.0, Vec::new());
        let mut b = ComponentBlock::new(patch, domain, false, 1.0).unwrap();
        b.init(0.0).unwrap();

        assert_eq!(b.current_tree.len(), 64);
        assert_eq!(b.n_active, 64);
        // Flat field: a single component rooted at the smallest vertex id.
        let root = b.current_tree.find_root(AmrVertexId::new(0, 5));
        assert_eq!(root, AmrVertexId::new(0, 0));
        assert!(b.components.is_empty());
        b.current_tree.check_monotone().unwrap();
    }

    #[test]
    fn outgoing_edges_match_ghost_faces() {
        let domain = Bounds::new([0, 0, 0], [7, 3, 3]);
        let core0 = Bounds::new([0, 0, 0], [3, 3, 3]);
        let core1 = Bounds::new([4, 0, 0], [7, 3, 3]);
        let link1 = NeighborLink {
            gid: 1,
            level: 0,
            refinement: 1,
            core: core1,
            bounds: core1.grown(1).clipped_to(&domain),
        };
        let patch = patch_of(0, core0, domain, |_| 2.0, vec![link1]);
        let mut b = ComponentBlock::new(patch, domain, true, 1.0).unwrap();
        b.init(1.0).unwrap();

        // One edge per cell of the shared 4x4 face.
        let edges = &b.gid_to_outgoing_edges[&1];
        assert_eq!(edges.len(), 16);
        for e in edges {
            assert_eq!(e.from.gid, 0);
            assert_eq!(e.to.gid, 1);
        }
        assert_eq!(b.components.len(), 1);
        assert_eq!(
            b.components[0].current_neighbors,
            BTreeSet::from([1])
        );
    }

    #[test]
    fn fine_face_fans_out_to_ratio_squared_edges() {
        // Coarse block 0 next to a fine block (refinement 2) on its +x side.
        let domain = Bounds::new([0, 0, 0], [3, 1, 1]);
        let core0 = Bounds::new([0, 0, 0], [1, 1, 1]);
        let fine_core = Bounds::new([4, 0, 0], [7, 3, 3]);
        let link = NeighborLink {
            gid: 1,
            level: 1,
            refinement: 2,
            core: fine_core,
            bounds: fine_core.grown(1),
        };
        let patch = patch_of(0, core0, domain, |_| 2.0, vec![link]);
        let mut b = ComponentBlock::new(patch, domain, true, 1.0).unwrap();
        b.init(1.0).unwrap();

        // Each coarse face cell sees 2x2 fine cells.
        let edges = &b.gid_to_outgoing_edges[&1];
        assert_eq!(edges.len(), 4 * core0.shape()[1] as usize * core0.shape()[2] as usize);
    }

    #[test]
    fn low_ghost_value_suppresses_the_edge() {
        let domain = Bounds::new([0, 0, 0], [7, 0, 0]);
        let core0 = Bounds::new([0, 0, 0], [3, 0, 0]);
        let core1 = Bounds::new([4, 0, 0], [7, 0, 0]);
        let link1 = NeighborLink {
            gid: 1,
            level: 0,
            refinement: 1,
            core: core1,
            bounds: core1.grown(1).clipped_to(&domain),
        };
        // Our side of the face is high, the neighbour's ghost copy is low.
        let patch = patch_of(
            0,
            core0,
            domain,
            |p| if p[0] <= 3 { 2.0 } else { 0.1 },
            vec![link1],
        );
        let mut b = ComponentBlock::new(patch, domain, true, 1.0).unwrap();
        b.init(1.0).unwrap();
        assert!(b.gid_to_outgoing_edges.is_empty());
    }
}
