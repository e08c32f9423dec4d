// crates/amrcc-core/src/masked_box.rs

//! One block's view of the AMR field: its owned region, its ghost layer,
//! and the per-cell mask that classifies every cell of the bounds box.

use crate::error::{Error, Result};
use crate::grid::{Bounds, Grid, Point3};
use crate::vertex::AmrVertexId;
use serde::{Deserialize, Serialize};

/// Mask classes over the bounds region.
///
/// Partition invariant: core cells are `Active`, `Low`, or `MaskedByFiner`;
/// ghost-layer cells are `Ghost` or `MaskedByFiner`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Mask {
    /// Owned here and above threshold.
    Active,
    /// Owned here, below threshold; contributes only to the mean denominator.
    Low,
    /// Refined away by the finer block with this gid.
    MaskedByFiner(i32),
    /// Owned by the same-or-coarser neighbour with this gid.
    Ghost(i32),
}

/// Geometry of one neighbour block, as delivered by the reader's link.
/// Boxes are in the neighbour's own refinement coordinates.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NeighborLink {
    /// Neighbour's gid.
    pub gid: i32,
    /// Neighbour's refinement level.
    pub level: i32,
    /// Neighbour's cumulative refinement factor (1 at level 0).
    pub refinement: i32,
    /// Neighbour's owned cells.
    pub core: Bounds,
    /// Neighbour's ghost-expanded box.
    pub bounds: Bounds,
}

/// The masked box of one block.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaskedBox {
    gid: i32,
    level: i32,
    refinement: i32,
    core: Bounds,
    bounds: Bounds,
    mask: Vec<Mask>,
}

impl MaskedBox {
    /// Build the box and resolve ownership of every bounds cell.
    ///
    /// For each cell, the covering neighbour at the finest level wins; level
    /// ties break toward the smaller gid. A finer owner masks the cell; a
    /// same-or-coarser owner outside our core makes it a ghost; everything
    /// else is tentatively active. The LOW demotion happens separately in
    /// [`MaskedBox::set_low`] once the absolute threshold is known.
    ///
    /// Fails when a ghost-layer cell has no covering link: every cell of
    /// `bounds \ core` must end up ghost or masked, so an incomplete link
    /// list is a protocol violation, not a recoverable state.
    pub fn new(
        gid: i32,
        level: i32,
        refinement: i32,
        core: Bounds,
        bounds: Bounds,
        links: &[NeighborLink],
    ) -> Result<Self> {
        let n = usize::try_from(bounds.size()).unwrap_or(0);
        let mut mask = Vec::with_capacity(n);

        for p in bounds.cells() {
            let mut best: Option<&NeighborLink> = None;
            for link in links.iter().filter(|l| l.gid != gid) {
                let covers = if link.refinement >= refinement {
                    let region = Bounds::new(p, p).scaled(refinement, link.refinement);
                    link.core.intersects(&region)
                } else {
                    let q = crate::grid::scale_point(p, refinement, link.refinement);
                    link.core.contains(q)
                };
                if !covers {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some(b) => link.level > b.level || (link.level == b.level && link.gid < b.gid),
                };
                if better {
                    best = Some(link);
                }
            }

            let m = match best {
                Some(l) if l.level > level => Mask::MaskedByFiner(l.gid),
                _ if core.contains(p) => Mask::Active,
                Some(l) => Mask::Ghost(l.gid),
                None => {
                    return Err(Error::protocol(
                        gid,
                        0,
                        format!("ghost cell [{},{},{}] has no covering link", p[0], p[1], p[2]),
                    ));
                }
            };
            mask.push(m);
        }

        Ok(Self {
            gid,
            level,
            refinement,
            core,
            bounds,
            mask,
        })
    }

    /// Demote active core cells whose value falls below the threshold.
    pub fn set_low(&mut self, fab: &Grid, absolute_rho: f64) {
        for p in self.bounds.cells() {
            let idx = self.bounds.index_of(p).expect("cell inside bounds") as usize;
            if self.mask[idx] == Mask::Active && fab.value(p) < absolute_rho {
                self.mask[idx] = Mask::Low;
            }
        }
    }

    /// Owning block.
    #[inline]
    #[must_use]
    pub const fn gid(&self) -> i32 {
        self.gid
    }

    /// Refinement level (0 is coarsest).
    #[inline]
    #[must_use]
    pub const fn level(&self) -> i32 {
        self.level
    }

    /// Cumulative refinement factor.
    #[inline]
    #[must_use]
    pub const fn refinement(&self) -> i32 {
        self.refinement
    }

    /// Owned cells.
    #[inline]
    #[must_use]
    pub const fn core(&self) -> &Bounds {
        &self.core
    }

    /// Owned-plus-ghost region.
    #[inline]
    #[must_use]
    pub const fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Mask of cell `p`.
    ///
    /// # Panics
    /// Panics if `p` is outside the bounds box.
    #[inline]
    #[must_use]
    pub fn mask_at(&self, p: Point3) -> Mask {
        let idx = self.bounds.index_of(p).expect("cell inside bounds");
        self.mask[idx as usize]
    }

    /// Mask of the cell addressed by a local vertex id.
    #[inline]
    #[must_use]
    pub fn mask_of(&self, v: AmrVertexId) -> Mask {
        debug_assert_eq!(v.gid, self.gid);
        self.mask[v.index as usize]
    }

    /// Whether cell `p` is active.
    #[inline]
    #[must_use]
    pub fn is_active(&self, p: Point3) -> bool {
        self.mask_at(p) == Mask::Active
    }

    /// Vertex id of cell `p` (index into the bounds box).
    ///
    /// # Panics
    /// Panics if `p` is outside the bounds box.
    #[inline]
    #[must_use]
    pub fn vertex_at(&self, p: Point3) -> AmrVertexId {
        let idx = self.bounds.index_of(p).expect("cell inside bounds");
        AmrVertexId::new(self.gid, idx)
    }

    /// Global position of a local vertex id, in this block's refinement.
    #[inline]
    #[must_use]
    pub fn position_of(&self, v: AmrVertexId) -> Point3 {
        debug_assert_eq!(v.gid, self.gid);
        self.bounds.position_of(v.index)
    }

    /// Iterate active cells of the bounds box.
    pub fn active_cells(&self) -> impl Iterator<Item = Point3> + '_ {
        self.bounds.cells().filter(move |&p| self.is_active(p))
    }

    /// Iterate core cells.
    pub fn core_cells(&self) -> impl Iterator<Item = Point3> + '_ {
        self.core.cells()
    }

    /// Integral weight of one cell: summing `value * scaling_factor` over
    /// all levels reproduces the coarsest-level integral.
    #[inline]
    #[must_use]
    pub fn scaling_factor(&self) -> f64 {
        (1.0 / f64::from(self.refinement)).powi(crate::grid::DIM as i32)
    }

    /// Counts of (active, low, masked-by-finer, ghost) cells.
    #[must_use]
    pub fn mask_counts(&self) -> (u64, u64, u64, u64) {
        let mut counts = (0, 0, 0, 0);
        for m in &self.mask {
            match m {
                Mask::Active => counts.0 += 1,
                Mask::Low => counts.1 += 1,
                Mask::MaskedByFiner(_) => counts.2 += 1,
                Mask::Ghost(_) => counts.3 += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_block(gid: i32, core: Bounds, domain: Bounds, links: &[NeighborLink]) -> MaskedBox {
        let bounds = core.grown(1).clipped_to(&domain);
        MaskedBox::new(gid, 0, 1, core, bounds, links).unwrap()
    }

    #[test]
    fn mask_partitions_bounds() {
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
        let b = flat_block(0, core0, domain, &[link1]);

        let (active, low, masked, ghost) = b.mask_counts();
        assert_eq!(active + low + masked + ghost, b.bounds().size() as u64);
        assert_eq!(active, 64);
        assert_eq!(ghost, 16);
        assert_eq!(masked, 0);

        // Core cells never carry a ghost mask.
        for p in b.core_cells() {
            assert!(!matches!(b.mask_at(p), Mask::Ghost(_)));
        }
        // The shared face is ghost, owned by block 1.
        assert_eq!(b.mask_at([4, 1, 1]), Mask::Ghost(1));
    }

    #[test]
    fn finer_neighbour_masks_core_cells() {
        let domain = Bounds::new([0, 0, 0], [3, 3, 3]);
        let core0 = Bounds::new([0, 0, 0], [3, 3, 3]);
        // Fine block covers coarse cells [1,2]^3 at refinement 2.
        let fine_core = Bounds::new([2, 2, 2], [5, 5, 5]);
        let link = NeighborLink {
            gid: 7,
            level: 1,
            refinement: 2,
            core: fine_core,
            bounds: fine_core.grown(1).clipped_to(&Bounds::new([0, 0, 0], [7, 7, 7])),
        };
        let b = flat_block(0, core0, domain, &[link]);

        assert_eq!(b.mask_at([1, 1, 1]), Mask::MaskedByFiner(7));
        assert_eq!(b.mask_at([2, 2, 2]), Mask::MaskedByFiner(7));
        assert_eq!(b.mask_at([0, 0, 0]), Mask::Active);
        assert_eq!(b.mask_at([3, 3, 3]), Mask::Active);
    }

    #[test]
    fn level_tie_breaks_toward_smaller_gid() {
        let domain = Bounds::new([0, 0, 0], [7, 3, 3]);
        let core0 = Bounds::new([4, 0, 0], [7, 3, 3]);
        let left = NeighborLink {
            gid: 2,
            level: 0,
            refinement: 1,
            core: Bounds::new([0, 0, 0], [3, 3, 3]),
            bounds: Bounds::new([0, 0, 0], [4, 3, 3]),
        };
        // A bogus second claimant for the same cells at the same level.
        let clone = NeighborLink {
            gid: 9,
            level: 0,
            refinement: 1,
            core: Bounds::new([0, 0, 0], [3, 3, 3]),
            bounds: Bounds::new([0, 0, 0], [4, 3, 3]),
        };
        let b = flat_block(1, core0, domain, &[clone, left]);
        assert_eq!(b.mask_at([3, 1, 1]), Mask::Ghost(2));
    }

    #[test]
    fn uncovered_ghost_cell_is_rejected() {
        let domain = Bounds::new([0, 0, 0], [7, 3, 3]);
        let core = Bounds::new([0, 0, 0], [3, 3, 3]);
        let bounds = core.grown(1).clipped_to(&domain);
        // The +x ghost face has an owner, but the link list does not name it.
        let err = MaskedBox::new(0, 0, 1, core, bounds, &[]).unwrap_err();
        assert!(matches!(err, Error::Protocol { gid: 0, .. }));
    }

    #[test]
    fn set_low_demotes_only_active_core() {
        let domain = Bounds::new([0, 0, 0], [3, 3, 3]);
        let core = Bounds::new([0, 0, 0], [3, 3, 3]);
        let mut b = flat_block(0, core, domain, &[]);
        let mut fab = Grid::constant(*b.bounds(), 1.0);
        fab.set([1, 1, 1], 0.25);

        b.set_low(&fab, 0.5);
        assert_eq!(b.mask_at([1, 1, 1]), Mask::Low);
        assert_eq!(b.mask_at([0, 0, 0]), Mask::Active);
    }
}
