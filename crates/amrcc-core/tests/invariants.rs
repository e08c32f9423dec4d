//! Engine invariants under randomised 1-D profiles.
//!
//! The strongest check here is decomposition invariance: running the same
//! profile as one block or split across two blocks must produce the same
//! component roots (by position) and the same persistence diagram. Equal
//! values are frequent by construction, so the `(gid, index)` tie-breaking
//! rules are exercised heavily.

use amrcc_core::persistence::{block_diagram, DiagramParams};
use amrcc_core::{engine, AmrVertexId, Bounds, ComponentBlock, FabPatch, NeighborLink, Point3};
use amrcc_runtime::Master;
use proptest::prelude::*;
use std::collections::BTreeSet;

const RHO: f64 = 0.25;

fn patch(gid: i32, core: Bounds, domain: Bounds, values: &[f64]) -> FabPatch {
    let bounds = core.grown(1).clipped_to(&domain);
    FabPatch {
        gid,
        level: 0,
        refinement: 1,
        core,
        bounds,
        field: bounds.cells().map(|p| values[p[0] as usize]).collect(),
        extra_names: Vec::new(),
        extras: Vec::new(),
        links: Vec::new(),
    }
}

fn run(mut patches: Vec<FabPatch>, domain: Bounds, negate: bool) -> Master<ComponentBlock> {
    let links: Vec<NeighborLink> = patches
        .iter()
        .map(|p| NeighborLink {
            gid: p.gid,
            level: p.level,
            refinement: p.refinement,
            core: p.core,
            bounds: p.bounds,
        })
        .collect();
    for p in &mut patches {
        p.links = links
            .iter()
            .filter(|l| l.gid != p.gid && l.bounds.intersects(&p.bounds))
            .cloned()
            .collect();
    }

    let mut master = Master::new();
    engine::add_patches(&mut master, patches, domain, negate, 1.0).unwrap();
    let rho = engine::resolve_threshold(&mut master, RHO, true).unwrap();
    engine::init_blocks(&mut master, rho).unwrap();
    engine::compute_tree(&mut master).unwrap();
    master.foreach(|b: &mut ComponentBlock, _p| -> amrcc_core::Result<()> {
        b.compute_final_connected_components();
        Ok(())
    })
    .unwrap();
    master
}

/// Sorted multiset of `(birth, death)` entries across all blocks.
fn full_diagram(master: &mut Master<ComponentBlock>) -> Vec<(f64, f64)> {
    let params = DiagramParams {
        threshold: RHO,
        ignore_zero_persistence: true,
    };
    let mut out = Vec::new();
    for gid in master.gids() {
        let b = master.block_mut(gid).unwrap();
        out.extend(block_diagram(b, params));
    }
    out.sort_by(|a, b| a.partial_cmp(b).unwrap());
    out
}

/// Map every active cell position to the position of its final root.
fn roots_by_position(master: &mut Master<ComponentBlock>) -> Vec<(Point3, Point3)> {
    let mut positions = Vec::new();
    let gids = master.gids();
    // Root positions must be resolved on the owning block.
    let resolve: Vec<(i32, AmrVertexId, AmrVertexId)> = {
        let mut list = Vec::new();
        for &gid in &gids {
            let b = master.block_mut(gid).unwrap();
            for p in b.local.core_cells().collect::<Vec<_>>() {
                if b.local.is_active(p) {
                    let v = b.local.vertex_at(p);
                    list.push((gid, v, b.final_vertex_to_deepest[&v]));
                }
            }
        }
        list
    };
    for (gid, v, root) in resolve {
        let vp = {
            let b = master.block_mut(gid).unwrap();
            b.local.position_of(v)
        };
        let rp = {
            let b = master.block_mut(root.gid).unwrap();
            b.local.position_of(root)
        };
        positions.push((vp, rp));
    }
    positions.sort();
    positions
}

fn profile() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0u8..6, 16)
        .prop_map(|v| v.into_iter().map(|x| f64::from(x) * 0.5).collect())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 32,
        .. ProptestConfig::default()
    })]

    #[test]
    fn split_profile_matches_single_block(values in profile(), negate: bool) {
        let domain = Bounds::new([0, 0, 0], [15, 0, 0]);

        let mut single = run(
            vec![patch(0, domain, domain, &values)],
            domain,
            negate,
        );
        let mut split = run(
            vec![
                patch(0, Bounds::new([0, 0, 0], [7, 0, 0]), domain, &values),
                patch(1, Bounds::new([8, 0, 0], [15, 0, 0]), domain, &values),
            ],
            domain,
            negate,
        );

        prop_assert_eq!(full_diagram(&mut single), full_diagram(&mut split));
        prop_assert_eq!(roots_by_position(&mut single), roots_by_position(&mut split));
    }

    #[test]
    fn convergence_and_idempotence(values in profile(), negate: bool) {
        let domain = Bounds::new([0, 0, 0], [15, 0, 0]);
        let mut split = run(
            vec![
                patch(0, Bounds::new([0, 0, 0], [7, 0, 0]), domain, &values),
                patch(1, Bounds::new([8, 0, 0], [15, 0, 0]), domain, &values),
            ],
            domain,
            negate,
        );

        for gid in split.gids() {
            let b = split.block_mut(gid).unwrap();
            // Every component's neighbour set is fully processed.
            for c in &b.components {
                prop_assert!(c.current_neighbors.is_subset(&c.processed_neighbors));
            }
            // Applying the final assignment twice equals applying it once.
            let images: BTreeSet<AmrVertexId> =
                b.final_vertex_to_deepest.values().copied().collect();
            for root in images {
                if let Some(again) = b.final_vertex_to_deepest.get(&root) {
                    prop_assert_eq!(*again, root);
                }
            }
            // Monotone parents survive every merge round.
            b.current_tree.check_monotone().unwrap();
        }
    }

    #[test]
    fn edge_symmetry_after_round_one(values in profile()) {
        let domain = Bounds::new([0, 0, 0], [15, 0, 0]);
        let mut split = run(
            vec![
                patch(0, Bounds::new([0, 0, 0], [7, 0, 0]), domain, &values),
                patch(1, Bounds::new([8, 0, 0], [15, 0, 0]), domain, &values),
            ],
            domain,
            true,
        );

        let mirrored: BTreeSet<_> = {
            let b0 = split.block_mut(0).unwrap();
            b0.gid_to_outgoing_edges
                .values()
                .flatten()
                .map(|e| e.flipped())
                .collect()
        };
        let stored: BTreeSet<_> = {
            let b1 = split.block_mut(1).unwrap();
            b1.gid_to_outgoing_edges
                .values()
                .flatten()
                .copied()
                .collect()
        };
        prop_assert_eq!(mirrored, stored);
    }
}
