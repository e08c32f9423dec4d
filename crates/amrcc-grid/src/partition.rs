// crates/amrcc-grid/src/partition.rs

//! Decompose a grid file into blocks with ghost layers and neighbour links.
//!
//! Level 0 is split into `nblocks` bricks by repeated halving of the largest
//! brick along its longest axis; every finer patch becomes one extra block.
//! Ghost values are filled from whoever owns the cell: a sibling patch at
//! the same refinement, or the level-0 field by piecewise-constant
//! injection.

use crate::format::{AmrPatch, GridFile, NamedField};
use amrcc_core::{Bounds, FabPatch, NeighborLink, Point3};
use anyhow::{bail, Context, Result};
use tracing::debug;

/// Result of a decomposition: one patch per block plus domain metadata.
#[derive(Debug)]
pub struct Decomposition {
    /// Reader → engine patches, gid-ordered.
    pub patches: Vec<FabPatch>,
    /// Level-0 domain box.
    pub domain: Bounds,
    /// Volume of one finest-level cell.
    pub cell_volume: f64,
}

/// Split `domain` into `nblocks` bricks: repeatedly halve the largest brick
/// along its longest axis. Deterministic, and exact for power-of-two counts.
#[must_use]
pub fn split_domain(domain: Bounds, nblocks: usize) -> Vec<Bounds> {
    let mut bricks = vec![domain];
    while bricks.len() < nblocks {
        let (idx, _) = bricks
            .iter()
            .enumerate()
            .max_by_key(|(i, b)| (b.size(), std::cmp::Reverse(*i)))
            .expect("at least one brick");
        let brick = bricks[idx];
        let shape = brick.shape();
        let axis = (0..3usize).max_by_key(|&a| shape[a]).expect("three axes");
        if shape[axis] < 2 {
            break;
        }
        let mid = brick.min[axis] + shape[axis] / 2;
        let mut left = brick;
        left.max[axis] = mid - 1;
        let mut right = brick;
        right.min[axis] = mid;
        bricks[idx] = left;
        bricks.push(right);
    }
    bricks.sort_by_key(|b| (b.min[2], b.min[1], b.min[0]));
    bricks
}

struct ProtoBlock {
    level: i32,
    refinement: i32,
    core: Bounds,
    bounds: Bounds,
}

/// Sample a named field at position `p` given in `refinement` coordinates:
/// from the owning sibling patch if one covers the cell, otherwise injected
/// from the level-0 grid.
fn sample(
    file: &GridFile,
    name: &str,
    p: Point3,
    refinement: i32,
    skip_patch: Option<usize>,
) -> Result<f64> {
    for (i, patch) in file.patches.iter().enumerate() {
        if skip_patch == Some(i) || patch.refinement < refinement {
            continue;
        }
        let q = amrcc_core::grid::scale_point(p, refinement, patch.refinement);
        if patch.region.contains(q) {
            let field = patch
                .fields
                .iter()
                .find(|f| f.name == name)
                .with_context(|| format!("patch is missing field {name}"))?;
            let idx = patch.region.index_of(q).expect("cell inside patch region");
            return Ok(field.values[idx as usize]);
        }
    }

    let q = amrcc_core::grid::scale_point(p, refinement, 1);
    let field = file
        .field(name)
        .with_context(|| format!("unknown field {name}"))?;
    let idx = file
        .domain()
        .index_of(q)
        .with_context(|| format!("cell {q:?} outside the domain"))?;
    Ok(field.values[idx as usize])
}

/// Fill a dense grid over `bounds` (in `refinement` coordinates) for the
/// summed function fields or for one named field.
fn fill(
    file: &GridFile,
    names: &[String],
    bounds: Bounds,
    refinement: i32,
) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(usize::try_from(bounds.size()).unwrap_or(0));
    for p in bounds.cells() {
        let mut v = 0.0;
        for name in names {
            v += sample(file, name, p, refinement, None)?;
        }
        values.push(v);
    }
    Ok(values)
}

/// Decompose a grid file into engine patches.
///
/// `function_fields` are summed into the merge-tree function (the first
/// field of the file when empty); `integral_fields` ride along as extra
/// grids. Unknown names are configuration errors.
pub fn decompose(
    file: &GridFile,
    nblocks: usize,
    function_fields: &[String],
    integral_fields: &[String],
) -> Result<Decomposition> {
    if file.fields.is_empty() {
        bail!("grid file has no fields");
    }
    let function_fields: Vec<String> = if function_fields.is_empty() {
        vec![file.fields[0].name.clone()]
    } else {
        function_fields.to_vec()
    };
    for name in function_fields.iter().chain(integral_fields) {
        if file.field(name).is_none() {
            bail!("unknown field {name}");
        }
    }
    for patch in &file.patches {
        if patch.level <= 0 || patch.refinement <= 1 {
            bail!(
                "patch at level {} refinement {} is not finer than the domain",
                patch.level,
                patch.refinement
            );
        }
    }

    let domain = file.domain();
    let mut protos: Vec<ProtoBlock> = split_domain(domain, nblocks.max(1))
        .into_iter()
        .map(|core| ProtoBlock {
            level: 0,
            refinement: 1,
            core,
            bounds: core.grown(1).clipped_to(&domain),
        })
        .collect();
    for patch in &file.patches {
        let fine_domain = domain.scaled(1, patch.refinement);
        protos.push(ProtoBlock {
            level: patch.level,
            refinement: patch.refinement,
            core: patch.region,
            bounds: patch.region.grown(1).clipped_to(&fine_domain),
        });
    }

    debug!(
        blocks = protos.len(),
        coarse = protos.iter().filter(|p| p.level == 0).count(),
        "decomposed domain"
    );

    let mut patches = Vec::with_capacity(protos.len());
    for (gid, proto) in protos.iter().enumerate() {
        let gid = gid as i32;

        // Link every block whose ghost-expanded box overlaps ours at a
        // common refinement; the mask construction sorts out ownership.
        let mut links = Vec::new();
        for (ngid, other) in protos.iter().enumerate() {
            let ngid = ngid as i32;
            if ngid == gid {
                continue;
            }
            let common = proto.refinement.max(other.refinement);
            let mine = proto.bounds.scaled(proto.refinement, common);
            let theirs = other.bounds.scaled(other.refinement, common);
            if mine.intersects(&theirs) {
                links.push(NeighborLink {
                    gid: ngid,
                    level: other.level,
                    refinement: other.refinement,
                    core: other.core,
                    bounds: other.bounds,
                });
            }
        }

        let fine_patch_index = (gid as usize).checked_sub(protos.len() - file.patches.len());
        let field = match fine_patch_index {
            // Fine block: core values come from the patch itself.
            Some(pi) => {
                let patch = &file.patches[pi];
                fill_patch_block(file, patch, pi, &function_fields, proto.bounds)?
            }
            None => fill(file, &function_fields, proto.bounds, proto.refinement)?,
        };

        let mut extras = Vec::with_capacity(integral_fields.len());
        for name in integral_fields {
            let one = [name.clone()];
            let values = match fine_patch_index {
                Some(pi) => fill_patch_block(file, &file.patches[pi], pi, &one, proto.bounds)?,
                None => fill(file, &one, proto.bounds, proto.refinement)?,
            };
            extras.push(values);
        }

        patches.push(FabPatch {
            gid,
            level: proto.level,
            refinement: proto.refinement,
            core: proto.core,
            bounds: proto.bounds,
            field,
            extra_names: integral_fields.to_vec(),
            extras,
            links,
        });
    }

    Ok(Decomposition {
        patches,
        domain,
        cell_volume: file.cell_volume,
    })
}

/// Fill a fine block's grid: core cells from its own patch data, ghost
/// cells from siblings or the coarse level.
fn fill_patch_block(
    file: &GridFile,
    patch: &AmrPatch,
    patch_index: usize,
    names: &[String],
    bounds: Bounds,
) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(usize::try_from(bounds.size()).unwrap_or(0));
    for p in bounds.cells() {
        let mut v = 0.0;
        for name in names {
            if patch.region.contains(p) {
                let field = own_field(patch, name)?;
                let idx = patch.region.index_of(p).expect("cell inside patch region");
                v += field.values[idx as usize];
            } else {
                v += sample(file, name, p, patch.refinement, Some(patch_index))?;
            }
        }
        values.push(v);
    }
    Ok(values)
}

fn own_field<'a>(patch: &'a AmrPatch, name: &str) -> Result<&'a NamedField> {
    patch
        .fields
        .iter()
        .find(|f| f.name == name)
        .with_context(|| format!("patch is missing field {name}"))
}
