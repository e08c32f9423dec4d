// crates/amrcc-core/src/integral.rs

//! Integral and vertex-to-halo output.
//!
//! Both files are written after [`crate::engine::finalize_components`], when
//! every locally rooted component holds the global totals of its cells.

use crate::block::ComponentBlock;
use crate::error::{Error, Result};
use crate::grid::Bounds;
use amrcc_runtime::Master;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Flat index of a level-0 position in the domain box, first axis fastest.
#[must_use]
pub fn domain_flat_index(domain: &Bounds, p: [i32; 3]) -> i64 {
    let s = domain.shape();
    let dx = i64::from(p[0] - domain.min[0]);
    let dy = i64::from(p[1] - domain.min[1]);
    let dz = i64::from(p[2] - domain.min[2]);
    dx + i64::from(s[0]) * (dy + i64::from(s[1]) * dz)
}

/// Write one line per retained component:
/// `flat-index x y z n_cells n_vertices total_mass [extras…]`.
///
/// Only locally rooted components are reported by each block, so a component
/// appears exactly once; positions are in level-0 coordinates.
pub fn write_integral(
    master: &mut Master<ComponentBlock>,
    path: &Path,
    min_cells: u64,
) -> Result<()> {
    let file = File::create(path).map_err(Error::from)?;
    let mut w = BufWriter::new(file);

    master.foreach(|b: &mut ComponentBlock, _proxy| -> Result<()> {
        for (root, value) in &b.local_integral {
            if root.gid != b.gid || value.n_cells < min_cells {
                continue;
            }
            let pos = b.coarsened_position(*root);
            write!(
                w,
                "{} {} {} {} {} {} {}",
                domain_flat_index(&b.domain, pos),
                pos[0],
                pos[1],
                pos[2],
                value.n_cells,
                value.n_vertices,
                value.total_mass
            )
            .map_err(Error::from)?;
            for extra in &value.extras {
                write!(w, " {extra}").map_err(Error::from)?;
            }
            writeln!(w).map_err(Error::from)?;
        }
        Ok(())
    })?;

    w.flush().map_err(Error::from)?;
    Ok(())
}

/// Write `vx vy vz rx ry rz` per active vertex of every locally rooted
/// component surviving `min_cells`, in level-0 coordinates.
pub fn write_vertex_to_halo(
    master: &mut Master<ComponentBlock>,
    path: &Path,
    min_cells: u64,
) -> Result<()> {
    let file = File::create(path).map_err(Error::from)?;
    let mut w = BufWriter::new(file);

    master.foreach(|b: &mut ComponentBlock, _proxy| -> Result<()> {
        for (vertex, root) in &b.final_vertex_to_deepest {
            if vertex.gid != b.gid || root.gid != b.gid {
                continue;
            }
            let Some(value) = b.local_integral.get(root) else {
                continue;
            };
            if value.n_cells < min_cells {
                continue;
            }
            let vp = b.coarsened_position(*vertex);
            let rp = b.coarsened_position(*root);
            writeln!(w, "{} {} {} {} {} {}", vp[0], vp[1], vp[2], rp[0], rp[1], rp[2])
                .map_err(Error::from)?;
        }
        Ok(())
    })?;

    w.flush().map_err(Error::from)?;
    Ok(())
}
