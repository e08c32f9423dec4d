// crates/amrcc-core/src/persistence.rs

//! Persistence diagram extraction and output.
//!
//! Each block traverses its merged tree and reports the pairs whose birth
//! vertex it owns, so every pair is written exactly once across all blocks.

use crate::block::ComponentBlock;
use crate::error::{Error, Result};
use amrcc_runtime::Master;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Diagram filter settings.
#[derive(Debug, Clone, Copy)]
pub struct DiagramParams {
    /// The resolved absolute threshold; deaths crossing it are clamped to
    /// the polarity's infinity.
    pub threshold: f64,
    /// Drop pairs whose birth equals their death.
    pub ignore_zero_persistence: bool,
}

/// Collect this block's `(birth, death)` pairs. Unpaired extrema emit a ray
/// to the polarity's infinity; rays bypass the filters.
#[must_use]
pub fn block_diagram(b: &ComponentBlock, params: DiagramParams) -> Vec<(f64, f64)> {
    let negate = b.negate;
    let mut out = Vec::new();

    b.current_tree.traverse_persistence(|from, through, to| {
        if from.vertex.gid != b.gid {
            return;
        }
        if from.vertex == to.vertex {
            let ray = if negate {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            };
            out.push((from.value, ray));
            return;
        }

        let birth = from.value;
        let mut death = through.value;
        if negate {
            if birth < params.threshold {
                return;
            }
            if death < params.threshold {
                death = f64::NEG_INFINITY;
            }
        } else {
            if birth > params.threshold {
                return;
            }
            if death > params.threshold {
                death = f64::INFINITY;
            }
        }
        if params.ignore_zero_persistence && birth == death {
            return;
        }
        out.push((birth, death));
    });

    out
}

/// Write one diagram file per block: `{prefix}-b{gid}.dgm`, one
/// `"birth death"` line per pair.
pub fn write_diagrams(
    master: &mut Master<ComponentBlock>,
    prefix: &Path,
    params: DiagramParams,
) -> Result<()> {
    master.foreach(|b: &mut ComponentBlock, _proxy| -> Result<()> {
        let path = diagram_path(prefix, b.gid);
        let file = File::create(&path).map_err(Error::from)?;
        let mut w = BufWriter::new(file);
        for (birth, death) in block_diagram(b, params) {
            writeln!(w, "{birth} {death}").map_err(Error::from)?;
        }
        w.flush().map_err(Error::from)?;
        Ok(())
    })
}

/// Per-block diagram path.
#[must_use]
pub fn diagram_path(prefix: &Path, gid: i32) -> std::path::PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("-b{gid}.dgm"));
    std::path::PathBuf::from(name)
}
