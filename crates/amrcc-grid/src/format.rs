// crates/amrcc-grid/src/format.rs

//! Versioned grid-file payload: a level-0 field sampled over the whole
//! domain plus optional finer patches, each carrying the same field names.

use amrcc_core::Bounds;
use serde::{Deserialize, Serialize};

/// Current wire version.
pub const GRID_FILE_VERSION: u16 = 1;

/// One named scalar field, x-fastest over its region.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedField {
    /// Field name, referenced by `--function-fields` / `--integral-fields`.
    pub name: String,
    /// Samples, one per cell.
    pub values: Vec<f64>,
}

/// A finer patch overlaying part of the level-0 domain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AmrPatch {
    /// Refinement level (> 0).
    pub level: i32,
    /// Cumulative refinement factor relative to level 0.
    pub refinement: i32,
    /// Patch box in its own refinement coordinates.
    pub region: Bounds,
    /// Field samples over `region`, same names as the level-0 fields.
    pub fields: Vec<NamedField>,
}

/// The on-disk payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridFile {
    /// Wire version tag.
    pub version: u16,
    /// Level-0 domain shape.
    pub shape: [i32; 3],
    /// Volume of one finest-level cell.
    pub cell_volume: f64,
    /// Level-0 fields over the whole domain.
    pub fields: Vec<NamedField>,
    /// Finer patches, possibly empty.
    pub patches: Vec<AmrPatch>,
}

impl GridFile {
    /// The level-0 domain box `[0, shape)`.
    #[must_use]
    pub fn domain(&self) -> Bounds {
        Bounds::new(
            [0, 0, 0],
            [self.shape[0] - 1, self.shape[1] - 1, self.shape[2] - 1],
        )
    }

    /// Look up a level-0 field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&NamedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}
