// crates/amrcc-grid/src/lib.rs

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]

//! Grid-file format, synthetic fields, and AMR block decomposition.
//!
//! This crate implements the reader side of the pipeline: it turns a grid
//! file (a level-0 field plus finer patches) into per-block
//! [`amrcc_core::FabPatch`] handoffs with ghost layers and neighbour links.

pub mod format;
pub mod generator;
pub mod io;
pub mod partition;

pub use format::{AmrPatch, GridFile, NamedField, GRID_FILE_VERSION};
pub use io::{read_grid_auto, write_grid_auto};
pub use partition::{decompose, split_domain, Decomposition};
