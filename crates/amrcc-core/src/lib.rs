// crates/amrcc-core/src/lib.rs

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]

//! Distributed connected components of AMR scalar fields.
//!
//! The crate computes triplet merge trees over a block-decomposed adaptive
//! mesh: each block masks its cells, builds a local tree over the active
//! ones, and then merges trees with its neighbours through a round-based
//! exchange until the component structure reaches a global fixed point.
//! Persistence diagrams and per-component integrals are derived from the
//! converged state.

pub mod block;
pub mod edges;
pub mod engine;
pub mod error;
pub mod grid;
pub mod integral;
pub mod io;
pub mod masked_box;
pub mod persistence;
pub mod protocol;
pub mod triplet;
pub mod vertex;

pub use block::{Component, ComponentBlock, FabPatch, IntegralValue};
pub use edges::AmrEdge;
pub use error::{Error, Result};
pub use grid::{Bounds, Grid, Point3};
pub use masked_box::{Mask, MaskedBox, NeighborLink};
pub use triplet::{Node, TripletMergeTree};
pub use vertex::{AmrVertexId, SweepOrder};
