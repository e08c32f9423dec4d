// crates/amrcc-core/src/io.rs

//! Saved-tree serialisation.
//!
//! A block's saved record is its merged triplet tree, its masked box, and
//! its component roots, CBOR-encoded. The default layout is one file with
//! every record; split mode writes one file per block for runs where blocks
//! are collected by different writers.

use crate::block::ComponentBlock;
use crate::error::{Error, Result};
use crate::masked_box::MaskedBox;
use crate::triplet::TripletMergeTree;
use crate::vertex::AmrVertexId;
use amrcc_runtime::Master;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// One block's persisted record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SavedBlock {
    /// Block gid.
    pub gid: i32,
    /// The merged triplet tree at convergence.
    pub tree: TripletMergeTree,
    /// The block's masked box.
    pub masked_box: MaskedBox,
    /// Roots of the block's components.
    pub component_roots: Vec<AmrVertexId>,
}

impl SavedBlock {
    /// Snapshot a converged block.
    #[must_use]
    pub fn of(b: &ComponentBlock) -> Self {
        Self {
            gid: b.gid,
            tree: b.current_tree.clone(),
            masked_box: b.local.clone(),
            component_roots: b.components.iter().map(|c| c.root).collect(),
        }
    }
}

/// Serialize any value to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| Error::Config(format!("serialize CBOR: {e}")))?;
    Ok(buf)
}

/// Deserialize any value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| Error::Config(format!("deserialize CBOR: {e}")))
}

/// Per-block path used by split mode.
#[must_use]
pub fn split_path(path: &Path, gid: i32) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!("-b{gid}"));
    PathBuf::from(name)
}

/// Write every block's saved record; one file, or one per block in split
/// mode.
pub fn write_tree_blocks(
    master: &mut Master<ComponentBlock>,
    path: &Path,
    split: bool,
) -> Result<()> {
    if split {
        master.foreach(|b: &mut ComponentBlock, _proxy| -> Result<()> {
            let record = SavedBlock::of(b);
            let file = File::create(split_path(path, b.gid)).map_err(Error::from)?;
            ciborium::ser::into_writer(&record, BufWriter::new(file))
                .map_err(|e| Error::Config(format!("serialize saved block: {e}")))?;
            Ok(())
        })?;
        return Ok(());
    }

    let mut records = Vec::new();
    master.foreach(|b: &mut ComponentBlock, _proxy| -> Result<()> {
        records.push(SavedBlock::of(b));
        Ok(())
    })?;
    let file = File::create(path).map_err(Error::from)?;
    ciborium::ser::into_writer(&records, BufWriter::new(file))
        .map_err(|e| Error::Config(format!("serialize saved blocks: {e}")))?;
    Ok(())
}

/// Read back a non-split saved-tree file.
pub fn read_tree_blocks(path: &Path) -> Result<Vec<SavedBlock>> {
    let file = File::open(path).map_err(Error::from)?;
    let records: Vec<SavedBlock> = ciborium::de::from_reader(BufReader::new(file))
        .map_err(|e| Error::Config(format!("deserialize saved blocks: {e}")))?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triplet::TripletMergeTree;
    use crate::vertex::AmrVertexId;

    #[test]
    fn cbor_helpers_round_trip() {
        let mut tree = TripletMergeTree::new(true);
        tree.add(AmrVertexId::new(0, 0), 2.0);
        tree.add(AmrVertexId::new(0, 1), 1.0);
        tree.merge_edge(AmrVertexId::new(0, 0), AmrVertexId::new(0, 1));

        let bytes = to_cbor(&tree).unwrap();
        let back: TripletMergeTree = from_cbor(&bytes).unwrap();
        assert_eq!(back, tree);
    }

    #[test]
    fn saved_blocks_round_trip_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trees.mt");

        let mut tree = TripletMergeTree::new(false);
        tree.add(AmrVertexId::new(3, 7), 0.5);
        let record = SavedBlock {
            gid: 3,
            tree,
            masked_box: crate::masked_box::MaskedBox::new(
                3,
                0,
                1,
                crate::grid::Bounds::new([0, 0, 0], [1, 1, 1]),
                crate::grid::Bounds::new([0, 0, 0], [1, 1, 1]),
                &[],
            )
            .unwrap(),
            component_roots: vec![AmrVertexId::new(3, 7)],
        };

        let file = File::create(&path).unwrap();
        ciborium::ser::into_writer(&vec![record], BufWriter::new(file)).unwrap();
        let back = read_tree_blocks(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].gid, 3);
        assert_eq!(back[0].component_roots, vec![AmrVertexId::new(3, 7)]);
    }
}
