// crates/amrcc-runtime/src/lib.rs

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]

//! Block-parallel runtime with the shape of a distributed master.
//!
//! Blocks are added under globally unique gids and driven through
//! [`Master::foreach`] callbacks. Communication is round-based: packets
//! enqueued during one `foreach` epoch become visible to their targets only
//! after [`Master::exchange`], which also resolves all-reduce collectives.
//! Delivery is deterministic: each inbox is ordered by sender gid, then by
//! enqueue order within the sender.
//!
//! When an `in_memory` limit is configured, least-recently-used blocks are
//! spilled to CBOR files in a storage directory and reloaded transparently;
//! spills must round-trip every field of the block type.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Failures surfaced by the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Spill-storage I/O failed.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// A payload or spilled block could not be encoded/decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A packet was addressed to a gid no process owns.
    #[error("unknown block gid {0}")]
    UnknownBlock(i32),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RuntimeError>;

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| RuntimeError::Codec(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| RuntimeError::Codec(e.to_string()))
}

#[derive(Debug)]
struct Message {
    from: i32,
    to: i32,
    payload: Vec<u8>,
}

#[derive(Debug)]
enum Slot<B> {
    Loaded(B),
    Spilled,
}

/// Spill configuration.
#[derive(Debug, Clone)]
struct Storage {
    dir: PathBuf,
    in_memory: usize,
}

/// The per-process block master.
#[derive(Debug)]
pub struct Master<B> {
    blocks: BTreeMap<i32, Slot<B>>,
    inboxes: BTreeMap<i32, Vec<(i32, Vec<u8>)>>,
    staged: Vec<Message>,
    reduce_acc: Vec<f64>,
    reduce_result: Vec<f64>,
    storage: Option<Storage>,
    lru: VecDeque<i32>,
}

impl<B> Default for Master<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> Master<B> {
    /// An empty master keeping every block in memory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
            inboxes: BTreeMap::new(),
            staged: Vec::new(),
            reduce_acc: Vec::new(),
            reduce_result: Vec::new(),
            storage: None,
            lru: VecDeque::new(),
        }
    }

    /// Limit the number of in-memory blocks; the rest spill to `dir`.
    pub fn set_storage(&mut self, dir: impl Into<PathBuf>, in_memory: usize) -> Result<()> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        self.storage = Some(Storage {
            dir,
            in_memory: in_memory.max(1),
        });
        Ok(())
    }

    /// Register a block under its gid.
    pub fn add_block(&mut self, gid: i32, block: B) {
        self.blocks.insert(gid, Slot::Loaded(block));
        self.lru.push_back(gid);
    }

    /// Number of blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no blocks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Registered gids in ascending order.
    #[must_use]
    pub fn gids(&self) -> Vec<i32> {
        self.blocks.keys().copied().collect()
    }

    /// Element-wise sums of the all-reduce contributions from the epoch
    /// finished by the last [`Master::exchange`].
    #[must_use]
    pub fn reduced(&self) -> &[f64] {
        &self.reduce_result
    }
}

impl<B: Serialize + DeserializeOwned> Master<B> {
    fn spill_path(dir: &std::path::Path, gid: i32) -> PathBuf {
        dir.join(format!("block-{gid}.cbor"))
    }

    fn ensure_loaded(&mut self, gid: i32) -> Result<()> {
        let slot = self
            .blocks
            .get_mut(&gid)
            .ok_or(RuntimeError::UnknownBlock(gid))?;
        if matches!(slot, Slot::Loaded(_)) {
            return Ok(());
        }
        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| RuntimeError::Codec(format!("block {gid} spilled without storage")))?;
        let path = Self::spill_path(&storage.dir, gid);
        let file = File::open(&path)?;
        let block: B = ciborium::de::from_reader(BufReader::new(file))
            .map_err(|e| RuntimeError::Codec(e.to_string()))?;
        debug!(gid, path = %path.display(), "reloaded spilled block");
        *self.blocks.get_mut(&gid).expect("slot present") = Slot::Loaded(block);
        self.lru.push_back(gid);
        Ok(())
    }

    fn enforce_memory_limit(&mut self, keep: i32) -> Result<()> {
        let Some(storage) = self.storage.clone() else {
            return Ok(());
        };
        loop {
            let loaded = self
                .blocks
                .values()
                .filter(|s| matches!(s, Slot::Loaded(_)))
                .count();
            if loaded <= storage.in_memory {
                return Ok(());
            }
            let Some(victim) = self
                .lru
                .iter()
                .copied()
                .find(|&g| g != keep && matches!(self.blocks.get(&g), Some(Slot::Loaded(_))))
            else {
                return Ok(());
            };
            self.lru.retain(|&g| g != victim);
            let slot = self.blocks.get_mut(&victim).expect("victim registered");
            let Slot::Loaded(block) = std::mem::replace(slot, Slot::Spilled) else {
                continue;
            };
            let path = Self::spill_path(&storage.dir, victim);
            let file = File::create(&path)?;
            ciborium::ser::into_writer(&block, BufWriter::new(file))
                .map_err(|e| RuntimeError::Codec(e.to_string()))?;
            debug!(gid = victim, path = %path.display(), "spilled block");
        }
    }

    /// Run a callback over every block in gid order.
    ///
    /// The callback's error type only needs a conversion from
    /// [`RuntimeError`], so engine errors pass through unchanged.
    pub fn foreach<E, F>(&mut self, mut f: F) -> std::result::Result<(), E>
    where
        E: From<RuntimeError>,
        F: FnMut(&mut B, &mut Proxy) -> std::result::Result<(), E>,
    {
        let gids = self.gids();
        for gid in gids {
            self.ensure_loaded(gid).map_err(E::from)?;
            // Touch for LRU: most recently used at the back.
            self.lru.retain(|&g| g != gid);
            self.lru.push_back(gid);

            let incoming = self.inboxes.remove(&gid).unwrap_or_default();
            let mut proxy = Proxy {
                gid,
                incoming,
                outgoing: Vec::new(),
                reduce: Vec::new(),
            };
            {
                let Some(Slot::Loaded(block)) = self.blocks.get_mut(&gid) else {
                    return Err(E::from(RuntimeError::UnknownBlock(gid)));
                };
                f(block, &mut proxy)?;
            }

            self.staged.extend(proxy.outgoing);
            for (i, v) in proxy.reduce.iter().enumerate() {
                if self.reduce_acc.len() <= i {
                    self.reduce_acc.push(0.0);
                }
                self.reduce_acc[i] += v;
            }

            self.enforce_memory_limit(gid).map_err(E::from)?;
        }
        Ok(())
    }

    /// Deliver staged packets and resolve collectives for the finished epoch.
    pub fn exchange(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        for msg in &staged {
            if !self.blocks.contains_key(&msg.to) {
                return Err(RuntimeError::UnknownBlock(msg.to));
            }
        }
        for msg in staged {
            self.inboxes
                .entry(msg.to)
                .or_default()
                .push((msg.from, msg.payload));
        }
        for inbox in self.inboxes.values_mut() {
            inbox.sort_by_key(|(from, _)| *from);
        }
        self.reduce_result = std::mem::take(&mut self.reduce_acc);
        Ok(())
    }

    /// Borrow a block mutably, reloading it if spilled.
    pub fn block_mut(&mut self, gid: i32) -> Result<&mut B> {
        self.ensure_loaded(gid)?;
        match self.blocks.get_mut(&gid) {
            Some(Slot::Loaded(b)) => Ok(b),
            _ => Err(RuntimeError::UnknownBlock(gid)),
        }
    }
}

/// Per-block communication handle, valid for one callback invocation.
#[derive(Debug)]
pub struct Proxy {
    gid: i32,
    incoming: Vec<(i32, Vec<u8>)>,
    outgoing: Vec<Message>,
    reduce: Vec<f64>,
}

impl Proxy {
    /// Gid of the block being driven.
    #[must_use]
    pub fn gid(&self) -> i32 {
        self.gid
    }

    /// Queue a packet for `to`; it is delivered at the next exchange.
    pub fn enqueue<T: Serialize>(&mut self, to: i32, value: &T) -> Result<()> {
        let payload = to_cbor(value)?;
        self.outgoing.push(Message {
            from: self.gid,
            to,
            payload,
        });
        Ok(())
    }

    /// Decode and drain this epoch's inbox, ordered by sender gid then by
    /// enqueue order.
    pub fn take_incoming<T: DeserializeOwned>(&mut self) -> Result<Vec<(i32, T)>> {
        std::mem::take(&mut self.incoming)
            .into_iter()
            .map(|(from, bytes)| Ok((from, from_cbor::<T>(&bytes)?)))
            .collect()
    }

    /// Contribute to the epoch's element-wise f64 sum reduction. Every block
    /// must contribute the same number of values per epoch.
    pub fn all_reduce(&mut self, v: f64) {
        self.reduce.push(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    struct Counter {
        gid: i32,
        seen: Vec<(i32, u32)>,
    }

    fn master_of(gids: &[i32]) -> Master<Counter> {
        let mut m = Master::new();
        for &g in gids {
            m.add_block(
                g,
                Counter {
                    gid: g,
                    seen: Vec::new(),
                },
            );
        }
        m
    }

    #[test]
    fn delivery_is_ordered_by_sender() {
        let mut m = master_of(&[0, 1, 2]);

        // Blocks 2, 1, 0 all write to block 0; epoch order is gid order, but
        // delivery must sort by sender gid.
        m.foreach::<RuntimeError, _>(|b, proxy| {
            assert_eq!(proxy.gid(), b.gid);
            proxy.enqueue(0, &(b.gid as u32 + 10))?;
            Ok(())
        })
        .unwrap();
        m.exchange().unwrap();

        m.foreach::<RuntimeError, _>(|b, proxy| {
            for (from, v) in proxy.take_incoming::<u32>()? {
                b.seen.push((from, v));
            }
            Ok(())
        })
        .unwrap();

        let b0 = m.block_mut(0).unwrap();
        assert_eq!(b0.seen, vec![(0, 10), (1, 11), (2, 12)]);
        let b1 = m.block_mut(1).unwrap();
        assert!(b1.seen.is_empty());
    }

    #[test]
    fn packets_are_invisible_until_exchange() {
        let mut m = master_of(&[0, 1]);
        m.foreach::<RuntimeError, _>(|b, proxy| {
            if b.gid == 0 {
                proxy.enqueue(1, &1u32)?;
            }
            // Same epoch: nothing delivered yet.
            assert!(proxy.take_incoming::<u32>()?.is_empty());
            Ok(())
        })
        .unwrap();
        m.exchange().unwrap();

        let mut got = 0;
        m.foreach::<RuntimeError, _>(|b, proxy| {
            if b.gid == 1 {
                got = proxy.take_incoming::<u32>()?.len();
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(got, 1);
    }

    #[test]
    fn all_reduce_sums_elementwise() {
        let mut m = master_of(&[3, 5, 9]);
        m.foreach::<RuntimeError, _>(|b, proxy| {
            proxy.all_reduce(f64::from(b.gid));
            proxy.all_reduce(1.0);
            Ok(())
        })
        .unwrap();
        m.exchange().unwrap();
        assert_eq!(m.reduced(), &[17.0, 3.0]);
    }

    #[test]
    fn unknown_target_is_an_error() {
        let mut m = master_of(&[0]);
        m.foreach::<RuntimeError, _>(|_, proxy| {
            proxy.enqueue(42, &0u32)?;
            Ok(())
        })
        .unwrap();
        assert!(matches!(m.exchange(), Err(RuntimeError::UnknownBlock(42))));
    }

    #[test]
    fn spilled_blocks_round_trip_through_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = master_of(&[0, 1, 2, 3]);
        m.set_storage(dir.path(), 2).unwrap();

        // Mutate every block across two epochs; with only two slots in
        // memory, earlier blocks must spill and reload without losing state.
        for round in 0..2u32 {
            m.foreach::<RuntimeError, _>(|b, _proxy| {
                b.seen.push((b.gid, round));
                Ok(())
            })
            .unwrap();
            m.exchange().unwrap();
        }

        for gid in [0, 1, 2, 3] {
            let b = m.block_mut(gid).unwrap();
            assert_eq!(b.seen, vec![(gid, 0), (gid, 1)]);
        }
    }
}
