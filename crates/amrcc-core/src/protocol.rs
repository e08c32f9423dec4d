// crates/amrcc-core/src/protocol.rs

//! Round-based exchange protocol.
//!
//! One round is `send → exchange → receive → exchange → all-reduce(undone)`.
//! Before the first round, outgoing edge sets are symmetrised: both sides of
//! every cross-block face swap their half-edges and keep the intersection,
//! which removes edges whose far endpoint turned LOW once the absolute
//! threshold resolved.
//!
//! During the rounds, each component sends its sparse merge tree, its edges
//! and its neighbour set to every neighbour it has not talked to yet. A
//! receiver replays the fragment into its trees, unions the disjoint sets,
//! widens the component's neighbour set (link expansion), and re-keys
//! components whose deepest vertex was superseded. Termination is by
//! consensus: the all-reduced count of undone blocks reaching zero.

use crate::block::{Component, ComponentBlock};
use crate::edges::AmrEdge;
use crate::error::{Error, Result};
use crate::triplet::Node;
use crate::vertex::AmrVertexId;
use amrcc_runtime::Proxy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// Half-edge bundle swapped during symmetrisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSync {
    /// Edges whose `to` endpoint lives on the receiver.
    pub edges: Vec<AmrEdge>,
}

/// One component's round packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentPacket {
    /// Current deepest vertex of the sending component.
    pub root: AmrVertexId,
    /// Field value at the root.
    pub root_value: f64,
    /// `original_vertex_to_deepest` entries for the `from` endpoints of
    /// `edges`; receivers must never see conflicting values.
    pub original_deepest: Vec<(AmrVertexId, AmrVertexId)>,
    /// Edges from the sending component into the receiver.
    pub edges: Vec<AmrEdge>,
    /// The sending component's neighbour set, for link expansion.
    pub current_neighbors: Vec<i32>,
    /// The sending component's sparse merge tree.
    pub nodes: Vec<Node>,
}

/// Send this block's half-edges to every link neighbour, empty bundles
/// included, so both sides can intersect.
pub fn send_edges_to_neighbors(b: &mut ComponentBlock, proxy: &mut Proxy) -> Result<()> {
    let link_gids: BTreeSet<i32> = b
        .links
        .iter()
        .map(|l| l.gid)
        .filter(|&g| g != b.gid)
        .collect();
    for ngid in link_gids {
        let edges = b
            .gid_to_outgoing_edges
            .get(&ngid)
            .cloned()
            .unwrap_or_default();
        proxy.enqueue(ngid, &EdgeSync { edges }).map_err(Error::from)?;
    }
    Ok(())
}

/// Intersect our edge sets with the mirrored half-edges received from each
/// neighbour; an edge survives iff both sides stored it.
pub fn delete_low_edges(b: &mut ComponentBlock, proxy: &mut Proxy) -> Result<()> {
    let incoming: Vec<(i32, EdgeSync)> = proxy.take_incoming().map_err(Error::from)?;
    let mut mirrored: BTreeMap<i32, BTreeSet<AmrEdge>> = BTreeMap::new();
    for (sender, sync) in incoming {
        let set = mirrored.entry(sender).or_default();
        for e in sync.edges {
            set.insert(e.flipped());
        }
    }

    let mut surviving: BTreeSet<AmrEdge> = BTreeSet::new();
    let mut per_gid: BTreeMap<i32, Vec<AmrEdge>> = BTreeMap::new();
    for (ngid, edges) in &b.gid_to_outgoing_edges {
        let Some(theirs) = mirrored.get(ngid) else {
            continue;
        };
        let kept: Vec<AmrEdge> = edges
            .iter()
            .filter(|e| theirs.contains(e))
            .copied()
            .collect();
        if !kept.is_empty() {
            surviving.extend(kept.iter().copied());
            per_gid.insert(*ngid, kept);
        }
    }

    trace!(
        gid = b.gid,
        before = b.gid_to_outgoing_edges.values().map(Vec::len).sum::<usize>(),
        after = surviving.len(),
        "edges symmetrized"
    );
    b.gid_to_outgoing_edges = per_gid;
    for c in &mut b.components {
        c.adjust_edges(&surviving);
    }
    Ok(())
}

/// Send step: every component ships one packet to each neighbour it has not
/// processed yet, then marks that neighbour processed.
pub fn cc_send(b: &mut ComponentBlock, proxy: &mut Proxy) -> Result<()> {
    b.round += 1;
    for ci in 0..b.components.len() {
        let targets: Vec<i32> = {
            let c = &b.components[ci];
            c.current_neighbors
                .iter()
                .copied()
                .filter(|&g| c.must_send_to(g))
                .collect()
        };
        for ngid in targets {
            let pkt = {
                let c = &b.components[ci];
                let edges: Vec<AmrEdge> = c
                    .outgoing_edges
                    .iter()
                    .filter(|e| e.to.gid == ngid)
                    .copied()
                    .collect();
                let original_deepest: Vec<(AmrVertexId, AmrVertexId)> = edges
                    .iter()
                    .map(|e| (e.from, b.original_vertex_to_deepest[&e.from]))
                    .collect::<BTreeMap<_, _>>()
                    .into_iter()
                    .collect();
                ComponentPacket {
                    root: c.root,
                    root_value: b.current_tree.key(c.root).0,
                    original_deepest,
                    edges,
                    current_neighbors: c.current_neighbors.iter().copied().collect(),
                    nodes: c.tree.nodes().copied().collect(),
                }
            };
            trace!(gid = b.gid, to = ngid, root = %pkt.root, round = b.round, "sending component");
            proxy.enqueue(ngid, &pkt).map_err(Error::from)?;
            b.components[ci].processed_neighbors.insert(ngid);
        }
    }
    Ok(())
}

/// Receive step: fold every incoming packet into the trees and the
/// component records, then report the undone count to the reduction.
pub fn cc_receive(b: &mut ComponentBlock, proxy: &mut Proxy) -> Result<()> {
    let incoming: Vec<(i32, ComponentPacket)> = proxy.take_incoming().map_err(Error::from)?;
    for (sender, pkt) in incoming {
        receive_packet(b, sender, &pkt)?;
    }

    consolidate_components(b)?;
    b.repair_current_deepest();
    b.update_done();
    proxy.all_reduce(if b.done { 0.0 } else { 1.0 });
    Ok(())
}

/// Fold one packet into the block.
fn receive_packet(b: &mut ComponentBlock, sender: i32, pkt: &ComponentPacket) -> Result<()> {
    trace!(gid = b.gid, from = sender, root = %pkt.root, round = b.round, "receiving component");

    // Import the fragment and the sender's root before any bookkeeping that
    // needs their values.
    b.current_tree.merge_fragment(&pkt.nodes);
    b.current_tree.add(pkt.root, pkt.root_value);
    b.disjoint_set_add(pkt.root);

    for (v, d) in &pkt.original_deepest {
        if let Some(existing) = b.original_vertex_to_deepest.get(v) {
            if existing != d {
                return Err(Error::protocol(
                    b.gid,
                    b.round,
                    format!("conflicting original deepest for {v}: {existing} vs {d}"),
                ));
            }
        } else {
            b.original_vertex_to_deepest.insert(*v, *d);
        }
        if !b.current_tree.contains(*d) {
            return Err(Error::protocol(
                b.gid,
                b.round,
                format!("original deepest {d} missing from received fragment"),
            ));
        }
        b.disjoint_set_add(*d);
    }

    for e in &pkt.edges {
        if e.to.gid != b.gid {
            return Err(Error::protocol(
                b.gid,
                b.round,
                format!("edge {e} does not end in this block"),
            ));
        }
        if b.local.mask_of(e.to) != crate::masked_box::Mask::Active {
            return Err(Error::protocol(
                b.gid,
                b.round,
                format!("edge endpoint {} is not active here", e.to),
            ));
        }
        if !b.current_tree.contains(e.from) {
            return Err(Error::protocol(
                b.gid,
                b.round,
                format!("edge source {} missing from received fragment", e.from),
            ));
        }
        b.current_tree.merge_edge(e.from, e.to);
    }

    // Anchor the packet to a local component: through an edge endpoint when
    // edges came along, otherwise through any shared vertex (expansion-only
    // packets always share the vertices they were learned through).
    let anchor = find_anchor(b, pkt)?;

    // Disjoint-set unions mirror the tree merges.
    let anchor_root = *b.components[anchor]
        .original_roots
        .iter()
        .next()
        .expect("component has an original root");
    for (_, d) in &pkt.original_deepest {
        b.connect_components(anchor_root, *d);
    }
    b.connect_components(anchor_root, pkt.root);

    let c = &mut b.components[anchor];
    c.tree.merge_fragment(&pkt.nodes);
    c.tree.add(pkt.root, pkt.root_value);
    for e in &pkt.edges {
        c.tree.merge_edge(e.from, e.to);
    }
    c.pending_neighbors.insert(sender);
    c.pending_neighbors.extend(pkt.current_neighbors.iter().copied());
    Ok(())
}

/// Index of the component record a packet belongs to.
fn find_anchor(b: &ComponentBlock, pkt: &ComponentPacket) -> Result<usize> {
    if let Some(e) = pkt.edges.first() {
        let root = b.original_vertex_to_deepest[&e.to];
        for (i, c) in b.components.iter().enumerate() {
            if c.original_roots.contains(&root) {
                return Ok(i);
            }
        }
        return Err(Error::protocol(
            b.gid,
            b.round,
            format!("no component owns edge endpoint root {root}"),
        ));
    }

    let record_roots: Vec<AmrVertexId> = b
        .components
        .iter()
        .map(|c| {
            let anchor = c
                .original_roots
                .iter()
                .next()
                .expect("component has an original root");
            b.current_tree.find_root(*anchor)
        })
        .collect();
    for n in &pkt.nodes {
        if !b.current_tree.contains(n.vertex) {
            continue;
        }
        let root = b.current_tree.find_root(n.vertex);
        if let Some(i) = record_roots.iter().position(|&r| r == root) {
            return Ok(i);
        }
    }
    Err(Error::protocol(
        b.gid,
        b.round,
        format!("packet from component {} shares nothing with this block", pkt.root),
    ))
}

/// Merge component records that now share a tree root, re-keying each record
/// at the deepest vertex of its merged component.
fn consolidate_components(b: &mut ComponentBlock) -> Result<()> {
    if b.components.is_empty() {
        return Ok(());
    }

    let records = std::mem::take(&mut b.components);
    let mut groups: BTreeMap<AmrVertexId, Vec<Component>> = BTreeMap::new();
    for rec in records {
        let anchor = *rec
            .original_roots
            .iter()
            .next()
            .expect("component has an original root");
        let tree_root = b.current_tree.find_root(anchor);
        groups.entry(tree_root).or_default().push(rec);
    }

    let mut merged = Vec::with_capacity(groups.len());
    for (tree_root, group) in groups {
        let mut iter = group.into_iter();
        let mut rec = iter.next().expect("group is never empty");
        for other in iter {
            rec.original_roots.extend(other.original_roots.iter().copied());
            rec.current_neighbors = rec
                .current_neighbors
                .union(&other.current_neighbors)
                .copied()
                .collect();
            rec.processed_neighbors = rec
                .processed_neighbors
                .intersection(&other.processed_neighbors)
                .copied()
                .collect();
            rec.pending_neighbors
                .extend(other.pending_neighbors.iter().copied());
            rec.outgoing_edges.extend(other.outgoing_edges.iter().copied());
            let fragment: Vec<Node> = other.tree.nodes().copied().collect();
            rec.tree.merge_fragment(&fragment);
        }

        rec.current_neighbors
            .extend(rec.pending_neighbors.iter().copied());
        rec.current_neighbors.remove(&b.gid);
        rec.pending_neighbors.clear();

        if !rec.processed_neighbors.is_subset(&rec.current_neighbors) {
            return Err(Error::protocol(
                b.gid,
                b.round,
                format!(
                    "component {} processed a neighbour it does not know",
                    rec.root
                ),
            ));
        }

        // Union the member roots, fold the merged tree's root into the set,
        // and re-key the record at the deepest vertex known for the set.
        let roots: Vec<AmrVertexId> = rec.original_roots.iter().copied().collect();
        let first = roots[0];
        for r in &roots[1..] {
            b.connect_components(first, *r);
        }
        b.disjoint_set_add(tree_root);
        b.connect_components(first, tree_root);
        rec.root = b.deepest_of(first);

        merged.push(rec);
    }

    merged.sort_by_key(|c| c.root);
    b.components = merged;
    Ok(())
}
