// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2026 convoy contributors

//! Topology-aware spanning-tree construction for collective operations.
//!
//! Collectives (broadcast, reduction) over many contexts want a bounded
//! fan-out tree rather than a flat loop. This module builds one
//! *generation* of such a tree at a time: given a range of vertices whose
//! first element is the root, it picks up to `max_branches` direct
//! children and assigns every other vertex to exactly one child's
//! subtree. The collective layer recurses on each child's sub-range to
//! build the next generation.
//!
//! Two builders are provided:
//!
//! - [`build_generation_unaware`]: balanced contiguous partition, no
//!   topology knowledge. Subtree sizes differ by at most one, which
//!   minimizes the number of generations needed to span all vertices.
//! - [`build_generation`]: the node-aware builder. It starts from the
//!   balanced partition, then swaps vertices that share the root's
//!   physical node into the direct-child slots, so first hops stay on
//!   fast intra-node links. Promotion changes which vertex occupies a
//!   slot, never how many slots there are: balance (and therefore tree
//!   depth) is unaffected.
//!
//! Both are pure and deterministic: the scan runs in input order and
//! ties resolve to the earliest index, so identical input always yields
//! an identical tree.

use crate::error::{Error, Result};
use std::collections::HashSet;

/// Identifier of a tree vertex (an execution-context id).
pub type VertexId = u32;

/// Physical-node co-residency query, answered by the platform layer.
///
/// Two vertices are co-resident when they run on the same hardware node
/// and therefore share faster local interconnect than cross-node links.
pub trait NodeLocality {
    /// All vertex ids on the same physical node as `vertex`.
    ///
    /// The returned set may or may not include `vertex` itself; the
    /// builder ignores the root's own entry.
    fn peers_on_node(&self, vertex: VertexId) -> Vec<VertexId>;
}

/// A flat vertex-to-node assignment table.
///
/// The common concrete [`NodeLocality`] source: index `i` holds the
/// physical node of vertex `i`.
#[derive(Debug, Clone)]
pub struct NodeMap {
    node_of: Vec<usize>,
}

impl NodeMap {
    /// Build from a per-vertex node assignment (`node_of[v] == node`).
    #[must_use]
    pub fn new(node_of: Vec<usize>) -> Self {
        Self { node_of }
    }

    /// Every vertex on its own node (no co-residency anywhere).
    #[must_use]
    pub fn isolated(count: usize) -> Self {
        Self {
            node_of: (0..count).collect(),
        }
    }
}

impl NodeLocality for NodeMap {
    fn peers_on_node(&self, vertex: VertexId) -> Vec<VertexId> {
        let Some(&node) = self.node_of.get(vertex as usize) else {
            return Vec::new();
        };
        self.node_of
            .iter()
            .enumerate()
            .filter(|&(_, &n)| n == node)
            .map(|(i, _)| i as VertexId)
            .collect()
    }
}

/// One generation of a spanning tree: a root and its direct children.
///
/// `children` holds *positions* relative to the start of the vertex
/// range the generation was built over (never absolute ids), sorted
/// ascending. Child `k`'s subtree is the sub-range from `children[k]`
/// to `children[k + 1]` (or the end of the range for the last child).
/// Ephemeral: built per collective call and discarded after use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanningTreeVertex {
    /// Id of the generation's root.
    pub id: VertexId,
    /// Relative offsets of the direct children within the vertex range.
    pub children: Vec<usize>,
}

impl SpanningTreeVertex {
    /// Sizes of the direct children's subtrees, in child order.
    ///
    /// `range_len` is the length of the vertex range this generation was
    /// built over and must be at least the last child offset.
    #[must_use]
    pub fn subtree_sizes(&self, range_len: usize) -> Vec<usize> {
        if let Some(&last) = self.children.last() {
            debug_assert!(
                range_len >= last,
                "range_len {range_len} shorter than last child offset {last}"
            );
        }
        let mut sizes = Vec::with_capacity(self.children.len());
        for (k, &start) in self.children.iter().enumerate() {
            let end = self
                .children
                .get(k + 1)
                .copied()
                .unwrap_or(range_len);
            sizes.push(end - start);
        }
        sizes
    }
}

fn check_args(vertices: &[VertexId], max_branches: usize) -> Result<()> {
    if vertices.is_empty() {
        return Err(Error::ProtocolMisuse(
            "spanning tree generation requires at least the root vertex".into(),
        ));
    }
    if max_branches == 0 {
        return Err(Error::ProtocolMisuse(
            "spanning tree branch factor must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Build one balanced, topology-unaware generation over `vertices`.
///
/// `vertices[0]` is the root. The remaining `K-1` vertices split into
/// up to `max_branches` contiguous groups whose sizes differ by at most
/// one (earlier groups take the remainder); each group's first vertex
/// becomes a direct child.
///
/// # Errors
///
/// [`Error::ProtocolMisuse`] if `vertices` is empty or `max_branches`
/// is zero.
pub fn build_generation_unaware(
    vertices: &[VertexId],
    max_branches: usize,
) -> Result<SpanningTreeVertex> {
    check_args(vertices, max_branches)?;

    let remaining = vertices.len() - 1;
    let groups = remaining.min(max_branches);
    let mut children = Vec::with_capacity(groups);

    if groups > 0 {
        let base = remaining / groups;
        let extra = remaining % groups;
        let mut start = 1;
        for g in 0..groups {
            children.push(start);
            start += base + usize::from(g < extra);
        }
    }

    Ok(SpanningTreeVertex {
        id: vertices[0],
        children,
    })
}

/// Build one node-aware generation over `vertices`.
///
/// Starts from the balanced partition of [`build_generation_unaware`],
/// then promotes vertices co-resident with the root into direct-child
/// slots by swapping them with the slot's current occupant. The scan
/// visits the non-root range in input order; each unpromoted co-resident
/// goes to the first child slot not already holding a co-resident. The
/// pass stops when every slot holds a co-resident, no unpromoted
/// co-resident remains, or the range is exhausted.
///
/// `vertices` is reordered in place (only swaps between a scan position
/// and a child slot); the returned generation's child offsets are
/// identical to the unaware ones.
///
/// # Errors
///
/// [`Error::ProtocolMisuse`] if `vertices` is empty or `max_branches`
/// is zero.
pub fn build_generation(
    vertices: &mut [VertexId],
    max_branches: usize,
    locality: &dyn NodeLocality,
) -> Result<SpanningTreeVertex> {
    let parent = build_generation_unaware(vertices, max_branches)?;

    let root = vertices[0];
    let peers: HashSet<VertexId> = locality
        .peers_on_node(root)
        .into_iter()
        .filter(|&p| p != root)
        .collect();
    if peers.is_empty() {
        return Ok(parent);
    }

    let slots = &parent.children;
    for i in 1..vertices.len() {
        if !peers.contains(&vertices[i]) {
            continue;
        }
        if slots.contains(&i) {
            continue; // already a direct child
        }
        // First child slot whose occupant is not co-resident with the root.
        match slots.iter().find(|&&s| !peers.contains(&vertices[s])) {
            Some(&s) => vertices.swap(s, i),
            None => break, // every slot already holds a co-resident
        }
    }

    Ok(SpanningTreeVertex {
        id: vertices[0],
        children: parent.children,
    })
}
