//! Distributed validity tracking for a single buffer.
//!
//! Fragments map regions of the buffer's index space to the set of nodes
//! holding a valid copy. The fragments tile the written-so-far portion
//! without overlap; every index that has ever been produced maps to a
//! non-empty node set. Node sets are sorted (`BTreeSet`), which fixes a
//! canonical order for source queries and intersections.

use std::collections::{BTreeMap, BTreeSet};

use chorus_grid::{GridBox, GridRegion, Subrange};

use crate::ids::NodeId;

#[derive(Debug, Clone)]
pub struct BufferState {
    range: [usize; 3],
    fragments: Vec<(GridRegion, BTreeSet<NodeId>)>,
}

impl BufferState {
    /// State for a fresh buffer. A host-initialised buffer starts with
    /// its full range valid on every node; otherwise nothing is covered
    /// until the first writer runs.
    pub fn new(range: [usize; 3], host_initialized: bool, num_nodes: usize) -> Self {
        let mut state = Self { range, fragments: Vec::new() };
        if host_initialized {
            let everywhere: BTreeSet<NodeId> = (0..num_nodes as u64).map(NodeId).collect();
            let whole = Subrange::whole(range).to_region();
            state.fragments.push((whole, everywhere));
        }
        state
    }

    pub fn range(&self) -> [usize; 3] {
        self.range
    }

    /// Replace the coverage of `region` with exactly `nodes`.
    ///
    /// The latest writer owns validity: any previous copies of those
    /// indices are dropped. A multi-node set (after a broadcast) keeps
    /// all copies tracked. Fragments with equal node sets are merged.
    pub fn update_region(&mut self, region: &GridRegion, nodes: &BTreeSet<NodeId>) {
        assert!(!nodes.is_empty(), "a region cannot become valid on zero nodes");
        if region.is_empty() {
            return;
        }

        let mut merged: BTreeMap<BTreeSet<NodeId>, GridRegion> = BTreeMap::new();
        for (fragment, owners) in &self.fragments {
            let rest = GridRegion::subtract(fragment, region);
            if rest.is_empty() {
                continue;
            }
            let entry = merged.entry(owners.clone()).or_default();
            *entry = GridRegion::merge(entry, &rest);
        }
        let entry = merged.entry(nodes.clone()).or_default();
        *entry = GridRegion::merge(entry, region);

        self.fragments = merged.into_iter().map(|(owners, region)| (region, owners)).collect();
    }

    /// Boxes tiling `region`, each tagged with the nodes that hold a
    /// valid copy, ordered lexicographically by lower corner.
    ///
    /// Panics if any index of `region` was never produced: such a read
    /// is a programmer error — the region would have been written by the
    /// reading task itself, not read.
    pub fn get_source_nodes(&self, region: &GridRegion) -> Vec<(GridBox, BTreeSet<NodeId>)> {
        let mut cover = Vec::new();
        let mut covered = GridRegion::empty();
        for (fragment, owners) in &self.fragments {
            let common = GridRegion::intersect(fragment, region);
            if common.is_empty() {
                continue;
            }
            for b in common.boxes() {
                cover.push((*b, owners.clone()));
            }
            covered = GridRegion::merge(&covered, &common);
        }
        assert!(
            covered.covers(region),
            "read of a buffer region that was never produced: {region}"
        );
        cover.sort_by(|(a, _), (b, _)| a.cmp(b));
        cover
    }
}
