//! Directed neighbor relationships between two box levels.

use std::collections::{BTreeMap, BTreeSet};

use super::box_level::BoxId;

/// A set of directed edges from boxes of one level to boxes of another,
/// stored on the rank that owns the source box.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Connector {
    edges: BTreeMap<BoxId, BTreeSet<BoxId>>,
}

impl Connector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: BoxId, to: BoxId) {
        self.edges.entry(from).or_default().insert(to);
    }

    pub fn neighbors(&self, from: &BoxId) -> impl Iterator<Item = &BoxId> {
        self.edges.get(from).into_iter().flatten()
    }

    pub fn contains(&self, from: &BoxId, to: &BoxId) -> bool {
        self.edges.get(from).is_some_and(|s| s.contains(to))
    }

    pub fn sources(&self) -> impl Iterator<Item = &BoxId> {
        self.edges.keys()
    }

    /// All edges in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (BoxId, BoxId)> + '_ {
        self.edges
            .iter()
            .flat_map(|(from, tos)| tos.iter().map(move |to| (*from, *to)))
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}
