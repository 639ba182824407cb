//! The box level: globally identified boxes, locally stored by their owner.

use std::collections::BTreeMap;

use crate::geometry::IndexBox;

/// Globally unique box identifier: owning rank plus a per-owner sequence
/// number assigned in creation order.
///
/// Tag-side patches and new clustered boxes use the same identifier shape
/// but live in separate namespaces (separate connectors), so the ids never
/// mix.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct BoxId {
    pub owner: u32,
    pub local: u32,
}

impl BoxId {
    pub fn new(owner: usize, local: u32) -> Self {
        Self {
            owner: owner as u32,
            local,
        }
    }
}

/// The locally owned portion of a distributed set of boxes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoxLevel {
    dim: usize,
    boxes: BTreeMap<BoxId, IndexBox>,
}

impl BoxLevel {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            boxes: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn insert(&mut self, id: BoxId, bounds: IndexBox) {
        debug_assert_eq!(bounds.dim(), self.dim);
        let prev = self.boxes.insert(id, bounds);
        debug_assert!(prev.is_none(), "duplicate box id");
    }

    pub fn remove(&mut self, id: &BoxId) -> Option<IndexBox> {
        self.boxes.remove(id)
    }

    pub fn get(&self, id: &BoxId) -> Option<&IndexBox> {
        self.boxes.get(id)
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Boxes in id order (deterministic).
    pub fn iter(&self) -> impl Iterator<Item = (&BoxId, &IndexBox)> {
        self.boxes.iter()
    }
}
