//! Per-invocation shared state for one clustering run.
//!
//! This is the state every dendogram node of one invocation reads and
//! mutates: the relaunch queue, the communication stage, the per-process
//! message-tag pool, the accumulating outputs, and the analysis counters.
//! It is threaded explicitly through the node code rather than held in any
//! global, so concurrent clusterings on disjoint communicators stay
//! independent.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crate::cluster_error::ClusterError;
use crate::cluster::node::DendogramNode;
use crate::cluster::params::ClusterParams;
use crate::comm::{CommStage, Communicator};
use crate::geometry::IndexBox;
use crate::level::{BoxId, BoxLevel};
use crate::tag::TagLevel;

/// Message tags reserved above the node-tag pools for the post-clustering
/// relationship exchange.
pub(crate) const RESERVED_TAGS: u32 = 2;

/// Tag every rank derives, without communication, for the `i`-th root node.
/// Root tags come from the front of rank 0's pool.
pub(crate) fn root_tag(i: usize) -> u32 {
    i as u32
}

/// A box this rank witnessed being accepted, with the group of ranks that
/// witnessed it (the candidate senders of relationship edges).
#[derive(Clone, Debug)]
pub(crate) struct KnownBox {
    pub bounds: IndexBox,
    pub group: Vec<usize>,
}

/// Analysis counters for one clustering invocation.
///
/// Counters describe the local process's view: tag totals come from locally
/// owned root nodes, node counts from locally allocated dendogram nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterStats {
    /// Tags under locally owned root nodes, after reduction.
    pub num_tags: i64,
    /// Dendogram nodes allocated on this rank over the whole run.
    pub nodes_allocated: usize,
    /// Currently allocated, not-yet-completed nodes, and the peak.
    pub nodes_active: usize,
    pub max_nodes_active: usize,
    /// Currently owned active nodes, and the peak.
    pub nodes_owned: usize,
    pub max_nodes_owned: usize,
    pub nodes_completed: usize,
    /// Boxes this rank saw accepted (owned or not).
    pub boxes_generated: usize,
    pub max_generation: u32,
    /// `continue_algorithm` invocations across all local nodes.
    pub continuation_calls: usize,
    /// Highest invocation count any single local node needed.
    pub max_continuations: usize,
}

impl ClusterStats {
    /// Mean continuations per completed node.
    pub fn avg_continuations(&self) -> f64 {
        if self.nodes_completed == 0 {
            0.0
        } else {
            self.continuation_calls as f64 / self.nodes_completed as f64
        }
    }
}

pub(crate) struct ClusterContext<'a, C: Communicator> {
    pub comm: Arc<C>,
    pub params: ClusterParams,
    pub dim: usize,
    pub tag_level: &'a TagLevel,
    pub nodes: Vec<DendogramNode<C>>,
    pub queue: VecDeque<usize>,
    pub stage: CommStage,
    /// Next unclaimed tag of this rank's pool and the pool's end.
    next_tag: u32,
    pool_end: u32,
    /// Next local id for boxes owned by this rank.
    next_local_id: u32,
    pub new_level: BoxLevel,
    pub known: BTreeMap<BoxId, KnownBox>,
    pub stats: ClusterStats,
}

impl<'a, C: Communicator> ClusterContext<'a, C> {
    /// Partition the usable tag space evenly across ranks; the top
    /// `RESERVED_TAGS` values stay free for the relationship exchange.
    pub fn new(
        comm: Arc<C>,
        params: ClusterParams,
        tag_level: &'a TagLevel,
        num_roots: usize,
    ) -> Result<Self, ClusterError> {
        let size = comm.size();
        let usable = params.tag_upper_bound.saturating_sub(RESERVED_TAGS);
        let pool_size = usable / size as u32;
        if pool_size < (num_roots as u32).max(2) {
            return Err(ClusterError::TagSpaceTooSmall {
                upper_bound: params.tag_upper_bound,
                ranks: size,
            });
        }
        let rank = comm.rank() as u32;
        // Root tags are claimed deterministically from rank 0's pool on
        // every rank, without communication.
        let next_tag = if rank == 0 {
            num_roots as u32
        } else {
            rank * pool_size
        };
        let dim = params.dim();
        Ok(Self {
            comm,
            params,
            dim,
            tag_level,
            nodes: Vec::new(),
            queue: VecDeque::new(),
            stage: CommStage::new(),
            next_tag,
            pool_end: (rank + 1) * pool_size,
            next_local_id: 0,
            new_level: BoxLevel::new(dim),
            known: BTreeMap::new(),
            stats: ClusterStats::default(),
        })
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    /// Claim a fresh message tag from this rank's pool.
    pub fn claim_tag(&mut self) -> Result<u32, ClusterError> {
        if self.next_tag >= self.pool_end {
            return Err(ClusterError::TagPoolExhausted { rank: self.rank() });
        }
        let tag = self.next_tag;
        self.next_tag += 1;
        Ok(tag)
    }

    /// Claim the next local id for a box owned by this rank.
    pub fn claim_local_id(&mut self) -> u32 {
        let id = self.next_local_id;
        self.next_local_id += 1;
        id
    }

    /// Install a node in the arena and account for it.
    pub fn alloc_node(&mut self, node: DendogramNode<C>) -> usize {
        let owned = node.owner == self.rank();
        self.stats.nodes_allocated += 1;
        self.stats.nodes_active += 1;
        self.stats.max_nodes_active = self.stats.max_nodes_active.max(self.stats.nodes_active);
        if owned {
            self.stats.nodes_owned += 1;
            self.stats.max_nodes_owned = self.stats.max_nodes_owned.max(self.stats.nodes_owned);
        }
        self.stats.max_generation = self.stats.max_generation.max(node.generation);
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Push a node on the relaunch queue unless it is already there.
    pub fn enqueue(&mut self, id: usize) {
        if !self.nodes[id].queued {
            self.nodes[id].queued = true;
            self.queue.push_back(id);
        }
    }

    pub fn note_completed(&mut self, id: usize) {
        self.stats.nodes_active -= 1;
        self.stats.nodes_completed += 1;
        if self.nodes[id].owner == self.rank() {
            self.stats.nodes_owned -= 1;
        }
    }

    /// Record a box this rank witnessed; the owner also stores it in the
    /// output level.
    pub fn record_box(&mut self, id: BoxId, bounds: IndexBox, group: Vec<usize>) {
        self.stats.boxes_generated += 1;
        if id.owner as usize == self.rank() {
            self.new_level.insert(id, bounds);
        }
        self.known.insert(id, KnownBox { bounds, group });
    }

    /// Poll every node suspended on the stage and return the ready ones.
    pub fn drain_ready(&mut self, mode: crate::comm::StageAdvance) -> Vec<usize> {
        let nodes = &mut self.nodes;
        self.stage.advance(mode, |id| {
            nodes[id]
                .comm_group
                .as_mut()
                .map_or(true, crate::comm::CommGroup::check)
        })
    }

    /// Remove a recombined-away box from the records, wherever it exists.
    pub fn erase_box(&mut self, id: &BoxId) {
        if self.known.remove(id).is_some() {
            self.stats.boxes_generated -= 1;
        }
        if id.owner as usize == self.rank() {
            self.new_level.remove(id);
        }
    }
}
