//! Tree-structured asynchronous collectives over a subset of ranks.
//!
//! A `CommGroup` runs one collective at a time — broadcast from the root,
//! gather to the root, or element-wise sum-reduction to the root — as a
//! sequence of point-to-point messages along a logical k-ary tree. Every
//! `begin_*` call returns immediately; `check()` advances the operation and
//! reports completion. All payloads are fixed-size `i32` vectors whose
//! lengths are computable by every member, so no size negotiation is needed.

use std::sync::Arc;

use crate::comm::communicator::{CommTag, Communicator, RecvRequest};

/// Heuristic tree degree for a communication group: binary for small
/// groups, one extra child per octave of group size.
pub fn communication_tree_degree(group_size: usize) -> usize {
    let mut degree = 2;
    let mut shifted = group_size >> 3;
    while shifted > 0 {
        shifted >>= 3;
        degree += 1;
    }
    degree
}

fn ints_to_bytes(ints: &[i32]) -> Vec<u8> {
    bytemuck::cast_slice(ints).to_vec()
}

fn ints_from_bytes(bytes: &[u8]) -> Vec<i32> {
    debug_assert_eq!(bytes.len() % 4, 0, "integer payload misaligned");
    bytes
        .chunks_exact(4)
        .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

enum Op<C: Communicator> {
    Idle,
    Done,
    /// Waiting on child contributions; accumulate, then forward up.
    Reduce {
        pending: Vec<Option<C::RecvHandle>>,
        acc: Vec<i32>,
    },
    /// Non-root waiting on the parent's payload; relay to children.
    BcastRecv {
        handle: Option<C::RecvHandle>,
    },
    /// Waiting on child subtree records; concatenate, then forward up.
    Gather {
        pending: Vec<Option<C::RecvHandle>>,
        parts: Vec<Vec<i32>>,
        mine: Vec<i32>,
    },
}

/// One collective at a time over `group`, rooted at the owner rank.
///
/// Tree positions relabel the group so the root sits at position 0; the
/// rank at position `p` is `group[(p + root_idx) % n]`. Children of `p` are
/// `p*k+1 ..= p*k+k`.
pub struct CommGroup<C: Communicator> {
    comm: Arc<C>,
    group: Vec<usize>,
    root_idx: usize,
    my_pos: usize,
    degree: usize,
    tag: CommTag,
    op: Op<C>,
    result: Option<Vec<i32>>,
    // Send handles are retained until the group is dropped; by then the
    // receiver has consumed the message.
    retired_sends: Vec<C::SendHandle>,
}

impl<C: Communicator> CommGroup<C> {
    /// Build a group over `group` ranks with `root_rank` as the collective
    /// root. The calling rank must be a member.
    pub fn new(comm: Arc<C>, group: Vec<usize>, root_rank: usize, tag: CommTag) -> Self {
        let n = group.len();
        debug_assert!(n >= 1);
        let root_idx = group
            .iter()
            .position(|&r| r == root_rank)
            .expect("root rank not in group");
        let my_idx = group
            .iter()
            .position(|&r| r == comm.rank())
            .expect("local rank not in group");
        let my_pos = (my_idx + n - root_idx) % n;
        Self {
            comm,
            degree: communication_tree_degree(n),
            group,
            root_idx,
            my_pos,
            tag,
            op: Op::Idle,
            result: None,
            retired_sends: Vec::new(),
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.group.len()
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.my_pos == 0
    }

    fn rank_at(&self, pos: usize) -> usize {
        let n = self.group.len();
        self.group[(pos + self.root_idx) % n]
    }

    fn parent_pos(&self) -> usize {
        debug_assert!(self.my_pos > 0);
        (self.my_pos - 1) / self.degree
    }

    /// Number of tree positions in the subtree rooted at `pos`.
    fn subtree_size(&self, pos: usize) -> usize {
        let mut total = 0;
        let mut stack = vec![pos];
        while let Some(p) = stack.pop() {
            total += 1;
            stack.extend(self.children_of(p));
        }
        total
    }

    fn children_of(&self, pos: usize) -> Vec<usize> {
        let n = self.group.len();
        let first = pos * self.degree + 1;
        (first..first + self.degree).filter(|&c| c < n).collect()
    }

    fn send_ints(&mut self, pos: usize, data: &[i32]) {
        let peer = self.rank_at(pos);
        let handle = self.comm.isend(peer, self.tag.as_u32(), &ints_to_bytes(data));
        self.retired_sends.push(handle);
    }

    fn recv_ints(&self, pos: usize, len: usize) -> C::RecvHandle {
        let peer = self.rank_at(pos);
        self.comm.irecv(peer, self.tag.as_u32(), len * 4)
    }

    /// Start an element-wise sum-reduction of `contrib` toward the root.
    pub fn begin_sum_reduce(&mut self, contrib: Vec<i32>) {
        debug_assert!(matches!(self.op, Op::Idle | Op::Done));
        self.result = None;
        if self.group.len() == 1 {
            self.result = Some(contrib);
            self.op = Op::Done;
            return;
        }
        let children = self.children_of(self.my_pos);
        if children.is_empty() {
            let parent = self.parent_pos();
            self.send_ints(parent, &contrib);
            self.op = Op::Done;
            return;
        }
        let pending = children
            .iter()
            .map(|&c| Some(self.recv_ints(c, contrib.len())))
            .collect();
        self.op = Op::Reduce {
            pending,
            acc: contrib,
        };
    }

    /// Start a broadcast of `len` integers from the root. Only the root
    /// passes `Some(payload)`.
    pub fn begin_bcast(&mut self, payload: Option<Vec<i32>>, len: usize) {
        debug_assert!(matches!(self.op, Op::Idle | Op::Done));
        self.result = None;
        if self.my_pos == 0 {
            let payload = payload.expect("root broadcast without payload");
            debug_assert_eq!(payload.len(), len);
            for c in self.children_of(self.my_pos) {
                self.send_ints(c, &payload);
            }
            self.result = Some(payload);
            self.op = Op::Done;
        } else {
            debug_assert!(payload.is_none());
            let handle = self.recv_ints(self.parent_pos(), len);
            self.op = Op::BcastRecv {
                handle: Some(handle),
            };
        }
    }

    /// Start gathering one `rec_len`-integer record per member to the root.
    /// Records arrive at the root in tree order, not rank order; callers
    /// embed the rank in the record.
    pub fn begin_gather(&mut self, record: Vec<i32>, rec_len: usize) {
        debug_assert!(matches!(self.op, Op::Idle | Op::Done));
        debug_assert_eq!(record.len(), rec_len);
        self.result = None;
        if self.group.len() == 1 {
            self.result = Some(record);
            self.op = Op::Done;
            return;
        }
        let children = self.children_of(self.my_pos);
        if children.is_empty() {
            let parent = self.parent_pos();
            self.send_ints(parent, &record);
            self.op = Op::Done;
            return;
        }
        let pending = children
            .iter()
            .map(|&c| Some(self.recv_ints(c, rec_len * self.subtree_size(c))))
            .collect::<Vec<_>>();
        let parts = vec![Vec::new(); pending.len()];
        self.op = Op::Gather {
            pending,
            parts,
            mine: record,
        };
    }

    /// Advance the in-flight operation; returns true once it has completed
    /// on this rank.
    pub fn check(&mut self) -> bool {
        // Take ownership of the op so progress handlers can send through
        // `&mut self` without aliasing it.
        let op = std::mem::replace(&mut self.op, Op::Idle);
        match op {
            Op::Idle => true,
            Op::Done => {
                self.op = Op::Done;
                true
            }
            Op::Reduce {
                mut pending,
                mut acc,
            } => {
                for slot in pending.iter_mut() {
                    if let Some(handle) = slot.as_mut() {
                        if let Some(bytes) = handle.poll() {
                            let contrib = ints_from_bytes(&bytes);
                            debug_assert_eq!(contrib.len(), acc.len());
                            for (a, c) in acc.iter_mut().zip(contrib) {
                                *a += c;
                            }
                            *slot = None;
                        }
                    }
                }
                if pending.iter().all(Option::is_none) {
                    if self.my_pos == 0 {
                        self.result = Some(acc);
                    } else {
                        let parent = self.parent_pos();
                        self.send_ints(parent, &acc);
                    }
                    self.op = Op::Done;
                    true
                } else {
                    self.op = Op::Reduce { pending, acc };
                    false
                }
            }
            Op::BcastRecv { mut handle } => {
                let ready = handle.as_mut().and_then(|h| h.poll());
                match ready {
                    None => {
                        self.op = Op::BcastRecv { handle };
                        false
                    }
                    Some(bytes) => {
                        let payload = ints_from_bytes(&bytes);
                        for c in self.children_of(self.my_pos) {
                            self.send_ints(c, &payload);
                        }
                        self.result = Some(payload);
                        self.op = Op::Done;
                        true
                    }
                }
            }
            Op::Gather {
                mut pending,
                mut parts,
                mine,
            } => {
                for (slot, part) in pending.iter_mut().zip(parts.iter_mut()) {
                    if let Some(handle) = slot.as_mut() {
                        if let Some(bytes) = handle.poll() {
                            *part = ints_from_bytes(&bytes);
                            *slot = None;
                        }
                    }
                }
                if pending.iter().all(Option::is_none) {
                    let mut all = mine;
                    for part in parts.iter_mut() {
                        all.append(part);
                    }
                    if self.my_pos == 0 {
                        self.result = Some(all);
                    } else {
                        let parent = self.parent_pos();
                        self.send_ints(parent, &all);
                    }
                    self.op = Op::Done;
                    true
                } else {
                    self.op = Op::Gather {
                        pending,
                        parts,
                        mine,
                    };
                    false
                }
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.op, Op::Idle | Op::Done)
    }

    /// The completed operation's local result: the reduced vector or the
    /// gathered records on the root, the payload on every broadcast member,
    /// empty elsewhere.
    pub fn take_result(&mut self) -> Vec<i32> {
        self.result.take().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::communicator::ThreadComm;

    fn run_group<F>(size: usize, group: Vec<usize>, root: usize, f: F) -> Vec<Vec<i32>>
    where
        F: Fn(&mut CommGroup<ThreadComm>, usize) + Send + Sync + Copy + 'static,
    {
        let comms = ThreadComm::universe(size);
        let mut handles = Vec::new();
        for comm in comms {
            let rank = comm.rank();
            let group = group.clone();
            if !group.contains(&rank) {
                continue;
            }
            handles.push(std::thread::spawn(move || {
                let mut g = CommGroup::new(Arc::new(comm), group, root, CommTag::new(50));
                f(&mut g, rank);
                while !g.check() {
                    std::thread::yield_now();
                }
                g.take_result()
            }));
        }
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn degree_grows_with_group_size() {
        assert_eq!(communication_tree_degree(1), 2);
        assert_eq!(communication_tree_degree(7), 2);
        assert_eq!(communication_tree_degree(8), 3);
        assert_eq!(communication_tree_degree(64), 4);
    }

    #[test]
    fn singleton_ops_complete_immediately() {
        let comms = ThreadComm::universe(1);
        let mut g = CommGroup::new(Arc::new(comms[0].clone()), vec![0], 0, CommTag::new(1));
        g.begin_sum_reduce(vec![3, 4]);
        assert!(g.check());
        assert_eq!(g.take_result(), vec![3, 4]);
        g.begin_bcast(Some(vec![7]), 1);
        assert!(g.check());
        assert_eq!(g.take_result(), vec![7]);
        g.begin_gather(vec![9, 9], 2);
        assert!(g.check());
        assert_eq!(g.take_result(), vec![9, 9]);
    }

    #[test]
    fn sum_reduce_to_root() {
        let results = run_group(5, vec![0, 1, 2, 3, 4], 2, |g, rank| {
            g.begin_sum_reduce(vec![rank as i32, 1]);
        });
        // Exactly one member (the root) ends with the reduced vector.
        let nonempty: Vec<_> = results.into_iter().filter(|r| !r.is_empty()).collect();
        assert_eq!(nonempty, vec![vec![10, 5]]);
    }

    #[test]
    fn bcast_reaches_every_member() {
        let results = run_group(6, vec![0, 1, 2, 3, 4, 5], 3, |g, _rank| {
            let payload = g.is_root().then(|| vec![41, 42]);
            g.begin_bcast(payload, 2);
        });
        assert_eq!(results.len(), 6);
        for r in results {
            assert_eq!(r, vec![41, 42]);
        }
    }

    #[test]
    fn gather_collects_every_record() {
        let results = run_group(7, vec![0, 2, 3, 4, 5, 6, 1], 0, |g, rank| {
            g.begin_gather(vec![rank as i32, rank as i32 * 10], 2);
        });
        let root: Vec<i32> = results
            .into_iter()
            .find(|r| r.len() == 14)
            .expect("root gathered all records");
        let mut seen: Vec<(i32, i32)> = root.chunks(2).map(|c| (c[0], c[1])).collect();
        seen.sort_unstable();
        assert_eq!(
            seen,
            (0..7).map(|r| (r, r * 10)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn subset_group_ignores_outsiders() {
        let results = run_group(6, vec![1, 3, 5], 5, |g, rank| {
            g.begin_sum_reduce(vec![rank as i32]);
        });
        let nonempty: Vec<_> = results.into_iter().filter(|r| !r.is_empty()).collect();
        assert_eq!(nonempty, vec![vec![9]]);
    }
}
