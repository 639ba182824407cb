//! The dendogram node: one candidate box and the state machine that drives
//! it through the clustering phases.
//!
//! Each call to [`continue_algorithm`] performs at most one message-group
//! operation per suspension point. If the operation completes immediately
//! (serial runs, or a lucky poll) the machine keeps going; otherwise the
//! node parks on the communication stage and is resumed when its messages
//! arrive. Mutation happens only from the scheduler thread of the owning
//! process.

use tracing::debug;

use crate::cluster::context::ClusterContext;
use crate::cluster::cuts::{self, AcceptDecision};
use crate::cluster::params::{AdvanceMode, OwnerMode};
use crate::cluster::wire::{
    acceptability_len, child_groups_len, decode_child_groups, encode_child_groups,
    final_outcome_len, AcceptabilityMsg, ChildSpec, FinalOutcomeMsg, GroupingCriteria,
    GROUPING_CRITERIA_LEN, WIRE_ACCEPTED, WIRE_HAS_NO_TAG, WIRE_REJECTED,
};
use crate::cluster_error::ClusterError;
use crate::comm::{CommGroup, CommTag, Communicator};
use crate::geometry::IndexBox;
use crate::level::BoxId;

pub(crate) type NodeId = usize;

/// The communication step a node is suspended on (or about to leave).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum WaitPhase {
    ToBeLaunched,
    ReduceHistogram,
    BcastAcceptability,
    GatherGroupingCriteria,
    BcastChildGroups,
    RunChildren,
    BcastToDropouts,
    Completed,
}

/// Whether and how the candidate box was resolved.
///
/// Accepted values are odd, rejected and undetermined values are even;
/// -1 marks a histogram that came back truly empty (root nodes only, since
/// child boxes are carved around tags).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(i32)]
pub(crate) enum BoxAcceptance {
    Undetermined = -2,
    HasNoTag = -1,
    RejectedByCalculation = 0,
    AcceptedByCalculation = 1,
    RejectedByOwner = 2,
    AcceptedByOwner = 3,
    RejectedByRecombination = 4,
    AcceptedByRecombination = 5,
    RejectedByDropoutBcast = 6,
    AcceptedByDropoutBcast = 7,
}

impl BoxAcceptance {
    pub fn is_accepted(self) -> bool {
        let v = self as i32;
        v >= 0 && v % 2 == 1
    }

    pub fn is_rejected(self) -> bool {
        let v = self as i32;
        v >= 0 && v % 2 == 0
    }

    pub fn has_no_tag(self) -> bool {
        self as i32 == -1
    }
}

/// One node of the dendogram on one participating rank.
pub(crate) struct DendogramNode<C: Communicator> {
    /// Binary position: root 1, children `2p` and `2p+1`; -1/-2 once the
    /// position overflows.
    pub pos: i64,
    /// Root is generation 1.
    pub generation: u32,
    pub parent: Option<NodeId>,
    pub lft_child: Option<NodeId>,
    pub rht_child: Option<NodeId>,
    /// The candidate box; shrunken in place once the owner's histogram
    /// analysis is broadcast.
    pub bounds: IndexBox,
    /// Participating ranks, ascending.
    pub group: Vec<usize>,
    pub owner: usize,
    pub mpi_tag: u32,
    /// This rank's patch-cell overlap with `bounds` (grown), set at
    /// creation for children.
    pub overlap: i64,
    pub acceptance: BoxAcceptance,
    /// Reduced per-axis histogram; meaningful on the owner.
    pub histogram: Vec<Vec<i32>>,
    pub num_tags: i64,
    /// Identity and extent of the accepted box, once resolved.
    pub box_id: Option<BoxId>,
    pub accepted_bounds: Option<IndexBox>,
    pub wait_phase: WaitPhase,
    pub comm_group: Option<CommGroup<C>>,
    /// True while on the relaunch queue.
    pub queued: bool,
    /// Child boxes of a pending split and this rank's overlap with each.
    pending_children: Option<(IndexBox, IndexBox)>,
    child_overlaps: (i64, i64),
    /// Continuations consumed by this node.
    pub n_cont: usize,
}

impl<C: Communicator> DendogramNode<C> {
    pub fn new_root(bounds: IndexBox, group: Vec<usize>, owner: usize, mpi_tag: u32) -> Self {
        Self {
            pos: 1,
            generation: 1,
            parent: None,
            lft_child: None,
            rht_child: None,
            bounds,
            group,
            owner,
            mpi_tag,
            overlap: 0,
            acceptance: BoxAcceptance::Undetermined,
            histogram: Vec::new(),
            num_tags: 0,
            box_id: None,
            accepted_bounds: None,
            wait_phase: WaitPhase::ToBeLaunched,
            comm_group: None,
            queued: false,
            pending_children: None,
            child_overlaps: (0, 0),
            n_cont: 0,
        }
    }

    pub fn new_child(
        parent_id: NodeId,
        parent_pos: i64,
        parent_generation: u32,
        left: bool,
        spec: &ChildSpec,
        bounds: IndexBox,
        overlap: i64,
    ) -> Self {
        let pos = if parent_pos < 0 || parent_pos > i64::MAX / 2 - 1 {
            if left {
                -1
            } else {
                -2
            }
        } else {
            2 * parent_pos + if left { 0 } else { 1 }
        };
        Self {
            pos,
            generation: parent_generation + 1,
            parent: Some(parent_id),
            lft_child: None,
            rht_child: None,
            bounds,
            group: spec.group.clone(),
            owner: spec.owner,
            mpi_tag: spec.mpi_tag,
            overlap,
            acceptance: BoxAcceptance::Undetermined,
            histogram: Vec::new(),
            num_tags: 0,
            box_id: None,
            accepted_bounds: None,
            wait_phase: WaitPhase::ToBeLaunched,
            comm_group: None,
            queued: false,
            pending_children: None,
            child_overlaps: (0, 0),
            n_cont: 0,
        }
    }
}

fn histogram_len(bounds: &IndexBox) -> usize {
    (0..bounds.dim()).map(|d| bounds.cells(d) as usize).sum()
}

fn flatten_histogram(hist: &[Vec<i32>]) -> Vec<i32> {
    hist.iter().flatten().copied().collect()
}

fn unflatten_histogram(flat: &[i32], bounds: &IndexBox) -> Vec<Vec<i32>> {
    let mut hist = Vec::with_capacity(bounds.dim());
    let mut at = 0usize;
    for d in 0..bounds.dim() {
        let n = bounds.cells(d) as usize;
        hist.push(flat[at..at + n].to_vec());
        at += n;
    }
    hist
}

/// Finish the node's in-flight group operation: true when done, false when
/// the node was parked on the stage. Synchronous mode waits in place.
fn finish_op<C: Communicator>(ctx: &mut ClusterContext<C>, id: NodeId) -> bool {
    let sync = ctx.params.advance_mode == AdvanceMode::Synchronous;
    loop {
        let done = ctx.nodes[id]
            .comm_group
            .as_mut()
            .map_or(true, CommGroup::check);
        if done {
            return true;
        }
        if !sync {
            ctx.stage.attach(id);
            return false;
        }
        std::thread::yield_now();
    }
}

fn note_history<C: Communicator>(ctx: &ClusterContext<C>, id: NodeId, action: &str) {
    if ctx.params.log_node_history {
        let node = &ctx.nodes[id];
        debug!(
            pos = node.pos,
            generation = node.generation,
            owner = node.owner,
            phase = ?node.wait_phase,
            action,
            "dendogram node"
        );
    }
}

/// Mark the node complete and reactivate a parent waiting on its children.
fn complete<C: Communicator>(ctx: &mut ClusterContext<C>, id: NodeId) {
    ctx.nodes[id].wait_phase = WaitPhase::Completed;
    let n_cont = ctx.nodes[id].n_cont;
    ctx.stats.max_continuations = ctx.stats.max_continuations.max(n_cont);
    ctx.note_completed(id);
    note_history(ctx, id, "completed");
    if let Some(parent) = ctx.nodes[id].parent {
        if ctx.nodes[parent].wait_phase == WaitPhase::RunChildren {
            ctx.enqueue(parent);
        }
    }
}

/// Drive the node forward until it completes or suspends on communication.
/// Returns the phase the node is left in.
pub(crate) fn continue_algorithm<C: Communicator>(
    ctx: &mut ClusterContext<C>,
    id: NodeId,
) -> Result<WaitPhase, ClusterError> {
    ctx.stats.continuation_calls += 1;
    ctx.nodes[id].n_cont += 1;
    loop {
        match ctx.nodes[id].wait_phase {
            WaitPhase::ToBeLaunched => {
                start_histogram_reduction(ctx, id);
                ctx.nodes[id].wait_phase = WaitPhase::ReduceHistogram;
                if !finish_op(ctx, id) {
                    return Ok(WaitPhase::ReduceHistogram);
                }
            }
            WaitPhase::ReduceHistogram => {
                begin_acceptability_bcast(ctx, id);
                ctx.nodes[id].wait_phase = WaitPhase::BcastAcceptability;
                if !finish_op(ctx, id) {
                    return Ok(WaitPhase::BcastAcceptability);
                }
            }
            WaitPhase::BcastAcceptability => {
                if process_acceptability(ctx, id) {
                    complete(ctx, id);
                    return Ok(WaitPhase::Completed);
                }
                ctx.nodes[id].wait_phase = WaitPhase::GatherGroupingCriteria;
                if !finish_op(ctx, id) {
                    return Ok(WaitPhase::GatherGroupingCriteria);
                }
            }
            WaitPhase::GatherGroupingCriteria => {
                begin_child_groups_bcast(ctx, id)?;
                ctx.nodes[id].wait_phase = WaitPhase::BcastChildGroups;
                if !finish_op(ctx, id) {
                    return Ok(WaitPhase::BcastChildGroups);
                }
            }
            WaitPhase::BcastChildGroups => {
                let participating = process_child_groups(ctx, id);
                if participating {
                    ctx.nodes[id].wait_phase = WaitPhase::RunChildren;
                } else {
                    // A dropout posts its final-outcome receive before the
                    // owner can possibly send it.
                    begin_final_outcome_wait(ctx, id);
                    ctx.nodes[id].wait_phase = WaitPhase::BcastToDropouts;
                    if !finish_op(ctx, id) {
                        return Ok(WaitPhase::BcastToDropouts);
                    }
                }
            }
            WaitPhase::RunChildren => {
                if !local_children_done(ctx, id) {
                    // Dormant: completing children re-enqueue this node.
                    return Ok(WaitPhase::RunChildren);
                }
                begin_final_outcome_bcast(ctx, id);
                ctx.nodes[id].wait_phase = WaitPhase::BcastToDropouts;
                if !finish_op(ctx, id) {
                    return Ok(WaitPhase::BcastToDropouts);
                }
            }
            WaitPhase::BcastToDropouts => {
                process_final_outcome(ctx, id);
                complete(ctx, id);
                return Ok(WaitPhase::Completed);
            }
            WaitPhase::Completed => return Ok(WaitPhase::Completed),
        }
    }
}

/// Phase 1: scan local tags inside the candidate box and start the
/// sum-reduction of the histogram toward the owner.
fn start_histogram_reduction<C: Communicator>(ctx: &mut ClusterContext<C>, id: NodeId) {
    note_history(ctx, id, "launch");
    let bounds = ctx.nodes[id].bounds;
    let mut hist: Vec<Vec<i32>> = (0..bounds.dim())
        .map(|d| vec![0; bounds.cells(d) as usize])
        .collect();
    ctx.tag_level
        .accumulate_histogram(&bounds, ctx.params.tag_val, &mut hist);
    let flat = flatten_histogram(&hist);
    debug_assert_eq!(flat.len(), histogram_len(&bounds));

    let group = CommGroup::new(
        ctx.comm.clone(),
        ctx.nodes[id].group.clone(),
        ctx.nodes[id].owner,
        CommTag::new(ctx.nodes[id].mpi_tag),
    );
    let node = &mut ctx.nodes[id];
    node.histogram = hist;
    node.comm_group = Some(group);
    node.comm_group.as_mut().expect("just set").begin_sum_reduce(flat);
}

/// Phase 2: the owner turns the reduced histogram into an accept/split
/// verdict and broadcasts it; everyone else posts the matching receive.
fn begin_acceptability_bcast<C: Communicator>(ctx: &mut ClusterContext<C>, id: NodeId) {
    let me = ctx.rank();
    let params = ctx.params.clone();
    let bounds = ctx.nodes[id].bounds;
    let owner = ctx.nodes[id].owner;
    let is_root = ctx.nodes[id].parent.is_none();

    let payload = if me == owner {
        let flat = ctx.nodes[id]
            .comm_group
            .as_mut()
            .expect("group exists")
            .take_result();
        let reduced = unflatten_histogram(&flat, &bounds);
        let tags = cuts::num_tags(&reduced);
        ctx.nodes[id].histogram = reduced;
        if is_root {
            ctx.stats.num_tags += tags;
        }
        let msg = if tags == 0 {
            debug_assert!(is_root, "tagless non-root node");
            AcceptabilityMsg {
                acceptance: WIRE_HAS_NO_TAG,
                num_tags: 0,
                local_id: 0,
                bounds,
                cut_axis: 0,
                cut_left: 0,
            }
        } else {
            let (shrunk, hist_s) = cuts::shrink_to_tags(&bounds, &ctx.nodes[id].histogram);
            let grown = cuts::grow_within(&shrunk, &params.min_box, &bounds);
            let hist_g = if grown == shrunk {
                hist_s
            } else {
                cuts::pad_histogram(&hist_s, &shrunk, &grown)
            };
            match cuts::accept_or_split(&grown, &hist_g, tags, &params) {
                AcceptDecision::Accept => AcceptabilityMsg {
                    acceptance: WIRE_ACCEPTED,
                    num_tags: tags as i32,
                    local_id: ctx.claim_local_id() as i32,
                    bounds: grown,
                    cut_axis: 0,
                    cut_left: 0,
                },
                AcceptDecision::Split { axis, left_cells } => AcceptabilityMsg {
                    acceptance: WIRE_REJECTED,
                    num_tags: tags as i32,
                    local_id: 0,
                    bounds: grown,
                    cut_axis: axis as i32,
                    cut_left: left_cells,
                },
            }
        };
        Some(msg.encode())
    } else {
        None
    };

    let len = acceptability_len(ctx.dim);
    ctx.nodes[id]
        .comm_group
        .as_mut()
        .expect("group exists")
        .begin_bcast(payload, len);
}

/// Phase 3 entry: apply the owner's verdict. Returns true when the node is
/// finished (accepted or tagless); otherwise the grouping-criteria gather
/// has been posted.
fn process_acceptability<C: Communicator>(ctx: &mut ClusterContext<C>, id: NodeId) -> bool {
    let me = ctx.rank();
    let dim = ctx.dim;
    let flat = ctx.nodes[id]
        .comm_group
        .as_mut()
        .expect("group exists")
        .take_result();
    let msg = AcceptabilityMsg::decode(&flat, dim);
    let owner = ctx.nodes[id].owner;

    match msg.acceptance {
        WIRE_HAS_NO_TAG => {
            ctx.nodes[id].acceptance = BoxAcceptance::HasNoTag;
            note_history(ctx, id, "has no tag");
            true
        }
        WIRE_ACCEPTED => {
            let box_id = BoxId::new(owner, msg.local_id as u32);
            let group = ctx.nodes[id].group.clone();
            {
                let node = &mut ctx.nodes[id];
                node.bounds = msg.bounds;
                node.num_tags = msg.num_tags as i64;
                node.acceptance = if me == owner {
                    BoxAcceptance::AcceptedByCalculation
                } else {
                    BoxAcceptance::AcceptedByOwner
                };
                node.box_id = Some(box_id);
                node.accepted_bounds = Some(msg.bounds);
            }
            ctx.record_box(box_id, msg.bounds, group);
            note_history(ctx, id, "accepted");
            true
        }
        _ => {
            debug_assert_eq!(msg.acceptance, WIRE_REJECTED);
            let (left, right) = msg.bounds.split(msg.cut_axis as usize, msg.cut_left);
            let gcw = ctx.params.ghost_cell_width;
            let ovl_l = ctx.tag_level.overlap_cells(&left.grown(gcw));
            let ovl_r = ctx.tag_level.overlap_cells(&right.grown(gcw));
            let load = match ctx.params.owner_mode {
                OwnerMode::FewestOwned => ctx.stats.nodes_owned as i32,
                OwnerMode::LeastActive => ctx.stats.nodes_active as i32,
                _ => 0,
            };
            let record = GroupingCriteria {
                overlap_left: ovl_l as i32,
                overlap_right: ovl_r as i32,
                rank: me as i32,
                load,
            };
            {
                let node = &mut ctx.nodes[id];
                node.bounds = msg.bounds;
                node.num_tags = msg.num_tags as i64;
                node.acceptance = if me == owner {
                    BoxAcceptance::RejectedByCalculation
                } else {
                    BoxAcceptance::RejectedByOwner
                };
                node.pending_children = Some((left, right));
                node.child_overlaps = (ovl_l, ovl_r);
            }
            note_history(ctx, id, "rejected");
            ctx.nodes[id]
                .comm_group
                .as_mut()
                .expect("group exists")
                .begin_gather(record.to_ints(), GROUPING_CRITERIA_LEN);
            false
        }
    }
}

/// Select the owner of one child group per the configured policy.
fn select_child_owner(
    candidates: &[(usize, i64, i32)], // (rank, overlap, load), overlap > 0
    mode: OwnerMode,
) -> usize {
    debug_assert!(!candidates.is_empty(), "child box with no overlapping rank");
    match mode {
        OwnerMode::SingleOwner => 0,
        OwnerMode::MostOverlap => {
            candidates
                .iter()
                .fold(None::<(usize, i64)>, |best, &(rank, ovl, _)| match best {
                    Some((_, b_ovl)) if b_ovl >= ovl => best,
                    _ => Some((rank, ovl)),
                })
                .expect("nonempty")
                .0
        }
        OwnerMode::FewestOwned | OwnerMode::LeastActive => {
            candidates
                .iter()
                .fold(None::<(usize, i32)>, |best, &(rank, _, load)| match best {
                    Some((_, b_load)) if b_load <= load => best,
                    _ => Some((rank, load)),
                })
                .expect("nonempty")
                .0
        }
    }
}

/// Phase 4: the owner partitions the group by gathered overlaps, picks the
/// child owners, claims the children's message tags, and broadcasts it all.
fn begin_child_groups_bcast<C: Communicator>(
    ctx: &mut ClusterContext<C>,
    id: NodeId,
) -> Result<(), ClusterError> {
    let me = ctx.rank();
    let owner = ctx.nodes[id].owner;
    let group_size = ctx.nodes[id].group.len();

    let payload = if me == owner {
        let flat = ctx.nodes[id]
            .comm_group
            .as_mut()
            .expect("group exists")
            .take_result();
        let records = GroupingCriteria::slice_from_ints(&flat);
        debug_assert_eq!(records.len(), group_size);
        let mode = ctx.params.owner_mode;

        let mut specs = Vec::with_capacity(2);
        for left in [true, false] {
            let mut candidates: Vec<(usize, i64, i32)> = records
                .iter()
                .filter_map(|r| {
                    let ovl = if left { r.overlap_left } else { r.overlap_right };
                    (ovl > 0).then_some((r.rank as usize, ovl as i64, r.load))
                })
                .collect();
            // Gathered records arrive in tree order; rank order makes the
            // tie-breaks deterministic.
            candidates.sort_unstable_by_key(|&(rank, _, _)| rank);
            let mut members: Vec<usize> = candidates.iter().map(|&(r, _, _)| r).collect();
            // The parent owner joins both children so it can observe their
            // outcomes and decide recombination.
            if !members.contains(&owner) {
                members.push(owner);
            }
            members.sort_unstable();
            let child_owner = select_child_owner(&candidates, mode);
            let mpi_tag = ctx.claim_tag()?;
            specs.push(ChildSpec {
                group: members,
                owner: child_owner,
                mpi_tag,
            });
        }
        let right = specs.pop().expect("two specs");
        let left = specs.pop().expect("two specs");
        Some(encode_child_groups(&left, &right, group_size))
    } else {
        None
    };

    ctx.nodes[id]
        .comm_group
        .as_mut()
        .expect("group exists")
        .begin_bcast(payload, child_groups_len(group_size));
    Ok(())
}

/// Phase 5: instantiate the children this rank belongs to. Returns false
/// for a dropout (member of neither child).
fn process_child_groups<C: Communicator>(ctx: &mut ClusterContext<C>, id: NodeId) -> bool {
    let me = ctx.rank();
    let flat = ctx.nodes[id]
        .comm_group
        .as_mut()
        .expect("group exists")
        .take_result();
    let (l_spec, r_spec) = decode_child_groups(&flat);
    let (l_box, r_box) = ctx.nodes[id]
        .pending_children
        .take()
        .expect("split boxes pending");
    let (ovl_l, ovl_r) = ctx.nodes[id].child_overlaps;
    let (pos, generation) = (ctx.nodes[id].pos, ctx.nodes[id].generation);

    let mut participating = false;
    for (left, spec, bounds, overlap) in [
        (true, &l_spec, l_box, ovl_l),
        (false, &r_spec, r_box, ovl_r),
    ] {
        if !spec.group.contains(&me) {
            continue;
        }
        participating = true;
        let child = DendogramNode::new_child(id, pos, generation, left, spec, bounds, overlap);
        let child_id = ctx.alloc_node(child);
        if left {
            ctx.nodes[id].lft_child = Some(child_id);
        } else {
            ctx.nodes[id].rht_child = Some(child_id);
        }
        ctx.enqueue(child_id);
        note_history(ctx, id, if left { "spawn left" } else { "spawn right" });
    }
    participating
}

fn local_children_done<C: Communicator>(ctx: &ClusterContext<C>, id: NodeId) -> bool {
    let node = &ctx.nodes[id];
    let done = |child: Option<NodeId>| {
        child.map_or(true, |c| ctx.nodes[c].wait_phase == WaitPhase::Completed)
    };
    done(node.lft_child) && done(node.rht_child)
}

/// Phase 6: after both children resolve, the owner decides recombination
/// and broadcasts the node's final outcome over the whole group.
fn begin_final_outcome_bcast<C: Communicator>(ctx: &mut ClusterContext<C>, id: NodeId) {
    let me = ctx.rank();
    let owner = ctx.nodes[id].owner;

    let payload = if me == owner {
        // The owner participates in both children, so both are local.
        let lft = ctx.nodes[id].lft_child.expect("owner joins left child");
        let rht = ctx.nodes[id].rht_child.expect("owner joins right child");
        let l_acc = ctx.nodes[lft].acceptance;
        let r_acc = ctx.nodes[rht].acceptance;
        let combined = if l_acc.is_accepted() && r_acc.is_accepted() {
            let l_bounds = ctx.nodes[lft].accepted_bounds.expect("accepted");
            let r_bounds = ctx.nodes[rht].accepted_bounds.expect("accepted");
            cuts::recombine(&l_bounds, &r_bounds, ctx.nodes[id].num_tags, &ctx.params)
        } else {
            None
        };
        let msg = match combined {
            Some(union) => FinalOutcomeMsg {
                combined: true,
                local_id: ctx.claim_local_id() as i32,
                bounds: union,
            },
            None => FinalOutcomeMsg {
                combined: false,
                local_id: 0,
                bounds: ctx.nodes[id].bounds,
            },
        };
        Some(msg.encode())
    } else {
        None
    };

    ctx.nodes[id]
        .comm_group
        .as_mut()
        .expect("group exists")
        .begin_bcast(payload, final_outcome_len(ctx.dim));
}

/// A dropout's half of phase 6: just the receive.
fn begin_final_outcome_wait<C: Communicator>(ctx: &mut ClusterContext<C>, id: NodeId) {
    note_history(ctx, id, "dropout");
    let len = final_outcome_len(ctx.dim);
    ctx.nodes[id]
        .comm_group
        .as_mut()
        .expect("group exists")
        .begin_bcast(None, len);
}

/// Phase 7: apply the final outcome. On recombination every participant
/// retires the child boxes it recorded and adopts the union.
fn process_final_outcome<C: Communicator>(ctx: &mut ClusterContext<C>, id: NodeId) {
    let me = ctx.rank();
    let dim = ctx.dim;
    let flat = ctx.nodes[id]
        .comm_group
        .as_mut()
        .expect("group exists")
        .take_result();
    let msg = FinalOutcomeMsg::decode(&flat, dim);
    let owner = ctx.nodes[id].owner;

    if msg.combined {
        for child in [ctx.nodes[id].lft_child, ctx.nodes[id].rht_child] {
            if let Some(c) = child {
                if let Some(child_box) = ctx.nodes[c].box_id {
                    ctx.erase_box(&child_box);
                }
            }
        }
        let box_id = BoxId::new(owner, msg.local_id as u32);
        let group = ctx.nodes[id].group.clone();
        {
            let node = &mut ctx.nodes[id];
            node.acceptance = if me == owner {
                BoxAcceptance::AcceptedByRecombination
            } else {
                BoxAcceptance::AcceptedByDropoutBcast
            };
            node.box_id = Some(box_id);
            node.accepted_bounds = Some(msg.bounds);
        }
        ctx.record_box(box_id, msg.bounds, group);
        note_history(ctx, id, "recombined");
    } else {
        ctx.nodes[id].acceptance = if me == owner {
            BoxAcceptance::RejectedByRecombination
        } else {
            BoxAcceptance::RejectedByDropoutBcast
        };
    }
}
