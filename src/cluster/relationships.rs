//! Post-clustering neighborhood computation.
//!
//! Stage 1 is purely local: every rank intersects its grown tag patches
//! with the new boxes it witnessed and emits tag-to-new edges. Stage 2
//! (bidirectional mode) routes each edge to the new box's owner with a
//! two-phase exchange: counts first, then fixed-width edge records. The
//! sender and receiver sets are both derived from the recorded node groups,
//! so every expected message is matched by exactly one send, possibly
//! empty-counted.

use std::collections::{BTreeMap, BTreeSet};

use crate::cluster::context::{ClusterContext, RESERVED_TAGS};
use crate::cluster::wire::EdgeRec;
use crate::cluster_error::ClusterError;
use crate::comm::communicator::{CommTag, ExchangeCommTags, RecvRequest, SendRequest};
use crate::comm::Communicator;
use crate::level::{BoxId, Connector};

/// Tag-to-new edges for the local tag patches: a patch and a new box are
/// neighbors when the patch grown by the ghost width intersects the box.
pub(crate) fn compute_tag_to_new<C: Communicator>(ctx: &ClusterContext<C>) -> Connector {
    let me = ctx.rank();
    let gcw = ctx.params.ghost_cell_width;
    let mut tag_to_new = Connector::new();
    for (i, patch) in ctx.tag_level.patches().iter().enumerate() {
        let tag_id = BoxId::new(me, i as u32);
        let grown = patch.bounds().grown(gcw);
        for (new_id, known) in &ctx.known {
            if grown.intersect(&known.bounds).is_some() {
                tag_to_new.insert(tag_id, *new_id);
            }
        }
    }
    tag_to_new
}

/// Send every locally found edge to the owner of its new box and unpack the
/// reverse new-to-tag edge set on the owners.
pub(crate) fn share_new_neighborhood_sets<C: Communicator>(
    ctx: &ClusterContext<C>,
    tag_to_new: &Connector,
) -> Result<Connector, ClusterError> {
    let me = ctx.rank();
    let comm = &ctx.comm;
    let tags =
        ExchangeCommTags::from_base(CommTag::new(ctx.params.tag_upper_bound - RESERVED_TAGS));

    let mut new_to_tag = Connector::new();

    // Outgoing records, bucketed by the new box's owner; local edges are
    // folded in directly.
    let mut outgoing: BTreeMap<usize, Vec<EdgeRec>> = BTreeMap::new();
    for (tag_id, new_id) in tag_to_new.iter() {
        if new_id.owner as usize == me {
            new_to_tag.insert(new_id, tag_id);
        } else {
            outgoing.entry(new_id.owner as usize).or_default().push(EdgeRec {
                new_local: new_id.local,
                tag_owner: tag_id.owner,
                tag_local: tag_id.local,
            });
        }
    }

    // Every rank that witnessed one of my boxes will send me a count, and I
    // must send one to every owner whose box I witnessed.
    let mut send_targets: BTreeSet<usize> = BTreeSet::new();
    let mut expect_senders: BTreeSet<usize> = BTreeSet::new();
    for (id, known) in &ctx.known {
        let owner = id.owner as usize;
        if owner != me {
            send_targets.insert(owner);
        } else {
            expect_senders.extend(known.group.iter().copied().filter(|&r| r != me));
        }
    }

    // --- Sizes ---
    let mut size_recvs = Vec::new();
    for &peer in &expect_senders {
        let handle = comm.irecv(peer, tags.sizes.as_u32(), 4);
        size_recvs.push((peer, handle));
    }
    let mut pending_sends = Vec::new();
    for &peer in &send_targets {
        let count = outgoing.get(&peer).map_or(0, Vec::len) as u32;
        pending_sends.push(comm.isend(peer, tags.sizes.as_u32(), &count.to_le_bytes()));
    }
    let mut incoming_counts: BTreeMap<usize, u32> = BTreeMap::new();
    for (peer, handle) in size_recvs {
        let bytes = handle.recv().ok_or_else(|| ClusterError::CommFailure {
            phase: "relationship size exchange",
            detail: format!("no count received from rank {peer}"),
        })?;
        if bytes.len() != 4 {
            return Err(ClusterError::CommFailure {
                phase: "relationship size exchange",
                detail: format!("short count from rank {peer}"),
            });
        }
        incoming_counts.insert(peer, u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
    }

    // --- Data ---
    let rec_size = std::mem::size_of::<EdgeRec>();
    let mut data_recvs = Vec::new();
    for (&peer, &count) in &incoming_counts {
        if count == 0 {
            continue;
        }
        let handle = comm.irecv(peer, tags.data.as_u32(), count as usize * rec_size);
        data_recvs.push((peer, count, handle));
    }
    for (&peer, records) in &outgoing {
        if records.is_empty() {
            continue;
        }
        pending_sends.push(comm.isend(peer, tags.data.as_u32(), bytemuck::cast_slice(records)));
    }
    for (peer, count, handle) in data_recvs {
        let bytes = handle.recv().ok_or_else(|| ClusterError::CommFailure {
            phase: "relationship data exchange",
            detail: format!("no edges received from rank {peer}"),
        })?;
        if bytes.len() != count as usize * rec_size {
            return Err(ClusterError::CommFailure {
                phase: "relationship data exchange",
                detail: format!(
                    "expected {} edge bytes from rank {peer}, got {}",
                    count as usize * rec_size,
                    bytes.len()
                ),
            });
        }
        for chunk in bytes.chunks_exact(rec_size) {
            let word = |at: usize| {
                u32::from_ne_bytes([chunk[at], chunk[at + 1], chunk[at + 2], chunk[at + 3]])
            };
            let new_id = BoxId {
                owner: me as u32,
                local: word(0),
            };
            let tag_id = BoxId {
                owner: word(4),
                local: word(8),
            };
            debug_assert!(ctx.new_level.get(&new_id).is_some(), "edge to unknown box");
            new_to_tag.insert(new_id, tag_id);
        }
    }

    for send in pending_sends {
        send.finish();
    }
    Ok(new_to_tag)
}
