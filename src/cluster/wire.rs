//! Fixed-layout integer wire formats for the clustering phases.
//!
//! Every message is a flat `i32` buffer whose length is computable by every
//! group member from shared state, so receives can be posted before the
//! payload exists. Variable-length sections carry explicit counts and the
//! buffer is padded to its fixed bound.

use bytemuck::{Pod, Zeroable};

use crate::geometry::{BlockId, IndexBox, IntVec};

/// Integers in a serialized box: block id plus both corners.
pub const fn box_wire_len(dim: usize) -> usize {
    1 + 2 * dim
}

/// Append `[block, lo.., hi..]`.
pub fn put_box(buf: &mut Vec<i32>, b: &IndexBox) {
    buf.push(b.block().0 as i32);
    buf.extend_from_slice(b.lo().as_slice());
    buf.extend_from_slice(b.hi().as_slice());
}

/// Decode a box of dimension `dim` from the front of `ints`.
pub fn get_box(ints: &[i32], dim: usize) -> IndexBox {
    debug_assert!(ints.len() >= box_wire_len(dim));
    let block = BlockId(ints[0] as u32);
    let lo = IntVec::from_slice(&ints[1..1 + dim]);
    let hi = IntVec::from_slice(&ints[1 + dim..1 + 2 * dim]);
    IndexBox::new(block, lo, hi)
}

// ===== Acceptability broadcast =============================================

/// Acceptance codes on the wire: the owner's calculation outcome.
pub const WIRE_HAS_NO_TAG: i32 = -1;
pub const WIRE_REJECTED: i32 = 0;
pub const WIRE_ACCEPTED: i32 = 1;

/// `[acceptance, num_tags, local_id, box, cut_axis, cut_left]`; the cut
/// fields are meaningful only when rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptabilityMsg {
    pub acceptance: i32,
    pub num_tags: i32,
    pub local_id: i32,
    pub bounds: IndexBox,
    pub cut_axis: i32,
    pub cut_left: i32,
}

pub const fn acceptability_len(dim: usize) -> usize {
    3 + box_wire_len(dim) + 2
}

impl AcceptabilityMsg {
    pub fn encode(&self) -> Vec<i32> {
        let mut buf = Vec::with_capacity(acceptability_len(self.bounds.dim()));
        buf.push(self.acceptance);
        buf.push(self.num_tags);
        buf.push(self.local_id);
        put_box(&mut buf, &self.bounds);
        buf.push(self.cut_axis);
        buf.push(self.cut_left);
        buf
    }

    pub fn decode(ints: &[i32], dim: usize) -> Self {
        debug_assert_eq!(ints.len(), acceptability_len(dim));
        let bw = box_wire_len(dim);
        Self {
            acceptance: ints[0],
            num_tags: ints[1],
            local_id: ints[2],
            bounds: get_box(&ints[3..3 + bw], dim),
            cut_axis: ints[3 + bw],
            cut_left: ints[4 + bw],
        }
    }
}

// ===== Grouping-criteria gather ============================================

/// One rank's contribution to child-group formation. The rank rides along
/// because gathered records arrive in tree order, not rank order.
#[repr(C)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Pod, Zeroable)]
pub struct GroupingCriteria {
    pub overlap_left: i32,
    pub overlap_right: i32,
    pub rank: i32,
    /// Owned-node or active-node count, depending on the owner mode.
    pub load: i32,
}

pub const GROUPING_CRITERIA_LEN: usize = 4;

impl GroupingCriteria {
    /// The record as the flat integers a group gather carries.
    pub fn to_ints(self) -> Vec<i32> {
        bytemuck::cast::<GroupingCriteria, [i32; GROUPING_CRITERIA_LEN]>(self).to_vec()
    }

    /// View a gathered integer buffer as records, without copying.
    pub fn slice_from_ints(ints: &[i32]) -> &[GroupingCriteria] {
        debug_assert_eq!(ints.len() % GROUPING_CRITERIA_LEN, 0);
        bytemuck::cast_slice(ints)
    }
}

// ===== Child-groups broadcast ==============================================

/// Membership, owner, and message tag for one child node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChildSpec {
    pub group: Vec<usize>,
    pub owner: usize,
    pub mpi_tag: u32,
}

/// `[|G_L|, G_L.., owner_L, tag_L, |G_R|, G_R.., owner_R, tag_R]`, padded to
/// `child_groups_len` so every member can post a fixed-size receive.
pub const fn child_groups_len(parent_group_size: usize) -> usize {
    6 + 2 * parent_group_size
}

pub fn encode_child_groups(left: &ChildSpec, right: &ChildSpec, parent_group_size: usize) -> Vec<i32> {
    let mut buf = Vec::with_capacity(child_groups_len(parent_group_size));
    for spec in [left, right] {
        buf.push(spec.group.len() as i32);
        buf.extend(spec.group.iter().map(|&r| r as i32));
        buf.push(spec.owner as i32);
        buf.push(spec.mpi_tag as i32);
    }
    debug_assert!(buf.len() <= child_groups_len(parent_group_size));
    buf.resize(child_groups_len(parent_group_size), 0);
    buf
}

pub fn decode_child_groups(ints: &[i32]) -> (ChildSpec, ChildSpec) {
    let mut cursor = 0usize;
    let mut next = || -> ChildSpec {
        let n = ints[cursor] as usize;
        let group = ints[cursor + 1..cursor + 1 + n]
            .iter()
            .map(|&r| r as usize)
            .collect();
        let owner = ints[cursor + 1 + n] as usize;
        let mpi_tag = ints[cursor + 2 + n] as u32;
        cursor += 3 + n;
        ChildSpec {
            group,
            owner,
            mpi_tag,
        }
    };
    let left = next();
    let right = next();
    (left, right)
}

// ===== Final-outcome broadcast =============================================

/// `[combined_flag, local_id, box]`: whether recombination replaced the two
/// child boxes, and if so the combined box and its owner-assigned id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalOutcomeMsg {
    pub combined: bool,
    pub local_id: i32,
    pub bounds: IndexBox,
}

pub const fn final_outcome_len(dim: usize) -> usize {
    2 + box_wire_len(dim)
}

impl FinalOutcomeMsg {
    pub fn encode(&self) -> Vec<i32> {
        let mut buf = Vec::with_capacity(final_outcome_len(self.bounds.dim()));
        buf.push(self.combined as i32);
        buf.push(self.local_id);
        put_box(&mut buf, &self.bounds);
        buf
    }

    pub fn decode(ints: &[i32], dim: usize) -> Self {
        debug_assert_eq!(ints.len(), final_outcome_len(dim));
        Self {
            combined: ints[0] != 0,
            local_id: ints[1],
            bounds: get_box(&ints[2..], dim),
        }
    }
}

// ===== Relationship-edge exchange ==========================================

/// One directed edge addressed to the owner of a new box: the owner's local
/// id of the new box plus the global id of the tag-side source.
#[repr(C)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Pod, Zeroable)]
pub struct EdgeRec {
    pub new_local: u32,
    pub tag_owner: u32,
    pub tag_local: u32,
}

// ===== Compile-time sanity checks ==========================================

const _: () = {
    assert!(std::mem::size_of::<GroupingCriteria>() == 16);
    assert!(std::mem::align_of::<GroupingCriteria>() == 4);
    assert!(std::mem::size_of::<EdgeRec>() == 12);
    assert!(std::mem::align_of::<EdgeRec>() == 4);
};

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(lo: [i32; 2], hi: [i32; 2]) -> IndexBox {
        IndexBox::new(
            BlockId(3),
            IntVec::from_slice(&lo),
            IntVec::from_slice(&hi),
        )
    }

    #[test]
    fn box_round_trip() {
        let b = bx([-2, 4], [7, 9]);
        let mut buf = Vec::new();
        put_box(&mut buf, &b);
        assert_eq!(buf.len(), box_wire_len(2));
        assert_eq!(get_box(&buf, 2), b);
    }

    #[test]
    fn acceptability_round_trip() {
        let msg = AcceptabilityMsg {
            acceptance: WIRE_REJECTED,
            num_tags: 17,
            local_id: 5,
            bounds: bx([0, 0], [9, 3]),
            cut_axis: 0,
            cut_left: 4,
        };
        let ints = msg.encode();
        assert_eq!(ints.len(), acceptability_len(2));
        assert_eq!(AcceptabilityMsg::decode(&ints, 2), msg);
    }

    #[test]
    fn child_groups_round_trip_with_padding() {
        let left = ChildSpec {
            group: vec![0, 2, 5],
            owner: 2,
            mpi_tag: 991,
        };
        let right = ChildSpec {
            group: vec![1, 2],
            owner: 1,
            mpi_tag: 992,
        };
        let buf = encode_child_groups(&left, &right, 6);
        assert_eq!(buf.len(), child_groups_len(6));
        let (l, r) = decode_child_groups(&buf);
        assert_eq!(l, left);
        assert_eq!(r, right);
    }

    #[test]
    fn final_outcome_round_trip() {
        let msg = FinalOutcomeMsg {
            combined: true,
            local_id: 12,
            bounds: bx([1, 1], [4, 4]),
        };
        let ints = msg.encode();
        assert_eq!(ints.len(), final_outcome_len(2));
        assert_eq!(FinalOutcomeMsg::decode(&ints, 2), msg);
    }

    #[test]
    fn grouping_criteria_pack_unpack() {
        let recs = vec![
            GroupingCriteria {
                overlap_left: 4,
                overlap_right: 0,
                rank: 3,
                load: 1,
            },
            GroupingCriteria {
                overlap_left: 0,
                overlap_right: 9,
                rank: 0,
                load: 2,
            },
        ];
        let ints: Vec<i32> = recs.iter().flat_map(|r| r.to_ints()).collect();
        assert_eq!(GroupingCriteria::slice_from_ints(&ints), recs.as_slice());
    }
}
