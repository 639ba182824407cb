//! User-tunable clustering parameters.

use crate::geometry::IntVec;

/// How the owner of a newly formed child group is chosen.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum OwnerMode {
    /// Rank 0 owns every dendogram node and joins every group.
    SingleOwner,
    /// The rank with the largest overlap on the child box (ties to the
    /// lower rank). Default.
    MostOverlap,
    /// Among ranks with nonzero overlap, the one owning the fewest nodes at
    /// decision time. May be nondeterministic.
    FewestOwned,
    /// Among ranks with nonzero overlap, the one participating in the
    /// fewest nodes at decision time. May be nondeterministic.
    LeastActive,
}

/// How the driver advances suspended dendogram nodes.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AdvanceMode {
    /// Wait out each node's communication step before moving on.
    Synchronous,
    /// Resume one node per stage poll.
    AdvanceAny,
    /// Resume every currently ready node per stage poll. Default.
    AdvanceSome,
}

/// Which neighbor relationships to compute after clustering.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RelationshipMode {
    /// No connector output.
    None,
    /// Directed edges from local tag patches to new boxes.
    TagToNew,
    /// Tag-to-new edges plus the reverse edge set, assembled on the new
    /// boxes' owners. Default.
    Bidirectional,
}

/// Tunable thresholds and modes for one clustering invocation.
///
/// Construct with [`ClusterParams::new`] for a given dimension, then
/// override fields as needed.
#[derive(Clone, Debug)]
pub struct ClusterParams {
    /// Cell value that marks a tagged cell.
    pub tag_val: i32,
    /// Minimum tag density required to accept a box.
    pub efficiency_tol: f64,
    /// Tolerated volume growth when recombining two accepted siblings.
    pub combine_tol: f64,
    /// Hard minimum side length of an accepted box.
    pub min_box: IntVec,
    /// Hard maximum side length of an accepted box.
    pub max_box_size: IntVec,
    /// Minimum side length induced by inflection-cut placement; may exceed
    /// `min_box`.
    pub min_box_size_from_cutting: IntVec,
    /// Fraction of the legal band around the center plane where inflection
    /// cuts may land: 0 = center plane only, 1 = anywhere legal.
    pub max_inflection_cut_from_center: f64,
    /// Aspect-ratio gate for inflection cuts: an axis is eligible when the
    /// thickest axis is at most this factor longer. The thickest axis is
    /// always eligible.
    pub inflection_cut_threshold_ar: f64,
    pub owner_mode: OwnerMode,
    pub advance_mode: AdvanceMode,
    pub relationships: RelationshipMode,
    /// Growth applied when testing box proximity for relationships and
    /// group membership.
    pub ghost_cell_width: i32,
    /// Emit a tracing event for every dendogram node action.
    pub log_node_history: bool,
    /// Exclusive upper bound of usable point-to-point message tags.
    pub tag_upper_bound: u32,
}

impl ClusterParams {
    pub fn new(dim: usize) -> Self {
        Self {
            tag_val: 1,
            efficiency_tol: 0.8,
            combine_tol: 0.8,
            min_box: IntVec::uniform(dim, 1),
            max_box_size: IntVec::uniform(dim, i32::MAX),
            min_box_size_from_cutting: IntVec::uniform(dim, 1),
            max_inflection_cut_from_center: 1.0,
            inflection_cut_threshold_ar: 4.0,
            owner_mode: OwnerMode::MostOverlap,
            advance_mode: AdvanceMode::AdvanceSome,
            relationships: RelationshipMode::Bidirectional,
            ghost_cell_width: 1,
            log_node_history: false,
            tag_upper_bound: 1 << 20,
        }
    }

    pub fn dim(&self) -> usize {
        self.min_box.dim()
    }
}
