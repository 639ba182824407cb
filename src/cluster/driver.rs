//! The clustering driver: validation, root creation, the relaunch/stage
//! loop, and output assembly.

use std::sync::Arc;

use tracing::debug;

use crate::cluster::context::{self, ClusterContext, ClusterStats};
use crate::cluster::node::{self, DendogramNode, WaitPhase};
use crate::cluster::params::{AdvanceMode, ClusterParams, RelationshipMode};
use crate::cluster::relationships;
use crate::cluster_error::ClusterError;
use crate::comm::{Communicator, StageAdvance};
use crate::geometry::IndexBox;
use crate::level::{BoxLevel, Connector};
use crate::tag::TagLevel;

/// Everything one clustering invocation produces.
#[derive(Clone, Debug)]
pub struct ClusterOutput {
    /// Locally owned accepted boxes.
    pub new_box_level: BoxLevel,
    /// Edges from local tag patches to new boxes, when requested.
    pub tag_to_new: Option<Connector>,
    /// Reverse edges for locally owned new boxes, in bidirectional mode.
    pub new_to_tag: Option<Connector>,
    /// Local analysis counters.
    pub stats: ClusterStats,
}

/// The asynchronous distributed Berger-Rigoutsos clustering algorithm.
///
/// Construct with the tuned [`ClusterParams`], then call
/// [`cluster`](Self::cluster) once per invocation. The same instance may be
/// reused; no state persists between calls.
#[derive(Clone, Debug)]
pub struct BergerRigoutsos {
    params: ClusterParams,
}

impl BergerRigoutsos {
    pub fn new(params: ClusterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    /// Cluster the tagged cells of `tag_level` inside the per-block
    /// bounding boxes and, per configuration, compute the neighbor
    /// relationships of the result.
    pub fn cluster<C: Communicator>(
        &self,
        comm: Arc<C>,
        tag_level: &TagLevel,
        bound_boxes: &[IndexBox],
    ) -> Result<ClusterOutput, ClusterError> {
        self.validate(tag_level, bound_boxes)?;

        let mut ctx = ClusterContext::new(
            comm.clone(),
            self.params.clone(),
            tag_level,
            bound_boxes.len(),
        )?;

        // One root per block, spanning the whole communicator. The initial
        // owner is rank 0; descendants pick owners per policy.
        let all_ranks: Vec<usize> = (0..comm.size()).collect();
        for (i, bounds) in bound_boxes.iter().enumerate() {
            let root =
                DendogramNode::new_root(*bounds, all_ranks.clone(), 0, context::root_tag(i));
            let id = ctx.alloc_node(root);
            ctx.enqueue(id);
        }

        let stage_mode = match self.params.advance_mode {
            AdvanceMode::AdvanceAny => StageAdvance::Any,
            AdvanceMode::AdvanceSome | AdvanceMode::Synchronous => StageAdvance::Some,
        };
        loop {
            while let Some(id) = ctx.queue.pop_front() {
                ctx.nodes[id].queued = false;
                node::continue_algorithm(&mut ctx, id)?;
            }
            if !ctx.stage.has_outstanding() {
                break;
            }
            for id in ctx.drain_ready(stage_mode) {
                ctx.enqueue(id);
            }
        }
        debug_assert!(
            ctx.nodes
                .iter()
                .all(|n| n.wait_phase == WaitPhase::Completed),
            "driver loop ended with unfinished nodes"
        );
        debug!(
            boxes = ctx.new_level.len(),
            nodes = ctx.stats.nodes_allocated,
            "clustering complete"
        );

        let (tag_to_new, new_to_tag) = match self.params.relationships {
            RelationshipMode::None => (None, None),
            RelationshipMode::TagToNew => {
                (Some(relationships::compute_tag_to_new(&ctx)), None)
            }
            RelationshipMode::Bidirectional => {
                let forward = relationships::compute_tag_to_new(&ctx);
                let reverse = relationships::share_new_neighborhood_sets(&ctx, &forward)?;
                (Some(forward), Some(reverse))
            }
        };

        Ok(ClusterOutput {
            new_box_level: ctx.new_level,
            tag_to_new,
            new_to_tag,
            stats: ctx.stats,
        })
    }

    fn validate(&self, tag_level: &TagLevel, bound_boxes: &[IndexBox]) -> Result<(), ClusterError> {
        let p = &self.params;
        let dim = p.dim();
        if bound_boxes.is_empty() {
            return Err(ClusterError::EmptyBoundingBoxes);
        }
        if tag_level.dim() != dim {
            return Err(ClusterError::DimensionMismatch {
                context: "tag level",
                expected: dim,
                got: tag_level.dim(),
            });
        }
        for b in bound_boxes {
            if b.dim() != dim {
                return Err(ClusterError::DimensionMismatch {
                    context: "block bounding box",
                    expected: dim,
                    got: b.dim(),
                });
            }
            if b.is_empty() {
                return Err(ClusterError::InvalidBoxConstraint {
                    name: "block bounding box",
                });
            }
        }
        if !(p.efficiency_tol > 0.0 && p.efficiency_tol <= 1.0) {
            return Err(ClusterError::InvalidTolerance {
                name: "efficiency_tol",
                value: p.efficiency_tol,
            });
        }
        if p.combine_tol < 0.0 {
            return Err(ClusterError::InvalidTolerance {
                name: "combine_tol",
                value: p.combine_tol,
            });
        }
        if !(0.0..=1.0).contains(&p.max_inflection_cut_from_center) {
            return Err(ClusterError::InvalidTolerance {
                name: "max_inflection_cut_from_center",
                value: p.max_inflection_cut_from_center,
            });
        }
        if p.inflection_cut_threshold_ar < 0.0 {
            return Err(ClusterError::InvalidTolerance {
                name: "inflection_cut_threshold_ar",
                value: p.inflection_cut_threshold_ar,
            });
        }
        if p.min_box.min_entry() < 1 {
            return Err(ClusterError::InvalidBoxConstraint { name: "min_box" });
        }
        if p.min_box_size_from_cutting.min_entry() < 1 {
            return Err(ClusterError::InvalidBoxConstraint {
                name: "min_box_size_from_cutting",
            });
        }
        if !p.min_box.all_le(&p.max_box_size) {
            return Err(ClusterError::InvalidBoxConstraint {
                name: "max_box_size",
            });
        }
        if p.ghost_cell_width < 0 {
            return Err(ClusterError::InvalidBoxConstraint {
                name: "ghost_cell_width",
            });
        }
        Ok(())
    }
}
