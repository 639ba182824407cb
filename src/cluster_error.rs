//! ClusterError: unified error type for the mesh-cluster public APIs.
//!
//! Degenerate inputs (an empty tag set, a box that cannot legally be cut)
//! are not errors; they resolve inside the algorithm. Errors here are the
//! fatal kind: bad configuration, exhausted resources, failed communication.

use thiserror::Error;

/// Unified error type for clustering operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClusterError {
    /// No block bounding boxes were supplied.
    #[error("clustering requires at least one block bounding box")]
    EmptyBoundingBoxes,
    /// Inputs disagree on the spatial dimension.
    #[error("dimension mismatch: {context} has dimension {got}, expected {expected}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },
    /// A tolerance parameter is outside its valid range.
    #[error("invalid tolerance `{name}` = {value}")]
    InvalidTolerance { name: &'static str, value: f64 },
    /// A box-size constraint is non-positive or inconsistent.
    #[error("invalid box constraint `{name}`")]
    InvalidBoxConstraint { name: &'static str },
    /// The MPI tag space cannot cover the communicator.
    #[error("tag upper bound {upper_bound} is too small for {ranks} ranks")]
    TagSpaceTooSmall { upper_bound: u32, ranks: usize },
    /// The local process ran out of MPI tags for new dendogram nodes.
    #[error("MPI tag pool exhausted on rank {rank}")]
    TagPoolExhausted { rank: usize },
    /// A communication primitive failed underneath a clustering phase.
    #[error("communication failure during {phase}: {detail}")]
    CommFailure {
        phase: &'static str,
        detail: String,
    },
}
