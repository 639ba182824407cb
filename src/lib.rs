//! # mesh-cluster
//!
//! mesh-cluster is a Rust library for clustering tagged mesh cells into
//! boxes with the asynchronous distributed Berger-Rigoutsos algorithm, the
//! box-generation step of structured adaptive mesh refinement. The
//! recursive splitting runs without recursion: candidate boxes form a
//! dendogram whose nodes advance on non-blocking collective completions,
//! so candidates at every depth of every block progress concurrently and
//! the critical path is bounded by message latency rather than tree depth.
//!
//! ## Features
//! - Integer index-space boxes with per-block bounding and splitting
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!   behind one non-blocking `Communicator` trait
//! - Tree-structured asynchronous collectives multiplexed by a
//!   communication stage
//! - Owner-selection policies, recombination, and tunable acceptance
//!   thresholds matching production SAMR practice
//! - Optional neighbor-relationship computation, unidirectional or
//!   bidirectional, with an owner-directed edge exchange
//!
//! ## Usage
//! Add `mesh-cluster` as a dependency and enable features as needed:
//!
//! ```toml
//! [dependencies]
//! mesh-cluster = "0.4"
//! # Optional features:
//! # features = ["mpi-support"]
//! ```
//!
//! Build a [`tag::TagLevel`] from the locally owned patches, pick
//! [`cluster::ClusterParams`], and call
//! [`cluster::BergerRigoutsos::cluster`] on every rank of the
//! communicator.

pub mod cluster;
pub mod cluster_error;
pub mod comm;
pub mod geometry;
pub mod level;
pub mod tag;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::cluster::{
        AdvanceMode, BergerRigoutsos, ClusterOutput, ClusterParams, ClusterStats, OwnerMode,
        RelationshipMode,
    };
    pub use crate::cluster_error::ClusterError;
    pub use crate::comm::{CommTag, Communicator, NoComm, RecvRequest, SendRequest, ThreadComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::comm::MpiComm;
    pub use crate::geometry::{BlockId, IndexBox, IntVec};
    pub use crate::level::{BoxId, BoxLevel, Connector};
    pub use crate::tag::{TagLevel, TagPatch};
}
