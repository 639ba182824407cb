//! The asynchronous distributed Berger-Rigoutsos clustering engine.
//!
//! The algorithm clusters tagged cells into boxes by recursive splitting,
//! executed without recursion: candidate boxes live in a dendogram whose
//! nodes are advanced by non-blocking collective completions, so many
//! candidates at many depths progress concurrently.

pub mod context;
pub mod cuts;
pub mod driver;
pub mod node;
pub mod params;
pub mod relationships;
pub mod wire;

pub use driver::{BergerRigoutsos, ClusterOutput};
pub use params::{AdvanceMode, ClusterParams, OwnerMode, RelationshipMode};
pub use context::ClusterStats;
