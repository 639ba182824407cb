//! Communication layer: the point-to-point `Communicator` abstraction, the
//! tree-structured asynchronous collective group, and the stage that
//! multiplexes many in-flight groups.

pub mod communicator;
pub mod group;
pub mod stage;

pub use communicator::{CommTag, Communicator, NoComm, RecvRequest, SendRequest, ThreadComm};
pub use group::{communication_tree_degree, CommGroup};
pub use stage::{CommStage, StageAdvance};

#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
