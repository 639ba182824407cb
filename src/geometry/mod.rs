//! Integer index-space geometry: per-axis vectors and axis-aligned boxes.

pub mod index_box;
pub mod int_vec;

pub use index_box::{BlockId, IndexBox};
pub use int_vec::{IntVec, MAX_DIM};
