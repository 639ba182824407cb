//! Clustering outputs: the box level of accepted boxes and the connector of
//! neighbor relationships.

pub mod box_level;
pub mod connector;

pub use box_level::{BoxId, BoxLevel};
pub use connector::Connector;
