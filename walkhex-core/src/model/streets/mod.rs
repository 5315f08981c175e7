//! Pedestrian street network model

pub mod components;
pub mod network;

pub use components::{StreetEdge, StreetNode, Weight};
pub use network::{IndexedPoint, StreetGraph};
