//! Data model for the accessibility pipeline
//!
//! Contains the street network, points of interest and the tabular
//! structures that carry per-node results between components.

pub mod costs;
pub mod crs;
pub mod frame;
pub mod poi;
pub mod streets;

pub use costs::{CostTable, DistanceRecord};
pub use crs::{Crs, Projection};
pub use frame::{Column, ColumnStore, NodeFrame};
pub use poi::{AmenityCategory, Poi};
pub use streets::{IndexedPoint, StreetEdge, StreetGraph, StreetNode, Weight};
