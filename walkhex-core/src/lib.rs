//! Core of the pedestrian accessibility pipeline.
//!
//! Builds a routable street graph from node/edge tables, computes network
//! costs from every node to the nearest point of interest of each amenity
//! category, aggregates those costs onto hexagonal grids and derives
//! logistic accessibility indices.

pub mod algo;
pub mod error;
pub mod hex;
pub mod index;
pub mod loading;
pub mod model;
pub mod pipeline;
pub mod prelude;
pub mod routing;

pub use error::Error;

/// OSM identifier of a street node
pub type StreetNodeId = i64;
/// Network cost, meters or minutes depending on the selected [`model::Weight`]
pub type Cost = f64;

/// Nodes inspected when snapping a point to the network
pub const MAX_SNAP_CANDIDATES: usize = 16;
/// Two candidate nodes closer than this (meters) are treated as equidistant
pub const SNAP_TIE_TOLERANCE: f64 = 1e-6;
