//! Shortest-path searches over the street graph

pub mod dijkstra;
mod state;

pub use dijkstra::{dijkstra_path_weights, multi_source_costs};
