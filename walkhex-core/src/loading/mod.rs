//! This module is responsible for reading the tabular inputs (nodes, edges,
//! points of interest, hex grids) and building a routable street graph.

mod builder;
mod config;
mod de;
pub mod raw_types;
mod tables;

pub use builder::{build_street_graph, validate_poi_coverage};
pub use config::{GraphBuilderConfig, SpeedModel};
pub use raw_types::{EdgeRow, NodeRow, PoiRow};
pub use tables::{
    deserialize_table_file, open_table, read_edges, read_hex_grid, read_hex_table,
    read_node_attributes, read_nodes, read_pois,
};
