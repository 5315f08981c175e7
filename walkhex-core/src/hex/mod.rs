//! Hexagonal grids and the aggregation of node results onto them

mod aggregate;
mod grid;
mod table;
mod to_geojson;

pub use aggregate::{HexAggregation, OrphanReport, group_by_hex};
pub use grid::{HexCell, HexGrid, HexResolution, cell_polygon};
pub use table::{HexRecord, HexTable};
