pub use crate::algo::{
    BatchDriver, NearestQuery, ShardFailure, ShardedRun, SnapConfig, bulk_isochrones,
    nearest_distance, node_isochrone,
};
pub use crate::hex::{HexAggregation, HexGrid, HexResolution, HexTable, OrphanReport, group_by_hex};
pub use crate::index::{CompositeIndex, DecayParams, IndexComponent, IndexConfig, MissingPolicy};
pub use crate::loading::{GraphBuilderConfig, SpeedModel, build_street_graph};
pub use crate::model::{
    AmenityCategory, Column, ColumnStore, CostTable, Crs, DistanceRecord, NodeFrame, Poi,
    StreetGraph, Weight,
};
pub use crate::pipeline::{AnalysisConfig, AnalysisReport, CategoryFailure, proximity_analysis};
pub use crate::{Cost, Error, StreetNodeId};
