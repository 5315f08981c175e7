//! Network algorithms: snapping, nearest-POI costs, reachability counts,
//! batched and sharded drivers, and isochrones.

pub mod batch;
pub mod isochrone;
pub mod nearest;
pub mod reach;
pub mod snapping;

pub use batch::{BatchDriver, ShardFailure, ShardedRun};
pub use isochrone::{bulk_isochrones, node_isochrone};
pub use nearest::{NearestQuery, nearest_distance};
pub use reach::count_reachable;
pub use snapping::{SnapConfig, SnappedPois, snap_pois};
