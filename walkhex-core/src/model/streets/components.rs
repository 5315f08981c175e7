//! Street network components - nodes and edges

use std::fmt;

use geo::{LineString, Point};
use serde::{Deserialize, Serialize};

use crate::{Cost, StreetNodeId};

/// Edge attribute used as traversal cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Weight {
    /// Meters
    #[default]
    #[serde(rename = "length")]
    Length,
    /// Walking minutes
    #[serde(rename = "time_min")]
    TimeMin,
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Weight::Length => write!(f, "length"),
            Weight::TimeMin => write!(f, "time_min"),
        }
    }
}

/// Street graph node
#[derive(Debug, Clone)]
pub struct StreetNode {
    /// OSM ID of the node
    pub id: StreetNodeId,
    /// Node coordinates in the input CRS
    pub geometry: Point<f64>,
    pub street_count: Option<u32>,
    pub elevation: Option<f64>,
    /// Node was absent from the node table and lifted from edge geometry
    pub synthesized: bool,
}

/// Street graph edge (street segment)
#[derive(Debug, Clone)]
pub struct StreetEdge {
    /// Parallel-edge key
    pub key: u32,
    /// Meters
    pub length: f64,
    /// Walking time in minutes
    pub time_min: f64,
    pub highway: Vec<String>,
    pub grade: Option<f64>,
    pub geometry: Option<LineString<f64>>,
}

impl StreetEdge {
    pub fn cost(&self, weight: Weight) -> Cost {
        match weight {
            Weight::Length => self.length,
            Weight::TimeMin => self.time_min,
        }
    }
}
