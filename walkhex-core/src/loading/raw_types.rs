//! Row types of the input tables, as they appear in CSV files

use geo::{LineString, Point};
use serde::Deserialize;

use super::de::{deserialize_highway, deserialize_wkt_linestring, deserialize_wkt_point};
use crate::{Error, StreetNodeId, model::Poi};

#[derive(Debug, Clone, Deserialize)]
pub struct NodeRow {
    pub osmid: StreetNodeId,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub street_count: Option<u32>,
    #[serde(default)]
    pub elevation: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeRow {
    pub u: StreetNodeId,
    pub v: StreetNodeId,
    #[serde(default)]
    pub key: u32,
    #[serde(default)]
    pub length: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_highway")]
    pub highway: Vec<String>,
    #[serde(default)]
    pub grade: Option<f64>,
    /// km/h
    #[serde(default)]
    pub walkspeed: Option<f64>,
    #[serde(default)]
    pub time_min: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_wkt_linestring")]
    pub geometry: Option<LineString<f64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoiRow {
    pub id: String,
    pub code: String,
    #[serde(default, deserialize_with = "deserialize_wkt_point")]
    pub geometry: Option<Point<f64>>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
}

impl TryFrom<PoiRow> for Poi {
    type Error = Error;

    fn try_from(row: PoiRow) -> Result<Self, Self::Error> {
        let geometry = match (row.geometry, row.x, row.y) {
            (Some(point), _, _) => point,
            (None, Some(x), Some(y)) => Point::new(x, y),
            _ => {
                return Err(Error::InvalidData(format!(
                    "point of interest '{}' has no geometry",
                    row.id
                )));
            }
        };
        if !(geometry.x().is_finite() && geometry.y().is_finite()) {
            return Err(Error::InvalidData(format!(
                "point of interest '{}' has non-finite coordinates",
                row.id
            )));
        }
        Ok(Poi {
            id: row.id,
            code: row.code,
            geometry,
        })
    }
}
