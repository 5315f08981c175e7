use geojson::{Feature, FeatureCollection, Geometry, Value as GeoJsonValue};
use serde_json::{Map, Value, json};

use super::table::HexTable;
use crate::{Error, model::ColumnStore};

impl HexTable {
    /// Converts the table to a `GeoJSON` `FeatureCollection`, one polygon
    /// feature per hex. Missing values become `null`.
    pub fn to_geojson(&self) -> Result<FeatureCollection, Error> {
        let id_column = self.resolution().id_column();
        let columns = self.columns();

        let features = self
            .rows()
            .iter()
            .enumerate()
            .map(|(row, record)| {
                let mut properties = Map::new();
                properties.insert(id_column.clone(), json!(record.hex_id));
                properties.insert("node_count".to_string(), json!(record.node_count));
                if let Some(weight_sum) = record.weight_sum {
                    properties.insert("weight_sum".to_string(), json!(weight_sum));
                }
                for column in &columns {
                    let value = self
                        .column(column)
                        .and_then(|values| values[row])
                        .map_or(Value::Null, |v| json!(v));
                    properties.insert(column.to_string(), value);
                }

                let geometry = Geometry::new(GeoJsonValue::from(&record.geometry));
                let value = json!({
                    "type": "Feature",
                    "geometry": geometry,
                    "properties": properties,
                });
                serde_json::from_value::<Feature>(value)
                    .map_err(|e| Error::GeoJsonError(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FeatureCollection {
            features,
            bbox: None,
            foreign_members: None,
        })
    }

    pub fn to_geojson_string(&self) -> Result<String, Error> {
        serde_json::to_string(&self.to_geojson()?).map_err(|e| Error::GeoJsonError(e.to_string()))
    }
}
