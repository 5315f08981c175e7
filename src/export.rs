//! CSV and GeoJSON writers for node and hex results

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value as GeoJsonValue};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use walkhex_core::StreetNodeId;
use walkhex_core::hex::HexTable;
use walkhex_core::model::{ColumnStore, DistanceRecord, NodeFrame};
use wkt::ToWkt;

use crate::error::RunError;

#[derive(Debug, Serialize)]
struct TidyRow<'a> {
    run_id: &'a str,
    osmid: StreetNodeId,
    category: &'a str,
    cost: Option<f64>,
    reachable: Option<u32>,
}

fn fmt_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub(crate) fn create_file(path: &Path) -> Result<BufWriter<File>, RunError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| RunError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| RunError::io(path, e))?;
    Ok(BufWriter::new(file))
}

/// Directory of one run's tidy outputs. Re-running with the same run id
/// replaces the partition instead of appending duplicate rows.
pub fn run_partition(output_dir: &Path, city: &str, run_id: &str) -> PathBuf {
    output_dir.join(city).join(format!("run_id={run_id}"))
}

/// Writes tidy node records, flushing every `chunk_rows` rows.
/// Missing costs are written as empty cells.
pub fn write_tidy<W: Write>(
    writer: W,
    run_id: &str,
    records: &[DistanceRecord],
    chunk_rows: usize,
) -> Result<usize, RunError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for (i, chunk) in records.chunks(chunk_rows.max(1)).enumerate() {
        for record in chunk {
            wtr.serialize(TidyRow {
                run_id,
                osmid: record.osmid,
                category: &record.category,
                cost: record.cost,
                reachable: record.reachable,
            })?;
        }
        wtr.flush().map_err(|e| RunError::io("<tidy output>", e))?;
        debug!("Wrote chunk {} ({} rows)", i + 1, chunk.len());
    }
    Ok(records.len())
}

/// Writes the wide node table: `osmid, x, y` and one column per result
pub fn write_node_table<W: Write>(writer: W, frame: &NodeFrame) -> Result<(), RunError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let columns = frame.columns();

    let mut header = vec!["osmid".to_string(), "x".to_string(), "y".to_string()];
    header.extend(columns.iter().map(ToString::to_string));
    wtr.write_record(&header)?;

    let values: Vec<&[Option<f64>]> = columns
        .iter()
        .filter_map(|column| frame.column(column))
        .collect();
    for (row, (id, point)) in frame.ids().iter().zip(frame.geometry()).enumerate() {
        let mut record = vec![id.to_string(), point.x().to_string(), point.y().to_string()];
        record.extend(values.iter().map(|v| fmt_value(v[row])));
        wtr.write_record(&record)?;
    }
    wtr.flush().map_err(|e| RunError::io("<node output>", e))?;
    Ok(())
}

/// Writes a hex table with `hex_id_<res>`, bookkeeping columns, every
/// result column and a WKT `geometry`
pub fn write_hex_table<W: Write>(writer: W, table: &HexTable) -> Result<(), RunError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let columns = table.columns();

    let mut header = vec![
        table.resolution().id_column(),
        "node_count".to_string(),
        "weight_sum".to_string(),
    ];
    header.extend(columns.iter().map(ToString::to_string));
    header.push("geometry".to_string());
    wtr.write_record(&header)?;

    let values: Vec<&[Option<f64>]> = columns
        .iter()
        .filter_map(|column| table.column(column))
        .collect();
    for (row, record) in table.rows().iter().enumerate() {
        let mut line = vec![
            record.hex_id.clone(),
            record.node_count.to_string(),
            fmt_value(record.weight_sum),
        ];
        line.extend(values.iter().map(|v| fmt_value(v[row])));
        line.push(record.geometry.wkt_string());
        wtr.write_record(&line)?;
    }
    wtr.flush().map_err(|e| RunError::io("<hex output>", e))?;
    Ok(())
}

pub fn write_hex_geojson(path: &Path, table: &HexTable) -> Result<(), RunError> {
    let mut file = create_file(path)?;
    file.write_all(table.to_geojson_string()?.as_bytes())
        .map_err(|e| RunError::io(path, e))?;
    info!("Wrote {} hexes to {}", table.rows().len(), path.display());
    Ok(())
}

/// Isochrones as a GeoJSON feature collection; failed origins are logged
/// and left out
pub fn isochrones_to_geojson(
    results: Vec<(StreetNodeId, Result<MultiPolygon, walkhex_core::Error>)>,
) -> Result<String, RunError> {
    let mut features = Vec::with_capacity(results.len());
    for (origin, result) in results {
        match result {
            Ok(area) => {
                let feature: Feature = serde_json::from_value(json!({
                    "type": "Feature",
                    "geometry": Geometry::new(GeoJsonValue::from(&area)),
                    "properties": { "osmid": origin },
                }))?;
                features.push(feature);
            }
            Err(e) => warn!(origin, error = %e, "Isochrone failed"),
        }
    }
    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    Ok(GeoJson::from(collection).to_string())
}
