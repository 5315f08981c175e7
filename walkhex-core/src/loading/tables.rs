use std::fs::File;
use std::io::Read;
use std::path::Path;

use geo::Polygon;
use hashbrown::HashMap;
use log::info;
use wkt::TryFromWkt;

use super::raw_types::{EdgeRow, NodeRow, PoiRow};
use crate::{
    Error, StreetNodeId,
    hex::{HexCell, HexGrid, HexRecord, HexResolution, HexTable},
    model::{Column, ColumnStore, Poi},
};

/// Opens an input table, naming the path in the error
pub fn open_table(path: &Path) -> Result<File, Error> {
    File::open(path).map_err(|e| {
        Error::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to open file '{}': {}", path.display(), e),
        ))
    })
}

/// Reads every row of a CSV table, failing on the first malformed row
pub fn deserialize_table_file<T>(path: &Path) -> Result<Vec<T>, Error>
where
    T: for<'de> serde::Deserialize<'de>,
{
    deserialize_table(open_table(path)?)
}

fn deserialize_table<T, R>(reader: R) -> Result<Vec<T>, Error>
where
    T: for<'de> serde::Deserialize<'de>,
    R: Read,
{
    Ok(csv::Reader::from_reader(reader)
        .deserialize()
        .collect::<Result<Vec<T>, _>>()?)
}

pub fn read_nodes<R: Read>(reader: R) -> Result<Vec<NodeRow>, Error> {
    let nodes: Vec<NodeRow> = deserialize_table(reader)?;
    info!("Read {} street nodes", nodes.len());
    Ok(nodes)
}

pub fn read_edges<R: Read>(reader: R) -> Result<Vec<EdgeRow>, Error> {
    let edges: Vec<EdgeRow> = deserialize_table(reader)?;
    info!("Read {} street edges", edges.len());
    Ok(edges)
}

pub fn read_pois<R: Read>(reader: R) -> Result<Vec<Poi>, Error> {
    let rows: Vec<PoiRow> = deserialize_table(reader)?;
    let pois = rows
        .into_iter()
        .map(Poi::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    info!("Read {} points of interest", pois.len());
    Ok(pois)
}

/// Reads a hex grid table with columns `hex_id_<res>` and `geometry` (WKT
/// polygon). The resolution is taken from the id column name.
pub fn read_hex_grid<R: Read>(reader: R) -> Result<HexGrid, Error> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let (id_col, resolution) = hex_id_column(&headers)?;
    let geom_col = headers
        .iter()
        .position(|name| name == "geometry")
        .ok_or_else(|| Error::MissingColumn("geometry".to_string()))?;

    let mut cells = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let id = record.get(id_col).unwrap_or_default().to_string();
        let wkt_str = record.get(geom_col).unwrap_or_default();
        let geometry = Polygon::try_from_wkt_str(wkt_str)
            .map_err(|e| Error::WktError(format!("hex {id}: {e}")))?;
        cells.push(HexCell { id, geometry });
    }

    info!("Read {} hex cells at resolution {resolution}", cells.len());
    HexGrid::from_cells(HexResolution::try_from(resolution)?, cells)
}

/// Reads a hex table written by a previous run: `hex_id_<res>`,
/// `node_count`, optional `weight_sum`, any number of result columns and a
/// WKT `geometry`. Empty cells are missing values.
pub fn read_hex_table<R: Read>(reader: R) -> Result<HexTable, Error> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let (id_col, resolution) = hex_id_column(&headers)?;
    let position = |name: &str| headers.iter().position(|h| h == name);
    let count_col =
        position("node_count").ok_or_else(|| Error::MissingColumn("node_count".to_string()))?;
    let weight_col = position("weight_sum");
    let geom_col =
        position("geometry").ok_or_else(|| Error::MissingColumn("geometry".to_string()))?;

    let value_cols: Vec<(usize, Column)> = headers
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != id_col && i != count_col && i != geom_col && Some(i) != weight_col)
        .map(|(i, name)| (i, name.parse::<Column>().unwrap_or(Column::Attribute(name.to_string()))))
        .collect();

    let mut table = HexTable::new(HexResolution::try_from(resolution)?);
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); value_cols.len()];
    for record in rdr.records() {
        let record = record?;
        let hex_id = record.get(id_col).unwrap_or_default().to_string();
        let cell = |col: usize| -> Result<Option<f64>, Error> {
            let raw = record.get(col).unwrap_or_default().trim();
            if raw.is_empty() {
                return Ok(None);
            }
            raw.parse()
                .map(Some)
                .map_err(|_| Error::InvalidData(format!("hex {hex_id}: '{raw}' is not a number")))
        };

        let node_count = cell(count_col)?.map_or(0, |count| count as u32);
        let weight_sum = weight_col.map(cell).transpose()?.flatten();
        let geometry = Polygon::try_from_wkt_str(record.get(geom_col).unwrap_or_default())
            .map_err(|e| Error::WktError(format!("hex {hex_id}: {e}")))?;
        for (slot, (col, _)) in value_cols.iter().enumerate() {
            values[slot].push(cell(*col)?);
        }
        if table.row(&hex_id).is_some() {
            return Err(Error::InvalidData(format!("duplicate hex id {hex_id}")));
        }
        table.push_row(HexRecord {
            hex_id,
            geometry,
            node_count,
            weight_sum,
        });
    }

    for ((_, column), values) in value_cols.into_iter().zip(values) {
        table.insert_column(column, values)?;
    }
    info!(
        "Read {} hexes at resolution {resolution} with {} result columns",
        table.rows().len(),
        table.columns().len()
    );
    Ok(table)
}

fn hex_id_column(headers: &csv::StringRecord) -> Result<(usize, u8), Error> {
    headers
        .iter()
        .enumerate()
        .find_map(|(i, name)| {
            name.strip_prefix("hex_id_")
                .and_then(|res| res.parse::<u8>().ok())
                .map(|res| (i, res))
        })
        .ok_or_else(|| Error::MissingColumn("hex_id_<resolution>".to_string()))
}

/// Reads numeric node attributes (e.g. population) keyed by `id_column`.
/// Empty cells are skipped; non-numeric cells are an error.
pub fn read_node_attributes<R: Read>(
    reader: R,
    id_column: &str,
    columns: &[&str],
) -> Result<Vec<(Column, HashMap<StreetNodeId, f64>)>, Error> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let position = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    };

    let id_idx = position(id_column)?;
    let value_idx = columns
        .iter()
        .map(|name| position(name))
        .collect::<Result<Vec<_>, _>>()?;
    let mut values: Vec<HashMap<StreetNodeId, f64>> = vec![HashMap::new(); columns.len()];

    for record in rdr.records() {
        let record = record?;
        let raw_id = record.get(id_idx).unwrap_or_default();
        let id: StreetNodeId = raw_id
            .trim()
            .parse()
            .map_err(|_| Error::InvalidData(format!("invalid node id '{raw_id}'")))?;
        for (slot, &col) in value_idx.iter().enumerate() {
            let raw = record.get(col).unwrap_or_default().trim();
            if raw.is_empty() {
                continue;
            }
            let value: f64 = raw.parse().map_err(|_| {
                Error::InvalidData(format!("node {id}: '{raw}' in {} is not a number", columns[slot]))
            })?;
            values[slot].insert(id, value);
        }
    }

    Ok(columns
        .iter()
        .map(|name| name.parse::<Column>().unwrap_or(Column::Attribute((*name).to_string())))
        .zip(values)
        .collect())
}
