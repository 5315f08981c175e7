use std::collections::BTreeMap;
use std::str::FromStr;

use geo::Polygon;
use h3o::CellIndex;
use hashbrown::HashMap;

use super::grid::{HexResolution, cell_polygon};
use crate::{
    Error,
    model::{Column, ColumnStore},
};

/// Identity and bookkeeping of one aggregated hex
#[derive(Debug, Clone, PartialEq)]
pub struct HexRecord {
    pub hex_id: String,
    pub geometry: Polygon<f64>,
    /// Nodes joined to the hex
    pub node_count: u32,
    /// Sum of node weights (e.g. population) when aggregated with weights
    pub weight_sum: Option<f64>,
}

impl HexRecord {
    /// Weight used when re-aggregating this hex
    pub fn effective_weight(&self) -> f64 {
        self.weight_sum.unwrap_or(f64::from(self.node_count))
    }
}

/// Hex table: one row per hex with at least one contributing node.
/// Hexes without nodes are absent rather than zero-filled.
#[derive(Debug, Clone)]
pub struct HexTable {
    resolution: HexResolution,
    rows: Vec<HexRecord>,
    row_of: HashMap<String, usize>,
    columns: BTreeMap<Column, Vec<Option<f64>>>,
}

impl HexTable {
    pub fn new(resolution: HexResolution) -> Self {
        Self {
            resolution,
            rows: Vec::new(),
            row_of: HashMap::new(),
            columns: BTreeMap::new(),
        }
    }

    pub fn resolution(&self) -> HexResolution {
        self.resolution
    }

    pub fn rows(&self) -> &[HexRecord] {
        &self.rows
    }

    pub fn row(&self, hex_id: &str) -> Option<usize> {
        self.row_of.get(hex_id).copied()
    }

    pub fn record(&self, hex_id: &str) -> Option<&HexRecord> {
        self.row(hex_id).map(|row| &self.rows[row])
    }

    pub fn value(&self, hex_id: &str, column: &Column) -> Option<f64> {
        let row = self.row(hex_id)?;
        self.column(column)?[row]
    }

    pub(crate) fn push_row(&mut self, record: HexRecord) -> usize {
        let row = self.rows.len();
        self.row_of.insert(record.hex_id.clone(), row);
        self.rows.push(record);
        for values in self.columns.values_mut() {
            values.push(None);
        }
        row
    }

    /// Merges `other` into this table, keyed by hex id.
    ///
    /// Columns present in `other` overwrite the same columns here; hexes new
    /// to this table are appended. Upserting the same table twice leaves
    /// the result unchanged.
    pub fn upsert(&mut self, other: HexTable) -> Result<(), Error> {
        if other.resolution != self.resolution {
            return Err(Error::InvalidData(format!(
                "cannot merge hex tables at resolutions {} and {}",
                other.resolution, self.resolution
            )));
        }

        let mut target_rows = Vec::with_capacity(other.rows.len());
        for record in other.rows {
            let row = match self.row(&record.hex_id) {
                Some(row) => {
                    let existing = &mut self.rows[row];
                    if record.weight_sum.is_some() {
                        existing.weight_sum = record.weight_sum;
                    }
                    existing.node_count = existing.node_count.max(record.node_count);
                    row
                }
                None => self.push_row(record),
            };
            target_rows.push(row);
        }

        let len = self.rows.len();
        for (column, values) in other.columns {
            let merged = self.columns.entry(column).or_insert_with(|| vec![None; len]);
            for (src, value) in values.into_iter().enumerate() {
                merged[target_rows[src]] = value;
            }
        }
        Ok(())
    }

    /// Re-aggregates an H3 table to a coarser resolution.
    ///
    /// Every column becomes the mean of its children weighted by their
    /// carried weight sums (node counts for unweighted tables).
    pub fn coarsen(&self, target: HexResolution) -> Result<HexTable, Error> {
        if target >= self.resolution {
            return Err(Error::InvalidResolution(format!(
                "cannot coarsen resolution {} to {target}",
                self.resolution
            )));
        }
        let h3_target = target.to_h3()?;

        let mut parents: BTreeMap<CellIndex, Vec<usize>> = BTreeMap::new();
        for (row, record) in self.rows.iter().enumerate() {
            let cell = CellIndex::from_str(&record.hex_id).map_err(|_| {
                Error::InvalidData(format!("hex id {} is not an H3 index", record.hex_id))
            })?;
            let parent = cell.parent(h3_target).ok_or_else(|| {
                Error::InvalidResolution(format!("{} has no parent at {target}", record.hex_id))
            })?;
            parents.entry(parent).or_default().push(row);
        }

        let weighted = self.rows.iter().any(|r| r.weight_sum.is_some());
        let mut coarse = HexTable::new(target);
        let mut coarse_columns: BTreeMap<Column, Vec<Option<f64>>> = BTreeMap::new();

        for (parent, children) in &parents {
            let node_count = children.iter().map(|&c| self.rows[c].node_count).sum();
            let weight_sum = weighted.then(|| {
                children
                    .iter()
                    .filter_map(|&c| self.rows[c].weight_sum)
                    .sum()
            });
            coarse.push_row(HexRecord {
                hex_id: parent.to_string(),
                geometry: cell_polygon(*parent),
                node_count,
                weight_sum,
            });

            for (column, values) in &self.columns {
                let (mut sum, mut weights) = (0.0, 0.0);
                for &child in children {
                    if let Some(value) = values[child] {
                        let w = self.rows[child].effective_weight();
                        sum += value * w;
                        weights += w;
                    }
                }
                let mean = (weights > 0.0).then(|| sum / weights);
                coarse_columns.entry(column.clone()).or_default().push(mean);
            }
        }

        coarse.columns = coarse_columns;
        Ok(coarse)
    }
}

impl ColumnStore for HexTable {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column(&self, column: &Column) -> Option<&[Option<f64>]> {
        self.columns.get(column).map(Vec::as_slice)
    }

    fn insert_column(&mut self, column: Column, values: Vec<Option<f64>>) -> Result<(), Error> {
        if values.len() != self.rows.len() {
            return Err(Error::InvalidData(format!(
                "column {column} has {} values for {} hexes",
                values.len(),
                self.rows.len()
            )));
        }
        self.columns.insert(column, values);
        Ok(())
    }

    fn columns(&self) -> Vec<&Column> {
        self.columns.keys().collect()
    }
}
