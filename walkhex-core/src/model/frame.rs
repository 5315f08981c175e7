//! Typed columns and the wide node table.
//!
//! Result columns are keyed by [`Column`] instead of ad-hoc strings, and
//! every column holds one `Option<f64>` per row. The textual names
//! (`dist_<category>`, `idx_<category>`, ...) only appear at the I/O edge.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use geo::Point;
use hashbrown::HashMap;

use super::costs::{CostTable, DistanceRecord};
use super::streets::StreetGraph;
use crate::{Error, StreetNodeId};

const COMPOSITE_NAME: &str = "idx_composite";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    /// Cost to the nearest point of interest (`dist_<category>`)
    Distance(String),
    /// Points of interest reachable within the budget (`reach_<category>`)
    Reachable(String),
    /// Logistic sub-index (`idx_<category>`)
    SubIndex(String),
    /// Weighted composite of all sub-indices
    Composite,
    /// Any other numeric attribute, e.g. population
    Attribute(String),
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Column::Distance(c) => write!(f, "dist_{c}"),
            Column::Reachable(c) => write!(f, "reach_{c}"),
            Column::SubIndex(c) => write!(f, "idx_{c}"),
            Column::Composite => write!(f, "{COMPOSITE_NAME}"),
            Column::Attribute(name) => write!(f, "{name}"),
        }
    }
}

impl FromStr for Column {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == COMPOSITE_NAME {
            return Ok(Column::Composite);
        }
        let column = if let Some(c) = s.strip_prefix("dist_") {
            Column::Distance(c.to_string())
        } else if let Some(c) = s.strip_prefix("reach_") {
            Column::Reachable(c.to_string())
        } else if let Some(c) = s.strip_prefix("idx_") {
            Column::SubIndex(c.to_string())
        } else {
            Column::Attribute(s.to_string())
        };
        Ok(column)
    }
}

/// Row-aligned storage of typed numeric columns
pub trait ColumnStore {
    fn row_count(&self) -> usize;

    fn column(&self, column: &Column) -> Option<&[Option<f64>]>;

    /// Adds or replaces a column; its length must match the row count
    fn insert_column(&mut self, column: Column, values: Vec<Option<f64>>) -> Result<(), Error>;

    fn columns(&self) -> Vec<&Column>;

    fn require(&self, column: &Column) -> Result<&[Option<f64>], Error> {
        self.column(column)
            .ok_or_else(|| Error::MissingColumn(column.to_string()))
    }
}

/// Wide node table: one row per street node, one column per result
#[derive(Debug, Clone, Default)]
pub struct NodeFrame {
    ids: Vec<StreetNodeId>,
    geometry: Vec<Point<f64>>,
    row_of: HashMap<StreetNodeId, usize>,
    columns: BTreeMap<Column, Vec<Option<f64>>>,
}

impl NodeFrame {
    /// One row per node of `graph`, ordered by OSM id
    pub fn from_graph(graph: &StreetGraph) -> Self {
        let rows = graph
            .node_ids()
            .into_iter()
            .filter_map(|id| {
                let idx = graph.index_of(id).ok()?;
                Some((id, graph[idx].geometry))
            })
            .collect::<Vec<_>>();
        // ids are unique in a graph
        Self::from_points(rows).unwrap_or_default()
    }

    pub fn from_points(rows: Vec<(StreetNodeId, Point<f64>)>) -> Result<Self, Error> {
        let mut frame = NodeFrame::default();
        for (row, (id, point)) in rows.into_iter().enumerate() {
            if frame.row_of.insert(id, row).is_some() {
                return Err(Error::InvalidData(format!("duplicate node id {id}")));
            }
            frame.ids.push(id);
            frame.geometry.push(point);
        }
        Ok(frame)
    }

    pub fn ids(&self) -> &[StreetNodeId] {
        &self.ids
    }

    pub fn geometry(&self) -> &[Point<f64>] {
        &self.geometry
    }

    pub fn row(&self, id: StreetNodeId) -> Option<usize> {
        self.row_of.get(&id).copied()
    }

    pub fn value(&self, id: StreetNodeId, column: &Column) -> Option<f64> {
        let row = self.row(id)?;
        self.column(column)?[row]
    }

    /// Joins a column given as a map keyed by node id; absent nodes get `None`
    pub fn join_column(&mut self, column: Column, values: &HashMap<StreetNodeId, f64>) {
        let joined = self.ids.iter().map(|id| values.get(id).copied()).collect();
        self.columns.insert(column, joined);
    }

    /// Adds the `dist_` (and, when counted, `reach_`) columns of a cost table
    pub fn insert_cost_table(&mut self, table: &CostTable) -> Result<(), Error> {
        let mut costs = vec![None; self.ids.len()];
        let mut counts = table.reachable().map(|_| vec![None; self.ids.len()]);

        for (i, &origin) in table.origins().iter().enumerate() {
            let row = self.row(origin).ok_or(Error::UnknownNode(origin))?;
            costs[row] = table.costs()[i];
            if let (Some(counts), Some(reach)) = (counts.as_mut(), table.reachable()) {
                counts[row] = Some(f64::from(reach[i]));
            }
        }

        let category = table.category().to_string();
        if let Some(counts) = counts {
            self.columns.insert(Column::Reachable(category.clone()), counts);
        }
        self.columns.insert(Column::Distance(category), costs);
        Ok(())
    }

    /// Pivots tidy records into `dist_`/`reach_` columns
    pub fn pivot_records(&mut self, records: &[DistanceRecord]) -> Result<(), Error> {
        for record in records {
            let row = self
                .row(record.osmid)
                .ok_or(Error::UnknownNode(record.osmid))?;
            let len = self.ids.len();
            self.columns
                .entry(Column::Distance(record.category.clone()))
                .or_insert_with(|| vec![None; len])[row] = record.cost;
            if let Some(count) = record.reachable {
                self.columns
                    .entry(Column::Reachable(record.category.clone()))
                    .or_insert_with(|| vec![None; len])[row] = Some(f64::from(count));
            }
        }
        Ok(())
    }

    /// Tidy records for every `dist_` column
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_records(&self) -> Vec<DistanceRecord> {
        let mut records = Vec::new();
        for (column, values) in &self.columns {
            let Column::Distance(category) = column else {
                continue;
            };
            let counts = self.column(&Column::Reachable(category.clone()));
            for (row, &osmid) in self.ids.iter().enumerate() {
                records.push(DistanceRecord {
                    osmid,
                    category: category.clone(),
                    cost: values[row],
                    reachable: counts.and_then(|c| c[row]).map(|n| n as u32),
                });
            }
        }
        records
    }
}

impl ColumnStore for NodeFrame {
    fn row_count(&self) -> usize {
        self.ids.len()
    }

    fn column(&self, column: &Column) -> Option<&[Option<f64>]> {
        self.columns.get(column).map(Vec::as_slice)
    }

    fn insert_column(&mut self, column: Column, values: Vec<Option<f64>>) -> Result<(), Error> {
        if values.len() != self.ids.len() {
            return Err(Error::InvalidData(format!(
                "column {column} has {} values for {} nodes",
                values.len(),
                self.ids.len()
            )));
        }
        self.columns.insert(column, values);
        Ok(())
    }

    fn columns(&self) -> Vec<&Column> {
        self.columns.keys().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Weight;

    fn frame() -> NodeFrame {
        NodeFrame::from_points(vec![
            (10, Point::new(0.0, 0.0)),
            (20, Point::new(1.0, 0.0)),
            (30, Point::new(2.0, 0.0)),
        ])
        .unwrap()
    }

    #[test]
    fn column_names_round_trip() {
        for name in ["dist_farmacia", "reach_escuelas", "idx_hospitales", "idx_composite", "pobtot"] {
            assert_eq!(name.parse::<Column>().unwrap().to_string(), name);
        }
        assert_eq!(
            "dist_farmacia".parse::<Column>().unwrap(),
            Column::Distance("farmacia".to_string())
        );
    }

    #[test]
    fn cost_table_joins_by_node_id() {
        let mut frame = frame();
        let table = CostTable::new("farmacia", Weight::Length, vec![30, 10], vec![Some(5.0), None], None);
        frame.insert_cost_table(&table).unwrap();

        let dist = frame.column(&Column::Distance("farmacia".into())).unwrap();
        assert_eq!(dist, &[None, None, Some(5.0)]);
        assert!(frame.column(&Column::Reachable("farmacia".into())).is_none());
    }

    #[test]
    fn tidy_records_pivot_back_to_wide() {
        let mut wide = frame();
        let table = CostTable::new(
            "parque",
            Weight::TimeMin,
            vec![10, 20, 30],
            vec![Some(0.0), Some(2.5), None],
            Some(vec![1, 1, 0]),
        );
        wide.insert_cost_table(&table).unwrap();

        let records = wide.to_records();
        assert_eq!(records.len(), 3);

        let mut pivoted = frame();
        pivoted.pivot_records(&records).unwrap();
        assert_eq!(
            pivoted.column(&Column::Distance("parque".into())),
            wide.column(&Column::Distance("parque".into()))
        );
        assert_eq!(pivoted.value(10, &Column::Reachable("parque".into())), Some(1.0));
    }

    #[test]
    fn insert_rejects_misaligned_column() {
        let mut frame = frame();
        let err = frame.insert_column(Column::Attribute("pobtot".into()), vec![Some(1.0)]);
        assert!(err.is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let rows = vec![(1, Point::new(0.0, 0.0)), (1, Point::new(1.0, 1.0))];
        assert!(NodeFrame::from_points(rows).is_err());
    }
}
