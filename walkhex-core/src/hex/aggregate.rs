//! Spatial join of node results onto a hex grid

use log::{info, warn};
use rayon::prelude::*;

use super::grid::{HexGrid, HexResolution};
use super::table::{HexRecord, HexTable};
use crate::{
    Error, StreetNodeId,
    model::{Column, ColumnStore, NodeFrame},
};

/// Nodes that fell outside every cell of a grid. They are left out of the
/// aggregation, never counted as zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct OrphanReport {
    pub resolution: HexResolution,
    pub nodes: Vec<StreetNodeId>,
}

impl OrphanReport {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct HexAggregation {
    pub table: HexTable,
    pub orphans: OrphanReport,
}

#[derive(Debug, Clone)]
struct Accumulator {
    node_count: u32,
    weight_sum: f64,
    sums: Vec<f64>,
    weights: Vec<f64>,
}

impl Accumulator {
    fn new(columns: usize) -> Self {
        Self {
            node_count: 0,
            weight_sum: 0.0,
            sums: vec![0.0; columns],
            weights: vec![0.0; columns],
        }
    }
}

/// Aggregates `value_columns` of `frame` onto the cells of `grid`.
///
/// Without `weight` every hex gets the arithmetic mean of its nodes; with a
/// weight column it gets `sum(value * weight) / sum(weight)` and the weight
/// sum is carried in [`HexRecord::weight_sum`]. Missing node values are
/// skipped, hexes without nodes are absent, and a hex whose contributing
/// weights sum to zero gets no value.
///
/// # Errors
///
/// Fails when a column is missing from `frame` or a weight is negative.
pub fn group_by_hex(
    frame: &NodeFrame,
    grid: &HexGrid,
    value_columns: &[Column],
    weight: Option<&Column>,
) -> Result<HexAggregation, Error> {
    let values = value_columns
        .iter()
        .map(|column| frame.require(column))
        .collect::<Result<Vec<_>, _>>()?;
    let weights = weight.map(|column| frame.require(column)).transpose()?;

    if let (Some(weights), Some(column)) = (weights, weight)
        && let Some(bad) = weights.iter().flatten().find(|w| !(w.is_finite() && **w >= 0.0))
    {
        return Err(Error::InvalidData(format!(
            "weight column {column} holds invalid weight {bad}"
        )));
    }

    let located: Vec<Option<usize>> = frame
        .geometry()
        .par_iter()
        .map(|point| grid.locate(point))
        .collect();

    let mut accumulators: Vec<Option<Accumulator>> = vec![None; grid.len()];
    let mut orphans = Vec::new();
    let mut unweighted_nodes = 0usize;

    for (row, cell) in located.iter().enumerate() {
        let Some(cell) = *cell else {
            orphans.push(frame.ids()[row]);
            continue;
        };
        let acc = accumulators[cell].get_or_insert_with(|| Accumulator::new(values.len()));
        acc.node_count += 1;

        let w = match weights {
            Some(weights) => match weights[row] {
                Some(w) => w,
                None => {
                    unweighted_nodes += 1;
                    continue;
                }
            },
            None => 1.0,
        };
        acc.weight_sum += w;

        for (j, column) in values.iter().enumerate() {
            if let Some(value) = column[row].filter(|v| !v.is_nan()) {
                acc.sums[j] += value * w;
                acc.weights[j] += w;
            }
        }
    }

    if !orphans.is_empty() {
        warn!(
            "{} nodes fall outside every hex at resolution {}; they are excluded from aggregation",
            orphans.len(),
            grid.resolution()
        );
    }
    if unweighted_nodes > 0 {
        warn!("{unweighted_nodes} nodes have no weight and only count towards node totals");
    }

    let mut table = HexTable::new(grid.resolution());
    let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); values.len()];
    for (cell, acc) in grid.cells().iter().zip(accumulators) {
        let Some(acc) = acc else {
            continue;
        };
        table.push_row(HexRecord {
            hex_id: cell.id.clone(),
            geometry: cell.geometry.clone(),
            node_count: acc.node_count,
            weight_sum: weight.map(|_| acc.weight_sum),
        });
        for (j, column) in columns.iter_mut().enumerate() {
            column.push((acc.weights[j] > 0.0).then(|| acc.sums[j] / acc.weights[j]));
        }
    }
    for (column, aggregated) in value_columns.iter().zip(columns) {
        table.insert_column(column.clone(), aggregated)?;
    }

    info!(
        "Aggregated {} nodes into {} hexes at resolution {}",
        frame.ids().len() - orphans.len(),
        table.rows().len(),
        grid.resolution()
    );

    Ok(HexAggregation {
        table,
        orphans: OrphanReport {
            resolution: grid.resolution(),
            nodes: orphans,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::HexCell;
    use approx::assert_relative_eq;
    use geo::{Point, polygon};

    fn grid() -> HexGrid {
        let cell = |id: &str, x0: f64| HexCell {
            id: id.to_string(),
            geometry: polygon![
                (x: x0, y: 0.0),
                (x: x0 + 10.0, y: 0.0),
                (x: x0 + 10.0, y: 10.0),
                (x: x0, y: 10.0),
            ],
        };
        let res = HexResolution::try_from(9).unwrap();
        HexGrid::from_cells(res, vec![cell("hex1", 0.0), cell("hex2", 10.0), cell("hex3", 20.0)]).unwrap()
    }

    fn frame(rows: &[(StreetNodeId, f64, Option<f64>, Option<f64>)]) -> NodeFrame {
        let mut frame = NodeFrame::from_points(
            rows.iter().map(|(id, x, _, _)| (*id, Point::new(*x, 5.0))).collect(),
        )
        .unwrap();
        frame
            .insert_column(value(), rows.iter().map(|r| r.2).collect())
            .unwrap();
        frame
            .insert_column(pop(), rows.iter().map(|r| r.3).collect())
            .unwrap();
        frame
    }

    fn value() -> Column {
        Column::Distance("farmacia".into())
    }

    fn pop() -> Column {
        Column::Attribute("pobtot".into())
    }

    #[test]
    fn weighted_mean_uses_population() {
        // hex1: A (weight 10, value 4) and B (weight 30, value 8)
        let frame = frame(&[(1, 2.0, Some(4.0), Some(10.0)), (2, 7.0, Some(8.0), Some(30.0))]);
        let agg = group_by_hex(&frame, &grid(), &[value()], Some(&pop())).unwrap();
        assert_relative_eq!(agg.table.value("hex1", &value()).unwrap(), 7.0);
        assert_relative_eq!(agg.table.record("hex1").unwrap().weight_sum.unwrap(), 40.0);
    }

    #[test]
    fn unweighted_mean_and_node_counts() {
        let frame = frame(&[
            (1, 2.0, Some(4.0), None),
            (2, 7.0, Some(8.0), None),
            (3, 12.0, Some(1.0), None),
        ]);
        let agg = group_by_hex(&frame, &grid(), &[value()], None).unwrap();
        assert_relative_eq!(agg.table.value("hex1", &value()).unwrap(), 6.0);
        assert_eq!(agg.table.record("hex1").unwrap().node_count, 2);
        assert_eq!(agg.table.record("hex1").unwrap().weight_sum, None);
        assert_relative_eq!(agg.table.value("hex2", &value()).unwrap(), 1.0);
    }

    #[test]
    fn empty_hexes_are_absent() {
        let frame = frame(&[(1, 2.0, Some(4.0), None)]);
        let agg = group_by_hex(&frame, &grid(), &[value()], None).unwrap();
        assert!(agg.table.record("hex2").is_none());
        assert!(agg.table.record("hex3").is_none());
        assert_eq!(agg.table.rows().len(), 1);
    }

    #[test]
    fn orphans_do_not_lower_means() {
        let frame = frame(&[(1, 2.0, Some(4.0), None), (2, 500.0, Some(0.0), None)]);
        let agg = group_by_hex(&frame, &grid(), &[value()], None).unwrap();
        assert_eq!(agg.orphans.nodes, vec![2]);
        assert_relative_eq!(agg.table.value("hex1", &value()).unwrap(), 4.0);
    }

    #[test]
    fn missing_values_are_skipped_not_zeroed() {
        let frame = frame(&[(1, 2.0, Some(4.0), None), (2, 3.0, None, None), (3, 15.0, None, None)]);
        let agg = group_by_hex(&frame, &grid(), &[value()], None).unwrap();
        assert_relative_eq!(agg.table.value("hex1", &value()).unwrap(), 4.0);
        assert_eq!(agg.table.record("hex1").unwrap().node_count, 2);
        // hex2 has a node but no value for the column
        assert!(agg.table.record("hex2").is_some());
        assert_eq!(agg.table.value("hex2", &value()), None);
    }

    #[test]
    fn zero_weights_give_no_value() {
        let frame = frame(&[(1, 2.0, Some(4.0), Some(0.0))]);
        let agg = group_by_hex(&frame, &grid(), &[value()], Some(&pop())).unwrap();
        assert_eq!(agg.table.value("hex1", &value()), None);
    }

    #[test]
    fn negative_weights_are_rejected() {
        let frame = frame(&[(1, 2.0, Some(4.0), Some(-1.0))]);
        assert!(group_by_hex(&frame, &grid(), &[value()], Some(&pop())).is_err());
    }

    #[test]
    fn missing_column_is_an_error() {
        let frame = frame(&[(1, 2.0, Some(4.0), None)]);
        let other = Column::Distance("hospital".into());
        assert!(matches!(
            group_by_hex(&frame, &grid(), &[other], None),
            Err(Error::MissingColumn(_))
        ));
    }
}
