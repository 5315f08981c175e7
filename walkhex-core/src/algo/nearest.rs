//! Nearest-POI distance engine

use log::{debug, warn};
use petgraph::{Direction, graph::NodeIndex};
use serde::Deserialize;

use super::reach::count_reachable;
use super::snapping::{SnapConfig, snap_pois};
use crate::{
    Cost, Error, StreetNodeId,
    model::{CostTable, Poi, StreetGraph, Weight},
    routing::multi_source_costs,
};

/// Parameters of a nearest-POI computation
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NearestQuery {
    pub weight: Weight,
    /// Search radius; origins farther than this from every destination are
    /// reported as unreachable
    pub max_cost: Option<Cost>,
    /// When set, also count destinations reachable within this budget
    pub reach_budget: Option<Cost>,
    pub snap: SnapConfig,
}

/// Cost from every origin to the nearest of `pois`.
///
/// Destinations are snapped to their nearest node and a single
/// multi-source search runs from all of them against edge direction, so
/// every origin gets `min(cost(origin -> poi))`. An origin that cannot
/// reach any destination gets `None`; `Some(0.0)` only happens when a
/// destination is snapped to the origin itself.
///
/// # Errors
///
/// [`Error::EmptyDestinationSet`] when `pois` is empty, and
/// [`Error::UnknownNode`] when an origin is not part of the graph.
pub fn nearest_distance(
    graph: &StreetGraph,
    origins: &[StreetNodeId],
    pois: &[&Poi],
    category: &str,
    query: &NearestQuery,
) -> Result<CostTable, Error> {
    if pois.is_empty() {
        return Err(Error::EmptyDestinationSet(category.to_string()));
    }

    let origin_nodes = origins
        .iter()
        .map(|&id| graph.index_of(id))
        .collect::<Result<Vec<NodeIndex>, _>>()?;

    let snapped = snap_pois(graph, pois, &query.snap);
    if !snapped.dropped.is_empty() {
        warn!(
            "{} of {} points of interest in '{category}' could not be snapped to the network",
            snapped.dropped.len(),
            pois.len()
        );
    }

    let node_costs = multi_source_costs(
        graph,
        &snapped.nodes,
        Direction::Incoming,
        query.weight,
        query.max_cost,
    );
    let costs: Vec<Option<Cost>> = origin_nodes
        .iter()
        .map(|node| node_costs[node.index()])
        .collect();

    let reachable = query.reach_budget.map(|budget| {
        count_reachable(graph, &origin_nodes, &snapped.nodes, query.weight, budget)
    });

    let table = CostTable::new(category, query.weight, origins.to_vec(), costs, reachable);
    debug!(
        "'{category}': {} destinations, {} of {} origins unreachable",
        snapped.nodes.len(),
        table.unreachable_count(),
        table.len()
    );
    Ok(table)
}
