use geo::{Coord, Intersects, Point};
use hashbrown::HashMap;
use log::{info, warn};
use petgraph::graph::{DiGraph, NodeIndex};

use super::config::GraphBuilderConfig;
use super::raw_types::{EdgeRow, NodeRow};
use crate::{
    Error, StreetNodeId,
    model::{Poi, Projection, StreetEdge, StreetGraph, StreetNode},
};

/// Builds a routable street graph from node and edge tables.
///
/// Edge endpoints missing from the node table are synthesized from the
/// first/last vertex of the edge geometry. The build fails with
/// [`Error::MalformedGraph`] when such a node cannot be recovered, or when
/// the share of synthesized nodes exceeds
/// [`GraphBuilderConfig::max_missing_node_ratio`].
///
/// # Errors
///
/// Returns an error on duplicate or non-finite nodes, unresolvable edge
/// endpoints and negative or non-finite edge costs.
pub fn build_street_graph(
    nodes: &[NodeRow],
    edges: &[EdgeRow],
    config: &GraphBuilderConfig,
) -> Result<StreetGraph, Error> {
    config.validate()?;

    let mut street_nodes: HashMap<StreetNodeId, StreetNode> = HashMap::with_capacity(nodes.len());
    for row in nodes {
        if !(row.x.is_finite() && row.y.is_finite()) {
            return Err(Error::InvalidData(format!(
                "node {} has non-finite coordinates",
                row.osmid
            )));
        }
        let node = StreetNode {
            id: row.osmid,
            geometry: Point::new(row.x, row.y),
            street_count: row.street_count,
            elevation: row.elevation.filter(|e| e.is_finite()),
            synthesized: false,
        };
        if street_nodes.insert(row.osmid, node).is_some() {
            return Err(Error::InvalidData(format!("duplicate node id {}", row.osmid)));
        }
    }

    let synthesized = synthesize_missing_nodes(&street_nodes, edges)?;
    check_missing_ratio(nodes.len(), synthesized.len(), config)?;
    if !synthesized.is_empty() {
        warn!(
            "Synthesized {} nodes missing from the node table from edge geometry",
            synthesized.len()
        );
    }
    street_nodes.extend(synthesized.into_iter().map(|(id, coord)| {
        (
            id,
            StreetNode {
                id,
                geometry: Point::from(coord),
                street_count: None,
                elevation: None,
                synthesized: true,
            },
        )
    }));

    let projection = Projection::for_coords(
        config.crs,
        street_nodes.values().map(|node| node.geometry.0),
    );

    // Insert in id order so node indices do not depend on hash order
    let mut ordered: Vec<StreetNode> = street_nodes.into_values().collect();
    ordered.sort_unstable_by_key(|node| node.id);

    let mut graph = DiGraph::with_capacity(ordered.len(), edges.len() * 2);
    let mut id_to_index: HashMap<StreetNodeId, NodeIndex> = HashMap::with_capacity(ordered.len());
    for node in ordered {
        let id = node.id;
        id_to_index.insert(id, graph.add_node(node));
    }

    for row in edges {
        let (u, v) = (id_to_index[&row.u], id_to_index[&row.v]);
        let forward = make_edge(row, graph[u].geometry.0, graph[v].geometry.0, row.grade, &projection, config)?;

        if !config.directed && u != v {
            let mut backward = make_edge(
                row,
                graph[u].geometry.0,
                graph[v].geometry.0,
                row.grade.map(|g| -g),
                &projection,
                config,
            )?;
            if let Some(geometry) = backward.geometry.as_mut() {
                geometry.0.reverse();
            }
            graph.add_edge(v, u, backward);
        }
        graph.add_edge(u, v, forward);
    }

    info!(
        "Built street graph with {} nodes and {} directed edges",
        graph.node_count(),
        graph.edge_count()
    );

    Ok(StreetGraph::new(graph, projection, config.directed))
}

/// Collects coordinates for edge endpoints absent from the node table
fn synthesize_missing_nodes(
    nodes: &HashMap<StreetNodeId, StreetNode>,
    edges: &[EdgeRow],
) -> Result<HashMap<StreetNodeId, Coord<f64>>, Error> {
    let mut synthesized = HashMap::new();

    for row in edges {
        for (id, terminal) in [(row.u, Terminal::Start), (row.v, Terminal::End)] {
            if nodes.contains_key(&id) || synthesized.contains_key(&id) {
                continue;
            }
            let coord = row
                .geometry
                .as_ref()
                .and_then(|line| match terminal {
                    Terminal::Start => line.0.first(),
                    Terminal::End => line.0.last(),
                })
                .filter(|c| c.x.is_finite() && c.y.is_finite())
                .copied()
                .ok_or_else(|| {
                    Error::MalformedGraph(format!(
                        "edge {}->{} references node {id}, which is missing and \
                         cannot be recovered from the edge geometry",
                        row.u, row.v
                    ))
                })?;
            synthesized.insert(id, coord);
        }
    }

    Ok(synthesized)
}

#[derive(Clone, Copy)]
enum Terminal {
    Start,
    End,
}

#[allow(clippy::cast_precision_loss)]
fn check_missing_ratio(
    known: usize,
    missing: usize,
    config: &GraphBuilderConfig,
) -> Result<(), Error> {
    if missing == 0 {
        return Ok(());
    }
    let ratio = missing as f64 / (known + missing) as f64;
    if ratio > config.max_missing_node_ratio {
        return Err(Error::MalformedGraph(format!(
            "{missing} of {} nodes ({:.1}%) are missing from the node table, \
             above the allowed {:.1}%",
            known + missing,
            ratio * 100.0,
            config.max_missing_node_ratio * 100.0
        )));
    }
    Ok(())
}

fn make_edge(
    row: &EdgeRow,
    from: Coord<f64>,
    to: Coord<f64>,
    grade: Option<f64>,
    projection: &Projection,
    config: &GraphBuilderConfig,
) -> Result<StreetEdge, Error> {
    let length = match row.length.filter(|l| !l.is_nan()) {
        Some(length) => length,
        None => match row.geometry.as_ref().filter(|g| g.0.len() > 1) {
            Some(line) => projection.line_length(&line.0),
            None => projection.distance(from, to),
        },
    };
    if !(length.is_finite() && length >= 0.0) {
        return Err(Error::InvalidData(format!(
            "edge {}->{} has invalid length {length}",
            row.u, row.v
        )));
    }

    let time_min = match row.time_min.filter(|t| !t.is_nan()) {
        Some(time) => time,
        None => length / config.speed_m_per_min(row.walkspeed, grade),
    };
    if !(time_min.is_finite() && time_min >= 0.0) {
        return Err(Error::InvalidData(format!(
            "edge {}->{} has invalid time_min {time_min}",
            row.u, row.v
        )));
    }

    Ok(StreetEdge {
        key: row.key,
        length,
        time_min,
        highway: row.highway.clone(),
        grade,
        geometry: row.geometry.clone(),
    })
}

/// Warns about points of interest lying outside the street network hull.
/// Returns how many fall outside.
#[allow(clippy::cast_precision_loss)]
pub fn validate_poi_coverage(graph: &StreetGraph, pois: &[Poi]) -> usize {
    if pois.is_empty() {
        return 0;
    }
    let hull = graph.coverage();
    let outside = pois
        .iter()
        .filter(|poi| !poi.geometry.intersects(&hull))
        .count();

    if outside > 0 {
        let percentage = (outside as f64 / pois.len() as f64) * 100.0;
        warn!(
            "{outside} of {} points of interest ({percentage:.1}%) are outside the street \
             network coverage area. Their network distances rely on snapping to the \
             network edge.",
            pois.len()
        );
    }
    outside
}
