//! Routable street graph with a spatial index over its nodes

use std::ops::Deref;

use geo::{ConvexHull, MultiPoint, Point, Polygon};
use hashbrown::HashMap;
use petgraph::graph::{DiGraph, NodeIndex};
use rstar::{RTree, primitives::GeomWithData};

use super::components::{StreetEdge, StreetNode};
use crate::model::crs::Projection;
use crate::{Error, MAX_SNAP_CANDIDATES, SNAP_TIE_TOLERANCE, StreetNodeId};

/// Projected node position tagged with its graph index
pub type IndexedPoint = GeomWithData<[f64; 2], NodeIndex>;

/// Street network ready for shortest-path queries.
///
/// Undirected networks are stored with one edge per direction, so searches
/// only ever follow outgoing (forward) or incoming (reverse) edges.
#[derive(Debug, Clone)]
pub struct StreetGraph {
    pub(crate) graph: DiGraph<StreetNode, StreetEdge>,
    pub(crate) rtree: RTree<IndexedPoint>,
    node_index: HashMap<StreetNodeId, NodeIndex>,
    projection: Projection,
    directed: bool,
}

impl Deref for StreetGraph {
    type Target = DiGraph<StreetNode, StreetEdge>;

    fn deref(&self) -> &Self::Target {
        &self.graph
    }
}

impl StreetGraph {
    pub(crate) fn new(
        graph: DiGraph<StreetNode, StreetEdge>,
        projection: Projection,
        directed: bool,
    ) -> Self {
        let node_index = graph
            .node_indices()
            .map(|idx| (graph[idx].id, idx))
            .collect();
        let points = graph
            .node_indices()
            .map(|idx| IndexedPoint::new(projection.project(graph[idx].geometry.0), idx))
            .collect();

        Self {
            graph,
            rtree: RTree::bulk_load(points),
            node_index,
            projection,
            directed,
        }
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn is_directed(&self) -> bool {
        self.directed
    }

    pub fn rtree_ref(&self) -> &RTree<IndexedPoint> {
        &self.rtree
    }

    /// Graph index of an OSM node id
    pub fn index_of(&self, id: StreetNodeId) -> Result<NodeIndex, Error> {
        self.node_index
            .get(&id)
            .copied()
            .ok_or(Error::UnknownNode(id))
    }

    pub fn node_id(&self, idx: NodeIndex) -> StreetNodeId {
        self.graph[idx].id
    }

    /// All node ids in ascending order
    pub fn node_ids(&self) -> Vec<StreetNodeId> {
        let mut ids: Vec<_> = self.node_index.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Nearest node to `point` and its planar distance in meters.
    ///
    /// Nodes at the same distance (within [`SNAP_TIE_TOLERANCE`]) resolve to
    /// the lowest OSM id.
    pub fn nearest_node(&self, point: &Point<f64>) -> Option<(NodeIndex, f64)> {
        let query = self.projection.project(point.0);
        let mut candidates = self.rtree.nearest_neighbor_iter_with_distance_2(&query);
        let (first, first_d2) = candidates.next()?;
        let best_distance = first_d2.sqrt();

        let mut best = first.data;
        for (candidate, d2) in candidates.take(MAX_SNAP_CANDIDATES) {
            if d2.sqrt() - best_distance > SNAP_TIE_TOLERANCE {
                break;
            }
            if self.graph[candidate.data].id < self.graph[best].id {
                best = candidate.data;
            }
        }

        Some((best, best_distance))
    }

    /// Convex hull of all node positions, in the input CRS
    pub fn coverage(&self) -> Polygon<f64> {
        let nodes: MultiPoint = self
            .graph
            .node_weights()
            .map(|node| node.geometry)
            .collect();
        nodes.convex_hull()
    }

    pub fn synthesized_count(&self) -> usize {
        self.graph
            .node_weights()
            .filter(|node| node.synthesized)
            .count()
    }
}
