use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use serde::Deserialize;

use crate::model::{Poi, StreetGraph};

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SnapConfig {
    /// Points of interest farther than this (meters) from every node are
    /// left out instead of being attached to a distant street
    pub max_snap_distance: Option<f64>,
}

/// Network nodes of the points of interest that could be snapped. Several
/// points of interest may share a node.
#[derive(Debug, Clone, Default)]
pub struct SnappedPois {
    pub nodes: Vec<NodeIndex>,
    /// Ids of points of interest too far from the network
    pub dropped: Vec<String>,
}

/// Snap points of interest to their nearest street network nodes
pub fn snap_pois(graph: &StreetGraph, pois: &[&Poi], config: &SnapConfig) -> SnappedPois {
    let snapped: Vec<Option<NodeIndex>> = pois
        .par_iter()
        .map(|poi| match graph.nearest_node(&poi.geometry) {
            Some((node, distance)) => {
                if config.max_snap_distance.is_none_or(|max| distance <= max) {
                    Some(node)
                } else {
                    log::trace!(
                        "Point of interest {} is {distance:.1}m from the nearest street - excluding it",
                        poi.id
                    );
                    None
                }
            }
            None => {
                log::trace!("Point of interest {} has no nearby streets - excluding it", poi.id);
                None
            }
        })
        .collect();

    let mut result = SnappedPois::default();
    for (poi, node) in pois.iter().zip(snapped) {
        match node {
            Some(node) => result.nodes.push(node),
            None => result.dropped.push(poi.id.clone()),
        }
    }
    result
}
