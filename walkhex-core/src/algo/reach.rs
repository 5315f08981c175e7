use hashbrown::HashMap;
use petgraph::{Direction, graph::NodeIndex};
use rayon::prelude::*;

use crate::{
    Cost,
    model::{StreetGraph, Weight},
    routing::dijkstra_path_weights,
};

/// For every origin, the number of destinations reachable within `budget`
/// (inclusive). A destination node listed twice counts twice.
///
/// Each distinct destination runs one bounded search against edge
/// direction and credits every node that reaches it, so the work scales
/// with the destinations of a batch rather than with the origins. Counts
/// from disjoint destination batches add up.
pub fn count_reachable(
    graph: &StreetGraph,
    origins: &[NodeIndex],
    destinations: &[NodeIndex],
    weight: Weight,
    budget: Cost,
) -> Vec<u32> {
    let mut multiplicity: HashMap<NodeIndex, u32> = HashMap::with_capacity(destinations.len());
    for &node in destinations {
        *multiplicity.entry(node).or_default() += 1;
    }
    if multiplicity.is_empty() {
        return vec![0; origins.len()];
    }
    let targets: Vec<(NodeIndex, u32)> = multiplicity.into_iter().collect();

    let node_count = graph.node_count();
    let per_node = targets
        .par_iter()
        .fold(
            || vec![0u32; node_count],
            |mut acc, &(target, times)| {
                for node in
                    dijkstra_path_weights(graph, target, Direction::Incoming, weight, Some(budget))
                        .into_keys()
                {
                    acc[node.index()] += times;
                }
                acc
            },
        )
        .reduce(
            || vec![0u32; node_count],
            |mut a, b| {
                a.iter_mut().zip(b).for_each(|(acc, n)| *acc += n);
                a
            },
        );

    origins.iter().map(|node| per_node[node.index()]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loading::{EdgeRow, GraphBuilderConfig, NodeRow, build_street_graph};
    use crate::model::Crs;

    // 1 --100--> 2 --100--> 3, one-way
    fn one_way() -> StreetGraph {
        let nodes = [(1, 0.0), (2, 100.0), (3, 200.0)]
            .into_iter()
            .map(|(osmid, x)| NodeRow {
                osmid,
                x,
                y: 0.0,
                street_count: None,
                elevation: None,
            })
            .collect::<Vec<_>>();
        let edges = [(1, 2), (2, 3)]
            .into_iter()
            .map(|(u, v)| EdgeRow {
                u,
                v,
                key: 0,
                length: Some(100.0),
                highway: vec![],
                grade: None,
                walkspeed: None,
                time_min: None,
                geometry: None,
            })
            .collect::<Vec<_>>();
        let config = GraphBuilderConfig {
            crs: Crs::Projected,
            directed: true,
            ..GraphBuilderConfig::default()
        };
        build_street_graph(&nodes, &edges, &config).unwrap()
    }

    #[test]
    fn counts_follow_edge_direction() {
        let graph = one_way();
        let idx = |id| graph.index_of(id).unwrap();
        let origins = [idx(1), idx(2), idx(3)];

        // destination at 3: reachable from 2 (100) and 3 itself, not from 1 (200)
        let counts = count_reachable(&graph, &origins, &[idx(3)], Weight::Length, 150.0);
        assert_eq!(counts, vec![0, 1, 1]);

        // destination at 1 is upstream of everything else
        let counts = count_reachable(&graph, &origins, &[idx(1)], Weight::Length, 500.0);
        assert_eq!(counts, vec![1, 0, 0]);
    }

    #[test]
    fn repeated_destinations_count_each_time() {
        let graph = one_way();
        let idx = |id| graph.index_of(id).unwrap();
        let counts = count_reachable(&graph, &[idx(1), idx(2)], &[idx(2), idx(2)], Weight::Length, 100.0);
        assert_eq!(counts, vec![2, 2]);
    }
}
