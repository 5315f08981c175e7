use std::collections::BinaryHeap;

use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use petgraph::{Direction, graph::NodeIndex, visit::EdgeRef};

use super::state::State;
use crate::{Cost, model::StreetGraph, model::Weight};

/// Neighbour reached through `edge` when searching in `direction`
fn next_node<E: EdgeRef<NodeId = NodeIndex>>(edge: &E, direction: Direction) -> NodeIndex {
    match direction {
        Direction::Outgoing => edge.target(),
        Direction::Incoming => edge.source(),
    }
}

/// Dijkstra's algorithm from a single node, bounded by `max_cost`.
///
/// With [`Direction::Outgoing`] the returned costs are from `start` to each
/// node; with [`Direction::Incoming`] they are from each node to `start`.
pub fn dijkstra_path_weights(
    graph: &StreetGraph,
    start: NodeIndex,
    direction: Direction,
    weight: Weight,
    max_cost: Option<Cost>,
) -> HashMap<NodeIndex, Cost> {
    let mut distances: HashMap<NodeIndex, Cost> = HashMap::new();
    let mut heap = BinaryHeap::new();

    // Start node has distance 0
    heap.push(State {
        cost: 0.0,
        node: start,
    });
    distances.insert(start, 0.0);

    while let Some(State { cost, node }) = heap.pop() {
        // Skip if we've found a better path
        if let Some(&best) = distances.get(&node)
            && cost > best
        {
            continue;
        }

        // Examine neighbors
        for edge in graph.edges_directed(node, direction) {
            let next = next_node(&edge, direction);
            let next_cost = cost + edge.weight().cost(weight);

            if max_cost.is_some_and(|max| next_cost > max) {
                continue;
            }

            // Add or update distance if better using Entry API
            match distances.entry(next) {
                hashbrown::hash_map::Entry::Vacant(entry) => {
                    entry.insert(next_cost);
                    heap.push(State {
                        cost: next_cost,
                        node: next,
                    });
                }
                hashbrown::hash_map::Entry::Occupied(mut entry) => {
                    if next_cost < *entry.get() {
                        *entry.get_mut() = next_cost;
                        heap.push(State {
                            cost: next_cost,
                            node: next,
                        });
                    }
                }
            }
        }
    }

    distances
}

/// Multi-source Dijkstra over the whole graph.
///
/// Returns, for every node index, the cost to (with
/// [`Direction::Incoming`]) or from (with [`Direction::Outgoing`]) the
/// closest source, or `None` when no source is reachable within `max_cost`.
pub fn multi_source_costs(
    graph: &StreetGraph,
    sources: &[NodeIndex],
    direction: Direction,
    weight: Weight,
    max_cost: Option<Cost>,
) -> Vec<Option<Cost>> {
    let node_count = graph.node_count();
    let mut costs: Vec<Option<Cost>> = vec![None; node_count];
    let mut settled = FixedBitSet::with_capacity(node_count);
    let mut heap = BinaryHeap::with_capacity(sources.len());

    for &source in sources {
        if costs[source.index()].is_none() {
            costs[source.index()] = Some(0.0);
            heap.push(State {
                cost: 0.0,
                node: source,
            });
        }
    }

    while let Some(State { cost, node }) = heap.pop() {
        if settled.put(node.index()) {
            continue;
        }

        for edge in graph.edges_directed(node, direction) {
            let next = next_node(&edge, direction);
            if settled.contains(next.index()) {
                continue;
            }
            let next_cost = cost + edge.weight().cost(weight);
            if max_cost.is_some_and(|max| next_cost > max) {
                continue;
            }
            if costs[next.index()].is_none_or(|best| next_cost < best) {
                costs[next.index()] = Some(next_cost);
                heap.push(State {
                    cost: next_cost,
                    node: next,
                });
            }
        }
    }

    costs
}
