//! Staleness tracking
//!
//! Forward propagation of the `is_out_of_date` flag. The traversal stops at
//! nodes that are already stale: a stale node's consumers are stale too, so
//! there is nothing further to flip. Every visited node has its epoch
//! bumped, which is what lets an in-flight execution notice that its inputs
//! moved under it.

use std::collections::{BTreeSet, VecDeque};

use crate::graph::GraphState;
use crate::types::{ExecutionStatus, NodeId, NodeState, PortValue};

/// Mark `node_id` and every transitively downstream node stale
///
/// Returns the nodes whose flag actually flipped, in visit order. Unknown
/// ids are ignored.
pub fn mark_stale_from<S: NodeState>(graph: &mut GraphState<S>, node_id: &str) -> Vec<NodeId> {
    let mut flipped = Vec::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    queue.push_back(node_id.to_string());

    while let Some(current) = queue.pop_front() {
        let Some(node) = graph.nodes.get_mut(&current) else {
            continue;
        };

        node.epoch += 1;
        if node.is_out_of_date {
            continue;
        }
        node.is_out_of_date = true;
        flipped.push(current.clone());

        queue.extend(graph.connections.downstream_nodes(&current));
    }

    if !flipped.is_empty() {
        log::debug!("Marked {} node(s) stale from '{}'", flipped.len(), node_id);
    }
    flipped
}

/// Propagate a blocked node's stop signal to everything downstream
///
/// Every cached output of the affected nodes is replaced by the stop
/// sentinel, and nodes that are not currently generating are moved to
/// `Blocked`. The compute functions are never invoked. Returns the
/// downstream nodes that were touched (not including `node_id`).
pub fn block_downstream<S: NodeState>(graph: &mut GraphState<S>, node_id: &str) -> Vec<NodeId> {
    let mut visited: BTreeSet<NodeId> = BTreeSet::new();
    let mut touched = Vec::new();
    let mut queue: VecDeque<NodeId> = graph.connections.downstream_nodes(node_id).into_iter().collect();

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current.clone()) {
            continue;
        }
        let Some(node) = graph.nodes.get_mut(&current) else {
            continue;
        };

        let ports: Vec<String> = node.outputs.iter().map(|(port, _)| port.clone()).collect();
        for port in ports {
            node.outputs.insert(port, PortValue::Stop);
        }
        node.is_out_of_date = true;
        node.epoch += 1;
        if !node.is_generating {
            node.status = ExecutionStatus::Blocked;
        }
        touched.push(current.clone());

        queue.extend(graph.connections.downstream_nodes(&current));
    }
    touched
}

/// Re-establish "stale implies downstream stale" across the whole graph
///
/// Used after restoring a persisted graph whose flags may have been edited
/// by hand.
pub fn normalize<S: NodeState>(graph: &mut GraphState<S>) -> Vec<NodeId> {
    let stale: Vec<NodeId> = graph
        .nodes
        .values()
        .filter(|n| n.is_out_of_date)
        .map(|n| n.id.clone())
        .collect();

    let mut flipped = Vec::new();
    for node_id in stale {
        for consumer in graph.connections.downstream_nodes(&node_id) {
            flipped.extend(mark_stale_from(graph, &consumer));
        }
    }
    flipped
}
