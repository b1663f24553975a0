//! Connection graph
//!
//! Directed edges between `(node, port)` pairs, stored in two flat maps
//! keyed by port: sink → producer and source → consumers. Both maps are
//! ordered by `(node_id, port_id)`, so all ports of one node form a
//! contiguous range.
//!
//! Invariants maintained here:
//! - a sink has at most one producer;
//! - the node-level graph is acyclic.
//!
//! Port existence and data-kind checks need node state and live in the
//! engine; this module only sees identities.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::{EngineError, Result};
use crate::types::{Connection, NodeId, PortRef};

#[derive(Debug, Clone, Default)]
pub struct ConnectionGraph {
    /// sink -> source
    producers: BTreeMap<PortRef, PortRef>,
    /// source -> sinks
    consumers: BTreeMap<PortRef, BTreeSet<PortRef>>,
}

/// Entries of `map` whose key belongs to `node_id`
fn node_range<'a, V>(
    map: &'a BTreeMap<PortRef, V>,
    node_id: &'a str,
) -> impl Iterator<Item = (&'a PortRef, &'a V)> + 'a {
    map.range(PortRef::new(node_id, "")..)
        .take_while(move |(port, _)| port.node_id == node_id)
}

impl ConnectionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge after checking single-producer and acyclicity
    ///
    /// On error the graph is unchanged.
    pub fn insert(&mut self, connection: Connection) -> Result<()> {
        if self.producers.contains_key(&connection.sink) {
            return Err(EngineError::SinkAlreadyBound {
                node_id: connection.sink.node_id.clone(),
                port_id: connection.sink.port_id.clone(),
            });
        }

        if self.would_create_cycle(&connection.source.node_id, &connection.sink.node_id) {
            return Err(EngineError::CycleDetected {
                source_node: connection.source.node_id.clone(),
                sink_node: connection.sink.node_id.clone(),
            });
        }

        self.consumers
            .entry(connection.source.clone())
            .or_default()
            .insert(connection.sink.clone());
        self.producers.insert(connection.sink, connection.source);
        Ok(())
    }

    /// Remove the edge `source -> sink`
    pub fn remove(&mut self, source: &PortRef, sink: &PortRef) -> Result<Connection> {
        match self.producers.get(sink) {
            Some(producer) if producer == source => {}
            _ => {
                return Err(EngineError::ConnectionNotFound(format!(
                    "{} -> {}",
                    source, sink
                )))
            }
        }

        self.producers.remove(sink);
        if let Some(sinks) = self.consumers.get_mut(source) {
            sinks.remove(sink);
            if sinks.is_empty() {
                self.consumers.remove(source);
            }
        }
        Ok(Connection::new(source.clone(), sink.clone()))
    }

    /// Remove every edge incident to `node_id`, returning what was removed
    pub fn remove_node(&mut self, node_id: &str) -> Vec<Connection> {
        let mut removed = self.incoming(node_id);
        removed.extend(self.outgoing(node_id));

        for connection in &removed {
            // Both lookups are guaranteed hits; errors cannot occur here.
            let _ = self.remove(&connection.source, &connection.sink);
        }
        removed
    }

    /// The producer feeding a sink port, if any
    pub fn producer_of(&self, sink: &PortRef) -> Option<&PortRef> {
        self.producers.get(sink)
    }

    /// All sinks fed by a source port
    pub fn consumers_of(&self, source: &PortRef) -> Vec<PortRef> {
        self.consumers
            .get(source)
            .map(|sinks| sinks.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Edges ending at `node_id`
    pub fn incoming(&self, node_id: &str) -> Vec<Connection> {
        node_range(&self.producers, node_id)
            .map(|(sink, source)| Connection::new(source.clone(), sink.clone()))
            .collect()
    }

    /// Edges starting at `node_id`
    pub fn outgoing(&self, node_id: &str) -> Vec<Connection> {
        node_range(&self.consumers, node_id)
            .flat_map(|(source, sinks)| {
                sinks
                    .iter()
                    .map(move |sink| Connection::new(source.clone(), sink.clone()))
            })
            .collect()
    }

    /// Distinct nodes directly consuming any output of `node_id`
    pub fn downstream_nodes(&self, node_id: &str) -> BTreeSet<NodeId> {
        node_range(&self.consumers, node_id)
            .flat_map(|(_, sinks)| sinks.iter().map(|s| s.node_id.clone()))
            .collect()
    }

    /// Distinct nodes directly feeding any input of `node_id`
    pub fn upstream_nodes(&self, node_id: &str) -> BTreeSet<NodeId> {
        node_range(&self.producers, node_id)
            .map(|(_, source)| source.node_id.clone())
            .collect()
    }

    /// Whether `to` is reachable from `from` by following edges forward
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        let mut visited: BTreeSet<NodeId> = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = VecDeque::new();
        queue.push_back(from.to_string());

        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            queue.extend(self.downstream_nodes(&current));
        }
        false
    }

    /// Whether adding `source_node -> sink_node` would close a cycle
    pub fn would_create_cycle(&self, source_node: &str, sink_node: &str) -> bool {
        source_node == sink_node || self.reaches(sink_node, source_node)
    }

    /// Every edge, ordered by sink
    pub fn connections(&self) -> Vec<Connection> {
        self.producers
            .iter()
            .map(|(sink, source)| Connection::new(source.clone(), sink.clone()))
            .collect()
    }

    pub fn contains(&self, connection: &Connection) -> bool {
        self.producers.get(&connection.sink) == Some(&connection.source)
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}
