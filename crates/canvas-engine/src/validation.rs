//! Validation of persisted graphs
//!
//! Live mutations are checked one at a time by the engine. A snapshot
//! coming back from storage gets the same checks in bulk, and every
//! violation is reported, not just the first.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::persistence::GraphSnapshot;
use crate::registry::NodeRegistry;
use crate::types::{Connection, DataKind, NodeState, PortDirection};

/// Validation error with location context
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Cycle detected in the graph
    CycleDetected,
    /// A node has an unknown type (not in registry)
    UnknownNodeType { node_id: String, node_type: String },
    /// Two nodes share an id
    DuplicateNode { node_id: String },
    /// A connection references a non-existent node
    UnknownNode { connection: String, node_id: String },
    /// A connection references a port the node does not have
    UnknownPort {
        connection: String,
        node_id: String,
        port_id: String,
    },
    /// A connection starts at a sink or ends at a source
    WrongDirection { connection: String, port: String },
    /// A connection joins incompatible data kinds
    IncompatibleDataKinds {
        connection: String,
        source_kind: DataKind,
        sink_kind: DataKind,
    },
    /// A sink port has more than one producer
    MultipleProducers { node_id: String, port_id: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected => write!(f, "Cycle detected in graph"),
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "Unknown node type '{}' for node '{}'", node_type, node_id)
            }
            Self::DuplicateNode { node_id } => write!(f, "Duplicate node id '{}'", node_id),
            Self::UnknownNode {
                connection,
                node_id,
            } => {
                write!(
                    f,
                    "Connection '{}' references unknown node '{}'",
                    connection, node_id
                )
            }
            Self::UnknownPort {
                connection,
                node_id,
                port_id,
            } => {
                write!(
                    f,
                    "Connection '{}' references unknown port '{}' on node '{}'",
                    connection, port_id, node_id
                )
            }
            Self::WrongDirection { connection, port } => {
                write!(
                    f,
                    "Connection '{}' uses port '{}' in the wrong direction",
                    connection, port
                )
            }
            Self::IncompatibleDataKinds {
                connection,
                source_kind,
                sink_kind,
            } => {
                write!(
                    f,
                    "Connection '{}' joins incompatible kinds: {:?} -> {:?}",
                    connection, source_kind, sink_kind
                )
            }
            Self::MultipleProducers { node_id, port_id } => {
                write!(
                    f,
                    "Sink '{}.{}' has more than one incoming connection",
                    node_id, port_id
                )
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a persisted graph against a registry
pub fn validate_snapshot<S: NodeState>(
    snapshot: &GraphSnapshot<S>,
    registry: &NodeRegistry<S>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen: HashSet<&str> = HashSet::new();
    for node in &snapshot.nodes {
        if !seen.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNode {
                node_id: node.id.clone(),
            });
        }
        if !registry.has_node_type(node.node_type()) {
            errors.push(ValidationError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type().to_string(),
            });
        }
    }

    validate_connections(snapshot, registry, &mut errors);
    validate_single_producer(&snapshot.connections, &mut errors);
    detect_cycles(snapshot, &mut errors);

    errors
}

/// Check endpoints, directions and data kinds of every connection
fn validate_connections<S: NodeState>(
    snapshot: &GraphSnapshot<S>,
    registry: &NodeRegistry<S>,
    errors: &mut Vec<ValidationError>,
) {
    let nodes: HashMap<&str, &S> = snapshot
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), &n.state))
        .collect();

    for connection in &snapshot.connections {
        let label = connection.to_string();
        let mut kinds = Vec::with_capacity(2);

        for (end, expected) in [
            (&connection.source, PortDirection::Source),
            (&connection.sink, PortDirection::Sink),
        ] {
            let Some(state) = nodes.get(end.node_id.as_str()) else {
                errors.push(ValidationError::UnknownNode {
                    connection: label.clone(),
                    node_id: end.node_id.clone(),
                });
                continue;
            };
            // Unknown types were already reported above.
            let Ok(definition) = registry.get(state.node_type()) else {
                continue;
            };
            match definition.port(state, &end.port_id) {
                None => errors.push(ValidationError::UnknownPort {
                    connection: label.clone(),
                    node_id: end.node_id.clone(),
                    port_id: end.port_id.clone(),
                }),
                Some(port) if port.direction != expected => {
                    errors.push(ValidationError::WrongDirection {
                        connection: label.clone(),
                        port: end.to_string(),
                    })
                }
                Some(port) => kinds.push(port.data_kind),
            }
        }

        if let &[source_kind, sink_kind] = kinds.as_slice() {
            if !source_kind.is_compatible_with(&sink_kind) {
                errors.push(ValidationError::IncompatibleDataKinds {
                    connection: label,
                    source_kind,
                    sink_kind,
                });
            }
        }
    }
}

fn validate_single_producer(connections: &[Connection], errors: &mut Vec<ValidationError>) {
    let mut bound = HashSet::new();
    for connection in connections {
        if !bound.insert(&connection.sink) {
            errors.push(ValidationError::MultipleProducers {
                node_id: connection.sink.node_id.clone(),
                port_id: connection.sink.port_id.clone(),
            });
        }
    }
}

/// Detect cycles using Kahn's algorithm (topological sort)
fn detect_cycles<S: NodeState>(snapshot: &GraphSnapshot<S>, errors: &mut Vec<ValidationError>) {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for node in &snapshot.nodes {
        in_degree.insert(&node.id, 0);
    }

    // Node-level edges; parallel port connections count once.
    let edges: HashSet<(&str, &str)> = snapshot
        .connections
        .iter()
        .map(|c| (c.source.node_id.as_str(), c.sink.node_id.as_str()))
        .collect();

    for &(_, target) in &edges {
        *in_degree.entry(target).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        for &(source, target) in &edges {
            if source == node_id {
                if let Some(deg) = in_degree.get_mut(target) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(target);
                    }
                }
            }
        }
    }

    if visited < in_degree.len() {
        errors.push(ValidationError::CycleDetected);
    }
}
