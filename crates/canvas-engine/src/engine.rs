//! Execution engine
//!
//! [`FlowEngine`] owns the graph (nodes plus connections) behind a single
//! async `RwLock` and is the only path through which it is mutated. Every
//! structural operation runs to completion under the write lock, staleness
//! propagation included, so callers never observe a half-applied edit.
//!
//! # Execution
//!
//! `execute(node)` follows these steps:
//!
//! 1. **Guard**: claim the node by setting `is_generating`. A second call
//!    while the first is in flight returns [`ExecutionOutcome::AlreadyRunning`].
//! 2. **Pull**: stale `Reactive` producers are executed first, so cheap input
//!    nodes deliver values without an explicit run. `Manual` producers are
//!    never pulled.
//! 3. **Resolve**: each connected sink reads its producer's cached output.
//!    A stale producer or a stop value resolves to `STOP_EXECUTION`, which
//!    blocks this node and everything downstream of it.
//! 4. **Compute**: the definition's `execute` runs without holding the lock.
//! 5. **Commit**: the result is written back unless the node was removed in
//!    the meantime. Staleness is cleared only if nothing invalidated the node
//!    while it was in flight.
//!
//! The lock is never held across a compute call, so independent nodes run
//! concurrently.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tokio::sync::{watch, RwLock};

use crate::config::{CascadePolicy, EngineConfig};
use crate::definition::{ExecutionContext, NodeDefinition};
use crate::error::{EngineError, Result};
use crate::events::{EngineEvent, EventSink, NullEventSink};
use crate::extensions::ExecutorExtensions;
use crate::graph::{GraphState, NodeRecord};
use crate::persistence::GraphSnapshot;
use crate::registry::NodeRegistry;
use crate::staleness;
use crate::types::{
    Connection, ExecutionMode, ExecutionResult, ExecutionStatus, InputValues, NodeId, NodeState,
    PortDescriptor, PortDirection, PortId, PortRef, PortValue,
};
use crate::validation::validate_snapshot;

/// What a call to [`FlowEngine::execute`] ended up doing
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The compute function ran and its result was committed
    Completed(ExecutionResult),
    /// An input resolved to `STOP_EXECUTION`; the compute function never ran
    Blocked,
    /// Another execution of the node was already in flight
    AlreadyRunning,
    /// The node was removed before its result arrived
    Discarded,
}

impl ExecutionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// The committed result, if any
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            Self::Completed(result) => Some(result),
            _ => None,
        }
    }
}

/// What a connected sink would currently read from its producer
#[derive(Debug, Clone, PartialEq)]
pub struct InputInfo {
    pub port_id: PortId,
    pub source: PortRef,
    /// The producer's cached output; `None` if it never wrote the port
    pub value: Option<PortValue>,
    /// Whether the producer is stale, in which case `value` is outdated
    pub is_out_of_date: bool,
}

/// The canvas dataflow engine
///
/// Cheap to clone; clones share the same graph.
pub struct FlowEngine<S: NodeState> {
    graph: Arc<RwLock<GraphState<S>>>,
    registry: Arc<NodeRegistry<S>>,
    extensions: Arc<ExecutorExtensions>,
    events: Arc<dyn EventSink>,
    config: EngineConfig,
    /// Bumped after every execution ends, for `wait_until_idle`
    idle: Arc<watch::Sender<u64>>,
    /// Executions running or scheduled in the background
    in_flight: Arc<AtomicUsize>,
    next_run: Arc<AtomicU64>,
}

/// Holds one slot of the engine's in-flight count until dropped
struct InFlight {
    count: Arc<AtomicUsize>,
    idle: Arc<watch::Sender<u64>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::SeqCst);
        self.idle.send_modify(|n| *n = n.wrapping_add(1));
    }
}

impl<S: NodeState> Clone for FlowEngine<S> {
    fn clone(&self) -> Self {
        Self {
            graph: self.graph.clone(),
            registry: self.registry.clone(),
            extensions: self.extensions.clone(),
            events: self.events.clone(),
            config: self.config.clone(),
            idle: self.idle.clone(),
            in_flight: self.in_flight.clone(),
            next_run: self.next_run.clone(),
        }
    }
}

impl<S: NodeState> FlowEngine<S> {
    /// Create an engine with an empty graph
    pub fn new(registry: Arc<NodeRegistry<S>>, config: EngineConfig) -> Self {
        let (idle, _) = watch::channel(0);
        Self {
            graph: Arc::new(RwLock::new(GraphState::new())),
            registry,
            extensions: Arc::new(ExecutorExtensions::new()),
            events: Arc::new(NullEventSink),
            config,
            idle: Arc::new(idle),
            in_flight: Arc::new(AtomicUsize::new(0)),
            next_run: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Route engine events to `sink`
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Services handed to every node definition's `execute`
    pub fn with_extensions(mut self, extensions: ExecutorExtensions) -> Self {
        self.extensions = Arc::new(extensions);
        self
    }

    pub fn registry(&self) -> &NodeRegistry<S> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn extensions(&self) -> &ExecutorExtensions {
        &self.extensions
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Instantiate a node of `node_type` with the type's default state
    pub async fn create_node(&self, node_id: impl Into<String>, node_type: &str) -> Result<()> {
        let state = self.registry.default_state(node_type)?;
        self.create_node_with_state(node_id, state).await
    }

    /// Instantiate a node with an explicit initial state
    pub async fn create_node_with_state(&self, node_id: impl Into<String>, state: S) -> Result<()> {
        let node_id = node_id.into();
        let node_type = state.node_type().to_string();
        if !self.registry.has_node_type(&node_type) {
            return Err(EngineError::NodeTypeNotFound(node_type));
        }

        self.graph
            .write()
            .await
            .insert_node(NodeRecord::new(node_id.clone(), state))?;

        log::debug!("Created node '{}' of type '{}'", node_id, node_type);
        self.emit(EngineEvent::NodeCreated { node_id, node_type });
        Ok(())
    }

    /// Delete a node together with every incident connection
    ///
    /// Surviving endpoints get their disconnect hook, and former consumers
    /// are marked stale. A result still in flight for this node will be
    /// discarded when it arrives.
    pub async fn remove_node(&self, node_id: &str) -> Result<Vec<Connection>> {
        let mut guard = self.graph.write().await;
        let graph = &mut *guard;
        if !graph.contains(node_id) {
            return Err(EngineError::NodeNotFound(node_id.to_string()));
        }

        let removed = graph.connections.remove_node(node_id);
        graph.nodes.remove(node_id);

        let mut changed: Vec<NodeId> = Vec::new();
        let mut invalidated = Vec::new();
        for connection in &removed {
            let survivor = if connection.source.node_id == node_id {
                &connection.sink
            } else {
                &connection.source
            };
            if self.run_hook(graph, survivor, false) && !changed.contains(&survivor.node_id) {
                changed.push(survivor.node_id.clone());
            }
            if connection.source.node_id == node_id {
                invalidated.extend(staleness::mark_stale_from(graph, &connection.sink.node_id));
            }
        }
        for id in &changed {
            invalidated.extend(staleness::mark_stale_from(graph, id));
        }
        drop(guard);

        log::debug!(
            "Removed node '{}' with {} connection(s)",
            node_id,
            removed.len()
        );
        let mut events = vec![EngineEvent::NodeRemoved {
            node_id: node_id.to_string(),
            connections: removed.clone(),
        }];
        events.extend(
            changed
                .into_iter()
                .map(|node_id| EngineEvent::NodeStateChanged { node_id }),
        );
        events.extend(invalidated_event(invalidated));
        self.emit_all(events);
        self.notify_idle();
        Ok(removed)
    }

    /// Edit a node's own fields
    ///
    /// Marks the node and everything downstream stale when the state
    /// actually changed, and returns the nodes whose flag flipped. The edit
    /// may not change the node's type. Connections on ports the new state no
    /// longer has are removed as if disconnected.
    pub async fn update_state<F>(&self, node_id: &str, edit: F) -> Result<Vec<NodeId>>
    where
        F: FnOnce(&mut S) + Send,
    {
        let mut guard = self.graph.write().await;
        let graph = &mut *guard;
        let node = graph.node_mut(node_id)?;
        let definition = self.registry.get(node.node_type())?;
        let ports_before = definition.port_map(&node.state);

        let before = node.state.clone();
        edit(&mut node.state);
        if node.state == before {
            return Ok(Vec::new());
        }
        if node.state.node_type() != before.node_type() {
            let to = node.state.node_type().to_string();
            node.state = before;
            return Err(EngineError::TypeChanged {
                node_id: node_id.to_string(),
                from: node.state.node_type().to_string(),
                to,
            });
        }
        if !node.is_generating {
            node.status = ExecutionStatus::Idle;
        }
        let ports_after = definition.port_map(&node.state);

        let mut invalidated = staleness::mark_stale_from(graph, node_id);

        let dropped: Vec<Connection> = graph
            .connections
            .incoming(node_id)
            .into_iter()
            .chain(graph.connections.outgoing(node_id))
            .filter(|c| {
                let end = if c.sink.node_id == node_id {
                    &c.sink
                } else {
                    &c.source
                };
                ports_before.contains_key(&end.port_id) && !ports_after.contains_key(&end.port_id)
            })
            .collect();
        let mut changed: Vec<NodeId> = Vec::new();
        for connection in &dropped {
            graph.connections.remove(&connection.source, &connection.sink)?;
            log::debug!("Dropped {} after its port vanished", connection);
            let (hooked, stale) = self.after_edge_change(graph, connection, false);
            for id in hooked {
                if id != node_id && !changed.contains(&id) {
                    changed.push(id);
                }
            }
            invalidated.extend(stale);
        }
        drop(guard);

        let mut events = vec![EngineEvent::NodeStateChanged {
            node_id: node_id.to_string(),
        }];
        events.extend(
            dropped
                .into_iter()
                .map(|connection| EngineEvent::Disconnected { connection }),
        );
        events.extend(
            changed
                .into_iter()
                .map(|node_id| EngineEvent::NodeStateChanged { node_id }),
        );
        events.extend(invalidated_event(invalidated.clone()));
        self.emit_all(events);
        Ok(invalidated)
    }

    /// Mark a node and its transitive consumers stale
    ///
    /// For hosts whose external store changed a node behind the engine's
    /// back.
    pub async fn mark_stale(&self, node_id: &str) -> Result<Vec<NodeId>> {
        let mut guard = self.graph.write().await;
        let graph = &mut *guard;
        graph.node(node_id)?;
        let invalidated = staleness::mark_stale_from(graph, node_id);
        drop(guard);

        self.emit_all(invalidated_event(invalidated.clone()));
        Ok(invalidated)
    }

    /// A copy of the node's record
    pub async fn node(&self, node_id: &str) -> Result<NodeRecord<S>> {
        self.graph.read().await.node(node_id).cloned()
    }

    /// Copies of every node record, ordered by id
    pub async fn nodes(&self) -> Vec<NodeRecord<S>> {
        self.graph.read().await.nodes().cloned().collect()
    }

    pub async fn is_out_of_date(&self, node_id: &str) -> Result<bool> {
        Ok(self.graph.read().await.node(node_id)?.is_out_of_date)
    }

    /// The node's ports, computed from its current state
    pub async fn ports(&self, node_id: &str) -> Result<Vec<PortDescriptor>> {
        let graph = self.graph.read().await;
        let node = graph.node(node_id)?;
        Ok(self.registry.get(node.node_type())?.ports(&node.state))
    }

    /// Body height hint for the renderer
    pub async fn body_height(&self, node_id: &str) -> Result<f64> {
        let graph = self.graph.read().await;
        let node = graph.node(node_id)?;
        Ok(self.registry.get(node.node_type())?.body_height(&node.state))
    }

    /// Cached upstream values for every connected sink of `node_id`
    ///
    /// Nothing is executed; a preview can use the staleness flag to mark
    /// values that no longer reflect their inputs.
    pub async fn input_info(&self, node_id: &str) -> Result<Vec<InputInfo>> {
        let graph = self.graph.read().await;
        let node = graph.node(node_id)?;
        let ports = self.registry.get(node.node_type())?.ports(&node.state);

        Ok(ports
            .iter()
            .filter(|p| p.is_sink())
            .filter_map(|port| {
                let sink = PortRef::new(node_id, port.id.as_str());
                let source = graph.connections.producer_of(&sink)?.clone();
                let producer = graph.nodes.get(&source.node_id);
                Some(InputInfo {
                    port_id: port.id.clone(),
                    value: producer.and_then(|p| p.outputs.get(&source.port_id).cloned()),
                    is_out_of_date: producer.map(|p| p.is_out_of_date).unwrap_or(true),
                    source,
                })
            })
            .collect())
    }

    // ========================================================================
    // Connections
    // ========================================================================

    /// Draw a connection from a source port to a sink port
    ///
    /// Rejected without touching the graph when either port is missing or
    /// has the wrong direction, the data kinds are incompatible, the sink
    /// already has a producer, or the edge would close a cycle.
    pub async fn connect(&self, source: PortRef, sink: PortRef) -> Result<Connection> {
        let mut guard = self.graph.write().await;
        let graph = &mut *guard;

        let source_port = self.port_on(graph, &source, PortDirection::Source)?;
        let sink_port = self.port_on(graph, &sink, PortDirection::Sink)?;
        if !source_port.data_kind.is_compatible_with(&sink_port.data_kind) {
            return Err(EngineError::IncompatibleDataKind {
                source_kind: source_port.data_kind,
                sink_kind: sink_port.data_kind,
            });
        }

        let connection = Connection::new(source, sink);
        graph.connections.insert(connection.clone())?;
        log::debug!("Connected {}", connection);

        let (changed, invalidated) = self.after_edge_change(graph, &connection, true);
        drop(guard);

        let mut events = vec![EngineEvent::Connected {
            connection: connection.clone(),
        }];
        events.extend(
            changed
                .into_iter()
                .map(|node_id| EngineEvent::NodeStateChanged { node_id }),
        );
        events.extend(invalidated_event(invalidated));
        self.emit_all(events);

        if self.config.auto_run_on_connect {
            self.spawn_execute(connection.sink.node_id.clone());
        }
        Ok(connection)
    }

    /// Remove the connection `source -> sink`
    pub async fn disconnect(&self, source: &PortRef, sink: &PortRef) -> Result<Connection> {
        let mut guard = self.graph.write().await;
        let graph = &mut *guard;

        let connection = graph.connections.remove(source, sink)?;
        log::debug!("Disconnected {}", connection);

        let (changed, invalidated) = self.after_edge_change(graph, &connection, false);
        drop(guard);

        let mut events = vec![EngineEvent::Disconnected {
            connection: connection.clone(),
        }];
        events.extend(
            changed
                .into_iter()
                .map(|node_id| EngineEvent::NodeStateChanged { node_id }),
        );
        events.extend(invalidated_event(invalidated));
        self.emit_all(events);
        Ok(connection)
    }

    /// The source feeding a sink port, if any
    pub async fn producer_of(&self, sink: &PortRef) -> Option<PortRef> {
        self.graph.read().await.connections.producer_of(sink).cloned()
    }

    /// Every sink fed by a source port
    pub async fn consumers_of(&self, source: &PortRef) -> Vec<PortRef> {
        self.graph.read().await.connections.consumers_of(source)
    }

    pub async fn connections(&self) -> Vec<Connection> {
        self.graph.read().await.connections.connections()
    }

    /// Resolve a port on a live node and check its direction
    fn port_on(
        &self,
        graph: &GraphState<S>,
        port: &PortRef,
        expected: PortDirection,
    ) -> Result<PortDescriptor> {
        let node = graph.node(&port.node_id)?;
        let descriptor = self
            .registry
            .get(node.node_type())?
            .port(&node.state, &port.port_id)
            .ok_or_else(|| EngineError::PortNotFound {
                node_id: port.node_id.clone(),
                port_id: port.port_id.clone(),
            })?;

        if descriptor.direction != expected {
            return Err(EngineError::PortDirectionMismatch {
                node_id: port.node_id.clone(),
                port_id: port.port_id.clone(),
                expected: expected.to_string(),
            });
        }
        Ok(descriptor)
    }

    /// Run both endpoint hooks and invalidate from the sink
    ///
    /// Returns the nodes whose state a hook rewrote and the nodes whose
    /// staleness flag flipped.
    fn after_edge_change(
        &self,
        graph: &mut GraphState<S>,
        connection: &Connection,
        connected: bool,
    ) -> (Vec<NodeId>, Vec<NodeId>) {
        let mut changed = Vec::new();
        for port in [&connection.source, &connection.sink] {
            if self.run_hook(graph, port, connected) && !changed.contains(&port.node_id) {
                changed.push(port.node_id.clone());
            }
        }

        let mut invalidated = staleness::mark_stale_from(graph, &connection.sink.node_id);
        for node_id in &changed {
            invalidated.extend(staleness::mark_stale_from(graph, node_id));
        }
        (changed, invalidated)
    }

    /// Invoke a port hook, returning whether it changed the node's state
    fn run_hook(&self, graph: &mut GraphState<S>, port: &PortRef, connected: bool) -> bool {
        let Some(node) = graph.nodes.get_mut(&port.node_id) else {
            return false;
        };
        let Ok(definition) = self.registry.get(node.node_type()) else {
            return false;
        };

        let before = node.state.clone();
        if connected {
            definition.on_port_connect(&mut node.state, &port.port_id);
        } else {
            definition.on_port_disconnect(&mut node.state, &port.port_id);
        }
        node.state != before
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run a node's compute function on its current inputs
    ///
    /// Structural problems (unknown node) and compute failures are returned
    /// as errors; everything else is reported through the outcome.
    pub async fn execute(&self, node_id: &str) -> Result<ExecutionOutcome> {
        self.execute_boxed(node_id.to_string()).await
    }

    /// Boxed entry point; pulling producers recurses through here
    fn execute_boxed(&self, node_id: NodeId) -> BoxFuture<'static, Result<ExecutionOutcome>> {
        let engine = self.clone();
        async move { engine.run(node_id).await }.boxed()
    }

    /// Execute in the background, logging any failure
    ///
    /// The run counts as in flight from the moment it is scheduled, so
    /// [`wait_all_idle`](Self::wait_all_idle) cannot miss it.
    fn spawn_execute(&self, node_id: NodeId) {
        let engine = self.clone();
        let in_flight = self.track();
        tokio::spawn(async move {
            let _in_flight = in_flight;
            if let Err(e) = engine.execute(&node_id).await {
                log::warn!("Background execution of '{}' failed: {}", node_id, e);
            }
        });
    }

    fn track(&self) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight {
            count: self.in_flight.clone(),
            idle: self.idle.clone(),
        }
    }

    /// Resolve once no execution is running or scheduled anywhere in the graph
    ///
    /// Covers background cascade and auto-run executions that have not yet
    /// claimed their node.
    pub async fn wait_all_idle(&self) {
        let mut rx = self.idle.subscribe();
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Resolve once no execution of `node_id` is in flight
    ///
    /// Returns immediately for idle or unknown nodes.
    pub async fn wait_until_idle(&self, node_id: &str) {
        let mut rx = self.idle.subscribe();
        loop {
            let generating = self
                .graph
                .read()
                .await
                .nodes
                .get(node_id)
                .map(|n| n.is_generating)
                .unwrap_or(false);
            if !generating || rx.changed().await.is_err() {
                return;
            }
        }
    }

    async fn run(&self, node_id: NodeId) -> Result<ExecutionOutcome> {
        let _in_flight = self.track();
        let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);
        {
            let mut graph = self.graph.write().await;
            let node = graph.node_mut(&node_id)?;
            if node.is_generating {
                log::debug!("Node '{}' is already executing", node_id);
                return Ok(ExecutionOutcome::AlreadyRunning);
            }
            node.is_generating = true;
            node.run_id = run_id;
        }

        let outcome = self.run_claimed(&node_id, run_id).await;
        self.release(&node_id, run_id).await;
        self.notify_idle();
        outcome
    }

    async fn run_claimed(&self, node_id: &str, run_id: u64) -> Result<ExecutionOutcome> {
        self.pull_stale_producers(node_id).await;

        let (definition, state, inputs, epoch) = {
            let mut guard = self.graph.write().await;
            let graph = &mut *guard;
            let Some(node) = graph.nodes.get(node_id).filter(|n| n.run_id == run_id) else {
                drop(guard);
                return Ok(self.discard(node_id));
            };

            let definition = self.registry.get(node.node_type())?;
            let ports = definition.ports(&node.state);
            let Some(inputs) = resolve_inputs(graph, node_id, &ports) else {
                let events = block(graph, node_id, &ports);
                drop(guard);
                log::debug!("Node '{}' is blocked by an upstream stop", node_id);
                self.emit_all(events);
                return Ok(ExecutionOutcome::Blocked);
            };

            let node = graph.node_mut(node_id)?;
            node.status = ExecutionStatus::Generating;
            (definition, node.state.clone(), inputs, node.epoch)
        };

        log::debug!("Executing node '{}' ({} input(s))", node_id, inputs.len());
        self.emit(EngineEvent::NodeStarted {
            node_id: node_id.to_string(),
        });

        let ctx = ExecutionContext {
            node_id,
            state: &state,
            inputs: &inputs,
            extensions: self.extensions.as_ref(),
        };
        let result = definition.execute(ctx).await;

        self.commit(node_id, run_id, epoch, definition.as_ref(), result)
            .await
    }

    /// Execute every stale `Reactive` producer of `node_id`
    async fn pull_stale_producers(&self, node_id: &str) {
        let producers: Vec<NodeId> = {
            let graph = self.graph.read().await;
            graph
                .connections
                .upstream_nodes(node_id)
                .into_iter()
                .filter(|id| {
                    graph
                        .nodes
                        .get(id)
                        .map(|n| n.is_out_of_date && self.is_reactive(n))
                        .unwrap_or(false)
                })
                .collect()
        };

        for producer in producers {
            log::debug!("Pulling reactive producer '{}' for '{}'", producer, node_id);
            match self.execute_boxed(producer.clone()).await {
                Ok(ExecutionOutcome::AlreadyRunning) => self.wait_until_idle(&producer).await,
                Ok(_) => {}
                // The failure was already reported; the input resolves to a stop.
                Err(e) => log::debug!("Pull of '{}' failed: {}", producer, e),
            }
        }
    }

    fn is_reactive(&self, node: &NodeRecord<S>) -> bool {
        self.registry
            .get_metadata(node.node_type())
            .map(|m| m.execution_mode == ExecutionMode::Reactive)
            .unwrap_or(false)
    }

    /// Write a finished computation back into the graph
    async fn commit(
        &self,
        node_id: &str,
        run_id: u64,
        epoch: u64,
        definition: &dyn NodeDefinition<S>,
        result: Result<ExecutionResult>,
    ) -> Result<ExecutionOutcome> {
        let mut guard = self.graph.write().await;
        let graph = &mut *guard;
        let Some(node) = graph
            .nodes
            .get_mut(node_id)
            .filter(|n| n.run_id == run_id && n.is_generating)
        else {
            drop(guard);
            return Ok(self.discard(node_id));
        };

        match result {
            Ok(result) => {
                let before = node.state.clone();
                definition.apply_result(&mut node.state, &result);
                let state_changed = node.state != before;
                let outputs_changed = node.outputs != result;

                node.outputs = result.clone();
                node.is_generating = false;
                node.status = ExecutionStatus::Succeeded;
                node.last_error = None;
                let up_to_date = node.epoch == epoch;
                if up_to_date {
                    node.is_out_of_date = false;
                }

                let consumers = graph.connections.downstream_nodes(node_id);
                let mut invalidated = Vec::new();
                if outputs_changed || self.config.propagate_unchanged_results {
                    for consumer in &consumers {
                        invalidated.extend(staleness::mark_stale_from(graph, consumer));
                    }
                }

                let auto = self.config.cascade == CascadePolicy::Auto;
                let cascade: Vec<NodeId> = if auto && up_to_date {
                    consumers
                        .into_iter()
                        .filter(|id| {
                            graph
                                .nodes
                                .get(id)
                                .map(|n| n.is_out_of_date && !n.is_generating)
                                .unwrap_or(false)
                        })
                        .collect()
                } else {
                    Vec::new()
                };
                drop(guard);

                if up_to_date {
                    log::debug!("Node '{}' completed", node_id);
                } else {
                    log::info!(
                        "Node '{}' completed on inputs that changed in flight; it stays stale",
                        node_id
                    );
                }

                let mut events = Vec::new();
                if state_changed {
                    events.push(EngineEvent::NodeStateChanged {
                        node_id: node_id.to_string(),
                    });
                }
                events.push(EngineEvent::NodeCompleted {
                    node_id: node_id.to_string(),
                    outputs: result.clone(),
                    up_to_date,
                });
                events.extend(invalidated_event(invalidated));
                self.emit_all(events);

                for consumer in cascade {
                    self.spawn_execute(consumer);
                }
                Ok(ExecutionOutcome::Completed(result))
            }
            Err(err) => {
                let err = err.for_node(node_id);
                node.is_generating = false;
                node.status = ExecutionStatus::Failed;
                node.last_error = Some(err.to_string());
                let invalidated = staleness::mark_stale_from(graph, node_id);
                drop(guard);

                log::warn!("{}", err);
                let mut events = vec![EngineEvent::NodeFailed {
                    node_id: node_id.to_string(),
                    error: err.to_string(),
                }];
                events.extend(invalidated_event(invalidated));
                self.emit_all(events);
                Err(err)
            }
        }
    }

    /// Drop this run's claim on the node if it still holds one
    async fn release(&self, node_id: &str, run_id: u64) {
        let mut graph = self.graph.write().await;
        if let Some(node) = graph.nodes.get_mut(node_id) {
            if node.run_id == run_id && node.is_generating {
                node.is_generating = false;
                if node.status == ExecutionStatus::Generating {
                    node.status = ExecutionStatus::Idle;
                }
            }
        }
    }

    fn discard(&self, node_id: &str) -> ExecutionOutcome {
        log::warn!("Discarding result for removed node '{}'", node_id);
        self.emit(EngineEvent::ResultDiscarded {
            node_id: node_id.to_string(),
        });
        ExecutionOutcome::Discarded
    }

    fn notify_idle(&self) {
        self.idle.send_modify(|n| *n = n.wrapping_add(1));
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Capture the graph for saving or undo
    pub async fn snapshot(&self) -> GraphSnapshot<S> {
        GraphSnapshot::capture(&*self.graph.read().await)
    }

    /// Replace the whole graph with a persisted one
    ///
    /// The snapshot is validated first; on any violation the engine is left
    /// unchanged and every problem is reported. Executions in flight against
    /// the old graph are discarded when they finish.
    pub async fn restore(&self, snapshot: GraphSnapshot<S>) -> Result<()> {
        let errors = validate_snapshot(&snapshot, &self.registry);
        if !errors.is_empty() {
            return Err(EngineError::InvalidSnapshot(errors));
        }

        let mut restored = GraphState::new();
        for mut node in snapshot.nodes {
            node.is_generating = false;
            if node.status == ExecutionStatus::Generating {
                node.status = ExecutionStatus::Idle;
            }
            restored.insert_node(node)?;
        }
        for connection in snapshot.connections {
            restored.connections.insert(connection)?;
        }
        let invalidated = staleness::normalize(&mut restored);

        log::info!(
            "Restored graph with {} node(s) and {} connection(s)",
            restored.len(),
            restored.connections.len()
        );
        *self.graph.write().await = restored;

        self.emit_all(invalidated_event(invalidated));
        self.notify_idle();
        Ok(())
    }

    // ========================================================================
    // Events
    // ========================================================================

    fn emit(&self, event: EngineEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Failed to deliver engine event: {}", e);
        }
    }

    fn emit_all(&self, events: impl IntoIterator<Item = EngineEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

fn invalidated_event(node_ids: Vec<NodeId>) -> Option<EngineEvent> {
    (!node_ids.is_empty()).then_some(EngineEvent::NodesInvalidated { node_ids })
}

/// Values for every connected sink, or `None` if any resolves to a stop
///
/// A stale producer, a stopped port and a port the producer never wrote all
/// count as a stop.
fn resolve_inputs<S: NodeState>(
    graph: &GraphState<S>,
    node_id: &str,
    ports: &[PortDescriptor],
) -> Option<InputValues> {
    let mut inputs = InputValues::new();
    for port in ports.iter().filter(|p| p.is_sink()) {
        let sink = PortRef::new(node_id, port.id.as_str());
        let Some(source) = graph.connections.producer_of(&sink) else {
            continue;
        };
        let value = graph
            .nodes
            .get(&source.node_id)
            .filter(|producer| !producer.is_out_of_date)
            .and_then(|producer| producer.outputs.get(&source.port_id));

        match value {
            Some(PortValue::Value(value)) => {
                inputs.insert(port.id.clone(), value.clone());
            }
            _ => return None,
        }
    }
    Some(inputs)
}

/// Short-circuit a node whose inputs resolved to a stop
fn block<S: NodeState>(
    graph: &mut GraphState<S>,
    node_id: &str,
    ports: &[PortDescriptor],
) -> Vec<EngineEvent> {
    if let Some(node) = graph.nodes.get_mut(node_id) {
        node.outputs = ExecutionResult::stopped(
            ports
                .iter()
                .filter(|p| p.is_source())
                .map(|p| p.id.as_str()),
        );
        node.is_generating = false;
        node.status = ExecutionStatus::Blocked;
    }

    let invalidated = staleness::mark_stale_from(graph, node_id);
    let mut blocked = vec![node_id.to_string()];
    blocked.extend(staleness::block_downstream(graph, node_id));

    let mut events: Vec<EngineEvent> = invalidated_event(invalidated).into_iter().collect();
    events.push(EngineEvent::NodesBlocked { node_ids: blocked });
    events
}
