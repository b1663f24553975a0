//! Node types used by the engine's own tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Semaphore;

use crate::definition::{ExecutionContext, NodeDefinition};
use crate::error::{EngineError, Result};
use crate::extensions::ExecutorExtensions;
use crate::registry::NodeRegistry;
use crate::types::{
    DataKind, ExecutionMode, ExecutionResult, NodeCategory, NodeId, NodeMetadata, NodeState,
    PortAnchor, PortDescriptor,
};

/// Extension key for the shared call log
pub(crate) const CALLS: &str = "calls";
/// Extension key for the semaphore gating `Gated` nodes
pub(crate) const GATE: &str = "gate";

pub(crate) type CallLog = Arc<Mutex<Vec<NodeId>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub(crate) enum TestNode {
    /// Reactive number
    Constant { value: f64 },
    /// Manual number
    Source { value: f64 },
    /// Manual doubler of its required `input`
    Double { fail: bool },
    /// Manual pass-through that waits on the gate semaphore
    Gated,
    /// Text sink whose hooks rewrite its own state
    Label { text: String },
    /// Reactive number that stops when closed
    Switch { open: bool },
    /// Manual collector with one `in<N>` sink per input
    Merge { inputs: usize },
}

impl NodeState for TestNode {
    fn node_type(&self) -> &str {
        match self {
            Self::Constant { .. } => "constant",
            Self::Source { .. } => "source",
            Self::Double { .. } => "double",
            Self::Gated => "gated",
            Self::Label { .. } => "label",
            Self::Switch { .. } => "switch",
            Self::Merge { .. } => "merge",
        }
    }
}

fn record_call(extensions: &ExecutorExtensions, node_id: &str) {
    if let Some(log) = extensions.get::<CallLog>(CALLS) {
        log.lock().unwrap().push(node_id.to_string());
    }
}

fn meta(node_type: &str, title: &str, category: NodeCategory, mode: ExecutionMode) -> NodeMetadata {
    NodeMetadata {
        node_type: node_type.to_string(),
        title: title.to_string(),
        category,
        description: String::new(),
        execution_mode: mode,
    }
}

fn number_output() -> PortDescriptor {
    PortDescriptor::source("output", DataKind::Number, PortAnchor::new(200.0, 40.0))
}

pub(crate) struct ConstantDefinition;

#[async_trait]
impl NodeDefinition<TestNode> for ConstantDefinition {
    fn metadata(&self) -> NodeMetadata {
        meta("constant", "Constant", NodeCategory::Input, ExecutionMode::Reactive)
    }

    fn default_state(&self) -> TestNode {
        TestNode::Constant { value: 0.0 }
    }

    fn body_height(&self, _state: &TestNode) -> f64 {
        40.0
    }

    fn ports(&self, _state: &TestNode) -> Vec<PortDescriptor> {
        vec![number_output()]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, TestNode>) -> Result<ExecutionResult> {
        record_call(ctx.extensions, ctx.node_id);
        let TestNode::Constant { value } = ctx.state else {
            return Err(EngineError::failed("wrong state"));
        };
        Ok(ExecutionResult::new().with_value("output", json!(value)))
    }
}

struct SourceDefinition;

#[async_trait]
impl NodeDefinition<TestNode> for SourceDefinition {
    fn metadata(&self) -> NodeMetadata {
        meta("source", "Source", NodeCategory::Input, ExecutionMode::Manual)
    }

    fn default_state(&self) -> TestNode {
        TestNode::Source { value: 1.0 }
    }

    fn body_height(&self, _state: &TestNode) -> f64 {
        40.0
    }

    fn ports(&self, _state: &TestNode) -> Vec<PortDescriptor> {
        vec![number_output()]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, TestNode>) -> Result<ExecutionResult> {
        record_call(ctx.extensions, ctx.node_id);
        let TestNode::Source { value } = ctx.state else {
            return Err(EngineError::failed("wrong state"));
        };
        Ok(ExecutionResult::new().with_value("output", json!(value)))
    }
}

struct DoubleDefinition;

#[async_trait]
impl NodeDefinition<TestNode> for DoubleDefinition {
    fn metadata(&self) -> NodeMetadata {
        meta("double", "Double", NodeCategory::Math, ExecutionMode::Manual)
    }

    fn default_state(&self) -> TestNode {
        TestNode::Double { fail: false }
    }

    fn body_height(&self, _state: &TestNode) -> f64 {
        40.0
    }

    fn ports(&self, _state: &TestNode) -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::sink("input", DataKind::Number, PortAnchor::new(0.0, 40.0)).required(),
            number_output(),
        ]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, TestNode>) -> Result<ExecutionResult> {
        record_call(ctx.extensions, ctx.node_id);
        if let TestNode::Double { fail: true } = ctx.state {
            return Err(EngineError::failed("asked to fail"));
        }
        let input = ctx
            .require_input("input")?
            .as_f64()
            .ok_or_else(|| EngineError::failed("input is not a number"))?;
        Ok(ExecutionResult::new().with_value("output", json!(input * 2.0)))
    }
}

struct GatedDefinition;

#[async_trait]
impl NodeDefinition<TestNode> for GatedDefinition {
    fn metadata(&self) -> NodeMetadata {
        meta("gated", "Gated", NodeCategory::Control, ExecutionMode::Manual)
    }

    fn default_state(&self) -> TestNode {
        TestNode::Gated
    }

    fn body_height(&self, _state: &TestNode) -> f64 {
        40.0
    }

    fn ports(&self, _state: &TestNode) -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::sink("input", DataKind::Any, PortAnchor::new(0.0, 40.0)),
            PortDescriptor::source("output", DataKind::Any, PortAnchor::new(200.0, 40.0)),
        ]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, TestNode>) -> Result<ExecutionResult> {
        record_call(ctx.extensions, ctx.node_id);
        let input = ctx.input("input").cloned().unwrap_or(serde_json::Value::Null);
        if let Some(gate) = ctx.extensions.get::<Arc<Semaphore>>(GATE) {
            gate.acquire()
                .await
                .map_err(|e| EngineError::failed(e.to_string()))?
                .forget();
        }
        Ok(ExecutionResult::new().with_value("output", input))
    }
}

struct LabelDefinition;

#[async_trait]
impl NodeDefinition<TestNode> for LabelDefinition {
    fn metadata(&self) -> NodeMetadata {
        meta("label", "Label", NodeCategory::Control, ExecutionMode::Manual)
    }

    fn default_state(&self) -> TestNode {
        TestNode::Label {
            text: String::new(),
        }
    }

    fn body_height(&self, _state: &TestNode) -> f64 {
        40.0
    }

    fn ports(&self, _state: &TestNode) -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::sink("text", DataKind::Text, PortAnchor::new(0.0, 40.0)),
            PortDescriptor::source("output", DataKind::Text, PortAnchor::new(200.0, 40.0)),
        ]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, TestNode>) -> Result<ExecutionResult> {
        record_call(ctx.extensions, ctx.node_id);
        let text = match ctx.input("text") {
            Some(value) => value.clone(),
            None => match ctx.state {
                TestNode::Label { text } => json!(text),
                _ => return Err(EngineError::failed("wrong state")),
            },
        };
        Ok(ExecutionResult::new().with_value("output", text))
    }

    fn apply_result(&self, state: &mut TestNode, result: &ExecutionResult) {
        if let (TestNode::Label { text }, Some(value)) = (state, result.value("output")) {
            *text = value.as_str().unwrap_or_default().to_string();
        }
    }

    fn on_port_connect(&self, state: &mut TestNode, port_id: &str) {
        if let (TestNode::Label { text }, "text") = (state, port_id) {
            *text = "connected".to_string();
        }
    }

    fn on_port_disconnect(&self, state: &mut TestNode, port_id: &str) {
        if let (TestNode::Label { text }, "text") = (state, port_id) {
            text.clear();
        }
    }
}

struct SwitchDefinition;

#[async_trait]
impl NodeDefinition<TestNode> for SwitchDefinition {
    fn metadata(&self) -> NodeMetadata {
        meta("switch", "Switch", NodeCategory::Control, ExecutionMode::Reactive)
    }

    fn default_state(&self) -> TestNode {
        TestNode::Switch { open: true }
    }

    fn body_height(&self, _state: &TestNode) -> f64 {
        40.0
    }

    fn ports(&self, _state: &TestNode) -> Vec<PortDescriptor> {
        vec![number_output()]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, TestNode>) -> Result<ExecutionResult> {
        record_call(ctx.extensions, ctx.node_id);
        match ctx.state {
            TestNode::Switch { open: true } => {
                Ok(ExecutionResult::new().with_value("output", json!(1.0)))
            }
            _ => Ok(ExecutionResult::new().with_stop("output")),
        }
    }
}

struct MergeDefinition;

#[async_trait]
impl NodeDefinition<TestNode> for MergeDefinition {
    fn metadata(&self) -> NodeMetadata {
        meta("merge", "Merge", NodeCategory::Control, ExecutionMode::Manual)
    }

    fn default_state(&self) -> TestNode {
        TestNode::Merge { inputs: 2 }
    }

    fn body_height(&self, state: &TestNode) -> f64 {
        match state {
            TestNode::Merge { inputs } => 40.0 * *inputs as f64,
            _ => 40.0,
        }
    }

    fn ports(&self, state: &TestNode) -> Vec<PortDescriptor> {
        let inputs = match state {
            TestNode::Merge { inputs } => *inputs,
            _ => 0,
        };
        let mut ports: Vec<PortDescriptor> = (0..inputs)
            .map(|i| {
                PortDescriptor::sink(
                    format!("in{i}"),
                    DataKind::Any,
                    PortAnchor::new(0.0, 40.0 * (i + 1) as f64),
                )
            })
            .collect();
        ports.push(PortDescriptor::source(
            "output",
            DataKind::Any,
            PortAnchor::new(200.0, 40.0),
        ));
        ports
    }

    async fn execute(&self, ctx: ExecutionContext<'_, TestNode>) -> Result<ExecutionResult> {
        record_call(ctx.extensions, ctx.node_id);
        let values: Vec<serde_json::Value> = ctx.inputs.values().cloned().collect();
        Ok(ExecutionResult::new().with_value("output", json!(values)))
    }
}

/// Registry with every test node type
pub(crate) fn test_registry() -> NodeRegistry<TestNode> {
    let mut registry = NodeRegistry::new();
    registry.register(Arc::new(ConstantDefinition));
    registry.register(Arc::new(SourceDefinition));
    registry.register(Arc::new(DoubleDefinition));
    registry.register(Arc::new(GatedDefinition));
    registry.register(Arc::new(LabelDefinition));
    registry.register(Arc::new(SwitchDefinition));
    registry.register(Arc::new(MergeDefinition));
    registry
}
