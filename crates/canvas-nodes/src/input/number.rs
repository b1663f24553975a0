//! Number Node

use std::sync::Arc;

use async_trait::async_trait;
use canvas_engine::{
    DataKind, EngineError, ExecutionContext, ExecutionMode, ExecutionResult, NodeCategory,
    NodeDefinition, NodeMetadata, PortAnchor, PortDescriptor, Result,
};
use serde_json::json;

use crate::constants::{NODE_HEADER_HEIGHT_PX, NODE_ROW_HEIGHT_PX, NODE_WIDTH_PX};
use crate::registry::DefinitionFn;
use crate::state::{CanvasNode, NumberNode};

/// A constant number
pub struct NumberDefinition;

impl NumberDefinition {
    pub const PORT_OUTPUT: &'static str = "output";

    pub fn shared() -> Arc<dyn NodeDefinition<CanvasNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(DefinitionFn(NumberDefinition::shared));

#[async_trait]
impl NodeDefinition<CanvasNode> for NumberDefinition {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            node_type: "number".to_string(),
            title: "Number".to_string(),
            category: NodeCategory::Input,
            description: "A constant number".to_string(),
            execution_mode: ExecutionMode::Reactive,
        }
    }

    fn default_state(&self) -> CanvasNode {
        CanvasNode::Number(NumberNode::default())
    }

    fn body_height(&self, _state: &CanvasNode) -> f64 {
        NODE_ROW_HEIGHT_PX
    }

    fn ports(&self, _state: &CanvasNode) -> Vec<PortDescriptor> {
        vec![PortDescriptor::source(
            Self::PORT_OUTPUT,
            DataKind::Number,
            PortAnchor::new(NODE_WIDTH_PX, NODE_HEADER_HEIGHT_PX + NODE_ROW_HEIGHT_PX / 2.0),
        )]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, CanvasNode>) -> Result<ExecutionResult> {
        let CanvasNode::Number(NumberNode { value }) = ctx.state else {
            return Err(EngineError::failed("Number node has wrong state"));
        };
        Ok(ExecutionResult::new().with_value(Self::PORT_OUTPUT, json!(value)))
    }
}
