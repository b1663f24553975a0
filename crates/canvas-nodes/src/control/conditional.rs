//! Conditional Node
//!
//! Routes a value to one of two outputs based on a boolean condition. The
//! branch not taken carries the stop signal, so everything downstream of it
//! is blocked rather than run on a stale value.

use std::sync::Arc;

use async_trait::async_trait;
use canvas_engine::{
    DataKind, ExecutionContext, ExecutionMode, ExecutionResult, NodeCategory, NodeDefinition,
    NodeMetadata, PortAnchor, PortDescriptor, Result,
};

use crate::constants::{NODE_HEADER_HEIGHT_PX, NODE_ROW_HEIGHT_PX, NODE_WIDTH_PX};
use crate::registry::DefinitionFn;
use crate::state::{CanvasNode, ConditionalNode};
use crate::values::as_bool;

/// Conditional
///
/// # Inputs
/// - `condition` (required) - Boolean condition
/// - `value` (required) - Value to route
///
/// # Outputs
/// - `trueOut` - The value when the condition is true, stop otherwise
/// - `falseOut` - The value when the condition is false, stop otherwise
pub struct ConditionalDefinition;

impl ConditionalDefinition {
    pub const PORT_CONDITION: &'static str = "condition";
    pub const PORT_VALUE: &'static str = "value";
    pub const PORT_TRUE_OUT: &'static str = "trueOut";
    pub const PORT_FALSE_OUT: &'static str = "falseOut";

    pub fn shared() -> Arc<dyn NodeDefinition<CanvasNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(DefinitionFn(ConditionalDefinition::shared));

#[async_trait]
impl NodeDefinition<CanvasNode> for ConditionalDefinition {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            node_type: "conditional".to_string(),
            title: "Conditional".to_string(),
            category: NodeCategory::Control,
            description: "Routes data based on a boolean condition".to_string(),
            execution_mode: ExecutionMode::Reactive,
        }
    }

    fn default_state(&self) -> CanvasNode {
        CanvasNode::Conditional(ConditionalNode::default())
    }

    fn body_height(&self, _state: &CanvasNode) -> f64 {
        NODE_ROW_HEIGHT_PX * 2.0
    }

    fn ports(&self, _state: &CanvasNode) -> Vec<PortDescriptor> {
        let row = |n: f64| NODE_HEADER_HEIGHT_PX + NODE_ROW_HEIGHT_PX * n;
        vec![
            PortDescriptor::sink(
                Self::PORT_CONDITION,
                DataKind::Boolean,
                PortAnchor::new(0.0, row(0.5)),
            )
            .required(),
            PortDescriptor::sink(Self::PORT_VALUE, DataKind::Any, PortAnchor::new(0.0, row(1.5)))
                .required(),
            PortDescriptor::source(
                Self::PORT_TRUE_OUT,
                DataKind::Any,
                PortAnchor::new(NODE_WIDTH_PX, row(0.5)),
            ),
            PortDescriptor::source(
                Self::PORT_FALSE_OUT,
                DataKind::Any,
                PortAnchor::new(NODE_WIDTH_PX, row(1.5)),
            ),
        ]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, CanvasNode>) -> Result<ExecutionResult> {
        let condition = as_bool(ctx.require_input(Self::PORT_CONDITION)?, Self::PORT_CONDITION)?;
        let value = ctx.require_input(Self::PORT_VALUE)?.clone();

        log::debug!(
            "ConditionalDefinition {}: condition={}, routing value",
            ctx.node_id,
            condition
        );

        let (taken, skipped) = if condition {
            (Self::PORT_TRUE_OUT, Self::PORT_FALSE_OUT)
        } else {
            (Self::PORT_FALSE_OUT, Self::PORT_TRUE_OUT)
        };
        Ok(ExecutionResult::new()
            .with_value(taken, value)
            .with_stop(skipped))
    }
}
