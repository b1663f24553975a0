//! Arithmetic Node
//!
//! Applies a binary operator to `a` and `b`. Each operand comes from its
//! sink when connected and from the node's own field otherwise.

use std::sync::Arc;

use async_trait::async_trait;
use canvas_engine::{
    DataKind, EngineError, ExecutionContext, ExecutionMode, ExecutionResult, NodeCategory,
    NodeDefinition, NodeMetadata, PortAnchor, PortDescriptor, Result,
};
use serde_json::json;

use crate::constants::{NODE_HEADER_HEIGHT_PX, NODE_ROW_HEIGHT_PX, NODE_WIDTH_PX};
use crate::registry::DefinitionFn;
use crate::state::{ArithmeticNode, ArithmeticOperator, CanvasNode};
use crate::values::as_number;

/// Arithmetic
///
/// # Inputs
/// - `a` (optional) - Left operand
/// - `b` (optional) - Right operand
///
/// # Outputs
/// - `output` - Result of the operator
pub struct ArithmeticDefinition;

impl ArithmeticDefinition {
    pub const PORT_A: &'static str = "a";
    pub const PORT_B: &'static str = "b";
    pub const PORT_OUTPUT: &'static str = "output";

    pub fn shared() -> Arc<dyn NodeDefinition<CanvasNode>> {
        Arc::new(Self)
    }
}

inventory::submit!(DefinitionFn(ArithmeticDefinition::shared));

fn apply(operator: ArithmeticOperator, a: f64, b: f64) -> Result<f64> {
    let result = match operator {
        ArithmeticOperator::Add => a + b,
        ArithmeticOperator::Subtract => a - b,
        ArithmeticOperator::Multiply => a * b,
        ArithmeticOperator::Divide if b == 0.0 => {
            return Err(EngineError::failed("Division by zero"))
        }
        ArithmeticOperator::Divide => a / b,
    };
    // JSON has no encoding for inf or NaN
    if !result.is_finite() {
        return Err(EngineError::failed("Result is not a finite number"));
    }
    Ok(result)
}

#[async_trait]
impl NodeDefinition<CanvasNode> for ArithmeticDefinition {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            node_type: "arithmetic".to_string(),
            title: "Arithmetic".to_string(),
            category: NodeCategory::Math,
            description: "Adds, subtracts, multiplies or divides two numbers".to_string(),
            execution_mode: ExecutionMode::Reactive,
        }
    }

    fn default_state(&self) -> CanvasNode {
        CanvasNode::Arithmetic(ArithmeticNode::default())
    }

    fn body_height(&self, _state: &CanvasNode) -> f64 {
        NODE_ROW_HEIGHT_PX * 3.0
    }

    fn ports(&self, _state: &CanvasNode) -> Vec<PortDescriptor> {
        let row = |n: f64| NODE_HEADER_HEIGHT_PX + NODE_ROW_HEIGHT_PX * n;
        vec![
            PortDescriptor::sink(Self::PORT_A, DataKind::Number, PortAnchor::new(0.0, row(0.5))),
            PortDescriptor::sink(Self::PORT_B, DataKind::Number, PortAnchor::new(0.0, row(1.5))),
            PortDescriptor::source(
                Self::PORT_OUTPUT,
                DataKind::Number,
                PortAnchor::new(NODE_WIDTH_PX, row(1.0)),
            ),
        ]
    }

    async fn execute(&self, ctx: ExecutionContext<'_, CanvasNode>) -> Result<ExecutionResult> {
        let CanvasNode::Arithmetic(node) = ctx.state else {
            return Err(EngineError::failed("Arithmetic node has wrong state"));
        };

        let a = match ctx.input(Self::PORT_A) {
            Some(value) => as_number(value, Self::PORT_A)?,
            None => node.a,
        };
        let b = match ctx.input(Self::PORT_B) {
            Some(value) => as_number(value, Self::PORT_B)?,
            None => node.b,
        };

        let result = apply(node.operator, a, b)?;
        log::debug!(
            "ArithmeticDefinition {}: {} {:?} {} = {}",
            ctx.node_id,
            a,
            node.operator,
            b,
            result
        );

        Ok(ExecutionResult::new().with_value(Self::PORT_OUTPUT, json!(result)))
    }
}
