// SPDX-License-Identifier: MIT

//! `V.Calculate`: sum or average over configured inputs

use serde_json::{json, Value};

use super::{resolve_number, NodeHandler};
use crate::error::NodeError;
use crate::flow::context::FlowContext;
use crate::flow::types::FlowNode;

pub struct CalculateHandler;

impl NodeHandler for CalculateHandler {
    fn node_type(&self) -> &str {
        "V.Calculate"
    }

    fn execute(&self, node: &FlowNode, ctx: &FlowContext) -> Result<Value, NodeError> {
        let inputs = match node.config_value("inputs") {
            Some(Value::Array(inputs)) => inputs,
            Some(_) => {
                return Err(NodeError::invalid_config(&node.id, "inputs must be an array"));
            }
            None => return Err(NodeError::missing_input(&node.id, "inputs")),
        };

        let values = inputs
            .iter()
            .map(|input| {
                resolve_number(input, ctx)
                    .ok_or_else(|| NodeError::missing_input(&node.id, input.to_string()))
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let sum: f64 = values.iter().sum();
        let result = match node.config_str("operation").unwrap_or("sum") {
            "sum" => sum,
            "average" | "avg" | "mean" => {
                if values.is_empty() {
                    0.0
                } else {
                    sum / values.len() as f64
                }
            }
            other => {
                return Err(NodeError::invalid_config(
                    &node.id,
                    format!("unsupported operation '{}'", other),
                ));
            }
        };

        Ok(json!({ "result": result }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc(config: Value, ctx: &FlowContext) -> Result<Value, NodeError> {
        CalculateHandler.execute(&FlowNode::new("calc", "V.Calculate").with_config(config), ctx)
    }

    #[test]
    fn test_sum_and_average() {
        let ctx = FlowContext::new("f", true);
        assert_eq!(
            calc(json!({"operation": "sum", "inputs": [1, 2, 3.5]}), &ctx).unwrap(),
            json!({"result": 6.5})
        );
        assert_eq!(
            calc(json!({"operation": "average", "inputs": [2, 4]}), &ctx).unwrap(),
            json!({"result": 3.0})
        );
    }

    #[test]
    fn test_empty_inputs() {
        let ctx = FlowContext::new("f", true);
        assert_eq!(
            calc(json!({"operation": "average", "inputs": []}), &ctx).unwrap(),
            json!({"result": 0.0})
        );
    }

    #[test]
    fn test_inputs_from_context_paths() {
        let mut ctx = FlowContext::new("f", true);
        ctx.record_output("pda", json!({"real": 40.0}));
        ctx.data.insert("extra".to_string(), json!(2));

        let out = calc(json!({"inputs": ["nodeOutputs.pda.real", "extra", 8]}), &ctx).unwrap();
        assert_eq!(out, json!({"result": 50.0}));
    }

    #[test]
    fn test_errors() {
        let ctx = FlowContext::new("f", true);
        assert!(matches!(
            calc(json!({"operation": "median", "inputs": [1]}), &ctx),
            Err(NodeError::InvalidConfig { .. })
        ));
        assert!(matches!(
            calc(json!({"operation": "sum"}), &ctx),
            Err(NodeError::MissingInput { .. })
        ));
        assert!(matches!(
            calc(json!({"inputs": ["nowhere"]}), &ctx),
            Err(NodeError::MissingInput { .. })
        ));
    }
}
