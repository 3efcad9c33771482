// SPDX-License-Identifier: MIT

//! `I.Detect`: flag entries of an earlier node's output (e.g. shrinkflation)

use serde_json::{json, Value};

use super::NodeHandler;
use crate::error::NodeError;
use crate::flow::condition::is_truthy;
use crate::flow::context::FlowContext;
use crate::flow::types::FlowNode;

pub struct DetectHandler;

impl DetectHandler {
    /// Output of `config.source`, or the most recent output
    fn source<'a>(node: &FlowNode, ctx: &'a FlowContext) -> Result<&'a Value, NodeError> {
        match node.config_str("source") {
            Some(source) => ctx
                .node_outputs
                .get(source)
                .ok_or_else(|| NodeError::missing_input(&node.id, source)),
            None => ctx
                .last_output()
                .map(|(_, value)| value)
                .ok_or_else(|| NodeError::missing_input(&node.id, "previous node output")),
        }
    }

    fn label(entry: &Value, index: usize) -> Value {
        entry
            .get("name")
            .or_else(|| entry.get("id"))
            .cloned()
            .unwrap_or_else(|| json!(index))
    }
}

impl NodeHandler for DetectHandler {
    fn node_type(&self) -> &str {
        "I.Detect"
    }

    fn execute(&self, node: &FlowNode, ctx: &FlowContext) -> Result<Value, NodeError> {
        let field = node.config_str("field").unwrap_or("items");
        let trigger = node.config_str("trigger").unwrap_or("shrink");
        let source = Self::source(node, ctx)?;

        let affected: Vec<Value> = match source.get(field) {
            Some(Value::Array(entries)) => entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| is_truthy(entry.get(trigger)))
                .map(|(i, entry)| Self::label(entry, i))
                .collect(),
            _ => Vec::new(),
        };

        let detected = !affected.is_empty();
        Ok(json!({
            "violation_detected": detected,
            "violation_type": if detected { Value::String(trigger.to_string()) } else { Value::Null },
            "affected_items": affected,
        }))
    }
}
