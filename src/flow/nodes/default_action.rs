// SPDX-License-Identifier: MIT

//! `*.Default`: record that a default action was applied

use serde_json::{json, Value};

use super::NodeHandler;
use crate::error::NodeError;
use crate::flow::context::FlowContext;
use crate::flow::types::FlowNode;

pub struct DefaultActionHandler;

impl NodeHandler for DefaultActionHandler {
    fn node_type(&self) -> &str {
        "*.Default"
    }

    fn execute(&self, node: &FlowNode, _ctx: &FlowContext) -> Result<Value, NodeError> {
        let action = node.config_str("action").unwrap_or("default");
        Ok(json!({
            "action_applied": action,
            "result": "applied",
        }))
    }
}
