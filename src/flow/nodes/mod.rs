// SPDX-License-Identifier: MIT

//! Node execution
//!
//! Each node type is served by a `NodeHandler`. Handlers are looked up by the
//! full type first (`V.PDA`) and then by a mode wildcard (`*.Default`).

mod assess;
mod calculate;
mod default_action;
mod detect;
mod learn;
mod price;
mod sweep;

pub use assess::AssessHandler;
pub use calculate::CalculateHandler;
pub use default_action::DefaultActionHandler;
pub use detect::DetectHandler;
pub use learn::LearnHandler;
pub use price::PriceAssessmentHandler;
pub use sweep::SweepHandler;

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::bus::{BusEvent, EventBus};
use crate::config::RunnerConfig;
use crate::error::NodeError;
use crate::flow::context::FlowContext;
use crate::flow::types::{FlowNode, NodeType};

/// Behavior behind one node type
pub trait NodeHandler: Send + Sync {
    /// Type tag served, e.g. `V.PDA`, or `*.Default` for every mode
    fn node_type(&self) -> &str;

    /// Produce the node's output from its config and the flow context
    fn execute(&self, node: &FlowNode, ctx: &FlowContext) -> Result<Value, NodeError>;
}

/// Dispatches nodes to their handlers
pub struct NodeExecutor {
    handlers: RwLock<HashMap<String, Arc<dyn NodeHandler>>>,
    bus: Option<EventBus>,
}

impl NodeExecutor {
    /// Executor with the built-in handlers and no telemetry
    pub fn new() -> Self {
        Self::with_config(None, &RunnerConfig::default())
    }

    /// Executor with the built-in handlers, publishing `node.executed` on `bus`
    pub fn with_config(bus: Option<EventBus>, config: &RunnerConfig) -> Self {
        let executor = Self {
            handlers: RwLock::new(HashMap::new()),
            bus,
        };
        executor.register(Arc::new(PriceAssessmentHandler));
        executor.register(Arc::new(CalculateHandler));
        executor.register(Arc::new(AssessHandler::new(config.assess_seed)));
        executor.register(Arc::new(DetectHandler));
        executor.register(Arc::new(DefaultActionHandler));
        executor.register(Arc::new(SweepHandler));
        executor.register(Arc::new(LearnHandler));
        executor
    }

    /// Add or replace a handler
    pub fn register(&self, handler: Arc<dyn NodeHandler>) {
        self.handlers
            .write()
            .insert(handler.node_type().to_string(), handler);
    }

    /// Find the handler for a node type tag
    pub fn resolve(&self, node_type: &str) -> Result<Arc<dyn NodeHandler>, NodeError> {
        let parsed = NodeType::parse(node_type)?;
        let handlers = self.handlers.read();
        handlers
            .get(node_type)
            .or_else(|| handlers.get(&format!("*.{}", parsed.operation)))
            .cloned()
            .ok_or_else(|| NodeError::UnknownType(node_type.to_string()))
    }

    pub fn supports(&self, node_type: &str) -> bool {
        self.resolve(node_type).is_ok()
    }

    /// Run a node against a context snapshot
    pub fn execute(&self, node: &FlowNode, ctx: &FlowContext) -> Result<Value, NodeError> {
        let handler = self.resolve(&node.node_type)?;
        log::debug!("Executing node {} ({}) in {}", node.id, node.node_type, ctx.flow_id);
        let output = handler.execute(node, ctx)?;

        if let Some(bus) = &self.bus {
            bus.emit(BusEvent::NodeExecuted {
                flow_id: ctx.flow_id.clone(),
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
                output: output.clone(),
            });
        }
        Ok(output)
    }
}

impl Default for NodeExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Read a number from a JSON number or numeric string
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A literal number, or a string naming a context path that holds one
pub(crate) fn resolve_number(value: &Value, ctx: &FlowContext) -> Option<f64> {
    if let Some(n) = as_number(value) {
        return Some(n);
    }
    value
        .as_str()
        .and_then(|path| ctx.get_path(path))
        .as_ref()
        .and_then(as_number)
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct EchoHandler;

    impl NodeHandler for EchoHandler {
        fn node_type(&self) -> &str {
            "O.Echo"
        }

        fn execute(&self, node: &FlowNode, _ctx: &FlowContext) -> Result<Value, NodeError> {
            Ok(json!({"echo": node.id}))
        }
    }

    #[test]
    fn test_unknown_type_fails() {
        let executor = NodeExecutor::new();
        let ctx = FlowContext::new("f", true);

        let err = executor
            .execute(&FlowNode::new("n", "V.Teleport"), &ctx)
            .unwrap_err();
        assert_eq!(err, NodeError::UnknownType("V.Teleport".to_string()));

        let err = executor.execute(&FlowNode::new("n", "garbage"), &ctx).unwrap_err();
        assert_eq!(err, NodeError::UnknownType("garbage".to_string()));
    }

    #[test]
    fn test_wildcard_default_matches_every_mode() {
        let executor = NodeExecutor::new();
        for tag in ["B.Default", "O.Default", "V.Default", "I.Default"] {
            assert!(executor.supports(tag), "{} should resolve", tag);
        }
        assert!(!executor.supports("B.PDA"));
    }

    #[test]
    fn test_register_custom_handler() {
        let executor = NodeExecutor::new();
        executor.register(Arc::new(EchoHandler));

        let ctx = FlowContext::new("f", true);
        let out = executor.execute(&FlowNode::new("x", "O.Echo"), &ctx).unwrap();
        assert_eq!(out, json!({"echo": "x"}));
    }

    #[test]
    fn test_telemetry_event_emitted() {
        let bus = EventBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.on(crate::bus::events::NODE_EXECUTED, move |e| {
            seen_clone.lock().unwrap().push(e.clone())
        });

        let executor = NodeExecutor::with_config(Some(bus), &RunnerConfig::default());
        let ctx = FlowContext::new("f", true);
        let node = FlowNode::new("d", "I.Default").with_config(json!({"action": "freeze"}));
        executor.execute(&node, &ctx).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].node_id(), Some("d"));
    }

    #[test]
    fn test_resolve_number() {
        let mut ctx = FlowContext::new("f", true);
        ctx.data.insert("income".to_string(), json!(2500));

        assert_eq!(resolve_number(&json!(3), &ctx), Some(3.0));
        assert_eq!(resolve_number(&json!("4.5"), &ctx), Some(4.5));
        assert_eq!(resolve_number(&json!("income"), &ctx), Some(2500.0));
        assert_eq!(resolve_number(&json!("missing"), &ctx), None);
        assert_eq!(resolve_number(&json!(true), &ctx), None);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(9.995, 1), 10.0);
    }
}
