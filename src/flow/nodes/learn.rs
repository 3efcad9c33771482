// SPDX-License-Identifier: MIT

//! `B.Learn`: record intent to queue a learning episode

use serde_json::{json, Value};

use super::NodeHandler;
use crate::error::NodeError;
use crate::flow::context::FlowContext;
use crate::flow::types::FlowNode;

pub struct LearnHandler;

impl NodeHandler for LearnHandler {
    fn node_type(&self) -> &str {
        "B.Learn"
    }

    fn execute(&self, node: &FlowNode, _ctx: &FlowContext) -> Result<Value, NodeError> {
        let episode = node.config_str("episode").unwrap_or(&node.id);
        let priority = node
            .config_value("priority")
            .cloned()
            .unwrap_or_else(|| json!("normal"));

        log::info!("Queued learning episode '{}' ({})", episode, priority);
        Ok(json!({
            "episode_queued": true,
            "episode": episode,
            "priority": priority,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queues_configured_episode() {
        let ctx = FlowContext::new("f", true);
        let node = FlowNode::new("l", "B.Learn")
            .with_config(json!({"episode": "inflation-basics", "priority": "high"}));
        assert_eq!(
            LearnHandler.execute(&node, &ctx).unwrap(),
            json!({"episode_queued": true, "episode": "inflation-basics", "priority": "high"})
        );
    }

    #[test]
    fn test_defaults() {
        let ctx = FlowContext::new("f", true);
        let out = LearnHandler
            .execute(&FlowNode::new("lesson", "B.Learn"), &ctx)
            .unwrap();
        assert_eq!(out["episode"], "lesson");
        assert_eq!(out["priority"], "normal");
    }
}
