// SPDX-License-Identifier: MIT

//! `V.Assess`: pass/fail against a threshold
//!
//! Deterministic unless the node opts into `simulate`, in which case the
//! score is drawn from the handler's RNG.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

use super::{as_number, resolve_number, NodeHandler};
use crate::error::NodeError;
use crate::flow::context::FlowContext;
use crate::flow::types::FlowNode;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

pub struct AssessHandler {
    rng: Mutex<StdRng>,
}

impl AssessHandler {
    /// `seed` makes simulated scores reproducible
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    fn score(&self, node: &FlowNode, ctx: &FlowContext) -> Result<f64, NodeError> {
        let simulate = node
            .config_value("simulate")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if simulate {
            return Ok(self.rng.lock().random::<f64>());
        }

        if let Some(score) = node.config_value("score") {
            return resolve_number(score, ctx)
                .ok_or_else(|| NodeError::missing_input(&node.id, score.to_string()));
        }
        if let Some(path) = node.config_str("scorePath") {
            return ctx
                .get_path(path)
                .as_ref()
                .and_then(as_number)
                .ok_or_else(|| NodeError::missing_input(&node.id, path));
        }
        Err(NodeError::missing_input(&node.id, "score"))
    }
}

impl NodeHandler for AssessHandler {
    fn node_type(&self) -> &str {
        "V.Assess"
    }

    fn execute(&self, node: &FlowNode, ctx: &FlowContext) -> Result<Value, NodeError> {
        let threshold = node
            .config_value("threshold")
            .and_then(as_number)
            .unwrap_or(DEFAULT_THRESHOLD);
        let score = self.score(node, ctx)?;

        let (assessment, reason) = if score >= threshold {
            ("pass", format!("score {:.2} meets threshold {:.2}", score, threshold))
        } else {
            ("fail", format!("score {:.2} is below threshold {:.2}", score, threshold))
        };

        Ok(json!({
            "assessment": assessment,
            "reason": reason,
            "score": score,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assess(handler: &AssessHandler, config: Value, ctx: &FlowContext) -> Result<Value, NodeError> {
        handler.execute(&FlowNode::new("a", "V.Assess").with_config(config), ctx)
    }

    #[test]
    fn test_deterministic_pass_and_fail() {
        let handler = AssessHandler::new(Some(1));
        let ctx = FlowContext::new("f", true);

        let out = assess(&handler, json!({"score": 0.8, "threshold": 0.7}), &ctx).unwrap();
        assert_eq!(out["assessment"], "pass");
        assert_eq!(out["reason"], "score 0.80 meets threshold 0.70");

        let out = assess(&handler, json!({"score": 0.2}), &ctx).unwrap();
        assert_eq!(out["assessment"], "fail");
    }

    #[test]
    fn test_score_from_context() {
        let handler = AssessHandler::new(None);
        let mut ctx = FlowContext::new("f", true);
        ctx.record_output("calc", json!({"result": 0.9}));

        let out = assess(&handler, json!({"scorePath": "nodeOutputs.calc.result"}), &ctx).unwrap();
        assert_eq!(out["assessment"], "pass");

        let out = assess(&handler, json!({"score": "nodeOutputs.calc.result", "threshold": 1}), &ctx)
            .unwrap();
        assert_eq!(out["assessment"], "fail");
    }

    #[test]
    fn test_missing_score_is_an_error() {
        let handler = AssessHandler::new(None);
        let ctx = FlowContext::new("f", true);
        assert_eq!(
            assess(&handler, json!({}), &ctx).unwrap_err(),
            NodeError::missing_input("a", "score")
        );
    }

    #[test]
    fn test_simulated_scores_are_reproducible_with_seed() {
        let ctx = FlowContext::new("f", true);
        let config = json!({"simulate": true});

        let a = AssessHandler::new(Some(42));
        let b = AssessHandler::new(Some(42));
        let out_a = assess(&a, config.clone(), &ctx).unwrap();
        let out_b = assess(&b, config, &ctx).unwrap();

        assert_eq!(out_a, out_b);
        let score = out_a["score"].as_f64().unwrap();
        assert!((0.0..1.0).contains(&score));
    }
}
