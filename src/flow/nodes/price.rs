// SPDX-License-Identifier: MIT

//! `V.PDA` price assessment: nominal vs real basket cost and a quality tier

use serde_json::{json, Value};

use super::{as_number, round_to, NodeHandler};
use crate::error::NodeError;
use crate::flow::context::FlowContext;
use crate::flow::types::FlowNode;

/// Deflator applied to the nominal total when none is configured
pub const DEFAULT_DEFLATOR: f64 = 0.92;
/// Average markup at or below which a basket is "good"
pub const GOOD_THRESHOLD: f64 = 0.05;
/// Average markup at or below which a basket is "fair"
pub const FAIR_THRESHOLD: f64 = 0.15;

pub struct PriceAssessmentHandler;

impl PriceAssessmentHandler {
    fn items(node: &FlowNode, ctx: &FlowContext) -> Result<Vec<Value>, NodeError> {
        if let Some(Value::Array(items)) = node.config_value("items") {
            return Ok(items.clone());
        }
        let path = node.config_str("itemsPath").unwrap_or("items");
        match ctx.get_path(path) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(NodeError::missing_input(&node.id, path)),
        }
    }

    pub fn tier(score: f64) -> &'static str {
        if score <= GOOD_THRESHOLD {
            "good"
        } else if score <= FAIR_THRESHOLD {
            "fair"
        } else {
            "poor"
        }
    }
}

impl NodeHandler for PriceAssessmentHandler {
    fn node_type(&self) -> &str {
        "V.PDA"
    }

    fn execute(&self, node: &FlowNode, ctx: &FlowContext) -> Result<Value, NodeError> {
        let items = Self::items(node, ctx)?;
        let deflator = node
            .config_value("deflator")
            .and_then(as_number)
            .unwrap_or(DEFAULT_DEFLATOR);

        let mut nominal = 0.0;
        let mut deltas = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let price = item.get("price").and_then(as_number).ok_or_else(|| {
                NodeError::invalid_config(&node.id, format!("item {} has no numeric price", i))
            })?;
            nominal += price;

            if let Some(usual) = item.get("usual").and_then(as_number).filter(|u| *u > 0.0) {
                deltas.push((price - usual) / usual);
            }
        }

        let score = if deltas.is_empty() {
            0.0
        } else {
            deltas.iter().sum::<f64>() / deltas.len() as f64
        };

        Ok(json!({
            "nominal": round_to(nominal, 2),
            "real": round_to(nominal * deflator, 2),
            "quality": Self::tier(score),
            "qualityScore": round_to(score, 4),
        }))
    }
}
