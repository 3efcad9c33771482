// SPDX-License-Identifier: MIT

//! `B.Sweep`: evaluate KPI formulas over the flow context
//!
//! Formulas are `last(path)`, `count(path)` or `sum(path)`.

use serde_json::{json, Map, Value};

use super::{as_number, NodeHandler};
use crate::error::NodeError;
use crate::flow::context::FlowContext;
use crate::flow::types::FlowNode;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Aggregate {
    Last,
    Count,
    Sum,
}

fn parse_formula(formula: &str) -> Option<(Aggregate, &str)> {
    let formula = formula.trim();
    let open = formula.find('(')?;
    let inner = formula.strip_suffix(')')?.get(open + 1..)?.trim();
    if inner.is_empty() {
        return None;
    }
    let aggregate = match formula[..open].trim() {
        "last" => Aggregate::Last,
        "count" => Aggregate::Count,
        "sum" => Aggregate::Sum,
        _ => return None,
    };
    Some((aggregate, inner))
}

fn apply(aggregate: Aggregate, value: Option<Value>) -> Value {
    match aggregate {
        Aggregate::Last => match value {
            Some(Value::Array(items)) => items.last().cloned().unwrap_or(Value::Null),
            Some(other) => other,
            None => Value::Null,
        },
        Aggregate::Count => {
            let count = match value {
                None | Some(Value::Null) => 0,
                Some(Value::Array(items)) => items.len(),
                Some(Value::Object(map)) => map.len(),
                Some(_) => 1,
            };
            json!(count)
        }
        Aggregate::Sum => {
            let sum: f64 = match value {
                Some(Value::Array(items)) => items.iter().filter_map(as_number).sum(),
                Some(other) => as_number(&other).unwrap_or(0.0),
                None => 0.0,
            };
            json!(sum)
        }
    }
}

pub struct SweepHandler;

impl NodeHandler for SweepHandler {
    fn node_type(&self) -> &str {
        "B.Sweep"
    }

    fn execute(&self, node: &FlowNode, ctx: &FlowContext) -> Result<Value, NodeError> {
        let formulas = match node.config_value("kpis") {
            Some(Value::Object(formulas)) => formulas.clone(),
            Some(_) => return Err(NodeError::invalid_config(&node.id, "kpis must be an object")),
            None => Map::new(),
        };

        let mut kpis = Map::new();
        for (name, formula) in formulas {
            let value = match formula.as_str().and_then(parse_formula) {
                Some((aggregate, path)) => apply(aggregate, ctx.get_path(path)),
                None => {
                    log::warn!("KPI '{}' in node {} has unsupported formula {}", name, node.id, formula);
                    Value::Null
                }
            };
            kpis.insert(name, value);
        }

        Ok(json!({ "kpis": kpis }))
    }
}
