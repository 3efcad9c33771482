// SPDX-License-Identifier: MIT

//! Condition expression evaluator

use super::ast::{CompareOp, Expression, Literal, Operand};
use crate::flow::context::FlowContext;
use serde_json::Value;

/// Evaluate a condition expression against a flow context
pub fn evaluate(expr: &Expression, ctx: &FlowContext) -> bool {
    match expr {
        Expression::True => true,
        Expression::False => false,
        Expression::Truthy(path) => is_truthy(ctx.get_path(path).as_ref()),
        Expression::Compare { left, op, right } => {
            let left = resolve(left, ctx);
            let right = resolve(right, ctx);
            evaluate_compare(left.as_ref(), *op, right.as_ref())
        }
        Expression::And(left, right) => evaluate(left, ctx) && evaluate(right, ctx),
        Expression::Or(left, right) => evaluate(left, ctx) || evaluate(right, ctx),
        Expression::Not(inner) => !evaluate(inner, ctx),
    }
}

/// JavaScript-style truthiness; missing values are falsy
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn resolve(operand: &Operand, ctx: &FlowContext) -> Option<Value> {
    match operand {
        Operand::Path(path) => ctx.get_path(path),
        Operand::Literal(Literal::Null) => None,
        Operand::Literal(lit) => Some(lit.to_value()),
    }
}

fn evaluate_compare(left: Option<&Value>, op: CompareOp, right: Option<&Value>) -> bool {
    match op {
        CompareOp::Eq => values_equal(left, right),
        CompareOp::NotEq => !values_equal(left, right),
        CompareOp::Gt => compare_numbers(left, right, |a, b| a > b),
        CompareOp::Gte => compare_numbers(left, right, |a, b| a >= b),
        CompareOp::Lt => compare_numbers(left, right, |a, b| a < b),
        CompareOp::Lte => compare_numbers(left, right, |a, b| a <= b),
        CompareOp::Contains => check_contains(left, right),
    }
}

fn values_equal(left: Option<&Value>, right: Option<&Value>) -> bool {
    let left = left.filter(|v| !v.is_null());
    let right = right.filter(|v| !v.is_null());
    match (left, right) {
        (None, None) => true,
        // 2 and 2.0 are equal
        (Some(Value::Number(a)), Some(Value::Number(b))) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn compare_numbers<F>(left: Option<&Value>, right: Option<&Value>, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (left.and_then(as_number), right.and_then(as_number)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// Numbers, or strings holding a finite number (ordering comparisons only)
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn check_contains(left: Option<&Value>, right: Option<&Value>) -> bool {
    match (left, right) {
        // String contains substring
        (Some(Value::String(s)), Some(Value::String(substr))) => s.contains(substr.as_str()),
        // Array contains value
        (Some(Value::Array(arr)), Some(needle)) => arr.iter().any(|v| values_equal(Some(v), Some(needle))),
        // Object contains key
        (Some(Value::Object(obj)), Some(Value::String(key))) => obj.contains_key(key),
        _ => false,
    }
}
