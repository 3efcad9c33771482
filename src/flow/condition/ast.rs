// SPDX-License-Identifier: MIT

//! Abstract Syntax Tree for edge conditions

use serde_json::Value;

/// A condition expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Comparison expression: left op right
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    /// Bare path, true when the value is truthy
    Truthy(String),
    /// Logical AND
    And(Box<Expression>, Box<Expression>),
    /// Logical OR
    Or(Box<Expression>, Box<Expression>),
    /// Logical NOT
    Not(Box<Expression>),
    /// Literal true
    True,
    /// Literal false
    False,
}

/// One side of a comparison
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Dotted context path, e.g. `nodeOutputs.detect.violation_detected`
    Path(String),
    Literal(Literal),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    /// `==` or `===`
    Eq,
    /// `!=` or `!==`
    NotEq,
    /// >
    Gt,
    /// >=
    Gte,
    /// <
    Lt,
    /// <=
    Lte,
    /// contains (for strings and arrays)
    Contains,
}

/// Literal values in expressions
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Boolean(bool),
    Null,
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::String(s) => Value::String(s.clone()),
            Literal::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Literal::Boolean(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::NotEq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
            CompareOp::Contains => write!(f, "contains"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compare_op_display() {
        assert_eq!(format!("{}", CompareOp::Eq), "==");
        assert_eq!(format!("{}", CompareOp::NotEq), "!=");
        assert_eq!(format!("{}", CompareOp::Gte), ">=");
        assert_eq!(format!("{}", CompareOp::Contains), "contains");
    }

    #[test]
    fn test_literal_to_value() {
        assert_eq!(Literal::String("a".to_string()).to_value(), json!("a"));
        assert_eq!(Literal::Number(1.5).to_value(), json!(1.5));
        assert_eq!(Literal::Boolean(true).to_value(), json!(true));
        assert_eq!(Literal::Null.to_value(), Value::Null);
        assert_eq!(Literal::Number(f64::NAN).to_value(), Value::Null);
    }
}
