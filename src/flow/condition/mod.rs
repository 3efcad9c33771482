// SPDX-License-Identifier: MIT

//! Condition evaluation for flow edges
//!
//! Edge conditions are parsed into a closed AST and interpreted against the
//! flow context; nothing is ever compiled or executed dynamically.
//! Conditions are simple expressions like:
//! - `always`
//! - `{{context.nodeOutputs.pda.quality}} == 'poor'`
//! - `budget > 100 and not paused`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal, Operand};
pub use evaluator::{evaluate, is_truthy};
pub use parser::{parse, ConditionError};

use crate::flow::context::FlowContext;

/// Parse and evaluate in one step. Unparseable conditions count as false.
pub fn check(condition: &str, ctx: &FlowContext) -> bool {
    match parse(condition) {
        Ok(expr) => evaluate(&expr, ctx),
        Err(e) => {
            log::warn!("Skipping edge with bad condition: {}", e);
            false
        }
    }
}
