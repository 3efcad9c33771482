// SPDX-License-Identifier: MIT

//! Load-time structural checks for flow definitions

use std::collections::HashSet;

use crate::error::FlowError;
use crate::flow::condition;
use crate::flow::types::FlowSpec;

/// Reject flows the runner cannot traverse unambiguously.
///
/// Edge conditions that do not parse are only warned about; at runtime they
/// evaluate to false.
pub fn validate(spec: &FlowSpec) -> Result<(), FlowError> {
    if spec.id.trim().is_empty() {
        return Err(FlowError::validation("", "flow id is empty"));
    }

    let mut ids = HashSet::new();
    for node in &spec.nodes {
        if node.id.trim().is_empty() {
            return Err(FlowError::validation(&spec.id, "node with empty id"));
        }
        if !ids.insert(node.id.as_str()) {
            return Err(FlowError::validation(
                &spec.id,
                format!("duplicate node id '{}'", node.id),
            ));
        }
    }

    for edge in &spec.edges {
        for end in [&edge.from, &edge.to] {
            if !ids.contains(end.as_str()) {
                return Err(FlowError::validation(
                    &spec.id,
                    format!("edge {} -> {} references unknown node '{}'", edge.from, edge.to, end),
                ));
            }
        }
        if let Err(e) = condition::parse(&edge.condition) {
            log::warn!(
                "Flow {}: edge {} -> {} will never be taken: {}",
                spec.id,
                edge.from,
                edge.to,
                e
            );
        }
    }

    if spec.nodes.is_empty() {
        return Ok(());
    }
    let entries = spec.entry_nodes();
    match entries.len() {
        0 => Err(FlowError::validation(&spec.id, "no start node (every node has an incoming edge)")),
        1 => Ok(()),
        _ => {
            let names: Vec<&str> = entries.iter().map(|n| n.id.as_str()).collect();
            Err(FlowError::validation(
                &spec.id,
                format!("multiple start nodes: {}", names.join(", ")),
            ))
        }
    }
}
