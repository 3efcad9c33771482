// SPDX-License-Identifier: MIT

//! Flow definition types
//!
//! These mirror the JSON documents served to the UI. Everything except the
//! flow id and node ids/types is optional so hand-written flows stay short.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::NodeError;

/// Behavioral stance a node belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// Balanced
    B,
    /// Obligated
    O,
    /// Value
    V,
    /// Immediate
    I,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::B, Mode::O, Mode::V, Mode::I];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::B => "B",
            Mode::O => "O",
            Mode::V => "V",
            Mode::I => "I",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "B" => Ok(Mode::B),
            "O" => Ok(Mode::O),
            "V" => Ok(Mode::V),
            "I" => Ok(Mode::I),
            other => Err(NodeError::UnknownType(other.to_string())),
        }
    }
}

/// A parsed `"<Mode>.<Operation>"` node type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeType {
    pub mode: Mode,
    pub operation: String,
}

impl NodeType {
    pub fn parse(raw: &str) -> Result<Self, NodeError> {
        let (mode, operation) = raw
            .split_once('.')
            .filter(|(_, op)| !op.is_empty())
            .ok_or_else(|| NodeError::UnknownType(raw.to_string()))?;
        let mode = mode
            .parse::<Mode>()
            .map_err(|_| NodeError::UnknownType(raw.to_string()))?;
        Ok(Self {
            mode,
            operation: operation.to_string(),
        })
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.mode, self.operation)
    }
}

/// A complete flow definition
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowSpec {
    /// Unique flow id
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Initial context data, merged with start-time overrides
    #[serde(default)]
    pub context: Map<String, Value>,
    #[serde(default)]
    pub nodes: Vec<FlowNode>,
    #[serde(default)]
    pub edges: Vec<FlowEdge>,
    #[serde(default)]
    pub metadata: FlowMetadata,
}

/// Descriptive metadata attached to a flow
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowMetadata {
    #[serde(default)]
    pub version: String,
    /// Modes this flow is offered in
    #[serde(default)]
    pub modes: Vec<Mode>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A single step in a flow
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowNode {
    pub id: String,
    /// Two-part tag such as `V.PDA`
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub config: Option<Value>,
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Countdown before the default action applies, in seconds
    #[serde(default)]
    pub timeout: Option<f64>,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            label: String::new(),
            config: None,
            outputs: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Parsed node type
    pub fn parsed_type(&self) -> Result<NodeType, NodeError> {
        NodeType::parse(&self.node_type)
    }

    /// Countdown length; the top-level field wins over `config.timeout`
    pub fn timeout_seconds(&self) -> Option<f64> {
        self.timeout.or_else(|| {
            self.config
                .as_ref()
                .and_then(|c| c.get("timeout"))
                .and_then(Value::as_f64)
        })
    }

    /// Look up a config key
    pub fn config_value(&self, key: &str) -> Option<&Value> {
        self.config.as_ref().and_then(|c| c.get(key))
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config_value(key).and_then(Value::as_str)
    }
}

/// A directed, conditional transition between two nodes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowEdge {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub label: String,
    /// `always`, `never`, or a condition expression
    #[serde(default = "default_condition")]
    pub condition: String,
}

fn default_condition() -> String {
    "always".to_string()
}

impl FlowEdge {
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::when(from, to, "always")
    }

    pub fn when(
        from: impl Into<String>,
        to: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            label: String::new(),
            condition: condition.into(),
        }
    }
}

impl FlowSpec {
    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges leaving `node_id`, in declaration order
    pub fn outgoing<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a FlowEdge> + 'a {
        self.edges.iter().filter(move |e| e.from == node_id)
    }

    /// Nodes with no incoming edge, in declaration order
    pub fn entry_nodes(&self) -> Vec<&FlowNode> {
        self.nodes
            .iter()
            .filter(|n| !self.edges.iter().any(|e| e.to == n.id))
            .collect()
    }
}
