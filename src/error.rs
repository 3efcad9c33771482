// SPDX-License-Identifier: MIT

//! Typed error handling for bovi-flow
//!
//! Flow-level failures (`FlowError`) and node-level failures (`NodeError`)
//! are kept apart so the runner can tell a broken graph from a broken step.

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, BoviError>;

/// Top-level error type for bovi-flow
#[derive(Debug, Error)]
pub enum BoviError {
    /// Flow lifecycle and structure errors
    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    /// Node execution errors
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    /// Configuration errors (bad env values, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Flow-level errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FlowError {
    /// Operation on a flow id that was never loaded (or was stopped)
    #[error("Flow '{0}' is not loaded")]
    NotLoaded(String),

    /// Operation that requires a running flow
    #[error("Flow '{0}' is not running")]
    NotRunning(String),

    /// Structural problem found while loading
    #[error("Invalid flow '{flow}': {reason}")]
    Validation { flow: String, reason: String },

    /// Node id referenced at runtime but missing from the spec
    #[error("Node '{node}' not found in flow '{flow}'")]
    NodeNotFound { flow: String, node: String },

    /// Interrupt aimed at a node with no countdown waiting on it
    #[error("Node '{node}' in flow '{flow}' has no pending countdown")]
    NoTimerPending { flow: String, node: String },
}

/// Node execution errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NodeError {
    /// No handler registered for the node type
    #[error("Unknown node type: {0}")]
    UnknownType(String),

    /// Node configuration is present but unusable
    #[error("Invalid config for node '{node}': {reason}")]
    InvalidConfig { node: String, reason: String },

    /// Required input was not found in config or context
    #[error("Missing input for node '{node}': {input}")]
    MissingInput { node: String, input: String },
}

impl BoviError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl FlowError {
    pub fn validation(flow: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            flow: flow.into(),
            reason: reason.into(),
        }
    }
}

impl NodeError {
    pub fn invalid_config(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_input(node: impl Into<String>, input: impl Into<String>) -> Self {
        Self::MissingInput {
            node: node.into(),
            input: input.into(),
        }
    }
}

impl From<&str> for BoviError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for BoviError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
