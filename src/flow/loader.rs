// SPDX-License-Identifier: MIT

//! Flow loader - JSON and YAML flow definitions
//!
//! This module handles loading flow definitions from disk or strings. The
//! file extension picks the format; parsed flows are validated before they
//! are returned.

use super::types::FlowSpec;
use super::validate::validate;
use crate::error::{BoviError, Result};
use std::fs;
use std::path::Path;

/// Loads flow definitions from JSON or YAML files
pub struct FlowLoader;

impl FlowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load and validate a flow definition from a `.json`, `.yaml` or `.yml` file
    pub fn load_flow_file<P: AsRef<Path>>(&self, path: P) -> Result<FlowSpec> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        let spec = match extension.as_deref() {
            Some("json") => Self::parse_json(&content)?,
            Some("yaml") | Some("yml") => Self::parse_yaml(&content)?,
            _ => {
                return Err(BoviError::config(format!(
                    "unsupported flow file '{}': expected .json, .yaml or .yml",
                    path.display()
                )))
            }
        };

        log::info!(
            "Loaded flow {} ({} nodes, {} edges) from {}",
            spec.id,
            spec.nodes.len(),
            spec.edges.len(),
            path.display()
        );
        Ok(spec)
    }

    /// Parse and validate a flow definition from a JSON string
    pub fn parse_json(content: &str) -> Result<FlowSpec> {
        let spec: FlowSpec = serde_json::from_str(content)?;
        validate(&spec)?;
        Ok(spec)
    }

    /// Parse and validate a flow definition from a YAML string
    pub fn parse_yaml(content: &str) -> Result<FlowSpec> {
        let spec: FlowSpec = serde_yaml::from_str(content)?;
        validate(&spec)?;
        Ok(spec)
    }
}

impl Default for FlowLoader {
    fn default() -> Self {
        Self::new()
    }
}
