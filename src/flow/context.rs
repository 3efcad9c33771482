// SPDX-License-Identifier: MIT

//! Per-flow runtime state
//!
//! `FlowContext` is the mutable half of a flow (the `FlowSpec` is the
//! immutable half). `ContextManager` owns one context per flow id and hands
//! out snapshots, so no caller can hold a reference into another flow.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use crate::error::FlowError;

/// Lifecycle state of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowStatus {
    Idle,
    Running,
    Completed,
    Error,
}

/// Mutable execution state of one flow
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContext {
    pub flow_id: String,
    pub current_node: Option<String>,
    /// Last output of each executed node
    pub node_outputs: HashMap<String, Value>,
    /// Node ids in the order their outputs were recorded
    pub history: Vec<String>,
    pub active_timers: HashSet<String>,
    pub user_overrides: HashMap<String, bool>,
    pub start_time: Option<DateTime<Utc>>,
    pub timed_defaults_enabled: bool,
    pub completed: bool,
    pub error: Option<String>,
    /// Flow context data (spec defaults merged with start overrides)
    pub data: Map<String, Value>,
}

impl FlowContext {
    pub fn new(flow_id: impl Into<String>, timed_defaults_enabled: bool) -> Self {
        Self {
            flow_id: flow_id.into(),
            current_node: None,
            node_outputs: HashMap::new(),
            history: Vec::new(),
            active_timers: HashSet::new(),
            user_overrides: HashMap::new(),
            start_time: None,
            timed_defaults_enabled,
            completed: false,
            error: None,
            data: Map::new(),
        }
    }

    pub fn status(&self) -> FlowStatus {
        if self.error.is_some() {
            FlowStatus::Error
        } else if self.completed {
            FlowStatus::Completed
        } else if self.current_node.is_some() || self.start_time.is_some() {
            FlowStatus::Running
        } else {
            FlowStatus::Idle
        }
    }

    /// Running flows are neither completed nor errored
    pub fn is_active(&self) -> bool {
        !self.completed && self.error.is_none()
    }

    /// Store a node's output, replacing any earlier one
    pub fn record_output(&mut self, node_id: &str, output: Value) {
        self.node_outputs.insert(node_id.to_string(), output);
        self.history.retain(|id| id != node_id);
        self.history.push(node_id.to_string());
    }

    /// The most recently stored node output
    pub fn last_output(&self) -> Option<(&str, &Value)> {
        let id = self.history.last()?;
        self.node_outputs.get(id).map(|v| (id.as_str(), v))
    }

    pub fn mark_override(&mut self, node_id: &str) {
        self.user_overrides.insert(node_id.to_string(), true);
    }

    pub fn was_overridden(&self, node_id: &str) -> bool {
        self.user_overrides.get(node_id).copied().unwrap_or(false)
    }

    /// Resolve a dotted path (e.g. `context.nodeOutputs.pda.real`).
    ///
    /// A leading `context.` is ignored. Known context fields are matched
    /// first; any other root is looked up in `data`.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        let path = path.trim();
        let path = path.strip_prefix("context.").unwrap_or(path);
        let mut parts = path.split('.').filter(|p| !p.is_empty());
        let root = parts.next()?;

        let base: Value = match root {
            "flowId" => Value::String(self.flow_id.clone()),
            "currentNode" => self.current_node.clone().map(Value::String)?,
            "completed" => Value::Bool(self.completed),
            "error" => self.error.clone().map(Value::String)?,
            "timedDefaultsEnabled" => Value::Bool(self.timed_defaults_enabled),
            "nodeOutputs" | "outputs" => {
                let Some(node) = parts.next() else {
                    return Some(Value::Object(
                        self.node_outputs
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                    ));
                };
                return lookup(self.node_outputs.get(node)?, parts).cloned();
            }
            "userOverrides" => {
                let Some(node) = parts.next() else {
                    return Some(Value::Object(
                        self.user_overrides
                            .iter()
                            .map(|(k, v)| (k.clone(), Value::Bool(*v)))
                            .collect(),
                    ));
                };
                return Some(Value::Bool(self.was_overridden(node)));
            }
            other => return lookup(self.data.get(other)?, parts).cloned(),
        };

        lookup(&base, parts).cloned()
    }
}

/// Walk object keys and array indices
pub fn lookup<'a, 'p>(
    value: &'a Value,
    parts: impl Iterator<Item = &'p str>,
) -> Option<&'a Value> {
    let mut current = value;
    for part in parts {
        current = match current {
            Value::Object(obj) => obj.get(part)?,
            Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Owner of every flow context, keyed by flow id
#[derive(Debug, Default)]
pub struct ContextManager {
    contexts: Mutex<HashMap<String, FlowContext>>,
}

impl ContextManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh context, replacing any previous one for this flow
    pub fn create(&self, flow_id: &str, timed_defaults_enabled: bool) -> FlowContext {
        let ctx = FlowContext::new(flow_id, timed_defaults_enabled);
        self.contexts.lock().insert(flow_id.to_string(), ctx.clone());
        ctx
    }

    /// Snapshot of a context
    pub fn get(&self, flow_id: &str) -> Option<FlowContext> {
        self.contexts.lock().get(flow_id).cloned()
    }

    pub fn contains(&self, flow_id: &str) -> bool {
        self.contexts.lock().contains_key(flow_id)
    }

    /// Mutate a context in place.
    ///
    /// The closure runs under the manager's lock and must not call back
    /// into the manager.
    pub fn update<R>(
        &self,
        flow_id: &str,
        f: impl FnOnce(&mut FlowContext) -> R,
    ) -> Result<R, FlowError> {
        let mut contexts = self.contexts.lock();
        let ctx = contexts
            .get_mut(flow_id)
            .ok_or_else(|| FlowError::NotLoaded(flow_id.to_string()))?;
        Ok(f(ctx))
    }

    pub fn remove(&self, flow_id: &str) -> Option<FlowContext> {
        self.contexts.lock().remove(flow_id)
    }

    pub fn get_path(&self, flow_id: &str, path: &str) -> Option<Value> {
        self.contexts.lock().get(flow_id)?.get_path(path)
    }

    /// Most recently stored node output of a flow
    pub fn last_output(&self, flow_id: &str) -> Option<Value> {
        let contexts = self.contexts.lock();
        contexts
            .get(flow_id)?
            .last_output()
            .map(|(_, value)| value.clone())
    }

    pub fn record_output(&self, flow_id: &str, node_id: &str, output: Value) -> Result<(), FlowError> {
        self.update(flow_id, |ctx| ctx.record_output(node_id, output))
    }

    pub fn mark_override(&self, flow_id: &str, node_id: &str) -> Result<(), FlowError> {
        self.update(flow_id, |ctx| ctx.mark_override(node_id))
    }

    pub fn add_timer(&self, flow_id: &str, timer_id: &str) -> Result<(), FlowError> {
        self.update(flow_id, |ctx| {
            ctx.active_timers.insert(timer_id.to_string());
        })
    }

    pub fn remove_timer(&self, flow_id: &str, timer_id: &str) -> bool {
        self.update(flow_id, |ctx| ctx.active_timers.remove(timer_id))
            .unwrap_or(false)
    }

    /// Empty the active timer set, calling `cancel` for each id after the
    /// lock is released. Returns how many ids were cleared.
    pub fn clear_timers(&self, flow_id: &str, mut cancel: impl FnMut(&str)) -> usize {
        let ids: Vec<String> = self
            .update(flow_id, |ctx| ctx.active_timers.drain().collect())
            .unwrap_or_default();
        for id in &ids {
            cancel(id);
        }
        ids.len()
    }

    /// Flow ids that exist, are not completed and have no error
    pub fn active_flows(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .contexts
            .lock()
            .values()
            .filter(|ctx| ctx.is_active())
            .map(|ctx| ctx.flow_id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }
}
