// SPDX-License-Identifier: MIT

//! Typed events carried by the bus
//!
//! Every variant knows its own wire name. Timer events are namespaced by
//! mode (`V.default.started`), everything else uses a fixed name.

use crate::flow::types::Mode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

pub const FLOW_STARTED: &str = "flow.started";
pub const FLOW_COMPLETED: &str = "flow.completed";
pub const FLOW_ERROR: &str = "flow.error";
pub const FLOW_STOPPED: &str = "flow.stopped";
pub const UI_COUNTDOWN_TICK: &str = "ui.countdown.tick";
pub const UI_ACTION_OVERRIDE: &str = "ui.action.override";
pub const NODE_EXECUTED: &str = "node.executed";

/// Lifecycle phase of a default-action countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Started,
    Ticked,
    Cancelled,
    Applied,
}

impl TimerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerPhase::Started => "started",
            TimerPhase::Ticked => "ticked",
            TimerPhase::Cancelled => "cancelled",
            TimerPhase::Applied => "applied",
        }
    }
}

/// Name of a timer event for one mode, e.g. `I.default.applied`
pub fn timer_event(mode: Mode, phase: TimerPhase) -> String {
    format!("{}.default.{}", mode, phase.as_str())
}

/// Events published on the bus
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BusEvent {
    TimerStarted {
        mode: Mode,
        flow_id: String,
        node_id: String,
        seconds: u64,
    },
    TimerTicked {
        mode: Mode,
        flow_id: String,
        node_id: String,
        remaining: u64,
    },
    TimerCancelled {
        mode: Mode,
        flow_id: String,
        node_id: String,
        reason: String,
    },
    TimerApplied {
        mode: Mode,
        flow_id: String,
        node_id: String,
    },
    FlowStarted {
        flow_id: String,
        start_node: Option<String>,
        started_at: DateTime<Utc>,
    },
    FlowCompleted {
        flow_id: String,
        outputs: HashMap<String, Value>,
    },
    FlowError {
        flow_id: String,
        node_id: Option<String>,
        message: String,
    },
    FlowStopped {
        flow_id: String,
    },
    CountdownTick {
        flow_id: String,
        node_id: String,
        remaining: u64,
    },
    ActionOverride {
        flow_id: String,
        node_id: String,
        action: String,
    },
    /// Informational only; consumers must not drive state from it
    NodeExecuted {
        flow_id: String,
        node_id: String,
        node_type: String,
        output: Value,
    },
}

impl BusEvent {
    /// The exact name listeners subscribe to
    pub fn name(&self) -> String {
        match self {
            BusEvent::TimerStarted { mode, .. } => timer_event(*mode, TimerPhase::Started),
            BusEvent::TimerTicked { mode, .. } => timer_event(*mode, TimerPhase::Ticked),
            BusEvent::TimerCancelled { mode, .. } => timer_event(*mode, TimerPhase::Cancelled),
            BusEvent::TimerApplied { mode, .. } => timer_event(*mode, TimerPhase::Applied),
            BusEvent::FlowStarted { .. } => FLOW_STARTED.to_string(),
            BusEvent::FlowCompleted { .. } => FLOW_COMPLETED.to_string(),
            BusEvent::FlowError { .. } => FLOW_ERROR.to_string(),
            BusEvent::FlowStopped { .. } => FLOW_STOPPED.to_string(),
            BusEvent::CountdownTick { .. } => UI_COUNTDOWN_TICK.to_string(),
            BusEvent::ActionOverride { .. } => UI_ACTION_OVERRIDE.to_string(),
            BusEvent::NodeExecuted { .. } => NODE_EXECUTED.to_string(),
        }
    }

    /// Flow the event belongs to
    pub fn flow_id(&self) -> &str {
        match self {
            BusEvent::TimerStarted { flow_id, .. }
            | BusEvent::TimerTicked { flow_id, .. }
            | BusEvent::TimerCancelled { flow_id, .. }
            | BusEvent::TimerApplied { flow_id, .. }
            | BusEvent::FlowStarted { flow_id, .. }
            | BusEvent::FlowCompleted { flow_id, .. }
            | BusEvent::FlowError { flow_id, .. }
            | BusEvent::FlowStopped { flow_id }
            | BusEvent::CountdownTick { flow_id, .. }
            | BusEvent::ActionOverride { flow_id, .. }
            | BusEvent::NodeExecuted { flow_id, .. } => flow_id,
        }
    }

    /// Node the event refers to, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            BusEvent::TimerStarted { node_id, .. }
            | BusEvent::TimerTicked { node_id, .. }
            | BusEvent::TimerCancelled { node_id, .. }
            | BusEvent::TimerApplied { node_id, .. }
            | BusEvent::CountdownTick { node_id, .. }
            | BusEvent::ActionOverride { node_id, .. }
            | BusEvent::NodeExecuted { node_id, .. } => Some(node_id),
            BusEvent::FlowError { node_id, .. } => node_id.as_deref(),
            BusEvent::FlowStarted { .. }
            | BusEvent::FlowCompleted { .. }
            | BusEvent::FlowStopped { .. } => None,
        }
    }

    /// Payload as JSON, for logging and the CLI
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
