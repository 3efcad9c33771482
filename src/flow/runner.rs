// SPDX-License-Identifier: MIT

//! Flow execution
//!
//! `FlowRunner` walks a flow's graph one node at a time. Untimed nodes run
//! synchronously on the caller. A timed node hands control to a countdown
//! and the flow resumes from the countdown's callback, or from a user
//! override. Each node waiting on a countdown has one `Pending` entry;
//! whoever removes that entry (expiry or override) is the one that advances
//! the flow.

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::bus::{timer_event, BusEvent, EventBus, Subscription, TimerPhase};
use crate::config::RunnerConfig;
use crate::error::{BoviError, FlowError, Result};
use crate::flow::condition;
use crate::flow::context::{ContextManager, FlowContext, FlowStatus};
use crate::flow::nodes::NodeExecutor;
use crate::flow::types::{FlowNode, FlowSpec, Mode};
use crate::flow::validate::validate;
use crate::timer::{TimerManager, REASON_REPLACED};

pub const REASON_FLOW_COMPLETED: &str = "flow_completed";
pub const REASON_FLOW_ERROR: &str = "flow_error";
pub const REASON_FLOW_STOPPED: &str = "flow_stopped";
pub const REASON_FLOW_RESTARTED: &str = "flow_restarted";
pub const REASON_FLOW_RELOADED: &str = "flow_reloaded";
pub const REASON_USER_OVERRIDE: &str = "user_override";
pub const REASON_RUNNER_DROPPED: &str = "runner_dropped";

/// Cancellations the runner issues itself; they never count as user overrides
const INTERNAL_REASONS: [&str; 7] = [
    REASON_REPLACED,
    REASON_FLOW_COMPLETED,
    REASON_FLOW_ERROR,
    REASON_FLOW_STOPPED,
    REASON_FLOW_RESTARTED,
    REASON_FLOW_RELOADED,
    REASON_RUNNER_DROPPED,
];

type NodeKey = (String, String);

/// A timed node waiting for its countdown or a user interrupt
struct Pending {
    token: String,
    timer_id: Option<String>,
    /// False once the countdown was cancelled without an override
    counting: bool,
    subscription: Option<Subscription>,
}

enum Step {
    Next(String),
    Halted,
}

struct RunnerInner {
    bus: EventBus,
    timers: TimerManager,
    contexts: ContextManager,
    executor: NodeExecutor,
    config: RunnerConfig,
    specs: Mutex<HashMap<String, Arc<FlowSpec>>>,
    pending: Mutex<HashMap<NodeKey, Pending>>,
    mirrors: Mutex<Vec<Subscription>>,
}

impl Drop for RunnerInner {
    fn drop(&mut self) {
        for subscription in self.mirrors.get_mut().drain(..) {
            subscription.unsubscribe();
        }
        // Countdown tasks outlive the runner unless aborted here
        for ((flow_id, node_id), pending) in self.pending.get_mut().drain() {
            if let Some(subscription) = pending.subscription {
                subscription.unsubscribe();
            }
            self.timers
                .cancel_by_id(&flow_id, &node_id, REASON_RUNNER_DROPPED);
        }
    }
}

/// Drives loaded flows from their start node to completion.
///
/// Cloning is cheap; every clone drives the same set of flows.
#[derive(Clone)]
pub struct FlowRunner {
    inner: Arc<RunnerInner>,
}

impl FlowRunner {
    /// Runner publishing on `bus`, with the built-in node handlers
    pub fn new(bus: EventBus, config: RunnerConfig) -> Self {
        let inner = Arc::new(RunnerInner {
            timers: TimerManager::with_tick_interval(bus.clone(), config.tick_interval),
            executor: NodeExecutor::with_config(Some(bus.clone()), &config),
            contexts: ContextManager::new(),
            specs: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            mirrors: Mutex::new(Vec::new()),
            bus,
            config,
        });
        let runner = Self { inner };
        runner.mirror_ticks();
        runner
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn timers(&self) -> &TimerManager {
        &self.inner.timers
    }

    /// Executor used for every node; register custom handlers here
    pub fn executor(&self) -> &NodeExecutor {
        &self.inner.executor
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.inner.config
    }

    /// Re-publish every countdown tick of a known flow as `ui.countdown.tick`
    fn mirror_ticks(&self) {
        let mut mirrors = self.inner.mirrors.lock();
        for mode in Mode::ALL {
            let weak = Arc::downgrade(&self.inner);
            let subscription =
                self.inner
                    .bus
                    .on(timer_event(mode, TimerPhase::Ticked), move |event| {
                        let BusEvent::TimerTicked {
                            flow_id,
                            node_id,
                            remaining,
                            ..
                        } = event
                        else {
                            return;
                        };
                        let Some(inner) = weak.upgrade() else {
                            return;
                        };
                        if inner.contexts.contains(flow_id) {
                            log::debug!("Flow {}: {} has {}s left", flow_id, node_id, remaining);
                            inner.bus.emit(BusEvent::CountdownTick {
                                flow_id: flow_id.clone(),
                                node_id: node_id.clone(),
                                remaining: *remaining,
                            });
                        }
                    });
            mirrors.push(subscription);
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Validate and register a flow, giving it a fresh idle context.
    ///
    /// Loading an id that is already known replaces it; its countdowns are
    /// cancelled first.
    pub fn load_flow(&self, spec: FlowSpec) -> Result<()> {
        validate(&spec)?;
        let flow_id = spec.id.clone();

        self.cancel_pending(&flow_id, REASON_FLOW_RELOADED);
        self.inner
            .specs
            .lock()
            .insert(flow_id.clone(), Arc::new(spec));
        self.inner
            .contexts
            .create(&flow_id, self.inner.config.timed_defaults);

        log::info!("Loaded flow {}", flow_id);
        Ok(())
    }

    /// Start (or restart) a loaded flow.
    ///
    /// `overrides` are shallow-merged over the flow's context data. If a
    /// node fails before the flow suspends, the flow is moved to the error
    /// state, `flow.error` is emitted and the node's error is returned.
    pub fn start_flow(&self, flow_id: &str, overrides: Option<Map<String, Value>>) -> Result<()> {
        let spec = self
            .flow_spec(flow_id)
            .ok_or_else(|| FlowError::NotLoaded(flow_id.to_string()))?;

        self.cancel_pending(flow_id, REASON_FLOW_RESTARTED);
        let timed = self
            .inner
            .contexts
            .get(flow_id)
            .map(|ctx| ctx.timed_defaults_enabled)
            .unwrap_or(self.inner.config.timed_defaults);

        let start_node = spec.entry_nodes().first().map(|n| n.id.clone());
        let started_at = Utc::now();
        self.inner.contexts.create(flow_id, timed);
        self.inner.contexts.update(flow_id, |ctx| {
            ctx.data = spec.context.clone();
            if let Some(overrides) = overrides {
                for (key, value) in overrides {
                    ctx.data.insert(key, value);
                }
            }
            ctx.start_time = Some(started_at);
            ctx.current_node = start_node.clone();
        })?;

        log::info!(
            "Starting flow {} at {}",
            flow_id,
            start_node.as_deref().unwrap_or("<empty>")
        );
        self.inner.bus.emit(BusEvent::FlowStarted {
            flow_id: flow_id.to_string(),
            start_node: start_node.clone(),
            started_at,
        });

        match start_node {
            Some(node_id) => self.run_from(&spec, flow_id, node_id),
            None => {
                self.complete_flow(flow_id);
                Ok(())
            }
        }
    }

    /// Stop a pending countdown without applying anything.
    ///
    /// The flow stays on the node until `override_action` is called.
    pub fn cancel_timeout(&self, flow_id: &str, node_id: &str, reason: &str) -> Result<()> {
        self.require_running(flow_id)?;
        let key = (flow_id.to_string(), node_id.to_string());
        let no_timer = || FlowError::NoTimerPending {
            flow: flow_id.to_string(),
            node: node_id.to_string(),
        };

        if !self
            .inner
            .pending
            .lock()
            .get(&key)
            .map(|p| p.counting)
            .unwrap_or(false)
        {
            return Err(no_timer().into());
        }
        // Fails only if the countdown expired in the meantime
        if !self.inner.timers.cancel_by_id(flow_id, node_id, reason) {
            return Err(no_timer().into());
        }

        let (timer_id, subscription) = match self.inner.pending.lock().get_mut(&key) {
            Some(pending) => {
                pending.counting = false;
                (pending.timer_id.clone(), pending.subscription.take())
            }
            None => (None, None),
        };
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
        if let Some(timer_id) = timer_id {
            self.inner.contexts.remove_timer(flow_id, &timer_id);
        }

        log::info!(
            "Flow {}: countdown for {} cancelled ({}), waiting for an override",
            flow_id,
            node_id,
            reason
        );
        Ok(())
    }

    /// Resolve a waiting node with `action` and advance the flow.
    ///
    /// Works while the countdown is running or after `cancel_timeout`.
    pub fn override_action(&self, flow_id: &str, node_id: &str, action: &str) -> Result<()> {
        self.require_running(flow_id)?;
        let spec = self
            .flow_spec(flow_id)
            .ok_or_else(|| FlowError::NotLoaded(flow_id.to_string()))?;
        let pending = self
            .take_pending(flow_id, node_id, None)
            .ok_or_else(|| FlowError::NoTimerPending {
                flow: flow_id.to_string(),
                node: node_id.to_string(),
            })?;

        self.inner
            .timers
            .cancel_by_id(flow_id, node_id, REASON_USER_OVERRIDE);
        self.release(flow_id, pending);

        let output = json!({
            "action_applied": action,
            "result": "user_override",
            "overridden": true,
        });
        self.inner.contexts.update(flow_id, |ctx| {
            ctx.record_output(node_id, output);
            ctx.mark_override(node_id);
        })?;

        log::info!("Flow {}: {} overridden with '{}'", flow_id, node_id, action);
        self.inner.bus.emit(BusEvent::ActionOverride {
            flow_id: flow_id.to_string(),
            node_id: node_id.to_string(),
            action: action.to_string(),
        });

        self.continue_after(&spec, flow_id, node_id)
    }

    /// Cancel everything pending for a flow and forget its context.
    ///
    /// The definition stays loaded, so the flow can be started again.
    pub fn stop_flow(&self, flow_id: &str) -> Result<()> {
        if !self.inner.contexts.contains(flow_id) {
            return Err(FlowError::NotLoaded(flow_id.to_string()).into());
        }
        self.cancel_pending(flow_id, REASON_FLOW_STOPPED);
        self.inner.contexts.remove(flow_id);

        log::info!("Stopped flow {}", flow_id);
        self.inner.bus.emit(BusEvent::FlowStopped {
            flow_id: flow_id.to_string(),
        });
        Ok(())
    }

    /// Mark a flow completed and publish all of its node outputs
    pub fn complete_flow(&self, flow_id: &str) {
        let outputs = self.inner.contexts.update(flow_id, |ctx| {
            ctx.completed = true;
            ctx.current_node = None;
            ctx.node_outputs.clone()
        });
        let Ok(outputs) = outputs else {
            return;
        };
        self.cancel_pending(flow_id, REASON_FLOW_COMPLETED);

        log::info!("Flow {} completed ({} outputs)", flow_id, outputs.len());
        self.inner.bus.emit(BusEvent::FlowCompleted {
            flow_id: flow_id.to_string(),
            outputs,
        });
    }

    /// Move a flow to the error state and publish `flow.error`
    pub fn error_flow(&self, flow_id: &str, node_id: Option<&str>, message: &str) {
        let updated = self.inner.contexts.update(flow_id, |ctx| {
            ctx.completed = true;
            ctx.error = Some(message.to_string());
        });
        if updated.is_err() {
            log::error!("Flow {} failed after it was stopped: {}", flow_id, message);
            return;
        }
        self.cancel_pending(flow_id, REASON_FLOW_ERROR);

        log::error!(
            "Flow {} failed at {}: {}",
            flow_id,
            node_id.unwrap_or("<unknown>"),
            message
        );
        self.inner.bus.emit(BusEvent::FlowError {
            flow_id: flow_id.to_string(),
            node_id: node_id.map(str::to_string),
            message: message.to_string(),
        });
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Snapshot of a flow's context
    pub fn get_flow_state(&self, flow_id: &str) -> Option<FlowContext> {
        self.inner.contexts.get(flow_id)
    }

    pub fn get_flow_status(&self, flow_id: &str) -> Option<FlowStatus> {
        self.inner.contexts.get(flow_id).map(|ctx| ctx.status())
    }

    /// Flows with a context that is neither completed nor errored
    pub fn get_active_flows(&self) -> Vec<String> {
        self.inner.contexts.active_flows()
    }

    /// Turn countdowns on or off for nodes the flow has not reached yet
    pub fn set_timed_defaults(&self, flow_id: &str, enabled: bool) -> Result<()> {
        self.inner
            .contexts
            .update(flow_id, |ctx| ctx.timed_defaults_enabled = enabled)?;
        Ok(())
    }

    pub fn loaded_flows(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.specs.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn flow_spec(&self, flow_id: &str) -> Option<Arc<FlowSpec>> {
        self.inner.specs.lock().get(flow_id).cloned()
    }

    /// Whether `node_id` is waiting on a countdown or an override
    pub fn is_waiting(&self, flow_id: &str, node_id: &str) -> bool {
        self.inner
            .pending
            .lock()
            .contains_key(&(flow_id.to_string(), node_id.to_string()))
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Run nodes from `node_id` until the flow completes, fails or suspends
    fn run_from(&self, spec: &FlowSpec, flow_id: &str, node_id: String) -> Result<()> {
        let mut node_id = node_id;
        loop {
            match self.step(spec, flow_id, &node_id) {
                Ok(Step::Next(next)) => node_id = next,
                Ok(Step::Halted) => return Ok(()),
                Err(e) => return self.fail(flow_id, &node_id, e),
            }
        }
    }

    fn continue_after(&self, spec: &FlowSpec, flow_id: &str, node_id: &str) -> Result<()> {
        match self.advance(spec, flow_id, node_id) {
            Step::Next(next) => self.run_from(spec, flow_id, next),
            Step::Halted => Ok(()),
        }
    }

    fn step(&self, spec: &FlowSpec, flow_id: &str, node_id: &str) -> Result<Step> {
        let node = Self::node(spec, flow_id, node_id)?;
        let entered = self.inner.contexts.update(flow_id, |ctx| {
            if !ctx.is_active() {
                return None;
            }
            ctx.current_node = Some(node_id.to_string());
            Some(ctx.timed_defaults_enabled)
        });
        // Stopped, completed or failed elsewhere
        let Ok(Some(timed_defaults)) = entered else {
            return Ok(Step::Halted);
        };

        match node.timeout_seconds() {
            Some(seconds) if timed_defaults => {
                self.start_countdown(flow_id, node, seconds)?;
                Ok(Step::Halted)
            }
            _ => {
                self.execute_node(spec, flow_id, node_id)?;
                Ok(self.advance(spec, flow_id, node_id))
            }
        }
    }

    /// First outgoing edge whose condition holds, or completion
    fn advance(&self, spec: &FlowSpec, flow_id: &str, from: &str) -> Step {
        let Some(ctx) = self.inner.contexts.get(flow_id) else {
            return Step::Halted;
        };
        if !ctx.is_active() {
            return Step::Halted;
        }

        for edge in spec.outgoing(from) {
            if condition::check(&edge.condition, &ctx) {
                log::debug!(
                    "Flow {}: {} -> {} ({})",
                    flow_id,
                    from,
                    edge.to,
                    edge.condition
                );
                return Step::Next(edge.to.clone());
            }
            log::debug!("Flow {}: skipped {} -> {}", flow_id, from, edge.to);
        }

        self.complete_flow(flow_id);
        Step::Halted
    }

    fn execute_node(&self, spec: &FlowSpec, flow_id: &str, node_id: &str) -> Result<()> {
        let node = Self::node(spec, flow_id, node_id)?;
        let snapshot = self
            .inner
            .contexts
            .get(flow_id)
            .ok_or_else(|| FlowError::NotLoaded(flow_id.to_string()))?;
        let output = self.inner.executor.execute(node, &snapshot)?;
        self.inner.contexts.record_output(flow_id, node_id, output)?;
        Ok(())
    }

    fn node<'a>(spec: &'a FlowSpec, flow_id: &str, node_id: &str) -> Result<&'a FlowNode> {
        spec.node(node_id).ok_or_else(|| {
            BoviError::Flow(FlowError::NodeNotFound {
                flow: flow_id.to_string(),
                node: node_id.to_string(),
            })
        })
    }

    fn fail(&self, flow_id: &str, node_id: &str, error: BoviError) -> Result<()> {
        self.error_flow(flow_id, Some(node_id), &error.to_string());
        Err(error)
    }

    fn require_running(&self, flow_id: &str) -> Result<()> {
        let status = self
            .get_flow_status(flow_id)
            .ok_or_else(|| FlowError::NotLoaded(flow_id.to_string()))?;
        if status != FlowStatus::Running {
            return Err(FlowError::NotRunning(flow_id.to_string()).into());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Countdowns
    // ------------------------------------------------------------------

    fn start_countdown(&self, flow_id: &str, node: &FlowNode, seconds: f64) -> Result<()> {
        // Unknown types fail now rather than when the countdown expires
        self.inner.executor.resolve(&node.node_type)?;
        let mode = node.parsed_type()?.mode;
        let key = (flow_id.to_string(), node.id.clone());
        let token = Uuid::new_v4().to_string();

        let subscription = self.watch_cancellation(flow_id, &node.id, mode);
        let replaced = self.inner.pending.lock().insert(
            key.clone(),
            Pending {
                token: token.clone(),
                timer_id: None,
                counting: true,
                subscription: Some(subscription),
            },
        );
        if let Some(old) = replaced.and_then(|p| p.subscription) {
            old.unsubscribe();
        }

        let weak = Arc::downgrade(&self.inner);
        let (apply_flow, apply_node, apply_token) =
            (flow_id.to_string(), node.id.clone(), token.clone());
        let started = self
            .inner
            .timers
            .start(flow_id, &node.id, mode, seconds, move || match weak.upgrade() {
                Some(inner) => FlowRunner { inner }.apply_default(&apply_flow, &apply_node, &apply_token),
                None => Ok(()),
            });
        let timer_id = match started {
            Ok(id) => id,
            Err(e) => {
                if let Some(pending) = self.take_pending(flow_id, &node.id, Some(&token)) {
                    self.release(flow_id, pending);
                }
                return Err(e);
            }
        };

        // A zero-length countdown or a listener may have resolved it already
        let mut pending = self.inner.pending.lock();
        if let Some(entry) = pending.get_mut(&key).filter(|p| p.token == token) {
            entry.timer_id = Some(timer_id.clone());
            self.inner.contexts.add_timer(flow_id, &timer_id)?;
        }
        log::info!(
            "Flow {}: {} waits {}s for its default action",
            flow_id,
            node.id,
            crate::timer::clamp_seconds(seconds)
        );
        Ok(())
    }

    /// Mark the node as overridden when a user cancels its countdown
    fn watch_cancellation(&self, flow_id: &str, node_id: &str, mode: Mode) -> Subscription {
        let weak = Arc::downgrade(&self.inner);
        let (flow, node) = (flow_id.to_string(), node_id.to_string());
        self.inner
            .bus
            .on(timer_event(mode, TimerPhase::Cancelled), move |event| {
                let BusEvent::TimerCancelled {
                    flow_id,
                    node_id,
                    reason,
                    ..
                } = event
                else {
                    return;
                };
                if *flow_id != flow || *node_id != node || INTERNAL_REASONS.contains(&reason.as_str())
                {
                    return;
                }
                if let Some(inner) = weak.upgrade() {
                    if inner.contexts.mark_override(flow_id, node_id).is_ok() {
                        log::debug!("Flow {}: {} marked as user override", flow_id, node_id);
                    }
                }
            })
    }

    /// Countdown expiry: run the node's default action and advance
    fn apply_default(&self, flow_id: &str, node_id: &str, token: &str) -> Result<()> {
        // Already resolved by an override or torn down with the flow
        let Some(pending) = self.take_pending(flow_id, node_id, Some(token)) else {
            return Ok(());
        };
        self.release(flow_id, pending);
        let Some(spec) = self.flow_spec(flow_id) else {
            return Ok(());
        };

        log::info!("Flow {}: applying default action for {}", flow_id, node_id);
        match self.execute_node(&spec, flow_id, node_id) {
            Ok(()) => self.continue_after(&spec, flow_id, node_id),
            Err(e) => self.fail(flow_id, node_id, e),
        }
    }

    /// Remove the pending entry for a node, if `token` matches (or is None)
    fn take_pending(&self, flow_id: &str, node_id: &str, token: Option<&str>) -> Option<Pending> {
        let key = (flow_id.to_string(), node_id.to_string());
        let mut pending = self.inner.pending.lock();
        let matches = pending
            .get(&key)
            .map(|p| token.map_or(true, |t| p.token == t))
            .unwrap_or(false);
        if matches {
            pending.remove(&key)
        } else {
            None
        }
    }

    fn release(&self, flow_id: &str, pending: Pending) {
        if let Some(subscription) = pending.subscription {
            subscription.unsubscribe();
        }
        if let Some(timer_id) = pending.timer_id {
            self.inner.contexts.remove_timer(flow_id, &timer_id);
        }
    }

    /// Cancel every countdown of a flow and drop its pending entries
    fn cancel_pending(&self, flow_id: &str, reason: &str) {
        let drained: Vec<(String, Pending)> = {
            let mut pending = self.inner.pending.lock();
            let keys: Vec<NodeKey> = pending
                .keys()
                .filter(|key| key.0 == flow_id)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| pending.remove(&key).map(|p| (key.1, p)))
                .collect()
        };

        for (node_id, pending) in drained {
            self.inner.timers.cancel_by_id(flow_id, &node_id, reason);
            if let Some(subscription) = pending.subscription {
                subscription.unsubscribe();
            }
        }

        let timers = &self.inner.timers;
        self.inner.contexts.clear_timers(flow_id, |timer_id| {
            timers.cancel_timer(timer_id, reason);
        });
    }
}

impl Default for FlowRunner {
    fn default() -> Self {
        Self::new(EventBus::new(), RunnerConfig::default())
    }
}

impl std::fmt::Debug for FlowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowRunner")
            .field("flows", &self.loaded_flows())
            .field("timers", &self.inner.timers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::events::{FLOW_COMPLETED, FLOW_ERROR};
    use crate::flow::types::FlowEdge;
    use std::sync::Mutex as StdMutex;

    fn flow(id: &str, nodes: Vec<FlowNode>, edges: Vec<FlowEdge>) -> FlowSpec {
        FlowSpec {
            id: id.to_string(),
            nodes,
            edges,
            ..Default::default()
        }
    }

    fn record(bus: &EventBus, name: &str) -> Arc<StdMutex<Vec<BusEvent>>> {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = events.clone();
        bus.on(name, move |e| sink.lock().unwrap().push(e.clone()));
        events
    }

    fn untimed_runner() -> FlowRunner {
        FlowRunner::new(
            EventBus::new(),
            RunnerConfig::default().with_timed_defaults(false),
        )
    }

    #[test]
    fn test_start_unknown_flow() {
        let runner = untimed_runner();
        assert!(matches!(
            runner.start_flow("nope", None),
            Err(BoviError::Flow(FlowError::NotLoaded(_)))
        ));
    }

    #[test]
    fn test_load_rejects_invalid_flow() {
        let runner = untimed_runner();
        let spec = flow(
            "two-starts",
            vec![FlowNode::new("a", "B.Learn"), FlowNode::new("b", "B.Learn")],
            vec![],
        );
        assert!(matches!(
            runner.load_flow(spec),
            Err(BoviError::Flow(FlowError::Validation { .. }))
        ));
        assert!(runner.loaded_flows().is_empty());
    }

    #[test]
    fn test_loaded_flow_is_idle() {
        let runner = untimed_runner();
        runner
            .load_flow(flow("idle", vec![FlowNode::new("a", "B.Learn")], vec![]))
            .unwrap();
        assert_eq!(runner.get_flow_status("idle"), Some(FlowStatus::Idle));
        assert_eq!(runner.loaded_flows(), vec!["idle".to_string()]);
    }

    #[test]
    fn test_empty_flow_completes_immediately() {
        let runner = untimed_runner();
        let completed = record(runner.bus(), FLOW_COMPLETED);
        runner.load_flow(flow("empty", vec![], vec![])).unwrap();
        runner.start_flow("empty", None).unwrap();

        assert_eq!(runner.get_flow_status("empty"), Some(FlowStatus::Completed));
        assert_eq!(completed.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_timed_node_runs_synchronously_when_timed_defaults_off() {
        let runner = untimed_runner();
        let spec = flow(
            "sync",
            vec![FlowNode::new("a", "I.Default")
                .with_timeout(30.0)
                .with_config(json!({"action": "freeze"}))],
            vec![],
        );
        runner.load_flow(spec).unwrap();
        runner.start_flow("sync", None).unwrap();

        let state = runner.get_flow_state("sync").unwrap();
        assert!(state.completed);
        assert_eq!(state.node_outputs["a"]["action_applied"], "freeze");
        assert!(state.active_timers.is_empty());
    }

    #[test]
    fn test_overrides_merge_into_context_data() {
        let runner = untimed_runner();
        let mut spec = flow(
            "merge",
            vec![FlowNode::new("calc", "V.Calculate")
                .with_config(json!({"inputs": ["income", "bonus"]}))],
            vec![],
        );
        spec.context.insert("income".to_string(), json!(100));
        spec.context.insert("bonus".to_string(), json!(5));
        runner.load_flow(spec).unwrap();

        let mut overrides = Map::new();
        overrides.insert("bonus".to_string(), json!(20));
        runner.start_flow("merge", Some(overrides)).unwrap();

        let state = runner.get_flow_state("merge").unwrap();
        assert_eq!(state.node_outputs["calc"], json!({"result": 120.0}));
        assert!(state.start_time.is_some());
        // The definition is untouched
        assert_eq!(runner.flow_spec("merge").unwrap().context["bonus"], json!(5));
    }

    #[test]
    fn test_node_failure_routes_to_error_flow() {
        let runner = untimed_runner();
        let errors = record(runner.bus(), FLOW_ERROR);
        let spec = flow(
            "broken",
            vec![FlowNode::new("a", "B.Learn"), FlowNode::new("b", "X.Nope")],
            vec![FlowEdge::always("a", "b")],
        );
        runner.load_flow(spec).unwrap();

        let err = runner.start_flow("broken", None).unwrap_err();
        assert!(matches!(err, BoviError::Node(_)));

        let state = runner.get_flow_state("broken").unwrap();
        assert_eq!(state.status(), FlowStatus::Error);
        assert!(state.completed);
        assert!(state.node_outputs.contains_key("a"));

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].node_id(), Some("b"));
    }

    #[test]
    fn test_interrupts_require_running_flow() {
        let runner = untimed_runner();
        runner
            .load_flow(flow("done", vec![FlowNode::new("a", "B.Learn")], vec![]))
            .unwrap();

        assert!(matches!(
            runner.override_action("done", "a", "apply"),
            Err(BoviError::Flow(FlowError::NotRunning(_)))
        ));
        runner.start_flow("done", None).unwrap();
        assert!(matches!(
            runner.cancel_timeout("done", "a", "user"),
            Err(BoviError::Flow(FlowError::NotRunning(_)))
        ));
        assert!(matches!(
            runner.override_action("ghost", "a", "apply"),
            Err(BoviError::Flow(FlowError::NotLoaded(_)))
        ));
    }

    #[test]
    fn test_stop_removes_context_but_keeps_definition() {
        let runner = untimed_runner();
        runner
            .load_flow(flow("stop", vec![FlowNode::new("a", "B.Learn")], vec![]))
            .unwrap();
        runner.stop_flow("stop").unwrap();

        assert!(runner.get_flow_state("stop").is_none());
        assert!(runner.stop_flow("stop").is_err());
        assert_eq!(runner.loaded_flows(), vec!["stop".to_string()]);

        runner.start_flow("stop", None).unwrap();
        assert_eq!(runner.get_flow_status("stop"), Some(FlowStatus::Completed));
    }

    #[test]
    fn test_set_timed_defaults_survives_start() {
        let runner = FlowRunner::default();
        runner
            .load_flow(flow("toggle", vec![FlowNode::new("a", "B.Default").with_timeout(5.0)], vec![]))
            .unwrap();
        runner.set_timed_defaults("toggle", false).unwrap();
        // No runtime here: the node must not try to start a countdown
        runner.start_flow("toggle", None).unwrap();
        assert_eq!(runner.get_flow_status("toggle"), Some(FlowStatus::Completed));
        assert!(runner.set_timed_defaults("ghost", true).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_runner_cancels_countdowns() {
        let bus = EventBus::new();
        let cancelled = record(&bus, &timer_event(Mode::I, TimerPhase::Cancelled));
        let applied = record(&bus, &timer_event(Mode::I, TimerPhase::Applied));
        let ticked = record(&bus, &timer_event(Mode::I, TimerPhase::Ticked));

        let runner = FlowRunner::new(bus, RunnerConfig::default());
        runner
            .load_flow(flow("orphan", vec![FlowNode::new("a", "I.Default").with_timeout(3.0)], vec![]))
            .unwrap();
        runner.start_flow("orphan", None).unwrap();
        let timers = runner.timers().clone();
        assert_eq!(timers.active_count(), 1);

        drop(runner);
        assert_eq!(timers.active_count(), 0);
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;

        assert!(ticked.lock().unwrap().is_empty());
        assert!(applied.lock().unwrap().is_empty());
        let cancelled = cancelled.lock().unwrap();
        assert_eq!(cancelled.len(), 1);
        assert!(matches!(
            &cancelled[0],
            BusEvent::TimerCancelled { reason, .. } if reason == REASON_RUNNER_DROPPED
        ));
    }
}
