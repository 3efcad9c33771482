// SPDX-License-Identifier: MIT

//! Default-action countdowns
//!
//! One countdown per `(flow, node)` key. Each countdown is a tokio task that
//! emits a tick per elapsed second and, at expiry, emits `applied` and runs
//! the caller's callback. Expiry and cancellation both remove the table
//! entry under the lock, so whichever gets there first wins and the loser
//! does nothing.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::bus::{BusEvent, EventBus};
use crate::error::{BoviError, Result};
use crate::flow::types::Mode;

/// Callback run when a countdown expires
pub type ApplyCallback = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

pub const REASON_REPLACED: &str = "replaced";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TimerKey {
    flow_id: String,
    node_id: String,
}

impl TimerKey {
    fn new(flow_id: &str, node_id: &str) -> Self {
        Self {
            flow_id: flow_id.to_string(),
            node_id: node_id.to_string(),
        }
    }
}

struct ActiveTimer {
    id: String,
    mode: Mode,
    /// Released once `started` has been emitted
    arm: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

type TimerTable = Arc<Mutex<HashMap<TimerKey, ActiveTimer>>>;

/// Clamp a requested duration to whole, non-negative seconds
pub fn clamp_seconds(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    }
}

/// Tracks the running countdowns and publishes their events on the bus
#[derive(Clone)]
pub struct TimerManager {
    bus: EventBus,
    tick_interval: Duration,
    timers: TimerTable,
}

impl TimerManager {
    pub fn new(bus: EventBus) -> Self {
        Self::with_tick_interval(bus, Duration::from_millis(1000))
    }

    /// Use a custom length for one countdown second
    pub fn with_tick_interval(bus: EventBus, tick_interval: Duration) -> Self {
        Self {
            bus,
            tick_interval,
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Start a countdown and return its timer id.
    ///
    /// Any countdown already running for the same key is cancelled first
    /// (with reason `replaced`). Must be called from inside a tokio runtime.
    pub fn start<F>(
        &self,
        flow_id: &str,
        node_id: &str,
        mode: Mode,
        seconds: f64,
        on_apply: F,
    ) -> Result<String>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| BoviError::other("timers require a running tokio runtime"))?;

        let seconds = clamp_seconds(seconds);
        self.cancel_by_id(flow_id, node_id, REASON_REPLACED);

        let key = TimerKey::new(flow_id, node_id);
        let id = Uuid::new_v4().to_string();
        let (arm_tx, arm_rx) = oneshot::channel();

        {
            let mut timers = self.timers.lock();
            let handle = runtime.spawn(run_countdown(
                self.clone(),
                key.clone(),
                id.clone(),
                mode,
                seconds,
                arm_rx,
                Box::new(on_apply),
            ));
            timers.insert(
                key.clone(),
                ActiveTimer {
                    id: id.clone(),
                    mode,
                    arm: Some(arm_tx),
                    handle: Some(handle),
                },
            );
        }

        log::debug!(
            "Timer {} started for {}/{} ({}s)",
            id,
            flow_id,
            node_id,
            seconds
        );
        self.bus.emit(BusEvent::TimerStarted {
            mode,
            flow_id: flow_id.to_string(),
            node_id: node_id.to_string(),
            seconds,
        });

        // A listener may already have cancelled or replaced this timer
        let arm = {
            let mut timers = self.timers.lock();
            timers
                .get_mut(&key)
                .filter(|t| t.id == id)
                .and_then(|t| t.arm.take())
        };
        if let Some(arm) = arm {
            let _ = arm.send(());
        }

        Ok(id)
    }

    /// Cancel the countdown for `(flow, node)`. No event if none is running.
    pub fn cancel_by_id(&self, flow_id: &str, node_id: &str, reason: &str) -> bool {
        let removed = self.timers.lock().remove(&TimerKey::new(flow_id, node_id));
        let Some(mut timer) = removed else {
            return false;
        };

        if let Some(handle) = timer.handle.take() {
            handle.abort();
        }
        log::debug!(
            "Timer {} cancelled for {}/{}: {}",
            timer.id,
            flow_id,
            node_id,
            reason
        );
        self.bus.emit(BusEvent::TimerCancelled {
            mode: timer.mode,
            flow_id: flow_id.to_string(),
            node_id: node_id.to_string(),
            reason: reason.to_string(),
        });
        true
    }

    /// Cancel a countdown by the id `start` returned
    pub fn cancel_timer(&self, timer_id: &str, reason: &str) -> bool {
        let key = self
            .timers
            .lock()
            .iter()
            .find(|(_, t)| t.id == timer_id)
            .map(|(k, _)| k.clone());
        match key {
            Some(key) => self.cancel_by_id(&key.flow_id, &key.node_id, reason),
            None => false,
        }
    }

    pub fn is_active(&self, flow_id: &str, node_id: &str) -> bool {
        self.timers
            .lock()
            .contains_key(&TimerKey::new(flow_id, node_id))
    }

    /// Id of the countdown running for `(flow, node)`
    pub fn timer_id(&self, flow_id: &str, node_id: &str) -> Option<String> {
        self.timers
            .lock()
            .get(&TimerKey::new(flow_id, node_id))
            .map(|t| t.id.clone())
    }

    pub fn active_count(&self) -> usize {
        self.timers.lock().len()
    }

    fn owns(&self, key: &TimerKey, id: &str) -> bool {
        self.timers
            .lock()
            .get(key)
            .map(|t| t.id == id)
            .unwrap_or(false)
    }

    /// Remove the entry if it still belongs to `id`
    fn take(&self, key: &TimerKey, id: &str) -> Option<ActiveTimer> {
        let mut timers = self.timers.lock();
        if timers.get(key).map(|t| t.id == id).unwrap_or(false) {
            timers.remove(key)
        } else {
            None
        }
    }
}

impl std::fmt::Debug for TimerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerManager")
            .field("tick_interval", &self.tick_interval)
            .field("active", &self.active_count())
            .finish()
    }
}

/// Deadlines past this horizon are treated as never firing
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Deadline of the `ticks`-th interval after `started`, saturating on overflow
fn tick_deadline(started: Instant, interval: Duration, ticks: u64) -> Instant {
    let offset = interval
        .saturating_mul(u32::try_from(ticks).unwrap_or(u32::MAX))
        .min(FAR_FUTURE);
    started + offset
}

async fn run_countdown(
    manager: TimerManager,
    key: TimerKey,
    id: String,
    mode: Mode,
    seconds: u64,
    arm: oneshot::Receiver<()>,
    on_apply: ApplyCallback,
) {
    if arm.await.is_err() {
        return;
    }

    if seconds == 0 {
        tokio::task::yield_now().await;
    } else {
        let started = Instant::now();
        for elapsed in 1..seconds {
            tokio::time::sleep_until(tick_deadline(started, manager.tick_interval, elapsed)).await;
            if !manager.owns(&key, &id) {
                return;
            }
            manager.bus.emit(BusEvent::TimerTicked {
                mode,
                flow_id: key.flow_id.clone(),
                node_id: key.node_id.clone(),
                remaining: seconds - elapsed,
            });
        }
        tokio::time::sleep_until(tick_deadline(started, manager.tick_interval, seconds)).await;
    }

    if manager.take(&key, &id).is_none() {
        return;
    }

    log::debug!("Timer {} applied for {}/{}", id, key.flow_id, key.node_id);
    manager.bus.emit(BusEvent::TimerApplied {
        mode,
        flow_id: key.flow_id.clone(),
        node_id: key.node_id.clone(),
    });

    if let Err(e) = on_apply() {
        log::error!(
            "Default action for {}/{} failed: {}",
            key.flow_id,
            key.node_id,
            e
        );
    }
}
