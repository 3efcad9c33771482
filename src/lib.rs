// SPDX-License-Identifier: MIT

//! Flow runner and default-action timers for BOVI decision flows.
//!
//! A flow is a small graph of typed nodes (`V.PDA`, `I.Detect`, ...) joined
//! by conditional edges. `FlowRunner` walks it; nodes that declare a timeout
//! wait on a `TimerManager` countdown before their default action applies,
//! unless the user overrides them first. Everything observable is published
//! on an `EventBus`.

pub mod bus;
pub mod config;
pub mod error;
pub mod flow;
pub mod timer;

pub use bus::{BusEvent, EventBus};
pub use config::RunnerConfig;
pub use error::{BoviError, FlowError, NodeError, Result};
pub use flow::{FlowLoader, FlowRunner, FlowSpec};
pub use timer::TimerManager;
