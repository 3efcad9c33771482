// SPDX-License-Identifier: MIT

//! Runtime configuration for the flow runner
//!
//! Values come from the environment (after `dotenv` has been loaded by the
//! binary) and fall back to defaults that match the interactive UI.

use crate::error::{BoviError, Result};
use std::time::Duration;

pub const ENV_TIMED_DEFAULTS: &str = "BOVI_TIMED_DEFAULTS";
pub const ENV_TICK_MS: &str = "BOVI_TICK_MS";
pub const ENV_ASSESS_SEED: &str = "BOVI_ASSESS_SEED";

/// Settings shared by the timer manager, node executor and runner
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Whether timed nodes count down to their default action
    pub timed_defaults: bool,
    /// Countdown tick period
    pub tick_interval: Duration,
    /// Seed for simulated assessments; `None` seeds from the OS
    pub assess_seed: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            timed_defaults: true,
            tick_interval: Duration::from_millis(1000),
            assess_seed: None,
        }
    }
}

impl RunnerConfig {
    /// Build a config from `BOVI_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_TIMED_DEFAULTS) {
            config.timed_defaults = parse_bool(&raw).ok_or_else(|| {
                BoviError::config(format!("{} must be a boolean, got '{}'", ENV_TIMED_DEFAULTS, raw))
            })?;
        }

        if let Some(raw) = lookup(ENV_TICK_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                BoviError::config(format!("{} must be an integer, got '{}'", ENV_TICK_MS, raw))
            })?;
            if ms == 0 {
                return Err(BoviError::config(format!("{} must be positive", ENV_TICK_MS)));
            }
            config.tick_interval = Duration::from_millis(ms);
        }

        if let Some(raw) = lookup(ENV_ASSESS_SEED) {
            let seed: u64 = raw.trim().parse().map_err(|_| {
                BoviError::config(format!("{} must be an integer, got '{}'", ENV_ASSESS_SEED, raw))
            })?;
            config.assess_seed = Some(seed);
        }

        Ok(config)
    }

    pub fn with_timed_defaults(mut self, enabled: bool) -> Self {
        self.timed_defaults = enabled;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_assess_seed(mut self, seed: u64) -> Self {
        self.assess_seed = Some(seed);
        self
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
