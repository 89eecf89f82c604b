//! Core configuration.

use poolgate_model::ContactWindow;
use serde::Deserialize;

use crate::error::{PoolError, Result};

/// Tunables for the allocator and validator. Loaded once at startup and
/// passed in by value; the core never reads ambient configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Seconds a released (non-terminal) record stays in `cooling` before
    /// the sweep returns it to `available`.
    pub cooldown_secs: i64,
    /// Upper bound applied to every `claim_batch` request so a single
    /// caller cannot drain the shared pool.
    pub max_claim_batch: usize,
    /// Allowed local contact hours applied by the validator.
    pub contact_window: ContactWindow,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 72 * 3600,
            max_claim_batch: 100,
            contact_window: ContactWindow::default(),
        }
    }
}

impl PoolConfig {
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: PoolConfig =
            toml::from_str(raw).map_err(|e| PoolError::Config(format!("bad pool config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cooldown_secs < 0 {
            return Err(PoolError::Config("cooldown_secs must be >= 0".into()));
        }
        if self.max_claim_batch == 0 {
            return Err(PoolError::Config("max_claim_batch must be > 0".into()));
        }
        let window = &self.contact_window;
        if window.start_hour >= window.end_hour || window.end_hour > 24 {
            return Err(PoolError::Config(format!(
                "contact window {}..{} is not a valid hour range",
                window.start_hour, window.end_hour
            )));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::seconds(self.cooldown_secs)
    }
}
