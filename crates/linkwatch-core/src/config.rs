use crate::clock::Millis;
use crate::error::{LinkError, Result};
use crate::serial_service::SerialConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Timing of the heartbeat and of the break-recovery sequence, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub heartbeat_interval_ms: Millis,
    /// How often a disabled link is re-checked by the heartbeat.
    pub idle_poll_ms: Millis,
    /// Pause between disabling the link and asserting the control pin.
    pub settle_ms: Millis,
    /// How long the control pin is held low.
    pub hold_ms: Millis,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
            idle_poll_ms: 20,
            settle_ms: 1,
            hold_ms: 5000,
        }
    }
}

impl WatchdogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval_ms == 0 {
            return Err(LinkError::invalid_config("heartbeat_interval_ms must be positive"));
        }
        if self.idle_poll_ms == 0 {
            return Err(LinkError::invalid_config("idle_poll_ms must be positive"));
        }
        if self.hold_ms == 0 {
            return Err(LinkError::invalid_config("hold_ms must be positive"));
        }
        Ok(())
    }

    /// Suspended time from break detection to re-enable.
    pub fn recovery_window(&self) -> Millis {
        self.settle_ms.saturating_add(self.hold_ms)
    }
}

/// Contents of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub watchdog: WatchdogConfig,
}

impl AppConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.serial.validate()?;
        self.watchdog.validate()
    }
}
