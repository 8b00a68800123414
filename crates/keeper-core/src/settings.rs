use crate::error::{KeeperError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosaveSettings {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    pub enabled: bool,
    pub idle_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub records_shown: usize,
    #[serde(default = "default_logins_shown")]
    pub logins_shown: usize,
}

fn default_logins_shown() -> usize {
    20
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeeperSettings {
    pub autosave: AutosaveSettings,
    pub timeout: TimeoutSettings,
    pub display: DisplaySettings,
}

impl Default for KeeperSettings {
    fn default() -> Self {
        Self {
            autosave: AutosaveSettings {
                enabled: true,
                interval_secs: 60,
            },
            timeout: TimeoutSettings {
                enabled: true,
                idle_secs: 300,
            },
            display: DisplaySettings {
                records_shown: 20,
                logins_shown: default_logins_shown(),
            },
        }
    }
}

impl KeeperSettings {
    /// Autosave period, or `None` when autosave is off
    pub fn autosave_interval(&self) -> Option<Duration> {
        self.autosave
            .enabled
            .then(|| Duration::from_secs(self.autosave.interval_secs))
    }

    /// Idle time before logout, or `None` when the timeout is off
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.timeout
            .enabled
            .then(|| Duration::from_secs(self.timeout.idle_secs))
    }

    pub fn validate(&self) -> Result<()> {
        if self.autosave.enabled && self.autosave.interval_secs == 0 {
            return Err(KeeperError::Config(
                "autosave interval must be at least one second".into(),
            ));
        }
        if self.timeout.enabled && self.timeout.idle_secs == 0 {
            return Err(KeeperError::Config(
                "idle timeout must be at least one second".into(),
            ));
        }
        Ok(())
    }
}

/// Reads `settings.json` from `dir`, falling back to defaults when absent.
pub fn load_settings(dir: &Path) -> Result<KeeperSettings> {
    let path = dir.join(SETTINGS_FILE);
    if !path.exists() {
        return Ok(KeeperSettings::default());
    }
    let settings: KeeperSettings = serde_json::from_slice(&fs::read(&path)?)?;
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings(dir: &Path, settings: &KeeperSettings) -> Result<()> {
    settings.validate()?;
    fs::create_dir_all(dir)?;
    let data = serde_json::to_vec_pretty(settings)?;
    fs::write(dir.join(SETTINGS_FILE), data)?;
    Ok(())
}
