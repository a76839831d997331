use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use crate::focus::{SessionDurations, DEFAULT_BREAK_SECS, DEFAULT_FOCUS_SECS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusSettings {
    pub focus_duration_secs: u32,
    pub break_duration_secs: u32,
    /// Wall-clock length of one timer tick. Shorter values speed the timer up.
    pub tick_interval_ms: u64,
}

impl Default for FocusSettings {
    fn default() -> Self {
        Self {
            focus_duration_secs: DEFAULT_FOCUS_SECS,
            break_duration_secs: DEFAULT_BREAK_SECS,
            tick_interval_ms: 1000,
        }
    }
}

impl FocusSettings {
    pub fn durations(&self) -> Result<SessionDurations> {
        SessionDurations::new(self.focus_duration_secs, self.break_duration_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        self.durations()?;
        if self.tick_interval_ms == 0 {
            bail!("tick interval must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    focus: FocusSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Loads settings from `path`. A missing, unreadable or invalid file
    /// falls back to defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            let parsed: UserSettings = match serde_json::from_str(&contents) {
                Ok(parsed) => parsed,
                Err(err) => {
                    log::warn!("Ignoring malformed settings at {}: {err}", path.display());
                    UserSettings::default()
                }
            };
            if let Err(err) = parsed.focus.validate() {
                log::warn!("Ignoring invalid focus settings: {err}");
                UserSettings::default()
            } else {
                parsed
            }
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn focus(&self) -> Result<FocusSettings> {
        let guard = self
            .data
            .read()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        Ok(guard.focus.clone())
    }

    pub fn update_focus(&self, settings: FocusSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        let mut updated = guard.clone();
        updated.focus = settings;
        self.persist(&updated)?;
        *guard = updated;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
