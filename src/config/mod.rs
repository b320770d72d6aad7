//! User configuration.
//!
//! Settings live in `config.toml` under the platform config directory. The
//! [`Config`] handle is built once at startup and shared; every mutation is
//! persisted and announced to subscribers as a set of [`ConfigChange`]s.

pub mod watcher;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::history::DEFAULT_RATE_WINDOW_MINUTES;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "OPENCREDITS_CONFIG";

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// The closed set of refresh periods a user can pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateInterval {
    OneMinute,
    #[default]
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    SixHours,
    TwentyFourHours,
}

impl UpdateInterval {
    pub const ALL: [UpdateInterval; 7] = [
        UpdateInterval::OneMinute,
        UpdateInterval::FiveMinutes,
        UpdateInterval::FifteenMinutes,
        UpdateInterval::ThirtyMinutes,
        UpdateInterval::OneHour,
        UpdateInterval::SixHours,
        UpdateInterval::TwentyFourHours,
    ];

    pub const LABELS: [&'static str; 7] = [
        "1 minute",
        "5 minutes",
        "15 minutes",
        "30 minutes",
        "1 hour",
        "6 hours",
        "24 hours",
    ];

    pub fn label(self) -> &'static str {
        match self {
            UpdateInterval::OneMinute => "1 minute",
            UpdateInterval::FiveMinutes => "5 minutes",
            UpdateInterval::FifteenMinutes => "15 minutes",
            UpdateInterval::ThirtyMinutes => "30 minutes",
            UpdateInterval::OneHour => "1 hour",
            UpdateInterval::SixHours => "6 hours",
            UpdateInterval::TwentyFourHours => "24 hours",
        }
    }

    pub fn minutes(self) -> u64 {
        match self {
            UpdateInterval::OneMinute => 1,
            UpdateInterval::FiveMinutes => 5,
            UpdateInterval::FifteenMinutes => 15,
            UpdateInterval::ThirtyMinutes => 30,
            UpdateInterval::OneHour => 60,
            UpdateInterval::SixHours => 360,
            UpdateInterval::TwentyFourHours => 1440,
        }
    }

    pub fn period(self) -> Duration {
        Duration::from_secs(self.minutes() * 60)
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|interval| interval.label() == label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub enabled: bool,
}

/// On-disk settings. Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub update_interval: String,
    pub show_in_status_bar: bool,
    /// Lookback window for the consumption rate, in minutes.
    pub consumption_rate_period: u32,
    pub providers: BTreeMap<String, ProviderSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            update_interval: UpdateInterval::default().label().to_string(),
            show_in_status_bar: true,
            consumption_rate_period: DEFAULT_RATE_WINDOW_MINUTES,
            providers: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Unknown labels fall back to the default interval.
    pub fn update_interval(&self) -> UpdateInterval {
        UpdateInterval::from_label(&self.update_interval).unwrap_or_default()
    }

    pub fn is_provider_enabled(&self, provider_id: &str) -> bool {
        self.providers
            .get(provider_id)
            .map(|p| p.enabled)
            .unwrap_or(false)
    }

    pub fn set_provider_enabled(&mut self, provider_id: &str, enabled: bool) {
        self.providers
            .entry(provider_id.to_string())
            .or_default()
            .enabled = enabled;
    }

    /// Which areas differ between `previous` and `self`.
    pub fn changes_from(&self, previous: &Settings) -> Vec<ConfigChange> {
        let mut changes = Vec::new();

        if self.update_interval() != previous.update_interval() {
            changes.push(ConfigChange::UpdateInterval);
        }
        if self.show_in_status_bar != previous.show_in_status_bar {
            changes.push(ConfigChange::StatusBar);
        }

        let enabled = |s: &Settings| -> Vec<String> {
            s.providers
                .iter()
                .filter(|(_, p)| p.enabled)
                .map(|(id, _)| id.clone())
                .collect()
        };
        if enabled(self) != enabled(previous) {
            changes.push(ConfigChange::Providers);
        }

        if self.consumption_rate_period != previous.consumption_rate_period {
            changes.push(ConfigChange::RateWindow);
        }

        changes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    UpdateInterval,
    StatusBar,
    Providers,
    RateWindow,
}

/// Shared configuration handle.
pub struct Config {
    path: Option<PathBuf>,
    settings: RwLock<Settings>,
    changes: broadcast::Sender<ConfigChange>,
}

impl Config {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: PathBuf) -> Result<Self> {
        let settings = read_settings(&path)?;
        Ok(Self::with_settings(Some(path), settings))
    }

    /// Non-persistent configuration.
    #[cfg(test)]
    pub fn in_memory(settings: Settings) -> Self {
        Self::with_settings(None, settings)
    }

    fn with_settings(path: Option<PathBuf>, settings: Settings) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            path,
            settings: RwLock::new(settings),
            changes,
        }
    }

    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }

        let dir = dirs::config_dir().context("Failed to get config directory")?;
        Ok(dir.join("opencredits").join("config.toml"))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn snapshot(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_interval(&self) -> UpdateInterval {
        self.read(|s| s.update_interval())
    }

    pub fn is_provider_enabled(&self, provider_id: &str) -> bool {
        self.read(|s| s.is_provider_enabled(provider_id))
    }

    pub fn show_in_status_bar(&self) -> bool {
        self.read(|s| s.show_in_status_bar)
    }

    pub fn consumption_rate_period(&self) -> u32 {
        self.read(|s| s.consumption_rate_period)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }

    /// Mutate, persist and announce. The write lock is held from the read
    /// of the current settings until the new ones are installed.
    pub fn update<F>(&self, mutate: F) -> Result<Vec<ConfigChange>>
    where
        F: FnOnce(&mut Settings),
    {
        let changes = {
            let mut current = self.write();
            let mut next = current.clone();
            mutate(&mut next);

            if let Some(path) = &self.path {
                write_settings(path, &next)?;
            }

            install(&mut current, next)
        };

        self.announce(&changes);
        Ok(changes)
    }

    pub fn set_provider_enabled(&self, provider_id: &str, enabled: bool) -> Result<()> {
        self.update(|s| s.set_provider_enabled(provider_id, enabled))?;
        Ok(())
    }

    /// Re-read the backing file, announcing whatever changed on disk.
    pub fn reload(&self) -> Result<Vec<ConfigChange>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };

        let changes = {
            let mut current = self.write();
            let next = read_settings(path)?;
            install(&mut current, next)
        };

        self.announce(&changes);
        Ok(changes)
    }

    fn read<T>(&self, f: impl FnOnce(&Settings) -> T) -> T {
        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
        f(&*settings)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, changes: &[ConfigChange]) {
        for change in changes {
            // No subscribers is fine
            let _ = self.changes.send(*change);
        }
    }
}

fn install(current: &mut Settings, next: Settings) -> Vec<ConfigChange> {
    let changes = next.changes_from(current);
    *current = next;
    changes
}

fn read_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

fn write_settings(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    let content = toml::to_string_pretty(settings).context("Failed to serialize settings")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write config file {}", path.display()))
}
