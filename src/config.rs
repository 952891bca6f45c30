use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 2000;
const DEFAULT_EDITING_QUIESCE_MS: u64 = 1000;
const DEFAULT_SAVE_WAIT_MS: u64 = 5000;
const DEFAULT_SAVED_STATUS_MS: u64 = 2000;
const DEFAULT_DATA_DIR: &str = "worksheet_data";
const DEFAULT_BIND: &str = "127.0.0.1:3000";

/// Timing knobs of the version coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Quiet period after the last edit before an autosave fires.
    pub autosave_debounce: Duration,
    /// How long the "user is editing" flag outlives the last keystroke.
    pub editing_quiesce: Duration,
    /// Upper bound on waiting for an in-flight save before switching versions.
    pub save_wait: Duration,
    /// How long the `saved` status stays visible before decaying to idle.
    pub saved_status: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            autosave_debounce: Duration::from_millis(DEFAULT_AUTOSAVE_DEBOUNCE_MS),
            editing_quiesce: Duration::from_millis(DEFAULT_EDITING_QUIESCE_MS),
            save_wait: Duration::from_millis(DEFAULT_SAVE_WAIT_MS),
            saved_status: Duration::from_millis(DEFAULT_SAVED_STATUS_MS),
        }
    }
}

/// Process-wide settings for the server and the inspection tool.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metadata_dir: Option<PathBuf>,
    pub bind: String,
    pub coordinator: CoordinatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            metadata_dir: None,
            bind: DEFAULT_BIND.to_string(),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

/// Optional overrides read from a JSON config file. Every field may be absent.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "snake_case")]
struct PartialConfig {
    data_dir: Option<PathBuf>,
    metadata_dir: Option<PathBuf>,
    bind: Option<String>,
    autosave_debounce_ms: Option<u64>,
    editing_quiesce_ms: Option<u64>,
    save_wait_ms: Option<u64>,
    saved_status_ms: Option<u64>,
}

impl PartialConfig {
    fn from_env() -> Self {
        Self {
            data_dir: env::var_os("BIDSHEET_DATA_DIR").map(PathBuf::from),
            metadata_dir: env::var_os("BIDSHEET_METADATA_DIR").map(PathBuf::from),
            bind: env::var("BIDSHEET_BIND").ok(),
            autosave_debounce_ms: env_millis("BIDSHEET_AUTOSAVE_MS"),
            editing_quiesce_ms: env_millis("BIDSHEET_EDITING_MS"),
            save_wait_ms: env_millis("BIDSHEET_SAVE_WAIT_MS"),
            saved_status_ms: env_millis("BIDSHEET_SAVED_STATUS_MS"),
        }
    }

    /// Fields set in `self` win over `other`.
    fn or(self, other: PartialConfig) -> PartialConfig {
        PartialConfig {
            data_dir: self.data_dir.or(other.data_dir),
            metadata_dir: self.metadata_dir.or(other.metadata_dir),
            bind: self.bind.or(other.bind),
            autosave_debounce_ms: self.autosave_debounce_ms.or(other.autosave_debounce_ms),
            editing_quiesce_ms: self.editing_quiesce_ms.or(other.editing_quiesce_ms),
            save_wait_ms: self.save_wait_ms.or(other.save_wait_ms),
            saved_status_ms: self.saved_status_ms.or(other.saved_status_ms),
        }
    }
}

fn env_millis(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Defaults, overlaid by an optional JSON file, overlaid by `BIDSHEET_*`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => serde_json::from_str::<PartialConfig>(&fs::read_to_string(path)?)?,
            None => PartialConfig::default(),
        };
        Ok(Self::from_partial(PartialConfig::from_env().or(file)))
    }

    fn from_partial(partial: PartialConfig) -> Self {
        let defaults = Config::default();
        let millis = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };

        Config {
            data_dir: partial.data_dir.unwrap_or(defaults.data_dir),
            metadata_dir: partial.metadata_dir,
            bind: partial.bind.unwrap_or(defaults.bind),
            coordinator: CoordinatorConfig {
                autosave_debounce: millis(
                    partial.autosave_debounce_ms,
                    defaults.coordinator.autosave_debounce,
                ),
                editing_quiesce: millis(
                    partial.editing_quiesce_ms,
                    defaults.coordinator.editing_quiesce,
                ),
                save_wait: millis(partial.save_wait_ms, defaults.coordinator.save_wait),
                saved_status: millis(partial.saved_status_ms, defaults.coordinator.saved_status),
            },
        }
    }
}
