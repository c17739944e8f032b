//! Core configuration — resolution, pipeline defaults and notation output,
//! loaded from ~/.musikla/core.yaml.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::event::{Tick, DEFAULT_TICKS_PER_BEAT};
use crate::transform::VoiceIdentifierConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Which renderer the notation stage uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotationKind {
    #[default]
    Abc,
    Text,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotationConfig {
    #[serde(default)]
    pub format: NotationKind,
    /// Render once at end of stream instead of after every event.
    #[serde(default = "NotationConfig::default_only_final")]
    pub only_final: bool,
}

impl NotationConfig {
    fn default_only_final() -> bool {
        true
    }
}

impl Default for NotationConfig {
    fn default() -> Self {
        Self {
            format: NotationKind::default(),
            only_final: Self::default_only_final(),
        }
    }
}

/// Settings shared by the library and the `musikla` binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Resolution of voices created without an explicit one.
    #[serde(default = "CoreConfig::default_ticks_per_beat")]
    pub ticks_per_beat: u32,
    /// Reordering window for the sort stage; 0 disables it.
    #[serde(default)]
    pub sort_window: Tick,
    #[serde(default)]
    pub voices: VoiceIdentifierConfig,
    #[serde(default)]
    pub notation: NotationConfig,
    /// `tracing` env-filter directive used when no `--log-level` is given.
    #[serde(default = "CoreConfig::default_log_filter")]
    pub log_filter: String,
}

impl CoreConfig {
    /// Standard location: ~/.musikla/core.yaml.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".musikla").join("core.yaml"))
    }

    /// Load config from the standard path.
    /// Returns None if the file doesn't exist; a file that fails to parse is
    /// reported and also yields None.
    pub fn load() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return None;
        }
        match Self::load_from(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("ignoring configuration: {e}");
                None
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }

    fn default_ticks_per_beat() -> u32 {
        DEFAULT_TICKS_PER_BEAT
    }

    fn default_log_filter() -> String {
        "warn".to_string()
    }
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            ticks_per_beat: Self::default_ticks_per_beat(),
            sort_window: 0,
            voices: VoiceIdentifierConfig::default(),
            notation: NotationConfig::default(),
            log_filter: Self::default_log_filter(),
        }
    }
}
