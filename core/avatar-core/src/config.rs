//! Runtime configuration (`~/.sage/avatar.toml`).
//!
//! Every field has a default, and a missing file yields the defaults.
//! Relative paths resolve against the directory holding the config file.

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::broadcast::DEFAULT_QUEUE_DEPTH;
use crate::engine::EngineSettings;
use crate::error::{AvatarError, Result};

pub const CONFIG_ENV: &str = "SAGE_AVATAR_CONFIG";
const SAGE_DIR_NAME: &str = ".sage";
const CONFIG_FILE_NAME: &str = "avatar.toml";
const DEFAULT_CATALOG_FILE_NAME: &str = "expressions-video.json";
const DEFAULT_SOCKET_NAME: &str = "avatar.sock";
const MIN_TICK_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_transition_margin_ms")]
    pub transition_margin_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            transition_margin_ms: default_transition_margin_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_subscriber_queue_depth")]
    pub subscriber_queue_depth: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            subscriber_queue_depth: default_subscriber_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AvatarConfig {
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

impl AvatarConfig {
    pub fn catalog_path(&self) -> Result<PathBuf> {
        match &self.catalog_path {
            Some(path) => Ok(path.clone()),
            None => Ok(sage_dir()?.join(DEFAULT_CATALOG_FILE_NAME)),
        }
    }

    pub fn socket_path(&self) -> Result<PathBuf> {
        match &self.socket_path {
            Some(path) => Ok(path.clone()),
            None => default_socket_path(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler.tick_interval_ms.max(MIN_TICK_INTERVAL_MS))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            transition_margin: chrono::Duration::milliseconds(
                self.scheduler.transition_margin_ms.min(i64::MAX as u64) as i64,
            ),
            subscriber_queue_depth: self.broadcast.subscriber_queue_depth.max(1),
        }
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for path in [&mut self.catalog_path, &mut self.socket_path]
            .into_iter()
            .flatten()
        {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// `~/.sage`, the home of every default path.
pub fn sage_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(SAGE_DIR_NAME))
        .ok_or(AvatarError::HomeDirNotFound)
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(sage_dir()?.join(CONFIG_FILE_NAME))
}

pub fn default_socket_path() -> Result<PathBuf> {
    Ok(sage_dir()?.join(DEFAULT_SOCKET_NAME))
}

/// Config path from `SAGE_AVATAR_CONFIG`, if set.
pub fn config_path_from_env() -> Option<PathBuf> {
    env::var_os(CONFIG_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

pub fn load_config(path: Option<PathBuf>) -> Result<AvatarConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(AvatarConfig::default());
    }

    let content =
        fs_err::read_to_string(&config_path).map_err(|source| AvatarError::ConfigRead {
            path: config_path.clone(),
            source,
        })?;
    let mut config =
        toml::from_str::<AvatarConfig>(&content).map_err(|err| AvatarError::ConfigMalformed {
            path: config_path.clone(),
            details: err.to_string(),
        })?;
    if let Some(parent) = config_path.parent() {
        config.resolve_relative_to(parent);
    }
    Ok(config)
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_transition_margin_ms() -> u64 {
    500
}

fn default_subscriber_queue_depth() -> usize {
    DEFAULT_QUEUE_DEPTH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let config =
            load_config(Some(temp_dir.path().join("missing.toml"))).expect("load config");
        assert_eq!(config.tick_interval(), Duration::from_millis(1000));
        assert_eq!(
            config.engine_settings().transition_margin,
            chrono::Duration::milliseconds(500)
        );
        assert_eq!(
            config.engine_settings().subscriber_queue_depth,
            DEFAULT_QUEUE_DEPTH
        );
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn load_config_parses_sections_and_resolves_relative_paths() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("avatar.toml");
        fs_err::write(
            &path,
            r#"
catalog_path = "personality/expressions-video.json"
socket_path = "/tmp/sage-avatar.sock"

[scheduler]
tick_interval_ms = 250
transition_margin_ms = 1500

[broadcast]
subscriber_queue_depth = 8
"#,
        )
        .expect("write config");

        let config = load_config(Some(path)).expect("load config");
        assert_eq!(
            config.catalog_path().expect("catalog path"),
            temp_dir.path().join("personality/expressions-video.json")
        );
        assert_eq!(
            config.socket_path().expect("socket path"),
            PathBuf::from("/tmp/sage-avatar.sock")
        );
        assert_eq!(config.tick_interval(), Duration::from_millis(250));
        let settings = config.engine_settings();
        assert_eq!(
            settings.transition_margin,
            chrono::Duration::milliseconds(1500)
        );
        assert_eq!(settings.subscriber_queue_depth, 8);
    }

    #[test]
    fn tick_interval_has_a_floor() {
        let mut config = AvatarConfig::default();
        config.scheduler.tick_interval_ms = 0;
        assert_eq!(
            config.tick_interval(),
            Duration::from_millis(MIN_TICK_INTERVAL_MS)
        );
    }

    #[test]
    fn malformed_config_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("avatar.toml");
        fs_err::write(&path, "[scheduler]\ntick_interval_ms = \"fast\"\n").expect("write");
        let err = load_config(Some(path)).unwrap_err();
        assert!(matches!(err, AvatarError::ConfigMalformed { .. }));
    }
}
