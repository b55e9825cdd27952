//! Config loading and env overrides.
//!
//! A TOML file with full defaults, so a missing file just runs the snapshot
//! backend out of the working directory. Deployment secrets and the listen
//! port come from the environment (`SUPABASE_URL`, `SUPABASE_KEY`,
//! `TELEGRAM_BOT_TOKEN`, `WEBHOOK_URL`, `PORT`) and override the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::WindowRule;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config field {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP front end binds to.
    pub listen_addr: String,
    /// Directory of static files for the web front end; skipped if absent.
    pub static_dir: Option<PathBuf>,
    pub window: WindowConfig,
    pub persist: PersistConfig,
    pub telegram: TelegramConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:10000".to_string(),
            static_dir: Some(PathBuf::from("static")),
            window: WindowConfig::default(),
            persist: PersistConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// "fixed-reset" or "rolling".
    pub rule: String,
    /// Reset hour in the shifted frame (fixed-reset rule).
    pub reset_hour: u8,
    /// UTC offset of the reset frame, in hours (fixed-reset rule).
    pub utc_offset_hours: i8,
    /// Span between claims (rolling rule).
    pub rolling_hours: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            rule: "fixed-reset".to_string(),
            reset_hour: 1,
            utc_offset_hours: 1,
            rolling_hours: 24,
        }
    }
}

impl WindowConfig {
    pub fn to_rule(&self) -> Result<WindowRule, ConfigError> {
        match self.rule.as_str() {
            "fixed-reset" => {
                if self.reset_hour >= 24 {
                    return Err(ConfigError::Invalid {
                        field: "window.reset_hour",
                        reason: format!("{} is not an hour of day", self.reset_hour),
                    });
                }
                Ok(WindowRule::FixedReset {
                    reset_hour: self.reset_hour,
                    utc_offset_hours: self.utc_offset_hours,
                })
            }
            "rolling" => Ok(WindowRule::Rolling {
                hours: self.rolling_hours,
            }),
            other => Err(ConfigError::Invalid {
                field: "window.rule",
                reason: format!("unknown rule {other:?}"),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// "snapshot", "remote", or "git".
    pub backend: String,
    /// Snapshot file (snapshot backend).
    pub snapshot_path: PathBuf,
    pub remote: RemoteConfig,
    pub git: GitConfig,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            backend: "snapshot".to_string(),
            snapshot_path: PathBuf::from("dots-users.json"),
            remote: RemoteConfig::default(),
            git: GitConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Repository used for the sync ref.
    pub repo_path: PathBuf,
    /// Snapshot file layered under the sync.
    pub snapshot_path: PathBuf,
    /// Minimum seconds between pushes to the sync remote.
    pub push_interval_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            snapshot_path: PathBuf::from("dots-users.json"),
            push_interval_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// "poll", "webhook", or "off".
    pub transport: String,
    /// Bot token; normally injected via TELEGRAM_BOT_TOKEN.
    pub token: String,
    /// Public URL Telegram posts updates to (webhook transport).
    pub webhook_url: String,
    /// Long-poll wait passed to getUpdates (poll transport).
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            transport: "poll".to_string(),
            token: String::new(),
            webhook_url: String::new(),
            poll_timeout_secs: 30,
        }
    }
}

pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_owned(),
        source: e,
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_owned(),
        source: e,
    })
}

/// Load `path` if it exists; otherwise write a default file there and use
/// the defaults. Env overrides apply either way.
pub fn load_or_init(path: &Path) -> Config {
    let mut cfg = if path.exists() {
        match load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!("config load failed, using defaults: {e}");
                Config::default()
            }
        }
    } else {
        let cfg = Config::default();
        match write_default(path, &cfg) {
            Ok(()) => tracing::info!(path = %path.display(), "wrote default config"),
            Err(e) => tracing::warn!("could not write default config: {e}"),
        }
        cfg
    };
    apply_env_overrides(&mut cfg);
    cfg
}

/// Atomic write (temp file + rename) so a crash never leaves a torn file.
fn write_default(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    let rendered = toml::to_string_pretty(cfg).map_err(|e| ConfigError::Invalid {
        field: "config",
        reason: e.to_string(),
    })?;
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let dir = dir.unwrap_or_else(|| Path::new("."));
    let temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ConfigError::Write {
        path: dir.to_owned(),
        source: e,
    })?;
    fs::write(temp.path(), rendered).map_err(|e| ConfigError::Write {
        path: temp.path().to_owned(),
        source: e,
    })?;
    temp.persist(path).map_err(|e| ConfigError::Write {
        path: path.to_owned(),
        source: e.error,
    })?;
    Ok(())
}

pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(url) = std::env::var("SUPABASE_URL") {
        cfg.persist.remote.base_url = url;
    }
    if let Ok(key) = std::env::var("SUPABASE_KEY") {
        cfg.persist.remote.api_key = key;
    }
    if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
        cfg.telegram.token = token;
    }
    if let Ok(url) = std::env::var("WEBHOOK_URL") {
        cfg.telegram.webhook_url = url;
    }
    if let Ok(port) = std::env::var("PORT") {
        // Hosting platforms hand out only the port.
        let host = cfg
            .listen_addr
            .rsplit_once(':')
            .map(|(host, _)| host)
            .unwrap_or("0.0.0.0");
        cfg.listen_addr = format!("{host}:{port}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dots.toml");

        let mut cfg = Config::default();
        cfg.listen_addr = "127.0.0.1:9999".to_string();
        cfg.persist.backend = "git".to_string();
        cfg.persist.git.push_interval_secs = 60;
        cfg.window.rule = "rolling".to_string();

        let rendered = toml::to_string_pretty(&cfg).expect("render");
        fs::write(&path, rendered).expect("write");

        let loaded = load(&path).expect("load");
        assert_eq!(loaded.listen_addr, "127.0.0.1:9999");
        assert_eq!(loaded.persist.backend, "git");
        assert_eq!(loaded.persist.git.push_interval_secs, 60);
        assert!(matches!(
            loaded.window.to_rule().expect("rule"),
            WindowRule::Rolling { hours: 24 }
        ));
    }

    #[test]
    fn defaults_pick_fixed_reset() {
        let cfg = Config::default();
        assert_eq!(
            cfg.window.to_rule().expect("rule"),
            WindowRule::fixed_default()
        );
        assert_eq!(cfg.persist.backend, "snapshot");
    }

    #[test]
    fn unknown_rule_is_rejected() {
        let cfg = WindowConfig {
            rule: "lunar".to_string(),
            ..WindowConfig::default()
        };
        assert!(cfg.to_rule().is_err());
    }

    #[test]
    fn load_or_init_writes_a_default_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("dots.toml");

        let cfg = load_or_init(&path);
        assert_eq!(cfg.persist.backend, "snapshot");
        assert!(path.exists());

        let reloaded = load(&path).expect("reload");
        assert_eq!(reloaded.persist.backend, "snapshot");
        assert_eq!(reloaded.window.rule, "fixed-reset");
    }

    #[test]
    fn empty_file_parses_to_defaults() {
        let cfg: Config = toml::from_str("").expect("parse");
        assert_eq!(cfg.telegram.transport, "poll");
        assert_eq!(cfg.persist.git.push_interval_secs, 300);
    }
}
