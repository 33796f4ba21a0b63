//! Configuration file – reads/writes `~/.courier/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use courier_bus::RoutingTable;
use courier_runtime::{CONSOLE, DEFAULT_REPLY, MAIN, MatchPolicy, ResponderSettings};

/// Value of `database_path` that keeps the location history in memory.
pub const IN_MEMORY_DB: &str = ":memory:";

/// Persisted configuration stored in `~/.courier/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Name of the orchestrator's mailbox.
    #[serde(default = "default_identity")]
    pub identity: String,

    /// User the location history is kept for.
    #[serde(default = "default_tracked_user")]
    pub tracked_user: String,

    /// User name attached to messages typed on the console.
    #[serde(default = "default_console_user")]
    pub console_user: String,

    /// SQLite file holding the location history, or `":memory:"`.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Which matching rule decides a reply.
    #[serde(default)]
    pub match_policy: MatchPolicy,

    /// Reply used when no rule matches.
    #[serde(default = "default_reply")]
    pub default_reply: String,

    /// `compact` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Remote address used to discover the outbound IP.
    #[serde(default = "default_ip_probe_addr")]
    pub ip_probe_addr: String,

    /// Command (program followed by arguments) answering `syscond`.
    #[serde(default = "default_status_command")]
    pub status_command: Vec<String>,

    /// Originator → responder table.  Must stay the last field: TOML tables
    /// are emitted after plain values.
    #[serde(default = "default_routes")]
    pub routes: RoutingTable,
}

fn default_identity() -> String {
    MAIN.to_string()
}
fn default_tracked_user() -> String {
    ResponderSettings::default().tracked_user
}
fn default_console_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "operator".to_string())
}
fn default_database_path() -> String {
    config_dir_for_home(&home_dir())
        .join("location.db")
        .to_string_lossy()
        .into_owned()
}
fn default_reply() -> String {
    DEFAULT_REPLY.to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}
fn default_ip_probe_addr() -> String {
    ResponderSettings::default().ip_probe_addr
}
fn default_status_command() -> Vec<String> {
    ResponderSettings::default().status_command
}
fn default_routes() -> RoutingTable {
    RoutingTable::new().with_route(CONSOLE, CONSOLE)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            tracked_user: default_tracked_user(),
            console_user: default_console_user(),
            database_path: default_database_path(),
            match_policy: MatchPolicy::default(),
            default_reply: default_reply(),
            log_format: default_log_format(),
            ip_probe_addr: default_ip_probe_addr(),
            status_command: default_status_command(),
            routes: default_routes(),
        }
    }
}

impl Config {
    /// Settings for the built-in reply handlers.
    pub fn responder_settings(&self) -> ResponderSettings {
        ResponderSettings {
            tracked_user: self.tracked_user.clone(),
            ip_probe_addr: self.ip_probe_addr.clone(),
            status_command: self.status_command.clone(),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn config_dir_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".courier")
}

/// Return the path to `~/.courier/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    config_dir_for_home(home).join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `COURIER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `COURIER_DB_PATH` | `database_path` |
/// | `COURIER_USER` | `tracked_user` |
/// | `COURIER_MATCH_POLICY` | `match_policy` (`last_match` / `first_match`) |
///
/// `COURIER_LOG_FORMAT` is read directly by the logging setup.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("COURIER_DB_PATH") {
        cfg.database_path = v;
    }
    if let Ok(v) = std::env::var("COURIER_USER") {
        cfg.tracked_user = v;
    }
    if let Ok(v) = std::env::var("COURIER_MATCH_POLICY")
        && let Ok(policy) = v.parse::<MatchPolicy>()
    {
        cfg.match_policy = policy;
    }
}

/// Save the config to disk, creating `~/.courier/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
