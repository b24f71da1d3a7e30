//! Job configuration.
//!
//! One [`Config`] record is built at startup and handed to every component
//! that needs it; nothing reads configuration from global state afterwards.
//! Values come from three layers, each overriding the one before:
//!
//! ```text
//! stock defaults  →  config.toml (--config)  →  CLOAKJOB_* environment
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [workspace]
//! root = "/tmp/cloakjob"      # Per-job directories are created under here
//! cleanup = false             # Remove the job directory when the job ends
//! exclude_input = false       # Never return the staged input as the output
//!
//! [input]
//! max_edge = 2048             # Default downscale bound (longer edge, px)
//! fetch_timeout_secs = 30     # Timeout for fetching image_url
//!
//! [engine]
//! strategy = "local"          # "local" (CLI binary) or "remote" (HTTP service)
//!
//! [engine.local]
//! binary = "fawkes"
//! args = []                   # Placed before -d/--mode/--format
//! # timeout_secs = 600        # Omit to wait for the engine indefinitely
//!
//! [engine.remote]
//! base_url = "http://127.0.0.1:8000"
//! token = ""
//! token_header = "X-Auth-Token"
//! poll_timeout_secs = 300
//! poll_interval_ms = 2000
//! request_timeout_secs = 60
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Invalid value for {var}: {message}")]
    Env { var: String, message: String },
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Which engine interface jobs are dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Run the engine binary against a per-job workspace directory.
    #[default]
    Local,
    /// Upload to the engine's HTTP service and poll for the result.
    Remote,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Local => "local",
            Strategy::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub input: InputConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkspaceConfig {
    /// Directory under which each job gets its own UUID-named workspace.
    pub root: PathBuf,
    /// Remove the workspace once the job has finished. Off by default so the
    /// engine's output can be inspected after the fact.
    pub cleanup: bool,
    /// Leave the staged input out of output resolution. Off by default: an
    /// engine that rewrites `input.png` in place, or writes nothing, yields
    /// the staged file as its result.
    pub exclude_input: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/tmp/cloakjob"),
            cleanup: false,
            exclude_input: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Longer-edge bound used when a request doesn't set `max_edge`.
    pub max_edge: u32,
    pub fetch_timeout_secs: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            max_edge: 2048,
            fetch_timeout_secs: 30,
        }
    }
}

impl InputConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub strategy: Strategy,
    pub local: LocalEngineConfig,
    pub remote: RemoteEngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocalEngineConfig {
    /// Engine executable, looked up on `PATH` when not absolute.
    pub binary: String,
    /// Extra leading arguments, e.g. `["-m", "fawkes"]` with `binary = "python"`.
    pub args: Vec<String>,
    /// Kill the engine after this many seconds. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            binary: "fawkes".to_string(),
            args: Vec::new(),
            timeout_secs: None,
        }
    }
}

impl LocalEngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteEngineConfig {
    pub base_url: String,
    /// Static token forwarded on every request. Empty means no header.
    pub token: String,
    pub token_header: String,
    /// Total time budget for the status polling loop.
    pub poll_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Per-request timeout for upload, status and download calls.
    pub request_timeout_secs: u64,
}

impl Default for RemoteEngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            token: String::new(),
            token_header: "X-Auth-Token".to_string(),
            poll_timeout_secs: 300,
            poll_interval_ms: 2000,
            request_timeout_secs: 60,
        }
    }
}

impl RemoteEngineConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input.max_edge == 0 {
            return Err(ConfigError::Validation(
                "input.max_edge must be positive".into(),
            ));
        }
        if self.input.fetch_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "input.fetch_timeout_secs must be positive".into(),
            ));
        }
        if self.engine.local.binary.trim().is_empty() {
            return Err(ConfigError::Validation(
                "engine.local.binary must not be empty".into(),
            ));
        }
        if self.engine.local.timeout_secs == Some(0) {
            return Err(ConfigError::Validation(
                "engine.local.timeout_secs must be positive when set".into(),
            ));
        }

        let remote = &self.engine.remote;
        let url = reqwest::Url::parse(&remote.base_url).map_err(|e| {
            ConfigError::Validation(format!("engine.remote.base_url is not a URL: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(
                "engine.remote.base_url must be http or https".into(),
            ));
        }
        if reqwest::header::HeaderName::from_bytes(remote.token_header.as_bytes()).is_err() {
            return Err(ConfigError::Validation(format!(
                "engine.remote.token_header is not a valid header name: {:?}",
                remote.token_header
            )));
        }
        if remote.poll_timeout_secs == 0
            || remote.poll_interval_ms == 0
            || remote.request_timeout_secs == 0
        {
            return Err(ConfigError::Validation(
                "engine.remote timeouts and poll interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Kind of value an environment variable carries.
#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Text,
    Integer,
    Bool,
}

/// Environment variables and the dotted config key each one sets.
const ENV_VARS: &[(&str, &[&str], EnvKind)] = &[
    ("CLOAKJOB_WORKSPACE_ROOT", &["workspace", "root"], EnvKind::Text),
    ("CLOAKJOB_WORKSPACE_CLEANUP", &["workspace", "cleanup"], EnvKind::Bool),
    ("CLOAKJOB_EXCLUDE_INPUT", &["workspace", "exclude_input"], EnvKind::Bool),
    ("CLOAKJOB_MAX_EDGE", &["input", "max_edge"], EnvKind::Integer),
    ("CLOAKJOB_FETCH_TIMEOUT_SECS", &["input", "fetch_timeout_secs"], EnvKind::Integer),
    ("CLOAKJOB_STRATEGY", &["engine", "strategy"], EnvKind::Text),
    ("CLOAKJOB_ENGINE_BIN", &["engine", "local", "binary"], EnvKind::Text),
    ("CLOAKJOB_ENGINE_TIMEOUT_SECS", &["engine", "local", "timeout_secs"], EnvKind::Integer),
    ("CLOAKJOB_REMOTE_URL", &["engine", "remote", "base_url"], EnvKind::Text),
    ("CLOAKJOB_REMOTE_TOKEN", &["engine", "remote", "token"], EnvKind::Text),
    ("CLOAKJOB_REMOTE_TOKEN_HEADER", &["engine", "remote", "token_header"], EnvKind::Text),
    ("CLOAKJOB_POLL_TIMEOUT_SECS", &["engine", "remote", "poll_timeout_secs"], EnvKind::Integer),
    ("CLOAKJOB_POLL_INTERVAL_MS", &["engine", "remote", "poll_interval_ms"], EnvKind::Integer),
    ("CLOAKJOB_REQUEST_TIMEOUT_SECS", &["engine", "remote", "request_timeout_secs"], EnvKind::Integer),
];

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a TOML config file as a raw value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Build the environment layer from `(name, value)` pairs.
///
/// Only `CLOAKJOB_*` names listed in [`ENV_VARS`] are considered; anything
/// else is ignored. Returns `Ok(None)` when no relevant variable is set.
pub fn env_overlay<I, K, V>(vars: I) -> Result<Option<toml::Value>, ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut root = toml::Table::new();
    for (name, raw) in vars {
        let Some((var, path, kind)) = ENV_VARS.iter().find(|(var, _, _)| *var == name.as_ref())
        else {
            continue;
        };
        let raw = raw.as_ref().trim();
        let value = match kind {
            EnvKind::Text => toml::Value::String(raw.to_string()),
            EnvKind::Integer => {
                let n = raw.parse::<i64>().map_err(|e| ConfigError::Env {
                    var: var.to_string(),
                    message: e.to_string(),
                })?;
                toml::Value::Integer(n)
            }
            EnvKind::Bool => toml::Value::Boolean(parse_bool(raw).ok_or_else(|| {
                ConfigError::Env {
                    var: var.to_string(),
                    message: format!("expected true/false, got {raw:?}"),
                }
            })?),
        };
        insert_at(&mut root, path, value);
    }
    Ok((!root.is_empty()).then_some(toml::Value::Table(root)))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn insert_at(table: &mut toml::Table, path: &[&str], value: toml::Value) {
    match path {
        [] => {}
        [last] => {
            table.insert(last.to_string(), value);
        }
        [head, rest @ ..] => {
            let child = table
                .entry(head.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if !child.is_table() {
                *child = toml::Value::Table(toml::Table::new());
            }
            if let toml::Value::Table(child) = child {
                insert_at(child, rest, value);
            }
        }
    }
}

/// Merge the overlays onto a base value in order, then deserialize and validate.
pub fn resolve_config<I>(base: toml::Value, overlays: I) -> Result<Config, ConfigError>
where
    I: IntoIterator<Item = Option<toml::Value>>,
{
    let merged = overlays.into_iter().flatten().fold(base, merge_toml);
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the effective configuration.
///
/// Stock defaults, then `file` (if given), then the environment pairs in
/// `env` (normally `std::env::vars()`).
pub fn load_config<I, K, V>(file: Option<&Path>, env: I) -> Result<Config, ConfigError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let base = stock_defaults_value()?;
    let file_layer = file.map(load_raw_config).transpose()?;
    let env_layer = env_overlay(env)?;
    resolve_config(base, [file_layer, env_layer])
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# cloakjob configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Every key can also be set from the
# environment (see `cloakjob check` for the effective values):
#
#   CLOAKJOB_WORKSPACE_ROOT, CLOAKJOB_WORKSPACE_CLEANUP, CLOAKJOB_EXCLUDE_INPUT,
#   CLOAKJOB_MAX_EDGE, CLOAKJOB_FETCH_TIMEOUT_SECS, CLOAKJOB_STRATEGY, CLOAKJOB_ENGINE_BIN,
#   CLOAKJOB_ENGINE_TIMEOUT_SECS, CLOAKJOB_REMOTE_URL, CLOAKJOB_REMOTE_TOKEN,
#   CLOAKJOB_REMOTE_TOKEN_HEADER, CLOAKJOB_POLL_TIMEOUT_SECS,
#   CLOAKJOB_POLL_INTERVAL_MS, CLOAKJOB_REQUEST_TIMEOUT_SECS
#
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Per-job workspaces (local engine only)
# ---------------------------------------------------------------------------
[workspace]
# Each job gets a fresh UUID-named directory under this root.
root = "/tmp/cloakjob"

# Remove the job directory when the job ends. Kept by default for debugging.
cleanup = false

# Leave the staged input.png out of the output candidates. By default it is
# ranked like any other image, so an engine that rewrites it in place works.
exclude_input = false

# ---------------------------------------------------------------------------
# Input normalization
# ---------------------------------------------------------------------------
[input]
# Longer-edge bound in pixels when the request doesn't set max_edge.
max_edge = 2048

# Timeout for downloading image_url.
fetch_timeout_secs = 30

# ---------------------------------------------------------------------------
# Engine
# ---------------------------------------------------------------------------
[engine]
# "local" runs the engine binary, "remote" talks to its HTTP service.
strategy = "local"

[engine.local]
# Invoked as: <binary> <args...> -d <workspace> --mode <mode> --format <format>
binary = "fawkes"
args = []

# Kill the engine if it runs longer than this. Omit to wait indefinitely.
# timeout_secs = 600

[engine.remote]
base_url = "http://127.0.0.1:8000"

# Static token sent in token_header on every request. Empty sends no header.
token = ""
token_header = "X-Auth-Token"

# Give up waiting for READY after this many seconds.
poll_timeout_secs = 300

# Delay between status checks.
poll_interval_ms = 2000

# Timeout for each individual upload/status/download request.
request_timeout_secs = 60
"##
}
