//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.lsgate/config.json`) and environment.
//! Every sandbox constant (program, allowlists, denylist, bounds) is configurable but
//! defaults to the grammar the `ls` gateway has always enforced.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Command gate and execution settings.
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

/// Gateway bind, port, and auth settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP and WebSocket (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Auth settings. When absent, defaults to no auth for loopback bind.
    #[serde(default)]
    pub auth: GatewayAuthConfig,
}

/// Gateway auth: token or none (loopback-only when none).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayAuthConfig {
    /// "none" = no shared secret (only safe when bind is loopback). "token" = require connect.auth.token.
    #[serde(default)]
    pub mode: GatewayAuthMode,

    /// Shared secret for WebSocket connect. Overridden by LSGATE_GATEWAY_TOKEN env.
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayAuthMode {
    /// No auth; allow only when bind is loopback.
    #[default]
    None,

    /// Require connect.auth.token to match configured token.
    Token,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth: GatewayAuthConfig::default(),
        }
    }
}

/// The one program callers may run.
pub const DEFAULT_PROGRAM: &str = "ls";

/// Short-option letters accepted in a `-xyz` bundle.
pub const DEFAULT_SHORT_OPTIONS: &str = "aAbBcCdDfFgGhHiIlLmMnNoOpPqQrRsStTuUvVwWxX1Z";

/// Substrings that invalidate any argument token containing them.
pub const DEFAULT_FORBIDDEN: &[&str] = &["&&", ";", "|", "`", ",", "'", "\""];

/// Long options accepted verbatim (no `=value` forms).
pub const DEFAULT_LONG_OPTIONS: &[&str] = &[
    "--all",
    "--almost-all",
    "--author",
    "--escape",
    "--block-size",
    "--ignore-backups",
    "--directory",
    "--dired",
    "--classify",
    "--file-type",
    "--format",
    "--full-time",
    "--group-directories-first",
    "--no-group",
    "--human-readable",
    "--si",
    "--dereference-command-line",
    "--dereference-command-line-symlink-to-dir",
    "--hide",
    "--hyperlink",
    "--indicator-style",
    "--inode",
    "--ignore",
    "--kibibytes",
    "--literal",
    "--hide-control-chars",
    "--show-control-chars",
    "--quote-name",
    "--quoting-style",
    "--reverse",
    "--recursive",
    "--size",
    "--sort",
    "--time",
    "--time-style",
    "--tabsize",
    "--width",
    "--context",
    "--zero",
    "--help",
    "--version",
];

/// Sandbox root, command grammar, and per-request bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfig {
    /// Default listing directory. Overridden by LSGATE_SANDBOX_ROOT env. Default ~/.lsgate/data.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Executable name looked up on PATH; also the only accepted first token.
    #[serde(default = "default_program")]
    pub program: String,

    /// When true, the target directory must resolve under the root (absolute paths and `..` escapes are refused).
    #[serde(default = "default_true")]
    pub confine: bool,

    #[serde(default = "default_long_options")]
    pub long_options: Vec<String>,

    #[serde(default = "default_short_options")]
    pub short_options: String,

    #[serde(default = "default_forbidden")]
    pub forbidden: Vec<String>,

    /// Raw commands longer than this are rejected before tokenizing.
    #[serde(default = "default_max_command_bytes")]
    pub max_command_bytes: usize,

    /// Cap on captured bytes per stream (stdout and stderr each).
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// Kill the child after this many milliseconds. 0 disables the timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_program() -> String {
    DEFAULT_PROGRAM.to_string()
}

fn default_true() -> bool {
    true
}

fn default_long_options() -> Vec<String> {
    DEFAULT_LONG_OPTIONS.iter().map(|s| s.to_string()).collect()
}

fn default_short_options() -> String {
    DEFAULT_SHORT_OPTIONS.to_string()
}

fn default_forbidden() -> Vec<String> {
    DEFAULT_FORBIDDEN.iter().map(|s| s.to_string()).collect()
}

fn default_max_command_bytes() -> usize {
    1024
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: None,
            program: default_program(),
            confine: true,
            long_options: default_long_options(),
            short_options: default_short_options(),
            forbidden: default_forbidden(),
            max_command_bytes: default_max_command_bytes(),
            max_output_bytes: default_max_output_bytes(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Trimmed, non-empty value of an environment variable.
fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the gateway token: env LSGATE_GATEWAY_TOKEN overrides config.
pub fn resolve_gateway_token(config: &Config) -> Option<String> {
    env_non_empty("LSGATE_GATEWAY_TOKEN").or_else(|| {
        config
            .gateway
            .auth
            .token
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("LSGATE_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".lsgate").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Default sandbox root when neither env nor config sets one: `data` next to the config file.
pub fn default_sandbox_root(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("data")
}

/// Resolve the sandbox root: env LSGATE_SANDBOX_ROOT, then `sandbox.root` (relative paths are
/// resolved against the config file's parent), then the default `data` directory.
pub fn resolve_sandbox_root(config: &Config, config_path: &Path) -> PathBuf {
    if let Some(root) = env_non_empty("LSGATE_SANDBOX_ROOT") {
        return PathBuf::from(root);
    }
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.sandbox.root {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                config_parent.join(d)
            }
        }
        _ => default_sandbox_root(config_path),
    }
}

/// Load config from the given path (or LSGATE_CONFIG_PATH / default). Missing file => default config.
/// Returns the config and the path that was used (for resolving the sandbox root).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
