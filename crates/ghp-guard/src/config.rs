//! Relay configuration: compiled-in defaults, optionally overridden by a
//! TOML file.
//!
//! The file path comes from `GHP_GUARD_CONFIG`, falling back to
//! `ghp-guard.toml` in the working directory. A missing file is not an error.

use ghp_guard_core::{GuardError, GuardResult, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_TOKENS};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "GHP_GUARD_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "ghp-guard.toml";

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub listen: ListenSection,
    #[serde(default)]
    pub upstream: UpstreamSection,
    #[serde(default)]
    pub log: LogSection,
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub validation: ValidationSection,
}

/// `[listen]` section: the port the PLC targets.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenSection {
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

impl Default for ListenSection {
    fn default() -> Self {
        Self {
            port: default_listen_port(),
        }
    }
}

/// `[upstream]` section: the real GHP ComCell endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamSection {
    #[serde(default = "default_upstream_host")]
    pub host: String,
    #[serde(default = "default_upstream_port")]
    pub port: u16,
}

impl Default for UpstreamSection {
    fn default() -> Self {
        Self {
            host: default_upstream_host(),
            port: default_upstream_port(),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_file")]
    pub file: String,
    /// Diagnostic filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Copy event lines to stdout.
    #[serde(default = "default_true")]
    pub console: bool,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
            console: true,
        }
    }
}

/// `[relay]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub framing: Framing,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            framing: Framing::default(),
            max_frame_len: default_max_frame_len(),
        }
    }
}

/// `[validation]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidationSection {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

/// How controller bytes are grouped into messages before validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// One read is one message.
    #[default]
    Chunk,
    /// Buffer until ETX; each ETX-terminated span is one message.
    Etx,
}

fn default_listen_port() -> u16 {
    5020
}
fn default_upstream_host() -> String {
    "127.0.0.1".to_string()
}
fn default_upstream_port() -> u16 {
    5021
}
fn default_log_file() -> String {
    "proxy_log.txt".to_string()
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_true() -> bool {
    true
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_max_frame_len() -> usize {
    65536
}
fn default_max_tokens() -> usize {
    DEFAULT_MAX_TOKENS
}

/// Resolved relay configuration (paths expanded, values checked).
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub listen_port: u16,
    pub upstream_host: String,
    pub upstream_port: u16,
    pub log_file: PathBuf,
    pub log_level: String,
    pub log_console: bool,
    pub chunk_size: usize,
    pub framing: Framing,
    pub max_frame_len: usize,
    pub max_tokens: usize,
}

impl GuardConfig {
    /// Load config from the file named by `GHP_GUARD_CONFIG`, or the default
    /// file name.
    pub fn from_env() -> GuardResult<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load(Some(&path))
    }

    /// Load config from a TOML file. Missing file means defaults.
    pub fn load(config_path: Option<&Path>) -> GuardResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| GuardError::Config(format!("parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        Self::from_file(file_config)
    }

    fn from_file(file: ConfigFile) -> GuardResult<Self> {
        if file.listen.port == 0 {
            return Err(GuardError::Config("listen.port must be non-zero".into()));
        }
        if file.upstream.port == 0 {
            return Err(GuardError::Config("upstream.port must be non-zero".into()));
        }
        if file.upstream.host.trim().is_empty() {
            return Err(GuardError::Config("upstream.host must not be empty".into()));
        }
        if file.relay.chunk_size == 0 {
            return Err(GuardError::Config("relay.chunk_size must be non-zero".into()));
        }
        if file.relay.max_frame_len == 0 {
            return Err(GuardError::Config("relay.max_frame_len must be non-zero".into()));
        }
        if file.validation.max_tokens == 0 {
            return Err(GuardError::Config("validation.max_tokens must be non-zero".into()));
        }

        Ok(Self {
            listen_port: file.listen.port,
            upstream_host: file.upstream.host,
            upstream_port: file.upstream.port,
            log_file: expand_tilde_str(&file.log.file),
            log_level: file.log.level,
            log_console: file.log.console,
            chunk_size: file.relay.chunk_size,
            framing: file.relay.framing,
            max_frame_len: file.relay.max_frame_len,
            max_tokens: file.validation.max_tokens,
        })
    }

    /// `host:port` of the GHP endpoint.
    pub fn upstream_addr(&self) -> String {
        format!("{}:{}", self.upstream_host, self.upstream_port)
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
