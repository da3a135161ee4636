//! Load node config from file and environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use ucnp_core::SessionConfig;

/// Node configuration. File: ~/.config/ucnp/config.toml or
/// /etc/ucnp/config.toml. Env overrides: UCNP_MAILBOX_DIR,
/// UCNP_POLL_INTERVAL_MS, UCNP_REANNOUNCE_INTERVAL_MS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Shared rendezvous directory (default: system temp dir + "ucnp").
    #[serde(default = "default_mailbox_dir")]
    pub mailbox_dir: PathBuf,
    /// Poll loop iteration interval (default 100).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// DISCOVERY/HANDSHAKE re-broadcast cadence (default 2000).
    #[serde(default = "default_reannounce_interval_ms")]
    pub reannounce_interval_ms: u64,
}

fn default_mailbox_dir() -> PathBuf {
    std::env::temp_dir().join("ucnp")
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_reannounce_interval_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mailbox_dir: default_mailbox_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            reannounce_interval_ms: default_reannounce_interval_ms(),
        }
    }
}

impl Config {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            reannounce_interval: Duration::from_millis(self.reannounce_interval_ms),
            ..SessionConfig::default()
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_overrides(&mut c, |key| std::env::var(key).ok());
    c
}

/// Apply UCNP_* overrides from a lookup (the process environment in
/// production). Unparsable values are ignored and the prior value kept.
fn apply_overrides(c: &mut Config, get: impl Fn(&str) -> Option<String>) {
    if let Some(dir) = get("UCNP_MAILBOX_DIR") {
        c.mailbox_dir = PathBuf::from(dir);
    }
    if let Some(s) = get("UCNP_POLL_INTERVAL_MS") {
        if let Ok(ms) = s.parse::<u64>() {
            c.poll_interval_ms = ms;
        }
    }
    if let Some(s) = get("UCNP_REANNOUNCE_INTERVAL_MS") {
        if let Ok(ms) = s.parse::<u64>() {
            c.reannounce_interval_ms = ms;
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/ucnp/config.toml"));
    }
    out.push(PathBuf::from("/etc/ucnp/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}
