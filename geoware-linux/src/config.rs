//! Load config from file and environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use geoware_core::{Address, Position};
use serde::Deserialize;

/// Daemon configuration. File: ~/.config/geoware/config.toml or /etc/geoware/config.toml.
/// Env overrides: GEOWARE_ADDRESS, GEOWARE_X, GEOWARE_Y, GEOWARE_PORT, GEOWARE_RANGE.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Link address, `a.b` (default 1.0).
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default)]
    pub x: f32,
    #[serde(default)]
    pub y: f32,
    /// Radio emulation UDP port (default 47474).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Transmit range: nodes farther than this do not hear us (default 50).
    #[serde(default = "default_radio_range")]
    pub radio_range: f32,
    /// Interval between core ticks in milliseconds (default 100).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Relays give up after this many hops (default 16).
    #[serde(default = "default_max_hops")]
    pub max_hops: u8,
    #[serde(default)]
    pub node: geoware_core::Config,
}

fn default_address() -> String {
    "1.0".to_string()
}
fn default_port() -> u16 {
    47474
}
fn default_radio_range() -> f32 {
    50.0
}
fn default_tick_ms() -> u64 {
    100
}
fn default_max_hops() -> u8 {
    16
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            x: 0.0,
            y: 0.0,
            port: default_port(),
            radio_range: default_radio_range(),
            tick_ms: default_tick_ms(),
            max_hops: default_max_hops(),
            node: geoware_core::Config::default(),
        }
    }
}

impl Config {
    pub fn node_address(&self) -> Result<Address> {
        self.address
            .parse()
            .with_context(|| format!("bad node address {:?}", self.address))
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// Load config: an explicit file must exist and parse; otherwise merge default,
/// then the first config file found (if any), then env vars.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut c = match path {
        Some(p) => read_file(p)?,
        None => load_default_file().unwrap_or_default(),
    };
    apply_overrides(&mut c, |k| std::env::var(k).ok());
    Ok(c)
}

fn apply_overrides(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(s) = var("GEOWARE_ADDRESS") {
        c.address = s;
    }
    if let Some(v) = var("GEOWARE_X").and_then(|s| s.parse().ok()) {
        c.x = v;
    }
    if let Some(v) = var("GEOWARE_Y").and_then(|s| s.parse().ok()) {
        c.y = v;
    }
    if let Some(v) = var("GEOWARE_PORT").and_then(|s| s.parse().ok()) {
        c.port = v;
    }
    if let Some(v) = var("GEOWARE_RANGE").and_then(|s| s.parse().ok()) {
        c.radio_range = v;
    }
}

fn read_file(p: &Path) -> Result<Config> {
    let s = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parsing {}", p.display()))
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/geoware/config.toml"));
    }
    out.push(PathBuf::from("/etc/geoware/config.toml"));
    out
}

fn load_default_file() -> Option<Config> {
    let p = config_paths().into_iter().find(|p| p.exists())?;
    match read_file(&p) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::warn!("ignoring config: {:#}", e);
            None
        }
    }
}
