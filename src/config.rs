use lazy_static::lazy_static;
use log::warn;
use parking_lot::RwLock;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_PATHS: [&str; 2] = ["./config.toml", "./vcompress_config.toml"];

const ENV_CACHE_DIR: &str = "VCOMPRESS_CACHE_DIR";
const ENV_QUALITY: &str = "VCOMPRESS_QUALITY";
const ENV_POLL_TIMEOUT_US: &str = "VCOMPRESS_POLL_TIMEOUT_US";

pub const DEFAULT_QUALITY: &str = "medium";
pub const DEFAULT_POLL_TIMEOUT_US: u64 = 10_000;

lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::new());
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory compressed outputs are written to
    pub cache_dir: PathBuf,
    /// Quality keyword used when a request names none
    pub default_quality: String,
    /// Upper bound of a single codec poll
    pub poll_timeout_us: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache_dir: env::temp_dir().join("vcompress"),
            default_quality: DEFAULT_QUALITY.to_string(),
            poll_timeout_us: DEFAULT_POLL_TIMEOUT_US,
        }
    }
}

impl Config {
    fn new() -> Self {
        let files = CONFIG_PATHS
            .iter()
            .filter_map(|path| fs::read_to_string(path).ok());
        Config::layered(files, |key| env::var(key).ok())
    }

    /// Defaults, then each config file in order, then environment overrides.
    fn layered<I, F>(files: I, lookup: F) -> Self
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        for content in files {
            config.apply_file(&content);
        }
        config.apply_env(lookup);
        config
    }

    /// Re-reads environment and config files into the process-wide config.
    pub fn reload() {
        let new_config = Config::new();
        *CONFIG.write() = new_config;
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.set("cache_dir", &dir);
        }
        if let Some(quality) = lookup(ENV_QUALITY) {
            self.set("default_quality", &quality);
        }
        if let Some(timeout) = lookup(ENV_POLL_TIMEOUT_US) {
            self.set("poll_timeout_us", &timeout);
        }
    }

    /// Applies `key = value` lines; comments and unknown keys are skipped.
    fn apply_file(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim().trim_matches('"').trim_matches('\'');
                self.set(key.trim(), value);
            }
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        match key {
            "cache_dir" => self.cache_dir = PathBuf::from(value),
            "default_quality" => self.default_quality = value.to_ascii_lowercase(),
            "poll_timeout_us" => match value.parse::<u64>() {
                Ok(timeout) => self.poll_timeout_us = timeout,
                Err(e) => warn!("Ignoring poll_timeout_us={:?}: {}", value, e),
            },
            _ => {}
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_micros(self.poll_timeout_us)
    }
}

/// Snapshot of the process-wide configuration.
pub fn get_config() -> Config {
    CONFIG.read().clone()
}

pub fn get_cache_dir() -> PathBuf {
    CONFIG.read().cache_dir.clone()
}

pub fn get_default_quality() -> String {
    CONFIG.read().default_quality.clone()
}

pub fn get_poll_timeout() -> Duration {
    CONFIG.read().poll_timeout()
}

/// Creates a default config template file if it doesn't exist
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        std::fs::write(path, TEMPLATE)?;
    }
    Ok(())
}

const TEMPLATE: &str = r#"# vcompress configuration
# Copy to 'config.toml' (or 'vcompress_config.toml') and adjust.

# Directory compressed files are written to
# cache_dir = "/tmp/vcompress"

# low, medium or high
default_quality = "medium"

# Codec poll timeout in microseconds
poll_timeout_us = 10000
"#;
