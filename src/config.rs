//! Runtime configuration from environment variables (and `.env`).

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_BROADCAST_CAPACITY: usize = 256;
const DEFAULT_STORE_WATCH_SECS: u64 = 10;
const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// File store root; `None` keeps everything in memory
    pub data_dir: Option<PathBuf>,
    /// Fallback polling interval for sessions without a live channel
    pub poll_interval: Duration,
    pub broadcast_capacity: usize,
    /// `None` disables the store watcher
    pub store_watch_interval: Option<Duration>,
    pub static_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            data_dir: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            store_watch_interval: Some(Duration::from_secs(DEFAULT_STORE_WATCH_SECS)),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
        }
    }
}

/// Parse `name`, warning and using `default` when it is set but invalid.
fn parse_var<T: FromStr>(name: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse() {
            Ok(value) => value,
            Err(err) => {
                warn!(var = name, value = %raw, error = %err, "invalid value; using default");
                default
            }
        },
        _ => default,
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let bind_addr = match non_empty_var("BIND_ADDR") {
            Some(raw) => raw.parse().unwrap_or_else(|err| {
                warn!(value = %raw, error = %err, "invalid BIND_ADDR; using {}", DEFAULT_BIND_ADDR);
                defaults.bind_addr
            }),
            None => defaults.bind_addr,
        };

        let poll_secs = parse_var("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS).max(1);
        let broadcast_capacity =
            parse_var("BROADCAST_CAPACITY", DEFAULT_BROADCAST_CAPACITY).max(1);
        let watch_secs = parse_var("STORE_WATCH_SECS", DEFAULT_STORE_WATCH_SECS);

        Self {
            bind_addr,
            data_dir: non_empty_var("DATA_DIR").map(PathBuf::from),
            poll_interval: Duration::from_secs(poll_secs),
            broadcast_capacity,
            store_watch_interval: (watch_secs > 0).then(|| Duration::from_secs(watch_secs)),
            static_dir: non_empty_var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
        }
    }
}
