//! Application-level configuration loading for the realtime tunables.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "RETRO_LIVE_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Outbound queue capacity of each duplex connection.
    pub client_queue_capacity: usize,
    /// Queue capacity of each push-stream subscriber.
    pub subscriber_queue_capacity: usize,
    /// Interval between keep-alive pings on idle duplex connections.
    pub ping_interval: Duration,
    /// Silence allowed from a duplex peer before it is considered dead.
    ///
    /// Always longer than [`AppConfig::ping_interval`] so a live peer gets to answer a ping.
    pub pong_wait: Duration,
    /// Upper bound on a single outbound frame write.
    pub write_timeout: Duration,
    /// Largest inbound frame accepted before the connection is dropped.
    pub max_message_size: usize,
    /// Interval between `ping` events on push streams.
    pub stream_keep_alive: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        config = ?app_config,
                        "loaded realtime settings from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
///
/// Every field is optional; missing ones keep their default.
struct RawConfig {
    client_queue_capacity: usize,
    subscriber_queue_capacity: usize,
    ping_interval_secs: u64,
    pong_wait_secs: u64,
    write_timeout_secs: u64,
    max_message_size: usize,
    stream_keep_alive_secs: u64,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            client_queue_capacity: 256,
            subscriber_queue_capacity: 256,
            ping_interval_secs: 54,
            pong_wait_secs: 60,
            write_timeout_secs: 10,
            max_message_size: 4096,
            stream_keep_alive_secs: 30,
        }
    }
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let ping_interval_secs = value.ping_interval_secs.max(1);
        Self {
            client_queue_capacity: value.client_queue_capacity.max(1),
            subscriber_queue_capacity: value.subscriber_queue_capacity.max(1),
            ping_interval: Duration::from_secs(ping_interval_secs),
            pong_wait: Duration::from_secs(value.pong_wait_secs.max(ping_interval_secs + 1)),
            write_timeout: Duration::from_secs(value.write_timeout_secs.max(1)),
            max_message_size: value.max_message_size,
            stream_keep_alive: Duration::from_secs(value.stream_keep_alive_secs.max(1)),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let raw: RawConfig = serde_json::from_str(r#"{"client_queue_capacity": 8}"#).unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.client_queue_capacity, 8);
        assert_eq!(config.ping_interval, Duration::from_secs(54));
        assert_eq!(config.pong_wait, Duration::from_secs(60));
        assert_eq!(config.max_message_size, 4096);
    }

    #[test]
    fn zero_capacities_are_clamped() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"client_queue_capacity": 0, "ping_interval_secs": 0}"#)
                .unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.client_queue_capacity, 1);
        assert_eq!(config.ping_interval, Duration::from_secs(1));
    }

    #[test]
    fn pong_wait_outlasts_the_ping_interval() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"ping_interval_secs": 30, "pong_wait_secs": 10}"#).unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.pong_wait, Duration::from_secs(31));
    }
}
