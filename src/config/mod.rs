use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::backoff::ReconnectPolicy;
use crate::queue::QueueConfig;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub queue: QueueSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Base WebSocket URL; `userId`, `userType`, and `token` are appended as
    /// query parameters at connect time.
    #[serde(default = "default_endpoint_url")]
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier for exponential growth.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Maximum number of automatic reconnection attempts.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Jitter factor (0.0 to 1.0).
    #[serde(default)]
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct QueueSettings {
    /// Maximum number of buffered offline messages. Unbounded when unset.
    #[serde(default)]
    pub max_size: Option<usize>,
    /// Time-to-live for buffered messages in seconds. No expiry when unset.
    #[serde(default)]
    pub message_ttl_seconds: Option<u64>,
}

fn default_endpoint_url() -> String {
    "wss://rt.roadcall.dev/ws".to_string()
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000 // 30 seconds
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    5
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // ENDPOINT__URL, RECONNECT__MAX_ATTEMPTS, QUEUE__MAX_SIZE, etc.
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Backoff policy built from the reconnect section.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay_ms: self.reconnect.base_delay_ms,
            multiplier: self.reconnect.multiplier,
            max_delay_ms: self.reconnect.max_delay_ms,
            max_attempts: self.reconnect.max_attempts,
            jitter_factor: self.reconnect.jitter_factor,
        }
    }

    /// Pending-queue configuration built from the queue section.
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_size: self.queue.max_size,
            message_ttl_seconds: self.queue.message_ttl_seconds,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: default_endpoint_url(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
            jitter_factor: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.endpoint.url, "wss://rt.roadcall.dev/ws");
        assert_eq!(settings.reconnect.base_delay_ms, 1_000);
        assert_eq!(settings.reconnect.max_attempts, 5);
        assert_eq!(settings.queue.max_size, None);
        assert_eq!(settings.queue.message_ttl_seconds, None);
    }

    #[test]
    fn test_policy_conversion() {
        let mut settings = Settings::default();
        settings.reconnect.base_delay_ms = 250;
        settings.reconnect.max_attempts = 3;

        let policy = settings.reconnect_policy();
        assert_eq!(policy.base_delay_ms, 250);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.multiplier, 2.0);
    }
}
