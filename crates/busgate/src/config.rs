//! Configuration management for the bus gateway.

use anyhow::{Context, Result};
use busgate_amqp::config::AmqpConfig;
use busgate_amqp::env::ReadEnv;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

const ENV_HTTP_PORT: &str = "HTTP_PORT";

const DEFAULT_HTTP_PORT: u16 = 80;
const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 20_000;
const DEFAULT_MESSAGE_TTL_MS: u64 = 10_000;

/// Margin added to the reply queue's server-side expiry so an orphaned queue
/// self-destructs even if client-side cleanup never runs.
const QUEUE_EXPIRES_MARGIN: Duration = Duration::from_millis(10_000);

/// Slack the client-side wait allows over the broker's own TTL handling.
const WAIT_MARGIN: Duration = Duration::from_millis(2_000);

/// Complete gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub amqp: AmqpConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// Windows governing one request round trip, milliseconds on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// How long a worker is given to reply once the request is published.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// TTL stamped on every published request message.
    #[serde(default = "default_message_ttl_ms")]
    pub message_ttl_ms: u64,
}

impl TimingConfig {
    pub fn message_ttl(&self) -> Duration {
        Duration::from_millis(self.message_ttl_ms)
    }

    /// Server-side reply queue expiry: response window + message TTL + margin.
    pub fn queue_expires(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms + self.message_ttl_ms)
            + QUEUE_EXPIRES_MARGIN
    }

    /// Client-side wait for a correlated reply: response window + message TTL
    /// + slack. No HTTP caller is left hanging past this point.
    pub fn wait_window(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms + self.message_ttl_ms) + WAIT_MARGIN
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        Ok(config)
    }

    /// Load configuration from environment variables
    /// (`AMQP_HOST`/`AMQP_PORT`/`AMQP_LOGIN`/`AMQP_PASSWORD`, `HTTP_PORT`).
    pub fn from_env<E: ReadEnv>(env: &E) -> Self {
        let port = env
            .var(ENV_HTTP_PORT)
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_HTTP_PORT);

        Self {
            amqp: AmqpConfig::from_env(env),
            http: HttpConfig { port },
            timing: TimingConfig::default(),
        }
    }

    /// Override how long a worker is given to reply.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.timing.response_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Override the TTL stamped on published requests.
    pub fn with_message_ttl(mut self, ttl: Duration) -> Self {
        self.timing.message_ttl_ms = ttl.as_millis() as u64;
        self
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http.port = port;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            amqp: AmqpConfig::default(),
            http: HttpConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            message_ttl_ms: default_message_ttl_ms(),
        }
    }
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_response_timeout_ms() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT_MS
}

fn default_message_ttl_ms() -> u64 {
    DEFAULT_MESSAGE_TTL_MS
}
