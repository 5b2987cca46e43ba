//! Application configuration
//!
//! Centralized configuration using the `config` crate. Values are layered:
//! built-in defaults, then `config/default`, then `config/{RUN_MODE}`, then
//! `RINGLINE__*` environment variables.

use config::builder::{ConfigBuilder, DefaultState};
use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::fmt;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub signaling: SignalingConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub ringtone: RingtoneConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; without one the in-memory store is used
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
            idle_timeout_secs: default_idle_timeout(),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret
    pub jwt_secret: String,

    /// JWT token expiration in minutes
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_minutes: i64,
}

fn default_jwt_expiration() -> i64 {
    1440 // 24 hours
}

/// How ringing requests that nobody answers are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicyKind {
    /// Leave them ringing until someone acts
    #[default]
    Legacy,
    /// Auto-reject after `ringing_ttl_secs`
    Ttl,
    /// Auto-reject older ringing requests when a newer one arrives
    Supersede,
}

impl fmt::Display for StalePolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StalePolicyKind::Legacy => write!(f, "legacy"),
            StalePolicyKind::Ttl => write!(f, "ttl"),
            StalePolicyKind::Supersede => write!(f, "supersede"),
        }
    }
}

/// Call signaling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SignalingConfig {
    /// Broadcaster-side poll period for incoming calls
    #[serde(default = "default_poll_interval")]
    pub incoming_poll_interval_ms: u64,

    /// Caller-side poll period for the outbound request status
    #[serde(default = "default_poll_interval")]
    pub caller_poll_interval_ms: u64,

    /// Max ringing requests returned per incoming poll
    #[serde(default = "default_incoming_page_size")]
    pub incoming_page_size: i64,

    #[serde(default = "default_outgoing_page_size")]
    pub outgoing_page_size: i64,

    #[serde(default)]
    pub stale_policy: StalePolicyKind,

    /// Used by the `ttl` policy
    #[serde(default = "default_ringing_ttl")]
    pub ringing_ttl_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Session creation attempts before the failure is escalated
    #[serde(default = "default_session_retry_attempts")]
    pub session_retry_attempts: u32,

    /// Base backoff between session creation attempts (doubles each time)
    #[serde(default = "default_session_retry_backoff")]
    pub session_retry_backoff_ms: u64,

    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_incoming_page_size() -> i64 {
    10
}

fn default_outgoing_page_size() -> i64 {
    20
}

fn default_ringing_ttl() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_session_retry_attempts() -> u32 {
    3
}

fn default_session_retry_backoff() -> u64 {
    200
}

fn default_reconcile_interval() -> u64 {
    30
}

impl SignalingConfig {
    pub fn incoming_poll_interval(&self) -> Duration {
        Duration::from_millis(self.incoming_poll_interval_ms)
    }

    pub fn caller_poll_interval(&self) -> Duration {
        Duration::from_millis(self.caller_poll_interval_ms)
    }

    pub fn ringing_ttl(&self) -> Duration {
        Duration::from_secs(self.ringing_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn session_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.session_retry_backoff_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            incoming_poll_interval_ms: default_poll_interval(),
            caller_poll_interval_ms: default_poll_interval(),
            incoming_page_size: default_incoming_page_size(),
            outgoing_page_size: default_outgoing_page_size(),
            stale_policy: StalePolicyKind::Legacy,
            ringing_ttl_secs: default_ringing_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            session_retry_attempts: default_session_retry_attempts(),
            session_retry_backoff_ms: default_session_retry_backoff(),
            reconcile_interval_secs: default_reconcile_interval(),
        }
    }
}

/// Billing-specific configuration
#[derive(Debug, Deserialize, Clone)]
pub struct BillingConfig {
    /// Platform share applied when a broadcaster has no override
    #[serde(default = "default_commission_rate")]
    pub default_commission_rate: Decimal,
}

fn default_commission_rate() -> Decimal {
    Decimal::new(30, 2)
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            default_commission_rate: default_commission_rate(),
        }
    }
}

/// Ring cue parameters
#[derive(Debug, Deserialize, Clone)]
pub struct RingtoneConfig {
    #[serde(default = "default_first_tone")]
    pub first_tone_hz: f32,

    #[serde(default = "default_second_tone")]
    pub second_tone_hz: f32,

    /// Length of each tone
    #[serde(default = "default_tone_ms")]
    pub tone_ms: u64,

    /// Start of the second tone relative to the start of the first
    #[serde(default = "default_tone_offset")]
    pub offset_ms: u64,

    /// Cue repeat period
    #[serde(default = "default_ring_period")]
    pub period_ms: u64,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Peak amplitude per tone, 0.0..=1.0
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
}

fn default_first_tone() -> f32 {
    440.0
}

fn default_second_tone() -> f32 {
    480.0
}

fn default_tone_ms() -> u64 {
    400
}

fn default_tone_offset() -> u64 {
    200
}

fn default_ring_period() -> u64 {
    3000
}

fn default_sample_rate() -> u32 {
    8000
}

fn default_amplitude() -> f32 {
    0.25
}

impl Default for RingtoneConfig {
    fn default() -> Self {
        Self {
            first_tone_hz: default_first_tone(),
            second_tone_hz: default_second_tone(),
            tone_ms: default_tone_ms(),
            offset_ms: default_tone_offset(),
            period_ms: default_ring_period(),
            sample_rate: default_sample_rate(),
            amplitude: default_amplitude(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config files
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("RINGLINE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Self::defaults()?
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("RINGLINE").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("auth.jwt_expiration_minutes", 1440)?
            .set_default("signaling.stale_policy", "legacy")?
            .set_default("signaling.incoming_poll_interval_ms", 2000)?
            .set_default("signaling.caller_poll_interval_ms", 2000)?
            .set_default("signaling.incoming_page_size", 10)?
            .set_default("billing.default_commission_rate", "0.30")
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
