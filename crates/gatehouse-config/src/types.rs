//! Typed configuration sections.

use std::collections::BTreeMap;

use gatehouse_dispatch::{AuthScheme, ErrorMapping, HealthProbe};
use serde::Deserialize;

/// Default approval window, seconds.
pub const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 900;

/// Top-level gateway configuration (`config.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Listener settings.
    pub gateway: GatewaySection,
    /// Agent handshake settings.
    pub agent: AgentSection,
    /// Messenger adapter selection and parameters.
    pub messenger: MessengerSection,
    /// Trusted services, keyed by name.
    pub services: BTreeMap<String, ServiceSection>,
    /// Persistence settings.
    pub storage: StorageSection,
    /// Approval window, seconds.
    #[serde(default = "default_approval_timeout")]
    pub approval_timeout: u64,
    /// Resource caps.
    #[serde(default)]
    pub rate_limit: RateLimitSection,
}

fn default_approval_timeout() -> u64 {
    DEFAULT_APPROVAL_TIMEOUT_SECS
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySection {
    /// Bind address for the agent channel.
    pub host: String,
    /// Bind port for the agent channel.
    pub port: u16,
    /// Bind port for the unauthenticated health endpoint.
    #[serde(default = "GatewaySection::default_health_port")]
    pub health_port: u16,
    /// TLS material for the terminator in front of the gateway.
    #[serde(default)]
    pub tls: Option<TlsSection>,
    /// Explicit opt-in to run without TLS material.
    #[serde(default)]
    pub insecure: bool,
}

impl GatewaySection {
    fn default_health_port() -> u16 {
        8081
    }
}

/// TLS certificate and key paths.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsSection {
    /// Certificate path.
    pub cert: String,
    /// Private key path.
    pub key: String,
}

/// Agent handshake settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// Shared bearer token the agent presents in `auth`.
    pub token: String,
}

/// Messenger adapter selection.
#[derive(Debug, Clone, Deserialize)]
pub struct MessengerSection {
    /// Adapter name (`telegram` is the only built-in).
    #[serde(rename = "type")]
    pub kind: String,
    /// Telegram parameters, required when `type: telegram`.
    #[serde(default)]
    pub telegram: Option<TelegramSection>,
}

/// Telegram adapter parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramSection {
    /// Bot token.
    pub token: String,
    /// Chat the prompts are posted to.
    pub chat_id: i64,
    /// Guardians allowed to resolve approvals.
    pub allowed_users: Vec<u64>,
}

/// One service entry under `services.<name>`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSection {
    /// Base URL.
    pub url: String,
    /// Credential scheme.
    pub auth: AuthScheme,
    /// Handler factory name.
    #[serde(default = "ServiceSection::default_handler")]
    pub handler: String,
    /// Health probe.
    #[serde(default)]
    pub health: HealthProbe,
    /// Request timeout, seconds.
    #[serde(default = "ServiceSection::default_timeout")]
    pub timeout_secs: u64,
    /// Tools file, relative to the config file.
    #[serde(default)]
    pub tools: Option<String>,
    /// Status-specific error messages.
    #[serde(default)]
    pub errors: Vec<ErrorMapping>,
}

impl ServiceSection {
    fn default_handler() -> String {
        "http".to_string()
    }

    fn default_timeout() -> u64 {
        gatehouse_dispatch::config::DEFAULT_TIMEOUT_SECS
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// Store kind (`sqlite` is the only built-in).
    #[serde(rename = "type")]
    pub kind: String,
    /// Database file path.
    pub path: String,
}

/// Resource caps.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    /// System-wide ceiling on concurrent pending approvals.
    #[serde(default = "RateLimitSection::default_max_pending")]
    pub max_pending_approvals: u64,
    /// Auto-allow executions permitted per rolling minute.
    #[serde(default = "RateLimitSection::default_max_per_minute")]
    pub max_requests_per_minute: u32,
}

impl RateLimitSection {
    fn default_max_pending() -> u64 {
        10
    }

    fn default_max_per_minute() -> u32 {
        60
    }
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            max_pending_approvals: Self::default_max_pending(),
            max_requests_per_minute: Self::default_max_per_minute(),
        }
    }
}
