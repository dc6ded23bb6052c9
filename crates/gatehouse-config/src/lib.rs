//! Gatehouse Config — typed configuration for the execution gateway.
//!
//! Loads and validates three kinds of YAML documents:
//!
//! - `config.yaml` — gateway listener, agent token, messenger wiring,
//!   services, storage, timeouts, and rate limits
//! - `permissions.yaml` — the policy's rules and defaults
//! - per-service tool files, referenced from `services.<name>.tools` and
//!   resolved relative to the config file
//!
//! `${VAR}` references in any string value are substituted from the
//! environment before typing; an unset variable is a fatal error naming
//! the variable. Every validation failure is fatal at startup — the
//! gateway never runs with a partial configuration.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod env;
pub mod loader;
pub mod types;

mod error;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load, load_permissions, LoadedConfig};
pub use types::{
    AgentSection, Config, GatewaySection, MessengerSection, RateLimitSection, ServiceSection,
    StorageSection, TelegramSection, TlsSection,
};
