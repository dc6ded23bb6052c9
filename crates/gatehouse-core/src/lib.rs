//! Gatehouse Core — shared data model for the execution gateway.
//!
//! This crate defines the types every other gatehouse crate speaks:
//!
//! - **Request lifecycle model**: [`ToolRequest`], [`Decision`],
//!   [`Resolution`], [`PendingApproval`], [`AuditEntry`], [`OfflineResult`]
//! - **Error taxonomy**: [`GatewayError`] with its wire error codes
//! - **Wire envelope**: the JSON-RPC 2.0 request/response frames exchanged
//!   with agents, in [`protocol`]
//!
//! A request flows `NEW → VALIDATED → {ALLOWED, DENIED_POLICY, ASKING}`,
//! then through dispatch or human approval to exactly one terminal
//! [`Resolution`], which is audited before the agent learns the outcome.
//!
//! # Example
//!
//! ```
//! use gatehouse_core::{Decision, Resolution};
//!
//! // Decisions come from policy; resolutions are terminal lifecycle states.
//! assert_eq!(Decision::Allow.as_str(), "allow");
//! assert!(Resolution::Executed.is_success());
//! assert!(!Resolution::DeniedByUser.is_success());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod model;
pub mod protocol;

pub use error::{CoreResult, ExecutionErrorKind, GatewayError};
pub use model::{
    AuditEntry, Decision, OfflineResult, PendingApproval, Resolution, ToolArgs, ToolRequest,
};
pub use protocol::{ErrorObject, RequestFrame, ResponseFrame, PROTOCOL_VERSION};

/// Agent identity used in the single-agent deployment model.
///
/// Offline results are keyed by this identity so a future multi-identity
/// store schema needs no migration.
pub const DEFAULT_AGENT_ID: &str = "default";
