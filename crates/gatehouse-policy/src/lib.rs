//! Gatehouse Policy — the permission engine.
//!
//! Evaluates tool-request signatures against declared policy with strict
//! **deny > allow > ask** precedence, and guards the signature namespace by
//! rejecting argument values that could forge a pattern match before any
//! policy rule is consulted.
//!
//! # Evaluation order
//!
//! 1. Explicit rules, scanned as three bands: every `deny` rule first, then
//!    every `allow`, then every `ask`. The first satisfied band wins — a
//!    broad deny always beats a narrow allow. This is a security property.
//! 2. Defaults, in declared order; first matching pattern wins.
//! 3. Fallback: `Ask`.
//!
//! # Example
//!
//! ```
//! use gatehouse_core::Decision;
//! use gatehouse_policy::{PermissionEngine, PermissionRule, Permissions, PolicyAction};
//!
//! let permissions = Permissions {
//!     rules: vec![PermissionRule::new("ha_call_service(lock.*)", PolicyAction::Deny)],
//!     defaults: vec![
//!         PermissionRule::new("ha_get_*", PolicyAction::Allow),
//!         PermissionRule::new("*", PolicyAction::Ask),
//!     ],
//! };
//! let engine = PermissionEngine::new(&permissions).unwrap();
//! assert_eq!(engine.evaluate("ha_get_state(sensor.t)"), Decision::Allow);
//! assert_eq!(engine.evaluate("ha_call_service(lock.unlock, lock.front)"), Decision::Deny);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod engine;
pub mod rules;
pub mod validate;

mod error;

pub use engine::{build_signature, PermissionEngine};
pub use error::{PolicyError, PolicyResult};
pub use rules::{PermissionRule, Permissions, PolicyAction};
pub use validate::{validate_args, ValidationError};
