//! Gatehouse Store — durable state for the execution gateway.
//!
//! One embedded `SQLite` database holds three tables:
//!
//! - `audit_log` — append-only; exactly one row per request, written at the
//!   terminal state and never mutated.
//! - `pending_requests` — requests awaiting human decision. The
//!   [`Store::resolve_pending`] conditional update is the single
//!   synchronization point between the approval path and the timeout path:
//!   first writer wins, losers observe a no-op.
//! - `offline_results` — resolutions whose reply could not be delivered,
//!   drained exactly once per result.
//!
//! The connection sits behind an `Arc<Mutex<_>>` (single-writer invariant);
//! every operation is a short critical section.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod store;

pub use error::{StoreError, StoreResult};
pub use store::{ResolveOutcome, Store};
