//! Gatehouse Messenger — the approval-channel contract.
//!
//! A messenger adapter presents pending tool requests to the authorized
//! human guardians and delivers their verdicts back to the engine. The
//! engine side of the rendezvous is the [`ApprovalSink`]; adapters call it
//! for every guardian decision and for nothing else.
//!
//! Adapters must tolerate the full lifecycle of distributed approval UIs:
//!
//! - **Stale callbacks.** A decision for a request id the engine no longer
//!   knows resolves to a no-op; the adapter should tell the human the
//!   prompt has expired.
//! - **Duplicate decisions.** Two taps on "Allow" resolve once, because
//!   the engine's resolution is idempotent. The adapter does not need its
//!   own dedup, only a sensible answer for the second tap.
//! - **Restart.** In-flight prompts may outlive either side; neither end
//!   may assume the other remembers a request id.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapter;
pub mod prompt;

mod error;

pub use adapter::{ApprovalSink, MessengerAdapter};
pub use error::{MessengerError, MessengerResult};
pub use prompt::{ApprovalPrompt, Verdict};
