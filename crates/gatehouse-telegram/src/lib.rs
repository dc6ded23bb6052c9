//! Gatehouse Telegram — approval prompts over Telegram.
//!
//! Implements the [`MessengerAdapter`] contract with inline keyboards:
//! each pending request becomes one message in the configured chat with
//! Allow/Deny buttons, and button taps come back as callback queries.
//!
//! Guardian checks happen here, on every callback: only user ids on the
//! configured allow-list may resolve approvals; everyone else gets a
//! notice and no resolution. Stale or duplicate taps (the engine's
//! idempotent resolution reports them) answer "Expired" / "Already
//! handled" so a guardian who taps twice — or taps a prompt that survived
//! a gateway restart — always sees a sensible reply.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod callback;
mod messenger;

pub use messenger::TelegramMessenger;
