//! The adapter and sink traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::MessengerResult;
use crate::prompt::{ApprovalPrompt, Verdict};

/// The engine side of the approval rendezvous.
///
/// Adapters call [`ApprovalSink::resolve`] for every guardian decision.
/// The call is idempotent: stale or duplicate verdicts are absorbed by the
/// engine's first-writer-wins resolution and reported back so the adapter
/// can tell the human the prompt had already been handled.
#[async_trait]
pub trait ApprovalSink: Send + Sync {
    /// Deliver a verdict for a request id.
    ///
    /// Returns `true` when this verdict performed the terminal transition,
    /// `false` when it was a stale or duplicate no-op.
    async fn resolve(&self, request_id: &str, verdict: Verdict) -> bool;
}

/// A pluggable messenger back-end.
///
/// Implementations present approval prompts to the configured guardians,
/// reject callbacks from any other principal, and deliver decisions to the
/// registered [`ApprovalSink`].
#[async_trait]
pub trait MessengerAdapter: Send + Sync {
    /// Present an approval prompt to the guardians.
    ///
    /// Returns an adapter-specific message reference used later to update
    /// the prompt with the outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::MessengerError`] when delivery fails; the engine
    /// resolves the pending request as failed rather than stranding it.
    async fn send_approval(&self, prompt: &ApprovalPrompt) -> MessengerResult<String>;

    /// Edit a previously sent prompt to reflect its outcome
    /// (approved / denied / expired).
    ///
    /// # Errors
    ///
    /// Returns a [`crate::MessengerError`] when the edit fails. Callers
    /// treat this as best-effort.
    async fn update_approval(&self, message_ref: &str, status: &str) -> MessengerResult<()>;

    /// Start listening for guardian callbacks, delivering verdicts to
    /// `sink`.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::MessengerError`] when the listener cannot start.
    async fn start(&self, sink: Arc<dyn ApprovalSink>) -> MessengerResult<()>;

    /// Stop listening and release resources.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::MessengerError`] when shutdown fails.
    async fn stop(&self) -> MessengerResult<()>;

    /// Whether the messenger back-end is currently reachable.
    async fn health_check(&self) -> bool;
}
