//! The request lifecycle engine.
//!
//! Carries a [`ToolRequest`] from receipt to exactly one terminal
//! resolution:
//!
//! ```text
//! NEW ──validate──▶ VALIDATED ──policy──▶ {ALLOWED, DENIED_POLICY, ASKING}
//! ALLOWED ──ratelimit/dispatch──▶ EXECUTED | EXEC_FAILED | RATE_LIMITED
//! ASKING  ──pending_insert──▶ WAITING
//! WAITING ──resolve──▶ {APPROVED, DENIED_USER, TIMED_OUT}
//! APPROVED ──dispatch──▶ EXECUTED | EXEC_FAILED
//! (terminal) ──audit+deliver──▶ DONE | QUEUED_OFFLINE
//! ```
//!
//! Every terminal state appends exactly one audit row, always before the
//! agent learns the outcome. The WAITING resolution is idempotent: the
//! guardian callback and the expiry timer both funnel through
//! [`Store::resolve_pending`]; whichever update lands first wins and the
//! loser exits silently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gatehouse_core::{
    AuditEntry, Decision, GatewayError, OfflineResult, PendingApproval, Resolution, ToolRequest,
};
use gatehouse_dispatch::Executor;
use gatehouse_messenger::{ApprovalPrompt, ApprovalSink, MessengerAdapter, Verdict};
use gatehouse_policy::{build_signature, validate_args, PermissionEngine};
use gatehouse_registry::ToolRegistry;
use gatehouse_store::{ResolveOutcome, Store, StoreError};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::pending::PendingWaiters;
use crate::ratelimit::RateLimiter;

/// Audit `error_kind` recorded for input-validation rejections.
const KIND_INVALID_REQUEST: &str = "invalid_request";
/// Audit `error_kind` recorded for unknown tools.
const KIND_METHOD_NOT_FOUND: &str = "method_not_found";
/// Audit `error_kind` recorded for cap rejections.
const KIND_RATE_LIMITED: &str = "rate_limited";

/// The terminal outcome of one request, as delivered to the agent.
#[derive(Debug)]
pub enum Outcome {
    /// Executed; the payload the agent receives as `result`.
    Success(Value),
    /// Any terminal failure, carrying its wire code and message.
    Failure(GatewayError),
}

impl Outcome {
    /// The payload stored for offline delivery.
    #[must_use]
    pub fn offline_payload(&self) -> Value {
        match self {
            Self::Success(value) => value.clone(),
            Self::Failure(err) => json!({
                "status": "error",
                "code": err.code(),
                "data": err.agent_message(),
            }),
        }
    }
}

/// A request together with its terminal outcome.
#[derive(Debug)]
pub struct Completed {
    /// The request as submitted.
    pub request: ToolRequest,
    /// Its terminal outcome.
    pub outcome: Outcome,
}

/// Everything the engine is built from.
pub struct EngineParams {
    /// The tool registry (immutable after load).
    pub registry: Arc<ToolRegistry>,
    /// The compiled policy.
    pub policy: PermissionEngine,
    /// The service dispatcher.
    pub executor: Arc<Executor>,
    /// The messenger adapter.
    pub messenger: Arc<dyn MessengerAdapter>,
    /// The durable store.
    pub store: Store,
    /// Approval window for ASK decisions.
    pub approval_timeout: Duration,
    /// System-wide ceiling on concurrent pending approvals.
    pub max_pending: u64,
    /// Auto-allow executions per rolling minute.
    pub max_requests_per_minute: u32,
    /// Identity offline results are keyed by.
    pub agent_id: String,
}

/// The concurrent request lifecycle engine.
pub struct RequestEngine {
    registry: Arc<ToolRegistry>,
    policy: PermissionEngine,
    executor: Arc<Executor>,
    messenger: Arc<dyn MessengerAdapter>,
    store: Store,
    rate_limiter: RateLimiter,
    waiters: PendingWaiters,
    in_flight: Mutex<HashSet<String>>,
    approval_timeout: chrono::Duration,
    max_pending: u64,
    agent_id: String,
}

impl RequestEngine {
    /// Build the engine.
    #[must_use]
    pub fn new(params: EngineParams) -> Self {
        Self {
            registry: params.registry,
            policy: params.policy,
            executor: params.executor,
            messenger: params.messenger,
            store: params.store,
            rate_limiter: RateLimiter::new(params.max_requests_per_minute),
            waiters: PendingWaiters::new(),
            in_flight: Mutex::new(HashSet::new()),
            approval_timeout: chrono::Duration::from_std(params.approval_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(900)),
            max_pending: params.max_pending,
            agent_id: params.agent_id,
        }
    }

    /// The durable store (shared with the health endpoint).
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Ids of requests currently in flight (for the shutdown notice).
    #[must_use]
    pub fn outstanding_requests(&self) -> Vec<String> {
        self.in_flight
            .lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Process one tool request to its terminal outcome.
    ///
    /// The returned [`Completed`] has already been audited; the caller
    /// only delivers it (or queues it offline when delivery fails).
    pub async fn process(self: &Arc<Self>, request: ToolRequest) -> Completed {
        // Protocol-level replay guard: a request id may not be reused
        // while its original is in flight or awaiting approval.
        let duplicate = self
            .in_flight
            .lock()
            .map(|mut set| !set.insert(request.request_id.clone()))
            .unwrap_or(true);
        if duplicate {
            return Completed {
                outcome: Outcome::Failure(GatewayError::InvalidRequest(
                    "Duplicate request id".to_string(),
                )),
                request,
            };
        }

        let outcome = self.process_inner(&request).await;

        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&request.request_id);
        }

        Completed { request, outcome }
    }

    async fn process_inner(self: &Arc<Self>, request: &ToolRequest) -> Outcome {
        // Unknown tools are rejected before validation: there is no
        // schema to validate against and nothing to execute.
        if self.registry.lookup(&request.tool_name).is_none() {
            self.audit(
                AuditEntry::immediate(
                    request,
                    request.tool_name.clone(),
                    Decision::Deny,
                    Resolution::DeniedByPolicy,
                )
                .with_error_kind(KIND_METHOD_NOT_FOUND),
            );
            return Outcome::Failure(GatewayError::InvalidRequest(format!(
                "Unknown tool: {}",
                request.tool_name
            )));
        }

        if let Err(rejection) = validate_args(&request.tool_name, &request.args, &self.registry) {
            self.audit(
                AuditEntry::immediate(
                    request,
                    request.tool_name.clone(),
                    Decision::Deny,
                    Resolution::DeniedByPolicy,
                )
                .with_error_kind(KIND_INVALID_REQUEST),
            );
            return Outcome::Failure(GatewayError::InvalidRequest(rejection.to_string()));
        }

        let signature = build_signature(&request.tool_name, &request.args, &self.registry);
        let decision = self.policy.evaluate(&signature);
        info!(
            request_id = %request.request_id,
            signature = %signature,
            decision = %decision,
            "policy evaluated"
        );

        match decision {
            Decision::Allow => {
                if !self.rate_limiter.try_acquire() {
                    self.audit(
                        AuditEntry::immediate(
                            request,
                            &signature,
                            Decision::Allow,
                            Resolution::RateLimited,
                        )
                        .with_error_kind(KIND_RATE_LIMITED),
                    );
                    return Outcome::Failure(GatewayError::RateLimited(
                        "Rate limit exceeded".to_string(),
                    ));
                }
                self.dispatch_and_audit(request, &signature, Decision::Allow, None)
                    .await
            },
            Decision::Deny => {
                self.audit(AuditEntry::immediate(
                    request,
                    &signature,
                    Decision::Deny,
                    Resolution::DeniedByPolicy,
                ));
                Outcome::Failure(GatewayError::PolicyDenied)
            },
            Decision::Ask => self.ask_path(request, &signature).await,
        }
    }

    /// Dispatch an authorized request and audit its terminal state.
    async fn dispatch_and_audit(
        &self,
        request: &ToolRequest,
        signature: &str,
        decision: Decision,
        resolved_by: Option<String>,
    ) -> Outcome {
        match self.executor.execute(&request.tool_name, &request.args).await {
            Ok(data) => {
                let mut entry = AuditEntry::immediate(
                    request,
                    signature,
                    decision,
                    Resolution::Executed,
                )
                .with_result(data.clone());
                if let Some(by) = resolved_by {
                    entry = entry.with_resolved_by(by);
                }
                self.audit(entry);
                Outcome::Success(json!({"status": "executed", "data": data}))
            },
            Err(err) => {
                let kind = err.kind();
                let mut entry = AuditEntry::immediate(
                    request,
                    signature,
                    decision,
                    Resolution::ExecutionFailed,
                )
                .with_error_kind(kind.as_str());
                if let Some(by) = resolved_by {
                    entry = entry.with_resolved_by(by);
                }
                self.audit(entry);
                Outcome::Failure(err.into())
            },
        }
    }

    /// The ASK path: park the request on a rendezvous that the guardian
    /// and the expiry timer race through the store.
    async fn ask_path(self: &Arc<Self>, request: &ToolRequest, signature: &str) -> Outcome {
        let now = Utc::now();
        let pending = PendingApproval {
            request_id: request.request_id.clone(),
            tool_name: request.tool_name.clone(),
            signature: signature.to_string(),
            args: request.args.clone(),
            message_ref: None,
            created_at: now,
            expires_at: now + self.approval_timeout,
        };

        // Waiter first, row second: once the row exists any resolver may
        // win the race, and the winner must find the waiter. The pending
        // quota is enforced inside the insert's critical section.
        let receiver = self.waiters.register(&request.request_id);
        match self
            .store
            .insert_pending_if_capacity(&pending, self.max_pending)
        {
            Ok(true) => {},
            Ok(false) => {
                self.waiters.discard(&request.request_id);
                self.audit(
                    AuditEntry::immediate(
                        request,
                        signature,
                        Decision::Ask,
                        Resolution::RateLimited,
                    )
                    .with_error_kind(KIND_RATE_LIMITED),
                );
                return Outcome::Failure(GatewayError::RateLimited(
                    "Too many pending approvals".to_string(),
                ));
            },
            Err(StoreError::DuplicatePending(_)) => {
                self.waiters.discard(&request.request_id);
                return Outcome::Failure(GatewayError::InvalidRequest(
                    "Duplicate request id".to_string(),
                ));
            },
            Err(other) => {
                self.waiters.discard(&request.request_id);
                return self.internal_failure(request, signature, &other);
            },
        }

        let prompt = ApprovalPrompt::from_pending(&pending);
        let message_ref = match self.messenger.send_approval(&prompt).await {
            Ok(message_ref) => {
                if let Err(e) = self
                    .store
                    .set_pending_message_ref(&request.request_id, &message_ref)
                {
                    warn!(request_id = %request.request_id, error = %e, "cannot record message ref");
                }
                Some(message_ref)
            },
            Err(e) => {
                // Never strand a pending record behind a prompt that no
                // guardian will ever see.
                warn!(request_id = %request.request_id, error = %e, "approval prompt delivery failed");
                let _ = self
                    .store
                    .resolve_pending(&request.request_id, Resolution::ExecutionFailed);
                self.waiters.discard(&request.request_id);
                self.audit(
                    AuditEntry::immediate(
                        request,
                        signature,
                        Decision::Ask,
                        Resolution::ExecutionFailed,
                    )
                    .with_error_kind("connection"),
                );
                let _ = self.store.remove_pending(&request.request_id);
                return Outcome::Failure(GatewayError::execution(
                    gatehouse_core::ExecutionErrorKind::Connection,
                    "approval prompt delivery failed",
                ));
            },
        };

        self.arm_timeout(&request.request_id, pending.expires_at);

        let Ok(verdict) = receiver.await else {
            // Only reachable when the gateway is tearing down; the pending
            // row stays persisted for the next boot's sweep.
            return Outcome::Failure(GatewayError::Internal("gateway shutting down".to_string()));
        };

        let outcome = match &verdict {
            Verdict::Approved { by } => {
                self.dispatch_and_audit(request, signature, Decision::Ask, Some(by.clone()))
                    .await
            },
            Verdict::Denied { by } => {
                self.audit(
                    AuditEntry::immediate(
                        request,
                        signature,
                        Decision::Ask,
                        Resolution::DeniedByUser,
                    )
                    .with_resolved_by(by.clone()),
                );
                Outcome::Failure(GatewayError::UserDenied)
            },
            Verdict::TimedOut => {
                self.audit(
                    AuditEntry::immediate(request, signature, Decision::Ask, Resolution::TimedOut)
                        .with_resolved_by("timeout"),
                );
                Outcome::Failure(GatewayError::ApprovalTimedOut)
            },
        };

        if let Some(message_ref) = &message_ref {
            self.update_prompt(message_ref, signature, &verdict, &outcome).await;
        }
        if let Err(e) = self.store.remove_pending(&request.request_id) {
            warn!(request_id = %request.request_id, error = %e, "cannot remove pending record");
        }

        outcome
    }

    /// Finish a resolution whose request task is gone: the agent
    /// disconnected before the verdict, or the gateway restarted with the
    /// pending record persisted.
    async fn complete_offline(&self, record: PendingApproval, verdict: Verdict) {
        let (payload, outcome) = match &verdict {
            Verdict::Approved { by } => {
                match self
                    .executor
                    .execute(&record.tool_name, &record.args)
                    .await
                {
                    Ok(data) => {
                        self.audit(
                            audit_from_record(&record, Resolution::Executed)
                                .with_resolved_by(by.clone())
                                .with_result(data.clone()),
                        );
                        let payload = json!({"status": "executed", "data": data});
                        (payload, Outcome::Success(Value::Null))
                    },
                    Err(err) => {
                        let kind = err.kind();
                        self.audit(
                            audit_from_record(&record, Resolution::ExecutionFailed)
                                .with_resolved_by(by.clone())
                                .with_error_kind(kind.as_str()),
                        );
                        let gw: GatewayError = err.into();
                        let payload = json!({
                            "status": "error",
                            "code": gw.code(),
                            "data": gw.agent_message(),
                        });
                        (payload, Outcome::Failure(gw))
                    },
                }
            },
            Verdict::Denied { by } => {
                self.audit(
                    audit_from_record(&record, Resolution::DeniedByUser)
                        .with_resolved_by(by.clone()),
                );
                (
                    json!({"status": "denied", "data": "Denied by user"}),
                    Outcome::Failure(GatewayError::UserDenied),
                )
            },
            Verdict::TimedOut => {
                self.audit(
                    audit_from_record(&record, Resolution::TimedOut).with_resolved_by("timeout"),
                );
                (
                    json!({"status": "denied", "data": "Approval timed out"}),
                    Outcome::Failure(GatewayError::ApprovalTimedOut),
                )
            },
        };

        if let Err(e) = self.store.enqueue_offline_result(
            &record.request_id,
            &record.tool_name,
            &payload,
            &self.agent_id,
        ) {
            error!(request_id = %record.request_id, error = %e, "cannot queue offline result");
        }

        if let Some(message_ref) = &record.message_ref {
            self.update_prompt(message_ref, &record.signature, &verdict, &outcome)
                .await;
        }
        if let Err(e) = self.store.remove_pending(&record.request_id) {
            warn!(request_id = %record.request_id, error = %e, "cannot remove pending record");
        }
    }

    /// Queue an undeliverable reply for `get_pending_results`.
    pub fn store_offline(&self, completed: &Completed) {
        let payload = completed.outcome.offline_payload();
        if let Err(e) = self.store.enqueue_offline_result(
            &completed.request.request_id,
            &completed.request.tool_name,
            &payload,
            &self.agent_id,
        ) {
            error!(
                request_id = %completed.request.request_id,
                error = %e,
                "cannot queue offline result"
            );
        }
    }

    /// Atomically drain this agent's offline results.
    ///
    /// # Errors
    ///
    /// Returns the store error; the session maps it to a generic
    /// execution failure.
    pub fn drain_offline(&self) -> Result<Vec<OfflineResult>, StoreError> {
        self.store.drain_offline_results(&self.agent_id)
    }

    /// Arm the expiry timer for a pending record.
    ///
    /// The timer races the guardian through `resolve_pending`; when it
    /// loses, its resolution attempt is a silent no-op.
    pub fn arm_timeout(self: &Arc<Self>, request_id: &str, expires_at: chrono::DateTime<Utc>) {
        let engine = Arc::clone(self);
        let request_id = request_id.to_string();
        tokio::spawn(async move {
            let delay = (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(delay).await;
            engine.resolve(&request_id, Verdict::TimedOut).await;
        });
    }

    /// Sweep expired pending records, resolving each as timed out.
    ///
    /// Used at startup (before the listener binds) and periodically as a
    /// backstop for lost timers. Returns how many records were swept.
    pub async fn sweep_stale_now(&self) -> usize {
        let swept = match self.store.sweep_stale(Utc::now()) {
            Ok(swept) => swept,
            Err(e) => {
                error!(error = %e, "pending sweep failed");
                return 0;
            },
        };
        let count = swept.len();
        for record in swept {
            if let Some(tx) = self.waiters.take(&record.request_id) {
                let _ = tx.send(Verdict::TimedOut);
            } else {
                self.complete_offline(record, Verdict::TimedOut).await;
            }
        }
        count
    }

    async fn update_prompt(
        &self,
        message_ref: &str,
        signature: &str,
        verdict: &Verdict,
        outcome: &Outcome,
    ) {
        let status = match (verdict, outcome) {
            (Verdict::Approved { by }, Outcome::Success(_)) => {
                format!("Approved by {by} — executed\n\n{signature}")
            },
            (Verdict::Approved { by }, Outcome::Failure(_)) => {
                format!("Approved by {by} — execution failed\n\n{signature}")
            },
            (Verdict::Denied { by }, _) => format!("Denied by {by}\n\n{signature}"),
            (Verdict::TimedOut, _) => {
                format!("Expired — no decision within the approval window\n\n{signature}")
            },
        };
        if let Err(e) = self.messenger.update_approval(message_ref, &status).await {
            warn!(message_ref = %message_ref, error = %e, "cannot update approval prompt");
        }
    }

    fn internal_failure(
        &self,
        request: &ToolRequest,
        signature: &str,
        err: &StoreError,
    ) -> Outcome {
        error!(request_id = %request.request_id, error = %err, "store failure");
        self.audit(
            AuditEntry::immediate(
                request,
                signature,
                Decision::Ask,
                Resolution::ExecutionFailed,
            )
            .with_error_kind("other"),
        );
        Outcome::Failure(GatewayError::Internal(err.to_string()))
    }

    fn audit(&self, entry: AuditEntry) {
        if let Err(e) = self.store.append_audit(&entry) {
            error!(request_id = %entry.request_id, error = %e, "audit append failed");
        }
    }
}

#[async_trait]
impl ApprovalSink for RequestEngine {
    async fn resolve(&self, request_id: &str, verdict: Verdict) -> bool {
        let transition = self
            .store
            .resolve_pending(request_id, verdict.resolution());
        match transition {
            Ok(ResolveOutcome::Won(record)) => {
                if let Some(tx) = self.waiters.take(request_id) {
                    if let Err(returned) = tx.send(verdict) {
                        // The request task died between registering and
                        // awaiting; finish offline with the same verdict.
                        self.complete_offline(record, returned).await;
                    }
                } else {
                    self.complete_offline(record, verdict).await;
                }
                true
            },
            Ok(ResolveOutcome::AlreadyResolved(_) | ResolveOutcome::NotFound) => false,
            Err(e) => {
                error!(request_id = %request_id, error = %e, "resolve failed");
                false
            },
        }
    }
}

impl std::fmt::Debug for RequestEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestEngine")
            .field("max_pending", &self.max_pending)
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}

fn audit_from_record(record: &PendingApproval, resolution: Resolution) -> AuditEntry {
    AuditEntry {
        timestamp: Utc::now(),
        request_id: record.request_id.clone(),
        tool_name: record.tool_name.clone(),
        signature: record.signature.clone(),
        args: record.args.clone(),
        decision: Decision::Ask,
        resolution,
        resolved_by: None,
        result: None,
        error_kind: None,
    }
}
