//! Request lifecycle data model.
//!
//! Every record here is immutable once constructed: the engine moves a
//! request between *states* by creating new records (audit rows, offline
//! results), never by mutating old ones.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool arguments as received from the agent.
///
/// A `BTreeMap` so iteration order is deterministic — the fallback
/// signature format depends on lexicographic key order.
pub type ToolArgs = BTreeMap<String, Value>;

/// A tool invocation submitted by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Opaque request identifier, unique per agent session (agent-supplied).
    pub request_id: String,
    /// Name of the tool to invoke.
    pub tool_name: String,
    /// Argument map (string keys, JSON scalar values).
    pub args: ToolArgs,
}

impl ToolRequest {
    /// Create a new tool request.
    #[must_use]
    pub fn new(request_id: impl Into<String>, tool_name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            request_id: request_id.into(),
            tool_name: tool_name.into(),
            args,
        }
    }
}

/// Result of policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Execute immediately (subject to the auto-allow rate limit).
    Allow,
    /// Solicit human approval before executing.
    Ask,
    /// Reject without execution.
    Deny,
}

impl Decision {
    /// Canonical lowercase form, as stored in audit rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Ask => "ask",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "ask" => Ok(Self::Ask),
            "deny" => Ok(Self::Deny),
            other => Err(format!("unknown decision: {other}")),
        }
    }
}

/// Terminal state of a request lifecycle.
///
/// Exactly one resolution is recorded per request. `Approved` appears only
/// transiently (a human said yes but dispatch has not finished); the audit
/// row always carries one of the other variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Human approved; dispatch pending.
    Approved,
    /// Human rejected the request.
    DeniedByUser,
    /// The approval window elapsed with no decision.
    TimedOut,
    /// Dispatch completed successfully.
    Executed,
    /// Dispatch was attempted and failed.
    ExecutionFailed,
    /// Policy rejected the request (includes input-validation rejections).
    DeniedByPolicy,
    /// A resource cap rejected the request before any side effect.
    RateLimited,
}

impl Resolution {
    /// Canonical lowercase form, as stored in audit and pending rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::DeniedByUser => "denied_by_user",
            Self::TimedOut => "timed_out",
            Self::Executed => "executed",
            Self::ExecutionFailed => "execution_failed",
            Self::DeniedByPolicy => "denied_by_policy",
            Self::RateLimited => "rate_limited",
        }
    }

    /// Whether this resolution carries a successful execution result.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Executed)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "denied_by_user" => Ok(Self::DeniedByUser),
            "timed_out" => Ok(Self::TimedOut),
            "executed" => Ok(Self::Executed),
            "execution_failed" => Ok(Self::ExecutionFailed),
            "denied_by_policy" => Ok(Self::DeniedByPolicy),
            "rate_limited" => Ok(Self::RateLimited),
            other => Err(format!("unknown resolution: {other}")),
        }
    }
}

/// A durable record of a request awaiting human decision.
///
/// Inserted when policy says ASK, destroyed (after archival to the audit
/// log) on resolution or expiry sweep. Exactly one terminal transition per
/// record — the store enforces first-writer-wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingApproval {
    /// The request awaiting approval.
    pub request_id: String,
    /// Tool name, for prompt rendering and offline execution.
    pub tool_name: String,
    /// Policy-matching signature, shown to the guardian.
    pub signature: String,
    /// Original argument map.
    pub args: ToolArgs,
    /// Messenger message reference, for editing the prompt after resolution.
    pub message_ref: Option<String>,
    /// When the pending record was created.
    pub created_at: DateTime<Utc>,
    /// When the approval window closes.
    pub expires_at: DateTime<Utc>,
}

/// One append-only audit row — the complete story of a request.
///
/// Written exactly once, at the terminal state, and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// When the terminal state was reached.
    pub timestamp: DateTime<Utc>,
    /// The request this row describes.
    pub request_id: String,
    /// Requested tool.
    pub tool_name: String,
    /// Policy-matching signature.
    pub signature: String,
    /// Argument map as submitted.
    pub args: ToolArgs,
    /// Policy decision.
    pub decision: Decision,
    /// Terminal resolution.
    pub resolution: Resolution,
    /// Who resolved it (guardian identity, `"timeout"`, or `None` for
    /// immediate paths).
    pub resolved_by: Option<String>,
    /// Execution result blob, when the request executed.
    pub result: Option<Value>,
    /// Error classification for failed requests.
    pub error_kind: Option<String>,
}

impl AuditEntry {
    /// Build an entry for a request resolved without human involvement.
    #[must_use]
    pub fn immediate(
        request: &ToolRequest,
        signature: impl Into<String>,
        decision: Decision,
        resolution: Resolution,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: request.request_id.clone(),
            tool_name: request.tool_name.clone(),
            signature: signature.into(),
            args: request.args.clone(),
            decision,
            resolution,
            resolved_by: None,
            result: None,
            error_kind: None,
        }
    }

    /// Attach an execution result blob.
    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Attach an error classification.
    #[must_use]
    pub fn with_error_kind(mut self, kind: impl Into<String>) -> Self {
        self.error_kind = Some(kind.into());
        self
    }

    /// Attach the resolving principal.
    #[must_use]
    pub fn with_resolved_by(mut self, by: impl Into<String>) -> Self {
        self.resolved_by = Some(by.into());
        self
    }
}

/// A resolution whose reply could not reach its originating session.
///
/// Buffered under the agent identity and drained exactly once by
/// `get_pending_results`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineResult {
    /// The request this result belongs to.
    pub request_id: String,
    /// Tool that was (or would have been) executed.
    pub tool_name: String,
    /// The reply payload the agent would have received online.
    pub result: Value,
    /// When the result was buffered.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_round_trips_through_str() {
        for d in [Decision::Allow, Decision::Ask, Decision::Deny] {
            assert_eq!(d.as_str().parse::<Decision>().unwrap(), d);
        }
        assert!("maybe".parse::<Decision>().is_err());
    }

    #[test]
    fn resolution_round_trips_through_str() {
        for r in [
            Resolution::Approved,
            Resolution::DeniedByUser,
            Resolution::TimedOut,
            Resolution::Executed,
            Resolution::ExecutionFailed,
            Resolution::DeniedByPolicy,
            Resolution::RateLimited,
        ] {
            assert_eq!(r.as_str().parse::<Resolution>().unwrap(), r);
        }
    }

    #[test]
    fn only_executed_is_success() {
        assert!(Resolution::Executed.is_success());
        assert!(!Resolution::Approved.is_success());
        assert!(!Resolution::TimedOut.is_success());
        assert!(!Resolution::RateLimited.is_success());
    }

    #[test]
    fn audit_entry_builders() {
        let mut args = ToolArgs::new();
        args.insert("entity_id".into(), Value::String("sensor.t".into()));
        let request = ToolRequest::new("r-1", "ha_get_state", args);

        let entry = AuditEntry::immediate(
            &request,
            "ha_get_state(sensor.t)",
            Decision::Allow,
            Resolution::Executed,
        )
        .with_result(serde_json::json!({"state": "21.5"}))
        .with_resolved_by("guardian:42");

        assert_eq!(entry.request_id, "r-1");
        assert_eq!(entry.decision, Decision::Allow);
        assert_eq!(entry.resolution, Resolution::Executed);
        assert_eq!(entry.resolved_by.as_deref(), Some("guardian:42"));
        assert!(entry.result.is_some());
        assert!(entry.error_kind.is_none());
    }

    #[test]
    fn audit_entry_serializes_snake_case_enums() {
        let request = ToolRequest::new("r-2", "t", ToolArgs::new());
        let entry = AuditEntry::immediate(&request, "t", Decision::Deny, Resolution::DeniedByPolicy);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"decision\":\"deny\""));
        assert!(json.contains("\"resolution\":\"denied_by_policy\""));
    }
}
