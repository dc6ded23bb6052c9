//! Prompt and verdict types crossing the messenger boundary.

use chrono::{DateTime, Utc};
use gatehouse_core::{PendingApproval, Resolution, ToolArgs};
use serde::{Deserialize, Serialize};

/// A tool request presented to the guardians for decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalPrompt {
    /// Id of the request awaiting approval.
    pub request_id: String,
    /// Requested tool.
    pub tool_name: String,
    /// Human-readable signature (the concise line the guardian reads).
    pub signature: String,
    /// Full argument map, for adapters that render details.
    pub args: ToolArgs,
    /// When the approval window closes.
    pub expires_at: DateTime<Utc>,
}

impl ApprovalPrompt {
    /// Build the prompt for a pending record.
    #[must_use]
    pub fn from_pending(pending: &PendingApproval) -> Self {
        Self {
            request_id: pending.request_id.clone(),
            tool_name: pending.tool_name.clone(),
            signature: pending.signature.clone(),
            args: pending.args.clone(),
            expires_at: pending.expires_at,
        }
    }
}

/// A guardian's (or the clock's) decision on a pending request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Verdict {
    /// The guardian allowed the request.
    Approved {
        /// Guardian identity (adapter-specific, e.g. a Telegram user id).
        by: String,
    },
    /// The guardian rejected the request.
    Denied {
        /// Guardian identity.
        by: String,
    },
    /// The approval window elapsed with no decision.
    TimedOut,
}

impl Verdict {
    /// The resolution this verdict transitions the pending record to.
    #[must_use]
    pub fn resolution(&self) -> Resolution {
        match self {
            Self::Approved { .. } => Resolution::Approved,
            Self::Denied { .. } => Resolution::DeniedByUser,
            Self::TimedOut => Resolution::TimedOut,
        }
    }

    /// The principal recorded as having resolved the request.
    #[must_use]
    pub fn resolved_by(&self) -> &str {
        match self {
            Self::Approved { by } | Self::Denied { by } => by,
            Self::TimedOut => "timeout",
        }
    }

    /// Whether the request may proceed to dispatch.
    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}
