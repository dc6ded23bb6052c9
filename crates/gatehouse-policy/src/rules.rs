//! Policy rule types, as declared in `permissions.yaml`.

use serde::Deserialize;

/// What a matching rule does with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyAction {
    /// Execute without human involvement.
    Allow,
    /// Reject unconditionally.
    Deny,
    /// Route through human approval.
    Ask,
}

/// One policy entry: a glob pattern over signatures and an action.
///
/// Patterns use fnmatch semantics: `*` matches any run of characters,
/// `?` a single character, `[…]` a character class.
#[derive(Debug, Clone, Deserialize)]
pub struct PermissionRule {
    /// Glob pattern matched against the request signature.
    pub pattern: String,
    /// Action taken when the pattern matches.
    pub action: PolicyAction,
    /// Optional operator-facing note; never consulted at runtime.
    #[serde(default)]
    pub description: String,
}

impl PermissionRule {
    /// Create a rule without a description.
    #[must_use]
    pub fn new(pattern: impl Into<String>, action: PolicyAction) -> Self {
        Self {
            pattern: pattern.into(),
            action,
            description: String::new(),
        }
    }
}

/// A full policy: explicit overrides plus fallback defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Permissions {
    /// Explicit rules, evaluated with deny > allow > ask precedence.
    #[serde(default)]
    pub rules: Vec<PermissionRule>,
    /// Fallback patterns, walked in order; first match wins.
    #[serde(default)]
    pub defaults: Vec<PermissionRule>,
}
