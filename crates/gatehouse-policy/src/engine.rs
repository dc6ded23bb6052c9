//! Signature building and policy evaluation.

use gatehouse_core::{Decision, ToolArgs};
use gatehouse_registry::{stringify_arg, ToolRegistry};
use globset::{Glob, GlobMatcher};

use crate::error::{PolicyError, PolicyResult};
use crate::rules::{PermissionRule, Permissions, PolicyAction};

/// Build the deterministic policy-matching signature for a request.
///
/// When the registry knows the tool, its signature template drives the
/// parts. Otherwise the fallback is `tool(v1, v2, …)` with values ordered
/// by lexicographic argument-key order, so the same request always yields
/// the same signature. A request with no parts is the bare tool name.
///
/// Callers must have validated the args first ([`crate::validate_args`]);
/// signature building itself is a pure function and performs no checks.
#[must_use]
pub fn build_signature(tool_name: &str, args: &ToolArgs, registry: &ToolRegistry) -> String {
    let parts = registry
        .signature_parts(tool_name, args)
        .unwrap_or_else(|| args.values().map(stringify_arg).collect());

    if parts.is_empty() {
        tool_name.to_string()
    } else {
        format!("{tool_name}({})", parts.join(", "))
    }
}

/// A compiled policy rule.
struct CompiledRule {
    matcher: GlobMatcher,
    action: PolicyAction,
}

impl CompiledRule {
    fn compile(rule: &PermissionRule) -> PolicyResult<Self> {
        let glob = Glob::new(&rule.pattern).map_err(|source| PolicyError::InvalidPattern {
            pattern: rule.pattern.clone(),
            source,
        })?;
        Ok(Self {
            matcher: glob.compile_matcher(),
            action: rule.action,
        })
    }

    fn matches(&self, signature: &str) -> bool {
        self.matcher.is_match(signature)
    }
}

/// Evaluates signatures against the declared policy.
///
/// Globs are compiled once at construction; evaluation is lock-free and
/// allocation-free.
pub struct PermissionEngine {
    rules: Vec<CompiledRule>,
    defaults: Vec<CompiledRule>,
}

impl PermissionEngine {
    /// Compile a policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidPattern`] for any pattern that fails
    /// to compile. Fatal at startup.
    pub fn new(permissions: &Permissions) -> PolicyResult<Self> {
        Ok(Self {
            rules: permissions
                .rules
                .iter()
                .map(CompiledRule::compile)
                .collect::<PolicyResult<_>>()?,
            defaults: permissions
                .defaults
                .iter()
                .map(CompiledRule::compile)
                .collect::<PolicyResult<_>>()?,
        })
    }

    /// Evaluate a signature.
    ///
    /// Explicit rules first, as three bands in strict priority — deny,
    /// then allow, then ask; a matching deny wins regardless of how
    /// specific a matching allow is. Then defaults in declared order.
    /// Unmatched signatures fall back to [`Decision::Ask`].
    #[must_use]
    pub fn evaluate(&self, signature: &str) -> Decision {
        for band in [PolicyAction::Deny, PolicyAction::Allow, PolicyAction::Ask] {
            for rule in &self.rules {
                if rule.action == band && rule.matches(signature) {
                    return decision_for(band);
                }
            }
        }

        for default in &self.defaults {
            if default.matches(signature) {
                return decision_for(default.action);
            }
        }

        Decision::Ask
    }
}

impl std::fmt::Debug for PermissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionEngine")
            .field("rules", &self.rules.len())
            .field("defaults", &self.defaults.len())
            .finish()
    }
}

fn decision_for(action: PolicyAction) -> Decision {
    match action {
        PolicyAction::Allow => Decision::Allow,
        PolicyAction::Deny => Decision::Deny,
        PolicyAction::Ask => Decision::Ask,
    }
}
