//! Service wiring types.
//!
//! Deserialized directly from the `services.<name>` section of the gateway
//! configuration. Owned by the dispatcher; the config crate only assembles
//! them.

use serde::Deserialize;

/// Default per-service request timeout, seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How requests to a service authenticate.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthScheme {
    /// No credentials attached.
    None,
    /// `Authorization: Bearer {token}`.
    Bearer {
        /// The bearer token.
        token: String,
    },
    /// A custom header carrying the token.
    Header {
        /// Header name.
        header_name: String,
        /// Header value.
        token: String,
    },
    /// Token passed as a query parameter on every request.
    Query {
        /// Query parameter name.
        query_param: String,
        /// The token value.
        token: String,
    },
    /// HTTP basic authentication.
    Basic {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
}

/// Health probe definition for a service.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthProbe {
    /// HTTP method to probe with.
    #[serde(default = "HealthProbe::default_method")]
    pub method: String,
    /// Path to probe, relative to the service URL.
    #[serde(default = "HealthProbe::default_path")]
    pub path: String,
    /// The status that counts as healthy.
    #[serde(default = "HealthProbe::default_status")]
    pub expect_status: u16,
}

impl HealthProbe {
    fn default_method() -> String {
        "GET".to_string()
    }

    fn default_path() -> String {
        "/".to_string()
    }

    fn default_status() -> u16 {
        200
    }
}

impl Default for HealthProbe {
    fn default() -> Self {
        Self {
            method: Self::default_method(),
            path: Self::default_path(),
            expect_status: Self::default_status(),
        }
    }
}

/// Maps an upstream status code to an agent-safe message.
///
/// The message template may reference `{status}` and `{body}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorMapping {
    /// Upstream status this mapping applies to.
    pub status: u16,
    /// Message template.
    pub message: String,
}

impl ErrorMapping {
    /// Render the template for a concrete response.
    #[must_use]
    pub fn render(&self, status: u16, body: &str) -> String {
        self.message
            .replace("{status}", &status.to_string())
            .replace("{body}", body)
    }
}

/// Complete wiring for one trusted service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Service name (the `services.<name>` key).
    pub name: String,
    /// Base URL; tool paths are appended to it.
    pub url: String,
    /// Credential scheme.
    pub auth: AuthScheme,
    /// Handler factory name (`http` unless a plugin is configured).
    pub handler: String,
    /// Health probe definition.
    pub health: HealthProbe,
    /// Request timeout, seconds.
    pub timeout_secs: u64,
    /// Status-specific error messages.
    pub errors: Vec<ErrorMapping>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_scheme_deserializes_by_tag() {
        let bearer: AuthScheme = serde_yaml::from_str("type: bearer\ntoken: secret").unwrap();
        assert!(matches!(bearer, AuthScheme::Bearer { ref token } if token == "secret"));

        let query: AuthScheme =
            serde_yaml::from_str("type: query\nquery_param: apikey\ntoken: k").unwrap();
        assert!(matches!(query, AuthScheme::Query { ref query_param, .. } if query_param == "apikey"));

        assert!(serde_yaml::from_str::<AuthScheme>("type: cookie\ntoken: x").is_err());
    }

    #[test]
    fn error_mapping_renders_placeholders() {
        let mapping = ErrorMapping {
            status: 503,
            message: "service busy ({status}): {body}".into(),
        };
        assert_eq!(
            mapping.render(503, "try later"),
            "service busy (503): try later"
        );
    }

    #[test]
    fn health_probe_defaults() {
        let probe = HealthProbe::default();
        assert_eq!(probe.method, "GET");
        assert_eq!(probe.path, "/");
        assert_eq!(probe.expect_status, 200);
    }
}
