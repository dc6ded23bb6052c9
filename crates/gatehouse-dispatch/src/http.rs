//! The generic, declaration-driven HTTP handler.
//!
//! Executes tool requests whose shape is fully described by their
//! [`ToolDefinition`]: method, path template, body exclusions, and
//! response wrapping. Adding a tool to an HTTP service is a YAML change,
//! never a code change.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_core::{ExecutionErrorKind, ToolArgs};
use gatehouse_registry::{stringify_arg, ToolDefinition};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::{AuthScheme, ServiceConfig};
use crate::error::{DispatchError, DispatchResult};
use crate::handler::ServiceHandler;

/// Characters escaped inside an interpolated path segment: everything but
/// RFC 3986 unreserved.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Timeout for health probes, independent of the service request timeout.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Declarative HTTP executor for one service.
pub struct HttpHandler {
    config: ServiceConfig,
    base_url: String,
    tools: HashMap<String, ToolDefinition>,
    client: reqwest::Client,
}

impl HttpHandler {
    /// Build the handler and its HTTP client.
    ///
    /// Bearer and custom-header credentials become client default headers;
    /// basic and query credentials are applied per request.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Config`] when the credentials cannot form
    /// valid headers or the client cannot be constructed.
    pub fn new(config: ServiceConfig, tools: Vec<ToolDefinition>) -> DispatchResult<Self> {
        let mut headers = HeaderMap::new();
        match &config.auth {
            AuthScheme::Bearer { token } => {
                let value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| DispatchError::Config(format!("bearer token: {e}")))?;
                headers.insert(reqwest::header::AUTHORIZATION, value);
            },
            AuthScheme::Header { header_name, token } => {
                let name = HeaderName::from_bytes(header_name.as_bytes())
                    .map_err(|e| DispatchError::Config(format!("header name: {e}")))?;
                let value = HeaderValue::from_str(token)
                    .map_err(|e| DispatchError::Config(format!("header token: {e}")))?;
                headers.insert(name, value);
            },
            AuthScheme::None | AuthScheme::Query { .. } | AuthScheme::Basic { .. } => {},
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DispatchError::Config(format!("http client: {e}")))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            tools: tools.into_iter().map(|t| (t.name.clone(), t)).collect(),
            config,
            client,
        })
    }

    fn unreachable_error(&self, err: &reqwest::Error) -> DispatchError {
        let kind = if err.is_timeout() || err.is_connect() {
            ExecutionErrorKind::Connection
        } else {
            ExecutionErrorKind::Other
        };
        DispatchError::failed(kind, format!("service unreachable: {}", self.config.name))
    }

    fn build_request(
        &self,
        tool: &ToolDefinition,
        args: &ToolArgs,
    ) -> DispatchResult<reqwest::RequestBuilder> {
        let spec = tool.request.as_ref().ok_or_else(|| {
            DispatchError::failed(
                ExecutionErrorKind::Protocol,
                format!("tool {} has no request definition", tool.name),
            )
        })?;

        let method = Method::from_bytes(spec.method.to_uppercase().as_bytes()).map_err(|_| {
            DispatchError::failed(
                ExecutionErrorKind::Protocol,
                format!("tool {} has invalid method {}", tool.name, spec.method),
            )
        })?;

        let (path, path_args) = interpolate_path(&spec.path, args);
        let url = format!("{}{path}", self.base_url);

        let mut request = self.client.request(method.clone(), &url);

        match &self.config.auth {
            AuthScheme::Query { query_param, token } => {
                request = request.query(&[(query_param.as_str(), token.as_str())]);
            },
            AuthScheme::Basic { username, password } => {
                request = request.basic_auth(username, Some(password));
            },
            AuthScheme::None | AuthScheme::Bearer { .. } | AuthScheme::Header { .. } => {},
        }

        if method == Method::POST || method == Method::PUT || method == Method::PATCH {
            request = request.json(&build_body(spec.body_exclude.as_slice(), &path_args, args));
        }

        Ok(request)
    }

    fn map_error_status(&self, status: StatusCode, body: &str) -> DispatchError {
        let code = status.as_u16();
        for mapping in &self.config.errors {
            if mapping.status == code {
                return DispatchError::failed(
                    ExecutionErrorKind::Other,
                    mapping.render(code, body),
                );
            }
        }
        match code {
            401 => DispatchError::failed(
                ExecutionErrorKind::Auth,
                "service authentication failed",
            ),
            404 => DispatchError::failed(ExecutionErrorKind::NotFound, "resource not found"),
            _ => DispatchError::failed(
                ExecutionErrorKind::Other,
                format!("api error {code}: {body}"),
            ),
        }
    }
}

#[async_trait]
impl ServiceHandler for HttpHandler {
    async fn execute(&self, tool_name: &str, args: &ToolArgs) -> DispatchResult<Value> {
        let tool = self.tools.get(tool_name).ok_or_else(|| {
            DispatchError::failed(
                ExecutionErrorKind::NotFound,
                format!("unknown tool: {tool_name}"),
            )
        })?;

        let request = self.build_request(tool, args)?;
        debug!(service = %self.config.name, tool = %tool_name, "dispatching");

        let response = request.send().await.map_err(|e| self.unreachable_error(&e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.unreachable_error(&e))?;

        if !status.is_success() {
            return Err(self.map_error_status(status, &body));
        }

        let parsed: Value = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).map_err(|_| {
                DispatchError::failed(
                    ExecutionErrorKind::Protocol,
                    format!("service {} returned a non-JSON body", self.config.name),
                )
            })?
        };

        match tool.response.as_ref().and_then(|r| r.wrap.as_deref()) {
            Some(wrap) => {
                let mut wrapped = Map::new();
                wrapped.insert(wrap.to_string(), parsed);
                Ok(Value::Object(wrapped))
            },
            None => Ok(parsed),
        }
    }

    async fn health_check(&self) -> bool {
        let probe = &self.config.health;
        let Ok(method) = Method::from_bytes(probe.method.to_uppercase().as_bytes()) else {
            return false;
        };
        let url = format!("{}{}", self.base_url, probe.path);
        match self
            .client
            .request(method, &url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().as_u16() == probe.expect_status,
            Err(e) => {
                debug!(service = %self.config.name, error = %e, "health probe failed");
                false
            },
        }
    }

    async fn close(&self) {
        // The client pool drains when the handler drops.
    }
}

impl std::fmt::Debug for HttpHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpHandler")
            .field("service", &self.config.name)
            .field("tools", &self.tools.len())
            .finish_non_exhaustive()
    }
}

/// Interpolate `{arg}` placeholders in a path template, URL-encoding each
/// substituted value. Returns the rendered path and the set of args bound
/// into it (always excluded from request bodies).
fn interpolate_path(template: &str, args: &ToolArgs) -> (String, HashSet<String>) {
    let mut rendered = String::with_capacity(template.len());
    let mut bound = HashSet::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        match tail.find('}') {
            Some(close) if tail[..close].chars().all(|c| c.is_alphanumeric() || c == '_') => {
                let name = &tail[..close];
                let value = args.get(name).map(stringify_arg).unwrap_or_default();
                rendered.push_str(&utf8_percent_encode(&value, SEGMENT).to_string());
                bound.insert(name.to_string());
                rest = &tail[close + 1..];
            },
            _ => {
                // Not a placeholder; emit the brace literally.
                rendered.push('{');
                rest = tail;
            },
        }
    }
    rendered.push_str(rest);
    (rendered, bound)
}

/// Build the JSON body: every arg except declared exclusions and
/// path-bound args.
fn build_body(exclude: &[String], path_args: &HashSet<String>, args: &ToolArgs) -> Value {
    let body: Map<String, Value> = args
        .iter()
        .filter(|(k, _)| !exclude.contains(k) && !path_args.contains(k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ErrorMapping, HealthProbe};
    use gatehouse_registry::loader::parse_tools_str;
    use httpmock::prelude::*;
    use serde_json::json;

    const TOOLS: &str = r#"
tools:
  ha_get_state:
    signature: "{entity_id}"
    args:
      entity_id: { required: true }
    request:
      method: GET
      path: /api/states/{entity_id}
    response:
      wrap: state
  ha_call_service:
    signature: "{domain}.{service}, {entity_id}"
    args:
      domain: { required: true }
      service: { required: true }
      entity_id: {}
    request:
      method: POST
      path: /api/services/{domain}/{service}
      body_exclude: [domain, service]
  ha_no_request: {}
"#;

    fn handler_for(server: &MockServer, auth: AuthScheme, errors: Vec<ErrorMapping>) -> HttpHandler {
        let config = ServiceConfig {
            name: "homeassistant".into(),
            url: server.base_url(),
            auth,
            handler: "http".into(),
            health: HealthProbe {
                method: "GET".into(),
                path: "/api/".into(),
                expect_status: 200,
            },
            timeout_secs: 5,
            errors,
        };
        let tools = parse_tools_str(TOOLS, "homeassistant").unwrap();
        HttpHandler::new(config, tools).unwrap()
    }

    fn args(pairs: &[(&str, &str)]) -> ToolArgs {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect()
    }

    #[tokio::test]
    async fn get_request_interpolates_path_and_wraps() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/api/states/sensor.temp");
                then.status(200).json_body(json!({"state": "21.5"}));
            })
            .await;

        let handler = handler_for(&server, AuthScheme::None, vec![]);
        let result = handler
            .execute("ha_get_state", &args(&[("entity_id", "sensor.temp")]))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, json!({"state": {"state": "21.5"}}));
    }

    #[tokio::test]
    async fn post_body_excludes_declared_and_path_bound_args() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/services/light/turn_on")
                    .json_body(json!({"entity_id": "light.bedroom"}));
                then.status(200).json_body(json!([{"entity_id": "light.bedroom"}]));
            })
            .await;

        let handler = handler_for(&server, AuthScheme::None, vec![]);
        let result = handler
            .execute(
                "ha_call_service",
                &args(&[
                    ("domain", "light"),
                    ("service", "turn_on"),
                    ("entity_id", "light.bedroom"),
                ]),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result, json!([{"entity_id": "light.bedroom"}]));
    }

    #[tokio::test]
    async fn bearer_auth_is_attached() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/states/sensor.temp")
                    .header("authorization", "Bearer sekrit");
                then.status(200).json_body(json!({}));
            })
            .await;

        let handler = handler_for(
            &server,
            AuthScheme::Bearer {
                token: "sekrit".into(),
            },
            vec![],
        );
        handler
            .execute("ha_get_state", &args(&[("entity_id", "sensor.temp")]))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn query_auth_is_attached() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/api/states/sensor.temp")
                    .query_param("apikey", "k123");
                then.status(200).json_body(json!({}));
            })
            .await;

        let handler = handler_for(
            &server,
            AuthScheme::Query {
                query_param: "apikey".into(),
                token: "k123".into(),
            },
            vec![],
        );
        handler
            .execute("ha_get_state", &args(&[("entity_id", "sensor.temp")]))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn error_mappings_shadow_builtins() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/states/sensor.temp");
                then.status(503).body("overloaded");
            })
            .await;

        let handler = handler_for(
            &server,
            AuthScheme::None,
            vec![ErrorMapping {
                status: 503,
                message: "busy ({status}): {body}".into(),
            }],
        );
        let err = handler
            .execute("ha_get_state", &args(&[("entity_id", "sensor.temp")]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "busy (503): overloaded");
        assert_eq!(err.kind(), ExecutionErrorKind::Other);
    }

    #[tokio::test]
    async fn builtin_status_classification() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/states/denied.entity");
                then.status(401);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/states/missing.entity");
                then.status(404);
            })
            .await;

        let handler = handler_for(&server, AuthScheme::None, vec![]);

        let auth_err = handler
            .execute("ha_get_state", &args(&[("entity_id", "denied.entity")]))
            .await
            .unwrap_err();
        assert_eq!(auth_err.kind(), ExecutionErrorKind::Auth);

        let missing_err = handler
            .execute("ha_get_state", &args(&[("entity_id", "missing.entity")]))
            .await
            .unwrap_err();
        assert_eq!(missing_err.kind(), ExecutionErrorKind::NotFound);
    }

    #[tokio::test]
    async fn non_json_success_body_is_a_protocol_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/states/sensor.temp");
                then.status(200).body("<html>hello</html>");
            })
            .await;

        let handler = handler_for(&server, AuthScheme::None, vec![]);
        let err = handler
            .execute("ha_get_state", &args(&[("entity_id", "sensor.temp")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExecutionErrorKind::Protocol);
    }

    #[tokio::test]
    async fn connection_refused_is_a_connection_error() {
        // Nothing listens on this port.
        let config = ServiceConfig {
            name: "dead".into(),
            url: "http://127.0.0.1:1".into(),
            auth: AuthScheme::None,
            handler: "http".into(),
            health: HealthProbe::default(),
            timeout_secs: 2,
            errors: vec![],
        };
        let tools = parse_tools_str(TOOLS, "dead").unwrap();
        let handler = HttpHandler::new(config, tools).unwrap();

        let err = handler
            .execute("ha_get_state", &args(&[("entity_id", "sensor.temp")]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExecutionErrorKind::Connection);
    }

    #[tokio::test]
    async fn tool_without_request_definition_fails() {
        let server = MockServer::start_async().await;
        let handler = handler_for(&server, AuthScheme::None, vec![]);
        let err = handler
            .execute("ha_no_request", &ToolArgs::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExecutionErrorKind::Protocol);
    }

    #[tokio::test]
    async fn health_probe_compares_expected_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/");
                then.status(200);
            })
            .await;

        let handler = handler_for(&server, AuthScheme::None, vec![]);
        assert!(handler.health_check().await);
    }

    #[test]
    fn path_interpolation_encodes_segments() {
        let (path, bound) = interpolate_path(
            "/api/states/{entity_id}",
            &args(&[("entity_id", "group.living room/2")]),
        );
        assert_eq!(path, "/api/states/group.living%20room%2F2");
        assert!(bound.contains("entity_id"));
    }

    #[test]
    fn unmatched_braces_are_literal() {
        let (path, bound) = interpolate_path("/api/{not closed", &ToolArgs::new());
        assert_eq!(path, "/api/{not closed");
        assert!(bound.is_empty());
    }

    #[test]
    fn missing_path_args_render_empty() {
        let (path, _) = interpolate_path("/api/states/{entity_id}", &ToolArgs::new());
        assert_eq!(path, "/api/states/");
    }
}
