//! Per-connection session handling.
//!
//! A session is one agent connection: an auth-first handshake under a
//! hard deadline, then a receive loop. Each inbound frame is handled in
//! its own task, so an agent may keep several `tool_request`s in flight;
//! replies are funneled through one outbound channel and written by the
//! session task alone, so frames never interleave. Replies are not
//! reordered relative to each other but carry no request-order guarantee
//! — the envelope `id` is the correlation.

use std::sync::Arc;
use std::time::Duration;

use gatehouse_core::protocol::{
    AuthParams, RequestFrame, ResponseFrame, ToolRequestParams, INVALID_REQUEST, METHOD_NOT_FOUND,
    NOT_AUTHENTICATED, PARSE_ERROR,
};
use gatehouse_core::{GatewayError, ToolRequest};
use gatehouse_registry::ToolRegistry;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::engine::RequestEngine;
use crate::transport::MessageTransport;

/// Default auth handshake deadline.
pub const AUTH_DEADLINE: Duration = Duration::from_secs(10);

/// Shared context every session runs against.
pub struct SessionContext {
    /// The request engine.
    pub engine: Arc<RequestEngine>,
    /// The tool registry, for `list_tools`.
    pub registry: Arc<ToolRegistry>,
    /// Shared agent bearer token.
    pub agent_token: String,
    /// Handshake deadline.
    pub auth_deadline: Duration,
    /// Gateway shutdown signal; sessions subscribe per connection.
    pub shutdown: broadcast::Sender<()>,
}

/// Run one agent session to completion.
pub async fn run_session<T: MessageTransport>(ctx: Arc<SessionContext>, mut transport: T) {
    if !authenticate(&ctx, &mut transport).await {
        transport.close().await;
        return;
    }
    info!("agent authenticated");

    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
    let mut shutdown = ctx.shutdown.subscribe();

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                let outstanding = ctx.engine.outstanding_requests();
                let notice = json!({
                    "jsonrpc": "2.0",
                    "method": "shutting_down",
                    "params": { "request_ids": outstanding },
                });
                let _ = transport.send(notice.to_string()).await;
                transport.close().await;
                break;
            },
            reply = out_rx.recv() => {
                // The sender side never closes while this loop runs.
                if let Some(reply) = reply {
                    if transport.send(reply).await.is_err() {
                        break;
                    }
                }
            },
            inbound = transport.recv() => {
                match inbound {
                    Some(Ok(raw)) => {
                        let ctx = Arc::clone(&ctx);
                        let out_tx = out_tx.clone();
                        tokio::spawn(async move {
                            handle_message(ctx, raw, out_tx).await;
                        });
                    },
                    Some(Err(e)) => {
                        warn!(error = %e, "agent channel failed");
                        break;
                    },
                    None => break,
                }
            },
        }
    }
    info!("agent session ended");
}

/// Constant-time bearer comparison.
fn token_matches(provided: &str, expected: &str) -> bool {
    provided.len() == expected.len()
        && bool::from(provided.as_bytes().ct_eq(expected.as_bytes()))
}

/// Run the auth handshake. The first frame must be `auth{token}` within
/// the deadline; until it succeeds no other method is accepted.
async fn authenticate<T: MessageTransport>(ctx: &SessionContext, transport: &mut T) -> bool {
    let raw = match tokio::time::timeout(ctx.auth_deadline, transport.recv()).await {
        Err(_) => {
            let frame =
                ResponseFrame::error(None, NOT_AUTHENTICATED, "Authentication timeout");
            let _ = transport.send(frame.to_text()).await;
            return false;
        },
        Ok(None | Some(Err(_))) => return false,
        Ok(Some(Ok(raw))) => raw,
    };

    let frame = match RequestFrame::parse(&raw) {
        Ok(frame) => frame,
        Err(_) => {
            let frame = ResponseFrame::error(None, PARSE_ERROR, "Parse error");
            let _ = transport.send(frame.to_text()).await;
            return false;
        },
    };
    let id = frame.id.clone();

    if frame.method.as_deref() != Some("auth") {
        let frame = ResponseFrame::error(id, NOT_AUTHENTICATED, "Not authenticated");
        let _ = transport.send(frame.to_text()).await;
        return false;
    }

    let params: AuthParams = frame
        .params
        .and_then(|p| serde_json::from_value(p).ok())
        .unwrap_or(AuthParams {
            token: String::new(),
        });

    if !token_matches(&params.token, &ctx.agent_token) {
        let frame = ResponseFrame::error(id, NOT_AUTHENTICATED, "Invalid token");
        let _ = transport.send(frame.to_text()).await;
        return false;
    }

    let frame = ResponseFrame::result(id, json!({"status": "authenticated"}));
    transport.send(frame.to_text()).await.is_ok()
}

/// Handle one inbound frame after auth.
async fn handle_message(ctx: Arc<SessionContext>, raw: String, out_tx: mpsc::Sender<String>) {
    let frame = match RequestFrame::parse(&raw) {
        Ok(frame) => frame,
        Err(_) => {
            send(&out_tx, ResponseFrame::error(None, PARSE_ERROR, "Parse error")).await;
            return;
        },
    };
    let id = frame.id.clone();

    let Some(method) = frame.method.clone() else {
        send(
            &out_tx,
            ResponseFrame::error(id, INVALID_REQUEST, "Missing method"),
        )
        .await;
        return;
    };

    match method.as_str() {
        "tool_request" => handle_tool_request(ctx, frame, out_tx).await,
        "list_tools" => {
            let tools = list_tools_payload(&ctx.registry);
            send(&out_tx, ResponseFrame::result(id, json!({"tools": tools}))).await;
        },
        "get_pending_results" => match ctx.engine.drain_offline() {
            Ok(results) => {
                let results: Vec<Value> = results
                    .into_iter()
                    .map(|r| {
                        json!({
                            "request_id": r.request_id,
                            "tool_name": r.tool_name,
                            "result": r.result,
                            "created_at": r.created_at.to_rfc3339(),
                        })
                    })
                    .collect();
                send(&out_tx, ResponseFrame::result(id, json!({"results": results}))).await;
            },
            Err(e) => {
                warn!(error = %e, "offline drain failed");
                let err = GatewayError::Internal(e.to_string());
                send(
                    &out_tx,
                    ResponseFrame::error(id, err.code(), err.agent_message()),
                )
                .await;
            },
        },
        other => {
            send(
                &out_tx,
                ResponseFrame::error(id, METHOD_NOT_FOUND, format!("Unknown method: {other}")),
            )
            .await;
        },
    }
}

async fn handle_tool_request(
    ctx: Arc<SessionContext>,
    frame: RequestFrame,
    out_tx: mpsc::Sender<String>,
) {
    // The envelope id doubles as the request id; without one there is
    // nothing to correlate the reply (or an offline result) to.
    let Some(request_id) = frame.id_string() else {
        send(
            &out_tx,
            ResponseFrame::error(None, INVALID_REQUEST, "Missing request id"),
        )
        .await;
        return;
    };
    let id = frame.id.clone();

    let params: ToolRequestParams = match frame.params {
        Some(params) => match serde_json::from_value(params) {
            Ok(params) => params,
            Err(_) => {
                send(
                    &out_tx,
                    ResponseFrame::error(id, INVALID_REQUEST, "Invalid params"),
                )
                .await;
                return;
            },
        },
        None => ToolRequestParams {
            tool: None,
            args: gatehouse_core::ToolArgs::new(),
        },
    };

    let Some(tool) = params.tool.filter(|t| !t.is_empty()) else {
        send(
            &out_tx,
            ResponseFrame::error(id, INVALID_REQUEST, "Missing tool name"),
        )
        .await;
        return;
    };

    let request = ToolRequest::new(request_id, tool, params.args);
    let completed = ctx.engine.process(request).await;

    let response = match &completed.outcome {
        crate::engine::Outcome::Success(value) => ResponseFrame::result(id, value.clone()),
        crate::engine::Outcome::Failure(err) => {
            ResponseFrame::error(id, err.code(), err.agent_message())
        },
    };

    if out_tx.send(response.to_text()).await.is_err() {
        // The session closed while we worked; keep the outcome.
        debug!(request_id = %completed.request.request_id, "session gone, queueing result offline");
        ctx.engine.store_offline(&completed);
    }
}

/// Tool descriptions for `list_tools`.
fn list_tools_payload(registry: &ToolRegistry) -> Vec<Value> {
    let mut tools: Vec<&gatehouse_registry::ToolDefinition> = registry.all_tools().collect();
    tools.sort_by(|a, b| a.name.cmp(&b.name));
    tools
        .into_iter()
        .map(|tool| {
            let args: serde_json::Map<String, Value> = tool
                .args
                .iter()
                .map(|(name, spec)| {
                    let mut info = serde_json::Map::new();
                    info.insert("required".to_string(), Value::Bool(spec.required));
                    if let Some(validate) = &spec.validate {
                        info.insert("validate".to_string(), Value::String(validate.clone()));
                    }
                    (name.clone(), Value::Object(info))
                })
                .collect();
            json!({
                "name": tool.name,
                "description": tool.description,
                "service": tool.service_name,
                "args": args,
            })
        })
        .collect()
}

async fn send(out_tx: &mpsc::Sender<String>, frame: ResponseFrame) {
    let _ = out_tx.send(frame.to_text()).await;
}
