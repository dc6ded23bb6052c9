//! Session tests: the auth-first handshake with its deadline, frame
//! dispatch, and offline queueing when a connection dies mid-approval.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Harness, HarnessOptions};
use gatehouse_gateway::{run_session, ChannelTransport, SessionContext};
use gatehouse_messenger::Verdict;
use httpmock::prelude::*;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};

const TOKEN: &str = "agent-secret";

fn context(harness: &Harness, deadline: Duration) -> Arc<SessionContext> {
    let (shutdown, _) = broadcast::channel(4);
    Arc::new(SessionContext {
        engine: harness.engine.clone(),
        registry: harness.registry.clone(),
        agent_token: TOKEN.to_string(),
        auth_deadline: deadline,
        shutdown,
    })
}

/// Spawn a session over an in-process transport, returning the client
/// halves.
fn spawn_session(
    ctx: Arc<SessionContext>,
) -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
    let (transport, client_tx, client_rx) = ChannelTransport::pair();
    tokio::spawn(async move {
        run_session(ctx, transport).await;
    });
    (client_tx, client_rx)
}

async fn recv_json(client_rx: &mut mpsc::Receiver<String>) -> Value {
    let raw = tokio::time::timeout(Duration::from_secs(5), client_rx.recv())
        .await
        .expect("reply within deadline")
        .expect("channel open");
    serde_json::from_str(&raw).expect("valid frame")
}

async fn authenticate(client_tx: &mpsc::Sender<String>, client_rx: &mut mpsc::Receiver<String>) {
    client_tx
        .send(json!({"jsonrpc": "2.0", "method": "auth", "params": {"token": TOKEN}, "id": 0}).to_string())
        .await
        .unwrap();
    let reply = recv_json(client_rx).await;
    assert_eq!(reply["result"]["status"], "authenticated");
}

#[tokio::test]
async fn methods_before_auth_are_rejected() {
    let server = MockServer::start_async().await;
    let harness = Harness::new(&server.base_url(), HarnessOptions::default()).await;
    let (client_tx, mut client_rx) = spawn_session(context(&harness, Duration::from_secs(10)));

    client_tx
        .send(json!({"jsonrpc": "2.0", "method": "list_tools", "id": 1}).to_string())
        .await
        .unwrap();
    let reply = recv_json(&mut client_rx).await;
    assert_eq!(reply["error"]["code"], -32005);
}

#[tokio::test]
async fn wrong_token_closes_the_connection() {
    let server = MockServer::start_async().await;
    let harness = Harness::new(&server.base_url(), HarnessOptions::default()).await;
    let (client_tx, mut client_rx) = spawn_session(context(&harness, Duration::from_secs(10)));

    client_tx
        .send(json!({"method": "auth", "params": {"token": "wrong"}, "id": 0}).to_string())
        .await
        .unwrap();
    let reply = recv_json(&mut client_rx).await;
    assert_eq!(reply["error"]["code"], -32005);
    assert_eq!(reply["error"]["message"], "Invalid token");

    // The session ended; nothing further is read.
    assert!(client_rx.recv().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn auth_deadline_boundary() {
    let server = MockServer::start_async().await;
    let harness = Harness::new(&server.base_url(), HarnessOptions::default()).await;

    // Just under the deadline: accepted.
    {
        let (client_tx, mut client_rx) =
            spawn_session(context(&harness, Duration::from_secs(10)));
        tokio::time::sleep(Duration::from_millis(9_990)).await;
        authenticate(&client_tx, &mut client_rx).await;
    }

    // Just over: rejected with NOT_AUTHENTICATED.
    {
        let (_client_tx, mut client_rx) =
            spawn_session(context(&harness, Duration::from_secs(10)));
        tokio::time::sleep(Duration::from_millis(10_010)).await;
        let reply = recv_json(&mut client_rx).await;
        assert_eq!(reply["error"]["code"], -32005);
        assert_eq!(reply["error"]["message"], "Authentication timeout");
    }
}

#[tokio::test]
async fn full_session_flow() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/states/sensor.t");
            then.status(200).json_body(json!({"state": "21.5"}));
        })
        .await;

    let harness = Harness::new(&server.base_url(), HarnessOptions::default()).await;
    let (client_tx, mut client_rx) = spawn_session(context(&harness, Duration::from_secs(10)));
    authenticate(&client_tx, &mut client_rx).await;

    // list_tools describes the registry.
    client_tx
        .send(json!({"method": "list_tools", "id": 1}).to_string())
        .await
        .unwrap();
    let reply = recv_json(&mut client_rx).await;
    let tools = reply["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0]["name"], "ha_call_service");
    assert_eq!(tools[1]["name"], "ha_get_state");
    assert_eq!(tools[1]["service"], "homeassistant");
    assert_eq!(tools[1]["args"]["entity_id"]["required"], true);

    // An auto-allowed tool request executes and echoes the id.
    client_tx
        .send(
            json!({
                "method": "tool_request",
                "params": {"tool": "ha_get_state", "args": {"entity_id": "sensor.t"}},
                "id": "req-1",
            })
            .to_string(),
        )
        .await
        .unwrap();
    let reply = recv_json(&mut client_rx).await;
    assert_eq!(reply["id"], "req-1");
    assert_eq!(reply["result"]["status"], "executed");
    assert_eq!(reply["result"]["data"]["state"], "21.5");

    // Unknown methods and missing ids are protocol errors.
    client_tx
        .send(json!({"method": "frobnicate", "id": 2}).to_string())
        .await
        .unwrap();
    assert_eq!(recv_json(&mut client_rx).await["error"]["code"], -32601);

    client_tx
        .send(json!({"method": "tool_request", "params": {"tool": "ha_get_state"}}).to_string())
        .await
        .unwrap();
    assert_eq!(recv_json(&mut client_rx).await["error"]["code"], -32600);

    // Malformed JSON is a parse error.
    client_tx.send("{not json".to_string()).await.unwrap();
    assert_eq!(recv_json(&mut client_rx).await["error"]["code"], -32700);

    // No offline results yet.
    client_tx
        .send(json!({"method": "get_pending_results", "id": 3}).to_string())
        .await
        .unwrap();
    let reply = recv_json(&mut client_rx).await;
    assert_eq!(reply["result"]["results"], json!([]));
}

#[tokio::test]
async fn disconnect_during_approval_queues_offline_and_drains_once() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/services/light/turn_on");
            then.status(200).json_body(json!({"ok": true}));
        })
        .await;

    let harness = Harness::new(&server.base_url(), HarnessOptions::default()).await;
    let ctx = context(&harness, Duration::from_secs(10));

    // First connection: submit an ASK request, then vanish.
    let (client_tx, mut client_rx) = spawn_session(ctx.clone());
    authenticate(&client_tx, &mut client_rx).await;
    client_tx
        .send(
            json!({
                "method": "tool_request",
                "params": {"tool": "ha_call_service",
                           "args": {"domain": "light", "service": "turn_on"}},
                "id": "req-offline",
            })
            .to_string(),
        )
        .await
        .unwrap();
    harness.messenger.wait_for_prompts(1).await;
    drop(client_tx);
    drop(client_rx);

    // Disconnection does not cancel the pending approval: the guardian
    // approves later and the dispatch still runs.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        harness
            .messenger
            .deliver("req-offline", Verdict::Approved { by: "guardian:7".into() })
            .await
    );

    // Allow the detached request task to execute and queue the result.
    let mut drained = Vec::new();
    for _ in 0..100 {
        drained = harness.engine.drain_offline().unwrap();
        if !drained.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].request_id, "req-offline");
    assert_eq!(drained[0].result["status"], "executed");

    // Reconnect and drain again: empty (exactly-once delivery).
    let (client_tx, mut client_rx) = spawn_session(ctx);
    authenticate(&client_tx, &mut client_rx).await;
    client_tx
        .send(json!({"method": "get_pending_results", "id": 1}).to_string())
        .await
        .unwrap();
    let reply = recv_json(&mut client_rx).await;
    assert_eq!(reply["result"]["results"], json!([]));
}
