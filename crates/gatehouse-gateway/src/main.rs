//! `gatehoused` — the Gatehouse execution gateway daemon.
//!
//! Usage: `gatehoused [config.yaml [permissions.yaml]]`
//!
//! Loads configuration, wires the store, registry, policy, dispatcher,
//! and messenger together, and serves the agent channel until ctrl-c.

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gatehouse_dispatch::{Executor, HandlerRegistry, ServiceHandler};
use gatehouse_gateway::{EngineParams, Gateway, GatewayParams, RequestEngine, AUTH_DEADLINE};
use gatehouse_policy::PermissionEngine;
use gatehouse_registry::ToolRegistry;
use gatehouse_store::Store;
use gatehouse_telegram::TelegramMessenger;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,gatehoused=info,gatehouse_gateway=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config_path = PathBuf::from(args.next().unwrap_or_else(|| "config.yaml".to_string()));
    let permissions_path = args.next().map_or_else(
        || {
            config_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("permissions.yaml")
        },
        PathBuf::from,
    );

    let loaded = gatehouse_config::load(&config_path, &permissions_path)
        .context("failed to load configuration")?;
    let config = &loaded.config;

    let store = Store::open(Path::new(&config.storage.path)).context("failed to open store")?;

    let registry =
        Arc::new(ToolRegistry::build(loaded.all_tools()).context("failed to build tool registry")?);
    let policy =
        PermissionEngine::new(&loaded.permissions).context("failed to compile policy")?;

    let handler_registry = HandlerRegistry::new();
    let mut services: HashMap<String, Arc<dyn ServiceHandler>> = HashMap::new();
    for (service_config, tools) in &loaded.services {
        let handler = handler_registry
            .build(service_config.clone(), tools.clone())
            .with_context(|| format!("failed to build service '{}'", service_config.name))?;
        services.insert(service_config.name.clone(), handler);
    }
    let executor = Arc::new(Executor::new(Arc::clone(&registry), services));

    let telegram = config
        .messenger
        .telegram
        .as_ref()
        .context("messenger.telegram configuration missing")?;
    let messenger = Arc::new(TelegramMessenger::new(
        &telegram.token,
        telegram.chat_id,
        telegram.allowed_users.iter().copied(),
    ));

    let engine = Arc::new(RequestEngine::new(EngineParams {
        registry: Arc::clone(&registry),
        policy,
        executor: Arc::clone(&executor),
        messenger: messenger.clone(),
        store: store.clone(),
        approval_timeout: Duration::from_secs(config.approval_timeout),
        max_pending: config.rate_limit.max_pending_approvals,
        max_requests_per_minute: config.rate_limit.max_requests_per_minute,
        agent_id: gatehouse_core::DEFAULT_AGENT_ID.to_string(),
    }));

    let gateway = Arc::new(Gateway::new(GatewayParams {
        engine,
        registry,
        messenger,
        executor,
        store,
        host: config.gateway.host.clone(),
        port: config.gateway.port,
        health_port: config.gateway.health_port,
        agent_token: config.agent.token.clone(),
        auth_deadline: AUTH_DEADLINE,
    }));

    let signal_gateway = Arc::clone(&gateway);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_gateway.trigger_shutdown();
        }
    });

    gateway.run().await.context("gateway failed")?;
    Ok(())
}
