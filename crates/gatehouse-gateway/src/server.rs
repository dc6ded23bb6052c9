//! The gateway lifecycle object.
//!
//! One [`Gateway`] owns everything with a lifecycle: the engine (and
//! through it the store and rate limiter), the messenger, the service
//! handlers, the health endpoint, the background sweeper, and the
//! listener. Startup order matters: the stale-pending sweep and timer
//! re-arm run *before* the listener binds, so no agent can reference an
//! expired pending before it has been resolved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gatehouse_core::GatewayError;
use gatehouse_dispatch::Executor;
use gatehouse_messenger::MessengerAdapter;
use gatehouse_registry::ToolRegistry;
use gatehouse_store::Store;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::engine::RequestEngine;
use crate::health::{self, HealthState};
use crate::session::{run_session, SessionContext};
use crate::transport::WsTransport;

/// Close code sent to a second concurrent agent connection.
const CODE_AGENT_BUSY: u16 = 4000;

/// Period of the background stale-pending sweeper.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Everything the gateway is assembled from.
pub struct GatewayParams {
    /// The request engine.
    pub engine: Arc<RequestEngine>,
    /// The tool registry.
    pub registry: Arc<ToolRegistry>,
    /// The messenger adapter (started and stopped by the gateway).
    pub messenger: Arc<dyn MessengerAdapter>,
    /// The service dispatcher (closed by the gateway).
    pub executor: Arc<Executor>,
    /// The durable store (shared with the health endpoint).
    pub store: Store,
    /// Bind host for the agent channel.
    pub host: String,
    /// Bind port for the agent channel.
    pub port: u16,
    /// Bind port for the health endpoint.
    pub health_port: u16,
    /// Shared agent bearer token.
    pub agent_token: String,
    /// Auth handshake deadline.
    pub auth_deadline: Duration,
}

/// The composite gateway.
pub struct Gateway {
    ctx: Arc<SessionContext>,
    engine: Arc<RequestEngine>,
    messenger: Arc<dyn MessengerAdapter>,
    executor: Arc<Executor>,
    store: Store,
    host: String,
    port: u16,
    health_port: u16,
    shutdown: broadcast::Sender<()>,
    agent_connected: Arc<AtomicBool>,
}

impl Gateway {
    /// Assemble the gateway.
    #[must_use]
    pub fn new(params: GatewayParams) -> Self {
        let (shutdown, _) = broadcast::channel(4);
        let ctx = Arc::new(SessionContext {
            engine: Arc::clone(&params.engine),
            registry: params.registry,
            agent_token: params.agent_token,
            auth_deadline: params.auth_deadline,
            shutdown: shutdown.clone(),
        });
        Self {
            ctx,
            engine: params.engine,
            messenger: params.messenger,
            executor: params.executor,
            store: params.store,
            host: params.host,
            port: params.port,
            health_port: params.health_port,
            shutdown,
            agent_connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Trigger a graceful shutdown from another task (e.g. ctrl-c).
    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Run the gateway until shutdown.
    ///
    /// # Errors
    ///
    /// Returns a [`GatewayError`] when startup fails (bind, messenger, or
    /// store errors). Runtime failures of individual sessions never
    /// propagate here.
    pub async fn run(&self) -> Result<(), GatewayError> {
        // Startup sweep before the listener exists: any persisted pending
        // whose expiry passed while we were down resolves as timed out
        // before an agent can reference its id.
        let swept = self.engine.sweep_stale_now().await;
        if swept > 0 {
            info!(swept, "resolved stale pending approvals from previous run");
        }

        // Re-arm expiry timers for the pendings that are still live.
        let waiting = self
            .store
            .waiting_pending()
            .map_err(|e| GatewayError::Internal(e.to_string()))?;
        for record in &waiting {
            self.engine.arm_timeout(&record.request_id, record.expires_at);
        }
        if !waiting.is_empty() {
            info!(count = waiting.len(), "re-armed persisted pending approvals");
        }

        let sink: Arc<dyn gatehouse_messenger::ApprovalSink> =
            Arc::clone(&self.engine) as Arc<dyn gatehouse_messenger::ApprovalSink>;
        self.messenger
            .start(sink)
            .await
            .map_err(|e| GatewayError::Config(e.to_string()))?;

        self.executor.log_startup_health().await;

        // Health endpoint.
        let health_state = HealthState {
            store: self.store.clone(),
            messenger: Arc::clone(&self.messenger),
            executor: Arc::clone(&self.executor),
        };
        let health_host = self.host.clone();
        let health_port = self.health_port;
        let health_shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            health::serve(health_state, &health_host, health_port, health_shutdown).await;
        });

        // Background sweeper: backstop for lost timers.
        let sweeper_engine = Arc::clone(&self.engine);
        let mut sweeper_shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let swept = sweeper_engine.sweep_stale_now().await;
                        if swept > 0 {
                            info!(swept, "sweeper resolved stale pending approvals");
                        }
                    },
                    _ = sweeper_shutdown.recv() => break,
                }
            }
        });

        let listener = TcpListener::bind((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                GatewayError::Config(format!("cannot bind {}:{}: {e}", self.host, self.port))
            })?;
        info!(host = %self.host, port = self.port, "gateway listening");

        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            info!(%peer, "agent connecting");
                            let ctx = Arc::clone(&self.ctx);
                            let gate = Arc::clone(&self.agent_connected);
                            tokio::spawn(async move {
                                handle_connection(ctx, gate, stream).await;
                            });
                        },
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                },
            }
        }

        // Drain: sessions got the shutting_down notice via the broadcast;
        // pending approvals stay persisted for the next boot's sweep.
        info!("gateway shutting down");
        if let Err(e) = self.messenger.stop().await {
            warn!(error = %e, "messenger stop failed");
        }
        self.executor.close_all().await;
        Ok(())
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// Accept one WebSocket connection, enforcing the single-agent gate.
async fn handle_connection(
    ctx: Arc<SessionContext>,
    gate: Arc<AtomicBool>,
    stream: tokio::net::TcpStream,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(error = %e, "websocket handshake failed");
            return;
        },
    };
    let mut transport = WsTransport::new(ws);

    if gate
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        transport
            .close_with(CODE_AGENT_BUSY, "Another agent is already connected")
            .await;
        return;
    }

    run_session(ctx, transport).await;
    gate.store(false, Ordering::SeqCst);
}
