//! Shared test fixtures: a recording messenger double and an engine
//! harness wired to an httpmock service.

// Each integration-test crate uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gatehouse_dispatch::{
    AuthScheme, Executor, HandlerRegistry, HealthProbe, ServiceConfig, ServiceHandler,
};
use gatehouse_gateway::{EngineParams, RequestEngine};
use gatehouse_messenger::{
    ApprovalPrompt, ApprovalSink, MessengerAdapter, MessengerError, MessengerResult, Verdict,
};
use gatehouse_policy::{PermissionEngine, PermissionRule, Permissions, PolicyAction};
use gatehouse_registry::{loader::parse_tools_str, ToolRegistry};
use gatehouse_store::Store;

/// Tool set used across the lifecycle tests.
pub const TOOLS: &str = r#"
tools:
  ha_get_state:
    description: Read the state of an entity
    signature: "{entity_id}"
    args:
      entity_id: { required: true }
    request:
      method: GET
      path: /api/states/{entity_id}
  ha_call_service:
    description: Call a service
    signature: "{domain}.{service}, {entity_id}"
    args:
      domain: { required: true }
      service: { required: true }
      entity_id: {}
    request:
      method: POST
      path: /api/services/{domain}/{service}
      body_exclude: [domain, service]
"#;

/// A messenger double that records prompts and lets tests act as the
/// guardian through the registered sink.
pub struct TestMessenger {
    prompts: Mutex<Vec<ApprovalPrompt>>,
    updates: Mutex<Vec<(String, String)>>,
    sink: Mutex<Option<Arc<dyn ApprovalSink>>>,
    fail_send: AtomicBool,
    counter: AtomicU64,
}

impl TestMessenger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            prompts: Mutex::new(Vec::new()),
            updates: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            fail_send: AtomicBool::new(false),
            counter: AtomicU64::new(0),
        })
    }

    /// Make every subsequent `send_approval` fail.
    pub fn fail_sends(&self) {
        self.fail_send.store(true, Ordering::SeqCst);
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<ApprovalPrompt> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn updates(&self) -> Vec<(String, String)> {
        self.updates.lock().unwrap().clone()
    }

    fn sink(&self) -> Option<Arc<dyn ApprovalSink>> {
        self.sink.lock().unwrap().clone()
    }

    /// Deliver a verdict as the guardian would. Returns whether the
    /// verdict won the terminal transition.
    pub async fn deliver(&self, request_id: &str, verdict: Verdict) -> bool {
        let sink = self.sink().expect("messenger started");
        sink.resolve(request_id, verdict).await
    }

    /// Wait (bounded) until at least `n` prompts have been sent.
    pub async fn wait_for_prompts(&self, n: usize) {
        for _ in 0..200 {
            if self.prompt_count() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {n} approval prompt(s)");
    }
}

#[async_trait]
impl MessengerAdapter for TestMessenger {
    async fn send_approval(&self, prompt: &ApprovalPrompt) -> MessengerResult<String> {
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(MessengerError::Send("send disabled by test".into()));
        }
        self.prompts.lock().unwrap().push(prompt.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("msg-{n}"))
    }

    async fn update_approval(&self, message_ref: &str, status: &str) -> MessengerResult<()> {
        self.updates
            .lock()
            .unwrap()
            .push((message_ref.to_string(), status.to_string()));
        Ok(())
    }

    async fn start(&self, sink: Arc<dyn ApprovalSink>) -> MessengerResult<()> {
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn stop(&self) -> MessengerResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Tunable knobs for a harness.
pub struct HarnessOptions {
    pub approval_timeout: Duration,
    pub max_pending: u64,
    pub max_requests_per_minute: u32,
    pub rules: Vec<PermissionRule>,
    pub defaults: Vec<PermissionRule>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            approval_timeout: Duration::from_secs(900),
            max_pending: 10,
            max_requests_per_minute: 60,
            rules: vec![],
            defaults: vec![
                PermissionRule::new("ha_get_*", PolicyAction::Allow),
                PermissionRule::new("*", PolicyAction::Ask),
            ],
        }
    }
}

/// A fully wired engine over an in-memory store and a mock HTTP service.
pub struct Harness {
    pub engine: Arc<RequestEngine>,
    pub registry: Arc<ToolRegistry>,
    pub store: Store,
    pub messenger: Arc<TestMessenger>,
}

impl Harness {
    pub async fn new(service_url: &str, options: HarnessOptions) -> Self {
        Self::with_store(service_url, options, Store::in_memory().unwrap()).await
    }

    /// Build over an existing store (restart scenarios).
    pub async fn with_store(service_url: &str, options: HarnessOptions, store: Store) -> Self {
        let registry = Arc::new(
            ToolRegistry::build(parse_tools_str(TOOLS, "homeassistant").unwrap()).unwrap(),
        );

        let policy = PermissionEngine::new(&Permissions {
            rules: options.rules,
            defaults: options.defaults,
        })
        .unwrap();

        let service_config = ServiceConfig {
            name: "homeassistant".into(),
            url: service_url.into(),
            auth: AuthScheme::None,
            handler: "http".into(),
            health: HealthProbe::default(),
            timeout_secs: 5,
            errors: vec![],
        };
        let handler = HandlerRegistry::new()
            .build(
                service_config,
                parse_tools_str(TOOLS, "homeassistant").unwrap(),
            )
            .unwrap();
        let mut services: HashMap<String, Arc<dyn ServiceHandler>> = HashMap::new();
        services.insert("homeassistant".into(), handler);
        let executor = Arc::new(Executor::new(Arc::clone(&registry), services));

        let messenger = TestMessenger::new();

        let engine = Arc::new(RequestEngine::new(EngineParams {
            registry: Arc::clone(&registry),
            policy,
            executor,
            messenger: messenger.clone(),
            store: store.clone(),
            approval_timeout: options.approval_timeout,
            max_pending: options.max_pending,
            max_requests_per_minute: options.max_requests_per_minute,
            agent_id: gatehouse_core::DEFAULT_AGENT_ID.to_string(),
        }));

        // Register the engine as the messenger's sink, as the gateway
        // startup sequence does.
        let sink: Arc<dyn ApprovalSink> = Arc::clone(&engine) as Arc<dyn ApprovalSink>;
        messenger.start(sink).await.unwrap();

        Self {
            engine,
            registry,
            store,
            messenger,
        }
    }
}

/// Build string args.
pub fn args(pairs: &[(&str, &str)]) -> gatehouse_core::ToolArgs {
    pairs
        .iter()
        .map(|(k, v)| {
            (
                (*k).to_string(),
                serde_json::Value::String((*v).to_string()),
            )
        })
        .collect()
}
