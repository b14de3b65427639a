//! Shared fixtures for server tests.

use crate::state::AppState;
use async_trait::async_trait;
use gateway_config::{GatewayConfig, RuntimeConfig};
use gateway_core::{Backend, BackendRequest, BackendResponse, GatewayError, ProviderKind, Usage};
use gateway_providers::BackendRegistry;
use gateway_resilience::ManualClock;
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const SECRET: &str = "front-door-test-secret";

pub(crate) const CONFIG: &str = r"
listeners:
  - { name: public, host: 127.0.0.1, port: 8080 }
providers:
  openai:
    api_key: sk-test
    rate_limit: { input_tokens_per_second: 10000, output_tokens_per_second: 4000 }
  anthropic:
    api_key: ak-test
    rate_limit: { input_tokens_per_second: 8000, output_tokens_per_second: 3000 }
  ollama:
    rate_limit: { input_tokens_per_second: 100, output_tokens_per_second: 2000 }
routes:
  - name: investment-advisor
    paths: ['/v1/investment']
    backends:
      - { name: investment-primary, provider: openai, model: gpt-4-1106-preview, max_tokens: 512, timeout: 100ms }
      - { name: investment-secondary, provider: anthropic, model: claude-3-opus, max_tokens: 512, priority: 2 }
  - name: loan-local
    paths: ['/v1/loan-local']
    backends:
      - { name: local-llama3, provider: ollama, model: 'llama3:8b', endpoint: 'http://localhost:11434', max_tokens: 256 }
  - name: customer-support
    paths: ['/v1/customer']
    security: default
    backends:
      - { name: customer-primary, provider: openai, model: gpt-4-1106-preview, max_tokens: 256 }
security:
  policies:
    default:
      issuer: https://auth.example.com
      audiences: [ai-gateway]
      secret: front-door-test-secret
  cors:
    allow_origins: ['https://app.example.com']
    max_age: 10m
";

pub(crate) fn runtime_config() -> RuntimeConfig {
    let parsed: GatewayConfig = serde_yaml::from_str(CONFIG).expect("parse");
    RuntimeConfig::compile(&parsed).expect("compile")
}

/// What a scripted backend does when called
#[derive(Debug, Clone)]
pub(crate) enum Script {
    Reply { text: &'static str, output_tokens: u32 },
    Fail { status: u16 },
    Hang,
}

#[derive(Debug)]
pub(crate) struct ScriptedBackend {
    name: String,
    kind: ProviderKind,
    script: Script,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn new(name: &str, kind: ProviderKind, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            kind,
            script,
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(&self, request: &BackendRequest) -> Result<BackendResponse, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Reply {
                text,
                output_tokens,
            } => Ok(BackendResponse {
                text: (*text).to_string(),
                model: request.model.clone(),
                usage: Usage::new(10, *output_tokens),
            }),
            Script::Fail { status } => Err(GatewayError::backend(
                &self.name,
                "scripted failure",
                Some(*status),
            )),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(GatewayError::internal("unreachable"))
            }
        }
    }
}

pub(crate) fn registry(backends: &[Arc<ScriptedBackend>]) -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    for backend in backends {
        registry
            .register(Arc::clone(backend) as Arc<dyn Backend>)
            .expect("register");
    }
    registry
}

pub(crate) fn state(backends: &[Arc<ScriptedBackend>]) -> (AppState, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let state = AppState::builder(&runtime_config())
        .registry(registry(backends))
        .clock(Arc::clone(&clock) as _)
        .build()
        .expect("state");
    (state, clock)
}

pub(crate) fn token(audience: &str) -> String {
    let claims = serde_json::json!({
        "sub": "advisor-7",
        "iss": "https://auth.example.com",
        "aud": audience,
        "exp": chrono::Utc::now().timestamp() + 600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("token")
}
