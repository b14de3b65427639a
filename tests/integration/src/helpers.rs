//! Test helper utilities for integration tests

use gateway_config::{ConfigLoader, ConfigSource, ListenerConfig, RuntimeConfig};
use gateway_server::{AppState, Server};
use jsonwebtoken::{encode, EncodingKey, Header};
use once_cell::sync::Lazy;
use reqwest::{Client, Response};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

/// Shared secret of the `default` security policy
pub const TEST_SECRET: &str = "integration-test-secret";

/// Issuer expected by the `default` security policy
pub const TEST_ISSUER: &str = "https://auth.example.com";

/// Initialize tracing for tests (only once)
static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
});

/// Initialize tracing for tests
pub fn init_tracing() {
    Lazy::force(&TRACING);
}

/// Upstream addresses the gateway configuration points at
pub struct Upstreams<'a> {
    pub openai: &'a str,
    pub anthropic: &'a str,
    pub ollama: &'a str,
}

/// Gateway configuration used by the end-to-end tests
///
/// - `/v1/investment`: OpenAI first, Anthropic second
/// - `/v1/loan-local`: a single Ollama backend with a small input budget;
///   clients may pick `phi-2` or `mistral:7b`
/// - `/v1/customer`: Anthropic behind the `default` JWT policy
pub fn gateway_yaml(upstreams: &Upstreams<'_>) -> String {
    format!(
        r#"
listeners:
  - name: placeholder
    port: 8080

providers:
  openai:
    api_key: sk-test
    base_url: {openai}
    rate_limit: {{ input_tokens_per_second: 10000, output_tokens_per_second: 4000 }}
  anthropic:
    api_key: ak-test
    base_url: {anthropic}
    rate_limit: {{ input_tokens_per_second: 8000, output_tokens_per_second: 3000 }}
  ollama:
    rate_limit: {{ input_tokens_per_second: 100, output_tokens_per_second: 2000 }}

routes:
  - name: investment-advisor
    paths: ["/v1/investment"]
    backends:
      - name: investment-primary
        provider: openai
        model: gpt-4-1106-preview
        max_tokens: 512
        timeout: 300ms
      - name: investment-secondary
        provider: anthropic
        model: claude-3-opus-20240229
        max_tokens: 512
        priority: 2
        timeout: 5s
  - name: loan-local
    paths: ["/v1/loan-local"]
    allowed_models: ["phi-2", "mistral:7b"]
    backends:
      - name: loan-llama3
        provider: ollama
        model: llama3:8b
        endpoint: {ollama}
        max_tokens: 256
  - name: customer-support
    paths: ["/v1/customer"]
    security: default
    backends:
      - name: customer-primary
        provider: anthropic
        model: claude-3-sonnet-20240229
        max_tokens: 512

security:
  policies:
    default:
      issuer: {issuer}
      audiences: ["ai-gateway"]
      secret: {secret}
  cors:
    allow_origins: ["https://app.example.com"]

observability:
  logging:
    level: debug
    format: compact
"#,
        openai = upstreams.openai,
        anthropic = upstreams.anthropic,
        ollama = upstreams.ollama,
        issuer = TEST_ISSUER,
        secret = TEST_SECRET,
    )
}

/// Parse and compile a YAML configuration
pub async fn compile(yaml: &str) -> RuntimeConfig {
    let config = ConfigLoader::new(ConfigSource::Yaml(yaml.to_string()))
        .load()
        .await
        .expect("parse configuration");
    RuntimeConfig::compile(&config).expect("compile configuration")
}

/// A gateway serving on a loopback port
pub struct TestGateway {
    /// The server address
    pub addr: SocketAddr,
    /// HTTP client for making requests
    pub client: Client,
    /// Shared state, for reloads and metrics
    pub state: AppState,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestGateway {
    /// Start a gateway for the given YAML configuration
    pub async fn start(yaml: &str) -> Self {
        Self::from_runtime(&compile(yaml).await).await
    }

    /// Start a gateway for an already compiled configuration
    ///
    /// Configured listeners are ignored; the gateway binds an ephemeral
    /// loopback port instead.
    pub async fn from_runtime(runtime: &RuntimeConfig) -> Self {
        init_tracing();

        let state = AppState::from_config(runtime).expect("gateway state");
        let loopback = ListenerConfig {
            name: "test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
        };
        let server = Server::bind(&[loopback], state.clone())
            .await
            .expect("bind loopback");
        let addr = server.local_addrs()[0];

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(server.run_until(async move {
            let _ = shutdown_rx.await;
        }));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create client");

        Self {
            addr,
            client,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the full URL for a path
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Request failed")
    }

    /// Make a POST request with JSON body
    pub async fn post_json(&self, path: &str, body: &Value) -> Response {
        self.post_json_with_headers(path, body, Vec::new()).await
    }

    /// Make a POST request with JSON body and headers
    pub async fn post_json_with_headers(
        &self,
        path: &str,
        body: &Value,
        headers: Vec<(&str, &str)>,
    ) -> Response {
        let mut builder = self.client.post(self.url(path)).json(body);
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        builder.send().await.expect("Request failed")
    }

    /// Parse response body as JSON
    pub async fn json_body(response: Response) -> Value {
        response.json().await.expect("Failed to parse JSON")
    }

    /// Shutdown the gateway
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    sub: &'a str,
    iss: &'a str,
    aud: &'a str,
    exp: i64,
}

/// HS256 token accepted by the `default` policy when `audience` is
/// `ai-gateway`
pub fn bearer_token(audience: &str) -> String {
    let claims = Claims {
        sub: "customer-42",
        iss: TEST_ISSUER,
        aud: audience,
        exp: chrono::Utc::now().timestamp() + 600,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .expect("encode token");
    format!("Bearer {token}")
}

/// Assert that a response has the expected status code
pub fn assert_status(response: &Response, expected: u16) {
    assert_eq!(
        response.status().as_u16(),
        expected,
        "Expected status {}, got {}",
        expected,
        response.status()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_config_compiles_against_mock_urls() {
        let yaml = gateway_yaml(&Upstreams {
            openai: "http://127.0.0.1:1",
            anthropic: "http://127.0.0.1:2",
            ollama: "http://127.0.0.1:3",
        });
        let runtime = compile(&yaml).await;

        assert_eq!(runtime.route_table.len(), 3);
        assert_eq!(runtime.backends.len(), 4);
        assert!(runtime.security_policies.contains_key("default"));
    }

    #[tokio::test]
    async fn test_gateway_health() {
        let yaml = gateway_yaml(&Upstreams {
            openai: "http://127.0.0.1:1",
            anthropic: "http://127.0.0.1:2",
            ollama: "http://127.0.0.1:3",
        });
        let gateway = TestGateway::start(&yaml).await;

        let response = gateway.get("/health").await;
        assert_status(&response, 200);

        let json = TestGateway::json_body(response).await;
        assert_eq!(json["status"], "healthy");
    }
}
