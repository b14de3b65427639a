//! Mock model providers for integration testing
//!
//! Wiremock servers that speak the OpenAI, Anthropic and Ollama chat APIs.
//! The gateway is pointed at them through provider `base_url` and backend
//! `endpoint` overrides.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Number of requests a mock server has received
async fn received(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map_or(0, |requests| requests.len())
}

/// Mock OpenAI API server
pub struct MockOpenAI {
    pub server: MockServer,
}

impl MockOpenAI {
    /// Start a new mock OpenAI server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL for this mock server
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Number of calls made to the mock
    pub async fn calls(&self) -> usize {
        received(&self.server).await
    }

    /// Successful chat completion
    pub async fn mock_completion(&self, model: &str, content: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(openai_chat_response(model, content)),
            )
            .mount(&self.server)
            .await;
    }

    /// Chat completion that answers only after `delay`
    pub async fn mock_completion_delayed(&self, model: &str, content: &str, delay: Duration) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(openai_chat_response(model, content))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }

    /// Upstream rate limit
    pub async fn mock_rate_limit(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(openai_error_response(
                        "rate_limit_exceeded",
                        "Rate limit reached for gpt-4",
                    ))
                    .append_header("Retry-After", "20"),
            )
            .mount(&self.server)
            .await;
    }

    /// Upstream server error
    pub async fn mock_server_error(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(openai_error_response("server_error", "Internal server error")),
            )
            .mount(&self.server)
            .await;
    }
}

/// Mock Anthropic API server
pub struct MockAnthropic {
    pub server: MockServer,
}

impl MockAnthropic {
    /// Start a new mock Anthropic server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Base URL for this mock server
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Number of calls made to the mock
    pub async fn calls(&self) -> usize {
        received(&self.server).await
    }

    /// Successful messages call
    pub async fn mock_message(&self, model: &str, content: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "ak-test"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(anthropic_message_response(model, content)),
            )
            .mount(&self.server)
            .await;
    }

    /// Anthropic overload error
    pub async fn mock_overloaded(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_json(json!({
                "type": "error",
                "error": {"type": "overloaded_error", "message": "Overloaded"}
            })))
            .mount(&self.server)
            .await;
    }
}

/// Mock Ollama server
pub struct MockOllama {
    pub server: MockServer,
}

impl MockOllama {
    /// Start a new mock Ollama server
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Endpoint for this mock server
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Number of calls made to the mock
    pub async fn calls(&self) -> usize {
        received(&self.server).await
    }

    /// Successful chat
    pub async fn mock_chat(&self, model: &str, content: &str) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": model,
                "created_at": "2024-05-01T10:00:00Z",
                "message": {"role": "assistant", "content": content},
                "done": true,
                "prompt_eval_count": 24,
                "eval_count": 12
            })))
            .mount(&self.server)
            .await;
    }

    /// Successful chat, only for requests naming `model`
    pub async fn mock_chat_for_model(&self, model: &str, content: &str) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": model})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": model,
                "created_at": "2024-05-01T10:00:00Z",
                "message": {"role": "assistant", "content": content},
                "done": true,
                "prompt_eval_count": 24,
                "eval_count": 12
            })))
            .mount(&self.server)
            .await;
    }
}

fn openai_chat_response(model: &str, content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1_714_557_600,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 25, "completion_tokens": 15, "total_tokens": 40}
    })
}

fn openai_error_response(error_type: &str, message: &str) -> Value {
    json!({
        "error": {
            "message": message,
            "type": error_type,
            "code": error_type
        }
    })
}

fn anthropic_message_response(model: &str, content: &str) -> Value {
    json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "model": model,
        "content": [{"type": "text", "text": content}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 25, "output_tokens": 15}
    })
}
