//! End-to-end integration tests
//!
//! A real gateway on a loopback port, talking to wiremock providers.

use crate::helpers::*;
use crate::mock_providers::*;
use serde_json::json;
use std::time::Duration;

struct Harness {
    openai: MockOpenAI,
    anthropic: MockAnthropic,
    ollama: MockOllama,
    gateway: TestGateway,
}

async fn harness() -> Harness {
    let openai = MockOpenAI::start().await;
    let anthropic = MockAnthropic::start().await;
    let ollama = MockOllama::start().await;
    let yaml = gateway_yaml(&Upstreams {
        openai: &openai.url(),
        anthropic: &anthropic.url(),
        ollama: &ollama.url(),
    });
    let gateway = TestGateway::start(&yaml).await;

    Harness {
        openai,
        anthropic,
        ollama,
        gateway,
    }
}

fn advice_request() -> serde_json::Value {
    json!({"prompt": "Should I rebalance my portfolio before year end?"})
}

#[tokio::test]
async fn test_primary_backend_serves() {
    let h = harness().await;
    h.openai
        .mock_completion("gpt-4-1106-preview", "Rebalance once a year.")
        .await;

    let response = h.gateway.post_json("/v1/investment", &advice_request()).await;
    assert_status(&response, 200);

    let headers = response.headers().clone();
    assert_eq!(headers["x-gateway-route"], "investment-advisor");
    assert_eq!(headers["x-gateway-backend"], "investment-primary");
    assert_eq!(headers["x-ratelimit-limit"], "10000");
    assert!(headers.contains_key("x-request-id"));

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["response"], "Rebalance once a year.");
    assert_eq!(body["provider"], "openai");
    assert_eq!(body["model"], "gpt-4-1106-preview");
    assert_eq!(body["used_fallback"], false);
    assert_eq!(body["usage"]["output_tokens"], 15);
    assert!(body.get("original_model").is_none());

    assert_eq!(h.openai.calls().await, 1);
    assert_eq!(h.anthropic.calls().await, 0);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let h = harness().await;
    h.openai.mock_completion("gpt-4-1106-preview", "Hold.").await;

    let response = h
        .gateway
        .post_json_with_headers(
            "/v1/investment",
            &advice_request(),
            vec![("x-request-id", "trace-abc-123")],
        )
        .await;

    assert_status(&response, 200);
    assert_eq!(response.headers()["x-request-id"], "trace-abc-123");
}

#[tokio::test]
async fn test_fallback_after_upstream_error() {
    let h = harness().await;
    h.openai.mock_server_error().await;
    h.anthropic
        .mock_message("claude-3-opus-20240229", "Consider tax-loss harvesting.")
        .await;

    let response = h.gateway.post_json("/v1/investment", &advice_request()).await;
    assert_status(&response, 200);
    assert_eq!(response.headers()["x-gateway-backend"], "investment-secondary");

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["response"], "Consider tax-loss harvesting.");
    assert_eq!(body["provider"], "anthropic");
    assert_eq!(body["used_fallback"], true);
    assert_eq!(body["original_model"], "gpt-4-1106-preview");

    assert_eq!(h.openai.calls().await, 1);
    assert_eq!(h.anthropic.calls().await, 1);
}

#[tokio::test]
async fn test_fallback_after_upstream_rate_limit() {
    let h = harness().await;
    h.openai.mock_rate_limit().await;
    h.anthropic
        .mock_message("claude-3-opus-20240229", "Stay diversified.")
        .await;

    let response = h.gateway.post_json("/v1/investment", &advice_request()).await;
    assert_status(&response, 200);

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["used_fallback"], true);
    assert_eq!(body["backend"], "investment-secondary");
}

#[tokio::test]
async fn test_fallback_after_timeout() {
    let h = harness().await;
    h.openai
        .mock_completion_delayed("gpt-4-1106-preview", "Too late.", Duration::from_secs(3))
        .await;
    h.anthropic
        .mock_message("claude-3-opus-20240229", "On time.")
        .await;

    let response = h.gateway.post_json("/v1/investment", &advice_request()).await;
    assert_status(&response, 200);

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["response"], "On time.");
    assert_eq!(body["used_fallback"], true);
}

#[tokio::test]
async fn test_exhausted_chain() {
    let h = harness().await;
    h.openai.mock_server_error().await;
    h.anthropic.mock_overloaded().await;

    let response = h.gateway.post_json("/v1/investment", &advice_request()).await;
    assert_status(&response, 503);
    assert!(response.headers().get("retry-after").is_none());

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["error"]["code"], "backends_exhausted");

    assert_eq!(h.openai.calls().await, 1);
    assert_eq!(h.anthropic.calls().await, 1);
}

#[tokio::test]
async fn test_local_route() {
    let h = harness().await;
    h.ollama.mock_chat("llama3:8b", "Pay down the highest rate first.").await;

    let response = h
        .gateway
        .post_json(
            "/v1/loan-local",
            &json!({"messages": [
                {"role": "system", "content": "You are a loan advisor."},
                {"role": "user", "content": "Which loan should I repay first?"}
            ]}),
        )
        .await;
    assert_status(&response, 200);

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["provider"], "ollama");
    assert_eq!(body["model"], "llama3:8b");
    assert_eq!(body["usage"]["input_tokens"], 24);
    assert_eq!(body["usage"]["output_tokens"], 12);
}

#[tokio::test]
async fn test_local_route_honours_client_model() {
    let h = harness().await;
    h.ollama.mock_chat_for_model("phi-2", "Consolidate the card debt.").await;

    let response = h
        .gateway
        .post_json(
            "/v1/loan-local",
            &json!({"prompt": "How do I lower my payments?", "model": "phi-2"}),
        )
        .await;
    assert_status(&response, 200);

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["model"], "phi-2");
    assert_eq!(body["used_fallback"], false);
}

#[tokio::test]
async fn test_local_route_ignores_unlisted_model() {
    let h = harness().await;
    h.ollama.mock_chat_for_model("llama3:8b", "Pay the smallest balance first.").await;

    let response = h
        .gateway
        .post_json(
            "/v1/loan-local",
            &json!({"prompt": "Snowball or avalanche?", "model": "codellama:7b"}),
        )
        .await;
    assert_status(&response, 200);
    assert_eq!(TestGateway::json_body(response).await["model"], "llama3:8b");
}

#[tokio::test]
async fn test_local_budget_exhaustion() {
    let h = harness().await;
    h.ollama.mock_chat("llama3:8b", "Refinance.").await;

    // About 80 estimated input tokens against a 100 token bucket
    let request = json!({"prompt": "x".repeat(300)});

    let first = h.gateway.post_json("/v1/loan-local", &request).await;
    assert_status(&first, 200);

    let second = h.gateway.post_json("/v1/loan-local", &request).await;
    assert_status(&second, 503);
    assert!(second.headers().contains_key("retry-after"));

    let body = TestGateway::json_body(second).await;
    assert_eq!(body["error"]["code"], "backends_exhausted");
    assert_eq!(h.ollama.calls().await, 1);
}

#[tokio::test]
async fn test_unmatched_path() {
    let h = harness().await;

    let response = h.gateway.post_json("/v2/unknown", &advice_request()).await;
    assert_status(&response, 404);

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["error"]["code"], "route_not_found");
}

#[tokio::test]
async fn test_wrong_method() {
    let h = harness().await;

    let response = h.gateway.get("/v1/investment").await;
    assert_status(&response, 405);
    assert_eq!(h.openai.calls().await, 0);
}

#[tokio::test]
async fn test_invalid_body() {
    let h = harness().await;

    let response = h.gateway.post_json("/v1/investment", &json!({})).await;
    assert_status(&response, 400);

    let body = TestGateway::json_body(response).await;
    assert_eq!(body["error"]["code"], "missing_prompt");
}

#[tokio::test]
async fn test_secured_route() {
    let h = harness().await;
    h.anthropic
        .mock_message("claude-3-sonnet-20240229", "Your ticket is open.")
        .await;
    let request = json!({"prompt": "Where is my statement?"});

    let missing = h.gateway.post_json("/v1/customer", &request).await;
    assert_status(&missing, 401);
    assert_eq!(missing.headers()["www-authenticate"], "Bearer");

    let wrong_audience = bearer_token("another-service");
    let rejected = h
        .gateway
        .post_json_with_headers(
            "/v1/customer",
            &request,
            vec![("authorization", wrong_audience.as_str())],
        )
        .await;
    assert_status(&rejected, 401);
    assert_eq!(h.anthropic.calls().await, 0);

    let token = bearer_token("ai-gateway");
    let accepted = h
        .gateway
        .post_json_with_headers(
            "/v1/customer",
            &request,
            vec![("authorization", token.as_str())],
        )
        .await;
    assert_status(&accepted, 200);
    assert_eq!(h.anthropic.calls().await, 1);
}

#[tokio::test]
async fn test_cors_preflight() {
    let h = harness().await;

    let response = h
        .gateway
        .client
        .request(reqwest::Method::OPTIONS, h.gateway.url("/v1/investment"))
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .expect("preflight");

    assert_eq!(
        response.headers()["access-control-allow-origin"],
        "https://app.example.com"
    );
}

#[tokio::test]
async fn test_operational_endpoints() {
    let h = harness().await;
    h.openai.mock_completion("gpt-4-1106-preview", "Hold.").await;

    let ready = h.gateway.get("/ready").await;
    assert_status(&ready, 200);

    let served = h.gateway.post_json("/v1/investment", &advice_request()).await;
    assert_status(&served, 200);

    let metrics = h.gateway.get("/metrics").await;
    assert_status(&metrics, 200);
    let text = metrics.text().await.expect("metrics body");
    assert!(text.contains("ai_gateway_requests_total"));
    assert!(text.contains(r#"route="investment-advisor""#));
    assert!(text.contains("ai_gateway_tokens_total"));
}
