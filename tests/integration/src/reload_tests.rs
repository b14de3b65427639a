//! Configuration reload against a running gateway

use crate::helpers::*;
use crate::mock_providers::*;
use gateway_config::ConfigWatcher;
use serde_json::json;
use std::time::Duration;

fn write_config(file: &tempfile::NamedTempFile, yaml: &str) {
    std::fs::write(file.path(), yaml).expect("write config");
}

#[tokio::test]
async fn test_reload_swaps_routes_without_restart() {
    let openai = MockOpenAI::start().await;
    let anthropic = MockAnthropic::start().await;
    let ollama = MockOllama::start().await;
    openai.mock_completion("gpt-4-1106-preview", "Hold.").await;

    let yaml = gateway_yaml(&Upstreams {
        openai: &openai.url(),
        anthropic: &anthropic.url(),
        ollama: &ollama.url(),
    });
    let file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("temp file");
    write_config(&file, &yaml);

    let initial = compile(&yaml).await;
    let gateway = TestGateway::from_runtime(&initial).await;
    let watcher = ConfigWatcher::new(file.path(), initial);
    let _listener = gateway.state.spawn_reload_listener(watcher.subscribe());

    let request = json!({"prompt": "Is now a good time to buy bonds?"});
    assert_status(&gateway.post_json("/v1/investment", &request).await, 200);
    assert_status(&gateway.post_json("/v1/wealth", &request).await, 404);

    write_config(&file, &yaml.replace("/v1/investment", "/v1/wealth"));
    watcher.reload().await.expect("reload");

    tokio::time::timeout(Duration::from_secs(5), async {
        while gateway
            .state
            .snapshot()
            .route_table
            .match_path("/v1/wealth")
            .is_err()
        {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("routing snapshot swapped");

    assert_status(&gateway.post_json("/v1/wealth", &request).await, 200);
    assert_status(&gateway.post_json("/v1/investment", &request).await, 404);

    let metrics = gateway.get("/metrics").await.text().await.expect("metrics");
    assert!(metrics.contains(r#"ai_gateway_config_reloads_total{result="success"} 1"#));
}

#[tokio::test]
async fn test_invalid_reload_keeps_serving() {
    let openai = MockOpenAI::start().await;
    openai.mock_completion("gpt-4-1106-preview", "Hold.").await;

    let yaml = gateway_yaml(&Upstreams {
        openai: &openai.url(),
        anthropic: "http://127.0.0.1:2",
        ollama: "http://127.0.0.1:3",
    });
    let file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .expect("temp file");
    write_config(&file, &yaml);

    let initial = compile(&yaml).await;
    let gateway = TestGateway::from_runtime(&initial).await;
    let watcher = ConfigWatcher::new(file.path(), initial);
    let _listener = gateway.state.spawn_reload_listener(watcher.subscribe());

    // Output ceiling above the provider rate never compiles
    write_config(&file, &yaml.replace("max_tokens: 512", "max_tokens: 9000"));
    assert!(watcher.reload().await.is_err());

    let request = json!({"prompt": "Should I refinance?"});
    assert_status(&gateway.post_json("/v1/investment", &request).await, 200);
}
