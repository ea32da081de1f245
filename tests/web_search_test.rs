//! Web 搜索适配器：对本地 mock 服务器的 HTTP 行为

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use intellect::core::AgentError;
use intellect::tools::{StepArgs, Tool, WebSearchTool};

fn query_args(query: &str) -> StepArgs {
    let mut args = StepArgs::new();
    args.insert("query".into(), json!(query));
    args
}

fn tool_for(server: &MockServer, timeout_secs: u64) -> WebSearchTool {
    WebSearchTool::new(format!("{}/search", server.uri()), "test-key", 3, timeout_secs)
}

#[tokio::test]
async fn test_search_renders_answer_and_sources() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({
            "api_key": "test-key",
            "query": "latest news about AI",
            "max_results": 3,
            "include_answer": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "Several new models were announced.",
            "results": [
                {"title": "Model launch", "url": "https://news.example/a", "content": "A lab released a model."},
                {"title": "Chip supply", "url": "https://news.example/b", "content": ""}
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let text = tool_for(&mock_server, 5)
        .invoke(query_args("latest news about AI"))
        .await
        .unwrap();
    assert_eq!(
        text,
        "Several new models were announced.\n\
         - Model launch (https://news.example/a): A lab released a model.\n\
         - Chip supply (https://news.example/b)"
    );
}

#[tokio::test]
async fn test_empty_results() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
        .mount(&mock_server)
        .await;

    let text = tool_for(&mock_server, 5).invoke(query_args("nothing")).await.unwrap();
    assert_eq!(text, "No results found for 'nothing'.");
}

#[tokio::test]
async fn test_rejected_credentials_are_fatal() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let err = tool_for(&mock_server, 5).invoke(query_args("rust")).await.unwrap_err();
    assert_eq!(err, AgentError::ToolUnavailable("web_search".into()));
}

#[tokio::test]
async fn test_server_error_is_step_scoped() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let err = tool_for(&mock_server, 5).invoke(query_args("rust")).await.unwrap_err();
    assert!(matches!(err, AgentError::ToolExecutionFailed(msg) if msg.contains("500")));
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": []}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let err = tool_for(&mock_server, 1).invoke(query_args("rust")).await.unwrap_err();
    assert_eq!(err, AgentError::ToolTimeout("web_search".into()));
}

#[tokio::test]
async fn test_missing_query() {
    let mock_server = MockServer::start().await;
    let err = tool_for(&mock_server, 5).invoke(StepArgs::new()).await.unwrap_err();
    assert!(matches!(err, AgentError::ToolExecutionFailed(_)));
}
