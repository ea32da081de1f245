//! Web 搜索工具：调用 Tavily 风格的搜索 API
//!
//! POST {endpoint} JSON {api_key, query, max_results, include_answer}，
//! 返回 answer + 结果列表（标题 / URL / 片段），格式化为可读文本。
//! 超时 -> ToolTimeout；连接失败或 401/403 -> ToolUnavailable（致命）；其它 HTTP 错误 -> ToolExecutionFailed。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::tools::{StepArgs, Tool, ToolKind};

/// 单条结果片段的最大字符数
const SNIPPET_CHARS: usize = 300;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: usize,
    include_answer: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// Web 搜索工具
pub struct WebSearchTool {
    client: Client,
    endpoint: String,
    api_key: String,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        max_results: usize,
        timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            max_results: max_results.max(1),
        }
    }

    fn map_transport_error(e: reqwest::Error) -> AgentError {
        let tool = ToolKind::WebSearch.name().to_string();
        if e.is_timeout() {
            AgentError::ToolTimeout(tool)
        } else if e.is_connect() || e.is_builder() {
            tracing::warn!(error = %e, "web search endpoint unreachable");
            AgentError::ToolUnavailable(tool)
        } else {
            AgentError::ToolExecutionFailed(format!("Search request failed: {e}"))
        }
    }

    fn render(response: SearchResponse) -> String {
        let mut out = String::new();
        if let Some(answer) = response.answer.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            out.push_str(answer);
            out.push('\n');
        }
        for hit in &response.results {
            let snippet = hit.content.trim();
            let snippet = if snippet.chars().count() > SNIPPET_CHARS {
                format!("{}...", snippet.chars().take(SNIPPET_CHARS).collect::<String>())
            } else {
                snippet.to_string()
            };
            out.push_str(&format!("- {} ({})", hit.title.trim(), hit.url.trim()));
            if !snippet.is_empty() {
                out.push_str(&format!(": {snippet}"));
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }

    async fn search(&self, query: &str) -> Result<String, AgentError> {
        let body = SearchRequest {
            api_key: &self.api_key,
            query,
            max_results: self.max_results,
            include_answer: true,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(Self::map_transport_error)?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!(status = %status, "web search rejected credentials");
            return Err(AgentError::ToolUnavailable(ToolKind::WebSearch.name().to_string()));
        }
        if !status.is_success() {
            return Err(AgentError::ToolExecutionFailed(format!("Search HTTP {status}")));
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Invalid search response: {e}")))?;
        let text = Self::render(parsed);
        if text.is_empty() {
            return Ok(format!("No results found for '{query}'."));
        }
        Ok(text)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::WebSearch
    }

    fn description(&self) -> &str {
        "Search the web and return an answer with sources. Args: {\"query\": \"latest news about AI\"}"
    }

    async fn invoke(&self, args: StepArgs) -> Result<String, AgentError> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if query.is_empty() {
            return Err(AgentError::ToolExecutionFailed("Missing query".to_string()));
        }
        self.search(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_answer_and_hits() {
        let response = SearchResponse {
            answer: Some("AI news summary.".into()),
            results: vec![SearchHit {
                title: "Headline".into(),
                url: "https://example.com/a".into(),
                content: "Body".into(),
            }],
        };
        let text = WebSearchTool::render(response);
        assert_eq!(text, "AI news summary.\n- Headline (https://example.com/a): Body");
    }

    #[test]
    fn test_render_empty() {
        let response = SearchResponse {
            answer: None,
            results: vec![],
        };
        assert!(WebSearchTool::render(response).is_empty());
    }
}
