//! 摘要工具：只总结给定内容，不引用外部知识
//!
//! content 为空或过短（< 10 字符）时视为没有文档，直接失败；模型失败时同样失败，不回退到通用推理。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::{StepArgs, Tool, ToolKind};

/// 少于该字符数的内容视为空文档
pub const MIN_SUMMARY_CHARS: usize = 10;

const NO_DOCUMENT: &str = "No document is currently available to summarize.";

pub struct SummarizerTool {
    llm: Arc<dyn LlmClient>,
}

impl SummarizerTool {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    fn prompt(content: &str) -> String {
        format!(
            "You are a document summarizer. Summarize ONLY the document below. \
             Do not reference other documents, conversations or external knowledge, and do not make up content.\n\n\
             Document:\n{content}\n\n\
             Provide a 5-10 sentence summary focusing on the main points and key details."
        )
    }
}

#[async_trait]
impl Tool for SummarizerTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Summarizer
    }

    fn description(&self) -> &str {
        "Summarize the attached document or inline text. Args: {\"content\": \"...\"}"
    }

    async fn invoke(&self, args: StepArgs) -> Result<String, AgentError> {
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if content.chars().count() < MIN_SUMMARY_CHARS {
            return Err(AgentError::ToolExecutionFailed(NO_DOCUMENT.to_string()));
        }

        let messages = vec![Message::user(Self::prompt(content))];
        let summary = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;
        let summary = summary.trim();
        if summary.is_empty() {
            return Err(AgentError::ToolExecutionFailed(
                "Summarizer returned an empty summary".to_string(),
            ));
        }
        Ok(format!("**Document Summary:**\n{summary}"))
    }
}
