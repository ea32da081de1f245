//! 问答工具：文档问答（只依据检索片段）与通用推理
//!
//! DocumentAnswererTool 要求调用方传入 passages（来自检索索引），无片段时直接回复 "Not found in the document."；
//! GeneralReasonerTool 用于无文档时的问答，可带最近几轮对话与会话内的相关事实作为上下文。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::{StepArgs, Tool, ToolKind};

pub const NOT_FOUND_IN_DOCUMENT: &str = "Not found in the document.";

fn question_arg(args: &StepArgs) -> Result<String, AgentError> {
    let q = args
        .get("question")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim();
    if q.is_empty() {
        return Err(AgentError::ToolExecutionFailed("No question provided".to_string()));
    }
    Ok(q.to_string())
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value.and_then(|v| v.as_array()).map(|items| {
        items
            .iter()
            .filter_map(|i| i.as_str())
            .map(str::to_string)
            .collect()
    })
}

/// 文档问答：只使用检索片段作答
pub struct DocumentAnswererTool {
    llm: Arc<dyn LlmClient>,
}

impl DocumentAnswererTool {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Tool for DocumentAnswererTool {
    fn kind(&self) -> ToolKind {
        ToolKind::DocumentAnswerer
    }

    fn description(&self) -> &str {
        "Answer a question using only passages retrieved from the attached document. Args: {\"question\": \"...\", \"passages\": [\"...\"]}"
    }

    async fn invoke(&self, args: StepArgs) -> Result<String, AgentError> {
        let question = question_arg(&args)?;
        // passages 缺失说明没有经过检索，属于调用方错误
        let passages = string_list(args.get("passages")).ok_or_else(|| {
            AgentError::ToolExecutionFailed("Document answer requires retrieved passages".to_string())
        })?;
        if passages.iter().all(|p| p.trim().is_empty()) {
            return Ok(NOT_FOUND_IN_DOCUMENT.to_string());
        }

        let context = passages.join("\n---\n");
        let prompt = format!(
            "You are a document Q&A assistant. Use ONLY the provided context to answer the question. \
             If the answer is not present, say '{NOT_FOUND_IN_DOCUMENT}'\n\n\
             Context:\n---\n{context}\n---\n\nQuestion: {question}\n\nAnswer:"
        );
        let answer = self
            .llm
            .complete(&[Message::user(prompt)])
            .await
            .map_err(AgentError::LlmError)?;
        Ok(answer.trim().to_string())
    }
}

/// 通用推理：无文档时的问答与对话
pub struct GeneralReasonerTool {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl GeneralReasonerTool {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }
}

#[async_trait]
impl Tool for GeneralReasonerTool {
    fn kind(&self) -> ToolKind {
        ToolKind::GeneralReasoner
    }

    fn description(&self) -> &str {
        "Answer general questions and hold a conversation. Args: {\"question\": \"...\", \"history\": [\"User: ...\", \"AI: ...\"], \"facts\": [\"key: value\"]}"
    }

    async fn invoke(&self, args: StepArgs) -> Result<String, AgentError> {
        let question = question_arg(&args)?;
        let mut messages = vec![Message::system(self.system_prompt.clone())];
        if let Some(facts) = string_list(args.get("facts")).filter(|f| !f.is_empty()) {
            messages.push(Message::system(format!(
                "Known facts from this session:\n{}",
                facts.join("\n")
            )));
        }
        if let Some(history) = string_list(args.get("history")).filter(|h| !h.is_empty()) {
            messages.push(Message::system(format!(
                "Recent conversation:\n{}",
                history.join("\n")
            )));
        }
        messages.push(Message::user(question));
        let answer = self
            .llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)?;
        Ok(answer.trim().to_string())
    }
}
