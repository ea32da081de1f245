//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 Continue（记入 trace 后继续）或 Abort（终止本次 Plan）。

use thiserror::Error;

/// 规划、路由、工具执行、配置各阶段的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 查询无法拆解为至少一个可识别意图，或 Plan 结构非法
    #[error("Planning error: {0}")]
    Planning(String),

    /// 意图与工具的配对不被允许（内部不变量被破坏，总是致命）
    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// 工具适配器不可达或配置错误（致命）
    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Cancelled")]
    Cancelled,
}

impl AgentError {
    /// 错误类别名（结构化日志只记录类别，不记录细节）
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Planning(_) => "planning",
            AgentError::Routing(_) => "routing",
            AgentError::ToolExecutionFailed(_) => "tool",
            AgentError::ToolTimeout(_) => "timeout",
            AgentError::UnsupportedLanguage(_) => "unsupported_language",
            AgentError::ToolUnavailable(_) => "tool_unavailable",
            AgentError::LlmError(_) => "llm",
            AgentError::ConfigError(_) => "configuration",
            AgentError::Cancelled => "cancelled",
        }
    }

    /// 面向用户的一句话摘要，不暴露内部细节
    pub fn user_summary(&self) -> String {
        match self {
            AgentError::Planning(msg) => format!("could not plan the request: {msg}"),
            AgentError::Routing(_) => "internal routing check failed".to_string(),
            AgentError::ToolExecutionFailed(msg) => first_line(msg),
            AgentError::ToolTimeout(tool) => format!("{tool} timed out"),
            AgentError::UnsupportedLanguage(lang) => {
                format!("code language '{lang}' is not supported")
            }
            AgentError::ToolUnavailable(tool) => format!("{tool} is unavailable"),
            AgentError::LlmError(_) => "the language model did not respond".to_string(),
            AgentError::ConfigError(_) => "service is not configured".to_string(),
            AgentError::Cancelled => "request was cancelled".to_string(),
        }
    }
}

fn first_line(msg: &str) -> String {
    let line = msg.lines().next().unwrap_or("").trim();
    if line.chars().count() > 200 {
        format!("{}...", line.chars().take(200).collect::<String>())
    } else {
        line.to_string()
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 记入 trace，继续执行后续独立的 Step
    Continue,
    /// 终止当前 Plan，返回已有的部分结果
    Abort,
}
