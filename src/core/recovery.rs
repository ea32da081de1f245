//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供 Orchestrator 决定是记录后继续还是终止整个 Plan。

use crate::core::{AgentError, RecoveryAction};

/// 将 Step 级错误映射为可执行动作：Step 作用域内的错误可恢复，不变量/配置/取消类错误致命
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ToolExecutionFailed(_)
            | AgentError::ToolTimeout(_)
            | AgentError::UnsupportedLanguage(_)
            | AgentError::LlmError(_) => RecoveryAction::Continue,
            AgentError::Routing(_)
            | AgentError::ToolUnavailable(_)
            | AgentError::ConfigError(_)
            | AgentError::Cancelled => RecoveryAction::Abort,
            // Plan 已通过校验后不应再出现规划错误，出现即视为内部问题
            AgentError::Planning(_) => RecoveryAction::Abort,
        }
    }
}
