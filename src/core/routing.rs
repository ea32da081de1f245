//! 严格路由策略：意图 -> 允许的工具
//!
//! 纯函数，无副作用。Planner 分配工具时检查一次，Orchestrator 派发前再检查一次。
//! 映射固定：qa 有文档时只能走文档问答、否则走通用推理；summarize 只能走摘要工具，
//! 永远不会回退到通用推理。强制工具未注册时为 RoutingError，没有替代工具。

use std::collections::HashSet;

use crate::core::AgentError;
use crate::planner::{Intent, Step};
use crate::tools::ToolKind;

#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    available: HashSet<ToolKind>,
}

impl RoutingPolicy {
    pub fn new(available: HashSet<ToolKind>) -> Self {
        Self { available }
    }

    /// 假定所有工具均已注册
    pub fn all_tools() -> Self {
        Self::new(ToolKind::ALL.into_iter().collect())
    }

    /// 固定映射表
    pub fn mandated(intent: Intent, has_document: bool) -> ToolKind {
        match intent {
            Intent::Qa if has_document => ToolKind::DocumentAnswerer,
            Intent::Qa => ToolKind::GeneralReasoner,
            Intent::Summarize => ToolKind::Summarizer,
            Intent::Calculate => ToolKind::Calculator,
            Intent::Code => ToolKind::CodeExecutor,
            Intent::WebSearch => ToolKind::WebSearch,
        }
    }

    pub fn allow(&self, intent: Intent, has_document: bool) -> Result<ToolKind, AgentError> {
        let tool = Self::mandated(intent, has_document);
        if !self.available.contains(&tool) {
            return Err(AgentError::Routing(format!(
                "intent '{intent}' requires tool '{tool}', which is not registered"
            )));
        }
        Ok(tool)
    }

    /// 派发前的二次检查：步骤的工具必须与当前映射一致
    pub fn verify(&self, step: &Step, has_document: bool) -> Result<(), AgentError> {
        let expected = self.allow(step.intent, has_document)?;
        if step.tool != expected {
            return Err(AgentError::Routing(format!(
                "intent '{}' may not be served by '{}' (expected '{}')",
                step.intent, step.tool, expected
            )));
        }
        Ok(())
    }
}
