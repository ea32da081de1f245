//! 工具注册表
//!
//! 工具种类是封闭枚举 ToolKind；每种工具实现 Tool trait（kind / description / invoke），
//! 由 ToolRegistry 按 ToolKind 注册与查找，ToolExecutor 在调用时加超时并统一转 AgentError。

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::AgentError;

/// Step 参数：名称 -> 值
pub type StepArgs = Map<String, Value>;

/// 全部工具种类；新增工具 = 新增一个枚举值 + 一条注册
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Calculator,
    CodeExecutor,
    WebSearch,
    Summarizer,
    /// 基于检索上下文回答文档问题
    DocumentAnswerer,
    /// 通用推理（无文档时的问答）
    GeneralReasoner,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::WebSearch,
        ToolKind::Calculator,
        ToolKind::CodeExecutor,
        ToolKind::Summarizer,
        ToolKind::DocumentAnswerer,
        ToolKind::GeneralReasoner,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Calculator => "calculator",
            ToolKind::CodeExecutor => "code_executor",
            ToolKind::WebSearch => "web_search",
            ToolKind::Summarizer => "summarizer",
            ToolKind::DocumentAnswerer => "document_answerer",
            ToolKind::GeneralReasoner => "general_reasoner",
        }
    }

    /// 最终回复中该工具结果的标题
    pub fn header(&self) -> &'static str {
        match self {
            ToolKind::Calculator => "## Calculator Agent:",
            ToolKind::CodeExecutor => "## Code Executor Agent:",
            ToolKind::WebSearch => "## Web Search Agent:",
            ToolKind::Summarizer => "## Summarizer Agent:",
            ToolKind::DocumentAnswerer => "## Document Q&A Agent:",
            ToolKind::GeneralReasoner => "## LLM Agent:",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 工具 trait：种类、描述、异步调用（args 为名称到值的映射）
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    fn description(&self) -> &str;

    /// 执行工具；Step 作用域错误返回 ToolExecutionFailed / UnsupportedLanguage，
    /// 适配器不可达或配置错误返回 ToolUnavailable
    async fn invoke(&self, args: StepArgs) -> Result<String, AgentError>;
}

/// 工具注册表：按 ToolKind 存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同种类重复注册时后者覆盖前者
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.kind(), tool);
    }

    pub async fn invoke(&self, kind: ToolKind, args: StepArgs) -> Result<String, AgentError> {
        let tool = self
            .tools
            .get(&kind)
            .ok_or_else(|| AgentError::ToolUnavailable(kind.name().to_string()))?;
        tool.invoke(args).await
    }

    /// 已注册的工具种类（供 RoutingPolicy 判断可用性）
    pub fn available(&self) -> HashSet<ToolKind> {
        self.tools.keys().copied().collect()
    }

    /// 返回 (name, description) 列表，按 ToolKind 顺序
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        let mut kinds: Vec<&ToolKind> = self.tools.keys().collect();
        kinds.sort();
        kinds
            .into_iter()
            .filter_map(|k| {
                self.tools
                    .get(k)
                    .map(|t| (k.name().to_string(), t.description().to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(ToolKind);

    #[async_trait]
    impl Tool for Fixed {
        fn kind(&self) -> ToolKind {
            self.0
        }

        fn description(&self) -> &str {
            "fixed"
        }

        async fn invoke(&self, _args: StepArgs) -> Result<String, AgentError> {
            Ok(self.0.name().to_string())
        }
    }

    #[tokio::test]
    async fn test_register_and_invoke() {
        let mut registry = ToolRegistry::new();
        registry.register(Fixed(ToolKind::Calculator));
        let out = registry.invoke(ToolKind::Calculator, StepArgs::new()).await.unwrap();
        assert_eq!(out, "calculator");
        assert!(registry.available().contains(&ToolKind::Calculator));
    }

    #[tokio::test]
    async fn test_missing_tool_is_unavailable() {
        let registry = ToolRegistry::new();
        let err = registry.invoke(ToolKind::WebSearch, StepArgs::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolUnavailable(_)));
    }
}
