//! 工具执行器
//!
//! 持有 ToolRegistry 与默认超时，execute(kind, args, timeout) 在超时内调用 registry.invoke，
//! 超时转为 ToolTimeout；每次调用输出结构化审计日志（JSON，不含参数与结果内容）。

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{StepArgs, ToolKind, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并输出审计日志
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::with_timeout(registry, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// 执行指定工具；step_timeout 为 None 时使用默认超时
    pub async fn execute(
        &self,
        kind: ToolKind,
        args: StepArgs,
        step_timeout: Option<Duration>,
    ) -> Result<String, AgentError> {
        let start = Instant::now();
        let limit = step_timeout.unwrap_or(self.timeout);
        let result = timeout(limit, self.registry.invoke(kind, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(e)) => (false, e.kind()),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": kind.name(),
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AgentError::ToolTimeout(kind.name().to_string())),
        }
    }

    pub fn available(&self) -> HashSet<ToolKind> {
        self.registry.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;

    struct Sleepy;

    #[async_trait]
    impl Tool for Sleepy {
        fn kind(&self) -> ToolKind {
            ToolKind::WebSearch
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn invoke(&self, _args: StepArgs) -> Result<String, AgentError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    #[tokio::test]
    async fn test_timeout_maps_to_tool_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(Sleepy);
        let executor = ToolExecutor::new(registry, 30);
        let err = executor
            .execute(ToolKind::WebSearch, StepArgs::new(), Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(err, AgentError::ToolTimeout("web_search".into()));
    }
}
