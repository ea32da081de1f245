//! 编排过程的结构化事件
//!
//! 只携带索引、工具名、计数与错误类别，不携带查询或结果内容；
//! 每个事件写入 tracing，并可转发给外部日志 sink（mpsc）。

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    PlanCreated {
        session_id: String,
        steps: usize,
        tools: Vec<String>,
    },
    StepStarted {
        index: usize,
        tool: String,
    },
    StepCompleted {
        index: usize,
        tool: String,
        duration_ms: u64,
    },
    StepFailed {
        index: usize,
        tool: String,
        error_kind: String,
    },
    /// 上游依赖失败，未调用工具
    StepSkipped {
        index: usize,
        tool: String,
    },
    PlanCompleted {
        succeeded: usize,
        failed: usize,
    },
    PlanAborted {
        at_step: Option<usize>,
        error_kind: String,
    },
}

/// 事件出口：tracing + 可选 channel
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<OrchestratorEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<OrchestratorEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, event: OrchestratorEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        tracing::info!(event = %payload, "orchestrator");
        if let Some(tx) = &self.tx {
            // 接收端已关闭时忽略
            let _ = tx.send(event);
        }
    }
}
