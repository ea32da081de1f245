//! 状态定义：编排状态机、步骤结果、最终响应

use serde::Serialize;

use crate::tools::ToolKind;

/// 编排状态机：Idle -> Running(i) -> {Completed, Aborted}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "step", rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Running(usize),
    Completed,
    Aborted,
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrchestratorState::Completed | OrchestratorState::Aborted)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
}

/// 依赖失败时的 error_detail
pub const UPSTREAM_FAILED: &str = "upstream dependency failed";

/// 单步结果，按完成顺序追加到 trace
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepResult {
    pub step_index: usize,
    pub tool: ToolKind,
    pub status: StepStatus,
    pub value: Option<String>,
    pub error_detail: Option<String>,
}

impl StepResult {
    pub fn ok(step_index: usize, tool: ToolKind, value: impl Into<String>) -> Self {
        Self {
            step_index,
            tool,
            status: StepStatus::Ok,
            value: Some(value.into()),
            error_detail: None,
        }
    }

    pub fn failed(step_index: usize, tool: ToolKind, detail: impl Into<String>) -> Self {
        Self {
            step_index,
            tool,
            status: StepStatus::Failed,
            value: None,
            error_detail: Some(detail.into()),
        }
    }

    pub fn skipped(step_index: usize, tool: ToolKind) -> Self {
        Self::failed(step_index, tool, UPSTREAM_FAILED)
    }

    pub fn is_ok(&self) -> bool {
        self.status == StepStatus::Ok
    }
}

/// 一次请求的最终响应
#[derive(Clone, Debug, Serialize)]
pub struct Response {
    pub text: String,
    /// 实际调用过的工具（按步骤顺序；被跳过的步骤不计入）
    pub steps_used: Vec<ToolKind>,
    pub trace: Vec<StepResult>,
    pub state: OrchestratorState,
}

impl Response {
    /// 只包含成功步骤的输出（不含失败说明）
    pub fn successful_text(&self) -> String {
        self.trace
            .iter()
            .filter_map(|r| r.value.as_deref())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn failed_steps(&self) -> usize {
        self.trace.iter().filter(|r| !r.is_ok()).count()
    }

    pub fn steps_used_names(&self) -> Vec<&'static str> {
        self.steps_used.iter().map(|t| t.name()).collect()
    }
}
