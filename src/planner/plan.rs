//! Plan / Step：规划结果
//!
//! Plan 一经创建即不可变，交由 Orchestrator 独占执行；构造时校验非空与 depends_on 只引用更早的步骤。

use std::time::Duration;

use serde::Serialize;

use crate::core::AgentError;
use crate::planner::Intent;
use crate::tools::{StepArgs, ToolKind};

/// 单个步骤：一次工具调用
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub intent: Intent,
    pub tool: ToolKind,
    /// 参数中可含 {{stepK}} / {{stepK.result}} / {{stepK.numbers}} 占位符，执行时解析
    pub args: StepArgs,
    pub depends_on: Vec<usize>,
    /// None 时使用执行器默认超时
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl Step {
    pub fn new(intent: Intent, tool: ToolKind, args: StepArgs) -> Self {
        Self {
            intent,
            tool,
            args,
            depends_on: Vec::new(),
            timeout: None,
        }
    }

    pub fn depends_on(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.depends_on = indices.into_iter().collect();
        self.depends_on.sort_unstable();
        self.depends_on.dedup();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }
}

/// 有序步骤序列
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    /// 校验后创建：非空，且每个 depends_on 索引严格小于自身索引
    pub fn new(steps: Vec<Step>) -> Result<Self, AgentError> {
        if steps.is_empty() {
            return Err(AgentError::Planning("plan has no steps".to_string()));
        }
        for (i, step) in steps.iter().enumerate() {
            if let Some(bad) = step.depends_on.iter().find(|d| **d >= i) {
                return Err(AgentError::Planning(format!(
                    "step {i} depends on step {bad}, which does not precede it"
                )));
            }
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn tools(&self) -> Vec<ToolKind> {
        self.steps.iter().map(|s| s.tool).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(tool: ToolKind) -> Step {
        Step::new(Intent::Calculate, tool, StepArgs::new())
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert!(matches!(Plan::new(vec![]), Err(AgentError::Planning(_))));
    }

    #[test]
    fn test_forward_and_self_references_rejected() {
        let forward = vec![step(ToolKind::Calculator).depends_on([1]), step(ToolKind::Calculator)];
        assert!(matches!(Plan::new(forward), Err(AgentError::Planning(_))));
        let cyclic = vec![step(ToolKind::Calculator), step(ToolKind::Calculator).depends_on([1])];
        assert!(matches!(Plan::new(cyclic), Err(AgentError::Planning(_))));
    }

    #[test]
    fn test_backward_reference_ok() {
        let plan = Plan::new(vec![
            step(ToolKind::WebSearch),
            step(ToolKind::Calculator).depends_on([0, 0]),
        ])
        .unwrap();
        assert_eq!(plan.steps()[1].depends_on, vec![0]);
        assert_eq!(plan.tools(), vec![ToolKind::WebSearch, ToolKind::Calculator]);
    }
}
