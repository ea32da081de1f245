//! 编排器：按顺序执行 Plan 的状态机
//!
//! Idle -> Running(i) -> {Completed, Aborted}。每一步：检查取消 -> 依赖失败则跳过 -> 路由二次校验 ->
//! 从 Context 解析占位符并注入记忆（文档内容、检索片段、对话历史、相关事实）-> 带超时调用工具 ->
//! 记录 StepResult、更新 Context 与 MemoryState -> 由 RecoveryEngine 决定继续或终止。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::context::{extract_numbers, ExecutionContext};
use crate::core::events::{EventSink, OrchestratorEvent};
use crate::core::state::{OrchestratorState, Response, StepResult};
use crate::core::{AgentError, RecoveryAction, RecoveryEngine, RoutingPolicy};
use crate::memory::{MemoryState, Turn};
use crate::planner::{Plan, Step};
use crate::tools::calculator;
use crate::tools::{StepArgs, ToolExecutor, ToolKind};

/// 事实值的最大长度（搜索结果等长文本截断后存入长期记忆）
const FACT_VALUE_CHARS: usize = 1000;

/// 通用推理时附带的相关事实条数
const FACT_RECALL_K: usize = 3;

pub struct Orchestrator {
    executor: Arc<ToolExecutor>,
    policy: RoutingPolicy,
    recovery: RecoveryEngine,
    events: EventSink,
    retrieve_k: usize,
    history_turns: usize,
}

/// 单步执行的结局
enum StepOutcome {
    Success(String),
    Failure(AgentError),
    Skipped,
}

impl Orchestrator {
    pub fn new(executor: Arc<ToolExecutor>, policy: RoutingPolicy) -> Self {
        Self {
            executor,
            policy,
            recovery: RecoveryEngine::new(),
            events: EventSink::default(),
            retrieve_k: 5,
            history_turns: 5,
        }
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<OrchestratorEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn with_retrieve_k(mut self, k: usize) -> Self {
        self.retrieve_k = k.max(1);
        self
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// 执行 Plan；memory 在整个运行期间由本次运行独占
    pub async fn run(
        &self,
        session_id: &str,
        query: &str,
        plan: Plan,
        memory: &mut MemoryState,
        cancel: CancellationToken,
    ) -> Response {
        let mut state = OrchestratorState::Idle;
        tracing::debug!(?state, steps = plan.len(), "plan received");
        self.events.emit(OrchestratorEvent::PlanCreated {
            session_id: session_id.to_string(),
            steps: plan.len(),
            tools: plan.tools().iter().map(|t| t.name().to_string()).collect(),
        });

        let mut context = ExecutionContext::new();
        let mut trace: Vec<StepResult> = Vec::with_capacity(plan.len());
        let mut steps_used: Vec<ToolKind> = Vec::new();
        let mut failed: HashSet<usize> = HashSet::new();
        let mut abort: Option<(Option<usize>, AgentError)> = None;

        for (index, step) in plan.steps().iter().enumerate() {
            if cancel.is_cancelled() {
                abort = Some((Some(index), AgentError::Cancelled));
                break;
            }
            state = OrchestratorState::Running(index);
            tracing::debug!(?state, "step");

            let outcome = if step.depends_on.iter().any(|d| failed.contains(d)) {
                StepOutcome::Skipped
            } else {
                self.events.emit(OrchestratorEvent::StepStarted {
                    index,
                    tool: step.tool.name().to_string(),
                });
                // 路由不变量被破坏：直接终止
                if let Err(e) = self.policy.verify(step, memory.has_document()) {
                    trace.push(StepResult::failed(index, step.tool, e.user_summary()));
                    self.events.emit(OrchestratorEvent::StepFailed {
                        index,
                        tool: step.tool.name().to_string(),
                        error_kind: e.kind().to_string(),
                    });
                    abort = Some((Some(index), e));
                    break;
                }
                match self.prepare_args(step, &context, memory) {
                    Err(e) => StepOutcome::Failure(e),
                    Ok(args) => {
                        let started = Instant::now();
                        steps_used.push(step.tool);
                        let result = self.executor.execute(step.tool, args.clone(), step.timeout).await;
                        // 等待期间被取消：丢弃结果
                        if cancel.is_cancelled() {
                            abort = Some((Some(index), AgentError::Cancelled));
                            break;
                        }
                        match result {
                            Ok(value) => {
                                self.events.emit(OrchestratorEvent::StepCompleted {
                                    index,
                                    tool: step.tool.name().to_string(),
                                    duration_ms: started.elapsed().as_millis() as u64,
                                });
                                Self::remember(step, &args, &value, memory);
                                StepOutcome::Success(value)
                            }
                            Err(e) => StepOutcome::Failure(e),
                        }
                    }
                }
            };

            match outcome {
                StepOutcome::Success(value) => {
                    context.record_step(index, &value);
                    trace.push(StepResult::ok(index, step.tool, value));
                }
                StepOutcome::Skipped => {
                    self.events.emit(OrchestratorEvent::StepSkipped {
                        index,
                        tool: step.tool.name().to_string(),
                    });
                    failed.insert(index);
                    trace.push(StepResult::skipped(index, step.tool));
                }
                StepOutcome::Failure(e) => {
                    self.events.emit(OrchestratorEvent::StepFailed {
                        index,
                        tool: step.tool.name().to_string(),
                        error_kind: e.kind().to_string(),
                    });
                    failed.insert(index);
                    trace.push(StepResult::failed(index, step.tool, e.user_summary()));
                    if self.recovery.handle(&e) == RecoveryAction::Abort {
                        abort = Some((Some(index), e));
                        break;
                    }
                }
            }
        }

        let abort_error = match abort {
            Some((at_step, e)) => {
                state = OrchestratorState::Aborted;
                self.events.emit(OrchestratorEvent::PlanAborted {
                    at_step,
                    error_kind: e.kind().to_string(),
                });
                Some(e)
            }
            None => {
                state = OrchestratorState::Completed;
                let succeeded = trace.iter().filter(|r| r.is_ok()).count();
                self.events.emit(OrchestratorEvent::PlanCompleted {
                    succeeded,
                    failed: trace.len() - succeeded,
                });
                None
            }
        };
        debug_assert!(state.is_terminal());

        let text = Self::assemble_text(&trace, abort_error.as_ref());
        if !matches!(abort_error, Some(AgentError::Cancelled)) {
            memory.append(Turn::new(query, text.clone()));
        }

        Response {
            text,
            steps_used,
            trace,
            state,
        }
    }

    /// 解析占位符，并按工具注入来自记忆的参数
    fn prepare_args(
        &self,
        step: &Step,
        context: &ExecutionContext,
        memory: &MemoryState,
    ) -> Result<StepArgs, AgentError> {
        let mut args = context.resolve_args(&step.args)?;
        match step.tool {
            ToolKind::Summarizer => {
                if args.get("source").and_then(Value::as_str) == Some("document") {
                    let content = memory.document_text().ok_or_else(|| {
                        AgentError::ToolExecutionFailed(
                            "No document is currently available to summarize.".to_string(),
                        )
                    })?;
                    args.remove("source");
                    args.insert("content".into(), Value::String(content.to_string()));
                }
            }
            ToolKind::DocumentAnswerer => {
                let question = args
                    .get("question")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let handle = memory.rag_handle().ok_or_else(|| {
                    AgentError::ToolExecutionFailed("No document is attached".to_string())
                })?;
                let passages = memory
                    .retrieve(&question, handle, self.retrieve_k)
                    .map_err(|e| AgentError::ToolExecutionFailed(e.to_string()))?;
                args.insert(
                    "passages".into(),
                    Value::Array(passages.into_iter().map(|p| Value::String(p.text)).collect()),
                );
            }
            ToolKind::GeneralReasoner => {
                let question = args
                    .get("question")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let facts: Vec<Value> = memory
                    .search_facts(question, FACT_RECALL_K)
                    .into_iter()
                    .map(|(key, value)| Value::String(format!("{key}: {value}")))
                    .collect();
                if !facts.is_empty() {
                    args.insert("facts".into(), Value::Array(facts));
                }
                let history: Vec<Value> = memory
                    .recall_short_term(self.history_turns)
                    .iter()
                    .flat_map(|t| t.to_lines())
                    .map(Value::String)
                    .collect();
                if !history.is_empty() {
                    args.insert("history".into(), Value::Array(history));
                }
            }
            ToolKind::Calculator | ToolKind::CodeExecutor | ToolKind::WebSearch => {}
        }
        Ok(args)
    }

    /// 成功步骤写入长期记忆
    fn remember(step: &Step, args: &StepArgs, value: &str, memory: &mut MemoryState) {
        let arg = |key: &str| args.get(key).and_then(Value::as_str).unwrap_or_default();
        match step.tool {
            ToolKind::Calculator => {
                let expression = arg("expression");
                // 单个表达式时保存全精度结果，否则取输出中的最后一个数
                let precise = (!expression.contains(';'))
                    .then(|| calculator::evaluate(expression).ok())
                    .flatten()
                    .map(|v| v.to_string());
                if let Some(result) = precise.or_else(|| extract_numbers(value).pop()) {
                    memory.record_fact("last_result", result);
                }
                memory.record_fact(format!("calc:{}", calculator::normalize(expression)), value);
            }
            ToolKind::WebSearch => {
                memory.record_fact(format!("search:{}", arg("query")), truncate(value));
            }
            ToolKind::CodeExecutor => memory.record_fact("code:last_output", truncate(value)),
            ToolKind::Summarizer if step.arg_str("source") == Some("document") => {
                memory.record_fact("summary:document", truncate(value));
            }
            ToolKind::Summarizer | ToolKind::DocumentAnswerer | ToolKind::GeneralReasoner => {}
        }
    }

    /// 拼接最终文本：成功结果按步骤顺序加标题；部分失败附失败列表；全部失败给一条汇总信息
    fn assemble_text(trace: &[StepResult], abort: Option<&AgentError>) -> String {
        let successes: Vec<String> = trace
            .iter()
            .filter_map(|r| r.value.as_ref().map(|v| format!("{}\n{}", r.tool.header(), v.trim())))
            .collect();

        if successes.is_empty() {
            let reason = match (abort, trace) {
                (Some(e), _) => e.user_summary(),
                (None, [only]) => only.error_detail.clone().unwrap_or_default(),
                (None, steps) => format!("all {} steps failed", steps.len()),
            };
            return format!("Sorry, I couldn't complete your request: {reason}.");
        }

        let mut text = successes.join("\n\n");
        let failures: Vec<String> = trace
            .iter()
            .filter(|r| !r.is_ok())
            .map(|r| {
                format!(
                    "• Step {} ({}): {}",
                    r.step_index + 1,
                    r.tool.name(),
                    r.error_detail.as_deref().unwrap_or("failed")
                )
            })
            .collect();
        if !failures.is_empty() {
            text.push_str("\n\nFailed steps:\n");
            text.push_str(&failures.join("\n"));
        }
        if let Some(e) = abort {
            text.push_str(&format!("\n\nStopped early: {}.", e.user_summary()));
        }
        text
    }
}

fn truncate(value: &str) -> String {
    if value.chars().count() > FACT_VALUE_CHARS {
        value.chars().take(FACT_VALUE_CHARS).collect()
    } else {
        value.to_string()
    }
}
