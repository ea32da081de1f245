//! 编排集成测试：脚本化工具驱动完整的 规划 -> 执行 -> 回复 流程

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use intellect::agent::AgentRuntime;
    use intellect::core::{
        AgentError, Orchestrator, OrchestratorEvent, OrchestratorState, RoutingPolicy, StepStatus,
        UPSTREAM_FAILED,
    };
    use intellect::memory::{MemoryOptions, MemoryState};
    use intellect::planner::{Intent, Plan, PlannerOptions, Step, TaskPlanner};
    use intellect::tools::{CalculatorTool, StepArgs, Tool, ToolExecutor, ToolKind, ToolRegistry};

    /// 返回固定结果的工具，记录调用参数、调用次数与并发峰值
    struct ScriptedTool {
        kind: ToolKind,
        reply: Result<String, AgentError>,
        delay: Duration,
        calls: Arc<AtomicUsize>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        seen: Mutex<Vec<StepArgs>>,
    }

    impl ScriptedTool {
        fn new(kind: ToolKind, reply: Result<String, AgentError>) -> Self {
            Self {
                kind,
                reply,
                delay: Duration::ZERO,
                calls: Arc::new(AtomicUsize::new(0)),
                active: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn ok(kind: ToolKind, value: &str) -> Self {
            Self::new(kind, Ok(value.to_string()))
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Tool for ScriptedTool {
        fn kind(&self) -> ToolKind {
            self.kind
        }

        fn description(&self) -> &str {
            "scripted"
        }

        async fn invoke(&self, args: StepArgs) -> Result<String, AgentError> {
            self.seen.lock().unwrap().push(args);
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.reply.clone()
        }
    }

    fn executor_with(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolExecutor> {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register_arc(tool);
        }
        Arc::new(ToolExecutor::new(registry, 5))
    }

    fn orchestrator(executor: Arc<ToolExecutor>) -> Orchestrator {
        let policy = RoutingPolicy::new(executor.available());
        Orchestrator::new(executor, policy)
    }

    fn args(pairs: &[(&str, &str)]) -> StepArgs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn test_search_then_calculate_scenario() {
        let search = Arc::new(ScriptedTool::ok(
            ToolKind::WebSearch,
            "AI news: a new open model was released this week.",
        ));
        let executor = executor_with(vec![search.clone(), Arc::new(CalculatorTool::new())]);
        let policy = RoutingPolicy::new(executor.available());
        let planner = TaskPlanner::new(policy.clone(), PlannerOptions::default());
        let mut memory = MemoryState::default();

        let query = "Search for latest news about AI, then calculate 32+16 + abs(-12) * sqrt(3333)";
        let plan = planner.plan(query, &memory).unwrap();
        assert_eq!(plan.tools(), vec![ToolKind::WebSearch, ToolKind::Calculator]);
        assert!(plan.steps()[1].depends_on.is_empty());

        let response = Orchestrator::new(executor, policy)
            .run("s1", query, plan, &mut memory, CancellationToken::new())
            .await;
        assert_eq!(response.state, OrchestratorState::Completed);
        assert!(response.text.contains("AI news"));
        assert!(response.text.contains("740.78"));
        assert_eq!(
            response.steps_used,
            vec![ToolKind::WebSearch, ToolKind::Calculator]
        );
        assert!(memory.lookup_fact("last_result").unwrap().starts_with("740.78"));
        assert_eq!(memory.turn_count(), 1);
    }

    #[tokio::test]
    async fn test_negative_previous_result_keeps_precedence() {
        let executor = executor_with(vec![Arc::new(CalculatorTool::new())]);
        let policy = RoutingPolicy::new(executor.available());
        let planner = TaskPlanner::new(policy.clone(), PlannerOptions::default());
        let mut memory = MemoryState::default();

        let query = "calculate 2-7, then what is the previous result ^ 2";
        let plan = planner.plan(query, &memory).unwrap();
        let response = Orchestrator::new(executor, policy)
            .run("s1", query, plan, &mut memory, CancellationToken::new())
            .await;

        assert_eq!(response.state, OrchestratorState::Completed);
        assert!(response.text.contains("2-7 = -5"));
        assert!(response.text.contains("(-5)^2 = 25"), "{}", response.text);
        assert_eq!(memory.lookup_fact("last_result").unwrap(), "25");
    }

    #[tokio::test]
    async fn test_recorded_facts_reach_reasoner() {
        let reasoner = Arc::new(ScriptedTool::ok(ToolKind::GeneralReasoner, "It shipped in July."));
        let executor = executor_with(vec![reasoner.clone()]);
        let mut memory = MemoryState::default();
        memory.record_fact("search:rust release", "Rust 1.80 shipped in July");
        memory.record_fact("calc:2+2", "2+2 = 4");

        let plan = Plan::new(vec![Step::new(
            Intent::Qa,
            ToolKind::GeneralReasoner,
            args(&[("question", "What did the search say about rust?")]),
        )])
        .unwrap();
        let response = orchestrator(executor)
            .run("s1", "q", plan, &mut memory, CancellationToken::new())
            .await;

        assert_eq!(response.state, OrchestratorState::Completed);
        let seen = reasoner.seen.lock().unwrap();
        assert_eq!(
            seen[0]["facts"],
            json!(["search:rust release: Rust 1.80 shipped in July"])
        );
    }

    #[tokio::test]
    async fn test_failed_dependency_skips_without_invoking() {
        let search = Arc::new(ScriptedTool::new(
            ToolKind::WebSearch,
            Err(AgentError::ToolExecutionFailed("search API returned 500".into())),
        ));
        let summarizer = Arc::new(ScriptedTool::ok(ToolKind::Summarizer, "summary"));
        let calculator = Arc::new(CalculatorTool::new());
        let executor = executor_with(vec![search.clone(), summarizer.clone(), calculator]);

        let plan = Plan::new(vec![
            Step::new(Intent::WebSearch, ToolKind::WebSearch, args(&[("query", "rust")])),
            Step::new(
                Intent::Summarize,
                ToolKind::Summarizer,
                args(&[("content", "{{step0}}")]),
            )
            .depends_on([0]),
            Step::new(
                Intent::Calculate,
                ToolKind::Calculator,
                args(&[("expression", "2 + 2")]),
            ),
        ])
        .unwrap();

        let mut memory = MemoryState::default();
        let response = orchestrator(executor)
            .run("s1", "q", plan, &mut memory, CancellationToken::new())
            .await;

        assert_eq!(response.state, OrchestratorState::Completed);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 0);
        let skipped = &response.trace[1];
        assert_eq!(skipped.status, StepStatus::Failed);
        assert_eq!(skipped.error_detail.as_deref(), Some(UPSTREAM_FAILED));
        assert!(response.trace[2].is_ok());
        assert_eq!(
            response.steps_used,
            vec![ToolKind::WebSearch, ToolKind::Calculator]
        );
        assert!(response.text.contains("Failed steps:"));
    }

    #[tokio::test]
    async fn test_single_step_timeout_completes() {
        let slow = Arc::new(
            ScriptedTool::ok(ToolKind::GeneralReasoner, "late").with_delay(Duration::from_millis(300)),
        );
        let executor = executor_with(vec![slow]);
        let plan = Plan::new(vec![Step::new(
            Intent::Qa,
            ToolKind::GeneralReasoner,
            args(&[("question", "why is the sky blue?")]),
        )
        .with_timeout(Duration::from_millis(20))])
        .unwrap();

        let mut memory = MemoryState::default();
        let response = orchestrator(executor)
            .run("s1", "q", plan, &mut memory, CancellationToken::new())
            .await;

        assert_eq!(response.state, OrchestratorState::Completed);
        assert_eq!(response.failed_steps(), 1);
        assert_eq!(response.successful_text(), "");
        assert!(response.text.contains("general_reasoner timed out"));
    }

    #[tokio::test]
    async fn test_unavailable_tool_aborts_with_partial_results() {
        let search = Arc::new(ScriptedTool::new(
            ToolKind::WebSearch,
            Err(AgentError::ToolUnavailable("web_search".into())),
        ));
        let executor = executor_with(vec![search, Arc::new(CalculatorTool::new())]);
        let plan = Plan::new(vec![
            Step::new(Intent::Calculate, ToolKind::Calculator, args(&[("expression", "1 + 1")])),
            Step::new(Intent::WebSearch, ToolKind::WebSearch, args(&[("query", "x")])),
            Step::new(Intent::Calculate, ToolKind::Calculator, args(&[("expression", "3 * 3")])),
        ])
        .unwrap();

        let mut memory = MemoryState::default();
        let response = orchestrator(executor)
            .run("s1", "q", plan, &mut memory, CancellationToken::new())
            .await;

        assert_eq!(response.state, OrchestratorState::Aborted);
        assert_eq!(response.trace.len(), 2);
        assert!(response.text.contains("1 + 1 = 2"));
        assert!(!response.text.contains("= 9"));
        assert!(response.text.ends_with("Stopped early: web_search is unavailable."));
    }

    #[tokio::test]
    async fn test_routing_violation_is_fatal() {
        let reasoner = Arc::new(ScriptedTool::ok(ToolKind::GeneralReasoner, "free text"));
        let summarizer = Arc::new(ScriptedTool::ok(ToolKind::Summarizer, "summary"));
        let executor = executor_with(vec![reasoner.clone(), summarizer]);
        // 摘要意图被错误地配给了通用推理工具
        let plan = Plan::new(vec![Step::new(
            Intent::Summarize,
            ToolKind::GeneralReasoner,
            args(&[("content", "some long text to summarize")]),
        )])
        .unwrap();

        let mut memory = MemoryState::default();
        let response = orchestrator(executor)
            .run("s1", "q", plan, &mut memory, CancellationToken::new())
            .await;

        assert_eq!(response.state, OrchestratorState::Aborted);
        assert_eq!(reasoner.calls.load(Ordering::SeqCst), 0);
        assert!(response.text.starts_with("Sorry, I couldn't complete your request"));
    }

    #[tokio::test]
    async fn test_cancel_before_first_step() {
        let calculator = Arc::new(ScriptedTool::ok(ToolKind::Calculator, "1 + 1 = 2"));
        let executor = executor_with(vec![calculator.clone()]);
        let plan = Plan::new(vec![Step::new(
            Intent::Calculate,
            ToolKind::Calculator,
            args(&[("expression", "1 + 1")]),
        )])
        .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let mut memory = MemoryState::default();
        let response = orchestrator(executor)
            .run("s1", "q", plan, &mut memory, token)
            .await;

        assert_eq!(response.state, OrchestratorState::Aborted);
        assert_eq!(calculator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(memory.turn_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_step_discards_result() {
        let slow = Arc::new(
            ScriptedTool::ok(ToolKind::Calculator, "1 + 1 = 2").with_delay(Duration::from_millis(150)),
        );
        let executor = executor_with(vec![slow]);
        let plan = Plan::new(vec![
            Step::new(Intent::Calculate, ToolKind::Calculator, args(&[("expression", "1 + 1")])),
            Step::new(Intent::Calculate, ToolKind::Calculator, args(&[("expression", "2 + 2")])),
        ])
        .unwrap();

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let mut memory = MemoryState::default();
        let response = orchestrator(executor)
            .run("s1", "q", plan, &mut memory, token)
            .await;

        assert_eq!(response.state, OrchestratorState::Aborted);
        assert!(response.trace.is_empty());
        assert!(!response.text.contains("1 + 1 = 2"));
        assert!(memory.lookup_fact("last_result").is_err());
        assert_eq!(memory.turn_count(), 0);
    }

    #[tokio::test]
    async fn test_events_carry_no_payloads() {
        let executor = executor_with(vec![Arc::new(CalculatorTool::new())]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let orchestrator = orchestrator(executor).with_events(tx);
        let plan = Plan::new(vec![Step::new(
            Intent::Calculate,
            ToolKind::Calculator,
            args(&[("expression", "7 * 6")]),
        )])
        .unwrap();

        let mut memory = MemoryState::default();
        orchestrator
            .run("s1", "secret query", plan, &mut memory, CancellationToken::new())
            .await;
        drop(orchestrator);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(OrchestratorEvent::PlanCreated { steps: 1, .. })));
        assert!(matches!(
            events.last(),
            Some(OrchestratorEvent::PlanCompleted { succeeded: 1, failed: 0 })
        ));
        for event in &events {
            let json = serde_json::to_string(event).unwrap();
            assert!(!json.contains("secret query"));
            assert!(!json.contains("42"));
        }
    }

    fn slow_reasoner_runtime(tool: Arc<ScriptedTool>) -> Arc<AgentRuntime> {
        let executor = executor_with(vec![tool]);
        let policy = RoutingPolicy::new(executor.available());
        Arc::new(AgentRuntime::with_components(
            TaskPlanner::new(policy.clone(), PlannerOptions::default()),
            Orchestrator::new(executor, policy),
            MemoryOptions::default(),
        ))
    }

    #[tokio::test]
    async fn test_same_session_runs_serially() {
        let tool = Arc::new(
            ScriptedTool::ok(ToolKind::GeneralReasoner, "answer").with_delay(Duration::from_millis(50)),
        );
        let runtime = slow_reasoner_runtime(tool.clone());

        let (a, b) = tokio::join!(
            runtime.handle("same", "what is rust?"),
            runtime.handle("same", "why is it fast?")
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(tool.peak.load(Ordering::SeqCst), 1);

        let session = runtime.sessions().get("same").await.unwrap();
        assert_eq!(session.memory.lock().await.turn_count(), 2);
    }

    #[tokio::test]
    async fn test_distinct_sessions_run_concurrently() {
        let tool = Arc::new(
            ScriptedTool::ok(ToolKind::GeneralReasoner, "answer").with_delay(Duration::from_millis(100)),
        );
        let runtime = slow_reasoner_runtime(tool.clone());

        let (a, b) = tokio::join!(
            runtime.handle("alice", "what is rust?"),
            runtime.handle("bob", "what is go?")
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(tool.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_runtime_cancel_aborts_run() {
        let tool = Arc::new(
            ScriptedTool::ok(ToolKind::GeneralReasoner, "answer").with_delay(Duration::from_millis(150)),
        );
        let runtime = slow_reasoner_runtime(tool);

        let handle = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.handle("s1", "what is rust?").await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        runtime.cancel("s1").await;

        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.state, OrchestratorState::Aborted);
        let session = runtime.sessions().get("s1").await.unwrap();
        assert_eq!(session.memory.lock().await.turn_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancel_right_after_submit_is_not_lost() {
        let tool = Arc::new(
            ScriptedTool::ok(ToolKind::GeneralReasoner, "answer").with_delay(Duration::from_millis(100)),
        );
        let runtime = slow_reasoner_runtime(tool);

        for round in 0..20 {
            let session_id = format!("s{round}");
            let handle = {
                let runtime = runtime.clone();
                let session_id = session_id.clone();
                tokio::spawn(async move { runtime.handle(&session_id, "what is rust?").await })
            };
            runtime.cancel(&session_id).await;

            let response = handle.await.unwrap().unwrap();
            assert_eq!(response.state, OrchestratorState::Aborted, "round {round}");
        }
    }
}
