//! Agent 运行时
//!
//! 从配置构建 LLM、六个工具、路由策略、Planner 与 Orchestrator，并按会话管理记忆：
//! 同一会话的请求串行执行（记忆单写者），不同会话可并发。
//! spawn_command_loop 提供命令通道（Submit/Attach/Detach/Graph/Cancel/Clear/Quit），供 REPL 等前端使用。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::{AppConfig, Secrets};
use crate::core::{AgentError, Orchestrator, Response, RoutingPolicy, SessionSupervisor};
use crate::graph::{write_artifacts, Topology};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::memory::{
    load_document, DocumentParser, MemoryError, MemoryOptions, MemoryState, PlainTextParser,
    RagHandle,
};
use crate::planner::TaskPlanner;
use crate::tools::{
    CalculatorTool, CodeExecutorTool, DocumentAnswererTool, GeneralReasonerTool, SummarizerTool,
    ToolExecutor, ToolRegistry, WebSearchTool,
};

/// 单个会话：记忆 + 取消监管
pub struct Session {
    pub memory: Mutex<MemoryState>,
    pub supervisor: SessionSupervisor,
}

/// 会话表；会话结束时移除，其文档索引随之丢弃
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, session_id: &str, options: &MemoryOptions) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(session_id) {
            return session.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::info!(session_id, "session created");
                Arc::new(Session {
                    memory: Mutex::new(MemoryState::new(options.clone())),
                    supervisor: SessionSupervisor::new(),
                })
            })
            .clone()
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// 根据配置选择 LLM 后端（OpenAI 兼容 / Mock）
fn create_llm(cfg: &AppConfig, secrets: &Secrets) -> Result<Arc<dyn LlmClient>, AgentError> {
    if cfg.llm.is_mock() {
        tracing::warn!("Using Mock LLM");
        return Ok(Arc::new(MockLlmClient::new()));
    }
    let key = secrets.llm_api_key.as_deref().ok_or_else(|| {
        AgentError::ConfigError(format!(
            "environment variable {} is not set",
            cfg.llm.api_key_env
        ))
    })?;
    tracing::info!(provider = %cfg.llm.provider, model = %cfg.llm.model, "Using OpenAI-compatible LLM");
    Ok(Arc::new(OpenAiClient::new(
        cfg.llm.base_url.as_deref(),
        &cfg.llm.model,
        key,
        cfg.llm.temperature,
    )))
}

/// 注册全部工具
pub fn build_registry(cfg: &AppConfig, secrets: &Secrets, llm: Arc<dyn LlmClient>) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    tools.register(WebSearchTool::new(
        cfg.tools.search.endpoint.clone(),
        secrets.search_api_key.clone(),
        cfg.tools.search.max_results,
        cfg.tools.search.timeout_secs,
    ));
    tools.register(CalculatorTool::new());
    tools.register(CodeExecutorTool::new(
        cfg.tools.code.interpreter.clone(),
        cfg.tools.code.language.clone(),
        cfg.tools.code.timeout_secs,
        cfg.tools.code.max_output_chars,
    ));
    tools.register(SummarizerTool::new(llm.clone()));
    tools.register(DocumentAnswererTool::new(llm.clone()));
    tools.register(GeneralReasonerTool::new(llm, cfg.llm.system_prompt.clone()));
    tools
}

pub struct AgentRuntime {
    planner: TaskPlanner,
    orchestrator: Orchestrator,
    sessions: SessionStore,
    memory_options: MemoryOptions,
    parser: Arc<dyn DocumentParser>,
    llm: Option<Arc<dyn LlmClient>>,
}

impl AgentRuntime {
    /// 从配置与启动时解析好的凭据构建
    pub fn from_config(cfg: &AppConfig, secrets: Secrets) -> Result<Self, AgentError> {
        let llm = create_llm(cfg, &secrets)?;
        let registry = build_registry(cfg, &secrets, llm.clone());
        for (name, description) in registry.tool_descriptions() {
            tracing::debug!(tool = %name, %description, "tool registered");
        }
        let executor = Arc::new(ToolExecutor::new(registry, cfg.tools.tool_timeout_secs));
        let policy = RoutingPolicy::new(executor.available());
        let planner = TaskPlanner::new(policy.clone(), cfg.planner.options());
        let orchestrator = Orchestrator::new(executor, policy)
            .with_retrieve_k(cfg.memory.retrieve_k)
            .with_history_turns(cfg.app.history_turns);
        Ok(Self::with_components(planner, orchestrator, cfg.memory_options()).with_llm(llm))
    }

    /// 用现成组件构建（测试可注入自定义工具）
    pub fn with_components(
        planner: TaskPlanner,
        orchestrator: Orchestrator,
        memory_options: MemoryOptions,
    ) -> Self {
        Self {
            planner,
            orchestrator,
            sessions: SessionStore::new(),
            memory_options,
            parser: Arc::new(PlainTextParser),
            llm: None,
        }
    }

    /// 记录模型客户端，用于汇报 token 用量
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 累计 token 用量 (prompt, completion, total)；未接入模型时为 0
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.as_ref().map_or((0, 0, 0), |llm| llm.token_usage())
    }

    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// 处理一条请求：规划失败返回 Err，否则总是返回 Response（可能部分成功或已中止）
    pub async fn handle(&self, session_id: &str, query: &str) -> Result<Response, AgentError> {
        let session = self
            .sessions
            .get_or_create(session_id, &self.memory_options)
            .await;
        // 同一会话的上一次运行结束前在此等待
        let mut memory = session.memory.lock().await;
        let cancel = session.supervisor.begin_run().await;

        let result = match self.planner.plan(query, &memory) {
            Ok(plan) => Ok(self
                .orchestrator
                .run(session_id, query, plan, &mut memory, cancel)
                .await),
            Err(e) => {
                tracing::warn!(session_id, error_kind = e.kind(), "planning failed");
                Err(e)
            }
        };
        session.supervisor.end_run().await;

        let (prompt_tokens, completion_tokens, total_tokens) = self.token_usage();
        if total_tokens > 0 {
            tracing::info!(session_id, prompt_tokens, completion_tokens, total_tokens, "token usage");
        }
        result
    }

    /// 挂载文档内容（替换会话中已有的文档）
    pub async fn attach_document(
        &self,
        session_id: &str,
        content: &str,
    ) -> Result<RagHandle, MemoryError> {
        let session = self
            .sessions
            .get_or_create(session_id, &self.memory_options)
            .await;
        let mut memory = session.memory.lock().await;
        memory.attach_document(content)
    }

    /// 读取文件并挂载
    pub async fn attach_file(
        &self,
        session_id: &str,
        path: impl AsRef<Path>,
    ) -> Result<RagHandle, MemoryError> {
        let content = load_document(path, self.parser.as_ref()).await?;
        self.attach_document(session_id, &content).await
    }

    /// 卸下会话中的文档；返回之前是否挂载了文档
    pub async fn detach_document(&self, session_id: &str) -> bool {
        match self.sessions.get(session_id).await {
            Some(session) => {
                let mut memory = session.memory.lock().await;
                let had_document = memory.has_document();
                memory.detach_document();
                had_document
            }
            None => false,
        }
    }

    /// 取消会话当前的运行（在下一个步骤边界生效）。
    /// 请求已提交但尚未开始时，取消作用于它开始后的第一个步骤边界。
    pub async fn cancel(&self, session_id: &str) {
        let session = self
            .sessions
            .get_or_create(session_id, &self.memory_options)
            .await;
        session.supervisor.cancel().await;
        tracing::info!(session_id, "cancel requested");
    }

    /// 清空对话历史；长期事实与文档保留
    pub async fn clear(&self, session_id: &str) {
        if let Some(session) = self.sessions.get(session_id).await {
            session.memory.lock().await.clear_conversation();
        }
    }

    /// 结束会话：取消进行中的运行并丢弃其记忆
    pub async fn end_session(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id).await {
            Some(session) => {
                session.supervisor.shutdown();
                tracing::info!(session_id, "session ended");
                true
            }
            None => false,
        }
    }
}

/// 前端发往运行时的命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 提交一条请求
    Submit(String),
    /// 挂载文档文件
    Attach(PathBuf),
    /// 卸下当前文档
    Detach,
    /// 把拓扑图写入目录
    Graph(PathBuf),
    Cancel,
    Clear,
    Quit,
}

/// 运行时发回前端的输出
#[derive(Debug)]
pub enum AgentOutput {
    Reply(Response),
    Failed(String),
    Notice(String),
}

/// 启动命令循环。Submit / Attach 在独立任务中执行，所以运行中的请求可以被 Cancel；
/// 同一会话的请求仍由会话记忆锁串行化。
pub fn spawn_command_loop(
    runtime: Arc<AgentRuntime>,
    session_id: String,
) -> (
    mpsc::UnboundedSender<Command>,
    mpsc::UnboundedReceiver<AgentOutput>,
    JoinHandle<()>,
) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (out_tx, out_rx) = mpsc::unbounded_channel::<AgentOutput>();
    // 已提交、尚未回复的请求数；没有请求时 Cancel 不会留到下一次请求
    let in_flight = Arc::new(AtomicUsize::new(0));

    let handle = tokio::spawn(async move {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Command::Submit(query) => {
                    let runtime = runtime.clone();
                    let session_id = session_id.clone();
                    let out_tx = out_tx.clone();
                    let in_flight = in_flight.clone();
                    in_flight.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        let output = match runtime.handle(&session_id, &query).await {
                            Ok(response) => AgentOutput::Reply(response),
                            Err(e) => AgentOutput::Failed(e.user_summary()),
                        };
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        let _ = out_tx.send(output);
                    });
                }
                Command::Attach(path) => {
                    let runtime = runtime.clone();
                    let session_id = session_id.clone();
                    let out_tx = out_tx.clone();
                    tokio::spawn(async move {
                        let output = match runtime.attach_file(&session_id, &path).await {
                            Ok(_) => AgentOutput::Notice(format!("attached {}", path.display())),
                            Err(e) => AgentOutput::Failed(e.to_string()),
                        };
                        let _ = out_tx.send(output);
                    });
                }
                Command::Graph(dir) => {
                    let report = write_artifacts(&Topology::orchestrator(), &dir);
                    let mut lines = Vec::new();
                    match report.diagram {
                        Ok(path) => lines.push(format!("wrote {}", path.display())),
                        Err(e) => lines.push(format!("diagram not written: {e}")),
                    }
                    match report.raster {
                        Ok(path) => lines.push(format!("wrote {}", path.display())),
                        Err(e) => lines.push(format!("raster not written: {e}")),
                    }
                    let _ = out_tx.send(AgentOutput::Notice(lines.join("\n")));
                }
                Command::Detach => {
                    let notice = if runtime.detach_document(&session_id).await {
                        "document detached"
                    } else {
                        "no document attached"
                    };
                    let _ = out_tx.send(AgentOutput::Notice(notice.to_string()));
                }
                Command::Cancel => {
                    if in_flight.load(Ordering::SeqCst) > 0 {
                        runtime.cancel(&session_id).await;
                    } else {
                        let _ = out_tx.send(AgentOutput::Notice("nothing to cancel".to_string()));
                    }
                }
                Command::Clear => {
                    runtime.clear(&session_id).await;
                    let _ = out_tx.send(AgentOutput::Notice("conversation cleared".to_string()));
                }
                Command::Quit => break,
            }
        }
        let (prompt_tokens, completion_tokens, total_tokens) = runtime.token_usage();
        tracing::info!(prompt_tokens, completion_tokens, total_tokens, "session token usage");
        runtime.end_session(&session_id).await;
    });

    (cmd_tx, out_rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OrchestratorState;
    use crate::planner::PlannerOptions;

    fn mock_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        cfg
    }

    fn secrets() -> Secrets {
        Secrets {
            llm_api_key: None,
            search_api_key: "test-key".to_string(),
        }
    }

    #[test]
    fn test_missing_llm_key_is_config_error() {
        let cfg = AppConfig::default();
        let result = AgentRuntime::from_config(&cfg, secrets());
        assert!(matches!(result, Err(AgentError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_handle_calculation() {
        let runtime = AgentRuntime::from_config(&mock_config(), secrets()).unwrap();
        let response = runtime.handle("s1", "calculate 2 + 3").await.unwrap();
        assert_eq!(response.state, OrchestratorState::Completed);
        assert!(response.text.contains("= 5"));
        assert_eq!(runtime.sessions().len().await, 1);
    }

    #[tokio::test]
    async fn test_summarize_without_document_is_planning_error() {
        let runtime = AgentRuntime::from_config(&mock_config(), secrets()).unwrap();
        let err = runtime.handle("s1", "Summarize this document").await.unwrap_err();
        assert!(matches!(err, AgentError::Planning(_)));
    }

    #[tokio::test]
    async fn test_end_session_discards_document() {
        let runtime = AgentRuntime::from_config(&mock_config(), secrets()).unwrap();
        runtime
            .attach_document("s1", "Rust has ownership and borrowing.")
            .await
            .unwrap();
        assert!(runtime.end_session("s1").await);
        let session = runtime
            .sessions()
            .get_or_create("s1", &MemoryOptions::default())
            .await;
        assert!(!session.memory.lock().await.has_document());
    }

    #[tokio::test]
    async fn test_command_loop_replies() {
        let executor = Arc::new(ToolExecutor::new(
            {
                let mut r = ToolRegistry::new();
                r.register(CalculatorTool::new());
                r
            },
            5,
        ));
        let policy = RoutingPolicy::new(executor.available());
        let runtime = Arc::new(AgentRuntime::with_components(
            TaskPlanner::new(policy.clone(), PlannerOptions::default()),
            Orchestrator::new(executor, policy),
            MemoryOptions::default(),
        ));
        let (cmd_tx, mut out_rx, handle) = spawn_command_loop(runtime, "repl".to_string());
        cmd_tx.send(Command::Submit("calculate 6 * 7".to_string())).unwrap();
        match out_rx.recv().await {
            Some(AgentOutput::Reply(response)) => assert!(response.text.contains("42")),
            other => panic!("unexpected output: {other:?}"),
        }
        cmd_tx.send(Command::Quit).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_detach_document() {
        let runtime = AgentRuntime::from_config(&mock_config(), secrets()).unwrap();
        assert!(!runtime.detach_document("s1").await);
        runtime
            .attach_document("s1", "Rust has ownership and borrowing.")
            .await
            .unwrap();
        assert!(runtime.detach_document("s1").await);
        let err = runtime.handle("s1", "Summarize this document").await.unwrap_err();
        assert!(matches!(err, AgentError::Planning(_)));
    }

    /// 固定汇报 token 用量的模型客户端
    struct MeteredLlm;

    #[async_trait::async_trait]
    impl LlmClient for MeteredLlm {
        async fn complete(&self, _messages: &[crate::memory::Message]) -> Result<String, String> {
            Ok("ok".to_string())
        }

        fn token_usage(&self) -> (u64, u64, u64) {
            (12, 3, 15)
        }
    }

    #[tokio::test]
    async fn test_token_usage_from_llm() {
        let executor = Arc::new(ToolExecutor::new(ToolRegistry::new(), 5));
        let policy = RoutingPolicy::new(executor.available());
        let runtime = AgentRuntime::with_components(
            TaskPlanner::new(policy.clone(), PlannerOptions::default()),
            Orchestrator::new(executor, policy),
            MemoryOptions::default(),
        );
        assert_eq!(runtime.token_usage(), (0, 0, 0));
        let runtime = runtime.with_llm(Arc::new(MeteredLlm));
        assert_eq!(runtime.token_usage(), (12, 3, 15));
    }

    #[tokio::test]
    async fn test_idle_cancel_does_not_leak_into_next_request() {
        let runtime = Arc::new(AgentRuntime::from_config(&mock_config(), secrets()).unwrap());
        let (cmd_tx, mut out_rx, handle) = spawn_command_loop(runtime, "repl".to_string());

        cmd_tx.send(Command::Cancel).unwrap();
        match out_rx.recv().await {
            Some(AgentOutput::Notice(msg)) => assert_eq!(msg, "nothing to cancel"),
            other => panic!("unexpected output: {other:?}"),
        }
        cmd_tx.send(Command::Submit("calculate 6 * 7".to_string())).unwrap();
        match out_rx.recv().await {
            Some(AgentOutput::Reply(response)) => {
                assert_eq!(response.state, OrchestratorState::Completed)
            }
            other => panic!("unexpected output: {other:?}"),
        }
        cmd_tx.send(Command::Quit).unwrap();
        handle.await.unwrap();
    }
}
