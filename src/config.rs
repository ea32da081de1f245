//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `INTELLECT__*` 覆盖（双下划线表示嵌套，如 `INTELLECT__LLM__MODEL=...`）。
//! API Key 不写入配置文件，只记录环境变量名，启动时由 Secrets::from_env 解析；缺失即为配置错误。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;
use crate::memory::{ChunkingConfig, MemoryOptions};
use crate::planner::{AmbiguousDocumentIntent, PlannerOptions};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub planner: PlannerSection,
    pub memory: MemorySection,
}

/// [app] 段：应用名、短期记忆轮数
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 对话历史保留轮数（短期记忆容量）
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
    /// 传给通用推理工具的最近轮数
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_context_turns: default_max_context_turns(),
            history_turns: default_history_turns(),
        }
    }
}

fn default_max_context_turns() -> usize {
    20
}

fn default_history_turns() -> usize {
    5
}

/// [llm] 段：推理 / 摘要 / 文档问答共用的 OpenAI 兼容端点
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// groq / openai 走 OpenAI 兼容接口；mock 为离线回显（不需要 Key）
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: Option<String>,
    /// 存放 API Key 的环境变量名
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_llm_key_env(),
            temperature: default_temperature(),
            system_prompt: default_system_prompt(),
        }
    }
}

fn default_provider() -> String {
    "groq".to_string()
}

fn default_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_base_url() -> Option<String> {
    Some("https://api.groq.com/openai/v1".to_string())
}

fn default_llm_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_system_prompt() -> String {
    "You are a helpful, concise assistant. Answer the user's question directly.".to_string()
}

impl LlmSection {
    pub fn is_mock(&self) -> bool {
        self.provider.eq_ignore_ascii_case("mock")
    }
}

/// [tools] 段：默认单步超时、搜索与代码执行
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub search: SearchSection,
    #[serde(default)]
    pub code: CodeSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            search: SearchSection::default(),
            code: CodeSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// [tools.search] 段
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            api_key_env: default_search_key_env(),
            max_results: default_max_results(),
            timeout_secs: default_search_timeout_secs(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://api.tavily.com/search".to_string()
}

fn default_search_key_env() -> String {
    "TAVILY_API_KEY".to_string()
}

fn default_max_results() -> usize {
    5
}

fn default_search_timeout_secs() -> u64 {
    15
}

/// [tools.code] 段：解释器与唯一支持的语言
#[derive(Debug, Clone, Deserialize)]
pub struct CodeSection {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_code_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

impl Default for CodeSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            language: default_language(),
            timeout_secs: default_code_timeout_secs(),
            max_output_chars: default_max_output_chars(),
        }
    }
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_language() -> String {
    "python".to_string()
}

fn default_code_timeout_secs() -> u64 {
    10
}

fn default_max_output_chars() -> usize {
    8000
}

/// [planner] 段
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerSection {
    /// 无法识别意图的子句是否按问答处理
    #[serde(default = "default_fallback_to_qa")]
    pub fallback_to_qa: bool,
    /// "tell me about this document" 这类既像问答又像摘要的请求如何处理
    #[serde(default)]
    pub ambiguous_document_intent: AmbiguousDocumentIntent,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            fallback_to_qa: default_fallback_to_qa(),
            ambiguous_document_intent: AmbiguousDocumentIntent::default(),
        }
    }
}

fn default_fallback_to_qa() -> bool {
    true
}

impl PlannerSection {
    pub fn options(&self) -> PlannerOptions {
        PlannerOptions {
            fallback_to_qa: self.fallback_to_qa,
            ambiguous_document_intent: self.ambiguous_document_intent,
            step_timeout: None,
        }
    }
}

/// [memory] 段：检索与容量
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    #[serde(default = "default_retrieve_k")]
    pub retrieve_k: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_max_facts")]
    pub max_facts: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            retrieve_k: default_retrieve_k(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_facts: default_max_facts(),
        }
    }
}

fn default_retrieve_k() -> usize {
    5
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_max_facts() -> usize {
    1000
}

impl AppConfig {
    /// 每个会话的记忆容量参数
    pub fn memory_options(&self) -> MemoryOptions {
        MemoryOptions {
            max_turns: self.app.max_context_turns,
            max_facts: self.memory.max_facts,
            chunking: ChunkingConfig::new(self.memory.chunk_size, self.memory.chunk_overlap),
        }
    }
}

/// 从 config 目录加载配置，环境变量 INTELLECT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path，则追加该文件（可覆盖前面的键）；文件缺失或格式错误时返回错误
/// 3. 最后叠加环境变量 INTELLECT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    // 显式给出的路径必须存在且可解析
    if let Some(path) = config_path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("INTELLECT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 启动时解析的外部凭据
#[derive(Clone)]
pub struct Secrets {
    /// mock provider 时为 None
    pub llm_api_key: Option<String>,
    pub search_api_key: String,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "***"))
            .field("search_api_key", &"***")
            .finish()
    }
}

impl Secrets {
    /// 从进程环境读取
    pub fn from_env(cfg: &AppConfig) -> Result<Self, AgentError> {
        Self::resolve(cfg, |name| std::env::var(name).ok())
    }

    /// 用给定的查找函数解析（便于测试）
    pub fn resolve(
        cfg: &AppConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AgentError> {
        let require = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    AgentError::ConfigError(format!("environment variable {name} is not set"))
                })
        };
        let llm_api_key = if cfg.llm.is_mock() {
            None
        } else {
            Some(require(&cfg.llm.api_key_env)?)
        };
        let search_api_key = require(&cfg.tools.search.api_key_env)?;
        Ok(Self {
            llm_api_key,
            search_api_key,
        })
    }
}
