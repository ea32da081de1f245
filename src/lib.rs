//! Intellect - 多工具智能体编排
//!
//! 模块划分：
//! - **agent**: 运行时与会话表（同会话串行、跨会话并发），命令循环
//! - **config**: 应用配置加载（TOML + 环境变量）与启动凭据
//! - **core**: 错误分类、恢复策略、路由策略、执行上下文、编排状态机、结构化事件
//! - **graph**: 编排拓扑的 Mermaid / PNG 导出
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 短期对话、长期事实、文档检索索引
//! - **observability**: 日志初始化
//! - **planner**: 子句切分、意图识别、Plan 构建
//! - **tools**: 工具箱（搜索、计算、代码执行、摘要、文档问答、通用推理）与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod planner;
pub mod tools;

pub use agent::{AgentOutput, AgentRuntime, Command};
