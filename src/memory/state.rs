//! 会话记忆状态：短期对话 + 长期事实 + 当前文档的检索索引
//!
//! 由会话拥有，显式传入 Planner（只读）与 Orchestrator（唯一写者）。

use thiserror::Error;

use crate::memory::conversation::{ConversationMemory, Turn};
use crate::memory::long_term::FactStore;
use crate::memory::rag::{Chunker, ChunkingConfig, Passage, RagHandle, RagIndex};

/// 记忆层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MemoryError {
    #[error("Fact not found: {0}")]
    FactNotFound(String),

    #[error("No document attached")]
    NoDocument,

    /// 句柄属于已被替换的旧索引
    #[error("Stale retrieval index handle: {0}")]
    StaleIndex(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// MemoryState 的容量参数
#[derive(Debug, Clone)]
pub struct MemoryOptions {
    pub max_turns: usize,
    pub max_facts: usize,
    pub chunking: ChunkingConfig,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_facts: 1000,
            chunking: ChunkingConfig::default(),
        }
    }
}

/// 单个会话的记忆
#[derive(Debug, Clone)]
pub struct MemoryState {
    short_term: ConversationMemory,
    long_term: FactStore,
    rag: Option<RagIndex>,
    chunker: Chunker,
}

impl MemoryState {
    pub fn new(options: MemoryOptions) -> Self {
        Self {
            short_term: ConversationMemory::new(options.max_turns),
            long_term: FactStore::new(options.max_facts),
            rag: None,
            chunker: Chunker::new(options.chunking),
        }
    }

    /// 追加一轮对话，超出容量时淘汰最旧的
    pub fn append(&mut self, turn: Turn) {
        self.short_term.push(turn);
    }

    /// 最近 limit 轮，从旧到新
    pub fn recall_short_term(&self, limit: usize) -> Vec<Turn> {
        self.short_term.recent(limit)
    }

    pub fn record_fact(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.long_term.record(key, value);
    }

    pub fn lookup_fact(&self, key: &str) -> Result<String, MemoryError> {
        self.long_term
            .lookup(key)
            .map(|f| f.value.clone())
            .ok_or_else(|| MemoryError::FactNotFound(key.to_string()))
    }

    pub fn search_facts(&self, query: &str, k: usize) -> Vec<(String, String)> {
        self.long_term.search(query, k)
    }

    /// 附加文档并重建检索索引（替换之前的文档）
    pub fn attach_document(&mut self, content: &str) -> Result<RagHandle, MemoryError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(MemoryError::NoDocument);
        }
        let index = RagIndex::build(content, &self.chunker);
        let handle = index.handle();
        tracing::info!(chunks = index.len(), handle = %handle, "document attached");
        self.rag = Some(index);
        Ok(handle)
    }

    pub fn detach_document(&mut self) {
        self.rag = None;
    }

    /// 当前检索索引句柄
    pub fn rag_handle(&self) -> Option<RagHandle> {
        self.rag.as_ref().map(RagIndex::handle)
    }

    pub fn has_document(&self) -> bool {
        self.rag.is_some()
    }

    pub fn document_text(&self) -> Option<&str> {
        self.rag.as_ref().map(RagIndex::content)
    }

    /// 检索至多 k 个片段，按分数降序、同分按原文顺序
    pub fn retrieve(
        &self,
        query: &str,
        handle: RagHandle,
        k: usize,
    ) -> Result<Vec<Passage>, MemoryError> {
        let index = self.rag.as_ref().ok_or(MemoryError::NoDocument)?;
        if index.handle() != handle {
            return Err(MemoryError::StaleIndex(handle.to_string()));
        }
        Ok(index.search(query, k))
    }

    /// 清空对话历史；事实与当前文档在会话结束前一直保留
    pub fn clear_conversation(&mut self) {
        self.short_term.clear();
    }

    pub fn turn_count(&self) -> usize {
        self.short_term.len()
    }
}

impl Default for MemoryState {
    fn default() -> Self {
        Self::new(MemoryOptions::default())
    }
}
