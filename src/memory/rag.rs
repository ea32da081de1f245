//! 文档检索索引
//!
//! 提供文档分块与按相似度检索。每个会话只有一个活跃文档，附加新文档即替换旧索引；
//! 检索结果按分数降序、同分按原文顺序（稳定排序），相同输入总是得到相同输出。

use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

use crate::memory::tokenizer;

/// 文档块
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 在文档中的序号
    pub index: usize,
    pub text: String,
    /// 在原文档中的位置（字节偏移）
    pub offset: usize,
    tokens: HashSet<String>,
}

/// 分块策略
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// 目标块大小（字符数）
    pub chunk_size: usize,
    /// 块之间的重叠（字符数）
    pub chunk_overlap: usize,
    /// 分隔符优先级（从高到低）
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ". ".to_string(),
                "! ".to_string(),
                "? ".to_string(),
                " ".to_string(),
            ],
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            ..Self::default()
        }
    }
}

/// 文档分块器
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// 将文档分割为块（UTF-8 安全）
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        if total_chars == 0 {
            return chunks;
        }

        let mut current_idx = 0;
        while current_idx < total_chars {
            let target_end = (current_idx + self.config.chunk_size).min(total_chars);
            let mut actual_end = target_end;

            // 不在文末时尽量在分隔符处断开
            if target_end < total_chars {
                let slice: String = chars[current_idx..target_end].iter().collect();
                for sep in &self.config.separators {
                    if let Some(pos) = slice.rfind(sep.as_str()) {
                        let chars_to_sep = slice[..pos].chars().count() + sep.chars().count();
                        if chars_to_sep > self.config.chunk_overlap {
                            actual_end = current_idx + chars_to_sep;
                            break;
                        }
                    }
                }
            }
            if actual_end <= current_idx {
                actual_end = (current_idx + 1).min(total_chars);
            }

            let chunk_text: String = chars[current_idx..actual_end].iter().collect();
            let trimmed = chunk_text.trim();
            if !trimmed.is_empty() {
                let offset = chars[..current_idx].iter().map(|c| c.len_utf8()).sum();
                chunks.push(Chunk {
                    index: chunks.len(),
                    text: trimmed.to_string(),
                    offset,
                    tokens: tokenizer::tokenize_to_set(trimmed),
                });
            }

            if actual_end >= total_chars {
                break;
            }
            let overlap = self.config.chunk_overlap.min(actual_end - current_idx);
            let next_start = actual_end.saturating_sub(overlap);
            current_idx = if next_start > current_idx {
                next_start
            } else {
                actual_end
            };
        }
        chunks
    }
}

/// 检索索引句柄：标识某次 attach 构建的索引
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RagHandle(Uuid);

impl RagHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for RagHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 检索结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    /// 块在文档中的序号
    pub index: usize,
    pub text: String,
    pub score: f32,
}

/// 单个文档的检索索引
#[derive(Debug, Clone)]
pub struct RagIndex {
    handle: RagHandle,
    content: String,
    chunks: Vec<Chunk>,
}

impl RagIndex {
    pub fn build(content: &str, chunker: &Chunker) -> Self {
        Self {
            handle: RagHandle::new(),
            content: content.to_string(),
            chunks: chunker.chunk(content),
        }
    }

    pub fn handle(&self) -> RagHandle {
        self.handle
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 相似度：查询词在块中的覆盖率
    fn score(query_tokens: &HashSet<String>, chunk: &Chunk) -> f32 {
        if query_tokens.is_empty() {
            return 0.0;
        }
        tokenizer::overlap_score(query_tokens, &chunk.tokens) as f32 / query_tokens.len() as f32
    }

    /// 检索最相关的至多 k 个块
    pub fn search(&self, query: &str, k: usize) -> Vec<Passage> {
        let query_tokens = tokenizer::tokenize_to_set(query);
        let mut scored: Vec<Passage> = self
            .chunks
            .iter()
            .map(|chunk| Passage {
                index: chunk.index,
                text: chunk.text.clone(),
                score: Self::score(&query_tokens, chunk),
            })
            .filter(|p| p.score > 0.0)
            .collect();
        // sort_by 为稳定排序，同分保持原文顺序
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}
