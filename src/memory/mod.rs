//! 记忆层：短期（对话轮次）、长期（事实缓存）、文档检索索引、文档摄取

pub mod conversation;
pub mod document;
pub mod long_term;
pub mod rag;
pub mod state;
pub mod tokenizer;

pub use conversation::{ConversationMemory, Message, Role, Turn};
pub use document::{load_document, DocumentParser, PlainTextParser};
pub use long_term::{Fact, FactStore};
pub use rag::{Chunker, ChunkingConfig, Passage, RagHandle, RagIndex};
pub use state::{MemoryError, MemoryOptions, MemoryState};
