//! 长期记忆：会话内的事实 / 结果缓存
//!
//! key -> value 映射，随成功的步骤结果更新（last_result、calc:<expr>、search:<query> ...）；
//! 超过 max_facts 时淘汰最久未更新的条目。支持按关键词检索（词重叠）。

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::memory::tokenizer;

/// 单条事实
#[derive(Debug, Clone)]
pub struct Fact {
    pub value: String,
    pub updated_at: DateTime<Utc>,
    seq: u64,
}

/// 事实存储
#[derive(Debug, Clone)]
pub struct FactStore {
    facts: HashMap<String, Fact>,
    max_facts: usize,
    next_seq: u64,
}

impl FactStore {
    pub fn new(max_facts: usize) -> Self {
        Self {
            facts: HashMap::new(),
            max_facts: max_facts.max(1),
            next_seq: 0,
        }
    }

    /// 写入或覆盖一条事实
    pub fn record(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.facts.insert(
            key,
            Fact {
                value: value.into(),
                updated_at: Utc::now(),
                seq,
            },
        );
        if self.facts.len() > self.max_facts {
            if let Some(oldest) = self
                .facts
                .iter()
                .min_by_key(|(_, f)| f.seq)
                .map(|(k, _)| k.clone())
            {
                self.facts.remove(&oldest);
            }
        }
    }

    pub fn lookup(&self, key: &str) -> Option<&Fact> {
        self.facts.get(key)
    }

    /// 按关键词重叠检索最相关的 k 条 (key, value)；同分按写入顺序
    pub fn search(&self, query: &str, k: usize) -> Vec<(String, String)> {
        let query_tokens = tokenizer::tokenize_to_set(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, u64, &String, &Fact)> = self
            .facts
            .iter()
            .map(|(key, fact)| {
                let doc = tokenizer::tokenize_to_set(&format!("{} {}", key, fact.value));
                (tokenizer::overlap_score(&query_tokens, &doc), fact.seq, key, fact)
            })
            .filter(|(s, ..)| *s > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(k)
            .map(|(_, _, key, fact)| (key.clone(), fact.value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn clear(&mut self) {
        self.facts.clear();
    }
}

impl Default for FactStore {
    fn default() -> Self {
        Self::new(1000)
    }
}
