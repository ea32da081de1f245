//! 分词模块
//!
//! 用于检索评分与事实查找：小写化、按非字母数字切分、去停用词。

use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "of", "to", "in", "on", "for", "and",
    "or", "with", "what", "who", "how", "why", "when", "where", "which", "does", "do", "did",
    "this", "that", "it", "its", "by", "as", "at", "from", "about", "me", "tell",
];

/// 分词：小写、去标点、去停用词与单字符
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 1)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// 分词并返回词集合（用于相似度计算）
pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 计算两个词集合的重叠分数（交集大小）
pub fn overlap_score(set1: &HashSet<String>, set2: &HashSet<String>) -> usize {
    set1.intersection(set2).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stopwords_and_punctuation() {
        let tokens = tokenize("Who is the author of the report?");
        assert_eq!(tokens, vec!["author", "report"]);
    }

    #[test]
    fn test_overlap() {
        let a = tokenize_to_set("rust async runtime");
        let b = tokenize_to_set("async runtime internals");
        assert_eq!(overlap_score(&a, &b), 2);
    }
}
