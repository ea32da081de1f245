//! 意图识别与子句切分
//!
//! 先按连接词（then / and then / after that / ; / 句末标点 / 后接动词的 and）把请求切成子句，
//! 代码块、"code:" 之后的代码、"summarize this:" 之后的内联文本不参与切分；
//! 再对每个子句按词法线索分类：code > search 动词 > summarize > calculate 动词 > 搜索短语 > 算式 > 歧义文档请求 > 问句。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 子句意图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Qa,
    Summarize,
    Calculate,
    Code,
    WebSearch,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Qa => "qa",
            Intent::Summarize => "summarize",
            Intent::Calculate => "calculate",
            Intent::Code => "code",
            Intent::WebSearch => "web_search",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 既像问答又像摘要的文档请求（如 "tell me about this document"）的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousDocumentIntent {
    #[default]
    Qa,
    Summarize,
}

/// 切分出的子句
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub intent: Intent,
    pub text: String,
}

macro_rules! lazy_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).expect("static regex"))
        }
    };
}

lazy_regex!(
    connector_re,
    r"(?i)\s*,\s*(?:and\s+)?then\s+|\s+and\s+then\s+|\s*,?\s*after\s+that,?\s+|\s+then\s+|\s*;\s*|\s*,\s*and\s+|\s+and\s+|\s*,\s*also\s+|\s+also\s+|[.?!]\s+|\s*,\s*"
);
lazy_regex!(
    clause_start_re,
    r"(?i)^(?:please\s+)?(?:search|look\s*up|google|browse|find|calculate|compute|evaluate|solve|work\s+out|add|subtract|multiply|divide|summari[sz]e|summary|give\s+me\s+a\s+summary|run|execute|what|who|whom|why|how|when|where|which|tell\s+me|explain|describe)\b"
);
lazy_regex!(
    code_cue_re,
    r"(?i)\b(?:run|execute)\b[^:\n]{0,40}?\b(?:code|script|snippet|program)\b"
);
lazy_regex!(
    leading_connector_re,
    r"(?i)^(?:and\s+)?(?:then|also|after\s+that)\b,?\s*"
);
lazy_regex!(code_start_re, r"(?i)^(?:please\s+)?(?:run|execute)\b");
lazy_regex!(
    payload_re,
    r"(?i)(?:\b(?:run|execute)\b[^:\n]{0,40}?\b(?:code|script|snippet|program)\b|\bsummari[sz]e\b[^:\n]{0,40}?)\s*:\s*"
);
lazy_regex!(
    summarize_re,
    r"(?i)\bsummar(?:y|ies|ize|ise|ized|ised|izing|ising)\b|\btl;?dr\b"
);
lazy_regex!(
    search_start_re,
    r"(?i)^(?:please\s+)?(?:search|look\s*up|google|browse|find\s+(?:out|information|info|news|articles))\b"
);
lazy_regex!(
    search_phrase_re,
    r"(?i)\b(?:search\s+(?:the\s+)?(?:web|internet|online)|latest\s+news|current\s+news|news\s+about|on\s+the\s+(?:web|internet))\b"
);
lazy_regex!(
    calc_start_re,
    r"(?i)^(?:please\s+)?(?:calculate|compute|evaluate|solve|work\s+out|add|subtract|multiply|divide)\b"
);
lazy_regex!(
    math_expr_re,
    r"(?i)\d\s*(?:\*\*|[-+*/^%×÷]|x\s)\s*[-\d(.]|\b(?:sqrt|abs|sin|cos|tan|exp|floor|ceil|round|log10|log2|ln|log|pow|min|max|sum|avg|mean|average)\s*\(|\d\s+(?:plus|minus|times|multiplied\s+by|divided\s+by|to\s+the\s+power\s+of)\s+-?\d"
);
lazy_regex!(
    doc_ref_re,
    r"(?i)\b(?:this|the|my|attached|uploaded)\s+(?:document|doc|file|pdf|paper|report|article)\b"
);
lazy_regex!(
    ambiguous_doc_re,
    r"(?i)^(?:please\s+)?(?:tell\s+me\s+about|describe|explain|give\s+me\s+an\s+overview\s+of|overview\s+of|what\s+is\s+(?:this|the)\s+(?:document|doc|file|pdf|paper|report|article)\s+about)\b"
);
lazy_regex!(
    question_re,
    r"(?i)^(?:please\s+)?(?:what|who|whom|whose|why|how|when|where|which|is|are|was|were|does|do|did|can|could|should|would|will|explain|describe|tell\s+me|define)\b"
);

lazy_regex!(
    previous_result_re,
    r"(?i)\b(?:the\s+)?(?:previous|last|prior|above|that)\s+(?:result|answer|value|number)\b"
);
lazy_regex!(
    arithmetic_word_re,
    r"(?i)\b(?:plus|minus|times|add|subtract|multiply|divide|multiplied|divided|double|triple|half|square\s+root|sqrt)\b|[-+*/^]"
);
lazy_regex!(
    numbers_aggregate_re,
    r"(?i)\b(sum|total|average|mean|avg|maximum|max|minimum|min)\s+of\s+(?:all\s+)?(?:the\s+)?(?:numbers|values|figures)\b"
);

/// 是否引用了上一个结果（"the previous result"）
pub fn references_previous_result(text: &str) -> bool {
    previous_result_re().is_match(text)
}

/// 对前一步数字的聚合请求（"the sum of the numbers found above"），返回计算器函数名
pub fn numbers_aggregate(text: &str) -> Option<&'static str> {
    let caps = numbers_aggregate_re().captures(text)?;
    Some(match caps[1].to_lowercase().as_str() {
        "sum" | "total" => "sum",
        "average" | "mean" | "avg" => "avg",
        "maximum" | "max" => "max",
        _ => "min",
    })
}

pub(crate) fn previous_result_pattern() -> &'static Regex {
    previous_result_re()
}

/// 意图分类选项
#[derive(Debug, Clone, Copy)]
pub struct ClassifyOptions {
    pub fallback_to_qa: bool,
    pub ambiguous_document_intent: AmbiguousDocumentIntent,
}

/// 子句是否引用了文档（this document / the file ...）
pub fn mentions_document(text: &str) -> bool {
    doc_ref_re().is_match(text)
}

/// 按词法线索分类单个子句；无法识别时返回 None
pub fn classify(text: &str, ambiguous: AmbiguousDocumentIntent) -> Option<Intent> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.contains("```") || code_cue_re().is_match(text) {
        return Some(Intent::Code);
    }
    if search_start_re().is_match(text) {
        return Some(Intent::WebSearch);
    }
    if summarize_re().is_match(text) {
        return Some(Intent::Summarize);
    }
    if calc_start_re().is_match(text) {
        return Some(Intent::Calculate);
    }
    if search_phrase_re().is_match(text) {
        return Some(Intent::WebSearch);
    }
    if math_expr_re().is_match(text)
        || numbers_aggregate(text).is_some()
        || (references_previous_result(text) && arithmetic_word_re().is_match(text))
    {
        return Some(Intent::Calculate);
    }
    if ambiguous_doc_re().is_match(text) && mentions_document(text) {
        return Some(match ambiguous {
            AmbiguousDocumentIntent::Qa => Intent::Qa,
            AmbiguousDocumentIntent::Summarize => Intent::Summarize,
        });
    }
    if question_re().is_match(text) || text.ends_with('?') {
        return Some(Intent::Qa);
    }
    // "run print('hi')" 这类没有 code 字样的执行请求
    if code_start_re().is_match(text) {
        return Some(Intent::Code);
    }
    None
}

/// 不参与切分的区间：代码块、code: / summarize: 之后的内容
fn protected_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();

    let fences: Vec<usize> = text.match_indices("```").map(|(i, _)| i).collect();
    for pair in fences.chunks(2) {
        match pair {
            [open, close] => ranges.push((*open, close + 3)),
            [open] => ranges.push((*open, text.len())),
            _ => {}
        }
    }

    for m in payload_re().find_iter(text) {
        let start = m.end();
        if ranges.iter().any(|(s, e)| start >= *s && start < *e) {
            continue;
        }
        let rest = &text[start..];
        let end = if rest.starts_with("```") {
            // 交给代码块区间处理
            continue;
        } else if let Some(quote) = rest.chars().next().filter(|c| matches!(*c, '"' | '\'' | '“' | '‘')) {
            let closing = match quote {
                '“' => '”',
                '‘' => '’',
                other => other,
            };
            let body_start = start + quote.len_utf8();
            text[body_start..]
                .find(closing)
                .map(|i| body_start + i + closing.len_utf8())
                .unwrap_or(text.len())
        } else {
            text.len()
        };
        ranges.push((m.start(), end));
    }
    ranges
}

/// 切分为原文子句（未分类）
pub fn split_clauses(text: &str) -> Vec<String> {
    let protected = protected_ranges(text);
    let mut pieces = Vec::new();
    let mut cursor = 0;

    for m in connector_re().find_iter(text) {
        if m.start() < cursor {
            continue;
        }
        if protected
            .iter()
            .any(|(s, e)| m.start() < *e && m.end() > *s)
        {
            continue;
        }
        let matched = m.as_str();
        let sentence_end = matched.starts_with(|c: char| matches!(c, '.' | '?' | '!'));
        let rest = &text[m.end()..];
        // 句末标点总是切分；其它连接词只有后面跟着新的动作 / 问句时才切分
        if !sentence_end && !clause_start_re().is_match(rest) {
            continue;
        }
        let end = if sentence_end { m.start() + 1 } else { m.start() };
        pieces.push(text[cursor..end].trim().to_string());
        cursor = m.end();
    }
    pieces.push(text[cursor..].trim().to_string());
    pieces
        .into_iter()
        .map(|p| leading_connector_re().replace(&p, "").into_owned())
        .filter(|p| !p.is_empty())
        .collect()
}

/// 切分并分类；无法识别的子句按 fallback_to_qa 处理
pub fn segment(query: &str, options: ClassifyOptions) -> Result<Vec<Clause>, AgentError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AgentError::Planning("empty query".to_string()));
    }
    let mut clauses: Vec<Clause> = Vec::new();
    for piece in split_clauses(query) {
        let intent = match classify(&piece, options.ambiguous_document_intent) {
            Some(intent) => intent,
            None if options.fallback_to_qa => Intent::Qa,
            None => {
                // 无线索的尾巴并入上一个子句
                if let Some(prev) = clauses.last_mut() {
                    prev.text.push(' ');
                    prev.text.push_str(&piece);
                    continue;
                }
                return Err(AgentError::Planning(format!(
                    "no recognizable intent in '{}'",
                    piece.chars().take(80).collect::<String>()
                )));
            }
        };
        clauses.push(Clause {
            intent,
            text: piece,
        });
    }
    if clauses.is_empty() {
        return Err(AgentError::Planning("no recognizable intent".to_string()));
    }
    Ok(clauses)
}
