//! 任务规划器：请求文本 + 会话记忆 -> Plan
//!
//! 每个子句一个 Step，保持原文顺序；分配工具时先过一遍路由策略。
//! 后一子句引用前面结果时（"the previous result"、"the numbers found above"、"summarize the results"）
//! 设置 depends_on 并写入占位符；没有可引用的步骤时用长期记忆里的 last_result，仍没有则规划失败。

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

use crate::core::{AgentError, RoutingPolicy};
use crate::memory::MemoryState;
use crate::planner::intent::{
    self, mentions_document, numbers_aggregate, previous_result_pattern, ClassifyOptions,
};
use crate::planner::{AmbiguousDocumentIntent, Intent, Plan, Step};
use crate::tools::code_executor::{detect_language, normalize_language};
use crate::tools::summarizer::MIN_SUMMARY_CHARS;
use crate::tools::StepArgs;

/// 上一结果在表达式里的临时标记
const REF_MARKER: &str = "__ref__";

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

fn calc_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(
        &RE,
        r"(?i)^(?:please\s+)?(?:calculate|compute|evaluate|solve|work\s+out|what\s+is|what's)\s*:?\s*",
    )
}

fn search_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(
        &RE,
        r"(?i)^(?:please\s+)?(?:search|look\s*up|google|browse|find)\s+(?:(?:the\s+)?(?:web|internet|online)\s+)?(?:for\s+|about\s+|on\s+)?",
    )
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(&RE, r"(?s)```([\w+#.-]*)[^\n]*\n?(.*?)(?:```|$)")
}

fn code_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(
        &RE,
        r"(?is)^(?:please\s+)?(?:run|execute)\s+(?:(?:the\s+following|this|the|my|following)\s+)?(?:(python3?|py|javascript|js|node|rust|bash|shell|sh|ruby|go|java)\s+)?(?:code|script|snippet|program)?\s*:?\s*",
    )
}

fn summary_payload_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    re(&RE, r"(?is)\bsummari[sz]e\b[^:\n]{0,40}?:\s*(.+)$")
}

/// 引用上一结果的常见说法 -> 表达式模板
fn reference_templates() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            (r"(?i)^(?:add|plus)\s+(.+?)\s+to\s+__ref__$", "__ref__ + ${1}"),
            (r"(?i)^subtract\s+(.+?)\s+from\s+__ref__$", "__ref__ - ${1}"),
            (r"(?i)^multiply\s+__ref__\s+by\s+(.+)$", "__ref__ * ${1}"),
            (r"(?i)^divide\s+__ref__\s+by\s+(.+)$", "__ref__ / ${1}"),
            (r"(?i)^(?:the\s+)?(?:square\s+root|sqrt)\s+of\s+__ref__$", "sqrt(__ref__)"),
            (r"(?i)^double\s+__ref__$", "__ref__ * 2"),
            (r"(?i)^half\s+(?:of\s+)?__ref__$", "__ref__ / 2"),
        ]
        .into_iter()
        .filter_map(|(pattern, repl)| Regex::new(pattern).ok().map(|re| (re, repl)))
        .collect()
    })
}

/// 规划选项
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    pub fallback_to_qa: bool,
    pub ambiguous_document_intent: AmbiguousDocumentIntent,
    /// 每个步骤的超时；None 时用执行器默认值
    pub step_timeout: Option<Duration>,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            fallback_to_qa: true,
            ambiguous_document_intent: AmbiguousDocumentIntent::Qa,
            step_timeout: None,
        }
    }
}

pub struct TaskPlanner {
    policy: RoutingPolicy,
    options: PlannerOptions,
}

impl TaskPlanner {
    pub fn new(policy: RoutingPolicy, options: PlannerOptions) -> Self {
        Self { policy, options }
    }

    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    /// 将请求拆成有序 Plan；无法识别任何意图时返回 PlanningError，禁止的意图/工具组合返回 RoutingError
    pub fn plan(&self, query: &str, memory: &MemoryState) -> Result<Plan, AgentError> {
        let clauses = intent::segment(
            query,
            ClassifyOptions {
                fallback_to_qa: self.options.fallback_to_qa,
                ambiguous_document_intent: self.options.ambiguous_document_intent,
            },
        )?;

        let has_document = memory.has_document();
        let mut steps: Vec<Step> = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let (args, depends_on) = match clause.intent {
                Intent::Calculate => calculation_args(&clause.text, &steps, memory)?,
                Intent::Summarize => summary_args(&clause.text, &steps, has_document)?,
                Intent::Code => (code_args(&clause.text)?, Vec::new()),
                Intent::WebSearch => (search_args(&clause.text), Vec::new()),
                Intent::Qa => (single_arg("question", clause.text.trim()), Vec::new()),
            };
            let tool = self.policy.allow(clause.intent, has_document)?;
            let mut step = Step::new(clause.intent, tool, args).depends_on(depends_on);
            if let Some(timeout) = self.options.step_timeout {
                step = step.with_timeout(timeout);
            }
            steps.push(step);
        }

        let plan = Plan::new(steps)?;
        tracing::debug!(steps = plan.len(), "plan built");
        Ok(plan)
    }
}

fn single_arg(key: &str, value: impl Into<String>) -> StepArgs {
    let mut args = StepArgs::new();
    args.insert(key.to_string(), Value::String(value.into()));
    args
}

/// 最近的更早步骤；prefer 为 Some 时优先该意图
fn nearest_step(steps: &[Step], prefer: Option<Intent>) -> Option<usize> {
    prefer
        .and_then(|intent| steps.iter().rposition(|s| s.intent == intent))
        .or_else(|| steps.len().checked_sub(1))
}

fn calculation_args(
    text: &str,
    steps: &[Step],
    memory: &MemoryState,
) -> Result<(StepArgs, Vec<usize>), AgentError> {
    let body = calc_prefix_re().replace(text.trim(), "");
    let body = body.trim().trim_end_matches(['?', '.', '!']).trim();

    if let Some(func) = numbers_aggregate(body) {
        let k = nearest_step(steps, None).ok_or_else(|| {
            AgentError::Planning("no earlier step produced numbers to reference".to_string())
        })?;
        let expression = format!("{func}({{{{step{k}.numbers}}}})");
        return Ok((single_arg("expression", expression), vec![k]));
    }

    if previous_result_pattern().is_match(body) {
        let (reference, depends_on) = match nearest_step(steps, Some(Intent::Calculate)) {
            Some(k) => (format!("({{{{step{k}.result}}}})"), vec![k]),
            None => {
                let fact = memory.lookup_fact("last_result").map_err(|_| {
                    AgentError::Planning("there is no previous result to reference".to_string())
                })?;
                (format!("({fact})"), Vec::new())
            }
        };
        // 引用整体加括号，负数结果不会改变后续运算的优先级
        let marked = previous_result_pattern().replace_all(body, REF_MARKER);
        let mut expression = marked.into_owned();
        for (pattern, template) in reference_templates() {
            if pattern.is_match(&expression) {
                expression = pattern.replace(&expression, *template).into_owned();
                break;
            }
        }
        let expression = expression.replace(REF_MARKER, &reference);
        return Ok((single_arg("expression", expression), depends_on));
    }

    if body.is_empty() {
        return Err(AgentError::Planning("no expression to calculate".to_string()));
    }
    Ok((single_arg("expression", body), Vec::new()))
}

fn summary_args(
    text: &str,
    steps: &[Step],
    has_document: bool,
) -> Result<(StepArgs, Vec<usize>), AgentError> {
    // 内联文本："Summarize this: '...'"
    if let Some(caps) = summary_payload_re().captures(text) {
        let content = strip_quotes(caps[1].trim());
        if content.chars().count() >= MIN_SUMMARY_CHARS {
            return Ok((single_arg("content", content), Vec::new()));
        }
    }
    // 总结前面步骤的输出："search X, then summarize the results"
    if !mentions_document(text) {
        if let Some(k) = nearest_step(steps, None) {
            return Ok((single_arg("content", format!("{{{{step{k}}}}}")), vec![k]));
        }
    }
    if has_document {
        return Ok((single_arg("source", "document"), Vec::new()));
    }
    Err(AgentError::Planning(
        "summarization requires an attached document or inline content".to_string(),
    ))
}

fn strip_quotes(text: &str) -> &str {
    let pairs = [('"', '"'), ('\'', '\''), ('“', '”'), ('‘', '’')];
    for (open, close) in pairs {
        if let Some(inner) = text.strip_prefix(open).and_then(|t| t.strip_suffix(close)) {
            return inner.trim();
        }
    }
    text
}

fn code_args(text: &str) -> Result<StepArgs, AgentError> {
    let (code, declared) = if let Some(caps) = fence_re().captures(text) {
        let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let code = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        (code.trim().to_string(), Some(tag.to_string()).filter(|t| !t.is_empty()))
    } else {
        let caps = code_prefix_re().captures(text);
        let declared = caps
            .as_ref()
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        let start = caps.as_ref().and_then(|c| c.get(0)).map_or(0, |m| m.end());
        (text[start..].trim().to_string(), declared)
    };
    if code.is_empty() {
        return Err(AgentError::Planning("no code to run".to_string()));
    }
    let language = match declared {
        Some(tag) => normalize_language(&tag),
        None => detect_language(&code),
    };
    let mut args = single_arg("code", code);
    args.insert("language".into(), Value::String(language));
    Ok(args)
}

fn search_args(text: &str) -> StepArgs {
    let trimmed = text.trim();
    let query = search_prefix_re().replace(trimmed, "");
    let query = query.trim().trim_end_matches(['?', '.', '!']).trim();
    single_arg("query", if query.is_empty() { trimmed } else { query })
}
