//! 执行上下文：单次 Plan 执行期间的中间结果
//!
//! 每个成功步骤写入 `stepK`（全文）、`stepK.result`（文中最后一个数）、`stepK.numbers`（逗号分隔的全部数字）；
//! 派发前用它解析参数中的 `{{key}}` 占位符。Plan 结束即丢弃。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::StepArgs;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.:-]+)\s*\}\}").unwrap())
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?").unwrap())
}

/// 数字前面的字符决定它是否算数、是否带负号
enum Prefix {
    /// 紧贴字母 / 数字 / 小数点（GPT-4、v1.2 之类），不算数
    Reject,
    Plain,
    Negative,
}

fn classify_prefix(before: &str) -> Prefix {
    let mut rev = before.chars().rev();
    match rev.next() {
        None => Prefix::Plain,
        Some(c) if c.is_alphanumeric() || c == '_' || c == '.' => Prefix::Reject,
        Some('-') => match rev.next() {
            // "10-3"、"(2)-3"：减号，不是负号
            Some(p) if p.is_ascii_digit() || p == ')' => Prefix::Plain,
            Some(p) if p.is_alphanumeric() || p == '_' || p == '.' => Prefix::Reject,
            _ => Prefix::Negative,
        },
        Some(_) => Prefix::Plain,
    }
}

/// 提取文本中的所有数字（去掉千分位逗号）；`-` 只在开头、空白或运算符之后才视为负号
pub fn extract_numbers(text: &str) -> Vec<String> {
    number_re()
        .find_iter(text)
        .filter_map(|m| {
            let digits = m.as_str().replace(',', "");
            match classify_prefix(&text[..m.start()]) {
                Prefix::Reject => None,
                Prefix::Plain => Some(digits),
                Prefix::Negative => Some(format!("-{digits}")),
            }
        })
        .collect()
}

#[derive(Debug, Default, Clone)]
pub struct ExecutionContext {
    values: HashMap<String, String>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// 记录第 index 步的输出
    pub fn record_step(&mut self, index: usize, output: &str) {
        self.insert(format!("step{index}"), output);
        let numbers = extract_numbers(output);
        if let Some(last) = numbers.last() {
            self.insert(format!("step{index}.result"), last.clone());
        }
        if !numbers.is_empty() {
            self.insert(format!("step{index}.numbers"), numbers.join(", "));
        }
    }

    fn resolve_str(&self, text: &str) -> Result<String, AgentError> {
        let mut missing = None;
        let resolved = placeholder_re().replace_all(text, |caps: &regex::Captures<'_>| {
            let key = &caps[1];
            match self.get(key) {
                Some(v) => v.to_string(),
                None => {
                    missing.get_or_insert_with(|| key.to_string());
                    String::new()
                }
            }
        });
        match missing {
            Some(key) => Err(AgentError::ToolExecutionFailed(format!(
                "no value available for '{key}' from an earlier step"
            ))),
            None => Ok(resolved.into_owned()),
        }
    }

    fn resolve_value(&self, value: &Value) -> Result<Value, AgentError> {
        Ok(match value {
            Value::String(s) => Value::String(self.resolve_str(s)?),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| self.resolve_value(v))
                    .collect::<Result<_, _>>()?,
            ),
            other => other.clone(),
        })
    }

    /// 解析参数中的全部占位符；引用不存在的值时返回 ToolExecutionFailed
    pub fn resolve_args(&self, args: &StepArgs) -> Result<StepArgs, AgentError> {
        args.iter()
            .map(|(k, v)| Ok((k.clone(), self.resolve_value(v)?)))
            .collect()
    }
}
