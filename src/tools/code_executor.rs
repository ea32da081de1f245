//! 代码执行器：仅执行受支持语言（默认 python）的代码片段
//!
//! 代码通过 stdin 交给解释器子进程（`python3 -`），带超时、输出截断与危险调用黑名单。
//! 语言由 `language` 参数或代码特征判定，不受支持的语言返回 UnsupportedLanguage。

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::core::AgentError;
use crate::tools::{StepArgs, Tool, ToolKind};

/// 禁止出现在代码中的调用（即使语言受支持）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "os.system",
    "subprocess",
    "shutil.rmtree",
    "os.remove",
    "os.rmdir",
    "os.unlink",
    "__import__",
];

const NO_OUTPUT: &str = "(Code executed successfully, no output produced)";

/// 将 fence 标签或语言名归一化（py / python3 -> python）
pub fn normalize_language(tag: &str) -> String {
    match tag.trim().to_lowercase().as_str() {
        "py" | "python" | "python3" => "python".to_string(),
        "rs" | "rust" => "rust".to_string(),
        "js" | "javascript" | "node" => "javascript".to_string(),
        "ts" | "typescript" => "typescript".to_string(),
        "sh" | "bash" | "shell" | "zsh" => "shell".to_string(),
        "c++" | "cpp" => "cpp".to_string(),
        other => other.to_string(),
    }
}

/// 按代码特征粗略判定语言；无明显特征时视为 python
pub fn detect_language(code: &str) -> String {
    let markers: &[(&str, &str)] = &[
        ("fn main(", "rust"),
        ("println!(", "rust"),
        ("let mut ", "rust"),
        ("#include", "c"),
        ("public static void main", "java"),
        ("System.out.println", "java"),
        ("package main", "go"),
        ("fmt.Println", "go"),
        ("console.log(", "javascript"),
        ("#!/bin/", "shell"),
    ];
    markers
        .iter()
        .find(|(marker, _)| code.contains(marker))
        .map(|(_, lang)| lang.to_string())
        .unwrap_or_else(|| "python".to_string())
}

/// 代码执行工具
pub struct CodeExecutorTool {
    interpreter: String,
    language: String,
    timeout: Duration,
    max_output_chars: usize,
}

impl CodeExecutorTool {
    pub fn new(
        interpreter: impl Into<String>,
        language: impl Into<String>,
        timeout_secs: u64,
        max_output_chars: usize,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            language: normalize_language(&language.into()),
            timeout: Duration::from_secs(timeout_secs),
            max_output_chars,
        }
    }

    pub fn supported_language(&self) -> &str {
        &self.language
    }

    /// 语言检查：显式 language 优先，否则按代码特征判定
    fn check_language(&self, code: &str, declared: Option<&str>) -> Result<(), AgentError> {
        let lang = match declared {
            Some(tag) if !tag.trim().is_empty() => normalize_language(tag),
            _ => detect_language(code),
        };
        if lang == self.language {
            Ok(())
        } else {
            Err(AgentError::UnsupportedLanguage(lang))
        }
    }

    fn check_forbidden(code: &str) -> Result<(), AgentError> {
        for forbidden in FORBIDDEN_SUBSTR {
            if code.contains(forbidden) {
                return Err(AgentError::ToolExecutionFailed(format!(
                    "Forbidden pattern: {forbidden}"
                )));
            }
        }
        Ok(())
    }

    fn truncate(&self, text: &str) -> String {
        if text.chars().count() > self.max_output_chars {
            text.chars().take(self.max_output_chars).collect::<String>() + "\n...[truncated]"
        } else {
            text.to_string()
        }
    }

    async fn run(&self, code: &str) -> Result<String, AgentError> {
        let mut child = Command::new(&self.interpreter)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                tracing::warn!(interpreter = %self.interpreter, error = %e, "code interpreter spawn failed");
                AgentError::ToolUnavailable(ToolKind::CodeExecutor.name().to_string())
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .await
                .map_err(|e| AgentError::ToolExecutionFailed(format!("Write code: {e}")))?;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AgentError::ToolTimeout(ToolKind::CodeExecutor.name().to_string()))?
            .map_err(|e| AgentError::ToolExecutionFailed(format!("Execution failed: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            let last = stderr.lines().last().unwrap_or("non-zero exit status");
            return Err(AgentError::ToolExecutionFailed(format!("Error: {last}")));
        }
        if stdout.is_empty() {
            return Ok(NO_OUTPUT.to_string());
        }
        Ok(self.truncate(&stdout))
    }
}

#[async_trait]
impl Tool for CodeExecutorTool {
    fn kind(&self) -> ToolKind {
        ToolKind::CodeExecutor
    }

    fn description(&self) -> &str {
        "Execute a Python snippet and return its output. Args: {\"code\": \"print(1)\", \"language\": \"python\"}"
    }

    async fn invoke(&self, args: StepArgs) -> Result<String, AgentError> {
        let code = args
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if code.is_empty() {
            return Err(AgentError::ToolExecutionFailed("No code provided".to_string()));
        }
        let declared = args.get("language").and_then(|v| v.as_str());
        self.check_language(code, declared)?;
        Self::check_forbidden(code)?;

        tracing::info!(interpreter = %self.interpreter, "code executor run");
        self.run(code).await
    }
}
