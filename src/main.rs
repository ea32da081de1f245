//! Intellect - 多工具智能体编排
//!
//! 入口：初始化日志、加载配置与凭据、构建运行时，然后运行按行交互的 REPL。
//! 用法：intellect [config.toml]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use intellect::config::{load_config, AppConfig, Secrets};
use intellect::{observability, AgentOutput, AgentRuntime, Command};
use tokio::io::{AsyncBufReadExt, BufReader};

const SESSION_ID: &str = "repl";

fn print_output(output: AgentOutput) {
    match output {
        AgentOutput::Reply(response) => {
            println!("{}", response.text);
            if !response.steps_used.is_empty() {
                println!("[tools: {}]", response.steps_used_names().join(", "));
            }
        }
        AgentOutput::Failed(msg) => println!("Error: {msg}"),
        AgentOutput::Notice(msg) => println!("{msg}"),
    }
}

/// 解析一行输入；空行返回 None
fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    let cmd = match head {
        "/attach" if !rest.is_empty() => Command::Attach(PathBuf::from(rest)),
        "/detach" => Command::Detach,
        "/graph" => Command::Graph(PathBuf::from(if rest.is_empty() { "." } else { rest })),
        "/cancel" => Command::Cancel,
        "/clear" => Command::Clear,
        "/quit" | "/exit" => Command::Quit,
        _ => Command::Submit(line.to_string()),
    };
    Some(cmd)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    observability::init();

    // 命令行显式给出的配置必须能加载；只有默认位置允许回退到内置默认值
    let cfg = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => load_config(Some(path.clone()))
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => load_config(None).unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            AppConfig::default()
        }),
    };

    // 凭据缺失在启动时失败，不会等到请求时
    let secrets = Secrets::from_env(&cfg).context("Missing credentials")?;
    let runtime = Arc::new(
        AgentRuntime::from_config(&cfg, secrets).context("Failed to create agent runtime")?,
    );

    let (cmd_tx, mut out_rx, loop_handle) =
        intellect::agent::spawn_command_loop(runtime, SESSION_ID.to_string());

    let printer = tokio::spawn(async move {
        while let Some(output) = out_rx.recv().await {
            print_output(output);
        }
    });

    println!(
        "{} ready. Commands: /attach <path>, /detach, /graph [dir], /cancel, /clear, /quit",
        cfg.app.name.as_deref().unwrap_or("intellect")
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let Some(cmd) = parse_line(&line) else {
            continue;
        };
        let quit = matches!(cmd, Command::Quit);
        if cmd_tx.send(cmd).is_err() || quit {
            break;
        }
    }
    let _ = cmd_tx.send(Command::Quit);
    drop(cmd_tx);

    loop_handle.await.context("Command loop panicked")?;
    printer.await.context("Printer task panicked")?;
    Ok(())
}
