//! 可观测性：tracing-subscriber 初始化（RUST_LOG 可覆盖，默认 info）

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 构造过滤器：RUST_LOG 优先，否则使用 default_level
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// 初始化全局订阅者；重复调用时忽略（测试中多次初始化不会 panic）
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(fmt::layer())
        .try_init();
}
