//! 日志初始化模块
//!
//! 基于 tracing-subscriber 的统一日志初始化。
//! 优先读取 `RUST_LOG` 环境变量，未设置时使用调用方提供的默认过滤规则。

use tracing_subscriber::EnvFilter;

/// 初始化全局 tracing 订阅器
///
/// 重复调用是安全的：第二次初始化会被忽略。
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();

    if result.is_err() {
        tracing::debug!("[Logger] tracing 订阅器已存在，跳过初始化");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice_is_safe() {
        init_tracing("info");
        init_tracing("debug");
    }
}
