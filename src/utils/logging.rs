/// 日志工具模块
///
/// 提供日志初始化和启动信息输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化日志订阅器
///
/// 日志写到标准错误：标准输出是宿主消息通道。
/// 设置了 `RUST_LOG` 时以它为准，否则使用 `filter`。
///
/// # 参数
/// - `filter`: 默认的过滤规则（如 `"info"`、`"item_player=debug"`）
pub fn init(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    // 重复初始化（例如测试里）时保持第一次的设置
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 运行配置
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 播放器启动 - {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    info!(
        "📊 防抖: 状态 {}ms / 键盘 {}ms, 就绪延迟 {}ms",
        config.debounce_state_messages_ms,
        config.debounce_keyboard_events_ms,
        config.delay_ready_notification_ms
    );
    info!(
        "📋 默认分页 {:?}, 上报策略 {:?}",
        config.default_paging_mode, config.default_state_report_policy
    );
    if config.strict_response_validation {
        info!("💡 作答进度按严格有效性判定");
    }
    info!("{}", "=".repeat(60));
}

/// 记录退出信息
///
/// # 参数
/// - `session`: 最后一个会话的描述
pub fn log_shutdown(session: impl std::fmt::Display) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 播放器退出, 最后状态: {}", session);
    info!("{}", "─".repeat(60));
}
