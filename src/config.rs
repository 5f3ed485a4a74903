use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppResult, ConfigError};
use crate::models::player_config::{PagingMode, StateReportPolicy};

/// 播放器运行配置
///
/// 与协议层的 `playerConfig` 不同，这里是宿主启动播放器时就确定的参数
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// 状态消息的防抖时间（毫秒）
    pub debounce_state_messages_ms: u64,
    /// 键盘事件的防抖时间（毫秒）
    pub debounce_keyboard_events_ms: u64,
    /// 发送 ReadyNotification 前的延迟（毫秒）
    pub delay_ready_notification_ms: u64,
    /// tracing 日志过滤器
    pub log_filter: String,
    /// 默认分页模式
    pub default_paging_mode: PagingMode,
    /// 默认状态上报策略
    pub default_state_report_policy: StateReportPolicy,
    /// 是否区分 complete 与 complete-and-valid
    pub strict_response_validation: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_state_messages_ms: 1000,
            debounce_keyboard_events_ms: 100,
            delay_ready_notification_ms: 0,
            log_filter: "info".to_string(),
            default_paging_mode: PagingMode::Buttons,
            default_state_report_policy: StateReportPolicy::Eager,
            strict_response_validation: false,
        }
    }
}

impl Config {
    /// 测试用配置：所有防抖窗口为 0，同步输出
    pub fn immediate() -> Self {
        Self {
            debounce_state_messages_ms: 0,
            debounce_keyboard_events_ms: 0,
            ..Self::default()
        }
    }

    pub fn debounce_state_messages(&self) -> Duration {
        Duration::from_millis(self.debounce_state_messages_ms)
    }

    pub fn debounce_keyboard_events(&self) -> Duration {
        Duration::from_millis(self.debounce_keyboard_events_ms)
    }

    pub fn delay_ready_notification(&self) -> Duration {
        Duration::from_millis(self.delay_ready_notification_ms)
    }

    /// 从 TOML 文件加载配置，缺失的字段使用默认值
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })?;
        Ok(config)
    }

    /// 用环境变量覆盖配置
    pub fn with_env(self) -> AppResult<Self> {
        Ok(Self {
            debounce_state_messages_ms: env_or("ITEM_PLAYER_DEBOUNCE_STATE_MESSAGES", self.debounce_state_messages_ms)?,
            debounce_keyboard_events_ms: env_or("ITEM_PLAYER_DEBOUNCE_KEYBOARD_EVENTS", self.debounce_keyboard_events_ms)?,
            delay_ready_notification_ms: env_or("ITEM_PLAYER_DELAY_READY_NOTIFICATION", self.delay_ready_notification_ms)?,
            log_filter: std::env::var("ITEM_PLAYER_LOG").unwrap_or(self.log_filter),
            strict_response_validation: env_or("ITEM_PLAYER_STRICT_VALIDATION", self.strict_response_validation)?,
            ..self
        })
    }

    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env()
    }

    /// 按优先级加载：默认值 < 配置文件（`ITEM_PLAYER_CONFIG`）< 环境变量
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("ITEM_PLAYER_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        base.with_env()
    }
}

fn env_or<T: std::str::FromStr>(var_name: &str, default: T) -> AppResult<T> {
    match std::env::var(var_name) {
        Ok(value) => value.parse().map_err(|_| {
            ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value: value.clone(),
                expected_type: std::any::type_name::<T>().to_string(),
            }
            .into()
        }),
        Err(_) => Ok(default),
    }
}
