//! 单元日志 - 业务能力层
//!
//! 单元代码通过 `Log.rich / lean / debug` 写入的日志，随状态消息一起交给宿主。
//! 与播放器自身的 tracing 日志无关。

use tracing::debug;

use crate::models::player_config::LogPolicy;
use crate::models::unit_state::{LogEntry, LogLevel};

/// 某个策略是否保留某个级别
pub fn retains(policy: LogPolicy, level: LogLevel) -> bool {
    match policy {
        LogPolicy::Debug => true,
        LogPolicy::Rich => matches!(level, LogLevel::Rich | LogLevel::Lean),
        LogPolicy::Lean => level == LogLevel::Lean,
        LogPolicy::Disabled => false,
    }
}

/// 待发送的单元日志缓冲
#[derive(Debug, Default)]
pub struct UnitLog {
    entries: Vec<LogEntry>,
}

impl UnitLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按策略记录一条日志
    ///
    /// # 返回
    /// 是否被保留
    pub fn push(
        &mut self,
        policy: LogPolicy,
        level: LogLevel,
        key: impl Into<String>,
        content: Option<String>,
        time_stamp: i64,
    ) -> bool {
        let key = key.into();
        if !retains(policy, level) {
            debug!("单元日志 {} ({:?}) 被策略 {:?} 丢弃", key, level, policy);
            return false;
        }
        self.entries.push(LogEntry {
            time_stamp,
            key,
            content,
        });
        true
    }

    pub fn has_pending(&self) -> bool {
        !self.entries.is_empty()
    }

    /// 取出全部待发送条目
    ///
    /// `disabled` 策略下返回 `None`，消息里不出现 `log` 字段
    pub fn drain(&mut self, policy: LogPolicy) -> Option<Vec<LogEntry>> {
        let entries = std::mem::take(&mut self.entries);
        (policy != LogPolicy::Disabled).then_some(entries)
    }
}
