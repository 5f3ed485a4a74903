use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::models::de::{lenient, one_or_many, opt_millis, opt_string_or_number};

/// 分页模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PagingMode {
    /// 一次只显示一页，无翻页按钮
    Separate,
    /// 一次只显示一页，带翻页按钮
    Buttons,
    /// 所有页面连续滚动
    ConcatScroll,
    /// 连续滚动，滚动位置吸附到页边界
    ConcatScrollSnap,
}

impl PagingMode {
    /// 是否一次只显示一页
    pub fn is_paged(self) -> bool {
        matches!(self, PagingMode::Separate | PagingMode::Buttons)
    }
}

/// 单元导航目标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationTarget {
    Next,
    Previous,
    First,
    Last,
    End,
}

/// 单元日志策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogPolicy {
    Debug,
    Rich,
    Lean,
    Disabled,
}

/// 打印模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrintMode {
    Off,
    On,
    OnWithIds,
}

/// 状态上报策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateReportPolicy {
    /// 防抖结束后自动发送
    Eager,
    /// 只在 GetStateRequest 时返回
    OnDemand,
}

/// 协议层配置（`playerConfig`）的完整取值
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    pub paging_mode: PagingMode,
    pub start_page: Option<String>,
    pub enabled_navigation_targets: Vec<NavigationTarget>,
    pub log_policy: LogPolicy,
    pub print_mode: PrintMode,
    pub unit_id: Option<String>,
    pub unit_title: Option<String>,
    pub unit_number: Option<String>,
    pub direct_download_url: Option<String>,
    pub state_report_policy: StateReportPolicy,
    pub debounce_state_messages: Duration,
    pub debounce_keyboard_events: Duration,
}

impl PlayerConfig {
    /// 以运行配置为基础创建默认的协议配置
    pub fn from_runtime(config: &Config) -> Self {
        Self {
            paging_mode: config.default_paging_mode,
            start_page: None,
            enabled_navigation_targets: Vec::new(),
            log_policy: LogPolicy::Rich,
            print_mode: PrintMode::Off,
            unit_id: None,
            unit_title: None,
            unit_number: None,
            direct_download_url: None,
            state_report_policy: config.default_state_report_policy,
            debounce_state_messages: config.debounce_state_messages(),
            debounce_keyboard_events: config.debounce_keyboard_events(),
        }
    }

    /// 应用部分更新，返回被修改的方面
    pub fn apply(&mut self, patch: &PlayerConfigPatch) -> ConfigChanges {
        let mut changes = ConfigChanges::default();

        if let Some(mode) = patch.paging_mode {
            changes.paging_mode = mode != self.paging_mode;
            self.paging_mode = mode;
        }
        if let Some(start_page) = &patch.start_page {
            self.start_page = Some(start_page.clone());
        }
        if let Some(targets) = &patch.enabled_navigation_targets {
            self.enabled_navigation_targets = targets.clone();
        }
        if let Some(policy) = patch.log_policy {
            self.log_policy = policy;
        }
        if let Some(print_mode) = patch.print_mode {
            self.print_mode = print_mode;
        }
        if patch.unit_id.is_some() {
            self.unit_id = patch.unit_id.clone();
        }
        if patch.unit_title.is_some() {
            self.unit_title = patch.unit_title.clone();
        }
        if patch.unit_number.is_some() {
            self.unit_number = patch.unit_number.clone();
        }
        if patch.direct_download_url.is_some() {
            self.direct_download_url = patch.direct_download_url.clone();
        }
        if let Some(policy) = patch.state_report_policy {
            changes.state_report_policy = policy != self.state_report_policy;
            self.state_report_policy = policy;
        }
        if let Some(ms) = patch.debounce_state_messages {
            changes.debounce = true;
            self.debounce_state_messages = Duration::from_millis(ms);
        }
        if let Some(ms) = patch.debounce_keyboard_events {
            changes.debounce = true;
            self.debounce_keyboard_events = Duration::from_millis(ms);
        }

        changes
    }

    pub fn is_target_enabled(&self, target: NavigationTarget) -> bool {
        self.enabled_navigation_targets.contains(&target)
    }
}

/// 一次配置更新实际影响了哪些方面
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChanges {
    pub paging_mode: bool,
    pub state_report_policy: bool,
    pub debounce: bool,
}

/// `playerConfig` 的部分更新
///
/// 每个字段都是可选且宽松解析的：无法识别的值被忽略，而不是让整条消息失败
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfigPatch {
    #[serde(default, deserialize_with = "lenient")]
    pub paging_mode: Option<PagingMode>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub start_page: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub enabled_navigation_targets: Option<Vec<NavigationTarget>>,
    #[serde(default, deserialize_with = "lenient")]
    pub log_policy: Option<LogPolicy>,
    #[serde(default, deserialize_with = "lenient")]
    pub print_mode: Option<PrintMode>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub unit_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub unit_title: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub unit_number: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub direct_download_url: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub state_report_policy: Option<StateReportPolicy>,
    #[serde(default, deserialize_with = "opt_millis")]
    pub debounce_state_messages: Option<u64>,
    #[serde(default, deserialize_with = "opt_millis")]
    pub debounce_keyboard_events: Option<u64>,
}
