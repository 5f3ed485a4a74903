use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::models::de::lenient;

/// 呈现进度：内容被看到了多少
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresentationProgress {
    None,
    Some,
    Complete,
}

/// 作答进度：必填内容被填写了多少（以及是否有效）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseProgress {
    None,
    Some,
    Complete,
    CompleteAndValid,
}

/// 对外的单元状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitState {
    /// `answers` 由本播放器维护，其他键来自扩展收集器；值一律是 JSON 字符串
    pub data_parts: BTreeMap<String, String>,
    pub presentation_progress: PresentationProgress,
    pub response_progress: ResponseProgress,
    pub unit_state_data_type: String,
}

/// Start 命令里携带的历史状态
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredUnitState {
    #[serde(default)]
    pub data_parts: Option<BTreeMap<String, JsonValue>>,
    #[serde(default, deserialize_with = "lenient")]
    pub presentation_progress: Option<PresentationProgress>,
    #[serde(default, deserialize_with = "lenient")]
    pub response_progress: Option<ResponseProgress>,
    #[serde(default)]
    pub unit_state_data_type: Option<String>,
}

impl RestoredUnitState {
    /// 取出某个 dataPart 的原始值
    pub fn data_part(&self, key: &str) -> Option<&JsonValue> {
        self.data_parts.as_ref().and_then(|parts| parts.get(key))
    }
}

/// 页面引用（`validPages` 的元素）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRef {
    pub id: String,
    pub label: String,
}

/// 播放器导航状态，只用于宿主显示，不持久化
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub valid_pages: Vec<PageRef>,
    pub current_page: String,
}

/// 单元日志的级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Lean,
    Rich,
    Debug,
}

/// 单元日志条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub time_stamp: i64,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
