//! 宿主与播放器之间的协议消息
//!
//! 入站为 [`Command`]，出站为 [`Notification`]，都以 `type` 字段区分。

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{AppResult, ProtocolError};
use crate::models::de::{one_or_many, string_or_number};
use crate::models::player_config::{NavigationTarget, PlayerConfigPatch};
use crate::models::unit_state::{LogEntry, PlayerState, RestoredUnitState, UnitState};

/// 本播放器能识别的入站消息类型
const COMMAND_TYPES: [&str; 7] = [
    "vopStartCommand",
    "vopStopCommand",
    "vopContinueCommand",
    "vopPageNavigationCommand",
    "vopPlayerConfigChangedNotification",
    "vopGetStateRequest",
    "vopNavigationDeniedNotification",
];

/// Start 命令
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCommand {
    #[serde(default, deserialize_with = "string_or_number")]
    pub session_id: String,
    #[serde(default)]
    pub unit_definition: Option<String>,
    #[serde(default)]
    pub unit_definition_type: Option<String>,
    #[serde(default)]
    pub unit_state: Option<RestoredUnitState>,
    #[serde(default)]
    pub player_config: Option<PlayerConfigPatch>,
}

/// 导航被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DenialReason {
    ResponsesIncomplete,
    PresentationIncomplete,
}

/// 入站命令
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    #[serde(rename = "vopStartCommand")]
    Start(StartCommand),
    #[serde(rename = "vopStopCommand", rename_all = "camelCase")]
    Stop {
        #[serde(default, deserialize_with = "string_or_number")]
        session_id: String,
    },
    #[serde(rename = "vopContinueCommand", rename_all = "camelCase")]
    Continue {
        #[serde(default, deserialize_with = "string_or_number")]
        session_id: String,
    },
    #[serde(rename = "vopPageNavigationCommand", rename_all = "camelCase")]
    PageNavigation {
        #[serde(default, deserialize_with = "string_or_number")]
        session_id: String,
        #[serde(default, deserialize_with = "string_or_number")]
        target: String,
    },
    #[serde(rename = "vopPlayerConfigChangedNotification", rename_all = "camelCase")]
    PlayerConfigChanged {
        #[serde(default, deserialize_with = "string_or_number")]
        session_id: String,
        #[serde(default)]
        player_config: PlayerConfigPatch,
    },
    #[serde(rename = "vopGetStateRequest", rename_all = "camelCase")]
    GetStateRequest {
        #[serde(default, deserialize_with = "string_or_number")]
        session_id: String,
        #[serde(default)]
        stop: bool,
    },
    #[serde(rename = "vopNavigationDeniedNotification", rename_all = "camelCase")]
    NavigationDenied {
        #[serde(default, deserialize_with = "string_or_number")]
        session_id: String,
        #[serde(default, deserialize_with = "one_or_many")]
        reason: Option<Vec<DenialReason>>,
    },
}

impl Command {
    pub fn session_id(&self) -> &str {
        match self {
            Command::Start(start) => &start.session_id,
            Command::Stop { session_id }
            | Command::Continue { session_id }
            | Command::PageNavigation { session_id, .. }
            | Command::PlayerConfigChanged { session_id, .. }
            | Command::GetStateRequest { session_id, .. }
            | Command::NavigationDenied { session_id, .. } => session_id,
        }
    }

    /// 消息类型名，用于日志
    pub fn type_name(&self) -> &'static str {
        match self {
            Command::Start(_) => "vopStartCommand",
            Command::Stop { .. } => "vopStopCommand",
            Command::Continue { .. } => "vopContinueCommand",
            Command::PageNavigation { .. } => "vopPageNavigationCommand",
            Command::PlayerConfigChanged { .. } => "vopPlayerConfigChangedNotification",
            Command::GetStateRequest { .. } => "vopGetStateRequest",
            Command::NavigationDenied { .. } => "vopNavigationDeniedNotification",
        }
    }
}

/// 解析一条入站消息
///
/// # 返回
/// - `Ok(Some(cmd))`：可识别的命令
/// - `Ok(None)`：不是发给播放器的消息（其他类型或没有 `type`）
/// - `Err(MalformedMessage)`：JSON 无法解析
/// - `Err(MalformedCommand)`：已知类型的字段不合法，带上能读出的 sessionId
pub fn parse_command(raw: &str) -> AppResult<Option<Command>> {
    let value: JsonValue = serde_json::from_str(raw)?;
    let message_type = match value.get("type").and_then(JsonValue::as_str) {
        Some(t) if COMMAND_TYPES.contains(&t) => t.to_string(),
        other => {
            debug!("忽略未知消息类型: {:?}", other);
            return Ok(None);
        }
    };
    let session_id = match value.get("sessionId") {
        Some(JsonValue::String(s)) => Some(s.clone()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    match serde_json::from_value(value) {
        Ok(command) => Ok(Some(command)),
        Err(source) => Err(ProtocolError::MalformedCommand {
            message_type,
            session_id,
            source,
        }
        .into()),
    }
}

/// 播放器元数据（随 ReadyNotification 发送）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerMetadata {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub version: &'static str,
    pub code: CodeMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeMetadata {
    pub repository_url: &'static str,
}

impl PlayerMetadata {
    pub fn current() -> Self {
        Self {
            kind: "player",
            id: "item-player",
            name: "Item Player",
            version: env!("CARGO_PKG_VERSION"),
            code: CodeMetadata {
                repository_url: env!("CARGO_PKG_REPOSITORY"),
            },
        }
    }
}

/// 状态消息体（StateChanged 与 GetStateResponse 共用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMessage {
    pub session_id: String,
    pub time_stamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_state: Option<UnitState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_state: Option<PlayerState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<Vec<LogEntry>>,
}

/// 出站通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Notification {
    #[serde(rename = "vopReadyNotification")]
    Ready { metadata: PlayerMetadata },
    #[serde(rename = "vopStateChangedNotification")]
    StateChanged(StateMessage),
    #[serde(rename = "vopGetStateResponse")]
    GetStateResponse(StateMessage),
    #[serde(rename = "vopWindowFocusChangedNotification", rename_all = "camelCase")]
    WindowFocusChanged { time_stamp: i64, has_focus: bool },
    #[serde(rename = "vopRuntimeErrorNotification", rename_all = "camelCase")]
    RuntimeError {
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename = "vopUnitNavigationRequestedNotification", rename_all = "camelCase")]
    UnitNavigationRequested {
        session_id: String,
        target: NavigationTarget,
    },
}

impl Notification {
    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Notification::Ready { .. } => "vopReadyNotification",
            Notification::StateChanged(_) => "vopStateChangedNotification",
            Notification::GetStateResponse(_) => "vopGetStateResponse",
            Notification::WindowFocusChanged { .. } => "vopWindowFocusChangedNotification",
            Notification::RuntimeError { .. } => "vopRuntimeErrorNotification",
            Notification::UnitNavigationRequested { .. } => {
                "vopUnitNavigationRequestedNotification"
            }
        }
    }
}
