//! 会话闸门
//!
//! 同一时间只认一个会话：除 Start 以外，sessionId 不匹配的命令一律静默丢弃。

use std::fmt::Display;
use tracing::{debug, info};

/// 会话状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// 还没有收到任何 Start
    #[default]
    Unready,
    Ready(String),
    /// 已停止：单元被遮罩挡住，状态保留
    Stopped(String),
}

#[derive(Debug, Default)]
pub struct SessionGate {
    state: SessionState,
}

impl SessionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        match &self.state {
            SessionState::Unready => None,
            SessionState::Ready(id) | SessionState::Stopped(id) => Some(id),
        }
    }

    /// Start 总是被接受，并替换当前会话
    pub fn start(&mut self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        info!("✓ 会话 {} 开始", session_id);
        self.state = SessionState::Ready(session_id);
    }

    /// 命令的 sessionId 是否属于当前会话
    pub fn admits(&self, session_id: &str) -> bool {
        let admitted = self.session_id() == Some(session_id);
        if !admitted {
            debug!("丢弃会话 {:?} 的命令（当前会话 {:?}）", session_id, self.session_id());
        }
        admitted
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, SessionState::Ready(_))
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.state, SessionState::Stopped(_))
    }

    /// 停止当前会话；已停止或未开始时不变
    pub fn stop(&mut self) -> bool {
        match std::mem::take(&mut self.state) {
            SessionState::Ready(id) => {
                self.state = SessionState::Stopped(id);
                true
            }
            other => {
                self.state = other;
                false
            }
        }
    }

    /// 继续已停止的会话
    pub fn resume(&mut self) -> bool {
        match std::mem::take(&mut self.state) {
            SessionState::Stopped(id) => {
                self.state = SessionState::Ready(id);
                true
            }
            other => {
                self.state = other;
                false
            }
        }
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Unready => write!(f, "[未就绪]"),
            SessionState::Ready(id) => write!(f, "[会话#{} 运行中]", id),
            SessionState::Stopped(id) => write!(f, "[会话#{} 已停止]", id),
        }
    }
}
