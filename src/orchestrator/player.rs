//! 协议分发器 - 编排层
//!
//! ## 职责
//!
//! 播放器的核心状态机：命令进、通知出。
//!
//! 1. **会话闸门**：只处理当前会话的命令，Start 总是被接受并替换会话
//! 2. **单元生命周期**：校验版本、加载单元、换单元时丢弃旧实例和所有待触发的定时器
//! 3. **防抖调度**：键盘防抖决定何时读取值，状态防抖决定何时发出状态消息
//! 4. **差量上报**：`vopStateChangedNotification` 只携带与上一次相比变化的部分
//!
//! ## 设计特点
//!
//! - **同步处理**：每条命令、每个界面操作都在一次调用里处理完
//! - **不持有定时器**：只记录截止时间，由 [`runtime`](crate::orchestrator::runtime) 负责唤醒
//! - **不做 I/O**：通知先放进发件箱，由调用方取走发送

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, ProtocolError};
use crate::models::messages::{
    parse_command, Command, DenialReason, Notification, PlayerMetadata, StartCommand, StateMessage,
};
use crate::models::player_config::{PlayerConfig, PrintMode, StateReportPolicy};
use crate::models::ui::{MessageBox, PointerTarget, UiAction, UiState, UnitInfo, UnitNavButtons};
use crate::models::unit_state::{PlayerState, UnitState};
use crate::models::version::{check_unit_definition_type, check_unit_state_data_type};
use crate::services::{Debouncer, ResponseValidation};
use crate::workflow::{SessionGate, UnitCtx, UnitScript};

/// 上一次发出的状态，用于差量上报
struct Baseline {
    unit_state: UnitState,
    player_state: PlayerState,
}

/// 把 tokio 的单调时钟换算成消息里的毫秒时间戳
///
/// 测试里暂停的时钟同样适用
struct Clock {
    wall_origin: i64,
    origin: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            wall_origin: chrono::Utc::now().timestamp_millis(),
            origin: Instant::now(),
        }
    }

    fn millis(&self, now: Instant) -> i64 {
        let elapsed = now.saturating_duration_since(self.origin).as_millis();
        self.wall_origin + i64::try_from(elapsed).unwrap_or(i64::MAX - self.wall_origin)
    }
}

/// 播放器
pub struct Player {
    config: Config,
    player_config: PlayerConfig,
    gate: SessionGate,
    unit: Option<UnitCtx>,
    keyboard: Debouncer,
    state_debounce: Debouncer,
    baseline: Option<Baseline>,
    outbox: Vec<Notification>,
    has_focus: bool,
    message_box: Option<MessageBox>,
    pointer: Option<PointerTarget>,
    unit_script: Option<UnitScript>,
    clock: Clock,
}

impl Player {
    pub fn new(config: Config) -> Self {
        let player_config = PlayerConfig::from_runtime(&config);
        Self {
            keyboard: Debouncer::new(player_config.debounce_keyboard_events),
            state_debounce: Debouncer::new(player_config.debounce_state_messages),
            player_config,
            config,
            gate: SessionGate::new(),
            unit: None,
            baseline: None,
            outbox: Vec::new(),
            has_focus: true,
            message_box: None,
            pointer: None,
            unit_script: None,
            clock: Clock::new(),
        }
    }

    /// 设置单元脚本：之后每次加载单元都会调用
    pub fn set_unit_script(&mut self, script: impl Fn(&mut UnitCtx) -> AppResult<()> + Send + 'static) {
        self.unit_script = Some(Box::new(script));
    }

    pub fn ready_notification(&self) -> Notification {
        Notification::Ready {
            metadata: PlayerMetadata::current(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &SessionGate {
        &self.gate
    }

    pub fn player_config(&self) -> &PlayerConfig {
        &self.player_config
    }

    pub fn unit(&self) -> Option<&UnitCtx> {
        self.unit.as_ref()
    }

    /// 宿主渲染器修改当前单元；修改产生的事件需要随后调用 [`sync_unit`](Self::sync_unit)
    pub fn unit_mut(&mut self) -> Option<&mut UnitCtx> {
        self.unit.as_mut()
    }

    /// 取走待发送的通知
    pub fn take_outbox(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    /// 最近的定时器截止时间
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.keyboard.deadline(), self.state_debounce.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// 当前单元状态（不经过防抖，不影响差量基线）
    pub fn current_unit_state(&mut self) -> Option<UnitState> {
        self.unit.as_mut().map(UnitCtx::unit_state)
    }

    // ========== 入站消息 ==========

    /// 处理一条原始消息
    ///
    /// 不是 JSON 的消息被丢弃；已知类型但字段不合法的命令以
    /// `message-malformed` 报告给宿主。
    pub fn handle_message(&mut self, raw: &str, now: Instant) {
        match parse_command(raw) {
            Ok(Some(command)) => self.handle_command(command, now),
            Ok(None) => {}
            Err(e) => match &e {
                AppError::Protocol(ProtocolError::MalformedCommand { session_id, .. }) => {
                    warn!("⚠️ {}", e);
                    self.outbox.push(Notification::RuntimeError {
                        session_id: session_id.clone(),
                        code: e.runtime_code().to_string(),
                        message: Some(e.to_string()),
                    });
                }
                _ => warn!("⚠️ 无法解析的消息已忽略: {}", e),
            },
        }
    }

    pub fn handle_command(&mut self, command: Command, now: Instant) {
        debug!("收到 {} (会话 {:?})", command.type_name(), command.session_id());
        if let Command::Start(start) = command {
            self.handle_start(start, now);
            return;
        }
        if !self.gate.admits(command.session_id()) {
            return;
        }

        match command {
            Command::Start(_) => {}
            Command::Stop { .. } => {
                if self.gate.stop() {
                    info!("单元已停止 {}", self.gate.state());
                }
            }
            Command::Continue { .. } => {
                if self.gate.resume() {
                    info!("单元继续 {}", self.gate.state());
                }
            }
            Command::PageNavigation { target, .. } => self.navigate_to_page(&target, now),
            Command::PlayerConfigChanged { player_config, .. } => {
                let changes = self.player_config.apply(&player_config);
                if changes.debounce {
                    self.keyboard.set_window(self.player_config.debounce_keyboard_events);
                    self.state_debounce.set_window(self.player_config.debounce_state_messages);
                }
                if changes.paging_mode {
                    if let Some(unit) = self.unit.as_mut() {
                        unit.set_paging_mode(self.player_config.paging_mode);
                    }
                }
                self.schedule_state(now);
            }
            Command::GetStateRequest { stop, .. } => {
                self.respond_state(now);
                if stop && self.gate.stop() {
                    info!("应宿主请求停止 {}", self.gate.state());
                }
            }
            Command::NavigationDenied { reason, .. } => {
                self.show_denial(&reason.unwrap_or_default());
            }
        }
    }

    fn handle_start(&mut self, start: StartCommand, now: Instant) {
        let session_id = start.session_id.clone();
        let (unit, player_config) = match self.prepare_unit(&start) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("⚠️ Start 被拒绝: {}", e);
                self.outbox.push(Notification::RuntimeError {
                    session_id: Some(session_id),
                    code: e.runtime_code().to_string(),
                    message: Some(e.to_string()),
                });
                return;
            }
        };

        // 换单元：旧实例和它排定的定时器一起丢弃
        self.keyboard.cancel();
        self.state_debounce.cancel();
        self.keyboard.set_window(player_config.debounce_keyboard_events);
        self.state_debounce.set_window(player_config.debounce_state_messages);
        self.player_config = player_config;
        self.unit = Some(unit);
        self.baseline = None;
        self.message_box = None;
        self.pointer = None;
        self.gate.start(session_id);

        if let (Some(script), Some(unit)) = (&self.unit_script, self.unit.as_mut()) {
            if let Err(e) = script(unit) {
                warn!("⚠️ 单元脚本执行失败: {}", e);
            }
        }
        self.sync_unit(now);
        self.schedule_state(now);
    }

    /// 校验并加载单元，不修改播放器的任何状态
    fn prepare_unit(&self, start: &StartCommand) -> AppResult<(UnitCtx, PlayerConfig)> {
        let definition = start
            .unit_definition
            .as_deref()
            .ok_or(ProtocolError::UnitDefinitionMissing)?;

        let definition_type = start.unit_definition_type.as_deref();
        check_unit_definition_type(definition_type).map_err(|reason| {
            warn!("⚠️ unitDefinitionType {:?}: {}", definition_type, reason);
            ProtocolError::UnitDefinitionTypeUnsupported {
                given: definition_type.unwrap_or_default().to_string(),
            }
        })?;

        let state_type = start
            .unit_state
            .as_ref()
            .and_then(|s| s.unit_state_data_type.as_deref());
        check_unit_state_data_type(state_type).map_err(|reason| {
            warn!("⚠️ unitStateDataType {:?}: {}", state_type, reason);
            ProtocolError::UnitStateTypeUnsupported {
                given: state_type.unwrap_or_default().to_string(),
            }
        })?;

        let mut player_config = PlayerConfig::from_runtime(&self.config);
        if let Some(patch) = &start.player_config {
            player_config.apply(patch);
        }

        let validation = ResponseValidation::from_flag(self.config.strict_response_validation);
        let unit = UnitCtx::load(definition, start.unit_state.as_ref(), &player_config, validation)?;
        Ok((unit, player_config))
    }

    fn navigate_to_page(&mut self, target: &str, now: Instant) {
        let Some(unit) = self.unit.as_mut() else {
            return;
        };
        let Some(index) = unit.pager().page_index(target) else {
            warn!("⚠️ 页面 {} 不存在", target);
            return;
        };
        if let Err(e) = unit.go_to_page(index) {
            warn!("⚠️ 翻页失败: {}", e);
            return;
        }
        self.schedule_state(now);
    }

    fn show_denial(&mut self, reasons: &[DenialReason]) {
        let Some(unit) = self.unit.as_ref() else {
            return;
        };
        let message_box = unit.denial(reasons);
        info!("导航被拒绝，显示 {} 条提示", message_box.entries.len());
        self.pointer = None;
        self.message_box = (!message_box.entries.is_empty()).then_some(message_box);
    }

    // ========== 界面操作 ==========

    pub fn handle_ui(&mut self, action: UiAction, now: Instant) {
        if let UiAction::WindowFocus(has_focus) = action {
            if has_focus != self.has_focus {
                self.has_focus = has_focus;
                self.outbox.push(Notification::WindowFocusChanged {
                    time_stamp: self.clock.millis(now),
                    has_focus,
                });
            }
            return;
        }
        if self.unit.is_none() {
            debug!("没有单元，忽略界面操作 {:?}", action);
            return;
        }
        if !self.gate.is_running() && !action.allowed_while_stopped() {
            debug!("单元已停止，忽略界面操作 {:?}", action);
            return;
        }

        match self.apply_ui(action, now) {
            Ok(true) => self.schedule_state(now),
            Ok(false) => {}
            Err(e) => warn!("⚠️ 界面操作失败: {}", e),
        }
        self.sync_unit(now);
    }

    /// 执行界面操作
    ///
    /// # 返回
    /// 是否需要排定一次状态上报
    fn apply_ui(&mut self, action: UiAction, now: Instant) -> AppResult<bool> {
        let time_stamp = self.clock.millis(now);
        let Some(unit) = self.unit.as_mut() else {
            return Ok(false);
        };
        let schedule = match action {
            UiAction::Log {
                level,
                key,
                content,
            } => unit
                .log_mut()
                .push(self.player_config.log_policy, level, key, content, time_stamp),
            UiAction::ExtensionChanged => true,
            UiAction::NextPage => unit.pager().page_nav().next_enabled && unit.next_page()?,
            UiAction::PreviousPage => {
                unit.pager().page_nav().previous_enabled && unit.previous_page()?
            }
            UiAction::UnitNavigation(target) => {
                if let Some(session_id) = self.gate.session_id() {
                    if self.player_config.is_target_enabled(target) {
                        self.outbox.push(Notification::UnitNavigationRequested {
                            session_id: session_id.to_string(),
                            target,
                        });
                    }
                }
                false
            }
            UiAction::FollowMessage(index) => {
                let target = self
                    .message_box
                    .as_ref()
                    .and_then(|b| b.entries.get(index))
                    .map(|entry| entry.target.clone());
                match target {
                    Some(target) => {
                        unit.reveal(&target)?;
                        self.pointer = Some(target);
                        true
                    }
                    None => false,
                }
            }
            UiAction::CloseMessage => {
                self.message_box = None;
                self.pointer = None;
                false
            }
            other => {
                unit.interact(&other)?;
                false
            }
        };
        Ok(schedule)
    }

    /// 处理单元文档里积累的事件
    pub fn sync_unit(&mut self, now: Instant) {
        let Some(unit) = self.unit.as_mut() else {
            return;
        };
        let changes = unit.drain_changes();
        if changes.is_empty() {
            return;
        }
        let mut qualifying = false;
        if changes.keyboard && self.keyboard.trigger(now) {
            unit.settle();
            qualifying = true;
        }
        if changes.values {
            unit.settle();
            qualifying = true;
        }
        if changes.layout {
            unit.observe();
            qualifying = true;
        }
        if qualifying {
            self.schedule_state(now);
        }
    }

    // ========== 定时器与状态上报 ==========

    /// 定时器到期
    pub fn on_timer(&mut self, now: Instant) {
        if self.keyboard.poll(now) {
            if let Some(unit) = self.unit.as_mut() {
                unit.settle();
            }
            self.schedule_state(now);
        }
        if self.state_debounce.poll(now) {
            self.flush_state(now);
        }
    }

    fn schedule_state(&mut self, now: Instant) {
        if self.state_debounce.trigger(now) {
            self.flush_state(now);
        }
    }

    /// 发出差量状态消息（仅 eager 策略）
    fn flush_state(&mut self, now: Instant) {
        if self.player_config.state_report_policy != StateReportPolicy::Eager {
            return;
        }
        let Some(session_id) = self.gate.session_id().map(str::to_string) else {
            return;
        };
        let Some(unit) = self.unit.as_mut() else {
            return;
        };

        let unit_state = unit.unit_state();
        let player_state = unit.player_state();
        let log = if unit.log_mut().has_pending() {
            unit.log_mut().drain(self.player_config.log_policy)
        } else {
            None
        };
        let (unit_changed, player_changed) = match &self.baseline {
            Some(baseline) => (
                baseline.unit_state != unit_state,
                baseline.player_state != player_state,
            ),
            None => (true, true),
        };
        if !unit_changed && !player_changed && log.is_none() {
            debug!("状态没有变化，不发送");
            return;
        }

        self.outbox.push(Notification::StateChanged(StateMessage {
            session_id,
            time_stamp: self.clock.millis(now),
            unit_state: unit_changed.then(|| unit_state.clone()),
            player_state: player_changed.then(|| player_state.clone()),
            log,
        }));
        self.baseline = Some(Baseline {
            unit_state,
            player_state,
        });
    }

    /// 回应 GetStateRequest：总是完整状态
    fn respond_state(&mut self, now: Instant) {
        let Some(session_id) = self.gate.session_id().map(str::to_string) else {
            return;
        };
        let Some(unit) = self.unit.as_mut() else {
            return;
        };
        let message = StateMessage {
            session_id,
            time_stamp: self.clock.millis(now),
            unit_state: Some(unit.unit_state()),
            player_state: Some(unit.player_state()),
            log: unit.log_mut().drain(self.player_config.log_policy),
        };
        self.outbox.push(Notification::GetStateResponse(message));
    }

    // ========== 界面状态 ==========

    pub fn ui_state(&self) -> UiState {
        let config = &self.player_config;
        let pager = self.unit.as_ref().map(UnitCtx::pager);
        UiState {
            overlay: self.gate.is_stopped(),
            has_focus: self.has_focus,
            paging_mode: config.paging_mode,
            current_page: pager.and_then(|p| p.current_page()),
            visible_pages: pager.map(|p| p.visible_pages()).unwrap_or_default(),
            page_nav: pager.map(|p| p.page_nav()).unwrap_or_default(),
            unit_nav: UnitNavButtons {
                enabled: config.enabled_navigation_targets.clone(),
            },
            unit_info: UnitInfo {
                unit_id: config.unit_id.clone(),
                unit_title: config.unit_title.clone(),
                unit_number: config.unit_number.clone(),
                direct_download_url: config.direct_download_url.clone(),
            },
            break_after_pages: config.print_mode != PrintMode::Off,
            name_hints: match (config.print_mode, self.unit.as_ref()) {
                (PrintMode::OnWithIds, Some(unit)) => unit.registry().name_hints(),
                _ => Vec::new(),
            },
            message_box: self.message_box.clone(),
            pointer: self.pointer.clone(),
        }
    }
}
