//! 运行循环 - 编排层
//!
//! ## 职责
//!
//! 把 [`Player`] 接到真实的事件源上：
//!
//! 1. **宿主消息**：从 [`Transport`] 读取，交给 `Player::handle_message`
//! 2. **界面操作**：渲染协作方通过 [`UiHandle`] 转交
//! 3. **定时器**：按 `Player::next_deadline` 睡眠，到期调用 `Player::on_timer`
//!
//! 每处理完一个事件就把发件箱里的通知写回宿主。宿主关闭通道时循环结束。

use futures::future::OptionFuture;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info};

use crate::error::{AppResult, TransportError};
use crate::infrastructure::Transport;
use crate::models::ui::UiAction;
use crate::orchestrator::player::Player;

/// 渲染协作方持有的句柄，用来转交界面操作
#[derive(Clone)]
pub struct UiHandle {
    sender: mpsc::UnboundedSender<UiAction>,
}

impl UiHandle {
    pub fn send(&self, action: UiAction) -> AppResult<()> {
        self.sender
            .send(action)
            .map_err(|_| TransportError::Closed.into())
    }
}

enum Event {
    Host(Option<String>),
    Ui(Option<UiAction>),
    Timer,
}

/// 播放器运行循环
pub struct Runtime<T: Transport> {
    player: Player,
    transport: T,
    ui_rx: mpsc::UnboundedReceiver<UiAction>,
    delay_ready: Duration,
}

impl<T: Transport> Runtime<T> {
    pub fn new(player: Player, transport: T) -> (Self, UiHandle) {
        let (sender, ui_rx) = mpsc::unbounded_channel();
        let runtime = Self {
            delay_ready: player.config().delay_ready_notification(),
            player,
            transport,
            ui_rx,
        };
        (runtime, UiHandle { sender })
    }

    /// 运行直到宿主关闭通道
    ///
    /// # 返回
    /// 结束时的播放器，便于检查最终状态
    pub async fn run(mut self) -> AppResult<Player> {
        self.transport.attach()?;
        if !self.delay_ready.is_zero() {
            sleep(self.delay_ready).await;
        }
        let ready = self.player.ready_notification();
        self.transport.post(&ready.to_json()?).await?;
        info!("✓ 播放器就绪");

        let mut ui_open = true;
        loop {
            let timer: OptionFuture<_> = self.player.next_deadline().map(sleep_until).into();
            let event = tokio::select! {
                message = self.transport.recv() => Event::Host(message?),
                action = self.ui_rx.recv(), if ui_open => Event::Ui(action),
                Some(()) = timer => Event::Timer,
            };

            let now = Instant::now();
            match event {
                Event::Host(Some(raw)) => self.player.handle_message(&raw, now),
                Event::Host(None) => {
                    info!("宿主已关闭通道，退出");
                    break;
                }
                Event::Ui(Some(action)) => self.player.handle_ui(action, now),
                Event::Ui(None) => {
                    debug!("界面句柄已全部释放");
                    ui_open = false;
                }
                Event::Timer => self.player.on_timer(now),
            }
            self.flush_outbox().await?;
        }

        self.transport.detach();
        Ok(self.player)
    }

    async fn flush_outbox(&mut self) -> AppResult<()> {
        for notification in self.player.take_outbox() {
            debug!("发送 {}", notification.type_name());
            self.transport.post(&notification.to_json()?).await?;
        }
        Ok(())
    }
}
