//! 消息通道 - 基础设施层
//!
//! 宿主与播放器之间"一条 JSON 对象一条消息"的传输端口。
//! 播放器只依赖 [`Transport`] trait，具体是进程内通道还是标准输入输出由调用方决定。

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{AppResult, TransportError};

/// 传输端口
///
/// 职责：
/// - 显式的生命周期（`attach` / `detach`），未连接时收发都会报错
/// - `recv` 返回 `Ok(None)` 表示对端已关闭
/// - 不解析消息内容
#[allow(async_fn_in_trait)]
pub trait Transport {
    fn attach(&mut self) -> AppResult<()>;

    fn detach(&mut self);

    fn is_attached(&self) -> bool;

    /// 接收下一条消息
    async fn recv(&mut self) -> AppResult<Option<String>>;

    /// 发送一条消息
    async fn post(&mut self, message: &str) -> AppResult<()>;
}

// ========== 进程内通道 ==========

/// 基于 tokio mpsc 的进程内传输，主要用于测试和嵌入
pub struct ChannelTransport {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
    attached: bool,
}

/// 通道的宿主一端
pub struct HostEndpoint {
    sender: mpsc::UnboundedSender<String>,
    receiver: mpsc::UnboundedReceiver<String>,
}

impl ChannelTransport {
    /// 创建一对相连的端点
    pub fn pair() -> (ChannelTransport, HostEndpoint) {
        let (host_tx, player_rx) = mpsc::unbounded_channel();
        let (player_tx, host_rx) = mpsc::unbounded_channel();
        (
            ChannelTransport {
                inbound: player_rx,
                outbound: player_tx,
                attached: false,
            },
            HostEndpoint {
                sender: host_tx,
                receiver: host_rx,
            },
        )
    }
}

impl Transport for ChannelTransport {
    fn attach(&mut self) -> AppResult<()> {
        self.attached = true;
        Ok(())
    }

    fn detach(&mut self) {
        self.attached = false;
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    async fn recv(&mut self) -> AppResult<Option<String>> {
        if !self.attached {
            return Err(TransportError::Detached.into());
        }
        Ok(self.inbound.recv().await)
    }

    async fn post(&mut self, message: &str) -> AppResult<()> {
        if !self.attached {
            return Err(TransportError::Detached.into());
        }
        self.outbound
            .send(message.to_string())
            .map_err(|_| TransportError::Closed.into())
    }
}

impl HostEndpoint {
    /// 向播放器发送一条原始消息
    pub fn send_raw(&self, message: impl Into<String>) -> AppResult<()> {
        self.sender
            .send(message.into())
            .map_err(|_| TransportError::Closed.into())
    }

    /// 向播放器发送一条 JSON 消息
    pub fn send(&self, message: &serde_json::Value) -> AppResult<()> {
        self.send_raw(message.to_string())
    }

    /// 等待播放器的下一条消息
    pub async fn recv(&mut self) -> Option<serde_json::Value> {
        let raw = self.receiver.recv().await?;
        serde_json::from_str(&raw).ok()
    }

    /// 取出已经到达的消息，不等待
    pub fn try_recv(&mut self) -> Option<serde_json::Value> {
        let raw = self.receiver.try_recv().ok()?;
        serde_json::from_str(&raw).ok()
    }
}

// ========== 按行分隔的流 ==========

/// 每行一条 JSON 消息的流式传输（标准输入输出）
pub struct LineTransport<R, W> {
    reader: R,
    writer: W,
    attached: bool,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            attached: false,
        }
    }
}

impl LineTransport<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// 绑定到进程的标准输入输出
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    fn attach(&mut self) -> AppResult<()> {
        self.attached = true;
        Ok(())
    }

    fn detach(&mut self) {
        self.attached = false;
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    async fn recv(&mut self) -> AppResult<Option<String>> {
        if !self.attached {
            return Err(TransportError::Detached.into());
        }
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|source| TransportError::ReadFailed { source })?;
            if read == 0 {
                return Ok(None);
            }
            // 非 UTF-8 的行丢弃，后续消息照常处理
            let line = match String::from_utf8(std::mem::take(&mut buf)) {
                Ok(line) => line,
                Err(e) => {
                    warn!("⚠️ 丢弃非 UTF-8 消息 ({} 字节): {}", read, e.utf8_error());
                    continue;
                }
            };
            let line = line.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                debug!("跳过空行");
                continue;
            }
            return Ok(Some(line.to_string()));
        }
    }

    async fn post(&mut self, message: &str) -> AppResult<()> {
        if !self.attached {
            return Err(TransportError::Detached.into());
        }
        let line = format!("{}\n", message);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[tokio::test]
    async fn test_channel_pair_round_trip() {
        let (mut transport, mut host) = ChannelTransport::pair();
        transport.attach().unwrap();

        host.send(&serde_json::json!({"type": "vopStopCommand", "sessionId": "1"}))
            .unwrap();
        let received = transport.recv().await.unwrap().unwrap();
        assert!(received.contains("vopStopCommand"));

        transport.post(r#"{"type":"vopReadyNotification"}"#).await.unwrap();
        let reply = host.recv().await.unwrap();
        assert_eq!(reply["type"], "vopReadyNotification");
    }

    #[tokio::test]
    async fn test_detached_transport_refuses() {
        let (mut transport, _host) = ChannelTransport::pair();
        assert!(matches!(
            transport.post("{}").await,
            Err(AppError::Transport(TransportError::Detached))
        ));
        transport.attach().unwrap();
        transport.detach();
        assert!(!transport.is_attached());
        assert!(transport.recv().await.is_err());
    }

    #[tokio::test]
    async fn test_line_transport_over_mock_io() {
        let reader = tokio_test::io::Builder::new()
            .read(b"{\"type\":\"vopStopCommand\"}\n\n{\"type\":\"vopContinueCommand\"}\n")
            .build();
        let writer = tokio_test::io::Builder::new()
            .write(b"{\"type\":\"vopReadyNotification\"}\n")
            .build();
        let mut transport = LineTransport::new(BufReader::new(reader), writer);
        transport.attach().unwrap();

        assert_eq!(
            transport.recv().await.unwrap().as_deref(),
            Some(r#"{"type":"vopStopCommand"}"#)
        );
        assert_eq!(
            transport.recv().await.unwrap().as_deref(),
            Some(r#"{"type":"vopContinueCommand"}"#)
        );
        assert_eq!(transport.recv().await.unwrap(), None);

        transport
            .post(r#"{"type":"vopReadyNotification"}"#)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_line_transport_skips_invalid_utf8() {
        let reader = tokio_test::io::Builder::new()
            .read(&[0xff, 0xfe, b'\n'])
            .read(b"{\"type\":\"vopStopCommand\"}\r\n")
            .build();
        let writer = tokio_test::io::Builder::new().build();
        let mut transport = LineTransport::new(BufReader::new(reader), writer);
        transport.attach().unwrap();

        assert_eq!(
            transport.recv().await.unwrap().as_deref(),
            Some(r#"{"type":"vopStopCommand"}"#)
        );
        assert_eq!(transport.recv().await.unwrap(), None);
    }
}
