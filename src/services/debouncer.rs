//! 防抖 - 业务能力层
//!
//! 尾沿防抖：每次触发都把截止时间推迟到 `now + window`，
//! 截止时间到达且期间没有新的触发时才放行一次。窗口为 0 时同步放行。
//!
//! 这里只记录截止时间，不持有定时器；由调用方在 [`deadline`](Debouncer::deadline)
//! 到达时调用 [`poll`](Debouncer::poll)。

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// 修改窗口，不影响已经排定的截止时间
    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    /// 记录一次触发
    ///
    /// # 返回
    /// 窗口为 0 时返回 `true`，表示调用方应立即执行
    pub fn trigger(&mut self, now: Instant) -> bool {
        if self.window.is_zero() {
            self.deadline = None;
            return true;
        }
        self.deadline = Some(now + self.window);
        false
    }

    /// 截止时间已到则放行并清除
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_window_fires_synchronously() {
        let mut debouncer = Debouncer::new(Duration::ZERO);
        assert!(debouncer.trigger(Instant::now()));
        assert!(!debouncer.is_pending());
    }

    #[test]
    fn test_trailing_edge_restart() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(150));
        assert!(!debouncer.trigger(start));
        assert!(!debouncer.trigger(start + Duration::from_millis(50)));

        assert!(!debouncer.poll(start + Duration::from_millis(150)));
        assert_eq!(debouncer.deadline(), Some(start + Duration::from_millis(200)));
        assert!(debouncer.poll(start + Duration::from_millis(200)));
        assert!(!debouncer.poll(start + Duration::from_millis(400)));
    }

    #[test]
    fn test_cancel_drops_pending() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(Duration::from_millis(10));
        debouncer.trigger(start);
        debouncer.cancel();
        assert!(!debouncer.poll(start + Duration::from_secs(1)));
    }
}
