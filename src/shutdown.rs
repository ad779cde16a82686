use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

/// 进程级关闭信号
///
/// 维护服务与 Worker 各自持有一个接收器，触发后结束循环。
/// 触发之后才订阅的接收器会立即收到信号。
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
    fired: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        let rx = self.sender.subscribe();
        if !self.fired.load(Ordering::SeqCst) {
            return rx;
        }
        let (tx, rx) = broadcast::channel(1);
        let _ = tx.send(());
        rx
    }

    /// 只有第一次调用会广播，返回本次是否触发
    pub fn trigger(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        // 没有订阅者时发送失败，忽略
        let receivers = self.sender.send(()).unwrap_or(0);
        info!("关闭信号已发送给 {} 个订阅者", receivers);
        true
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_all_subscribers_receive_signal_once() {
        let signal = ShutdownSignal::new();
        let mut maintenance = signal.subscribe();
        let mut worker = signal.subscribe();

        assert!(signal.trigger());
        assert!(!signal.trigger());

        assert!(matches!(
            timeout(Duration::from_millis(100), maintenance.recv()).await,
            Ok(Ok(()))
        ));
        assert!(matches!(
            timeout(Duration::from_millis(100), worker.recv()).await,
            Ok(Ok(()))
        ));
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_fired_signal() {
        let signal = ShutdownSignal::new();
        signal.trigger();

        let mut rx = signal.clone().subscribe();
        assert!(matches!(
            timeout(Duration::from_millis(100), rx.recv()).await,
            Ok(Ok(()))
        ));
    }
}
