//! 优雅关闭
//!
//! 统一监听关闭信号并依次执行清理：
//! - 前台 App 退出（恢复原智能体角色）
//! - 解除正在等待或响铃的闹钟
//! - 触摸循环、存储订阅等后台任务通过 token 退出

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::alarm::AlarmScheduler;
use crate::apps::App;

/// 单个清理任务的超时（秒）
const CLEANUP_TIMEOUT_SECS: u64 = 5;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
}

/// 关闭原因
#[derive(Debug, Clone)]
pub enum ShutdownReason {
    /// 用户发起的退出 (Ctrl+C 或 quit 命令)
    UserInitiated,
    /// SIGTERM 信号
    Signal,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            shutdown_token: CancellationToken::new(),
        }
    }

    /// 获取关闭 token（传给后台任务）
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// 触发关闭
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        tracing::info!(?reason, "Shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭时需要执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    /// 清理任务名称（用于日志）
    fn name(&self) -> &'static str;
}

/// 关闭协调器：按注册顺序执行清理任务，每个任务有超时
pub struct ShutdownCoordinator {
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout_secs: u64,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            cleanup_tasks: Vec::new(),
            timeout_secs: CLEANUP_TIMEOUT_SECS,
        }
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    pub async fn run_cleanup(&self) {
        tracing::info!("Running {} cleanup tasks...", self.cleanup_tasks.len());

        let timeout = tokio::time::Duration::from_secs(self.timeout_secs);

        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(timeout, task.cleanup()).await {
                Ok(Ok(())) => {
                    tracing::info!("Cleanup task '{}' completed successfully", name);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Cleanup task '{}' failed: {}", name, e);
                }
                Err(_) => {
                    tracing::warn!("Cleanup task '{}' timed out after {}s", name, self.timeout_secs);
                }
            }
        }

        tracing::info!("All cleanup tasks finished");
    }
}

/// 退出前台 App（英语学习 App 会恢复原智能体角色）
pub struct AppCleanup {
    app: Arc<dyn App>,
}

impl AppCleanup {
    pub fn new(app: Arc<dyn App>) -> Self {
        Self { app }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for AppCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        self.app.close().await;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "App"
    }
}

/// 解除闹钟并停止播放
pub struct AlarmCleanup {
    alarm: AlarmScheduler,
}

impl AlarmCleanup {
    pub fn new(alarm: AlarmScheduler) -> Self {
        Self { alarm }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for AlarmCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        if self.alarm.dismiss() {
            tracing::info!("Pending alarm dismissed on shutdown");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Alarm"
    }
}

/// 运行主应用直到结束或收到关闭信号，然后执行清理
pub async fn run_with_graceful_shutdown<F, Fut>(
    shutdown_manager: Arc<ShutdownManager>,
    app: F,
    cleanup: impl FnOnce() -> Fut,
) where
    F: Future<Output = ()>,
    Fut: Future<Output = ()>,
{
    shutdown_manager.install_signal_handlers();

    tokio::select! {
        _ = app => {
            tracing::info!("Application finished normally");
        }
        _ = shutdown_manager.wait_for_shutdown() => {
            tracing::info!("Shutdown signal received");
        }
    }

    cleanup().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlarmSection;
    use crate::device::{DisplayHandle, SimulatedAudio, SimulatedScreen};
    use std::time::Duration;

    #[test]
    fn test_shutdown_manager_token() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        assert!(!manager.is_shutdown());
        manager.shutdown(ShutdownReason::UserInitiated);
        assert!(manager.is_shutdown());
        assert!(token.is_cancelled());

        manager.shutdown(ShutdownReason::Signal);
        assert!(manager.is_shutdown());
    }

    struct MockCleanup {
        called: Arc<std::sync::atomic::AtomicBool>,
    }

    #[async_trait::async_trait]
    impl ShutdownCleanup for MockCleanup {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.called.store(true, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "MockCleanup"
        }
    }

    #[tokio::test]
    async fn test_coordinator_runs_cleanups() {
        let mut coordinator = ShutdownCoordinator::new();

        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        coordinator.register(MockCleanup { called: called.clone() });

        coordinator.run_cleanup().await;
        assert!(called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_alarm_cleanup_dismisses_pending_alarm() {
        let alarm = AlarmScheduler::new(
            Arc::new(SimulatedAudio::new(Duration::from_millis(10))),
            DisplayHandle::new(SimulatedScreen::new()),
            AlarmSection::default(),
            tokio::runtime::Handle::current(),
        );
        alarm.arm(60).unwrap();

        let mut coordinator = ShutdownCoordinator::new();
        coordinator.register(AlarmCleanup::new(alarm.clone()));
        coordinator.run_cleanup().await;
        assert!(!alarm.is_active());
    }
}
