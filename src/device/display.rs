//! 显示锁
//!
//! 显示子系统被函数 worker、角色切换与触摸回调共享，是核心中唯一需要互斥的资源。
//! `lock()` 返回 RAII guard，任何提前返回路径都会自动释放。

use std::sync::{Arc, Mutex, MutexGuard};

use crate::device::Screen;

/// 可克隆的显示句柄
#[derive(Clone)]
pub struct DisplayHandle {
    screen: Arc<Mutex<Box<dyn Screen>>>,
}

impl DisplayHandle {
    pub fn new(screen: impl Screen + 'static) -> Self {
        Self {
            screen: Arc::new(Mutex::new(Box::new(screen))),
        }
    }

    /// 获取显示锁。触摸回调在同步上下文中调用，因此使用阻塞锁；持锁期间不得 await。
    pub fn lock(&self) -> MutexGuard<'_, Box<dyn Screen>> {
        self.screen.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Display lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl std::fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayHandle").finish_non_exhaustive()
    }
}
