//! 触摸开关：跟随设置项 touch_sensor_switch 启用 / 禁用触摸处理

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::core::DeviceError;
use crate::device::{keys, SettingsStore};
use crate::touch::TouchInput;

/// 从存储读取开关并应用；键不存在时用默认值，读取失败时保持现状
pub fn sync_switch(touch: &TouchInput, store: &dyn SettingsStore) {
    match store.get(keys::TOUCH_SENSOR_SWITCH) {
        Ok(value) => touch.set_enabled(value != 0),
        Err(DeviceError::KeyNotFound(_)) => touch.set_enabled(touch.default_enabled()),
        Err(e) => tracing::warn!(error = %e, "Failed to read touch sensor switch"),
    }
}

/// 订阅存储变更，开关键被写入时重新同步
pub fn spawn_switch_watcher(
    touch: Arc<TouchInput>,
    store: Arc<dyn SettingsStore>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut rx = store.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Ok(event) if event.key == keys::TOUCH_SENSOR_SWITCH => {
                        touch.set_enabled(event.value != 0);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Store events lagged, re-reading touch switch");
                        sync_switch(&touch, store.as_ref());
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!("Touch switch watcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmScheduler;
    use crate::config::AlarmSection;
    use crate::core::ChatState;
    use crate::device::{
        DisplayHandle, MemoryStore, SimulatedAgent, SimulatedAudio, SimulatedExpression,
        SimulatedLed, SimulatedScreen,
    };
    use std::time::Duration;
    use tokio::runtime::Handle;

    fn touch(default_enabled: bool) -> Arc<TouchInput> {
        let alarm = AlarmScheduler::new(
            Arc::new(SimulatedAudio::new(Duration::from_millis(10))),
            DisplayHandle::new(SimulatedScreen::new()),
            AlarmSection::default(),
            Handle::current(),
        );
        Arc::new(TouchInput::new(
            Arc::new(SimulatedAgent::new(0, ChatState::Started)),
            Arc::new(SimulatedExpression::new()),
            Arc::new(SimulatedLed::new(50)),
            alarm,
            default_enabled,
        ))
    }

    #[tokio::test]
    async fn test_sync_reads_store_or_default() {
        let t = touch(true);
        let store = MemoryStore::new().with_value(keys::TOUCH_SENSOR_SWITCH, 0);
        sync_switch(&t, &store);
        assert!(!t.is_enabled());

        let empty = MemoryStore::new();
        sync_switch(&t, &empty);
        assert!(t.is_enabled());

        let broken = MemoryStore::new();
        broken.set_fail_reads(true);
        t.set_enabled(false);
        sync_switch(&t, &broken);
        assert!(!t.is_enabled());
    }

    #[tokio::test]
    async fn test_watcher_follows_store_updates() {
        let t = touch(true);
        let store = Arc::new(MemoryStore::new());
        let shutdown = CancellationToken::new();
        let handle = spawn_switch_watcher(t.clone(), store.clone(), shutdown.clone());

        store.set(keys::VOLUME, 30).unwrap();
        store.set(keys::TOUCH_SENSOR_SWITCH, 0).unwrap();
        for _ in 0..50 {
            if !t.is_enabled() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!t.is_enabled());

        shutdown.cancel();
        handle.await.unwrap();
    }
}
