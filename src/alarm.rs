//! 闹钟调度：Idle → Armed → Ringing → Idle
//!
//! arm 之后由一个后台延时任务计时；到点时若未被取消，则切到闹钟画面并启动循环播放任务。
//! 每个闹钟持有一个 CancellationToken，dismiss（仅由触摸交互调用）取消它、停止播放并恢复原画面。
//! 同一时间最多一个闹钟；已有闹钟时再次 arm 返回 AlreadyArmed。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::config::AlarmSection;
use crate::core::AlarmError;
use crate::device::{AudioPlayer, DisplayHandle, SurfaceId};

/// 闹钟阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlarmPhase {
    Idle,
    Armed,
    Ringing,
}

#[derive(Debug)]
struct AlarmSlot {
    generation: u64,
    token: CancellationToken,
    phase: AlarmPhase,
    surface: Option<SurfaceId>,
    prev_surface: Option<SurfaceId>,
}

struct AlarmInner {
    audio: Arc<dyn AudioPlayer>,
    display: DisplayHandle,
    config: AlarmSection,
    runtime: Handle,
    slot: Mutex<Option<AlarmSlot>>,
    next_generation: AtomicU64,
}

/// 闹钟调度器（可克隆，克隆共享同一个闹钟）
#[derive(Clone)]
pub struct AlarmScheduler {
    inner: Arc<AlarmInner>,
}

impl AlarmScheduler {
    pub fn new(
        audio: Arc<dyn AudioPlayer>,
        display: DisplayHandle,
        config: AlarmSection,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(AlarmInner {
                audio,
                display,
                config,
                runtime,
                slot: Mutex::new(None),
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// 设置闹钟：delay_secs 秒后开始响铃
    pub fn arm(&self, delay_secs: i64) -> Result<(), AlarmError> {
        if delay_secs <= 0 {
            tracing::warn!(delay_secs, "Alarm delay must be a positive number of seconds");
            return Err(AlarmError::InvalidDelay(delay_secs));
        }

        // 超出 chrono 可表示范围时只记录秒数
        let rings_at = chrono::Duration::try_seconds(delay_secs)
            .and_then(|d| chrono::Local::now().checked_add_signed(d))
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| format!("+{delay_secs}s"));

        let token = CancellationToken::new();
        let generation = {
            let mut slot = self.inner.slot();
            if slot.is_some() {
                tracing::warn!("Alarm already armed, request rejected");
                return Err(AlarmError::AlreadyArmed);
            }
            let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
            *slot = Some(AlarmSlot {
                generation,
                token: token.clone(),
                phase: AlarmPhase::Armed,
                surface: None,
                prev_surface: None,
            });
            generation
        };

        tracing::info!(
            rings_at = %rings_at,
            "Alarm set, ringing in {}s",
            delay_secs
        );

        let inner = Arc::clone(&self.inner);
        let delay = Duration::from_secs(delay_secs.unsigned_abs());
        self.inner
            .runtime
            .spawn(async move { inner.wait_and_ring(generation, token, delay).await });
        Ok(())
    }

    /// 解除闹钟：取消计时或响铃、停止播放、恢复原画面。无闹钟时什么也不做，返回 false
    pub fn dismiss(&self) -> bool {
        self.inner.dismiss(None)
    }

    pub fn state(&self) -> AlarmPhase {
        self.inner
            .slot()
            .as_ref()
            .map(|s| s.phase)
            .unwrap_or(AlarmPhase::Idle)
    }

    /// 是否有闹钟处于等待或响铃状态
    pub fn is_active(&self) -> bool {
        self.inner.slot().is_some()
    }
}

impl AlarmInner {
    fn slot(&self) -> MutexGuard<'_, Option<AlarmSlot>> {
        self.slot.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn wait_and_ring(self: Arc<Self>, generation: u64, token: CancellationToken, delay: Duration) {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("Alarm cancelled before ringing");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        if !self.begin_ringing(generation) {
            return;
        }
        tracing::info!(uri = %self.config.sound_uri, "Alarm ringing, waiting for touch to dismiss");

        let inner = Arc::clone(&self);
        self.runtime
            .spawn(async move { inner.ring_loop(generation, token).await });
    }

    /// Armed → Ringing，并显示闹钟画面；闹钟已被解除时返回 false
    fn begin_ringing(&self, generation: u64) -> bool {
        let mut guard = self.slot();
        let Some(slot) = guard.as_mut() else {
            return false;
        };
        if slot.generation != generation || slot.token.is_cancelled() {
            return false;
        }
        slot.phase = AlarmPhase::Ringing;

        let mut screen = self.display.lock();
        slot.prev_surface = screen.active_surface();
        match screen.create_alarm_surface() {
            Ok(surface) => slot.surface = Some(surface),
            Err(e) => tracing::warn!(error = %e, "Failed to show alarm screen, ringing anyway"),
        }
        true
    }

    async fn ring_loop(self: Arc<Self>, generation: u64, token: CancellationToken) {
        let started = tokio::time::Instant::now();
        let max_ring = self.config.max_ring_secs.map(Duration::from_secs);
        let timeout = self.config.play_timeout();

        while !token.is_cancelled() {
            tokio::select! {
                _ = token.cancelled() => break,
                result = self.audio.play_blocking(&self.config.sound_uri, timeout) => {
                    if let Err(e) = result {
                        tracing::warn!(error = %e, "Alarm playback failed");
                    }
                }
            }

            if let Some(max_ring) = max_ring {
                if started.elapsed() >= max_ring {
                    tracing::info!("Alarm rang for {}s without dismissal, stopping", max_ring.as_secs());
                    self.dismiss(Some(generation));
                    break;
                }
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.idle()) => {}
            }
        }
        tracing::debug!("Alarm ring loop finished");
    }

    /// 取走当前闹钟并清理；generation 为 Some 时只清理对应的那一个
    fn dismiss(&self, generation: Option<u64>) -> bool {
        let taken = {
            let mut guard = self.slot();
            match (guard.as_ref(), generation) {
                (None, _) => None,
                (Some(slot), Some(g)) if slot.generation != g => None,
                _ => guard.take(),
            }
        };
        let Some(slot) = taken else {
            tracing::debug!("No active alarm to dismiss");
            return false;
        };

        slot.token.cancel();
        self.audio.stop();

        if let Some(surface) = slot.surface {
            let mut screen = self.display.lock();
            if let Some(prev) = slot.prev_surface {
                screen.load_surface(prev);
            }
            screen.delete_surface(surface);
        }
        tracing::info!("Alarm dismissed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SimulatedAudio, SimulatedScreen};

    fn scheduler(config: AlarmSection) -> (AlarmScheduler, Arc<SimulatedAudio>, SimulatedScreen) {
        let audio = Arc::new(SimulatedAudio::new(Duration::from_secs(1)));
        let screen = SimulatedScreen::new();
        let alarm = AlarmScheduler::new(
            audio.clone(),
            DisplayHandle::new(screen.clone()),
            config,
            Handle::current(),
        );
        (alarm, audio, screen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_positive_delay_is_rejected() {
        let (alarm, audio, _) = scheduler(AlarmSection::default());
        assert_eq!(alarm.arm(0), Err(AlarmError::InvalidDelay(0)));
        assert_eq!(alarm.arm(-5), Err(AlarmError::InvalidDelay(-5)));
        assert_eq!(alarm.state(), AlarmPhase::Idle);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(audio.play_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_before_expiry_never_rings() {
        let (alarm, audio, screen) = scheduler(AlarmSection::default());
        alarm.arm(1).unwrap();
        assert_eq!(alarm.state(), AlarmPhase::Armed);
        assert!(alarm.dismiss());
        assert_eq!(alarm.state(), AlarmPhase::Idle);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(audio.play_count(), 0);
        assert_eq!(screen.record().alarm_surfaces_created, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alarm_rings_until_dismissed() {
        let (alarm, audio, screen) = scheduler(AlarmSection::default());
        alarm.arm(1).unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(alarm.state(), AlarmPhase::Ringing);
        assert!(audio.play_count() >= 1);
        let record = screen.record();
        assert_eq!(record.alarm_surfaces_created, 1);
        assert_eq!(record.active, Some(SurfaceId(1)));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(audio.play_count() >= 2);

        assert!(alarm.dismiss());
        assert_eq!(alarm.state(), AlarmPhase::Idle);
        assert!(audio.stop_count() >= 1);
        let record = screen.record();
        assert_eq!(record.active, Some(SurfaceId(0)));
        assert_eq!(record.deleted, vec![SurfaceId(1)]);

        let plays = audio.play_count();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(audio.play_count(), plays);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_is_idempotent() {
        let (alarm, audio, _) = scheduler(AlarmSection::default());
        assert!(!alarm.dismiss());
        assert_eq!(audio.stop_count(), 0);

        alarm.arm(3).unwrap();
        assert!(alarm.dismiss());
        assert!(!alarm.dismiss());
        assert_eq!(audio.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_arm_is_rejected_while_active() {
        let (alarm, _, _) = scheduler(AlarmSection::default());
        alarm.arm(10).unwrap();
        assert_eq!(alarm.arm(5), Err(AlarmError::AlreadyArmed));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(alarm.state(), AlarmPhase::Ringing);
        assert_eq!(alarm.arm(5), Err(AlarmError::AlreadyArmed));

        alarm.dismiss();
        assert!(alarm.arm(5).is_ok());
        alarm.dismiss();
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_delay_arms_without_panicking() {
        let (alarm, audio, _) = scheduler(AlarmSection::default());
        assert!(alarm.arm(100_000_000_000_000).is_ok());
        assert_eq!(alarm.state(), AlarmPhase::Armed);
        assert_eq!(alarm.arm(5), Err(AlarmError::AlreadyArmed));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(audio.play_count(), 0);
        assert!(alarm.dismiss());
        assert!(alarm.arm(1).is_ok());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(alarm.state(), AlarmPhase::Ringing);
        alarm.dismiss();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ring_expires_after_max_duration() {
        let config = AlarmSection {
            max_ring_secs: Some(5),
            ..AlarmSection::default()
        };
        let (alarm, _, screen) = scheduler(config);
        alarm.arm(1).unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(alarm.state(), AlarmPhase::Idle);
        assert_eq!(screen.record().active, Some(SurfaceId(0)));
    }
}
