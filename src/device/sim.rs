//! 模拟设备（用于主程序模拟器与测试，无需硬件）
//!
//! 每个实现都记录调用情况，便于断言；会话状态机按事件立即迁移。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Notify};

use crate::core::{ChatEvent, ChatState, DeviceError};
use crate::device::{
    keys, AudioCue, AudioPlayer, Capabilities, ChatAgent, DisplayHandle, Expression, HeadLed,
    Screen, ScreenId, SettingsStore, StoreEvent, SurfaceId,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

/// 模拟智能体
#[derive(Debug)]
pub struct SimulatedAgent {
    persona: AtomicUsize,
    state: Mutex<ChatState>,
    speaking: AtomicBool,
    /// false 时 Start 事件不会让会话进入 Started（模拟连接失败）
    accept_start: AtomicBool,
    fail_persona: AtomicBool,
    events: Mutex<Vec<ChatEvent>>,
    interrupts: AtomicUsize,
    response_signals: AtomicUsize,
}

impl SimulatedAgent {
    pub fn new(persona: usize, state: ChatState) -> Self {
        Self {
            persona: AtomicUsize::new(persona),
            state: Mutex::new(state),
            speaking: AtomicBool::new(false),
            accept_start: AtomicBool::new(true),
            fail_persona: AtomicBool::new(false),
            events: Mutex::new(Vec::new()),
            interrupts: AtomicUsize::new(0),
            response_signals: AtomicUsize::new(0),
        }
    }

    pub fn set_state(&self, state: ChatState) {
        *lock(&self.state) = state;
    }

    pub fn set_speaking(&self, speaking: bool) {
        self.speaking.store(speaking, Ordering::SeqCst);
    }

    pub fn set_accept_start(&self, accept: bool) {
        self.accept_start.store(accept, Ordering::SeqCst);
    }

    pub fn set_fail_persona(&self, fail: bool) {
        self.fail_persona.store(fail, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<ChatEvent> {
        lock(&self.events).clone()
    }

    pub fn event_count(&self, event: ChatEvent) -> usize {
        lock(&self.events).iter().filter(|e| **e == event).count()
    }

    pub fn interrupt_count(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }

    pub fn response_signal_count(&self) -> usize {
        self.response_signals.load(Ordering::SeqCst)
    }
}

impl ChatAgent for SimulatedAgent {
    fn current_persona_index(&self) -> Result<usize, DeviceError> {
        if self.fail_persona.load(Ordering::SeqCst) {
            return Err(DeviceError::Agent("persona index unavailable".into()));
        }
        Ok(self.persona.load(Ordering::SeqCst))
    }

    fn set_persona_index(&self, index: usize) -> Result<(), DeviceError> {
        if self.fail_persona.load(Ordering::SeqCst) {
            return Err(DeviceError::Agent("persona index unavailable".into()));
        }
        self.persona.store(index, Ordering::SeqCst);
        Ok(())
    }

    fn chat_state(&self) -> ChatState {
        *lock(&self.state)
    }

    fn send_chat_event(&self, event: ChatEvent) -> Result<(), DeviceError> {
        lock(&self.events).push(event);
        let mut state = lock(&self.state);
        match event {
            ChatEvent::Start => {
                if self.accept_start.load(Ordering::SeqCst) {
                    *state = ChatState::Started;
                }
            }
            ChatEvent::Stop => {
                *state = ChatState::Stopped;
                self.speaking.store(false, Ordering::SeqCst);
            }
            ChatEvent::Sleep => *state = ChatState::Slept,
            ChatEvent::WakeUp => *state = ChatState::Started,
        }
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    fn interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        self.speaking.store(false, Ordering::SeqCst);
    }

    fn response_signal(&self) {
        self.response_signals.fetch_add(1, Ordering::SeqCst);
    }
}

/// 内存版设置存储
#[derive(Debug)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, i32>>,
    events: broadcast::Sender<StoreEvent>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            values: Mutex::new(HashMap::new()),
            events,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一个值（不触发变更事件）
    pub fn with_value(self, key: &str, value: i32) -> Self {
        lock(&self.values).insert(key.to_string(), value);
        self
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn peek(&self, key: &str) -> Option<i32> {
        lock(&self.values).get(key).copied()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<i32, DeviceError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DeviceError::Storage(format!("read {key} failed")));
        }
        lock(&self.values)
            .get(key)
            .copied()
            .ok_or_else(|| DeviceError::KeyNotFound(key.to_string()))
    }

    fn set(&self, key: &str, value: i32) -> Result<(), DeviceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DeviceError::Storage(format!("write {key} failed")));
        }
        lock(&self.values).insert(key.to_string(), value);
        // 无订阅者时发送失败，忽略
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
            value,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

/// 模拟屏幕的记录
#[derive(Clone, Debug, Default)]
pub struct ScreenRecord {
    pub screen_changes: Vec<(ScreenId, Option<String>)>,
    pub started_apps: Vec<u32>,
    pub active: Option<SurfaceId>,
    pub alarm_surfaces_created: usize,
    pub deleted: Vec<SurfaceId>,
    pub error: Option<String>,
    pub errors_shown: usize,
    next_surface: u32,
    fail_screen_change: bool,
}

/// 模拟屏幕；克隆共享同一份记录，测试可保留一份克隆用于断言
#[derive(Clone, Debug)]
pub struct SimulatedScreen {
    record: Arc<Mutex<ScreenRecord>>,
}

impl Default for SimulatedScreen {
    fn default() -> Self {
        let record = ScreenRecord {
            active: Some(SurfaceId(0)),
            next_surface: 1,
            ..ScreenRecord::default()
        };
        Self {
            record: Arc::new(Mutex::new(record)),
        }
    }
}

impl SimulatedScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) -> ScreenRecord {
        lock(&self.record).clone()
    }

    pub fn set_fail_screen_change(&self, fail: bool) {
        lock(&self.record).fail_screen_change = fail;
    }
}

impl Screen for SimulatedScreen {
    fn request_screen_change(&mut self, screen: ScreenId, requester: Option<&str>) -> Result<(), DeviceError> {
        let mut r = lock(&self.record);
        if r.fail_screen_change {
            return Err(DeviceError::Display(format!("change to {screen:?} refused")));
        }
        r.screen_changes.push((screen, requester.map(str::to_string)));
        Ok(())
    }

    fn start_app(&mut self, app_id: u32) -> Result<(), DeviceError> {
        lock(&self.record).started_apps.push(app_id);
        Ok(())
    }

    fn active_surface(&self) -> Option<SurfaceId> {
        lock(&self.record).active
    }

    fn load_surface(&mut self, surface: SurfaceId) {
        lock(&self.record).active = Some(surface);
    }

    fn create_alarm_surface(&mut self) -> Result<SurfaceId, DeviceError> {
        let mut r = lock(&self.record);
        let id = SurfaceId(r.next_surface);
        r.next_surface += 1;
        r.alarm_surfaces_created += 1;
        r.active = Some(id);
        Ok(id)
    }

    fn delete_surface(&mut self, surface: SurfaceId) {
        let mut r = lock(&self.record);
        r.deleted.push(surface);
        if r.active == Some(surface) {
            r.active = None;
        }
    }

    fn show_error(&mut self, message: &str) {
        let mut r = lock(&self.record);
        r.error = Some(message.to_string());
        r.errors_shown += 1;
    }

    fn clear_error(&mut self) {
        lock(&self.record).error = None;
    }
}

/// 模拟表情子系统
#[derive(Debug, Default)]
pub struct SimulatedExpression {
    paused: AtomicBool,
    fail_mood: AtomicBool,
    moods: Mutex<Vec<String>>,
    icons: Mutex<Vec<String>>,
    cues: Mutex<Vec<AudioCue>>,
}

impl SimulatedExpression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn set_fail_mood(&self, fail: bool) {
        self.fail_mood.store(fail, Ordering::SeqCst);
    }

    pub fn moods(&self) -> Vec<String> {
        lock(&self.moods).clone()
    }

    pub fn icons(&self) -> Vec<String> {
        lock(&self.icons).clone()
    }

    pub fn cues(&self) -> Vec<AudioCue> {
        lock(&self.cues).clone()
    }
}

impl Expression for SimulatedExpression {
    fn set_mood(&self, mood: &str) -> Result<(), DeviceError> {
        if self.fail_mood.load(Ordering::SeqCst) {
            return Err(DeviceError::Expression(format!("mood {mood} rejected")));
        }
        lock(&self.moods).push(mood.to_string());
        Ok(())
    }

    fn set_system_icon(&self, icon: &str) -> Result<(), DeviceError> {
        lock(&self.icons).push(icon.to_string());
        Ok(())
    }

    fn pause(&self) -> Result<(), DeviceError> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), DeviceError> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn play_audio_cue(&self, cue: AudioCue) {
        lock(&self.cues).push(cue);
    }
}

/// 模拟音频：每次播放持续 clip，stop() 立即打断
#[derive(Debug)]
pub struct SimulatedAudio {
    clip: Duration,
    plays: AtomicUsize,
    stops: AtomicUsize,
    stop_notify: Notify,
}

impl SimulatedAudio {
    pub fn new(clip: Duration) -> Self {
        Self {
            clip,
            plays: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            stop_notify: Notify::new(),
        }
    }

    pub fn play_count(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPlayer for SimulatedAudio {
    async fn play_blocking(&self, uri: &str, timeout: Duration) -> Result<(), DeviceError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(uri, "simulated playback");
        tokio::select! {
            _ = tokio::time::sleep(self.clip.min(timeout)) => {}
            _ = self.stop_notify.notified() => {}
        }
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
    }
}

/// 模拟头部 LED
#[derive(Debug, Default)]
pub struct SimulatedLed {
    level: AtomicU8,
}

impl SimulatedLed {
    pub fn new(level: u8) -> Self {
        Self {
            level: AtomicU8::new(level),
        }
    }
}

impl HeadLed for SimulatedLed {
    fn brightness(&self) -> u8 {
        self.level.load(Ordering::SeqCst)
    }

    fn set_brightness(&self, level: u8) {
        self.level.store(level.min(100), Ordering::SeqCst);
    }
}

/// 一整套模拟设备；保留具体类型的句柄以便检查记录
#[derive(Clone)]
pub struct SimulatedDevice {
    pub agent: Arc<SimulatedAgent>,
    pub store: Arc<MemoryStore>,
    pub screen: SimulatedScreen,
    pub expression: Arc<SimulatedExpression>,
    pub audio: Arc<SimulatedAudio>,
    pub led: Arc<SimulatedLed>,
}

impl SimulatedDevice {
    /// 会话已启动、角色 0、音量 60、亮度 80、每段提示音 1 秒
    pub fn new() -> Self {
        let store = MemoryStore::new()
            .with_value(keys::VOLUME, 60)
            .with_value(keys::BRIGHTNESS, 80);
        Self {
            agent: Arc::new(SimulatedAgent::new(0, ChatState::Started)),
            store: Arc::new(store),
            screen: SimulatedScreen::new(),
            expression: Arc::new(SimulatedExpression::new()),
            audio: Arc::new(SimulatedAudio::new(Duration::from_secs(1))),
            led: Arc::new(SimulatedLed::new(0)),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            agent: self.agent.clone(),
            store: self.store.clone(),
            display: DisplayHandle::new(self.screen.clone()),
            expression: self.expression.clone(),
            audio: self.audio.clone(),
            led: self.led.clone(),
        }
    }
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_transitions() {
        let agent = SimulatedAgent::new(0, ChatState::Idle);
        agent.send_chat_event(ChatEvent::Start).unwrap();
        assert_eq!(agent.chat_state(), ChatState::Started);
        agent.send_chat_event(ChatEvent::Sleep).unwrap();
        assert_eq!(agent.chat_state(), ChatState::Slept);
        agent.send_chat_event(ChatEvent::WakeUp).unwrap();
        assert_eq!(agent.chat_state(), ChatState::Started);

        agent.set_accept_start(false);
        agent.send_chat_event(ChatEvent::Stop).unwrap();
        agent.send_chat_event(ChatEvent::Start).unwrap();
        assert_eq!(agent.chat_state(), ChatState::Stopped);
        assert_eq!(agent.event_count(ChatEvent::Start), 2);
    }

    #[test]
    fn test_store_emits_events() {
        let store = MemoryStore::new().with_value("volume", 40);
        let mut rx = store.subscribe();
        store.set("volume", 60).unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event, StoreEvent { key: "volume".into(), value: 60 });
        assert_eq!(store.get("volume").unwrap(), 60);
        assert!(matches!(store.get("missing"), Err(DeviceError::KeyNotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_stop_interrupts_playback() {
        let audio = Arc::new(SimulatedAudio::new(Duration::from_secs(60)));
        let player = audio.clone();
        let handle = tokio::spawn(async move {
            player.play_blocking("file://alarm.mp3", Duration::from_secs(60)).await
        });
        tokio::task::yield_now().await;
        audio.stop();
        handle.await.unwrap().unwrap();
        assert_eq!(audio.play_count(), 1);
        assert_eq!(audio.stop_count(), 1);
    }
}
