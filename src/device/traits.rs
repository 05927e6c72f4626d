//! 外部能力抽象
//!
//! 智能体、设置存储、屏幕、表情、音频、头部 LED 都由外部协作者提供；
//! 核心逻辑只通过这些 trait 调用它们，并假定实现自身是线程安全的。

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::core::{ChatEvent, ChatState, DeviceError};

/// 对话智能体：角色索引、会话状态与打断
pub trait ChatAgent: Send + Sync {
    fn current_persona_index(&self) -> Result<usize, DeviceError>;

    fn set_persona_index(&self, index: usize) -> Result<(), DeviceError>;

    fn chat_state(&self) -> ChatState;

    fn send_chat_event(&self, event: ChatEvent) -> Result<(), DeviceError>;

    /// 智能体是否正在播报回复
    fn is_speaking(&self) -> bool;

    /// 打断正在播报的回复
    fn interrupt(&self);

    /// 通知智能体用户有响应（唤醒 / 打断前调用）
    fn response_signal(&self) {}
}

/// 设置项变更事件
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: String,
    pub value: i32,
}

/// 持久化键值存储（整型设置项）
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<i32, DeviceError>;

    fn set(&self, key: &str, value: i32) -> Result<(), DeviceError>;

    /// 订阅写入事件
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// 屏幕 ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScreenId {
    /// 应用选择主界面
    Main,
    /// AI 对话界面（由 App 请求）
    AppAi,
}

/// 界面对象句柄（当前画面、闹钟画面等）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

/// 显示子系统。所有调用都必须在 DisplayHandle 的锁内进行。
pub trait Screen: Send {
    /// 请求切换屏幕；requester 为发起切换的 App 名称（系统发起时为 None）
    fn request_screen_change(&mut self, screen: ScreenId, requester: Option<&str>) -> Result<(), DeviceError>;

    /// 发送 App 启动事件
    fn start_app(&mut self, app_id: u32) -> Result<(), DeviceError>;

    fn active_surface(&self) -> Option<SurfaceId>;

    fn load_surface(&mut self, surface: SurfaceId);

    /// 创建并显示闹钟画面
    fn create_alarm_surface(&mut self) -> Result<SurfaceId, DeviceError>;

    fn delete_surface(&mut self, surface: SurfaceId);

    /// 显示错误界面（替换正常界面）
    fn show_error(&mut self, message: &str);

    fn clear_error(&mut self);
}

/// 提示音类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AudioCue {
    /// 长按休眠时的「拜拜咯」
    Sleep,
}

/// 表情子系统（AI Buddy）：心情、系统图标、暂停与提示音
pub trait Expression: Send + Sync {
    fn set_mood(&self, mood: &str) -> Result<(), DeviceError>;

    fn set_system_icon(&self, icon: &str) -> Result<(), DeviceError>;

    fn pause(&self) -> Result<(), DeviceError>;

    fn resume(&self) -> Result<(), DeviceError>;

    fn is_paused(&self) -> bool;

    /// 交给已在运行的音频任务播放，不阻塞调用方
    fn play_audio_cue(&self, cue: AudioCue);
}

/// 音频播放
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    /// 播放直到结束或超时
    async fn play_blocking(&self, uri: &str, timeout: Duration) -> Result<(), DeviceError>;

    /// 立即停止当前播放
    fn stop(&self);
}

/// 头部指示灯，亮度 0..=100
pub trait HeadLed: Send + Sync {
    fn brightness(&self) -> u8;

    fn set_brightness(&self, level: u8);
}
