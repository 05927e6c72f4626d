//! 设备能力层：外部协作者的 trait 抽象、显示锁与模拟实现

use std::sync::Arc;

pub mod display;
pub mod sim;
pub mod traits;

pub use display::DisplayHandle;
pub use sim::{
    MemoryStore, ScreenRecord, SimulatedAgent, SimulatedAudio, SimulatedDevice,
    SimulatedExpression, SimulatedLed, SimulatedScreen,
};
pub use traits::{
    AudioCue, AudioPlayer, ChatAgent, Expression, HeadLed, Screen, ScreenId, SettingsStore,
    StoreEvent, SurfaceId,
};

/// 设置项键名
pub mod keys {
    pub const VOLUME: &str = "volume";
    pub const BRIGHTNESS: &str = "brightness";
    pub const TOUCH_SENSOR_SWITCH: &str = "touch_sensor_switch";
}

/// 外部能力集合，由组合根一次性注入
#[derive(Clone)]
pub struct Capabilities {
    pub agent: Arc<dyn ChatAgent>,
    pub store: Arc<dyn SettingsStore>,
    pub display: DisplayHandle,
    pub expression: Arc<dyn Expression>,
    pub audio: Arc<dyn AudioPlayer>,
    pub led: Arc<dyn HeadLed>,
}
