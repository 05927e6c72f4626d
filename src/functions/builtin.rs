//! 内置设备函数：open_app / set_volume / set_brightness / set_alarm
//!
//! 回调只通过捕获的能力句柄操作设备；失败以 FunctionError 返回，由 worker 记录后丢弃，不做重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::alarm::AlarmScheduler;
use crate::config::OpenAppSection;
use crate::core::{DeviceError, FunctionError};
use crate::device::{keys, ChatAgent, DisplayHandle, Expression, ScreenId, SettingsStore};
use crate::functions::{AppDirectory, FunctionArgs, FunctionHandler};

/// open_app：等智能体说完再切回主界面并启动目标应用
pub struct OpenAppFunction {
    agent: Arc<dyn ChatAgent>,
    display: DisplayHandle,
    apps: AppDirectory,
    timing: OpenAppSection,
}

impl OpenAppFunction {
    pub const NAME: &'static str = "open_app";
    pub const PARAM: &'static str = "app_name";

    pub fn new(
        agent: Arc<dyn ChatAgent>,
        display: DisplayHandle,
        apps: AppDirectory,
        timing: OpenAppSection,
    ) -> Self {
        Self {
            agent,
            display,
            apps,
            timing,
        }
    }

    /// 轮询直到智能体不再说话或达到次数上限，返回实际轮询次数
    async fn wait_until_quiet(&self) -> u64 {
        let interval = Duration::from_millis(self.timing.poll_interval_ms);
        let max_polls = self.timing.max_polls();
        let mut polls = 0;
        while polls < max_polls && self.agent.is_speaking() {
            tokio::time::sleep(interval).await;
            polls += 1;
        }
        polls
    }

    fn launch(&self, app_id: u32) -> Result<(), DeviceError> {
        let mut screen = self.display.lock();
        screen.request_screen_change(ScreenId::Main, None)?;
        screen.start_app(app_id)
    }
}

#[async_trait]
impl FunctionHandler for OpenAppFunction {
    async fn call(&self, args: &FunctionArgs) -> Result<(), FunctionError> {
        let app_name = args.str(Self::PARAM)?;
        tracing::info!("Opening app: {}", app_name);

        let Some(app_id) = self.apps.resolve(app_name) else {
            return Err(FunctionError::UnknownApp(app_name.to_string()));
        };

        tokio::time::sleep(Duration::from_millis(self.timing.pre_wait_ms)).await;
        let polls = self.wait_until_quiet().await;
        if self.agent.is_speaking() {
            tracing::debug!(polls, "Agent still speaking, opening app anyway");
        }

        self.launch(app_id)?;
        Ok(())
    }
}

/// 音量 / 亮度调节请求
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelRequest {
    Absolute(i32),
    StepDown,
    StepUp,
}

impl LevelRequest {
    /// 解析智能体给出的级别：负数或 down/decrease 表示调小，大于 100 或 up/increase 表示调大
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase();
        match raw.as_str() {
            "down" | "decrease" | "lower" | "调小" => return Some(Self::StepDown),
            "up" | "increase" | "raise" | "调大" => return Some(Self::StepUp),
            _ => {}
        }
        let value: i32 = raw.parse().ok()?;
        Some(if value < 0 {
            Self::StepDown
        } else if value > 100 {
            Self::StepUp
        } else {
            Self::Absolute(value)
        })
    }
}

/// 调节的设置项
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelKind {
    Volume,
    Brightness,
}

impl LevelKind {
    pub fn function_name(self) -> &'static str {
        match self {
            Self::Volume => "set_volume",
            Self::Brightness => "set_brightness",
        }
    }

    pub fn store_key(self) -> &'static str {
        match self {
            Self::Volume => keys::VOLUME,
            Self::Brightness => keys::BRIGHTNESS,
        }
    }

    fn icon(self, request: LevelRequest, value: i32) -> Option<&'static str> {
        match (self, request) {
            (_, LevelRequest::Absolute(_)) => None,
            (Self::Volume, LevelRequest::StepDown) if value <= 0 => Some("volume_mute"),
            (Self::Volume, LevelRequest::StepDown) => Some("volume_down"),
            (Self::Volume, LevelRequest::StepUp) => Some("volume_up"),
            (Self::Brightness, LevelRequest::StepDown) => Some("brightness_down"),
            (Self::Brightness, LevelRequest::StepUp) => Some("brightness_up"),
        }
    }
}

/// set_volume / set_brightness：读上次的值，按请求计算新值，更新图标后写回
///
/// 计算结果不做钳位，范围约束交给存储层。
pub struct LevelFunction {
    kind: LevelKind,
    store: Arc<dyn SettingsStore>,
    expression: Arc<dyn Expression>,
    step: i32,
}

impl LevelFunction {
    pub const PARAM: &'static str = "level";

    pub fn new(
        kind: LevelKind,
        store: Arc<dyn SettingsStore>,
        expression: Arc<dyn Expression>,
        step: i32,
    ) -> Self {
        Self {
            kind,
            store,
            expression,
            step,
        }
    }

    pub fn next_value(&self, request: LevelRequest, last: i32) -> i32 {
        match request {
            LevelRequest::Absolute(v) => v,
            LevelRequest::StepDown => last.saturating_sub(self.step),
            LevelRequest::StepUp => last.saturating_add(self.step),
        }
    }
}

#[async_trait]
impl FunctionHandler for LevelFunction {
    async fn call(&self, args: &FunctionArgs) -> Result<(), FunctionError> {
        let raw = args.str(Self::PARAM)?;
        tracing::info!(function = self.kind.function_name(), level = raw, "level request");
        let request = LevelRequest::parse(raw)
            .ok_or_else(|| FunctionError::invalid_argument(Self::PARAM, format!("not a level: {raw}")))?;

        let key = self.kind.store_key();
        let last = self.store.get(key)?;
        let value = self.next_value(request, last);

        if let Some(icon) = self.kind.icon(request, value) {
            self.expression.set_system_icon(icon)?;
        }
        self.store.set(key, value)?;
        tracing::info!(key, last, value, "level updated");
        Ok(())
    }
}

/// set_alarm：多少秒后响铃
pub struct SetAlarmFunction {
    alarm: AlarmScheduler,
}

impl SetAlarmFunction {
    pub const NAME: &'static str = "set_alarm";
    pub const PARAM: &'static str = "seconds_from_now";

    pub fn new(alarm: AlarmScheduler) -> Self {
        Self { alarm }
    }
}

#[async_trait]
impl FunctionHandler for SetAlarmFunction {
    async fn call(&self, args: &FunctionArgs) -> Result<(), FunctionError> {
        let raw = args.str(Self::PARAM)?;
        tracing::info!("set_alarm received {}: {}", Self::PARAM, raw);
        let seconds: i64 = raw
            .trim()
            .parse()
            .map_err(|_| FunctionError::invalid_argument(Self::PARAM, "expected whole seconds"))?;
        self.alarm.arm(seconds)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{MemoryStore, SimulatedAgent, SimulatedExpression, SimulatedScreen};
    use crate::config::AppConfig;
    use crate::core::ChatState;

    fn args(name: &str, value: &str) -> FunctionArgs {
        let mut map = serde_json::Map::new();
        map.insert(name.to_string(), serde_json::Value::String(value.to_string()));
        FunctionArgs::new(map)
    }

    fn volume_fn(store: Arc<MemoryStore>, expression: Arc<SimulatedExpression>) -> LevelFunction {
        LevelFunction::new(LevelKind::Volume, store, expression, 20)
    }

    #[test]
    fn test_parse_level_request() {
        assert_eq!(LevelRequest::parse("-1"), Some(LevelRequest::StepDown));
        assert_eq!(LevelRequest::parse("101"), Some(LevelRequest::StepUp));
        assert_eq!(LevelRequest::parse(" 35 "), Some(LevelRequest::Absolute(35)));
        assert_eq!(LevelRequest::parse("0"), Some(LevelRequest::Absolute(0)));
        assert_eq!(LevelRequest::parse("Increase"), Some(LevelRequest::StepUp));
        assert_eq!(LevelRequest::parse("down"), Some(LevelRequest::StepDown));
        assert_eq!(LevelRequest::parse("loud"), None);
    }

    #[tokio::test]
    async fn test_volume_step_down_stores_exact_value() {
        let store = Arc::new(MemoryStore::new().with_value(keys::VOLUME, 50));
        let expression = Arc::new(SimulatedExpression::new());
        let f = volume_fn(store.clone(), expression.clone());

        f.call(&args("level", "-1")).await.unwrap();
        assert_eq!(store.peek(keys::VOLUME), Some(30));
        assert_eq!(expression.icons(), vec!["volume_down".to_string()]);
    }

    #[tokio::test]
    async fn test_volume_step_down_is_not_clamped_and_mutes() {
        let store = Arc::new(MemoryStore::new().with_value(keys::VOLUME, 10));
        let expression = Arc::new(SimulatedExpression::new());
        let f = volume_fn(store.clone(), expression.clone());

        f.call(&args("level", "-5")).await.unwrap();
        assert_eq!(store.peek(keys::VOLUME), Some(-10));
        assert_eq!(expression.icons(), vec!["volume_mute".to_string()]);
    }

    #[tokio::test]
    async fn test_volume_up_and_absolute() {
        let store = Arc::new(MemoryStore::new().with_value(keys::VOLUME, 90));
        let expression = Arc::new(SimulatedExpression::new());
        let f = volume_fn(store.clone(), expression.clone());

        f.call(&args("level", "150")).await.unwrap();
        assert_eq!(store.peek(keys::VOLUME), Some(110));
        f.call(&args("level", "40")).await.unwrap();
        assert_eq!(store.peek(keys::VOLUME), Some(40));
        assert_eq!(expression.icons(), vec!["volume_up".to_string()]);
    }

    #[tokio::test]
    async fn test_step_from_extreme_stored_value_saturates() {
        let store = Arc::new(MemoryStore::new().with_value(keys::VOLUME, i32::MIN + 5));
        let expression = Arc::new(SimulatedExpression::new());
        let f = volume_fn(store.clone(), expression.clone());

        f.call(&args("level", "-1")).await.unwrap();
        assert_eq!(store.peek(keys::VOLUME), Some(i32::MIN));
        assert_eq!(f.next_value(LevelRequest::StepUp, i32::MAX - 1), i32::MAX);
    }

    #[tokio::test]
    async fn test_brightness_icons() {
        let store = Arc::new(MemoryStore::new().with_value(keys::BRIGHTNESS, 20));
        let expression = Arc::new(SimulatedExpression::new());
        let f = LevelFunction::new(LevelKind::Brightness, store.clone(), expression.clone(), 30);

        f.call(&args("level", "-1")).await.unwrap();
        assert_eq!(store.peek(keys::BRIGHTNESS), Some(-10));
        assert_eq!(expression.icons(), vec!["brightness_down".to_string()]);
    }

    #[tokio::test]
    async fn test_storage_failures_abort_without_write() {
        let store = Arc::new(MemoryStore::new().with_value(keys::VOLUME, 50));
        let expression = Arc::new(SimulatedExpression::new());
        let f = volume_fn(store.clone(), expression.clone());

        store.set_fail_reads(true);
        let err = f.call(&args("level", "-1")).await.unwrap_err();
        assert!(matches!(err, FunctionError::Device(DeviceError::Storage(_))));
        assert!(expression.icons().is_empty());
        assert_eq!(store.peek(keys::VOLUME), Some(50));

        store.set_fail_reads(false);
        store.set_fail_writes(true);
        assert!(f.call(&args("level", "-1")).await.is_err());
        assert_eq!(store.peek(keys::VOLUME), Some(50));
    }

    #[tokio::test]
    async fn test_invalid_level_is_rejected() {
        let store = Arc::new(MemoryStore::new().with_value(keys::VOLUME, 50));
        let expression = Arc::new(SimulatedExpression::new());
        let f = volume_fn(store.clone(), expression);
        let err = f.call(&args("level", "loud")).await.unwrap_err();
        assert!(matches!(err, FunctionError::InvalidArgument { .. }));
        assert_eq!(store.peek(keys::VOLUME), Some(50));
    }

    fn open_app(agent: Arc<SimulatedAgent>, screen: SimulatedScreen) -> OpenAppFunction {
        let timing = OpenAppSection {
            pre_wait_ms: 100,
            poll_interval_ms: 10,
            max_wait_ms: 200,
            ..OpenAppSection::default()
        };
        OpenAppFunction::new(
            agent,
            DisplayHandle::new(screen),
            AppDirectory::new(&AppConfig::default().apps),
            timing,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_app_waits_bounded_time_for_speech() {
        let agent = Arc::new(SimulatedAgent::new(0, ChatState::Started));
        agent.set_speaking(true);
        let screen = SimulatedScreen::new();
        let f = open_app(agent, screen.clone());

        let start = tokio::time::Instant::now();
        f.call(&args("app_name", "Calculator")).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(400));

        let record = screen.record();
        assert_eq!(record.screen_changes, vec![(ScreenId::Main, None)]);
        assert_eq!(record.started_apps, vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_app_unknown_name_is_abandoned() {
        let agent = Arc::new(SimulatedAgent::new(0, ChatState::Started));
        let screen = SimulatedScreen::new();
        let f = open_app(agent, screen.clone());

        let err = f.call(&args("app_name", "weather")).await.unwrap_err();
        assert!(matches!(err, FunctionError::UnknownApp(_)));
        assert!(screen.record().started_apps.is_empty());
    }
}
