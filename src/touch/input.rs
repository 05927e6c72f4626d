//! 触摸输入状态机
//!
//! 同一个触摸传感器根据闹钟与会话状态复用为：解除闹钟 / 唤醒 / 打断 / 休眠。
//! 表情子系统暂停（App 前台运行）时整个处理器不做任何事。

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::alarm::AlarmScheduler;
use crate::core::ChatEvent;
use crate::device::{AudioCue, ChatAgent, Expression, HeadLed};

/// 按下时头部 LED 的亮度
const PRESSED_BRIGHTNESS: u8 = 100;

/// 触摸传感器事件
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TouchEvent {
    PressDown,
    PressUp,
    SingleClick,
    LongPressStart,
}

impl TouchEvent {
    /// 解析模拟器命令中的事件名
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "down" | "press_down" => Some(Self::PressDown),
            "up" | "press_up" => Some(Self::PressUp),
            "click" | "single_click" => Some(Self::SingleClick),
            "long" | "long_press" => Some(Self::LongPressStart),
            _ => None,
        }
    }
}

/// 一次触摸事件产生的动作
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TouchAction {
    /// 触摸开关关闭
    Disabled,
    /// 表情子系统暂停
    Suppressed,
    LedBoosted,
    LedRestored,
    AlarmDismissed,
    WokeUp,
    Interrupted,
    SleepRequested,
    None,
}

/// 触摸处理器
pub struct TouchInput {
    agent: Arc<dyn ChatAgent>,
    expression: Arc<dyn Expression>,
    led: Arc<dyn HeadLed>,
    alarm: AlarmScheduler,
    enabled: AtomicBool,
    default_enabled: bool,
    last_brightness: AtomicU8,
}

impl TouchInput {
    pub fn new(
        agent: Arc<dyn ChatAgent>,
        expression: Arc<dyn Expression>,
        led: Arc<dyn HeadLed>,
        alarm: AlarmScheduler,
        default_enabled: bool,
    ) -> Self {
        let last_brightness = AtomicU8::new(led.brightness());
        Self {
            agent,
            expression,
            led,
            alarm,
            enabled: AtomicBool::new(default_enabled),
            default_enabled,
            last_brightness,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        let was = self.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            tracing::info!(enabled, "Touch sensor switch changed");
        }
    }

    /// 存储中没有开关键时使用的值
    pub fn default_enabled(&self) -> bool {
        self.default_enabled
    }

    /// 处理一次触摸事件（同步，不会等待）
    pub fn handle(&self, event: TouchEvent) -> TouchAction {
        if !self.is_enabled() {
            return TouchAction::Disabled;
        }
        if self.expression.is_paused() {
            tracing::debug!(?event, "Touch ignored while expression is paused");
            return TouchAction::Suppressed;
        }

        match event {
            TouchEvent::PressDown => {
                self.last_brightness
                    .store(self.led.brightness(), Ordering::SeqCst);
                self.led.set_brightness(PRESSED_BRIGHTNESS);
                TouchAction::LedBoosted
            }
            TouchEvent::PressUp => {
                self.led
                    .set_brightness(self.last_brightness.load(Ordering::SeqCst));
                TouchAction::LedRestored
            }
            TouchEvent::SingleClick => self.on_click(),
            TouchEvent::LongPressStart => self.on_long_press(),
        }
    }

    fn on_click(&self) -> TouchAction {
        if self.alarm.is_active() {
            tracing::info!("Touch click, dismissing alarm");
            self.alarm.dismiss();
            return TouchAction::AlarmDismissed;
        }

        if self.agent.chat_state().is_slept() {
            tracing::info!("Touch click, waking up chat");
            self.agent.response_signal();
            if let Err(e) = self.agent.send_chat_event(ChatEvent::WakeUp) {
                tracing::warn!(error = %e, "Failed to wake up chat");
            }
            return TouchAction::WokeUp;
        }

        if self.agent.is_speaking() {
            tracing::info!("Touch click, interrupting agent");
            self.agent.response_signal();
            self.agent.interrupt();
            return TouchAction::Interrupted;
        }

        TouchAction::None
    }

    fn on_long_press(&self) -> TouchAction {
        if self.agent.chat_state().is_slept() {
            return TouchAction::None;
        }
        tracing::info!("Touch long press, putting chat to sleep");
        self.expression.play_audio_cue(AudioCue::Sleep);
        if let Err(e) = self.agent.send_chat_event(ChatEvent::Sleep) {
            tracing::warn!(error = %e, "Failed to put chat to sleep");
        }
        TouchAction::SleepRequested
    }

    /// 启动事件循环：逐个处理通道中的触摸事件，直到发送端全部关闭或收到关闭信号
    pub fn spawn(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<TouchEvent>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        let action = self.handle(event);
                        tracing::debug!(?event, ?action, "Touch event handled");
                    }
                }
            }
            tracing::debug!("Touch loop stopped");
        })
    }
}

/// 驱动侧的触摸事件发送端
#[derive(Clone, Debug)]
pub struct TouchEventSender {
    tx: mpsc::UnboundedSender<TouchEvent>,
}

impl TouchEventSender {
    /// 发送一个事件；事件循环已退出时返回 false
    pub fn send(&self, event: TouchEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// 创建触摸事件通道
pub fn touch_channel() -> (TouchEventSender, mpsc::UnboundedReceiver<TouchEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TouchEventSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlarmSection;
    use crate::core::ChatState;
    use crate::device::{
        DisplayHandle, SimulatedAgent, SimulatedAudio, SimulatedExpression, SimulatedLed,
        SimulatedScreen,
    };
    use std::time::Duration;
    use tokio::runtime::Handle;

    struct Fixture {
        agent: Arc<SimulatedAgent>,
        expression: Arc<SimulatedExpression>,
        led: Arc<SimulatedLed>,
        audio: Arc<SimulatedAudio>,
        alarm: AlarmScheduler,
        touch: Arc<TouchInput>,
    }

    fn fixture(state: ChatState) -> Fixture {
        let agent = Arc::new(SimulatedAgent::new(0, state));
        let expression = Arc::new(SimulatedExpression::new());
        let led = Arc::new(SimulatedLed::new(40));
        let audio = Arc::new(SimulatedAudio::new(Duration::from_secs(1)));
        let alarm = AlarmScheduler::new(
            audio.clone(),
            DisplayHandle::new(SimulatedScreen::new()),
            AlarmSection::default(),
            Handle::current(),
        );
        let touch = Arc::new(TouchInput::new(
            agent.clone(),
            expression.clone(),
            led.clone(),
            alarm.clone(),
            true,
        ));
        Fixture {
            agent,
            expression,
            led,
            audio,
            alarm,
            touch,
        }
    }

    #[tokio::test]
    async fn test_click_wakes_slept_session() {
        let f = fixture(ChatState::Slept);
        assert_eq!(f.touch.handle(TouchEvent::SingleClick), TouchAction::WokeUp);
        assert_eq!(f.agent.event_count(ChatEvent::WakeUp), 1);
        assert_eq!(f.agent.interrupt_count(), 0);
        assert_eq!(f.agent.response_signal_count(), 1);
    }

    #[tokio::test]
    async fn test_click_interrupts_speaking_agent() {
        let f = fixture(ChatState::Started);
        f.agent.set_speaking(true);
        assert_eq!(f.touch.handle(TouchEvent::SingleClick), TouchAction::Interrupted);
        assert_eq!(f.agent.interrupt_count(), 1);
        assert_eq!(f.agent.event_count(ChatEvent::WakeUp), 0);
    }

    #[tokio::test]
    async fn test_click_without_anything_to_do() {
        let f = fixture(ChatState::Started);
        assert_eq!(f.touch.handle(TouchEvent::SingleClick), TouchAction::None);
        assert!(f.agent.events().is_empty());
        assert_eq!(f.agent.interrupt_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_dismisses_alarm_first() {
        let f = fixture(ChatState::Slept);
        f.alarm.arm(1).unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(f.audio.play_count() >= 1);

        assert_eq!(f.touch.handle(TouchEvent::SingleClick), TouchAction::AlarmDismissed);
        assert!(!f.alarm.is_active());
        assert!(f.audio.stop_count() >= 1);
        assert_eq!(f.agent.event_count(ChatEvent::WakeUp), 0);
    }

    #[tokio::test]
    async fn test_long_press_puts_session_to_sleep() {
        let f = fixture(ChatState::Started);
        assert_eq!(f.touch.handle(TouchEvent::LongPressStart), TouchAction::SleepRequested);
        assert_eq!(f.expression.cues(), vec![AudioCue::Sleep]);
        assert_eq!(f.agent.chat_state(), ChatState::Slept);

        assert_eq!(f.touch.handle(TouchEvent::LongPressStart), TouchAction::None);
        assert_eq!(f.agent.event_count(ChatEvent::Sleep), 1);
    }

    #[tokio::test]
    async fn test_press_boosts_and_restores_led() {
        let f = fixture(ChatState::Started);
        f.touch.handle(TouchEvent::PressDown);
        assert_eq!(f.led.brightness(), 100);
        f.touch.handle(TouchEvent::PressUp);
        assert_eq!(f.led.brightness(), 40);
    }

    #[tokio::test]
    async fn test_paused_expression_suppresses_everything() {
        let f = fixture(ChatState::Slept);
        f.expression.set_paused(true);
        for event in [
            TouchEvent::PressDown,
            TouchEvent::SingleClick,
            TouchEvent::LongPressStart,
        ] {
            assert_eq!(f.touch.handle(event), TouchAction::Suppressed);
        }
        assert_eq!(f.led.brightness(), 40);
        assert!(f.agent.events().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_switch_ignores_events() {
        let f = fixture(ChatState::Slept);
        f.touch.set_enabled(false);
        assert_eq!(f.touch.handle(TouchEvent::SingleClick), TouchAction::Disabled);
        assert!(f.agent.events().is_empty());
    }

    #[tokio::test]
    async fn test_event_loop_consumes_channel() {
        let f = fixture(ChatState::Slept);
        let (tx, rx) = touch_channel();
        let shutdown = CancellationToken::new();
        let handle = f.touch.clone().spawn(rx, shutdown.clone());

        assert!(tx.send(TouchEvent::SingleClick));
        drop(tx);
        handle.await.unwrap();
        assert_eq!(f.agent.event_count(ChatEvent::WakeUp), 1);
    }

    #[test]
    fn test_parse_event_names() {
        assert_eq!(TouchEvent::parse("click"), Some(TouchEvent::SingleClick));
        assert_eq!(TouchEvent::parse(" LONG "), Some(TouchEvent::LongPressStart));
        assert_eq!(TouchEvent::parse("down"), Some(TouchEvent::PressDown));
        assert_eq!(TouchEvent::parse("swipe"), None);
    }
}
