//! 英语学习 App：运行时把对话智能体切到英语角色，退出时恢复原角色
//!
//! 角色切换需要重启会话：Stop → 等待 → Start → 轮询直到 Started。
//! 所有等待都是「间隔 × 次数」的固定上限，run 不会无限期挂起。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::apps::{App, PersonaPhase, PersonaSwitch, RunOutcome};
use crate::config::PersonaSection;
use crate::core::ChatEvent;
use crate::device::{ChatAgent, DisplayHandle, Expression, ScreenId};

pub const APP_NAME: &str = "English Learning";

const MSG_CHAT_UNAVAILABLE: &str = "Chat service not available";
const MSG_SCREEN_CHANGE_FAILED: &str = "Failed to switch to APP_AI mode";
const MSG_AGENT_INFO_FAILED: &str = "Failed to get agent info";
const MSG_PERSONA_SWITCH_FAILED: &str = "Failed to switch to English agent";
const MSG_STARTUP_TIMEOUT: &str = "Chat service startup timeout";

pub struct EnglishLearningApp {
    agent: Arc<dyn ChatAgent>,
    expression: Arc<dyn Expression>,
    display: DisplayHandle,
    timing: PersonaSection,
    switch: Mutex<PersonaSwitch>,
    error_visible: AtomicBool,
}

impl EnglishLearningApp {
    pub fn new(
        agent: Arc<dyn ChatAgent>,
        expression: Arc<dyn Expression>,
        display: DisplayHandle,
        timing: PersonaSection,
    ) -> Self {
        let switch = PersonaSwitch::new(timing.target_index, timing.max_retries);
        Self {
            agent,
            expression,
            display,
            timing,
            switch: Mutex::new(switch),
            error_visible: AtomicBool::new(false),
        }
    }

    fn switch(&self) -> MutexGuard<'_, PersonaSwitch> {
        self.switch.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// 待恢复的原角色
    pub fn pending_original(&self) -> Option<usize> {
        self.switch().original()
    }

    pub fn phase(&self) -> PersonaPhase {
        self.switch().phase()
    }

    pub fn is_showing_error(&self) -> bool {
        self.error_visible.load(Ordering::SeqCst)
    }

    fn session_started(&self) -> bool {
        self.agent.chat_state().is_started()
    }

    fn show_error(&self, message: &str) -> RunOutcome {
        tracing::error!(app = APP_NAME, "{}", message);
        self.display.lock().show_error(message);
        self.error_visible.store(true, Ordering::SeqCst);
        RunOutcome::Degraded(message.to_string())
    }

    fn clear_error(&self) {
        if self.error_visible.swap(false, Ordering::SeqCst) {
            self.display.lock().clear_error();
            tracing::debug!("Cleared error UI");
        }
    }

    fn set_mood(&self, mood: &str) {
        if let Err(e) = self.expression.set_mood(mood) {
            tracing::warn!(mood, error = %e, "Failed to set expression");
        }
    }

    /// 轮询会话直到 Started，超出重试上限返回 false
    async fn wait_for_session(&self) -> bool {
        let interval = Duration::from_millis(self.timing.poll_interval_ms);
        loop {
            if self.session_started() {
                return true;
            }
            let (retry, max) = {
                let mut switch = self.switch();
                if !switch.record_retry() {
                    return false;
                }
                (switch.retries(), switch.max_retries())
            };
            tokio::time::sleep(interval).await;
            if retry % 10 == 0 {
                tracing::debug!("Waiting for chat service to start... retry {}/{}", retry, max);
            }
        }
    }
}

#[async_trait]
impl App for EnglishLearningApp {
    fn name(&self) -> &str {
        APP_NAME
    }

    async fn run(&self) -> RunOutcome {
        tracing::debug!("Run");
        if !self.session_started() {
            return self.show_error(MSG_CHAT_UNAVAILABLE);
        }

        // 语句级临时 guard，await 之前已释放
        let changed = self
            .display
            .lock()
            .request_screen_change(ScreenId::AppAi, Some(APP_NAME));
        if let Err(e) = changed {
            tracing::warn!(error = %e, "AI screen change refused");
            return self.show_error(MSG_SCREEN_CHANGE_FAILED);
        }
        tracing::info!("Switched to AI screen, preparing English learning agent");
        tokio::time::sleep(Duration::from_millis(self.timing.ui_settle_ms)).await;

        let current = match self.agent.current_persona_index() {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read current persona");
                return self.show_error(MSG_AGENT_INFO_FAILED);
            }
        };
        let (original, target) = {
            let mut switch = self.switch();
            (switch.begin(current), switch.target())
        };
        if original != current {
            tracing::info!(original, current, "Switch already pending, keeping saved persona");
        } else {
            tracing::info!(original, "Saved original persona");
        }

        if let Err(e) = self.agent.set_persona_index(target) {
            tracing::warn!(error = %e, "Failed to set persona");
            return self.show_error(MSG_PERSONA_SWITCH_FAILED);
        }
        tracing::info!(target, "Switched to English learning persona");

        if self.session_started() {
            if let Err(e) = self.agent.send_chat_event(ChatEvent::Stop) {
                tracing::warn!(error = %e, "Failed to stop chat");
            }
            tokio::time::sleep(Duration::from_millis(self.timing.stop_settle_ms)).await;
        }
        if let Err(e) = self.agent.send_chat_event(ChatEvent::Start) {
            tracing::warn!(error = %e, "Failed to start chat");
        }

        if !self.wait_for_session().await {
            tracing::error!(
                "Chat service did not start with English learning persona after {} retries",
                self.timing.max_retries
            );
            return self.show_error(MSG_STARTUP_TIMEOUT);
        }

        tracing::info!("Chat service started with English learning persona");
        tokio::time::sleep(Duration::from_millis(self.timing.stabilize_ms)).await;
        self.switch().activate();
        tracing::info!("AI chat mode activated for English learning");
        RunOutcome::Active
    }

    async fn close(&self) {
        tracing::debug!("Close");
        self.clear_error();

        let pending = self.switch().begin_restore();
        if let Some(original) = pending {
            tracing::info!(original, "Restoring original persona");
            if self.session_started() {
                if let Err(e) = self.agent.send_chat_event(ChatEvent::Stop) {
                    tracing::warn!(error = %e, "Failed to stop chat");
                }
                tokio::time::sleep(Duration::from_millis(self.timing.restore_stop_settle_ms)).await;
            }
            if let Err(e) = self.agent.set_persona_index(original) {
                tracing::warn!(error = %e, "Failed to restore persona");
            }
            if let Err(e) = self.agent.send_chat_event(ChatEvent::Start) {
                tracing::warn!(error = %e, "Failed to start chat");
            }
            tokio::time::sleep(Duration::from_millis(self.timing.restore_start_settle_ms)).await;
            tracing::info!("Persona restoration completed");
        }

        self.set_mood("neutral");
        self.switch().reset();
    }

    async fn pause(&self) {
        tracing::info!("Pausing English Learning app");
        if !self.expression.is_paused() {
            if let Err(e) = self.expression.pause() {
                tracing::warn!(error = %e, "Failed to pause expression");
            }
        }
        self.set_mood("neutral");
    }

    async fn resume(&self) {
        tracing::info!("Resuming English Learning app");
        if self.expression.is_paused() {
            if let Err(e) = self.expression.resume() {
                tracing::warn!(error = %e, "Failed to resume expression");
            }
        }
        self.set_mood("happy");
    }

    fn clean_resource(&self) {
        tracing::info!("Cleaning up English Learning app resources");
        self.clear_error();
        self.switch().reset();
    }
}
