//! 设备上的 App：生命周期 trait 与英语学习 App

pub mod english_learning;
pub mod persona;

use async_trait::async_trait;

pub use english_learning::EnglishLearningApp;
pub use persona::{PersonaPhase, PersonaSwitch};

/// run 的结果；Degraded 表示 App 仍驻留但显示了错误界面
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Active,
    Degraded(String),
}

/// App 生命周期（由应用管理器在调用方任务上驱动）
#[async_trait]
pub trait App: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> RunOutcome;

    async fn close(&self);

    async fn pause(&self);

    async fn resume(&self);

    /// 强制清理，不触碰会话
    fn clean_resource(&self);
}
