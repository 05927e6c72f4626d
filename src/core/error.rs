//! 错误类型
//!
//! 按来源划分：外部能力（DeviceError）、函数注册（RegistryError）、闹钟（AlarmError）、
//! 函数回调（FunctionError）。所有错误都在本地吸收（日志 / 错误界面），不跨任务边界传播。

use thiserror::Error;

/// 外部能力调用失败（智能体、存储、显示、表情、音频）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Storage key not found: {0}")]
    KeyNotFound(String),

    #[error("Display error: {0}")]
    Display(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Audio error: {0}")]
    Audio(String),
}

/// 函数注册错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Function already registered: {0}")]
    DuplicateFunction(String),
}

/// 闹钟设置错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlarmError {
    /// 延迟必须为正整数秒
    #[error("Invalid alarm delay: {0}s")]
    InvalidDelay(i64),

    /// 已有闹钟处于等待或响铃状态
    #[error("Alarm already armed")]
    AlreadyArmed,
}

/// 函数回调执行失败（在 worker 内记录日志后丢弃）
#[derive(Error, Debug)]
pub enum FunctionError {
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("Unknown app: {0}")]
    UnknownApp(String),

    #[error(transparent)]
    Alarm(#[from] AlarmError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl FunctionError {
    pub fn invalid_argument(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
