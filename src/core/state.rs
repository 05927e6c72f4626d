//! 对话会话状态与事件
//!
//! 会话运行时属于外部智能体，本模块只定义查询与驱动它所用的类型。

/// 对话会话状态（外部智能体维护）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatState {
    Idle,
    Started,
    /// 正在进入休眠
    Sleeping,
    /// 已休眠，等待唤醒
    Slept,
    Stopped,
    Error,
}

impl ChatState {
    /// 会话是否已建立：休眠中 / 已休眠仍属于已启动的会话
    pub fn is_started(self) -> bool {
        matches!(self, Self::Started | Self::Sleeping | Self::Slept)
    }

    pub fn is_slept(self) -> bool {
        self == Self::Slept
    }
}

/// 发往会话的控制事件
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatEvent {
    Start,
    Stop,
    Sleep,
    WakeUp,
}
