//! EchoEar - 智能音箱语音交互核心
//!
//! 模块划分：
//! - **alarm**: 可取消、循环播放的闹钟
//! - **apps**: App 生命周期与英语学习 App（智能体角色切换）
//! - **config**: 配置加载（TOML + 环境变量）
//! - **core**: 错误分类、会话状态、优雅关闭
//! - **device**: 外部能力 trait、显示锁与模拟设备
//! - **functions**: 函数注册表、派发 worker、内置设备函数
//! - **observability**: 日志初始化
//! - **system**: 组合根
//! - **touch**: 触摸事件通道、状态机与触摸开关

pub mod alarm;
pub mod apps;
pub mod config;
pub mod core;
pub mod device;
pub mod functions;
pub mod observability;
pub mod system;
pub mod touch;

pub use alarm::{AlarmPhase, AlarmScheduler};
pub use system::{create_system, System};
