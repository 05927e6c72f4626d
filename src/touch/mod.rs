//! 触摸交互：事件通道、状态机与触摸开关

pub mod input;
pub mod switch;

pub use input::{touch_channel, TouchAction, TouchEvent, TouchEventSender, TouchInput};
pub use switch::{spawn_switch_watcher, sync_switch};
