//! 核心类型：错误分类、会话状态、优雅关闭

pub mod error;
pub mod shutdown;
pub mod state;

pub use error::{AlarmError, DeviceError, FunctionError, RegistryError};
pub use shutdown::{ShutdownCoordinator, ShutdownManager, ShutdownReason};
pub use state::{ChatEvent, ChatState};
