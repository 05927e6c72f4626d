//! 函数调用：注册表、派发 worker、内置设备函数与调用格式

pub mod app_directory;
pub mod builtin;
pub mod dispatch;
pub mod registry;
pub mod schema;

pub use app_directory::AppDirectory;
pub use builtin::{LevelFunction, LevelKind, LevelRequest, OpenAppFunction, SetAlarmFunction};
pub use dispatch::{Dispatch, FunctionDispatcher, WorkerHandle, WorkerOutcome};
pub use registry::{
    FunctionArgs, FunctionDefinition, FunctionHandler, FunctionParameter, FunctionRegistry,
    MemoryRegion, ValueKind, WorkerConfig,
};
pub use schema::{function_call_schema_json, parse_function_call, FunctionCall};
