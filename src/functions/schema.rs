//! 函数调用请求格式与 JSON Schema（schemars 自动生成）
//!
//! 智能体接入层把自然语言工具调用转成 `{"name": "...", "arguments": {...}}`，再交给 FunctionDispatcher::invoke。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

/// 函数调用请求格式（仅用于 Schema 生成；参数目前都是字符串，数值也以字符串传递）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct FunctionCallFormat {
    /// 函数名，如 open_app、set_volume、set_brightness、set_alarm
    pub name: String,
    /// 函数参数（app_name、level、seconds_from_now 等）
    pub arguments: HashMap<String, String>,
}

/// 解析后的函数调用
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// 返回函数调用的 JSON Schema 字符串
pub fn function_call_schema_json() -> String {
    let schema = schema_for!(FunctionCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

/// 解析一条函数调用 JSON
pub fn parse_function_call(raw: &str) -> Result<FunctionCall, serde_json::Error> {
    serde_json::from_str(raw.trim())
}
