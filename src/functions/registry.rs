//! 函数注册表
//!
//! 每个函数由名称、描述、有序参数表、回调（FunctionHandler）与可选的 worker 配置组成，
//! 由 FunctionRegistry 按名注册与查找；启动时一次性注册，之后以 Arc 只读共享。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::WorkerSection;
use crate::core::{FunctionError, RegistryError};

/// 参数值类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Number,
    Boolean,
}

impl ValueKind {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
        }
    }

    fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

/// 函数参数声明
#[derive(Clone, Debug)]
pub struct FunctionParameter {
    pub name: String,
    pub description: String,
    pub kind: ValueKind,
}

/// worker 栈所在的内存区域
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MemoryRegion {
    #[default]
    Internal,
    /// 外部 PSRAM
    External,
}

/// 派发 worker 配置：任务名、栈大小、内存区域
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    pub task_name: String,
    pub stack_size: usize,
    pub region: MemoryRegion,
}

/// 未指定时的默认栈大小
pub const DEFAULT_STACK_SIZE: usize = 4096;

impl WorkerConfig {
    pub fn new(task_name: impl Into<String>, stack_size: usize, region: MemoryRegion) -> Self {
        Self {
            task_name: task_name.into(),
            stack_size,
            region,
        }
    }

    pub fn from_section(task_name: impl Into<String>, section: &WorkerSection) -> Self {
        let region = if section.external_stack {
            MemoryRegion::External
        } else {
            MemoryRegion::Internal
        };
        Self::new(task_name, section.stack_size, region)
    }

    pub fn default_for(function_name: &str) -> Self {
        Self::new(function_name, DEFAULT_STACK_SIZE, MemoryRegion::Internal)
    }
}

/// 已校验的调用参数
#[derive(Clone, Debug, Default)]
pub struct FunctionArgs {
    values: Map<String, Value>,
}

impl FunctionArgs {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// 取字符串参数；缺失或类型不符时返回 InvalidArgument
    pub fn str(&self, name: &str) -> Result<&str, FunctionError> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| FunctionError::invalid_argument(name, "expected a string"))
    }
}

/// 函数回调：在独立 worker 上执行，只持有自身捕获的上下文
#[async_trait]
pub trait FunctionHandler: Send + Sync {
    async fn call(&self, args: &FunctionArgs) -> Result<(), FunctionError>;
}

/// 函数定义，注册后不可变
#[derive(Clone)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Vec<FunctionParameter>,
    pub handler: Arc<dyn FunctionHandler>,
    pub worker: Option<WorkerConfig>,
}

impl FunctionDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: impl FunctionHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            handler: Arc::new(handler),
            worker: None,
        }
    }

    pub fn with_parameter(mut self, name: &str, description: &str, kind: ValueKind) -> Self {
        self.parameters.push(FunctionParameter {
            name: name.to_string(),
            description: description.to_string(),
            kind,
        });
        self
    }

    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = Some(worker);
        self
    }

    /// 实际使用的 worker 配置（未指定时取默认值）
    pub fn worker_config(&self) -> WorkerConfig {
        self.worker
            .clone()
            .unwrap_or_else(|| WorkerConfig::default_for(&self.name))
    }

    /// 按声明校验参数：每个声明的参数都必须存在且类型匹配；多余参数忽略
    pub fn validate(&self, arguments: &Value) -> Result<FunctionArgs, String> {
        let empty = Map::new();
        let object = match arguments {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => return Err(format!("arguments must be an object, got {other}")),
        };
        for param in &self.parameters {
            match object.get(&param.name) {
                None => return Err(format!("missing parameter '{}'", param.name)),
                Some(v) if !param.kind.matches(v) => {
                    return Err(format!(
                        "parameter '{}' expects {}",
                        param.name,
                        param.kind.json_type()
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(FunctionArgs::new(object.clone()))
    }

    /// 参数 JSON Schema（供智能体生成正确的调用格式）
    pub fn parameters_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| {
                (
                    p.name.clone(),
                    serde_json::json!({ "type": p.kind.json_type(), "description": p.description }),
                )
            })
            .collect();
        let required: Vec<&str> = self.parameters.iter().map(|p| p.name.as_str()).collect();
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }
}

impl std::fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionDefinition")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}

/// 函数注册表：按名称存储 Arc<FunctionDefinition>
#[derive(Default, Debug)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<FunctionDefinition>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册函数；同名已存在时返回 DuplicateFunction
    pub fn register(&mut self, definition: FunctionDefinition) -> Result<(), RegistryError> {
        if self.functions.contains_key(&definition.name) {
            return Err(RegistryError::DuplicateFunction(definition.name));
        }
        tracing::debug!(function = %definition.name, "function registered");
        self.functions
            .insert(definition.name.clone(), Arc::new(definition));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<FunctionDefinition>> {
        self.functions.get(name).cloned()
    }

    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    /// 生成函数列表 JSON（名称、描述、参数 schema），交给智能体接入层
    pub fn to_schema_json(&self) -> String {
        let mut functions: Vec<&Arc<FunctionDefinition>> = self.functions.values().collect();
        functions.sort_by(|a, b| a.name.cmp(&b.name));
        let list: Vec<Value> = functions
            .into_iter()
            .map(|f| {
                serde_json::json!({
                    "name": f.name,
                    "description": f.description,
                    "parameters": f.parameters_schema()
                })
            })
            .collect();
        serde_json::to_string_pretty(&list).unwrap_or_else(|_| "[]".to_string())
    }
}
