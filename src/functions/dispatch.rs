//! 函数派发 worker
//!
//! 每次调用都新建一个独立的具名线程（栈大小取自函数定义），在共享的 tokio 运行时句柄上跑完回调后退出；
//! worker 不会超过一次调用的生命周期。未知函数与参数不合法只记录告警，不向调用方返回错误。
//! 每次调用输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::functions::{FunctionDefinition, FunctionRegistry, MemoryRegion};

/// 宿主机线程的最小栈；固件栈尺寸（几 KB）不足以驱动 tokio future
pub const HOST_MIN_STACK: usize = 256 * 1024;

/// 一次 invoke 的结果
#[derive(Debug)]
pub enum Dispatch {
    /// 已创建 worker
    Scheduled(WorkerHandle),
    /// 未注册的函数名，未创建任何任务
    UnknownFunction,
    /// 参数校验失败，未创建任何任务
    Rejected(String),
    /// 线程创建失败
    SpawnFailed(String),
}

/// worker 执行结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed,
    Failed(String),
    Panicked,
}

/// worker 句柄：可等待其结束（丢弃句柄不会影响 worker 运行）
#[derive(Debug)]
pub struct WorkerHandle {
    pub invocation_id: Uuid,
    pub task_name: String,
    outcome: oneshot::Receiver<WorkerOutcome>,
}

impl WorkerHandle {
    pub async fn join(self) -> WorkerOutcome {
        self.outcome.await.unwrap_or(WorkerOutcome::Panicked)
    }
}

/// 函数派发器：持有只读注册表与运行时句柄
#[derive(Clone)]
pub struct FunctionDispatcher {
    registry: Arc<FunctionRegistry>,
    runtime: Handle,
}

impl FunctionDispatcher {
    pub fn new(registry: Arc<FunctionRegistry>, runtime: Handle) -> Self {
        Self { registry, runtime }
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    /// 查找并校验后，在新 worker 上执行回调
    pub fn invoke(&self, name: &str, arguments: Value) -> Dispatch {
        let Some(definition) = self.registry.get(name) else {
            tracing::warn!(function = name, "Function not found, call dropped");
            return Dispatch::UnknownFunction;
        };

        let args = match definition.validate(&arguments) {
            Ok(args) => args,
            Err(reason) => {
                tracing::warn!(function = name, %reason, "Invalid arguments, call dropped");
                return Dispatch::Rejected(reason);
            }
        };

        let invocation_id = Uuid::new_v4();
        let worker = definition.worker_config();
        let (tx, rx) = oneshot::channel();
        let runtime = self.runtime.clone();
        let def = Arc::clone(&definition);
        let span = tracing::info_span!(
            "function_worker",
            function = %def.name,
            invocation = %invocation_id,
            stack_size = worker.stack_size,
            external_stack = worker.region == MemoryRegion::External,
        );

        let spawned = std::thread::Builder::new()
            .name(worker.task_name.clone())
            .stack_size(worker.stack_size.max(HOST_MIN_STACK))
            .spawn(move || {
                let _enter = span.enter();
                let outcome = run_worker(&runtime, &def, invocation_id, args);
                let _ = tx.send(outcome);
            });

        match spawned {
            Ok(_) => Dispatch::Scheduled(WorkerHandle {
                invocation_id,
                task_name: worker.task_name,
                outcome: rx,
            }),
            Err(e) => {
                tracing::error!(function = name, error = %e, "Failed to spawn function worker");
                Dispatch::SpawnFailed(e.to_string())
            }
        }
    }
}

fn run_worker(
    runtime: &Handle,
    def: &FunctionDefinition,
    invocation_id: Uuid,
    args: crate::functions::FunctionArgs,
) -> WorkerOutcome {
    let start = Instant::now();
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
        runtime.block_on(def.handler.call(&args))
    }));

    let outcome = match result {
        Ok(Ok(())) => WorkerOutcome::Completed,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Function call failed");
            WorkerOutcome::Failed(e.to_string())
        }
        Err(_) => {
            tracing::error!("Function worker panicked");
            WorkerOutcome::Panicked
        }
    };

    let audit = serde_json::json!({
        "event": "function_audit",
        "function": def.name,
        "invocation_id": invocation_id.to_string(),
        "outcome": match &outcome {
            WorkerOutcome::Completed => "ok",
            WorkerOutcome::Failed(_) => "error",
            WorkerOutcome::Panicked => "panic",
        },
        "duration_ms": start.elapsed().as_millis() as u64,
        "args_preview": args_preview(&args),
    });
    tracing::info!(audit = %audit.to_string(), "function");
    outcome
}

fn args_preview(args: &crate::functions::FunctionArgs) -> String {
    let s = Value::Object(args.values().clone()).to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
