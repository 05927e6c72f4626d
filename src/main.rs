//! EchoEar 交互核心 - 主机模拟器
//!
//! 入口：初始化日志、加载配置、用模拟设备装配系统，然后从 stdin 读取命令：
//! - `call <json>`：模拟智能体发起函数调用，如 `call {"name":"set_volume","arguments":{"level":"-1"}}`
//! - `touch <click|long|down|up>`：模拟触摸事件
//! - `app <run|close|pause|resume>`：驱动英语学习 App
//! - `functions`：打印函数列表
//! - `status` / `quit`

use std::sync::Arc;

use anyhow::Context;
use echoear::{
    apps::App,
    config::load_config,
    core::{
        shutdown::{run_with_graceful_shutdown, AlarmCleanup, AppCleanup},
        ShutdownCoordinator, ShutdownManager, ShutdownReason,
    },
    device::{keys, ChatAgent, HeadLed, SettingsStore, SimulatedDevice},
    functions::{parse_function_call, Dispatch},
    observability,
    system::{create_system, System},
    touch::{touch_channel, TouchEvent, TouchEventSender},
};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load configuration")?;
    let device = SimulatedDevice::new();
    let system = Arc::new(
        create_system(&cfg, device.capabilities(), tokio::runtime::Handle::current())
            .context("Failed to wire system")?,
    );

    let shutdown = Arc::new(ShutdownManager::new());
    let (touch_tx, touch_rx) = touch_channel();
    let background = system.start(touch_rx, shutdown.token());

    let mut coordinator = ShutdownCoordinator::new();
    coordinator.register(AppCleanup::new(system.english.clone()));
    coordinator.register(AlarmCleanup::new(system.alarm.clone()));

    println!("EchoEar simulator ready. Type `functions`, `status` or `quit`.");

    let loop_system = system.clone();
    let loop_shutdown = shutdown.clone();
    run_with_graceful_shutdown(
        shutdown.clone(),
        async move {
            if let Err(e) = command_loop(loop_system, touch_tx, loop_shutdown).await {
                tracing::error!("Command loop failed: {:#}", e);
            }
        },
        move || async move {
            shutdown.shutdown(ShutdownReason::UserInitiated);
            coordinator.run_cleanup().await;
            for handle in background {
                let _ = handle.await;
            }
        },
    )
    .await;

    Ok(())
}

async fn command_loop(
    system: Arc<System>,
    touch: TouchEventSender,
    shutdown: Arc<ShutdownManager>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "" => {}
            "call" => call_function(&system, rest),
            "touch" => match TouchEvent::parse(rest) {
                Some(event) => {
                    if !touch.send(event) {
                        tracing::warn!("Touch loop is not running");
                    }
                }
                None => println!("usage: touch <click|long|down|up>"),
            },
            "app" => drive_app(&system, rest.trim()).await,
            "functions" => println!("{}", system.dispatcher.registry().to_schema_json()),
            "status" => print_status(&system),
            "quit" | "exit" => {
                shutdown.shutdown(ShutdownReason::UserInitiated);
                break;
            }
            other => println!("unknown command: {other}"),
        }
    }
    Ok(())
}

fn call_function(system: &System, raw: &str) {
    let call = match parse_function_call(raw) {
        Ok(call) => call,
        Err(e) => {
            println!("invalid function call: {e}");
            return;
        }
    };

    match system.dispatcher.invoke(&call.name, call.arguments) {
        Dispatch::Scheduled(handle) => {
            let name = call.name;
            tokio::spawn(async move {
                let outcome = handle.join().await;
                tracing::info!(function = %name, ?outcome, "Function call finished");
            });
        }
        Dispatch::UnknownFunction => println!("unknown function: {}", call.name),
        Dispatch::Rejected(reason) => println!("rejected: {reason}"),
        Dispatch::SpawnFailed(reason) => println!("worker spawn failed: {reason}"),
    }
}

async fn drive_app(system: &System, action: &str) {
    let app = system.english.as_ref();
    match action {
        "run" => {
            let outcome = app.run().await;
            println!("{}: {:?}", app.name(), outcome);
        }
        "close" => app.close().await,
        "pause" => app.pause().await,
        "resume" => app.resume().await,
        _ => println!("usage: app <run|close|pause|resume>"),
    }
}

fn print_status(system: &System) {
    let caps = system.capabilities();
    let setting = |key: &str| {
        caps.store
            .get(key)
            .map(|v| v.to_string())
            .unwrap_or_else(|e| e.to_string())
    };
    println!("chat state : {:?}", caps.agent.chat_state());
    println!(
        "persona    : {}",
        caps.agent
            .current_persona_index()
            .map(|i| i.to_string())
            .unwrap_or_else(|e| e.to_string())
    );
    println!("alarm      : {:?}", system.alarm.state());
    println!("volume     : {}", setting(keys::VOLUME));
    println!("brightness : {}", setting(keys::BRIGHTNESS));
    println!("head led   : {}", caps.led.brightness());
    println!("touch      : {}", if system.touch.is_enabled() { "on" } else { "off" });
    println!("english app: {:?}", system.english.phase());
}
