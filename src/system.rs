//! 组合根：把外部能力装配成函数注册表、闹钟、触摸处理与 App
//!
//! 所有组件都由这里显式构造并通过 Arc 共享，进程内不存在全局单例。

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alarm::AlarmScheduler;
use crate::apps::EnglishLearningApp;
use crate::config::AppConfig;
use crate::core::RegistryError;
use crate::device::Capabilities;
use crate::functions::{
    AppDirectory, FunctionDefinition, FunctionDispatcher, FunctionRegistry, LevelFunction,
    LevelKind, OpenAppFunction, SetAlarmFunction, ValueKind, WorkerConfig,
};
use crate::touch::{spawn_switch_watcher, sync_switch, TouchEvent, TouchInput};

/// 装配好的系统
pub struct System {
    pub dispatcher: FunctionDispatcher,
    pub alarm: AlarmScheduler,
    pub touch: Arc<TouchInput>,
    pub english: Arc<EnglishLearningApp>,
    pub apps: AppDirectory,
    capabilities: Capabilities,
}

/// 构建函数注册表（open_app / set_volume / set_brightness / set_alarm）
pub fn build_registry(
    cfg: &AppConfig,
    caps: &Capabilities,
    apps: AppDirectory,
    alarm: AlarmScheduler,
) -> Result<FunctionRegistry, RegistryError> {
    let functions = &cfg.functions;
    let mut registry = FunctionRegistry::new();

    let open_app = OpenAppFunction::new(
        caps.agent.clone(),
        caps.display.clone(),
        apps,
        functions.open_app.clone(),
    );
    registry.register(
        FunctionDefinition::new(OpenAppFunction::NAME, "Open a specific app.打开一个应用", open_app)
            .with_parameter(
                OpenAppFunction::PARAM,
                "The name of the app to open.应用名称",
                ValueKind::String,
            )
            .with_worker(WorkerConfig::from_section("open_app", &functions.open_app.worker)),
    )?;

    let volume = LevelFunction::new(
        LevelKind::Volume,
        caps.store.clone(),
        caps.expression.clone(),
        functions.volume.step,
    );
    registry.register(
        FunctionDefinition::new(
            LevelKind::Volume.function_name(),
            "Adjust the system volume. Range is from 0 to 100; a negative value lowers and a value above 100 raises it by one step.",
            volume,
        )
        .with_parameter(
            LevelFunction::PARAM,
            "The desired volume level (0 to 100), or down / up.",
            ValueKind::String,
        )
        .with_worker(WorkerConfig::from_section("volume_change", &functions.volume.worker)),
    )?;

    let brightness = LevelFunction::new(
        LevelKind::Brightness,
        caps.store.clone(),
        caps.expression.clone(),
        functions.brightness.step,
    );
    registry.register(
        FunctionDefinition::new(
            LevelKind::Brightness.function_name(),
            "Adjust the system brightness. Range is from 10 to 100; a negative value lowers and a value above 100 raises it by one step.",
            brightness,
        )
        .with_parameter(
            LevelFunction::PARAM,
            "The desired brightness level (10 to 100), or down / up.",
            ValueKind::String,
        )
        .with_worker(WorkerConfig::from_section(
            "brightness_change",
            &functions.brightness.worker,
        )),
    )?;

    registry.register(
        FunctionDefinition::new(
            SetAlarmFunction::NAME,
            "设置一个闹钟，在指定时间后提醒",
            SetAlarmFunction::new(alarm),
        )
        .with_parameter(
            SetAlarmFunction::PARAM,
            "闹钟多少秒以后响（正整数，单位秒）",
            ValueKind::String,
        )
        .with_worker(WorkerConfig::from_section("set_alarm", &functions.alarm_worker)),
    )?;

    Ok(registry)
}

/// 装配系统：注册函数、初始化 LED 亮度并同步触摸开关
pub fn create_system(
    cfg: &AppConfig,
    caps: Capabilities,
    runtime: Handle,
) -> Result<System, RegistryError> {
    let apps = AppDirectory::new(&cfg.apps);
    let alarm = AlarmScheduler::new(
        caps.audio.clone(),
        caps.display.clone(),
        cfg.alarm.clone(),
        runtime.clone(),
    );

    let registry = build_registry(cfg, &caps, apps.clone(), alarm.clone())?;
    tracing::info!(
        functions = ?registry.function_names(),
        "Function registry ready"
    );
    let dispatcher = FunctionDispatcher::new(Arc::new(registry), runtime);

    caps.led.set_brightness(cfg.device.initial_led_brightness);

    let touch = Arc::new(TouchInput::new(
        caps.agent.clone(),
        caps.expression.clone(),
        caps.led.clone(),
        alarm.clone(),
        cfg.touch.enabled_by_default,
    ));
    sync_switch(&touch, caps.store.as_ref());

    let english = Arc::new(EnglishLearningApp::new(
        caps.agent.clone(),
        caps.expression.clone(),
        caps.display.clone(),
        cfg.persona.clone(),
    ));

    Ok(System {
        dispatcher,
        alarm,
        touch,
        english,
        apps,
        capabilities: caps,
    })
}

impl System {
    /// 启动后台任务：触摸事件循环与触摸开关订阅，随 shutdown 一起退出
    pub fn start(
        &self,
        touch_rx: tokio::sync::mpsc::UnboundedReceiver<TouchEvent>,
        shutdown: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        vec![
            self.touch.clone().spawn(touch_rx, shutdown.clone()),
            spawn_switch_watcher(
                self.touch.clone(),
                self.capabilities.store.clone(),
                shutdown,
            ),
        ]
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{keys, HeadLed, SettingsStore, SimulatedDevice};

    #[tokio::test]
    async fn test_create_system_registers_builtin_functions() {
        let device = SimulatedDevice::new();
        let system = create_system(&AppConfig::default(), device.capabilities(), Handle::current())
            .unwrap();

        assert_eq!(
            system.dispatcher.registry().function_names(),
            vec!["open_app", "set_alarm", "set_brightness", "set_volume"]
        );
        let volume = system.dispatcher.registry().get("set_volume").unwrap();
        assert_eq!(volume.worker_config().task_name, "volume_change");
        assert_eq!(device.led.brightness(), 50);
        assert!(system.touch.is_enabled());
    }

    #[tokio::test]
    async fn test_touch_switch_read_at_startup() {
        let device = SimulatedDevice::new();
        device
            .store
            .set(keys::TOUCH_SENSOR_SWITCH, 0)
            .unwrap();
        let system = create_system(&AppConfig::default(), device.capabilities(), Handle::current())
            .unwrap();
        assert!(!system.touch.is_enabled());
    }
}
