//! 设备配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ECHOEAR__*` 覆盖（双下划线表示嵌套，如 `ECHOEAR__ALARM__IDLE_MS=50`）。
//! 所有字段的默认值与固件常量一致，未找到配置文件时直接使用默认值。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceSection,
    pub functions: FunctionsSection,
    pub alarm: AlarmSection,
    pub persona: PersonaSection,
    pub touch: TouchSection,
    /// open_app 可识别的应用及别名
    pub apps: Vec<AppEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: DeviceSection::default(),
            functions: FunctionsSection::default(),
            alarm: AlarmSection::default(),
            persona: PersonaSection::default(),
            touch: TouchSection::default(),
            apps: default_apps(),
        }
    }
}

/// [device] 段
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSection {
    /// 启动时头部 LED 亮度（0..=100）
    #[serde(default = "default_led_brightness")]
    pub initial_led_brightness: u8,
}

fn default_led_brightness() -> u8 {
    50
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            initial_led_brightness: default_led_brightness(),
        }
    }
}

/// 函数 worker 的栈配置
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSection {
    pub stack_size: usize,
    /// 栈是否放在外部 PSRAM
    #[serde(default = "default_true")]
    pub external_stack: bool,
}

fn default_true() -> bool {
    true
}

/// [functions] 段：各内置函数的时序与步长
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionsSection {
    #[serde(default)]
    pub open_app: OpenAppSection,
    #[serde(default = "default_volume_section")]
    pub volume: LevelSection,
    #[serde(default = "default_brightness_section")]
    pub brightness: LevelSection,
    #[serde(default = "default_alarm_worker")]
    pub alarm_worker: WorkerSection,
}

impl Default for FunctionsSection {
    fn default() -> Self {
        Self {
            open_app: OpenAppSection::default(),
            volume: default_volume_section(),
            brightness: default_brightness_section(),
            alarm_worker: default_alarm_worker(),
        }
    }
}

fn default_alarm_worker() -> WorkerSection {
    WorkerSection {
        stack_size: 4096,
        external_stack: true,
    }
}

/// [functions.open_app] 段：等待智能体说完话再切换应用
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAppSection {
    /// 开始轮询前的固定等待
    #[serde(default = "default_open_app_pre_wait_ms")]
    pub pre_wait_ms: u64,
    #[serde(default = "default_open_app_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// 轮询上限；次数 = max_wait_ms / poll_interval_ms
    #[serde(default = "default_open_app_max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "default_open_app_worker")]
    pub worker: WorkerSection,
}

fn default_open_app_pre_wait_ms() -> u64 {
    2000
}

fn default_open_app_poll_interval_ms() -> u64 {
    10
}

fn default_open_app_max_wait_ms() -> u64 {
    2000
}

fn default_open_app_worker() -> WorkerSection {
    WorkerSection {
        stack_size: 10 * 1024,
        external_stack: true,
    }
}

impl Default for OpenAppSection {
    fn default() -> Self {
        Self {
            pre_wait_ms: default_open_app_pre_wait_ms(),
            poll_interval_ms: default_open_app_poll_interval_ms(),
            max_wait_ms: default_open_app_max_wait_ms(),
            worker: default_open_app_worker(),
        }
    }
}

impl OpenAppSection {
    /// 轮询次数上限（间隔为 0 时不轮询，直接打开）
    pub fn max_polls(&self) -> u64 {
        if self.poll_interval_ms == 0 {
            return 0;
        }
        self.max_wait_ms / self.poll_interval_ms
    }
}

/// [functions.volume] / [functions.brightness] 段
#[derive(Debug, Clone, Deserialize)]
pub struct LevelSection {
    /// 「调大 / 调小」时的步长
    pub step: i32,
    pub worker: WorkerSection,
}

fn default_volume_section() -> LevelSection {
    LevelSection {
        step: 20,
        worker: WorkerSection {
            stack_size: 6 * 1024,
            external_stack: true,
        },
    }
}

fn default_brightness_section() -> LevelSection {
    LevelSection {
        step: 30,
        worker: WorkerSection {
            stack_size: 6 * 1024,
            external_stack: true,
        },
    }
}

/// [alarm] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AlarmSection {
    #[serde(default = "default_alarm_sound")]
    pub sound_uri: String,
    /// 单次播放超时
    #[serde(default = "default_alarm_play_timeout_ms")]
    pub play_timeout_ms: u64,
    /// 两次播放之间的空闲间隔，保证 dismiss 能快速生效
    #[serde(default = "default_alarm_idle_ms")]
    pub idle_ms: u64,
    /// 响铃最长持续时间，None 表示一直响到被触摸解除
    #[serde(default)]
    pub max_ring_secs: Option<u64>,
}

fn default_alarm_sound() -> String {
    "file://spiffs/boot.mp3".to_string()
}

fn default_alarm_play_timeout_ms() -> u64 {
    3000
}

fn default_alarm_idle_ms() -> u64 {
    100
}

impl Default for AlarmSection {
    fn default() -> Self {
        Self {
            sound_uri: default_alarm_sound(),
            play_timeout_ms: default_alarm_play_timeout_ms(),
            idle_ms: default_alarm_idle_ms(),
            max_ring_secs: None,
        }
    }
}

impl AlarmSection {
    pub fn play_timeout(&self) -> Duration {
        Duration::from_millis(self.play_timeout_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }
}

/// [persona] 段：英语学习 App 切换智能体角色的时序
#[derive(Debug, Clone, Deserialize)]
pub struct PersonaSection {
    /// 英语学习角色的索引
    #[serde(default = "default_target_index")]
    pub target_index: usize,
    /// 切到 AI 界面后等待 UI 稳定
    #[serde(default = "default_ui_settle_ms")]
    pub ui_settle_ms: u64,
    #[serde(default = "default_stop_settle_ms")]
    pub stop_settle_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 会话启动后等待表情子系统稳定
    #[serde(default = "default_stabilize_ms")]
    pub stabilize_ms: u64,
    #[serde(default = "default_restore_stop_settle_ms")]
    pub restore_stop_settle_ms: u64,
    #[serde(default = "default_restore_start_settle_ms")]
    pub restore_start_settle_ms: u64,
}

fn default_target_index() -> usize {
    1
}

fn default_ui_settle_ms() -> u64 {
    200
}

fn default_stop_settle_ms() -> u64 {
    100
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_max_retries() -> u32 {
    100
}

fn default_stabilize_ms() -> u64 {
    300
}

fn default_restore_stop_settle_ms() -> u64 {
    200
}

fn default_restore_start_settle_ms() -> u64 {
    300
}

impl Default for PersonaSection {
    fn default() -> Self {
        Self {
            target_index: default_target_index(),
            ui_settle_ms: default_ui_settle_ms(),
            stop_settle_ms: default_stop_settle_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            max_retries: default_max_retries(),
            stabilize_ms: default_stabilize_ms(),
            restore_stop_settle_ms: default_restore_stop_settle_ms(),
            restore_start_settle_ms: default_restore_start_settle_ms(),
        }
    }
}

/// [touch] 段
#[derive(Debug, Clone, Deserialize)]
pub struct TouchSection {
    /// 存储中没有 touch_sensor_switch 时是否启用触摸
    #[serde(default = "default_true")]
    pub enabled_by_default: bool,
}

impl Default for TouchSection {
    fn default() -> Self {
        Self {
            enabled_by_default: true,
        }
    }
}

/// [[apps]]：应用 ID 与可识别的名称
#[derive(Debug, Clone, Deserialize)]
pub struct AppEntry {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

fn app(id: u32, name: &str, aliases: &[&str]) -> AppEntry {
    AppEntry {
        id,
        name: name.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    }
}

fn default_apps() -> Vec<AppEntry> {
    vec![
        app(0, "Settings", &["setting", "settings", "设置", "设置应用", "设置app"]),
        app(1, "2048", &["2048", "game", "游戏", "2048游戏", "2048app"]),
        app(2, "Calculator", &["calculator", "calc", "计算器", "计算器应用", "计算器app"]),
        app(3, "AI Profile", &["ai", "ai配置", "ai设置", "ai设置应用", "ai设置app"]),
        app(4, "Timer", &["timer", "时钟", "时钟应用", "时钟app"]),
        app(5, "POS", &["pos", "pos应用", "posapp"]),
        app(6, "English Learning", &["english", "英语", "英语学习"]),
    ]
}

/// 从 config 目录加载配置，环境变量 ECHOEAR__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ECHOEAR__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ECHOEAR")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
