use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 应用配置管理模块
/// 每个可识别的选项都在这里列出并给出默认值，加载后统一校验一次

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub recorder: RecorderConfig,
    pub export: ExportConfig,
    pub source: SourceConfig,
    pub channels: ChannelConfig,
}

/// 记录器配置
///
/// 360 秒上限、30 秒提示间隔与 5 秒滚动窗口是固定常量，不在此配置。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecorderConfig {
    pub target_hz: u32,
    pub beeps: bool,
    pub countdown_seconds: u32,
    pub ui_refresh_ms: u64,
    /// 短于此时长的试验导出时带 short=true 标记
    pub short_trial_seconds: f64,
}

/// 导出配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: String,
    pub folder_prefix: String,
    pub strict_anonymization: bool,
    pub use_semicolon_delimiter: bool,
    pub analytics_log: bool,
}

/// 传感器源种类
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Simulated,
    Mqtt,
}

/// 传感器源配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub simulated: SimulatedConfig,
    pub mqtt: MqttConfig,
}

/// 模拟步行信号配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulatedConfig {
    pub available: bool,
    pub step_hz: f64,
    pub base_norm: f64,
    pub amplitude: f64,
    pub noise: f64,
}

/// MQTT配置，用户名密码从环境变量 MQTT_USER / MQTT_PASS 读取
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub topic: String,
    pub keep_alive: u16,
}

/// 通道配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    pub task_channel_capacity: usize,
    pub snapshot_channel_capacity: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            target_hz: 100,
            beeps: true,
            countdown_seconds: 3,
            ui_refresh_ms: 100,
            short_trial_seconds: 20.0,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: "data".to_string(),
            folder_prefix: "GaitSense".to_string(),
            strict_anonymization: false,
            use_semicolon_delimiter: false,
            analytics_log: true,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Simulated,
            simulated: SimulatedConfig::default(),
            mqtt: MqttConfig::default(),
        }
    }
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            available: true,
            step_hz: 1.8,
            base_norm: 1.0,
            amplitude: 0.35,
            noise: 0.03,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "gaitsense_client".to_string(),
            topic: "sensor/motion".to_string(),
            keep_alive: 5,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            task_channel_capacity: 64,
            snapshot_channel_capacity: 32,
        }
    }
}

impl AppConfig {
    /// 从文件加载配置，缺省字段取默认值
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(ConfigError::IoError)?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(ConfigError::ParseError)?;

        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(ConfigError::SerializeError)?;

        std::fs::write(path, content)
            .map_err(ConfigError::IoError)?;

        Ok(())
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=1000).contains(&self.recorder.target_hz) {
            return Err(ConfigError::ValidationError("Target rate must be within 1..=1000 Hz".to_string()));
        }

        if self.recorder.ui_refresh_ms == 0 {
            return Err(ConfigError::ValidationError("UI refresh interval must be positive".to_string()));
        }

        if !(self.recorder.short_trial_seconds >= 0.0) {
            return Err(ConfigError::ValidationError("Short trial threshold must not be negative".to_string()));
        }

        if self.export.folder_prefix.trim().is_empty() {
            return Err(ConfigError::ValidationError("Folder prefix must not be empty".to_string()));
        }

        if self.source.kind == SourceKind::Mqtt && self.source.mqtt.topic.is_empty() {
            return Err(ConfigError::ValidationError("MQTT topic must not be empty".to_string()));
        }

        if self.source.simulated.step_hz <= 0.0 {
            return Err(ConfigError::ValidationError("Simulated step frequency must be positive".to_string()));
        }

        if self.channels.task_channel_capacity == 0 || self.channels.snapshot_channel_capacity == 0 {
            return Err(ConfigError::ValidationError("Channel capacities must be positive".to_string()));
        }

        Ok(())
    }

    /// 会话文件目录 <output_dir>/<folder_prefix>/sessions
    pub fn get_sessions_directory(&self) -> PathBuf {
        self.get_base_directory().join("sessions")
    }

    pub fn get_base_directory(&self) -> PathBuf {
        PathBuf::from(&self.export.output_dir).join(&self.export.folder_prefix)
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(toml::de::Error),
    #[error("Serialize error: {0}")]
    SerializeError(toml::ser::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// 配置管理器
pub struct ConfigManager {
    config: AppConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// 创建配置管理器
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            config_path: None,
        }
    }

    /// 从文件加载配置
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let config = AppConfig::load_from_file(&path)?;
        Ok(Self {
            config,
            config_path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// 获取当前配置
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// 获取可变配置
    pub fn get_config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    pub fn config_path(&self) -> Option<&std::path::Path> {
        self.config_path.as_deref()
    }

    /// 保存配置
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.config_path {
            self.config.validate()?;
            self.config.save_to_file(path)?;
        }
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
