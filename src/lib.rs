//! GaitSense：步态试验记录核心
//!
//! 录制单次行走试验的运动传感器数据，实时给出步频与加速度统计，
//! 结束后评估数据质量并导出为 CSV。

pub mod audio;
pub mod config;
pub mod export;
pub mod logger;
pub mod recorder;
pub mod sensor;
pub mod stats;
pub mod types;
pub mod utils;

pub use config::{AppConfig, ConfigError, ConfigManager};
pub use recorder::{LiveSnapshot, RecorderHandle, RecorderState, SessionRecorder};
pub use types::{ExportError, QualityReport, QualityScore, Sample, SessionMetadata};
