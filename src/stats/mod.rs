//! 实时滚动统计与试验质量评估

pub mod cadence;
pub mod rolling;
pub mod quality;

pub use cadence::estimate_cadence_spm;
pub use rolling::RollingWindow;
pub use quality::{lower_median, measured_rate, QualityEvaluator};

/// 防止时长为零时除零
pub const DURATION_EPSILON: f64 = 1e-6;
