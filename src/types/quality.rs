use std::fmt;

use serde::{Deserialize, Serialize};

/// 试验质量等级
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum QualityScore {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "Attention")]
    Attention,
    /// 样本少于 3 个时的退化结果
    #[serde(rename = "Mauvaise qualité")]
    Poor,
}

impl QualityScore {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityScore::Ok => "OK",
            QualityScore::Attention => "Attention",
            QualityScore::Poor => "Mauvaise qualité",
        }
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次完成试验的质量报告，只计算一次，不可变
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub measured_hz: f64,
    pub dropped_pct: f64,
    pub duration_real: f64,
    pub cadence_spm: Option<f64>,
    pub accel_median_norm: Option<f64>,
    pub score: QualityScore,
}

impl QualityReport {
    /// 退化报告：measuredHz=0, droppedPct=100, durationReal=0
    pub fn degenerate() -> Self {
        Self {
            measured_hz: 0.0,
            dropped_pct: 100.0,
            duration_real: 0.0,
            cadence_spm: None,
            accel_median_norm: None,
            score: QualityScore::Poor,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.score == QualityScore::Poor
    }
}
