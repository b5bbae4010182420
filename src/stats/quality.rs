use log::debug;

use super::cadence::estimate_cadence_spm;
use super::DURATION_EPSILON;
use crate::types::{QualityReport, QualityScore, Sample};

/// 退化报告的样本数下限
pub const MIN_EVALUATION_SAMPLES: usize = 3;

// 评分阈值
const MAX_RATE_ERROR: f64 = 0.10;
const MAX_DROPPED_PCT: f64 = 2.0;
const MEDIAN_NORM_RANGE: (f64, f64) = (0.5, 3.0);
const CADENCE_RANGE: (f64, f64) = (80.0, 140.0);
// 间隔超过 1.5 倍期望间隔才计丢点
const DROP_TOLERANCE: f64 = 1.5;

/// 实测采样率 (n−1)/(t_last−t_first)，时长以 ε 兜底
///
/// 停止录制与质量评估共用，保证两处结果一致。
pub fn measured_rate(first_t: f64, last_t: f64, count: usize) -> (f64, f64) {
    let duration = (last_t - first_t).max(DURATION_EPSILON);
    (count.saturating_sub(1) as f64 / duration, duration)
}

/// 下中位数：排序后取下标 n/2（偶数个时不取两中间值平均）
pub fn lower_median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    Some(sorted[sorted.len() / 2])
}

/// 试验结束后的批量质量评估
#[derive(Debug, Clone, Copy)]
pub struct QualityEvaluator {
    target_hz: u32,
}

impl QualityEvaluator {
    pub fn new(target_hz: u32) -> Self {
        Self { target_hz }
    }

    pub fn evaluate(&self, samples: &[Sample]) -> QualityReport {
        if samples.len() < MIN_EVALUATION_SAMPLES {
            debug!("Quality: only {} samples, returning degenerate report", samples.len());
            return QualityReport::degenerate();
        }

        let first = samples[0].t;
        let last = samples[samples.len() - 1].t;
        let (measured_hz, duration) = measured_rate(first, last, samples.len());

        let dropped_pct = self.dropped_percent(samples);

        let norms: Vec<f64> = samples.iter().map(Sample::accel_norm).collect();
        let times: Vec<f64> = samples.iter().map(|s| s.t).collect();
        let median = lower_median(&norms);
        let cadence = estimate_cadence_spm(&times, &norms);

        let target = self.target_hz as f64;
        let mut score = QualityScore::Ok;
        if (measured_hz - target).abs() / target > MAX_RATE_ERROR {
            score = QualityScore::Attention;
        }
        if dropped_pct > MAX_DROPPED_PCT {
            score = QualityScore::Attention;
        }
        if let Some(m) = median {
            if !(MEDIAN_NORM_RANGE.0..=MEDIAN_NORM_RANGE.1).contains(&m) {
                score = QualityScore::Attention;
            }
        }
        if cadence != 0.0 && !(CADENCE_RANGE.0..=CADENCE_RANGE.1).contains(&cadence) {
            score = QualityScore::Attention;
        }

        QualityReport {
            measured_hz,
            dropped_pct,
            duration_real: duration,
            cadence_spm: if cadence == 0.0 { None } else { Some(cadence) },
            accel_median_norm: median,
            score,
        }
    }

    /// 按相邻样本间隔估计期望槽位数与丢失槽位数
    fn dropped_percent(&self, samples: &[Sample]) -> f64 {
        let expected_dt = 1.0 / self.target_hz as f64;
        let mut dropped: i64 = 0;
        let mut total_slots: i64 = 0;

        for pair in samples.windows(2) {
            let dt = pair[1].t - pair[0].t;
            let slots = (dt / expected_dt).round() as i64;
            total_slots += slots.max(1);
            if dt > DROP_TOLERANCE * expected_dt {
                dropped += (slots - 1).max(0);
            }
        }

        if total_slots > 0 {
            100.0 * dropped as f64 / total_slots as f64
        } else {
            0.0
        }
    }
}
