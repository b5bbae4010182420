use std::collections::VecDeque;

use super::cadence::estimate_cadence_spm;

/// 实时反馈窗口长度（秒）
pub const WINDOW_SECONDS: f64 = 5.0;

/// 最近 5 秒的 (时间戳, 模长) 滚动窗口，只用于实时显示，不持久化
#[derive(Debug, Clone)]
pub struct RollingWindow {
    times: VecDeque<f64>,
    norms: VecDeque<f64>,
    window_seconds: f64,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::new(WINDOW_SECONDS)
    }
}

impl RollingWindow {
    pub fn new(window_seconds: f64) -> Self {
        Self {
            times: VecDeque::new(),
            norms: VecDeque::new(),
            window_seconds,
        }
    }

    /// 追加新点，并从前端移除超出窗口的旧点
    pub fn push(&mut self, t: f64, norm: f64) {
        self.times.push_back(t);
        self.norms.push_back(norm);

        while let Some(&first) = self.times.front() {
            if t - first > self.window_seconds {
                self.times.pop_front();
                self.norms.pop_front();
            } else {
                break;
            }
        }
    }

    /// 窗口内模长的算术平均（空窗口分母取 1）
    pub fn average(&self) -> f64 {
        let count = self.norms.len().max(1);
        self.norms.iter().sum::<f64>() / count as f64
    }

    pub fn cadence_spm(&mut self) -> f64 {
        let times = self.times.make_contiguous();
        let norms = self.norms.make_contiguous();
        estimate_cadence_spm(times, norms)
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn oldest(&self) -> Option<f64> {
        self.times.front().copied()
    }

    pub fn clear(&mut self) {
        self.times.clear();
        self.norms.clear();
    }
}
