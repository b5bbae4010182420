use std::fmt;

use serde::Serialize;

use crate::stats::RollingWindow;
use crate::types::Sample;

/// 试验生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecorderState {
    Idle,
    CountingDown,
    Recording,
    Paused,
    Finished,
}

impl RecorderState {
    /// 是否接收传感器样本
    pub fn accepts_samples(&self) -> bool {
        matches!(self, RecorderState::Recording | RecorderState::Paused)
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecorderState::Idle => "idle",
            RecorderState::CountingDown => "countingDown",
            RecorderState::Recording => "recording",
            RecorderState::Paused => "paused",
            RecorderState::Finished => "finished",
        };
        f.write_str(label)
    }
}

/// 实时统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LiveStats {
    pub measured_hz: f64,
    pub avg_accel_norm: f64,
    pub cadence_spm: f64,
    pub elapsed: f64,
}

/// 发布给界面等观察者的只读快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveSnapshot {
    pub state: RecorderState,
    pub session_id: String,
    pub sample_count: usize,
    pub stats: LiveStats,
}

impl Default for LiveSnapshot {
    fn default() -> Self {
        Self {
            state: RecorderState::Idle,
            session_id: String::new(),
            sample_count: 0,
            stats: LiveStats::default(),
        }
    }
}

/// 一次试验的聚合数据，只由记录器修改
#[derive(Debug, Clone)]
pub struct TrialSession {
    pub session_id: String,
    pub target_hz: u32,
    pub beeps: bool,
    pub samples: Vec<Sample>,
    /// 第一个被接受样本的时间戳
    pub t0: Option<f64>,
    pub window: RollingWindow,
    pub stats: LiveStats,
}

impl TrialSession {
    pub fn new(session_id: String, target_hz: u32, beeps: bool) -> Self {
        Self {
            session_id,
            target_hz,
            beeps,
            samples: Vec::new(),
            t0: None,
            window: RollingWindow::default(),
            stats: LiveStats::default(),
        }
    }

    /// 追加样本并刷新实时统计
    pub fn ingest(&mut self, sample: Sample) {
        let t = sample.t;
        let t0 = *self.t0.get_or_insert(t);
        let norm = sample.accel_norm();
        self.samples.push(sample);

        self.window.push(t, norm);
        self.stats.avg_accel_norm = self.window.average();
        self.stats.cadence_spm = self.window.cadence_spm();
        self.stats.elapsed = (t - t0).max(0.0);
    }

    /// 清空样本与统计，保留会话编号与配置
    pub fn clear(&mut self) {
        self.samples.clear();
        self.t0 = None;
        self.window.clear();
        self.stats = LiveStats::default();
    }

    pub fn first_t(&self) -> Option<f64> {
        self.samples.first().map(|s| s.t)
    }

    pub fn last_t(&self) -> Option<f64> {
        self.samples.last().map(|s| s.t)
    }
}
