//! 提示音：只决定何时播放，不关心如何发声

pub mod player;

use log::info;

pub use player::ToneCuePlayer;

/// 提示音种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// 短促提示（倒计时每秒、录制中每 30 秒）
    Tick,
    /// 开始录制
    Go,
    /// 录制结束
    End,
}

impl Cue {
    /// (频率 Hz, 时长 ms)
    pub fn tone(&self) -> (f32, u64) {
        match self {
            Cue::Tick => (880.0, 80),
            Cue::Go => (1320.0, 300),
            Cue::End => (660.0, 400),
        }
    }
}

/// 提示音协作方，调用即返回
pub trait CuePlayer: Send {
    fn play(&self, cue: Cue);
}

/// 无音频输出时只记录日志
#[derive(Debug, Default)]
pub struct LogCuePlayer;

impl CuePlayer for LogCuePlayer {
    fn play(&self, cue: Cue) {
        info!("Cue: {:?}", cue);
    }
}
