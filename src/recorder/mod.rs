//! 试验记录器：状态机、计时器与记录器线程

pub mod clock;
pub mod handle;
pub mod session_recorder;
pub mod state;
pub mod timers;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use handle::{run_recorder_handler, RecorderHandle};
pub use session_recorder::SessionRecorder;
pub use state::{LiveSnapshot, LiveStats, RecorderState, TrialSession};
pub use timers::{TimerArena, TimerId, TimerKind};

/// 单次试验时长上限（秒），到时自动停止
pub const TRIAL_CAP_SECONDS: u64 = 360;
/// 录制中提示音间隔（秒）
pub const CUE_INTERVAL_SECONDS: u64 = 30;
