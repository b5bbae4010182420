use crossbeam_channel::Sender;

use super::{ExportArtifact, ExportError, QualityReport, SessionMetadata};
use crate::recorder::{LiveSnapshot, RecorderState};

/// 发送给记录器线程的任务
///
/// 所有会话状态的修改都经由这些任务在同一个线程上串行执行。
pub enum RecorderTask {
    Prepare {
        target_hz: u32,
        beeps: bool,
        response_sender: Sender<RecorderState>,
    },
    BeginCountdown {
        response_sender: Sender<RecorderState>,
    },
    Start {
        response_sender: Sender<RecorderState>,
    },
    Pause {
        response_sender: Sender<RecorderState>,
    },
    Resume {
        response_sender: Sender<RecorderState>,
    },
    Stop {
        response_sender: Sender<RecorderState>,
    },
    Discard {
        response_sender: Sender<RecorderState>,
    },
    Snapshot {
        response_sender: Sender<LiveSnapshot>,
    },
    /// 注册快照观察者，状态变化与界面刷新时推送
    Observe {
        observer: Sender<LiveSnapshot>,
    },
    Export {
        metadata: SessionMetadata,
        response_sender: Sender<Result<(ExportArtifact, QualityReport), ExportError>>,
    },
    Shutdown,
}
