use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, Sender};
use log::{error, info, warn};

use super::clock::Clock;
use super::session_recorder::SessionRecorder;
use super::state::{LiveSnapshot, RecorderState};
use crate::audio::CuePlayer;
use crate::config::{ChannelConfig, RecorderConfig};
use crate::export::SessionExporter;
use crate::sensor::SampleSource;
use crate::types::{ExportArtifact, QualityReport, RecorderError, RecorderTask, SessionMetadata};

// 没有计时器时的最长等待
const IDLE_WAIT: Duration = Duration::from_millis(500);

/// 记录器线程主循环
///
/// 任务、传感器事件与计时器都在这一个线程上串行处理。
/// 处理任何输入前先触发已到期的计时器。
/// 事件通道每轮重新取，重新订阅后不会再读到旧订阅的积压。
pub fn run_recorder_handler(mut recorder: SessionRecorder, task_receiver: Receiver<RecorderTask>) {
    info!("Recorder thread started");

    loop {
        recorder.fire_due_timers();
        let wait = recorder.time_until_next_timer().unwrap_or(IDLE_WAIT).min(IDLE_WAIT);
        let event_receiver = recorder.events();

        let running = select! {
            recv(task_receiver) -> task => {
                recorder.fire_due_timers();
                match task {
                    Ok(RecorderTask::Shutdown) => {
                        info!("Recorder thread received shutdown signal");
                        false
                    }
                    Ok(task) => {
                        handle_task(&mut recorder, task);
                        true
                    }
                    Err(_) => {
                        info!("Task channel disconnected, recorder thread exiting");
                        false
                    }
                }
            }
            recv(event_receiver) -> event => {
                recorder.fire_due_timers();
                match event {
                    Ok(event) => {
                        recorder.on_sensor_event(event);
                        true
                    }
                    Err(_) => {
                        error!("Sensor event channel disconnected");
                        false
                    }
                }
            }
            default(wait) => true,
        };

        if !running {
            break;
        }
    }

    recorder.discard();
    info!("Recorder thread stopped");
}

fn handle_task(recorder: &mut SessionRecorder, task: RecorderTask) {
    match task {
        RecorderTask::Prepare { target_hz, beeps, response_sender } => {
            reply(response_sender, recorder.prepare(target_hz, beeps));
        }
        RecorderTask::BeginCountdown { response_sender } => {
            reply(response_sender, recorder.begin_countdown());
        }
        RecorderTask::Start { response_sender } => {
            reply(response_sender, recorder.start_recording());
        }
        RecorderTask::Pause { response_sender } => {
            reply(response_sender, recorder.pause());
        }
        RecorderTask::Resume { response_sender } => {
            reply(response_sender, recorder.resume());
        }
        RecorderTask::Stop { response_sender } => {
            reply(response_sender, recorder.stop_recording());
        }
        RecorderTask::Discard { response_sender } => {
            reply(response_sender, recorder.discard());
        }
        RecorderTask::Snapshot { response_sender } => {
            reply(response_sender, recorder.snapshot());
        }
        RecorderTask::Observe { observer } => {
            recorder.add_observer(observer);
        }
        RecorderTask::Export { metadata, response_sender } => {
            reply(response_sender, recorder.export(metadata));
        }
        RecorderTask::Shutdown => {}
    }
}

fn reply<T>(response_sender: Sender<T>, value: T) {
    if response_sender.try_send(value).is_err() {
        warn!("Recorder: requester went away before the response was sent");
    }
}

/// 记录器线程的句柄，所有方法阻塞等待线程回复
pub struct RecorderHandle {
    task_sender: Sender<RecorderTask>,
    published: Arc<RwLock<LiveSnapshot>>,
    snapshot_capacity: usize,
    thread: Option<JoinHandle<()>>,
}

impl RecorderHandle {
    pub fn spawn(
        config: RecorderConfig,
        channels: &ChannelConfig,
        clock: Arc<dyn Clock>,
        source: Box<dyn SampleSource>,
        cues: Box<dyn CuePlayer>,
        exporter: Box<dyn SessionExporter>,
    ) -> Result<Self, RecorderError> {
        let (task_sender, task_receiver) = crossbeam_channel::bounded(channels.task_channel_capacity.max(1));

        let recorder = SessionRecorder::new(config, clock, source, cues, exporter);
        let published = recorder.published();

        let thread = thread::Builder::new()
            .name("recorder".to_string())
            .spawn(move || run_recorder_handler(recorder, task_receiver))?;

        Ok(Self {
            task_sender,
            published,
            snapshot_capacity: channels.snapshot_channel_capacity,
            thread: Some(thread),
        })
    }

    fn request<T>(&self, build: impl FnOnce(Sender<T>) -> RecorderTask) -> Result<T, RecorderError> {
        let (response_sender, response_receiver) = crossbeam_channel::bounded(1);
        self.task_sender
            .send(build(response_sender))
            .map_err(|_| RecorderError::Disconnected)?;
        response_receiver.recv().map_err(|_| RecorderError::Disconnected)
    }

    pub fn prepare(&self, target_hz: u32, beeps: bool) -> Result<RecorderState, RecorderError> {
        self.request(|response_sender| RecorderTask::Prepare {
            target_hz,
            beeps,
            response_sender,
        })
    }

    pub fn begin_countdown(&self) -> Result<RecorderState, RecorderError> {
        self.request(|response_sender| RecorderTask::BeginCountdown { response_sender })
    }

    pub fn start(&self) -> Result<RecorderState, RecorderError> {
        self.request(|response_sender| RecorderTask::Start { response_sender })
    }

    pub fn pause(&self) -> Result<RecorderState, RecorderError> {
        self.request(|response_sender| RecorderTask::Pause { response_sender })
    }

    pub fn resume(&self) -> Result<RecorderState, RecorderError> {
        self.request(|response_sender| RecorderTask::Resume { response_sender })
    }

    pub fn stop(&self) -> Result<RecorderState, RecorderError> {
        self.request(|response_sender| RecorderTask::Stop { response_sender })
    }

    pub fn discard(&self) -> Result<RecorderState, RecorderError> {
        self.request(|response_sender| RecorderTask::Discard { response_sender })
    }

    pub fn snapshot(&self) -> Result<LiveSnapshot, RecorderError> {
        self.request(|response_sender| RecorderTask::Snapshot { response_sender })
    }

    pub fn export(&self, metadata: SessionMetadata) -> Result<(ExportArtifact, QualityReport), RecorderError> {
        Ok(self.request(|response_sender| RecorderTask::Export {
            metadata,
            response_sender,
        })??)
    }

    /// 订阅快照推送；通道满时旧的消费者会错过中间快照
    pub fn subscribe_snapshots(&self) -> Result<Receiver<LiveSnapshot>, RecorderError> {
        let (observer, receiver) = crossbeam_channel::bounded(self.snapshot_capacity.max(1));
        self.task_sender
            .send(RecorderTask::Observe { observer })
            .map_err(|_| RecorderError::Disconnected)?;
        Ok(receiver)
    }

    /// 最近一次发布的快照，不经过记录器线程
    pub fn latest(&self) -> LiveSnapshot {
        match self.published.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn shutdown(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.task_sender.send(RecorderTask::Shutdown);
            match thread.join() {
                Ok(()) => info!("Recorder thread shut down gracefully"),
                Err(e) => error!("Recorder thread panicked: {:?}", e),
            }
        }
    }
}

impl Drop for RecorderHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
