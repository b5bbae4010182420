use std::sync::{Arc, RwLock};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, info, warn};

use super::clock::Clock;
use super::state::{LiveSnapshot, LiveStats, RecorderState, TrialSession};
use super::timers::{TimerArena, TimerId, TimerKind};
use super::{CUE_INTERVAL_SECONDS, TRIAL_CAP_SECONDS};
use crate::audio::{Cue, CuePlayer};
use crate::config::RecorderConfig;
use crate::export::{SessionExporter, SessionRecord};
use crate::sensor::{interval_for, SampleSource};
use crate::stats::{measured_rate, QualityEvaluator};
use crate::types::{ExportArtifact, ExportError, QualityReport, Sample, SensorEvent, SessionMetadata};
use crate::utils::{format_elapsed, generate_session_id};

/// 单次试验的状态机
///
/// 不自带线程：所有方法都必须在同一个拥有者上下文中调用（见 `RecorderHandle`）。
/// 传感器样本经 `on_sensor_event` 进入，计时器经 `fire_due_timers` 触发；
/// 每个回调在执行前都会重新检查当前状态，过期回调直接丢弃。
pub struct SessionRecorder {
    config: RecorderConfig,
    clock: Arc<dyn Clock>,
    source: Box<dyn SampleSource>,
    cues: Box<dyn CuePlayer>,
    exporter: Box<dyn SessionExporter>,
    // 每次订阅换一条新通道，旧订阅遗留的事件随旧通道一起丢弃
    event_sender: Sender<SensorEvent>,
    event_receiver: Receiver<SensorEvent>,
    subscribed: bool,

    state: RecorderState,
    session: TrialSession,

    timers: TimerArena,
    cap_timer: Option<TimerId>,
    cue_timer: Option<TimerId>,
    refresh_timer: Option<TimerId>,
    countdown_timer: Option<TimerId>,
    countdown_remaining: u32,

    observers: Vec<Sender<LiveSnapshot>>,
    published: Arc<RwLock<LiveSnapshot>>,
}

impl SessionRecorder {
    pub fn new(
        config: RecorderConfig,
        clock: Arc<dyn Clock>,
        source: Box<dyn SampleSource>,
        cues: Box<dyn CuePlayer>,
        exporter: Box<dyn SessionExporter>,
    ) -> Self {
        let (event_sender, event_receiver) = crossbeam_channel::unbounded();
        let session = TrialSession::new(generate_session_id(), config.target_hz.max(1), config.beeps);
        let mut recorder = Self {
            config,
            clock,
            source,
            cues,
            exporter,
            event_sender,
            event_receiver,
            subscribed: false,
            state: RecorderState::Idle,
            session,
            timers: TimerArena::new(),
            cap_timer: None,
            cue_timer: None,
            refresh_timer: None,
            countdown_timer: None,
            countdown_remaining: 0,
            observers: Vec::new(),
            published: Arc::new(RwLock::new(LiveSnapshot::default())),
        };
        recorder.publish();
        recorder
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn session(&self) -> &TrialSession {
        &self.session
    }

    pub fn samples(&self) -> &[Sample] {
        &self.session.samples
    }

    pub fn stats(&self) -> LiveStats {
        self.session.stats
    }

    pub fn snapshot(&self) -> LiveSnapshot {
        LiveSnapshot {
            state: self.state,
            session_id: self.session.session_id.clone(),
            sample_count: self.session.samples.len(),
            stats: self.session.stats,
        }
    }

    /// 当前订阅的事件通道；每次重新订阅后都会变化
    pub fn events(&self) -> Receiver<SensorEvent> {
        self.event_receiver.clone()
    }

    /// 最近一次发布的快照，供其他线程只读访问
    pub fn published(&self) -> Arc<RwLock<LiveSnapshot>> {
        Arc::clone(&self.published)
    }

    /// 注册观察者；发布时通道满则跳过，断开则移除
    pub fn add_observer(&mut self, observer: Sender<LiveSnapshot>) {
        let _ = observer.try_send(self.snapshot());
        self.observers.push(observer);
    }

    pub fn subscribe_snapshots(&mut self, capacity: usize) -> Receiver<LiveSnapshot> {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        self.add_observer(sender);
        receiver
    }

    // ===== 状态转换 =====

    /// 任意状态 → idle，清空样本、统计与计时器
    pub fn prepare(&mut self, target_hz: u32, beeps: bool) -> RecorderState {
        self.release_source();
        self.cancel_all_timers();
        self.session = TrialSession::new(generate_session_id(), target_hz.max(1), beeps);
        self.state = RecorderState::Idle;
        info!(
            "Recorder prepared: session {} at {} Hz (beeps: {})",
            self.session.session_id, self.session.target_hz, beeps
        );
        self.publish();
        self.state
    }

    /// idle → countingDown；倒计时结束后自动开始录制
    pub fn begin_countdown(&mut self) -> RecorderState {
        if self.state != RecorderState::Idle {
            debug!("Countdown ignored in state {}", self.state);
            return self.state;
        }
        if self.config.countdown_seconds == 0 {
            return self.start_recording();
        }

        let now = self.clock.now();
        let second = Duration::from_secs(1);
        self.countdown_remaining = self.config.countdown_seconds;
        self.countdown_timer = Some(self.timers.arm_repeating(TimerKind::Countdown, now + second, second, None));
        self.state = RecorderState::CountingDown;
        info!("Countdown started: {}s", self.config.countdown_seconds);
        self.publish();
        self.state
    }

    /// idle/countingDown → recording；传感器不可用时保持 idle
    pub fn start_recording(&mut self) -> RecorderState {
        if !matches!(self.state, RecorderState::Idle | RecorderState::CountingDown) {
            debug!("Start ignored in state {}", self.state);
            return self.state;
        }
        self.cancel_timer(TimerKind::Countdown);

        if !self.source.is_available() {
            warn!("Sensor source '{}' unavailable, staying idle", self.source.name());
            self.state = RecorderState::Idle;
            self.publish();
            return self.state;
        }
        if let Err(e) = self.open_subscription() {
            warn!("Failed to subscribe to '{}': {}, staying idle", self.source.name(), e);
            self.state = RecorderState::Idle;
            self.publish();
            return self.state;
        }

        self.state = RecorderState::Recording;
        let now = self.clock.now();
        let cap = Duration::from_secs(TRIAL_CAP_SECONDS);
        let cue_period = Duration::from_secs(CUE_INTERVAL_SECONDS);

        // 提示音先布置：360 秒时与上限同时到期，提示音先触发
        if self.session.beeps {
            self.cues.play(Cue::Go);
            self.cue_timer = Some(self.timers.arm_repeating(TimerKind::Cue, now + cue_period, cue_period, Some(now + cap)));
        }
        self.cap_timer = Some(self.timers.arm_once(TimerKind::Cap, now + cap));
        self.arm_refresh_timer(now);

        info!("Recording started: session {}", self.session.session_id);
        self.publish();
        self.state
    }

    /// recording → paused；停止订阅，保留样本与上限/提示计时器
    pub fn pause(&mut self) -> RecorderState {
        if self.state != RecorderState::Recording {
            debug!("Pause ignored in state {}", self.state);
            return self.state;
        }
        self.release_source();
        self.cancel_timer(TimerKind::UiRefresh);
        self.state = RecorderState::Paused;
        info!(
            "Recording paused at {} ({} samples)",
            format_elapsed(self.session.stats.elapsed),
            self.session.samples.len()
        );
        self.publish();
        self.state
    }

    /// paused → recording；同一次试验继续，不重置 t0 与滚动窗口
    pub fn resume(&mut self) -> RecorderState {
        if self.state != RecorderState::Paused {
            debug!("Resume ignored in state {}", self.state);
            return self.state;
        }
        // 暂停前已送达的样本属于本次试验
        self.drain_pending_events();
        if self.state != RecorderState::Paused {
            return self.state;
        }
        if let Err(e) = self.open_subscription() {
            warn!("Failed to resubscribe to '{}': {}, finishing trial", self.source.name(), e);
            return self.stop_recording();
        }
        self.state = RecorderState::Recording;
        self.arm_refresh_timer(self.clock.now());
        info!("Recording resumed");
        self.publish();
        self.state
    }

    /// recording/paused → finished；其他状态下无操作
    pub fn stop_recording(&mut self) -> RecorderState {
        if !self.state.accepts_samples() {
            debug!("Stop ignored in state {}", self.state);
            return self.state;
        }
        self.release_source();
        self.cancel_all_timers();

        let count = self.session.samples.len();
        if let (true, Some(first), Some(last)) = (count >= 2, self.session.first_t(), self.session.last_t()) {
            let (hz, duration) = measured_rate(first, last, count);
            self.session.stats.measured_hz = hz;
            self.session.stats.elapsed = duration;
        }

        self.state = RecorderState::Finished;
        if self.session.beeps {
            self.cues.play(Cue::End);
        }
        info!(
            "Recorder finished - samples={} measuredHz={:.2} elapsed={}",
            count,
            self.session.stats.measured_hz,
            format_elapsed(self.session.stats.elapsed)
        );
        self.publish();
        self.state
    }

    /// 任意状态 → idle，放弃当前试验，不生成报告；下一次试验使用新的会话编号
    pub fn discard(&mut self) -> RecorderState {
        self.release_source();
        self.reset_event_channel();
        self.cancel_all_timers();
        if !self.session.samples.is_empty() {
            info!("Discarding {} samples of session {}", self.session.samples.len(), self.session.session_id);
        }
        self.session.clear();
        self.session.session_id = generate_session_id();
        self.state = RecorderState::Idle;
        self.publish();
        self.state
    }

    // ===== 回调 =====

    /// 传感器回调；只在 recording/paused 状态下接收样本
    pub fn on_sensor_event(&mut self, event: SensorEvent) {
        match event {
            SensorEvent::Sample(sample) => {
                if !self.state.accepts_samples() {
                    debug!("Dropping stale sample at t={:.3} in state {}", sample.t, self.state);
                    return;
                }
                self.session.ingest(sample);
            }
            SensorEvent::Failure(message) => {
                if self.state.accepts_samples() {
                    warn!("Sensor stream failure: {}, finishing with {} samples", message, self.session.samples.len());
                    self.stop_recording();
                } else {
                    debug!("Ignoring sensor failure in state {}: {}", self.state, message);
                }
            }
        }
    }

    /// 触发所有已到期的计时器
    pub fn fire_due_timers(&mut self) {
        let now = self.clock.now();
        while let Some((id, kind)) = self.timers.pop_due(now) {
            self.on_timer(id, kind);
        }
    }

    /// 距离下一个计时器到期的时长
    pub fn time_until_next_timer(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.timers.next_deadline().map(|deadline| deadline.saturating_sub(now))
    }

    fn on_timer(&mut self, id: TimerId, kind: TimerKind) {
        if *self.timer_slot(kind) != Some(id) {
            debug!("Stale {:?} timer fired, ignoring", kind);
            return;
        }
        if !self.timers.is_armed(id) {
            *self.timer_slot(kind) = None;
        }

        match kind {
            TimerKind::Cap => {
                if self.state == RecorderState::Recording {
                    info!("{}s cap reached, stopping recording", TRIAL_CAP_SECONDS);
                    self.stop_recording();
                }
            }
            TimerKind::Cue => {
                if self.state == RecorderState::Recording {
                    self.cues.play(Cue::Tick);
                }
            }
            TimerKind::UiRefresh => {
                if self.state == RecorderState::Recording {
                    self.publish();
                }
            }
            TimerKind::Countdown => {
                if self.state != RecorderState::CountingDown {
                    return;
                }
                if self.countdown_remaining > 0 {
                    if self.session.beeps {
                        self.cues.play(Cue::Tick);
                    }
                    self.countdown_remaining -= 1;
                    self.publish();
                } else {
                    self.start_recording();
                }
            }
        }
    }

    // ===== 导出 =====

    /// 计算质量报告并交给导出方；不改变状态，失败后可重试
    pub fn export(&self, metadata: SessionMetadata) -> Result<(ExportArtifact, QualityReport), ExportError> {
        if self.state != RecorderState::Finished {
            return Err(ExportError::NotFinished(self.state.to_string()));
        }

        let report = QualityEvaluator::new(self.session.target_hz).evaluate(&self.session.samples);

        let mut meta = metadata;
        if meta.session_id.is_empty() {
            meta.session_id = self.session.session_id.clone();
        }
        meta.sampling_hz_target = self.session.target_hz;
        meta.sampling_hz_measured = report.measured_hz;
        meta.duration_recorded_s = report.duration_real;
        if self.session.stats.elapsed < self.config.short_trial_seconds {
            meta.quality_flags.insert("short".to_string(), "true".to_string());
        }
        meta.validate()?;

        let record = SessionRecord {
            meta: &meta,
            samples: &self.session.samples,
            quality: &report,
        };
        let artifact = self.exporter.export(&record)?;
        info!(
            "Exported session {} to {} ({} rows, score {})",
            meta.session_id,
            artifact.csv_path.display(),
            artifact.rows,
            report.score
        );
        Ok((artifact, report))
    }

    // ===== 内部 =====

    /// 先关闭旧订阅，再以 1/targetHz 间隔在新通道上重新订阅
    fn open_subscription(&mut self) -> Result<(), crate::types::SourceError> {
        self.release_source();
        self.reset_event_channel();
        let interval = interval_for(self.session.target_hz);
        self.source.subscribe(interval, self.event_sender.clone())?;
        self.subscribed = true;
        debug!("Subscribed to '{}' every {:?}", self.source.name(), interval);
        Ok(())
    }

    fn release_source(&mut self) {
        if self.subscribed {
            self.source.unsubscribe();
            self.subscribed = false;
            debug!("Unsubscribed from '{}'", self.source.name());
        }
    }

    fn drain_pending_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.on_sensor_event(event);
        }
    }

    fn reset_event_channel(&mut self) {
        let stale = self.event_receiver.len();
        if stale > 0 {
            debug!("Dropping {} events left by a previous subscription", stale);
        }
        let (event_sender, event_receiver) = crossbeam_channel::unbounded();
        self.event_sender = event_sender;
        self.event_receiver = event_receiver;
    }

    fn arm_refresh_timer(&mut self, now: Duration) {
        self.cancel_timer(TimerKind::UiRefresh);
        let period = Duration::from_millis(self.config.ui_refresh_ms);
        self.refresh_timer = Some(self.timers.arm_repeating(TimerKind::UiRefresh, now + period, period, None));
    }

    fn timer_slot(&mut self, kind: TimerKind) -> &mut Option<TimerId> {
        match kind {
            TimerKind::Cap => &mut self.cap_timer,
            TimerKind::Cue => &mut self.cue_timer,
            TimerKind::UiRefresh => &mut self.refresh_timer,
            TimerKind::Countdown => &mut self.countdown_timer,
        }
    }

    fn cancel_timer(&mut self, kind: TimerKind) {
        if let Some(id) = self.timer_slot(kind).take() {
            self.timers.cancel(id);
        }
    }

    fn cancel_all_timers(&mut self) {
        self.timers.cancel_all();
        self.cap_timer = None;
        self.cue_timer = None;
        self.refresh_timer = None;
        self.countdown_timer = None;
        self.countdown_remaining = 0;
    }

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        match self.published.write() {
            Ok(mut guard) => *guard = snapshot.clone(),
            Err(poisoned) => *poisoned.into_inner() = snapshot.clone(),
        }
        self.observers.retain(|observer| match observer.try_send(snapshot.clone()) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

impl Drop for SessionRecorder {
    fn drop(&mut self) {
        self.release_source();
    }
}


#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::test_support::*;
    use super::*;
    use crate::recorder::ManualClock;
    use crate::types::QualityScore;

    struct Rig {
        recorder: SessionRecorder,
        clock: Arc<ManualClock>,
        source: Arc<Mutex<SourceLog>>,
        cues: RecordingCues,
        exporter: MemoryExporter,
    }

    fn rig_with(config: RecorderConfig) -> Rig {
        let clock = Arc::new(ManualClock::new());
        let source = Arc::new(Mutex::new(SourceLog {
            available: true,
            ..Default::default()
        }));
        let cues = RecordingCues::default();
        let exporter = MemoryExporter::default();
        let recorder = SessionRecorder::new(
            config,
            clock.clone(),
            Box::new(MockSource(source.clone())),
            Box::new(cues.clone()),
            Box::new(exporter.clone()),
        );
        Rig {
            recorder,
            clock,
            source,
            cues,
            exporter,
        }
    }

    fn rig() -> Rig {
        rig_with(RecorderConfig::default())
    }

    fn feed(recorder: &mut SessionRecorder, from: f64, count: usize, hz: f64) {
        for i in 0..count {
            let t = from + i as f64 / hz;
            recorder.on_sensor_event(SensorEvent::Sample(Sample::from_accel(t, 1.0, 0.0, 0.0)));
        }
    }

    fn advance(rig: &mut Rig, seconds: u64) {
        for _ in 0..seconds {
            rig.clock.advance(Duration::from_secs(1));
            rig.recorder.fire_due_timers();
        }
    }

    #[test]
    fn start_without_sensor_stays_idle() {
        let mut rig = rig();
        rig.source.lock().unwrap().available = false;
        assert_eq!(rig.recorder.start_recording(), RecorderState::Idle);
        assert_eq!(rig.source.lock().unwrap().subscribes, 0);
        assert!(rig.recorder.time_until_next_timer().is_none());
    }

    #[test]
    fn subscribe_failure_stays_idle() {
        let mut rig = rig();
        rig.source.lock().unwrap().fail_subscribe = true;
        assert_eq!(rig.recorder.start_recording(), RecorderState::Idle);
    }

    #[test]
    fn start_subscribes_at_target_interval() {
        let mut rig = rig();
        rig.recorder.prepare(50, true);
        assert_eq!(rig.recorder.start_recording(), RecorderState::Recording);
        let log = rig.source.lock().unwrap();
        assert_eq!(log.last_interval, Some(Duration::from_millis(20)));
        assert!(log.active);
        assert_eq!(rig.cues.count(Cue::Go), 1);
    }

    #[test]
    fn samples_ignored_outside_recording() {
        let mut rig = rig();
        feed(&mut rig.recorder, 0.0, 10, 100.0);
        assert!(rig.recorder.samples().is_empty());

        rig.recorder.start_recording();
        feed(&mut rig.recorder, 0.0, 10, 100.0);
        rig.recorder.stop_recording();
        feed(&mut rig.recorder, 1.0, 10, 100.0);
        assert_eq!(rig.recorder.samples().len(), 10);
    }

    #[test]
    fn discard_from_any_state_returns_to_idle() {
        let mut rig = rig();
        let drive: [fn(&mut SessionRecorder); 4] = [
            |_| {},
            |r: &mut SessionRecorder| {
                r.start_recording();
            },
            |r: &mut SessionRecorder| {
                r.start_recording();
                r.pause();
            },
            |r: &mut SessionRecorder| {
                r.start_recording();
                r.stop_recording();
            },
        ];
        for step in drive {
            rig.recorder.prepare(100, true);
            step(&mut rig.recorder);
            if rig.recorder.state().accepts_samples() {
                feed(&mut rig.recorder, 0.0, 20, 100.0);
            }
            assert_eq!(rig.recorder.discard(), RecorderState::Idle);
            assert!(rig.recorder.samples().is_empty());
            assert_eq!(rig.recorder.stats().elapsed, 0.0);
            assert_eq!(rig.recorder.stats().measured_hz, 0.0);
            assert!(!rig.source.lock().unwrap().active);
            assert!(rig.recorder.time_until_next_timer().is_none());
        }
    }

    #[test]
    fn pause_resume_keeps_origin_and_samples() {
        let mut rig = rig();
        rig.recorder.start_recording();
        feed(&mut rig.recorder, 10.0, 100, 100.0);
        let elapsed_before = rig.recorder.stats().elapsed;

        assert_eq!(rig.recorder.pause(), RecorderState::Paused);
        assert!(!rig.source.lock().unwrap().active);
        assert_eq!(rig.recorder.samples().len(), 100);

        assert_eq!(rig.recorder.resume(), RecorderState::Recording);
        assert!(rig.source.lock().unwrap().active);
        assert_eq!(rig.recorder.session().t0, Some(10.0));
        feed(&mut rig.recorder, 15.0, 10, 100.0);
        assert_eq!(rig.recorder.samples().len(), 110);
        assert!(rig.recorder.stats().elapsed > elapsed_before);
        assert_eq!(rig.source.lock().unwrap().overlapping, 0);
    }

    #[test]
    fn rolling_window_survives_pause_resume() {
        let mut rig = rig();
        rig.recorder.start_recording();
        // 2 秒 x 100 Hz，|a| = 1
        feed(&mut rig.recorder, 0.0, 200, 100.0);
        assert_eq!(rig.recorder.session().window.len(), 200);

        rig.recorder.pause();
        rig.recorder.resume();
        rig.recorder.on_sensor_event(SensorEvent::Sample(Sample::from_accel(2.5, 3.0, 0.0, 0.0)));

        assert_eq!(rig.recorder.session().window.len(), 201);
        let expected = (200.0 + 3.0) / 201.0;
        assert!((rig.recorder.stats().avg_accel_norm - expected).abs() < 1e-9);
        assert_eq!(rig.recorder.stats().elapsed, 2.5);
    }

    fn pending_sink(rig: &Rig) -> crossbeam_channel::Sender<SensorEvent> {
        rig.source.lock().unwrap().sink.clone().unwrap()
    }

    #[test]
    fn backlog_of_discarded_trial_never_reaches_next_trial() {
        let mut rig = rig();
        rig.recorder.start_recording();
        let old = pending_sink(&rig);
        for i in 0..50 {
            old.send(SensorEvent::Sample(Sample::from_accel(i as f64 / 100.0, 1.0, 0.0, 0.0))).unwrap();
        }

        rig.recorder.discard();
        rig.recorder.prepare(100, false);
        rig.recorder.start_recording();
        assert_eq!(rig.recorder.events().try_iter().count(), 0);
        // 旧订阅的发送端已失效
        assert!(old.send(SensorEvent::Failure("late".to_string())).is_err());

        pending_sink(&rig)
            .send(SensorEvent::Sample(Sample::from_accel(100.0, 1.0, 0.0, 0.0)))
            .unwrap();
        let events: Vec<SensorEvent> = rig.recorder.events().try_iter().collect();
        for event in events {
            rig.recorder.on_sensor_event(event);
        }
        assert_eq!(rig.recorder.samples().len(), 1);
        assert_eq!(rig.recorder.session().t0, Some(100.0));
    }

    #[test]
    fn samples_queued_before_pause_are_kept_on_resume() {
        let mut rig = rig();
        rig.recorder.start_recording();
        let sink = pending_sink(&rig);
        for i in 0..20 {
            sink.send(SensorEvent::Sample(Sample::from_accel(i as f64 / 100.0, 1.0, 0.0, 0.0))).unwrap();
        }
        rig.recorder.pause();
        assert_eq!(rig.recorder.resume(), RecorderState::Recording);
        assert_eq!(rig.recorder.samples().len(), 20);
        assert_eq!(rig.recorder.events().try_iter().count(), 0);
    }

    #[test]
    fn failure_queued_before_pause_finishes_on_resume() {
        let mut rig = rig();
        rig.recorder.start_recording();
        feed(&mut rig.recorder, 0.0, 5, 100.0);
        pending_sink(&rig).send(SensorEvent::Failure("lost".to_string())).unwrap();
        rig.recorder.pause();
        assert_eq!(rig.recorder.resume(), RecorderState::Finished);
        assert!(!rig.source.lock().unwrap().active);
    }

    #[test]
    fn each_trial_gets_a_new_session_id() {
        let mut rig = rig();
        rig.recorder.start_recording();
        feed(&mut rig.recorder, 0.0, 10, 100.0);
        rig.recorder.stop_recording();
        let first = rig.recorder.session().session_id.clone();

        rig.recorder.discard();
        rig.recorder.start_recording();
        let second = rig.recorder.session().session_id.clone();
        assert_ne!(first, second);

        rig.recorder.prepare(100, false);
        assert_ne!(rig.recorder.session().session_id, second);
    }

    #[test]
    fn pause_and_resume_only_from_matching_states() {
        let mut rig = rig();
        assert_eq!(rig.recorder.pause(), RecorderState::Idle);
        assert_eq!(rig.recorder.resume(), RecorderState::Idle);
        rig.recorder.start_recording();
        assert_eq!(rig.recorder.resume(), RecorderState::Recording);
    }

    #[test]
    fn resume_failure_finishes_trial() {
        let mut rig = rig();
        rig.recorder.start_recording();
        feed(&mut rig.recorder, 0.0, 5, 100.0);
        rig.recorder.pause();
        rig.source.lock().unwrap().fail_subscribe = true;
        assert_eq!(rig.recorder.resume(), RecorderState::Finished);
        assert_eq!(rig.recorder.samples().len(), 5);
    }

    #[test]
    fn cap_forces_finish_after_360_seconds() {
        let mut rig = rig();
        rig.recorder.start_recording();
        advance(&mut rig, 359);
        assert_eq!(rig.recorder.state(), RecorderState::Recording);
        advance(&mut rig, 1);
        assert_eq!(rig.recorder.state(), RecorderState::Finished);
        assert!(!rig.source.lock().unwrap().active);
        assert_eq!(rig.cues.count(Cue::End), 1);
    }

    #[test]
    fn cue_ticks_every_thirty_seconds_including_cap_boundary() {
        let mut rig = rig();
        rig.recorder.start_recording();
        advance(&mut rig, 400);
        // 30, 60, ..., 360 共 12 次
        assert_eq!(rig.cues.count(Cue::Tick), 12);
    }

    #[test]
    fn cue_is_silent_while_paused() {
        let mut rig = rig();
        rig.recorder.start_recording();
        advance(&mut rig, 31);
        assert_eq!(rig.cues.count(Cue::Tick), 1);
        rig.recorder.pause();
        advance(&mut rig, 60);
        assert_eq!(rig.cues.count(Cue::Tick), 1);
        rig.recorder.resume();
        advance(&mut rig, 30);
        assert_eq!(rig.cues.count(Cue::Tick), 2);
    }

    #[test]
    fn cap_is_noop_while_paused() {
        let mut rig = rig();
        rig.recorder.start_recording();
        rig.recorder.pause();
        advance(&mut rig, 400);
        assert_eq!(rig.recorder.state(), RecorderState::Paused);
    }

    #[test]
    fn no_cues_when_beeps_disabled() {
        let mut rig = rig();
        rig.recorder.prepare(100, false);
        rig.recorder.start_recording();
        advance(&mut rig, 400);
        assert!(rig.cues.0.lock().unwrap().is_empty());
        assert_eq!(rig.recorder.state(), RecorderState::Finished);
    }

    #[test]
    fn stop_computes_measured_rate() {
        let mut rig = rig();
        rig.recorder.start_recording();
        feed(&mut rig.recorder, 100.0, 1001, 100.0);
        rig.recorder.stop_recording();
        let stats = rig.recorder.stats();
        assert!((stats.measured_hz - 100.0).abs() < 1e-6);
        assert!((stats.elapsed - 10.0).abs() < 1e-6);
    }

    #[test]
    fn stop_and_evaluator_agree_on_rate() {
        let mut rig = rig();
        rig.recorder.start_recording();
        let times = [0.0, 0.011, 0.019, 0.034, 0.041, 0.05];
        for t in times {
            rig.recorder.on_sensor_event(SensorEvent::Sample(Sample::from_accel(t, 1.0, 0.0, 0.0)));
        }
        rig.recorder.stop_recording();
        let report = QualityEvaluator::new(100).evaluate(rig.recorder.samples());
        assert_eq!(rig.recorder.stats().measured_hz, report.measured_hz);
    }

    #[test]
    fn stop_with_single_sample_keeps_live_values() {
        let mut rig = rig();
        rig.recorder.start_recording();
        feed(&mut rig.recorder, 3.0, 1, 100.0);
        rig.recorder.stop_recording();
        assert_eq!(rig.recorder.stats().measured_hz, 0.0);
        assert_eq!(rig.recorder.stats().elapsed, 0.0);
    }

    #[test]
    fn stop_twice_gives_same_report() {
        let mut rig = rig();
        rig.recorder.start_recording();
        feed(&mut rig.recorder, 0.0, 500, 100.0);
        rig.recorder.stop_recording();
        let meta = SessionMetadata::new("P001", "", 100);
        let (_, first) = rig.recorder.export(meta.clone()).unwrap();
        assert_eq!(rig.recorder.stop_recording(), RecorderState::Finished);
        let (_, second) = rig.recorder.export(meta).unwrap();
        assert_eq!(first, second);
        assert_eq!(rig.cues.count(Cue::End), 1);
    }

    #[test]
    fn sensor_failure_finishes_with_partial_samples() {
        let mut rig = rig();
        rig.recorder.start_recording();
        feed(&mut rig.recorder, 0.0, 42, 100.0);
        rig.recorder.on_sensor_event(SensorEvent::Failure("device motion error".to_string()));
        assert_eq!(rig.recorder.state(), RecorderState::Finished);
        assert_eq!(rig.recorder.samples().len(), 42);
        assert!(!rig.source.lock().unwrap().active);
    }

    #[test]
    fn stale_timers_after_stop_are_ignored() {
        let mut rig = rig();
        rig.recorder.start_recording();
        rig.recorder.stop_recording();
        advance(&mut rig, 400);
        assert_eq!(rig.recorder.state(), RecorderState::Finished);
        assert_eq!(rig.cues.count(Cue::Tick), 0);
    }

    #[test]
    fn countdown_ticks_then_starts() {
        let mut rig = rig();
        assert_eq!(rig.recorder.begin_countdown(), RecorderState::CountingDown);
        assert_eq!(rig.source.lock().unwrap().subscribes, 0);
        advance(&mut rig, 3);
        assert_eq!(rig.recorder.state(), RecorderState::CountingDown);
        assert_eq!(rig.cues.count(Cue::Tick), 3);
        advance(&mut rig, 1);
        assert_eq!(rig.recorder.state(), RecorderState::Recording);
        assert_eq!(rig.cues.count(Cue::Go), 1);
    }

    #[test]
    fn countdown_cancelled_by_discard() {
        let mut rig = rig();
        rig.recorder.begin_countdown();
        rig.recorder.discard();
        advance(&mut rig, 10);
        assert_eq!(rig.recorder.state(), RecorderState::Idle);
        assert_eq!(rig.source.lock().unwrap().subscribes, 0);
    }

    #[test]
    fn export_requires_finished() {
        let rig = rig();
        let result = rig.recorder.export(SessionMetadata::new("P001", "", 100));
        assert!(matches!(result, Err(ExportError::NotFinished(_))));
    }

    #[test]
    fn export_failure_keeps_finished_and_allows_retry() {
        let mut rig = rig();
        rig.recorder.start_recording();
        feed(&mut rig.recorder, 0.0, 300, 100.0);
        rig.recorder.stop_recording();

        *rig.exporter.fail.lock().unwrap() = true;
        let meta = SessionMetadata::new("P001", "", 100);
        assert!(matches!(rig.recorder.export(meta.clone()), Err(ExportError::Persistence(_))));
        assert_eq!(rig.recorder.state(), RecorderState::Finished);

        *rig.exporter.fail.lock().unwrap() = false;
        let (artifact, report) = rig.recorder.export(meta).unwrap();
        assert_eq!(artifact.rows, 300);
        assert_eq!(report.score, QualityScore::Ok);
        let exported = rig.exporter.exported.lock().unwrap();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].0.session_id, rig.recorder.session().session_id);
        assert_eq!(exported[0].0.sampling_hz_target, 100);
    }

    #[test]
    fn short_trial_is_flagged() {
        let mut rig = rig();
        rig.recorder.start_recording();
        feed(&mut rig.recorder, 0.0, 300, 100.0);
        rig.recorder.stop_recording();
        let (_, report) = rig.recorder.export(SessionMetadata::new("P001", "", 100)).unwrap();
        assert!(report.duration_real < 20.0);
        {
            let exported = rig.exporter.exported.lock().unwrap();
            assert_eq!(exported[0].0.quality_flags.get("short").map(String::as_str), Some("true"));
            assert!((exported[0].0.duration_recorded_s - report.duration_real).abs() < 1e-9);
        }

        let mut rig = rig_with(RecorderConfig {
            short_trial_seconds: 1.0,
            ..RecorderConfig::default()
        });
        rig.recorder.start_recording();
        feed(&mut rig.recorder, 0.0, 300, 100.0);
        rig.recorder.stop_recording();
        assert!(rig.recorder.export(SessionMetadata::new("P001", "", 100)).is_ok());
        let exported = rig.exporter.exported.lock().unwrap();
        assert!(!exported[0].0.quality_flags.contains_key("short"));
    }

    #[test]
    fn invalid_metadata_is_rejected() {
        let mut rig = rig();
        rig.recorder.start_recording();
        feed(&mut rig.recorder, 0.0, 10, 100.0);
        rig.recorder.stop_recording();
        let result = rig.recorder.export(SessionMetadata::new("bad id!", "", 100));
        assert!(matches!(result, Err(ExportError::InvalidMetadata(_))));
        assert!(rig.exporter.exported.lock().unwrap().is_empty());
    }

    #[test]
    fn observers_receive_transitions() {
        let mut rig = rig();
        let snapshots = rig.recorder.subscribe_snapshots(16);
        rig.recorder.start_recording();
        rig.recorder.stop_recording();
        let states: Vec<RecorderState> = snapshots.try_iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![RecorderState::Idle, RecorderState::Recording, RecorderState::Finished]
        );
        let published = rig.recorder.published();
        assert_eq!(published.read().unwrap().state, RecorderState::Finished);
    }

    #[test]
    fn refresh_timer_publishes_while_recording() {
        let mut rig = rig();
        rig.recorder.start_recording();
        let snapshots = rig.recorder.subscribe_snapshots(64);
        snapshots.try_iter().count();
        feed(&mut rig.recorder, 0.0, 50, 100.0);
        rig.clock.advance(Duration::from_millis(350));
        rig.recorder.fire_due_timers();
        let received: Vec<LiveSnapshot> = snapshots.try_iter().collect();
        assert_eq!(received.len(), 3);
        assert_eq!(received[2].sample_count, 50);
    }

    #[test]
    fn dropped_observer_is_pruned() {
        let mut rig = rig();
        let snapshots = rig.recorder.subscribe_snapshots(4);
        drop(snapshots);
        rig.recorder.start_recording();
        assert!(rig.recorder.observers.is_empty());
    }
}
