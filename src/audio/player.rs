use rodio::{OutputStreamBuilder, Sink, Source};
use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use super::{Cue, CuePlayer};

const TONE_SAMPLE_RATE: u32 = 44_100;
const TONE_AMPLITUDE: f32 = 0.25;
// 首尾淡入淡出，避免爆音
const FADE_MS: u64 = 5;

/// 提示音播放命令
#[derive(Debug, Clone, Copy)]
enum CueCommand {
    Play(Cue),
    Shutdown,
}

/// 单声道正弦提示音
pub struct ToneSource {
    frequency: f32,
    position: usize,
    total: usize,
    fade: usize,
}

impl ToneSource {
    pub fn new(frequency: f32, duration_ms: u64) -> Self {
        let total = (TONE_SAMPLE_RATE as u64 * duration_ms / 1000) as usize;
        let fade = ((TONE_SAMPLE_RATE as u64 * FADE_MS / 1000) as usize).min(total / 2);
        Self {
            frequency,
            position: 0,
            total,
            fade,
        }
    }

    pub fn for_cue(cue: Cue) -> Self {
        let (frequency, duration_ms) = cue.tone();
        Self::new(frequency, duration_ms)
    }

    fn envelope(&self, index: usize) -> f32 {
        if self.fade == 0 {
            return 1.0;
        }
        let from_end = self.total - 1 - index;
        (index.min(from_end) as f32 / self.fade as f32).min(1.0)
    }
}

impl Iterator for ToneSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.total {
            return None;
        }
        let index = self.position;
        self.position += 1;
        let phase = TAU * self.frequency * index as f32 / TONE_SAMPLE_RATE as f32;
        Some(TONE_AMPLITUDE * self.envelope(index) * phase.sin())
    }
}

impl Source for ToneSource {
    fn current_span_len(&self) -> Option<usize> {
        Some(self.total - self.position)
    }

    fn channels(&self) -> u16 {
        1 // 单声道
    }

    fn sample_rate(&self) -> u32 {
        TONE_SAMPLE_RATE
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(Duration::from_secs_f32(self.total as f32 / TONE_SAMPLE_RATE as f32))
    }
}

/// 基于 rodio 的提示音播放器
///
/// 输出流在独立的工作线程中打开；没有音频设备时退化为只写日志。
pub struct ToneCuePlayer {
    command_sender: mpsc::Sender<CueCommand>,
    available: Arc<AtomicBool>,
    worker_handle: Option<JoinHandle<()>>,
}

impl ToneCuePlayer {
    pub fn new() -> Self {
        let (command_sender, command_receiver) = mpsc::channel();
        let available = Arc::new(AtomicBool::new(false));
        let worker_available = Arc::clone(&available);

        let worker_handle = match thread::Builder::new()
            .name("cue-player".to_string())
            .spawn(move || cue_worker_thread(command_receiver, worker_available))
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to start cue player thread: {}", e);
                None
            }
        };

        Self {
            command_sender,
            available,
            worker_handle,
        }
    }

    /// 音频输出设备是否已打开
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }
}

impl Default for ToneCuePlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl CuePlayer for ToneCuePlayer {
    fn play(&self, cue: Cue) {
        if self.command_sender.send(CueCommand::Play(cue)).is_err() {
            info!("Cue: {:?}", cue);
        }
    }
}

impl Drop for ToneCuePlayer {
    fn drop(&mut self) {
        // 发送关闭命令
        let _ = self.command_sender.send(CueCommand::Shutdown);

        // 等待工作线程结束
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}

/// 提示音工作线程
fn cue_worker_thread(command_receiver: mpsc::Receiver<CueCommand>, available: Arc<AtomicBool>) {
    let stream = match OutputStreamBuilder::open_default_stream() {
        Ok(stream) => {
            available.store(true, Ordering::Relaxed);
            debug!("Cue player opened default audio stream");
            Some(stream)
        }
        Err(e) => {
            warn!("No audio output ({}), cues will only be logged", e);
            None
        }
    };

    while let Ok(command) = command_receiver.recv() {
        match command {
            CueCommand::Play(cue) => match &stream {
                Some(stream) => {
                    let sink = Sink::connect_new(stream.mixer());
                    sink.append(ToneSource::for_cue(cue));
                    // 播放完自行结束，不阻塞下一条命令
                    sink.detach();
                }
                None => info!("Cue: {:?}", cue),
            },
            CueCommand::Shutdown => break,
        }
    }

    debug!("Cue player thread shutting down");
}
