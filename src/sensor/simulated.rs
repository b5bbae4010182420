use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender, TrySendError};
use log::{debug, info, warn};
use rand::Rng;

use super::SampleSource;
use crate::config::SimulatedConfig;
use crate::types::{Sample, SensorEvent, SourceError};

/// 模拟步行信号源
///
/// 竖直方向加速度为 base + amplitude·sin(2π·step_hz·t)，叠加均匀噪声。
/// 时间戳取自源创建时刻起的单调时钟，暂停后继续订阅时不会回退。
pub struct SimulatedSource {
    config: SimulatedConfig,
    origin: Instant,
    available: Arc<AtomicBool>,
    worker: Option<Worker>,
}

struct Worker {
    // 丢弃即通知线程退出
    stop_sender: Sender<()>,
    thread: JoinHandle<()>,
}

impl SimulatedSource {
    pub fn new(config: SimulatedConfig) -> Self {
        let available = Arc::new(AtomicBool::new(config.available));
        Self {
            config,
            origin: Instant::now(),
            available,
            worker: None,
        }
    }

    /// 可用性开关，供控制台模拟传感器掉线
    pub fn availability(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.available)
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

/// 在时刻 t 生成一个读数
pub fn synth_sample(config: &SimulatedConfig, t: f64, rng: &mut impl Rng) -> Sample {
    let mut jitter = || {
        if config.noise > 0.0 {
            rng.random_range(-config.noise..config.noise)
        } else {
            0.0
        }
    };

    let phase = TAU * config.step_hz * t;
    let vertical = config.base_norm + config.amplitude * phase.sin();
    let mut sample = Sample::from_accel(t, jitter(), jitter(), vertical + jitter());
    sample.gx = 0.2 * phase.cos() + jitter();
    sample.gy = jitter();
    sample.gz = jitter();
    sample.act_type = Some("walking".to_string());
    sample
}

impl SampleSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Relaxed)
    }

    fn subscribe(&mut self, interval: Duration, sink: Sender<SensorEvent>) -> Result<(), SourceError> {
        if !self.is_available() {
            return Err(SourceError::Unavailable);
        }
        self.unsubscribe();

        let (stop_sender, stop_receiver) = crossbeam_channel::bounded::<()>(0);
        let config = self.config.clone();
        let origin = self.origin;
        let available = Arc::clone(&self.available);

        let thread = thread::Builder::new()
            .name("simulated-sensor".to_string())
            .spawn(move || {
                let mut rng = rand::rng();
                let started = Instant::now();
                let mut tick: u32 = 0;

                loop {
                    tick = tick.saturating_add(1);
                    let wait = (started + interval * tick).saturating_duration_since(Instant::now());
                    match stop_receiver.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => break,
                    }

                    if !available.load(Ordering::Relaxed) {
                        warn!("Simulated sensor became unavailable");
                        let _ = sink.try_send(SensorEvent::Failure("simulated sensor unavailable".to_string()));
                        break;
                    }

                    let t = origin.elapsed().as_secs_f64();
                    match sink.try_send(SensorEvent::Sample(synth_sample(&config, t, &mut rng))) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => debug!("Sample sink full, dropping sample at t={:.3}", t),
                        Err(TrySendError::Disconnected(_)) => {
                            info!("Sample sink disconnected, simulated sensor exiting");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        info!("Simulated sensor started every {:?}", interval);
        self.worker = Some(Worker { stop_sender, thread });
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker.stop_sender);
            if worker.thread.join().is_err() {
                warn!("Simulated sensor thread panicked");
            }
            info!("Simulated sensor stopped");
        }
    }
}

impl Drop for SimulatedSource {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
