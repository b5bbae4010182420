//! 传感器源：模拟源与 MQTT 源

pub mod mqtt;
pub mod simulated;

use std::time::Duration;

use crossbeam_channel::Sender;

use crate::types::{SensorEvent, SourceError};

pub use mqtt::MqttSampleSource;
pub use simulated::SimulatedSource;

/// 设备运动传感器的抽象
///
/// 样本在源自己的线程上异步推送到 `sink`，推送不得阻塞。
/// 同一时刻最多一个订阅，由记录器负责在重新订阅前先退订。
pub trait SampleSource: Send {
    fn name(&self) -> &str;

    fn is_available(&self) -> bool;

    fn subscribe(&mut self, interval: Duration, sink: Sender<SensorEvent>) -> Result<(), SourceError>;

    fn unsubscribe(&mut self);
}

/// 目标采样率对应的推送间隔
pub fn interval_for(target_hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / target_hz.max(1) as f64)
}
