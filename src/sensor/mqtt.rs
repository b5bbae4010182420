use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, TrySendError};
use dotenv::dotenv;
use log::{debug, error, info, warn};
use rumqttc::{Client, Event, LastWill, MqttOptions, Packet, QoS};

use super::SampleSource;
use crate::config::MqttConfig;
use crate::types::{Sample, SensorEvent, SourceError};

/// 通过 MQTT 订阅手机推送的运动传感器读数
///
/// 每条消息是一个 JSON 编码的 `Sample`。推送频率由手机端决定，
/// 请求的间隔只用于日志。用户名密码从 .env 或环境变量读取。
pub struct MqttSampleSource {
    config: MqttConfig,
    session: Option<MqttSession>,
}

struct MqttSession {
    client: Client,
    shutdown_signal: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl MqttSampleSource {
    pub fn new(config: MqttConfig) -> Self {
        Self { config, session: None }
    }

    fn credentials() -> Result<(String, String), SourceError> {
        dotenv().ok(); // 加载 .env 文件

        let user = env::var("MQTT_USER").map_err(|_| SourceError::Credentials("MQTT_USER".to_string()))?;
        let pass = env::var("MQTT_PASS").map_err(|_| SourceError::Credentials("MQTT_PASS".to_string()))?;
        Ok((user, pass))
    }

    fn options(&self, user: String, pass: String) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(&self.config.client_id, &self.config.broker, self.config.port);

        mqtt_options.set_credentials(user, pass);

        mqtt_options
            .set_keep_alive(Duration::from_secs(self.config.keep_alive.max(1) as u64))
            .set_last_will(LastWill::new(&self.config.topic, "offline", QoS::AtLeastOnce, false));

        mqtt_options
    }
}

impl SampleSource for MqttSampleSource {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn is_available(&self) -> bool {
        Self::credentials().is_ok()
    }

    fn subscribe(&mut self, interval: Duration, sink: Sender<SensorEvent>) -> Result<(), SourceError> {
        self.unsubscribe();

        let (user, pass) = Self::credentials()?;
        let (client, mut connection) = Client::new(self.options(user, pass), 10);
        client
            .subscribe(&self.config.topic, QoS::AtLeastOnce)
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        let shutdown_signal = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown_signal);
        let topic = self.config.topic.clone();

        let thread = thread::Builder::new()
            .name("mqtt-sensor".to_string())
            .spawn(move || {
                for event in connection.iter() {
                    // 检查关闭信号
                    if thread_shutdown.load(Ordering::Relaxed) {
                        info!("MQTT thread received shutdown signal, exiting gracefully");
                        break;
                    }

                    match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) if publish.topic == topic => {
                            match parse_sample(&publish.payload) {
                                Ok(sample) => match sink.try_send(SensorEvent::Sample(sample)) {
                                    Ok(()) => {}
                                    Err(TrySendError::Full(_)) => debug!("Sample sink full, dropping MQTT sample"),
                                    Err(TrySendError::Disconnected(_)) => {
                                        // 通道断开表示记录器已退出
                                        info!("Sample sink disconnected, MQTT thread exiting");
                                        break;
                                    }
                                },
                                Err(e) => warn!("Invalid sensor data: {}", e),
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!("MQTT connection error: {}", e);
                            let _ = sink.try_send(SensorEvent::Failure(format!("MQTT connection error: {}", e)));
                            break;
                        }
                    }
                }
            })
            .map_err(|e| SourceError::Connection(e.to_string()))?;

        info!(
            "Subscribed to MQTT topic '{}' on {}:{} (requested interval {:?})",
            self.config.topic, self.config.broker, self.config.port, interval
        );
        self.session = Some(MqttSession {
            client,
            shutdown_signal,
            thread,
        });
        Ok(())
    }

    fn unsubscribe(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown_signal.store(true, Ordering::Relaxed);
            if let Err(e) = session.client.disconnect() {
                debug!("MQTT disconnect request failed: {}", e);
            }
            // 连接线程在下一次事件时退出，已结束的线程直接回收
            if session.thread.is_finished() && session.thread.join().is_err() {
                error!("MQTT thread panicked");
            }
            info!("Unsubscribed from MQTT topic '{}'", self.config.topic);
        }
    }
}

impl Drop for MqttSampleSource {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

pub fn parse_sample(payload: &[u8]) -> Result<Sample, String> {
    let payload_str = std::str::from_utf8(payload).map_err(|e| format!("Invalid UTF-8: {}", e))?;

    serde_json::from_str::<Sample>(payload_str).map_err(|e| format!("JSON parsing error: {}", e))
}
