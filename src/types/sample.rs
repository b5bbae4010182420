use serde::{Deserialize, Serialize};

/// 单个运动传感器读数
///
/// `t` 为设备单调时钟（秒），同一次试验内不递减，但不保证等间隔。
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Sample {
    pub t: f64,
    // 线性加速度（已去除重力）
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    // 角速度
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
    // 姿态四元数
    pub qw: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    // 重力向量
    pub gravx: f64,
    pub gravy: f64,
    pub gravz: f64,
    #[serde(default, rename = "actType", skip_serializing_if = "Option::is_none")]
    pub act_type: Option<String>,
}

impl Sample {
    /// 只带加速度的读数，其余分量取静止姿态
    pub fn from_accel(t: f64, ax: f64, ay: f64, az: f64) -> Self {
        Self {
            t,
            ax,
            ay,
            az,
            gx: 0.0,
            gy: 0.0,
            gz: 0.0,
            qw: 1.0,
            qx: 0.0,
            qy: 0.0,
            qz: 0.0,
            gravx: 0.0,
            gravy: 0.0,
            gravz: -1.0,
            act_type: None,
        }
    }

    /// 加速度模长 sqrt(ax²+ay²+az²)
    pub fn accel_norm(&self) -> f64 {
        (self.ax * self.ax + self.ay * self.ay + self.az * self.az).sqrt()
    }
}

/// 传感器源推送给记录器的事件
#[derive(Clone, Debug)]
pub enum SensorEvent {
    Sample(Sample),
    Failure(String),
}
