use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::results::ExportError;

pub const FILE_SCHEMA_VERSION: &str = "1.0";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 手机放置位置
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PhonePosition {
    PocketRight,
    PocketLeft,
}

impl PhonePosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhonePosition::PocketRight => "pocketRight",
            PhonePosition::PocketLeft => "pocketLeft",
        }
    }
}

/// 试验条件
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    #[serde(rename = "sober")]
    Sober,
    #[serde(rename = "afterDrink")]
    AfterDrink,
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "sober_calib")]
    SoberCalibration,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Sober => "sober",
            Condition::AfterDrink => "afterDrink",
            Condition::Unknown => "unknown",
            Condition::SoberCalibration => "sober_calib",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum BacMethod {
    Breathalyzer,
    Other,
}

impl BacMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BacMethod::Breathalyzer => "breathalyzer",
            BacMethod::Other => "other",
        }
    }
}

/// 会话元数据
///
/// 由外部协作方在导出时提供；`sampling_hz_measured` 与 `duration_recorded_s`
/// 在导出时由质量报告覆盖。
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SessionMetadata {
    pub participant_id: String,
    pub session_id: String,
    pub sex: Option<String>,
    pub age_years: Option<String>,
    pub height_in: Option<String>,
    pub weight_kg: Option<String>,
    pub position: PhonePosition,
    pub condition: Condition,
    pub bac: Option<f64>,
    pub bac_method: Option<BacMethod>,
    pub bac_brand_model: Option<String>,
    pub bac_measured_at: Option<DateTime<FixedOffset>>,
    pub notes: Option<String>,

    pub file_schema_version: String,
    pub app_version: String,
    pub device_model: String,
    pub os_version: String,

    pub sampling_hz_target: u32,
    pub sampling_hz_measured: f64,
    pub duration_target_s: u32,
    pub duration_recorded_s: f64,
    pub preroll_s: f64,
    pub orientation_start: String,
    pub bac_delay_min: Option<f64>,
    pub quality_flags: BTreeMap<String, String>,
}

impl SessionMetadata {
    pub fn new(participant_id: &str, session_id: &str, sampling_hz_target: u32) -> Self {
        Self {
            participant_id: participant_id.to_string(),
            session_id: session_id.to_string(),
            sex: None,
            age_years: None,
            height_in: None,
            weight_kg: None,
            position: PhonePosition::PocketRight,
            condition: Condition::Unknown,
            bac: None,
            bac_method: None,
            bac_brand_model: None,
            bac_measured_at: None,
            notes: None,
            file_schema_version: FILE_SCHEMA_VERSION.to_string(),
            app_version: APP_VERSION.to_string(),
            device_model: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            os_version: std::env::consts::OS.to_string(),
            sampling_hz_target,
            sampling_hz_measured: 0.0,
            duration_target_s: crate::recorder::TRIAL_CAP_SECONDS as u32,
            duration_recorded_s: 0.0,
            preroll_s: 0.0,
            orientation_start: "unknown".to_string(),
            bac_delay_min: None,
            quality_flags: BTreeMap::new(),
        }
    }

    /// 导出前校验用户输入字段
    pub fn validate(&self) -> Result<(), ExportError> {
        if !is_valid_participant_id(&self.participant_id) {
            return Err(ExportError::InvalidMetadata(format!(
                "participant id '{}' must be 1-20 characters of [A-Za-z0-9_-]",
                self.participant_id
            )));
        }
        if self.session_id.is_empty() {
            return Err(ExportError::InvalidMetadata("session id is empty".to_string()));
        }
        if let Some(bac) = self.bac {
            if !is_valid_bac(bac) {
                return Err(ExportError::InvalidMetadata(format!(
                    "BAC {} outside [0, 0.40]",
                    bac
                )));
            }
        }
        Ok(())
    }
}

pub fn is_valid_participant_id(id: &str) -> bool {
    let len = id.chars().count();
    (1..=20).contains(&len)
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

pub fn is_valid_bac(value: f64) -> bool {
    (0.0..=0.40).contains(&value)
}
