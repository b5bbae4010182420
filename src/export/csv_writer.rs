use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};
use log::{info, warn};
use sha2::{Digest, Sha256};

use super::{AnalyticsLog, SessionExporter, SessionRecord, SessionSummary};
use crate::config::AppConfig;
use crate::types::{ExportArtifact, ExportError, Sample};

/// 数据区表头
pub const DATA_COLUMNS: [&str; 15] = [
    "t", "ax", "ay", "az", "gx", "gy", "gz", "qw", "qx", "qy", "qz", "gravx", "gravy", "gravz", "actType",
];

/// 每个完成的试验写一个 CSV 文件和一个同名 JSON 附属文件
///
/// CSV 结构：`# key,value` 元数据行，`# data`，表头，然后每个样本一行。
/// 元数据行始终用逗号，数据区按配置用逗号或分号。
pub struct CsvSessionExporter {
    sessions_dir: PathBuf,
    strict_anonymization: bool,
    delimiter: char,
    analytics: Option<AnalyticsLog>,
}

impl CsvSessionExporter {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
            strict_anonymization: false,
            delimiter: ',',
            analytics: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let mut exporter = Self::new(config.get_sessions_directory())
            .with_anonymization(config.export.strict_anonymization)
            .with_semicolon_delimiter(config.export.use_semicolon_delimiter);
        if config.export.analytics_log {
            exporter = exporter.with_analytics(AnalyticsLog::new(config.get_base_directory()));
        }
        exporter
    }

    pub fn with_anonymization(mut self, strict: bool) -> Self {
        self.strict_anonymization = strict;
        self
    }

    pub fn with_semicolon_delimiter(mut self, semicolon: bool) -> Self {
        self.delimiter = if semicolon { ';' } else { ',' };
        self
    }

    pub fn with_analytics(mut self, analytics: AnalyticsLog) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn participant_label(&self, participant_id: &str) -> String {
        if self.strict_anonymization {
            anonymize(participant_id)
        } else {
            participant_id.to_string()
        }
    }

    fn write_csv(&self, path: &Path, participant: &str, record: &SessionRecord<'_>) -> Result<(), ExportError> {
        let meta = record.meta;
        let quality = record.quality;
        let mut out = BufWriter::new(File::create(path)?);

        let mut kv = |key: &str, value: &str| writeln!(out, "# {},{}", key, single_line(value));

        kv("file_schema_version", &meta.file_schema_version)?;
        kv("app_version", &meta.app_version)?;
        kv("participant_id", participant)?;
        if let Some(sex) = &meta.sex {
            kv("sex", sex)?;
        }
        if let Some(age) = &meta.age_years {
            kv("age_years", age)?;
        }
        if let Some(height) = &meta.height_in {
            kv("height_in", height)?;
        }
        if let Some(weight) = &meta.weight_kg {
            kv("weight_kg", weight)?;
        }
        kv("session_id", &meta.session_id)?;
        kv("device_model", &meta.device_model)?;
        kv("os_version", &meta.os_version)?;
        kv("position", meta.position.as_str())?;
        kv("orientation_start", &meta.orientation_start)?;
        kv("condition", meta.condition.as_str())?;
        if let Some(bac) = meta.bac {
            kv("bac", &format!("{:.3}", bac))?;
        }
        if let Some(method) = meta.bac_method {
            kv("bac_method", method.as_str())?;
        }
        if let Some(brand) = &meta.bac_brand_model {
            kv("bac_brand_model", brand)?;
        }
        if let Some(at) = meta.bac_measured_at {
            kv("bac_measured_at", &at.to_rfc3339_opts(SecondsFormat::Millis, false))?;
        }
        if let Some(delay) = meta.bac_delay_min {
            kv("bac_delay_min", &format!("{:.1}", delay))?;
        }
        kv("sampling_hz_target", &meta.sampling_hz_target.to_string())?;
        kv("sampling_hz_measured", &format!("{:.2}", quality.measured_hz))?;
        kv("duration_target_s", &meta.duration_target_s.to_string())?;
        kv("duration_recorded_s", &format!("{:.3}", quality.duration_real))?;
        kv("preroll_s", &format!("{:.3}", meta.preroll_s))?;
        if let Some(notes) = &meta.notes {
            kv("notes", notes)?;
        }
        if !meta.quality_flags.is_empty() {
            kv("quality_flags", &serde_json::to_string(&meta.quality_flags)?)?;
        }
        kv("quality_summary", &serde_json::to_string(quality)?)?;

        writeln!(out, "# data")?;
        let sep = self.delimiter.to_string();
        writeln!(out, "{}", DATA_COLUMNS.join(&sep))?;
        for sample in record.samples {
            writeln!(out, "{}", format_row(sample, self.delimiter))?;
        }

        out.flush()?;
        Ok(())
    }
}

impl SessionExporter for CsvSessionExporter {
    fn export(&self, record: &SessionRecord<'_>) -> Result<ExportArtifact, ExportError> {
        fs::create_dir_all(&self.sessions_dir)?;

        let participant = self.participant_label(&record.meta.participant_id);
        let stamp = Local::now().format("%Y%m%d-%H%M%S");
        let duration = record.quality.duration_real.round().max(0.0) as u64;
        let name = format!("imu_{}_{}_dur{}", participant, stamp, duration);

        let csv_path = self.sessions_dir.join(format!("{}.csv", name));
        let tmp_path = self.sessions_dir.join(format!("{}.csv.tmp", name));
        let sidecar_path = self.sessions_dir.join(format!("{}.json", name));

        if let Err(e) = self.write_csv(&tmp_path, &participant, record) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }
        fs::rename(&tmp_path, &csv_path)?;

        let mut meta = record.meta.clone();
        meta.participant_id = participant.clone();
        let summary = SessionSummary {
            meta,
            samples: Vec::new(),
            quality: record.quality.clone(),
        };
        fs::write(&sidecar_path, serde_json::to_vec_pretty(&summary)?)?;

        info!("Session CSV written: {} ({} rows)", csv_path.display(), record.samples.len());

        if let Some(analytics) = &self.analytics {
            let rows = record.samples.len().to_string();
            let score = record.quality.score.as_str();
            let entries = [
                ("session_id", record.meta.session_id.as_str()),
                ("rows", rows.as_str()),
                ("score", score),
            ];
            if let Err(e) = analytics.log("test_exported", &entries) {
                warn!("Failed to append analytics log: {}", e);
            }
        }

        Ok(ExportArtifact {
            csv_path,
            sidecar_path,
            rows: record.samples.len(),
        })
    }
}

/// SHA-256 前 8 个十六进制字符
pub fn anonymize(participant_id: &str) -> String {
    let digest = Sha256::digest(participant_id.as_bytes());
    digest.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}

fn format_row(sample: &Sample, delimiter: char) -> String {
    let values = [
        sample.t,
        sample.ax,
        sample.ay,
        sample.az,
        sample.gx,
        sample.gy,
        sample.gz,
        sample.qw,
        sample.qx,
        sample.qy,
        sample.qz,
        sample.gravx,
        sample.gravy,
        sample.gravz,
    ];
    let mut row = String::with_capacity(values.len() * 14);
    for value in values {
        row.push_str(&format!("{:.9}", value));
        row.push(delimiter);
    }
    row.push_str(sample.act_type.as_deref().unwrap_or(""));
    row
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QualityReport, QualityScore, SessionMetadata};
    use tempfile::tempdir;

    fn report() -> QualityReport {
        QualityReport {
            measured_hz: 99.5,
            dropped_pct: 0.0,
            duration_real: 12.6,
            cadence_spm: Some(104.0),
            accel_median_norm: Some(1.01),
            score: QualityScore::Ok,
        }
    }

    fn samples() -> Vec<Sample> {
        let mut walking = Sample::from_accel(0.01, 0.1, -0.2, 1.0);
        walking.act_type = Some("walking".to_string());
        vec![Sample::from_accel(0.0, 0.0, 0.0, 1.0), walking]
    }

    #[test]
    fn writes_metadata_header_and_rows() {
        let dir = tempdir().unwrap();
        let exporter = CsvSessionExporter::new(dir.path().join("sessions"));
        let mut meta = SessionMetadata::new("P001", "session_1", 100);
        meta.bac = Some(0.0456);
        meta.quality_flags.insert("short".to_string(), "true".to_string());
        let samples = samples();
        let quality = report();

        let artifact = exporter
            .export(&SessionRecord {
                meta: &meta,
                samples: &samples,
                quality: &quality,
            })
            .unwrap();

        assert_eq!(artifact.rows, 2);
        let name = artifact.csv_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("imu_P001_"));
        assert!(name.ends_with("_dur13.csv"));
        assert!(artifact.sidecar_path.exists());

        let text = fs::read_to_string(&artifact.csv_path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# file_schema_version,1.0");
        assert!(lines.contains(&"# participant_id,P001"));
        assert!(lines.contains(&"# bac,0.046"));
        assert!(lines.contains(&"# sampling_hz_measured,99.50"));
        assert!(lines.contains(&"# duration_recorded_s,12.600"));
        assert!(lines.contains(&r#"# quality_flags,{"short":"true"}"#));

        let data = lines.iter().position(|l| *l == "# data").unwrap();
        assert_eq!(lines[data + 1], DATA_COLUMNS.join(","));
        assert_eq!(lines.len(), data + 4);
        assert!(lines[data + 3].starts_with("0.010000000,0.100000000,-0.200000000,1.000000000,"));
        assert!(lines[data + 3].ends_with(",walking"));
        assert!(lines[data + 2].ends_with(','));

        let entries: Vec<_> = fs::read_dir(dir.path().join("sessions")).unwrap().collect();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn semicolon_delimiter_only_affects_data() {
        let dir = tempdir().unwrap();
        let exporter = CsvSessionExporter::new(dir.path()).with_semicolon_delimiter(true);
        let meta = SessionMetadata::new("P002", "session_2", 100);
        let samples = samples();
        let quality = report();
        let artifact = exporter
            .export(&SessionRecord {
                meta: &meta,
                samples: &samples,
                quality: &quality,
            })
            .unwrap();

        let text = fs::read_to_string(&artifact.csv_path).unwrap();
        assert!(text.contains("# session_id,session_2\n"));
        assert!(text.contains("t;ax;ay;az;"));
        assert!(text.contains("0.000000000;0.000000000;0.000000000;1.000000000;"));
    }

    #[test]
    fn strict_anonymization_hashes_participant() {
        let dir = tempdir().unwrap();
        let exporter = CsvSessionExporter::new(dir.path()).with_anonymization(true);
        let meta = SessionMetadata::new("P001", "session_3", 100);
        let samples = samples();
        let quality = report();
        let artifact = exporter
            .export(&SessionRecord {
                meta: &meta,
                samples: &samples,
                quality: &quality,
            })
            .unwrap();

        let hashed = anonymize("P001");
        assert_eq!(hashed.len(), 8);
        assert!(hashed.chars().all(|c| c.is_ascii_hexdigit()));
        let text = fs::read_to_string(&artifact.csv_path).unwrap();
        assert!(!text.contains("P001"));
        assert!(text.contains(&format!("# participant_id,{}", hashed)));

        let sidecar: SessionSummary =
            serde_json::from_str(&fs::read_to_string(&artifact.sidecar_path).unwrap()).unwrap();
        assert_eq!(sidecar.meta.participant_id, hashed);
        assert!(sidecar.samples.is_empty());
        assert_eq!(sidecar.quality, quality);
    }

    #[test]
    fn anonymize_matches_known_digest() {
        // sha256("abc") = ba7816bf...
        assert_eq!(anonymize("abc"), "ba7816bf");
    }

    #[test]
    fn export_logs_analytics_event() {
        let dir = tempdir().unwrap();
        let exporter = CsvSessionExporter::new(dir.path().join("sessions")).with_analytics(AnalyticsLog::new(dir.path()));
        let meta = SessionMetadata::new("P001", "session_4", 100);
        let samples = samples();
        let quality = report();
        exporter
            .export(&SessionRecord {
                meta: &meta,
                samples: &samples,
                quality: &quality,
            })
            .unwrap();

        let log = fs::read_to_string(dir.path().join("analytics_log.csv")).unwrap();
        assert!(log.contains(",test_exported,session_id=session_4|rows=2|score=OK"));
    }

    #[test]
    fn notes_are_kept_on_one_line() {
        assert_eq!(single_line("a\nb\r\nc"), "a b  c");
    }
}
