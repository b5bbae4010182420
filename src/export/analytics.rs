use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat};

const HEADER: &str = "timestamp,event,meta";

/// 追加写入的试验事件日志 `<base>/analytics_log.csv`
///
/// 每行 `timestamp,event,meta`，meta 为 `key=value` 以 `|` 连接。
#[derive(Debug, Clone)]
pub struct AnalyticsLog {
    path: PathBuf,
}

impl AnalyticsLog {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            path: base_dir.as_ref().join("analytics_log.csv"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, event: &str, meta: &[(&str, &str)]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", HEADER)?;
        }

        let timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Millis, false);
        let mut line = format!("{},{}", timestamp, event);
        if !meta.is_empty() {
            let payload: Vec<String> = meta
                .iter()
                .map(|(k, v)| format!("{}={}", k, v.replace([',', '\n'], " ")))
                .collect();
            line.push(',');
            line.push_str(&payload.join("|"));
        }
        writeln!(file, "{}", line)
    }
}
