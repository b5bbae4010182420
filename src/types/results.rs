use std::path::PathBuf;

/// 导出成功后生成的文件
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    pub csv_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub rows: usize,
}

/// 导出错误，唯一会返回给调用方的错误
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Recorder is not finished (state: {0})")]
    NotFinished(String),
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Persistence failed: {0}")]
    Persistence(String),
}

/// 传感器源错误
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Sensor source unavailable")]
    Unavailable,
    #[error("Missing credentials: {0}")]
    Credentials(String),
    #[error("Connection error: {0}")]
    Connection(String),
}

/// 记录器线程通信错误
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Recorder thread is not running")]
    Disconnected,
    #[error("Failed to spawn recorder thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error(transparent)]
    Export(#[from] ExportError),
}
