//! 会话导出：CSV + JSON 附属文件，以及事件日志

pub mod analytics;
pub mod csv_writer;

use serde::{Deserialize, Serialize};

use crate::types::{ExportArtifact, ExportError, QualityReport, Sample, SessionMetadata};

pub use analytics::AnalyticsLog;
pub use csv_writer::CsvSessionExporter;

/// 交给导出方的完整数据，每个完成的试验只交付一次
#[derive(Debug, Clone, Copy)]
pub struct SessionRecord<'a> {
    pub meta: &'a SessionMetadata,
    pub samples: &'a [Sample],
    pub quality: &'a QualityReport,
}

/// JSON 附属文件内容，供会话列表预览（不含样本）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub meta: SessionMetadata,
    pub samples: Vec<Sample>,
    pub quality: QualityReport,
}

/// 持久化协作方
pub trait SessionExporter: Send {
    fn export(&self, record: &SessionRecord<'_>) -> Result<ExportArtifact, ExportError>;
}
