pub mod sample;
pub mod quality;
pub mod metadata;
pub mod results;
pub mod tasks;

pub use sample::{Sample, SensorEvent};
pub use quality::{QualityReport, QualityScore};
pub use metadata::{BacMethod, Condition, PhonePosition, SessionMetadata};
pub use results::{ExportArtifact, ExportError, RecorderError, SourceError};
pub use tasks::RecorderTask;
