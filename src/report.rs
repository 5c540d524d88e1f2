// JSON export of a completed (or cancelled) run.
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::finding::{Finding, ResultStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub total_results: usize,
}

/// Self-describing export document: metadata header plus the findings in
/// submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub report_metadata: ReportMetadata,
    pub results: Vec<Finding>,
}

impl Report {
    pub fn from_store(store: &ResultStore) -> Self {
        let results = store.snapshot();
        Self {
            report_metadata: ReportMetadata {
                tool: format!("osprobe v{}", env!("CARGO_PKG_VERSION")),
                generated_at: Utc::now(),
                total_results: results.len(),
            },
            results,
        }
    }

    pub fn to_json(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::SerializationError(e.to_string()))
    }

    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::SerializationError(e.to_string()))
    }

    pub fn write_to(&self, path: &Path) -> EngineResult<()> {
        let json = self.to_json()?;
        fs::write(path, json).map_err(|e| EngineError::FileError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!(
            "Exported {} results to {}",
            self.report_metadata.total_results,
            path.display()
        );
        Ok(())
    }
}
