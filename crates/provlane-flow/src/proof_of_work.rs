//! Proof-of-work artifacts
//!
//! A completed session serializes to one document holding the full ordered
//! event list. Replaying that list from empty state reconstructs the graph
//! and timeline exactly, which makes the document the interchange format
//! between offline runs and the visualization tooling.

use crate::error::{FlowError, FlowResult};
use crate::trace::{SessionTrace, TaskRecord};
use chrono::{DateTime, Utc};
use provlane_types::{EventRecord, SessionStatus};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofOfWork {
    pub session_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Normalized events in arrival order
    pub events: Vec<EventRecord>,
}

impl ProofOfWork {
    /// `proof_of_work_{session}_{YYYYmmdd_HHMMSS}.json`, stamped with the end time
    pub fn file_name(&self) -> String {
        let stamp = self.ended_at.unwrap_or(self.started_at);
        format!(
            "proof_of_work_{}_{}.json",
            sanitize_file_component(&self.session_id),
            stamp.format("%Y%m%d_%H%M%S")
        )
    }

    /// Write into `output_dir` (created when missing) under [`Self::file_name`]
    pub fn save(&self, output_dir: &Path) -> FlowResult<PathBuf> {
        std::fs::create_dir_all(output_dir).map_err(|e| FlowError::file(e.to_string()))?;
        let path = output_dir.join(self.file_name());
        self.save_to(&path)?;
        Ok(path)
    }

    /// Write to `path`; `.yml`/`.yaml` selects YAML, anything else JSON
    pub fn save_to(&self, path: &Path) -> FlowResult<()> {
        let content = if is_yaml(path) {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        std::fs::write(path, content).map_err(|e| FlowError::file(e.to_string()))?;
        info!(
            session_id = %self.session_id,
            file_path = %path.display(),
            events = self.events.len(),
            "Proof of work saved"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> FlowResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| FlowError::file(e.to_string()))?;
        let artifact = if is_yaml(path) {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(artifact)
    }

    /// Rebuild the session's derived state by in-order replay
    pub fn replay(&self, observation_cap: usize) -> FlowResult<SessionTrace> {
        let mut trace = SessionTrace::replay(
            self.session_id.clone(),
            self.events.iter().cloned(),
            observation_cap,
        )?;
        trace.restore_lifecycle(self.status, self.started_at, self.ended_at);
        Ok(trace)
    }
}

/// Persists proof-of-work documents of closed sessions
#[async_trait::async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Store one artifact, returning where it went
    async fn write(&self, artifact: &ProofOfWork) -> FlowResult<PathBuf>;
}

/// Writes artifacts as JSON files into one directory
#[derive(Debug, Clone)]
pub struct FileArtifactWriter {
    output_dir: PathBuf,
}

impl FileArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait::async_trait]
impl ArtifactWriter for FileArtifactWriter {
    async fn write(&self, artifact: &ProofOfWork) -> FlowResult<PathBuf> {
        artifact.save(&self.output_dir)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yml") | Some("yaml")
    )
}

fn sanitize_file_component(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("run/01 a"), "run_01_a");
        assert_eq!(sanitize_file_component("abc-DEF_1"), "abc-DEF_1");
    }
}
