//! Ingestion job identity and status.
//!
//! Jobs are owned by the ingestion service. kb-sync only reads the latest
//! status and asks for new jobs to be started.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// The index a job re-builds: a knowledge base and one of its data sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexTarget {
    pub knowledge_base_id: String,
    pub data_source_id: String,
}

impl IndexTarget {
    pub fn new(knowledge_base_id: impl Into<String>, data_source_id: impl Into<String>) -> Self {
        Self {
            knowledge_base_id: knowledge_base_id.into(),
            data_source_id: data_source_id.into(),
        }
    }
}

impl fmt::Display for IndexTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.knowledge_base_id, self.data_source_id)
    }
}

/// Opaque job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh, time-ordered id.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Status of an ingestion job as reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// No job has ever run for the index
    #[default]
    NotStarted,
    InProgress,
    Complete,
    Failed,
    Stopped,
}

impl JobStatus {
    /// The only status that blocks a new start.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, JobStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::NotStarted => "NOT_STARTED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Complete => "COMPLETE",
            JobStatus::Failed => "FAILED",
            JobStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A re-indexing job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionJob {
    pub job_id: JobId,
    pub target: IndexTarget,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionJob {
    /// A job that has just been accepted by the service.
    pub fn started(target: IndexTarget, at: DateTime<Utc>) -> Self {
        Self {
            job_id: JobId::generate(),
            target,
            status: JobStatus::InProgress,
            started_at: at,
            updated_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_in_progress_blocks() {
        assert!(JobStatus::InProgress.is_in_progress());
        for status in [
            JobStatus::NotStarted,
            JobStatus::Complete,
            JobStatus::Failed,
            JobStatus::Stopped,
        ] {
            assert!(!status.is_in_progress(), "{} should not block", status);
        }
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&JobStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");
        let status: JobStatus = serde_json::from_str("\"NOT_STARTED\"").unwrap();
        assert_eq!(status, JobStatus::NotStarted);
        assert_eq!(JobStatus::default(), JobStatus::NotStarted);
    }

    #[test]
    fn test_job_ids_are_unique() {
        let a = JobId::generate();
        let b = JobId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 26);
    }

    #[test]
    fn test_started_job() {
        let target = IndexTarget::new("KB123", "DS456");
        let now = Utc::now();
        let job = IngestionJob::started(target.clone(), now);
        assert_eq!(job.status, JobStatus::InProgress);
        assert_eq!(job.target, target);
        assert_eq!(job.started_at, now);
        assert_eq!(target.to_string(), "KB123/DS456");
    }
}
