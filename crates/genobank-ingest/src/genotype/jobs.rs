//! Persisted genotype import job records
//!
//! A job row in `import_jobs` is the only place job state lives, so a caller
//! polling for status from another process sees the same record the pipeline
//! writes.

use crate::genotype::outcome::JobOutcome;
use chrono::{DateTime, Utc};
use genobank_common::MatrixFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Import job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Checking,
    Importing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Checking => "checking",
            JobStatus::Importing => "importing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => JobStatus::Pending,
            "checking" => JobStatus::Checking,
            "importing" => JobStatus::Importing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }
}

/// Genotype import job (maps to import_jobs table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: Uuid,
    pub input_path: PathBuf,
    pub format: MatrixFormat,
    pub status: JobStatus,
    pub dataset_id: Option<i64>,
    pub outcome: JobOutcome,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportJob {
    /// Create a new pending job for `input_path`
    pub fn new(input_path: impl Into<PathBuf>, format: MatrixFormat) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            input_path: input_path.into(),
            format,
            status: JobStatus::Pending,
            dataset_id: None,
            outcome: JobOutcome::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `status`, stamping the update time
    pub fn transition(&mut self, status: JobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
