use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use super::asset::AssetId;

/// Status reported by an external transcode job. Wire values are upper-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Submitted,
    Running,
    Complete,
    Error,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Complete | JobStatus::Error | JobStatus::Canceled
        )
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Submitted => write!(f, "SUBMITTED"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Complete => write!(f, "COMPLETE"),
            JobStatus::Error => write!(f, "ERROR"),
            JobStatus::Canceled => write!(f, "CANCELED"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SUBMITTED" => Ok(JobStatus::Submitted),
            "RUNNING" | "PROGRESSING" => Ok(JobStatus::Running),
            "COMPLETE" => Ok(JobStatus::Complete),
            "ERROR" => Ok(JobStatus::Error),
            "CANCELED" | "CANCELLED" => Ok(JobStatus::Canceled),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// Handle for an external transcode job. Cleared once the asset reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    pub job_id: String,
    pub status: JobStatus,
    pub asset_id: AssetId,
    /// Asset version the job produces derivatives for.
    pub version: u32,
    pub submitted_at: DateTime<Utc>,
}
