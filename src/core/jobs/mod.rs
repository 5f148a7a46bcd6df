//! Video-generation jobs: the record type, the in-memory store, the retry
//! policy and the poller that drives each job to a terminal state.

mod policy;
mod poller;
mod store;
mod submitter;

pub use policy::{Backoff, RetryPolicy};
pub use poller::{JobPoller, PollHandle};
pub use store::JobStore;
pub use submitter::{NewVideo, VideoStudio};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ceiling for the estimate while a job is still running. Only a completed
/// job reports 100.
pub const PROGRESS_CEILING: u8 = 95;

/// The vendor gives no completion estimate; the product assumes five minutes.
pub const ESTIMATED_RENDER_MINUTES: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// The attempt budget ran out before the vendor reported an outcome.
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::TimedOut
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::TimedOut => "timed_out",
        }
    }

    /// Map a vendor status string. Unknown values mean the vendor is still
    /// working on it.
    pub fn from_vendor(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("pending") | Some("queued") => JobStatus::Pending,
            Some("completed") | Some("ready") => JobStatus::Completed,
            Some("failed") | Some("error") | Some("deleted") => JobStatus::Failed,
            Some(_) => JobStatus::Processing,
        }
    }
}

/// What the video is rendered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobSource {
    Script { text: String },
    Audio { file_name: Option<String>, url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoJob {
    pub video_id: String,
    pub status: JobStatus,
    pub download_url: Option<String>,
    pub hosted_url: Option<String>,
    pub source: JobSource,
    pub replica_id: String,
    pub persona_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Estimate derived from elapsed attempts, not vendor truth.
    pub progress: u8,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub attempts: u32,
}

/// Field-wise update; `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub download_url: Option<String>,
    pub hosted_url: Option<String>,
    pub progress: Option<u8>,
    pub attempts: Option<u32>,
}

impl VideoJob {
    /// Merge a patch. Progress never moves backwards while the job runs,
    /// stays at or below the ceiling unless completed, and snaps to 100 on
    /// completion.
    pub fn apply(&mut self, patch: JobPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if patch.download_url.is_some() {
            self.download_url = patch.download_url;
        }
        if patch.hosted_url.is_some() {
            self.hosted_url = patch.hosted_url;
        }
        if let Some(attempts) = patch.attempts {
            self.attempts = self.attempts.max(attempts);
        }

        self.progress = match self.status {
            JobStatus::Completed => 100,
            _ => self
                .progress
                .max(patch.progress.unwrap_or(self.progress))
                .min(PROGRESS_CEILING),
        };
    }

    pub fn source_label(&self) -> String {
        match &self.source {
            JobSource::Script { text } => {
                let mut label: String = text.chars().take(40).collect();
                if text.chars().count() > 40 {
                    label.push('…');
                }
                label
            }
            JobSource::Audio { file_name, url } => {
                file_name.clone().unwrap_or_else(|| url.clone())
            }
        }
    }
}

/// `min(95, attempt / max_attempts * 100)` with a 1-based attempt number.
pub fn progress_estimate(attempt: u32, max_attempts: u32) -> u8 {
    if max_attempts == 0 {
        return PROGRESS_CEILING;
    }
    let pct = (u64::from(attempt) * 100) / u64::from(max_attempts);
    pct.min(u64::from(PROGRESS_CEILING)) as u8
}

#[cfg(test)]
mod tests;
