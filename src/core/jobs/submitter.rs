use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{
    ESTIMATED_RENDER_MINUTES, JobPoller, JobSource, JobStatus, JobStore, PollHandle, RetryPolicy,
    VideoJob,
};
use crate::core::vendors::VendorError;
use crate::core::vendors::tavus::{CreateVideoRequest, VideoApi};

/// Parameters for a new render.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub replica_id: String,
    pub persona_id: Option<String>,
    pub source: JobSource,
}

impl NewVideo {
    pub fn from_script(replica_id: &str, script: &str) -> Self {
        Self {
            replica_id: replica_id.to_string(),
            persona_id: None,
            source: JobSource::Script {
                text: script.to_string(),
            },
        }
    }

    pub fn from_audio(replica_id: &str, audio_url: &str, file_name: Option<String>) -> Self {
        Self {
            replica_id: replica_id.to_string(),
            persona_id: None,
            source: JobSource::Audio {
                file_name,
                url: audio_url.to_string(),
            },
        }
    }

    fn validate(self) -> Result<Self, VendorError> {
        let replica_id = self.replica_id.trim().to_string();
        if replica_id.is_empty() {
            return Err(VendorError::Invalid("Select a replica first.".to_string()));
        }
        let source = match self.source {
            JobSource::Script { text } => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return Err(VendorError::Invalid("The script is empty.".to_string()));
                }
                JobSource::Script { text }
            }
            JobSource::Audio { file_name, url } => {
                let url = url.trim().to_string();
                if url.is_empty() {
                    return Err(VendorError::Invalid(
                        "An audio URL is required.".to_string(),
                    ));
                }
                JobSource::Audio { file_name, url }
            }
        };
        Ok(Self {
            replica_id,
            persona_id: self.persona_id.filter(|p| !p.trim().is_empty()),
            source,
        })
    }

    fn request(&self) -> CreateVideoRequest {
        let (script, audio_url) = match &self.source {
            JobSource::Script { text } => (Some(text.clone()), None),
            JobSource::Audio { url, .. } => (None, Some(url.clone())),
        };
        CreateVideoRequest {
            replica_id: self.replica_id.clone(),
            script,
            audio_url,
        }
    }
}

/// Submits renders and owns the pollers that follow them. Dropping the
/// studio does not stop pollers; call `shutdown`.
pub struct VideoStudio {
    api: Arc<dyn VideoApi>,
    store: JobStore,
    poller: JobPoller,
    script_policy: RetryPolicy,
    audio_policy: RetryPolicy,
    root: CancellationToken,
}

impl VideoStudio {
    pub fn new(
        api: Arc<dyn VideoApi>,
        store: JobStore,
        script_policy: RetryPolicy,
        audio_policy: RetryPolicy,
    ) -> Self {
        let poller = JobPoller::new(api.clone(), store.clone());
        Self {
            api,
            store,
            poller,
            script_policy,
            audio_policy,
            root: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Create the job once (never retried), record it and start polling.
    /// On failure nothing is recorded.
    pub async fn submit(&self, params: NewVideo) -> Result<(VideoJob, PollHandle), VendorError> {
        let params = params.validate()?;
        let created = self.api.create_video(&params.request()).await?;
        if created.video_id.trim().is_empty() {
            return Err(VendorError::Decode {
                vendor: crate::core::vendors::Vendor::Tavus,
                message: "missing video_id".to_string(),
            });
        }

        let now = Utc::now();
        let status = JobStatus::from_vendor(created.status.as_deref());
        let job = VideoJob {
            video_id: created.video_id,
            status,
            download_url: created.download_url,
            hosted_url: created.hosted_url,
            source: params.source.clone(),
            replica_id: params.replica_id.clone(),
            persona_id: params.persona_id.clone(),
            created_at: now,
            progress: if status == JobStatus::Completed { 100 } else { 0 },
            estimated_completion: Some(now + ChronoDuration::minutes(ESTIMATED_RENDER_MINUTES)),
            attempts: 0,
        };
        info!(
            "Submitted video {} (replica {}, status {})",
            job.video_id,
            job.replica_id,
            job.status.as_str()
        );

        self.store.append(job.clone()).await;
        let policy = match params.source {
            JobSource::Script { .. } => self.script_policy,
            JobSource::Audio { .. } => self.audio_policy,
        };
        let handle = self.poller.spawn(job.clone(), policy, self.root.child_token());
        Ok((job, handle))
    }

    /// Start following an existing vendor job (e.g. one created in an
    /// earlier session).
    pub async fn track(&self, video_id: &str) -> Result<(VideoJob, PollHandle), VendorError> {
        let video = self.api.get_video(video_id).await?;
        let status = JobStatus::from_vendor(video.status.as_deref());
        let job = VideoJob {
            video_id: video.video_id,
            status,
            download_url: video.download_url,
            hosted_url: video.hosted_url,
            source: JobSource::Script {
                text: String::new(),
            },
            replica_id: String::new(),
            persona_id: None,
            created_at: Utc::now(),
            progress: if status == JobStatus::Completed { 100 } else { 0 },
            estimated_completion: None,
            attempts: 0,
        };
        self.store.append(job.clone()).await;
        let handle = self
            .poller
            .spawn(job.clone(), self.script_policy, self.root.child_token());
        Ok((job, handle))
    }

    /// Cancel every poller started by this studio.
    pub fn shutdown(&self) {
        self.root.cancel();
    }
}
