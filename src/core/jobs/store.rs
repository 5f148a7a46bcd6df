use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{JobPatch, VideoJob};

/// Session-wide list of jobs, newest first. Clones share the same list.
#[derive(Clone, Default)]
pub struct JobStore {
    jobs: Arc<RwLock<Vec<VideoJob>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, job: VideoJob) {
        let mut jobs = self.jobs.write().await;
        jobs.insert(0, job);
    }

    /// Merge `patch` into the record with `video_id` and return the result.
    /// Unknown ids and terminal records are left untouched and yield `None`.
    pub async fn update_by_id(&self, video_id: &str, patch: JobPatch) -> Option<VideoJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.iter_mut().find(|j| j.video_id == video_id)?;
        if job.status.is_terminal() {
            debug!(
                "Ignoring update for {} (already {})",
                video_id,
                job.status.as_str()
            );
            return None;
        }
        job.apply(patch);
        Some(job.clone())
    }

    pub async fn get(&self, video_id: &str) -> Option<VideoJob> {
        let jobs = self.jobs.read().await;
        jobs.iter().find(|j| j.video_id == video_id).cloned()
    }

    pub async fn list(&self) -> Vec<VideoJob> {
        self.jobs.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}
