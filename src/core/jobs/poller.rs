use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{JobPatch, JobStatus, JobStore, RetryPolicy, VideoJob, progress_estimate};
use crate::core::vendors::tavus::VideoApi;

/// Drives jobs to a terminal state by polling the vendor.
#[derive(Clone)]
pub struct JobPoller {
    api: Arc<dyn VideoApi>,
    store: JobStore,
}

/// Owner's grip on a running poller.
#[derive(Debug)]
pub struct PollHandle {
    video_id: String,
    token: CancellationToken,
    updates: watch::Receiver<VideoJob>,
    task: JoinHandle<Option<VideoJob>>,
}

impl PollHandle {
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Stop polling. No tick fires after this returns.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn subscribe(&self) -> watch::Receiver<VideoJob> {
        self.updates.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the poller to stop. `None` when it was cancelled.
    pub async fn wait(self) -> Option<VideoJob> {
        self.task.await.ok().flatten()
    }
}

impl JobPoller {
    pub fn new(api: Arc<dyn VideoApi>, store: JobStore) -> Self {
        Self { api, store }
    }

    pub fn spawn(&self, job: VideoJob, policy: RetryPolicy, token: CancellationToken) -> PollHandle {
        let (tx, rx) = watch::channel(job.clone());
        let video_id = job.video_id.clone();
        let poller = self.clone();
        let task_token = token.clone();
        let task = tokio::spawn(async move { poller.run(job, policy, task_token, tx).await });
        PollHandle {
            video_id,
            token,
            updates: rx,
            task,
        }
    }

    async fn run(
        &self,
        job: VideoJob,
        policy: RetryPolicy,
        token: CancellationToken,
        updates: watch::Sender<VideoJob>,
    ) -> Option<VideoJob> {
        if job.status.is_terminal() {
            return Some(job);
        }
        let video_id = job.video_id;
        let mut attempt: u32 = 0;

        loop {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("Polling for {} cancelled after {} attempts", video_id, attempt);
                    return None;
                }
                res = self.api.get_video(&video_id) => res,
            };
            attempt += 1;

            let patch = match result {
                Ok(video) => {
                    let status = JobStatus::from_vendor(video.status.as_deref());
                    // A vendor that still says "pending" after we started polling is working on it.
                    let status = if status == JobStatus::Pending {
                        JobStatus::Processing
                    } else {
                        status
                    };
                    JobPatch {
                        status: Some(status),
                        download_url: video.download_url,
                        hosted_url: video.hosted_url,
                        progress: (!status.is_terminal())
                            .then(|| progress_estimate(attempt, policy.max_attempts)),
                        attempts: Some(attempt),
                    }
                }
                Err(e) => {
                    warn!(
                        "Poll {}/{} for {} failed: {}",
                        attempt, policy.max_attempts, video_id, e
                    );
                    JobPatch {
                        attempts: Some(attempt),
                        ..JobPatch::default()
                    }
                }
            };

            if token.is_cancelled() {
                return None;
            }
            if let Some(updated) = self.store.update_by_id(&video_id, patch).await {
                updates.send_replace(updated.clone());
                if updated.status.is_terminal() {
                    info!("Video {} finished: {}", video_id, updated.status.as_str());
                    return Some(updated);
                }
            } else if let Some(current) = self.store.get(&video_id).await
                && current.status.is_terminal()
            {
                return Some(current);
            }

            if attempt >= policy.max_attempts {
                warn!(
                    "Video {} did not finish within {} attempts, marking timed out",
                    video_id, policy.max_attempts
                );
                let stalled = JobPatch {
                    status: Some(JobStatus::TimedOut),
                    ..JobPatch::default()
                };
                let last = match self.store.update_by_id(&video_id, stalled).await {
                    Some(updated) => {
                        updates.send_replace(updated.clone());
                        Some(updated)
                    }
                    None => self.store.get(&video_id).await,
                };
                return last;
            }

            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("Polling for {} cancelled after {} attempts", video_id, attempt);
                    return None;
                }
                _ = tokio::time::sleep(policy.delay_after(attempt)) => {}
            }
        }
    }
}
