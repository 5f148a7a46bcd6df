mod policy;
mod poller;
mod submitter;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, OnceLock};

use super::{JobStore, VideoJob};
use crate::core::vendors::tavus::{CreateVideoRequest, VideoApi, VideoResponse};
use crate::core::vendors::{Vendor, VendorError};

/// In-memory video API that replays a fixed sequence of poll responses and
/// snapshots the store before every poll.
#[derive(Default)]
pub(super) struct ScriptedVideoApi {
    create: Mutex<Option<Result<VideoResponse, VendorError>>>,
    ticks: Mutex<VecDeque<Result<VideoResponse, VendorError>>>,
    observed: OnceLock<JobStore>,
    pub history: Mutex<Vec<Option<VideoJob>>>,
    pub requests: Mutex<Vec<CreateVideoRequest>>,
    pub creates: AtomicU32,
    pub gets: AtomicU32,
}

pub(super) fn video(id: &str, status: &str) -> VideoResponse {
    VideoResponse {
        video_id: id.to_string(),
        status: Some(status.to_string()),
        download_url: None,
        hosted_url: None,
    }
}

pub(super) fn http_error(status: u16) -> VendorError {
    VendorError::Status {
        vendor: Vendor::Tavus,
        status,
        message: "unavailable".to_string(),
    }
}

impl ScriptedVideoApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_create(self, response: Result<VideoResponse, VendorError>) -> Self {
        *self.create.lock().unwrap() = Some(response);
        self
    }

    pub fn then(self, response: Result<VideoResponse, VendorError>) -> Self {
        self.ticks.lock().unwrap().push_back(response);
        self
    }

    pub fn observe(&self, store: &JobStore) {
        let _ = self.observed.set(store.clone());
    }

    pub fn gets(&self) -> u32 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> u32 {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoApi for ScriptedVideoApi {
    async fn create_video(
        &self,
        request: &CreateVideoRequest,
    ) -> Result<VideoResponse, VendorError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.create
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Ok(video("v1", "pending")))
    }

    async fn get_video(&self, video_id: &str) -> Result<VideoResponse, VendorError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if let Some(store) = self.observed.get() {
            let snapshot = store.get(video_id).await;
            self.history.lock().unwrap().push(snapshot);
        }
        let next = self.ticks.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(video(video_id, "processing")))
    }
}
