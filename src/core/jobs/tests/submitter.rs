use std::sync::Arc;
use std::time::Duration;

use super::{ScriptedVideoApi, http_error, video};
use crate::core::jobs::{JobSource, JobStatus, JobStore, NewVideo, RetryPolicy, VideoStudio};
use crate::core::vendors::VendorError;

fn studio(api: Arc<ScriptedVideoApi>) -> VideoStudio {
    VideoStudio::new(
        api,
        JobStore::new(),
        RetryPolicy::fixed(Duration::from_millis(5), 6),
        RetryPolicy::fixed(Duration::from_millis(5), 2),
    )
}

#[tokio::test]
async fn submit_records_pending_job_then_completes() {
    let mut done = video("v1", "completed");
    done.hosted_url = Some("https://x/y".to_string());
    let api = Arc::new(
        ScriptedVideoApi::new()
            .on_create(Ok(video("v1", "pending")))
            .then(Ok(video("v1", "processing")))
            .then(Ok(done)),
    );
    let studio = studio(api.clone());

    let (job, handle) = studio
        .submit(NewVideo::from_script("r1", "  hello  "))
        .await
        .unwrap();
    assert_eq!(job.video_id, "v1");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.progress, 0);
    assert!(job.estimated_completion.is_some());
    assert_eq!(
        job.source,
        JobSource::Script {
            text: "hello".to_string()
        }
    );

    let request = api.requests.lock().unwrap()[0].clone();
    assert_eq!(request.replica_id, "r1");
    assert_eq!(request.script.as_deref(), Some("hello"));
    assert!(request.audio_url.is_none());

    let finished = handle.wait().await.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.progress, 100);
    assert_eq!(finished.hosted_url.as_deref(), Some("https://x/y"));
    assert_eq!(studio.store().get("v1").await.unwrap(), finished);
}

#[tokio::test]
async fn failed_submission_creates_nothing_and_is_not_retried() {
    let api = Arc::new(ScriptedVideoApi::new().on_create(Err(http_error(500))));
    let studio = studio(api.clone());

    let err = studio
        .submit(NewVideo::from_script("r1", "hello"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), Some(500));
    assert_eq!(api.creates(), 1);
    assert_eq!(studio.store().len().await, 0);
}

#[tokio::test]
async fn blank_inputs_are_rejected_locally() {
    let api = Arc::new(ScriptedVideoApi::new());
    let studio = studio(api.clone());

    let err = studio
        .submit(NewVideo::from_script("r1", "   "))
        .await
        .unwrap_err();
    assert!(matches!(err, VendorError::Invalid(_)));
    let err = studio
        .submit(NewVideo::from_script("", "hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, VendorError::Invalid(_)));
    let err = studio
        .submit(NewVideo::from_audio("r1", " ", None))
        .await
        .unwrap_err();
    assert!(matches!(err, VendorError::Invalid(_)));
    assert_eq!(api.creates(), 0);
}

#[tokio::test]
async fn audio_jobs_use_the_audio_budget() {
    let api = Arc::new(ScriptedVideoApi::new().on_create(Ok(video("v7", "queued"))));
    let studio = studio(api.clone());

    let (job, handle) = studio
        .submit(NewVideo::from_audio(
            "r1",
            "https://cdn/voice.mp3",
            Some("voice.mp3".to_string()),
        ))
        .await
        .unwrap();
    assert_eq!(job.source_label(), "voice.mp3");
    let request = api.requests.lock().unwrap()[0].clone();
    assert_eq!(request.audio_url.as_deref(), Some("https://cdn/voice.mp3"));
    assert!(request.script.is_none());

    let finished = handle.wait().await.unwrap();
    assert_eq!(finished.status, JobStatus::TimedOut);
    assert_eq!(api.gets(), 2);
}

#[tokio::test]
async fn newest_submission_is_listed_first() {
    let api = Arc::new(ScriptedVideoApi::new().on_create(Ok(video("first", "pending"))));
    let studio = studio(api.clone());
    let (_, h1) = studio.submit(NewVideo::from_script("r1", "one")).await.unwrap();
    let (_, h2) = studio.submit(NewVideo::from_script("r1", "two")).await.unwrap();
    studio.shutdown();
    let _ = h1.wait().await;
    let _ = h2.wait().await;

    let jobs = studio.store().list().await;
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].video_id, "v1");
    assert_eq!(jobs[1].video_id, "first");
}

#[tokio::test]
async fn shutdown_cancels_running_pollers() {
    let api = Arc::new(ScriptedVideoApi::new());
    let studio = VideoStudio::new(
        api.clone(),
        JobStore::new(),
        RetryPolicy::fixed(Duration::from_secs(3600), 10),
        RetryPolicy::default(),
    );
    let (_, handle) = studio
        .submit(NewVideo::from_script("r1", "hello"))
        .await
        .unwrap();
    let mut updates = handle.subscribe();
    updates.changed().await.unwrap();

    studio.shutdown();
    assert!(handle.wait().await.is_none());
    assert_eq!(api.gets(), 1);
}
