use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{ScriptedVideoApi, http_error, video};
use crate::core::jobs::{JobPoller, JobSource, JobStatus, JobStore, RetryPolicy, VideoJob};

fn pending(id: &str) -> VideoJob {
    VideoJob {
        video_id: id.to_string(),
        status: JobStatus::Pending,
        download_url: None,
        hosted_url: None,
        source: JobSource::Script {
            text: "hello".to_string(),
        },
        replica_id: "r1".to_string(),
        persona_id: None,
        created_at: Utc::now(),
        progress: 0,
        estimated_completion: None,
        attempts: 0,
    }
}

fn fast(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::fixed(Duration::from_millis(5), max_attempts)
}

async fn setup(api: ScriptedVideoApi, id: &str) -> (Arc<ScriptedVideoApi>, JobStore, JobPoller) {
    let store = JobStore::new();
    api.observe(&store);
    store.append(pending(id)).await;
    let api = Arc::new(api);
    let poller = JobPoller::new(api.clone(), store.clone());
    (api, store, poller)
}

#[tokio::test]
async fn completed_status_stops_polling_at_100() {
    let mut done = video("v1", "completed");
    done.hosted_url = Some("https://x/y".to_string());
    let api = ScriptedVideoApi::new()
        .then(Ok(video("v1", "processing")))
        .then(Ok(video("v1", "processing")))
        .then(Ok(done));
    let (api, store, poller) = setup(api, "v1").await;

    let handle = poller.spawn(pending("v1"), fast(10), CancellationToken::new());
    let finished = handle.wait().await.unwrap();

    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.progress, 100);
    assert_eq!(finished.hosted_url.as_deref(), Some("https://x/y"));
    assert_eq!(api.gets(), 3);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(api.gets(), 3, "no polling after a terminal state");
    assert_eq!(store.get("v1").await.unwrap(), finished);

    // Snapshot taken before tick 2 shows the effect of tick 1.
    let history = api.history.lock().unwrap().clone();
    let after_first = history[1].clone().unwrap();
    assert_eq!(after_first.status, JobStatus::Processing);
    assert!(after_first.progress > 0);
}

#[tokio::test]
async fn progress_is_non_decreasing_until_terminal() {
    let api = ScriptedVideoApi::new()
        .then(Ok(video("v1", "processing")))
        .then(Err(http_error(503)))
        .then(Ok(video("v1", "processing")))
        .then(Ok(video("v1", "processing")))
        .then(Ok(video("v1", "completed")));
    let (api, _store, poller) = setup(api, "v1").await;

    let finished = poller
        .spawn(pending("v1"), fast(8), CancellationToken::new())
        .wait()
        .await
        .unwrap();
    assert_eq!(finished.progress, 100);

    let progress: Vec<u8> = api
        .history
        .lock()
        .unwrap()
        .iter()
        .map(|j| j.as_ref().unwrap().progress)
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
    assert!(progress.iter().all(|p| *p <= 95));
}

#[tokio::test]
async fn transport_errors_do_not_abandon_the_job() {
    let api = ScriptedVideoApi::new()
        .then(Err(http_error(503)))
        .then(Err(http_error(502)))
        .then(Ok(video("v1", "completed")));
    let (api, _store, poller) = setup(api, "v1").await;

    let finished = poller
        .spawn(pending("v1"), fast(5), CancellationToken::new())
        .wait()
        .await
        .unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.attempts, 3);
    assert_eq!(api.gets(), 3);
}

#[tokio::test]
async fn failure_is_terminal() {
    let api = ScriptedVideoApi::new()
        .then(Ok(video("v1", "processing")))
        .then(Ok(video("v1", "failed")));
    let (api, _store, poller) = setup(api, "v1").await;

    let finished = poller
        .spawn(pending("v1"), fast(10), CancellationToken::new())
        .wait()
        .await
        .unwrap();
    assert_eq!(finished.status, JobStatus::Failed);
    assert_eq!(finished.progress, 10);
    assert_eq!(api.gets(), 2);
}

#[tokio::test]
async fn exhausted_budget_marks_job_timed_out() {
    let api = ScriptedVideoApi::new();
    let (api, store, poller) = setup(api, "v1").await;

    let finished = poller
        .spawn(pending("v1"), fast(3), CancellationToken::new())
        .wait()
        .await
        .unwrap();
    assert_eq!(finished.status, JobStatus::TimedOut);
    assert!(finished.progress <= 95);
    assert_eq!(api.gets(), 3);
    assert_eq!(store.get("v1").await.unwrap().status, JobStatus::TimedOut);
}

#[tokio::test]
async fn cancel_stops_further_ticks() {
    let api = ScriptedVideoApi::new();
    let (api, store, poller) = setup(api, "v1").await;

    let policy = RetryPolicy::fixed(Duration::from_secs(3600), 10);
    let handle = poller.spawn(pending("v1"), policy, CancellationToken::new());
    let mut updates = handle.subscribe();
    updates.changed().await.unwrap();
    assert_eq!(updates.borrow().status, JobStatus::Processing);

    handle.cancel();
    assert!(handle.wait().await.is_none());
    assert_eq!(api.gets(), 1);
    assert_eq!(store.get("v1").await.unwrap().status, JobStatus::Processing);
}

#[tokio::test]
async fn pollers_for_different_jobs_do_not_interfere() {
    let api = ScriptedVideoApi::new();
    let store = JobStore::new();
    store.append(pending("a")).await;
    store.append(pending("b")).await;
    let api = Arc::new(api);
    let poller = JobPoller::new(api.clone(), store.clone());

    let a = poller.spawn(pending("a"), fast(2), CancellationToken::new());
    let b = poller.spawn(pending("b"), fast(4), CancellationToken::new());
    let a = a.wait().await.unwrap();
    let b = b.wait().await.unwrap();
    assert_eq!(a.attempts, 2);
    assert_eq!(b.attempts, 4);
    assert_eq!(store.get("a").await.unwrap().attempts, 2);
    assert_eq!(store.get("b").await.unwrap().attempts, 4);
}

#[tokio::test]
async fn already_terminal_job_is_not_polled() {
    let api = ScriptedVideoApi::new();
    let (api, _store, poller) = setup(api, "v1").await;
    let mut done = pending("v1");
    done.status = JobStatus::Completed;
    done.progress = 100;

    let finished = poller
        .spawn(done, fast(3), CancellationToken::new())
        .wait()
        .await
        .unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(api.gets(), 0);
}
