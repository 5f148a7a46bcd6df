use anyhow::{Result, anyhow};
use console::style;
use std::sync::Arc;

use super::{AppContext, CommandArgs, parse_command_args, sub_command};
use crate::core::jobs::{JobStatus, JobStore, NewVideo, PollHandle, VideoJob, VideoStudio};
use crate::core::store::LocalStore;
use crate::core::terminal::{
    FILM, GuideSection, print_error, print_info, print_link, print_status, print_success,
    print_warn, progress_bar,
};
use crate::core::vendors::tavus::{VideoApi, VideoResponse};

pub const HISTORY_KEY: &str = "video_history";
const HISTORY_LIMIT: usize = 50;

const VALUE_FLAGS: &[&str] = &[
    "--replica",
    "-r",
    "--persona",
    "--script",
    "-s",
    "--audio-url",
    "--file-name",
];

pub async fn run_video_command(args: &[String]) -> Result<()> {
    let parsed = parse_command_args(args, 3, VALUE_FLAGS);
    if parsed.wants_help() {
        print_help();
        return Ok(());
    }
    match sub_command(args) {
        "create" | "new" => run_create(&parsed).await,
        "status" => {
            let video_id = parsed
                .positional(0)
                .ok_or_else(|| anyhow!("Usage: creatorflow video status <video_id> [--watch]"))?;
            run_status(video_id, parsed.switch(&["--watch", "-w"])).await
        }
        "list" | "ls" => run_list().await,
        other => {
            if !other.is_empty() {
                print_error(&format!("Unknown video command: {}", other));
            }
            print_help();
            Err(anyhow!("Expected one of: create, status, list"))
        }
    }
}

fn print_help() {
    GuideSection::new("creatorflow video")
        .command("create", "Submit a render and follow its progress")
        .command("status <id>", "Fetch a render's current status")
        .command("list", "Show renders started from this machine")
        .blank()
        .text("--replica, -r <id>    Replica to render (default: [tavus] default_replica_id)")
        .text("--script, -s <text>   Script for the replica to speak")
        .text("--audio-url <url>     Render from recorded audio instead of a script")
        .text("--file-name <name>    Label for the audio source")
        .text("--persona <id>        Persona to attach")
        .text("--no-wait             Return right after submitting")
        .text("--watch, -w           Follow a render until it finishes (status)")
        .blank()
        .hint("creatorflow video create -r r1 -s \"Hi, thanks for joining!\"", "")
        .hint("creatorflow video status v123 --watch", "")
        .print();
    println!();
}

fn studio(ctx: &AppContext, api: Arc<dyn VideoApi>) -> VideoStudio {
    VideoStudio::new(
        api,
        JobStore::new(),
        ctx.config.polling.script_policy(),
        ctx.config.polling.audio_policy(),
    )
}

fn new_video(ctx: &AppContext, parsed: &CommandArgs) -> Result<NewVideo> {
    let replica_id = match parsed
        .value(&["--replica", "-r"])
        .or_else(|| ctx.config.tavus.default_replica_id.clone())
    {
        Some(id) => id,
        None => inquire::Text::new("Replica id:")
            .with_help_message("The replica that will appear in the video")
            .prompt()?,
    };

    let mut params = match (parsed.value(&["--script", "-s"]), parsed.value(&["--audio-url"])) {
        (Some(_), Some(_)) => {
            return Err(anyhow!("Pass either --script or --audio-url, not both"));
        }
        (Some(script), None) => NewVideo::from_script(&replica_id, &script),
        (None, Some(url)) => NewVideo::from_audio(&replica_id, &url, parsed.value(&["--file-name"])),
        (None, None) => {
            let script = inquire::Text::new("Script:")
                .with_help_message("What should the replica say?")
                .prompt()?;
            NewVideo::from_script(&replica_id, &script)
        }
    };
    params.persona_id = parsed
        .value(&["--persona"])
        .or_else(|| ctx.config.tavus.default_persona_id.clone());
    Ok(params)
}

async fn run_create(parsed: &CommandArgs) -> Result<()> {
    let ctx = AppContext::load().await?;
    let params = new_video(&ctx, parsed)?;
    let api: Arc<dyn VideoApi> = Arc::new(ctx.tavus().await?);
    let studio = studio(&ctx, api);

    let (job, handle) = match studio.submit(params).await {
        Ok(submitted) => submitted,
        Err(e) => {
            print_error(&format!("Failed to create video: {}", e.user_message()));
            return Ok(());
        }
    };
    remember(&ctx.store, &job).await?;
    print_success(&format!("Video {} submitted.", job.video_id));
    print_job(&job);

    if parsed.switch(&["--no-wait"]) || job.status.is_terminal() {
        handle.cancel();
        if !job.status.is_terminal() {
            print_info(&format!(
                "Check on it later with `creatorflow video status {}`.",
                job.video_id
            ));
        }
        return Ok(());
    }

    let finished = follow(handle).await;
    studio.shutdown();
    finish(&ctx, &job.video_id, finished).await
}

async fn run_status(video_id: &str, watch: bool) -> Result<()> {
    let ctx = AppContext::load().await?;
    let api: Arc<dyn VideoApi> = Arc::new(ctx.tavus().await?);

    if !watch {
        match api.get_video(video_id).await {
            Ok(video) => {
                let mut job = recall(&ctx.store, video_id)
                    .await
                    .unwrap_or_else(|| placeholder(video_id, JobStatus::Pending));
                let server_status = apply_check(&mut job, video);
                remember(&ctx.store, &job).await?;
                print_job(&job);
                if server_status != job.status {
                    print_status("Server says", &status_style(server_status).to_string());
                }
            }
            Err(e) => print_error(&e.user_message()),
        }
        return Ok(());
    }

    let studio = studio(&ctx, api);
    let (job, handle) = match studio.track(video_id).await {
        Ok(tracked) => tracked,
        Err(e) => {
            print_error(&e.user_message());
            return Ok(());
        }
    };
    print_job(&job);
    let finished = if job.status.is_terminal() {
        handle.wait().await.or(Some(job))
    } else {
        follow(handle).await
    };
    studio.shutdown();
    finish(&ctx, video_id, finished).await
}

async fn run_list() -> Result<()> {
    let ctx = AppContext::load().await?;
    let history = load_history(&ctx.store).await;
    if history.is_empty() {
        print_info("No videos yet. Start one with `creatorflow video create`.");
        return Ok(());
    }
    println!("\n  {}{}\n", FILM, style("Your videos").bold());
    for job in &history {
        println!(
            "  {}  {:<11} {}  {}",
            style(&job.video_id).bold(),
            status_style(job.status),
            progress_bar(job.progress, 20),
            style(job.source_label()).dim()
        );
        if let Some(url) = &job.hosted_url {
            println!("      {}", style(url).underlined().cyan());
        }
    }
    println!();
    Ok(())
}

/// Streams updates until the job is terminal or the user presses Ctrl+C.
async fn follow(handle: PollHandle) -> Option<VideoJob> {
    let mut updates = handle.subscribe();
    let mut last = None;
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let job = updates.borrow_and_update().clone();
                if last != Some((job.status, job.progress)) {
                    println!(
                        "  {} {}",
                        progress_bar(job.progress, 30),
                        status_style(job.status)
                    );
                    last = Some((job.status, job.progress));
                }
                if job.status.is_terminal() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                print_warn(&format!(
                    "Stopped following {}. The render continues on the server.",
                    handle.video_id()
                ));
                break;
            }
        }
    }
    handle.wait().await
}

async fn finish(ctx: &AppContext, video_id: &str, finished: Option<VideoJob>) -> Result<()> {
    let Some(job) = finished else {
        return Ok(());
    };
    remember(&ctx.store, &job).await?;
    match job.status {
        JobStatus::Completed => {
            print_success(&format!("Video {} is ready.", video_id));
            print_job(&job);
        }
        JobStatus::Failed => print_error(&format!("Video {} failed to render.", video_id)),
        JobStatus::TimedOut => print_warn(&format!(
            "Stopped waiting for {} after {} checks. Run `creatorflow video status {}` later.",
            video_id, job.attempts, video_id
        )),
        _ => {}
    }
    Ok(())
}

fn print_job(job: &VideoJob) {
    print_status("Video", &job.video_id);
    print_status("Status", &status_style(job.status).to_string());
    print_status("Progress", &progress_bar(job.progress, 20));
    if !job.replica_id.is_empty() {
        print_status("Replica", &job.replica_id);
    }
    if let Some(eta) = job.estimated_completion
        && !job.status.is_terminal()
    {
        print_status("Estimated", &eta.format("%H:%M:%S UTC").to_string());
    }
    if let Some(url) = &job.hosted_url {
        print_link("Watch", url);
    }
    if let Some(url) = &job.download_url {
        print_link("Download", url);
    }
}

fn status_style(status: JobStatus) -> console::StyledObject<&'static str> {
    let label = style(status.as_str());
    match status {
        JobStatus::Completed => label.green(),
        JobStatus::Failed => label.red(),
        JobStatus::TimedOut => label.yellow(),
        JobStatus::Pending | JobStatus::Processing => label.cyan(),
    }
}

/// Folds a one-off status check into a remembered job and returns the
/// vendor's status. A job that already reached a terminal status here keeps
/// it, `timed_out` included; only links are filled in.
fn apply_check(job: &mut VideoJob, video: VideoResponse) -> JobStatus {
    let server_status = JobStatus::from_vendor(video.status.as_deref());
    if !job.status.is_terminal() {
        job.status = server_status;
        if server_status == JobStatus::Completed {
            job.progress = 100;
        }
    }
    job.download_url = video.download_url.or(job.download_url.take());
    job.hosted_url = video.hosted_url.or(job.hosted_url.take());
    server_status
}

fn placeholder(video_id: &str, status: JobStatus) -> VideoJob {
    VideoJob {
        video_id: video_id.to_string(),
        status,
        download_url: None,
        hosted_url: None,
        source: crate::core::jobs::JobSource::Script {
            text: String::new(),
        },
        replica_id: String::new(),
        persona_id: None,
        created_at: chrono::Utc::now(),
        progress: 0,
        estimated_completion: None,
        attempts: 0,
    }
}

pub(crate) async fn load_history(store: &LocalStore) -> Vec<VideoJob> {
    match store.get_json::<Vec<VideoJob>>(HISTORY_KEY).await {
        Ok(history) => history.unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Ignoring unreadable video history: {}", e);
            Vec::new()
        }
    }
}

async fn recall(store: &LocalStore, video_id: &str) -> Option<VideoJob> {
    load_history(store)
        .await
        .into_iter()
        .find(|j| j.video_id == video_id)
}

/// Upserts `job` into the history, newest first. Tracked jobs keep the
/// source details recorded at submission.
pub(crate) async fn remember(store: &LocalStore, job: &VideoJob) -> Result<()> {
    let mut history = load_history(store).await;
    let mut entry = job.clone();
    if let Some(pos) = history.iter().position(|j| j.video_id == job.video_id) {
        let previous = history.remove(pos);
        if entry.replica_id.is_empty() {
            entry.replica_id = previous.replica_id;
            entry.persona_id = previous.persona_id;
            entry.source = previous.source;
            entry.created_at = previous.created_at;
        }
    }
    history.insert(0, entry);
    history.truncate(HISTORY_LIMIT);
    store.put_json(HISTORY_KEY, &history).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jobs::JobSource;

    fn job(id: &str, replica: &str) -> VideoJob {
        let mut j = placeholder(id, JobStatus::Processing);
        j.replica_id = replica.to_string();
        if !replica.is_empty() {
            j.source = JobSource::Script {
                text: "hello".to_string(),
            };
        }
        j
    }

    #[tokio::test]
    async fn history_upserts_newest_first_and_keeps_source() {
        let store = LocalStore::in_memory().unwrap();
        remember(&store, &job("v1", "r1")).await.unwrap();
        remember(&store, &job("v2", "r2")).await.unwrap();

        let mut tracked = job("v1", "");
        tracked.status = JobStatus::Completed;
        tracked.progress = 100;
        remember(&store, &tracked).await.unwrap();

        let history = load_history(&store).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].video_id, "v1");
        assert_eq!(history[0].status, JobStatus::Completed);
        assert_eq!(history[0].replica_id, "r1");
        assert_eq!(history[0].source_label(), "hello");
        assert_eq!(history[1].video_id, "v2");
    }

    #[tokio::test]
    async fn history_is_capped() {
        let store = LocalStore::in_memory().unwrap();
        for i in 0..(HISTORY_LIMIT + 5) {
            remember(&store, &job(&format!("v{}", i), "r")).await.unwrap();
        }
        let history = load_history(&store).await;
        assert_eq!(history.len(), HISTORY_LIMIT);
        assert_eq!(history[0].video_id, format!("v{}", HISTORY_LIMIT + 4));
    }

    fn response(status: &str, hosted: Option<&str>) -> VideoResponse {
        VideoResponse {
            video_id: "v1".to_string(),
            status: Some(status.to_string()),
            download_url: None,
            hosted_url: hosted.map(str::to_string),
        }
    }

    #[test]
    fn status_check_updates_running_jobs() {
        let mut j = job("v1", "r1");
        let server = apply_check(&mut j, response("completed", Some("https://v/1")));
        assert_eq!(server, JobStatus::Completed);
        assert_eq!(j.status, JobStatus::Completed);
        assert_eq!(j.progress, 100);
        assert_eq!(j.hosted_url.as_deref(), Some("https://v/1"));
    }

    #[test]
    fn status_check_keeps_terminal_status() {
        let mut stalled = job("v1", "r1");
        stalled.status = JobStatus::TimedOut;
        stalled.progress = 40;
        let server = apply_check(&mut stalled, response("completed", Some("https://v/1")));
        assert_eq!(server, JobStatus::Completed);
        assert_eq!(stalled.status, JobStatus::TimedOut);
        assert_eq!(stalled.progress, 40);
        assert_eq!(stalled.hosted_url.as_deref(), Some("https://v/1"));

        let mut done = job("v2", "r1");
        done.status = JobStatus::Completed;
        done.hosted_url = Some("https://v/2".to_string());
        apply_check(&mut done, response("processing", None));
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.hosted_url.as_deref(), Some("https://v/2"));
    }
}
