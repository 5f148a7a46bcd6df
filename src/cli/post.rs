use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use console::style;

use super::{AppContext, parse_command_args};
use crate::core::publish::{Draft, Publisher};
use crate::core::terminal::{GuideSection, print_error, print_success, print_warn};
use crate::core::vendors::Vendor;
use crate::core::vendors::VendorError;
use crate::core::vendors::pica::{ContentType, PostResult};

async fn publisher(ctx: &AppContext) -> Result<Publisher> {
    let session = ctx.require_session()?;
    let api = ctx
        .pica()
        .await?
        .ok_or_else(|| anyhow!(VendorError::NotConfigured(Vendor::Pica).user_message()))?;
    Ok(Publisher::new(session, api))
}

pub(crate) fn parse_schedule(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| anyhow!("--schedule expects an RFC 3339 time, e.g. 2026-05-01T09:00:00Z"))
}

pub(crate) fn parse_content_type(raw: &str) -> Result<ContentType> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "text" => Ok(ContentType::Text),
        "image" => Ok(ContentType::Image),
        "video" => Ok(ContentType::Video),
        other => Err(anyhow!("Unknown content type '{}'. Use text, image or video.", other)),
    }
}

pub async fn run_post(args: &[String]) -> Result<()> {
    let parsed = parse_command_args(
        args,
        2,
        &["--content", "-c", "--platform", "-p", "--media-url", "--schedule"],
    );
    if parsed.wants_help() {
        GuideSection::new("creatorflow post")
            .text("--content, -c <text>     What to publish")
            .text("--platform, -p <id>      Target platform (repeat or comma-separate)")
            .text("--media-url <url>        Image or video to attach")
            .text("--schedule <rfc3339>     Publish later instead of now")
            .blank()
            .hint("creatorflow post -c \"New video is live\" -p instagram,youtube", "")
            .print();
        println!();
        return Ok(());
    }

    let content = parsed
        .value(&["--content", "-c"])
        .or_else(|| parsed.positional(0).map(str::to_string))
        .ok_or_else(|| anyhow!("--content is required"))?;
    let platforms = parsed.values(&["--platform", "-p"]);
    if platforms.is_empty() {
        return Err(anyhow!("At least one --platform is required"));
    }
    let schedule_time = parsed
        .value(&["--schedule"])
        .map(|raw| parse_schedule(&raw))
        .transpose()?;

    let ctx = AppContext::load().await?;
    let publisher = publisher(&ctx).await?;

    let mut registry = ctx.registry().await?;
    registry.load().await;
    for platform in &platforms {
        if !registry.is_connected(platform) {
            print_warn(&format!("{} is not connected; the post may be rejected.", platform));
        }
    }

    let draft = Draft {
        content,
        platforms,
        media_url: parsed.value(&["--media-url"]),
        schedule_time,
    };
    match publisher.post(draft).await {
        Ok(results) => print_results(&results),
        Err(e) => print_error(&format!("Failed to post: {}", e)),
    }
    Ok(())
}

pub async fn run_agent_post(args: &[String]) -> Result<()> {
    let parsed = parse_command_args(args, 2, &["--prompt", "-p", "--media-url", "--type"]);
    if parsed.wants_help() {
        GuideSection::new("creatorflow agent-post")
            .text("--prompt, -p <text>   Instructions for the posting agent")
            .text("--media-url <url>     Media the agent may use")
            .text("--type <kind>         text, image or video")
            .print();
        println!();
        return Ok(());
    }
    let prompt = parsed
        .value(&["--prompt", "-p"])
        .or_else(|| parsed.positional(0).map(str::to_string))
        .ok_or_else(|| anyhow!("--prompt is required"))?;
    let content_type = parsed
        .value(&["--type"])
        .map(|raw| parse_content_type(&raw))
        .transpose()?;

    let ctx = AppContext::load().await?;
    let publisher = publisher(&ctx).await?;
    match publisher
        .post_with_agent(&prompt, parsed.value(&["--media-url"]), content_type)
        .await
    {
        Ok(results) => print_results(&results),
        Err(e) => print_error(&format!("Agent post failed: {}", e)),
    }
    Ok(())
}

pub async fn run_system_prompt() -> Result<()> {
    let ctx = AppContext::load().await?;
    let publisher = publisher(&ctx).await?;
    match publisher.system_prompt().await {
        Ok(prompt) => println!("{}", prompt),
        Err(e) => print_error(&e.to_string()),
    }
    Ok(())
}

fn print_results(results: &[PostResult]) {
    if results.is_empty() {
        print_warn("The connector service returned no results.");
        return;
    }
    for result in results {
        if result.success {
            let when = result
                .scheduled_for
                .map(|t| format!(" (scheduled for {})", t.to_rfc3339()))
                .unwrap_or_default();
            print_success(&format!(
                "{}: {}{}",
                result.platform,
                style(&result.post_id).dim(),
                when
            ));
        } else {
            print_error(&format!(
                "{}: {}",
                result.platform,
                result.error.as_deref().unwrap_or("failed")
            ));
        }
    }
}
