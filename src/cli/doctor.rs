use anyhow::Result;

use super::AppContext;
use crate::core::config::CONFIG_FILE;
use crate::core::store::DB_FILE;
use crate::core::terminal::{print_error, print_info, print_step, print_success, print_warn};
use crate::core::transcribe::Engine;
use crate::core::vendors::Vendor;

/// Report on local setup and vendor credentials. Never fails on a vendor
/// problem; only local storage errors bubble up.
pub async fn run_doctor() -> Result<()> {
    print_step("Checking creatorflow setup...");
    println!();

    let ctx = AppContext::load().await?;
    print_success(&format!("Data directory: {}", ctx.data_dir.display()));
    print_success(&format!(
        "Local store: {}",
        ctx.data_dir.join(DB_FILE).display()
    ));
    if ctx.data_dir.join(CONFIG_FILE).exists() {
        print_success("config.toml loaded.");
    } else {
        print_info("No config.toml found; using defaults.");
    }

    match &ctx.session {
        Some(session) => print_success(&format!("Signed in as {}.", session.label())),
        None => print_warn("Not signed in. Account linking and posting are unavailable."),
    }

    println!();
    print_step("API keys");
    let mut missing = 0;
    for vendor in Vendor::all() {
        let from_env = std::env::var(vendor.key_env())
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false);
        match ctx.api_key(vendor).await? {
            Some(_) if from_env => print_success(&format!("{}: set via {}", vendor, vendor.key_env())),
            Some(_) => print_success(&format!("{}: stored in vault", vendor)),
            None => {
                missing += 1;
                print_warn(&format!("{}: not configured ({})", vendor, vendor.key_env()));
            }
        }
    }

    println!();
    print_step("Vendor access");
    for engine in [Engine::Whisper, Engine::ElevenLabs] {
        if ctx.api_key(engine.vendor()).await?.is_none() {
            continue;
        }
        let transcriber = ctx.transcriber(engine).await?;
        match transcriber.check_status().await {
            Ok(()) => print_success(&format!("{} is reachable.", engine.vendor())),
            Err(e) => print_error(&e.user_message()),
        }
    }
    if let (Some(session), Some(api)) = (&ctx.session, ctx.pica().await?) {
        match api.list_connectors(&session.user_id).await {
            Ok(accounts) => print_success(&format!(
                "Pica is reachable ({} linked accounts).",
                accounts.len()
            )),
            Err(e) => print_error(&e.user_message()),
        }
    }

    println!();
    if missing == 0 {
        print_success("Everything is configured.");
    } else {
        print_info(&format!(
            "{} vendor key(s) missing. Add them with `creatorflow vault set <vendor>`.",
            missing
        ));
    }
    Ok(())
}
