use anyhow::{Result, anyhow};
use console::style;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{AppContext, parse_command_args, sub_command};
use crate::core::connectors::{Connector, ConnectorRegistry, ConnectorStatus, spawn_auto_refresh};
use crate::core::oauth::BrowserHandshake;
use crate::core::terminal::{
    GLOBE, GuideSection, print_error, print_info, print_success, print_warn,
};
use crate::core::vendors::pica::{SUPPORTED_PLATFORMS, find_platform};

pub async fn run_accounts_command(args: &[String]) -> Result<()> {
    let parsed = parse_command_args(args, 3, &[]);
    if parsed.wants_help() {
        print_help();
        return Ok(());
    }

    match sub_command(args) {
        "" | "list" | "ls" => {
            let ctx = AppContext::load().await?;
            ctx.require_session()?;
            let mut registry = ctx.registry().await?;
            registry.load().await;
            print_accounts(&registry);
            Ok(())
        }
        "refresh" => {
            let ctx = AppContext::load().await?;
            ctx.require_session()?;
            let mut registry = ctx.registry().await?;
            registry.refresh().await;
            print_accounts(&registry);
            Ok(())
        }
        "connect" => {
            let ctx = AppContext::load().await?;
            ctx.require_session()?;
            let platform = match parsed.positional(0) {
                Some(p) => p.to_string(),
                None => {
                    let names: Vec<&str> = SUPPORTED_PLATFORMS.iter().map(|p| p.id).collect();
                    inquire::Select::new("Platform to connect:", names)
                        .prompt()?
                        .to_string()
                }
            };
            let mut registry = ctx.registry().await?;
            let mut driver = BrowserHandshake::start(&ctx.config.pica).await?;
            match registry.connect(&platform, &mut driver).await {
                Ok(Some(connector)) => print_success(&format!(
                    "Connected {}{}.",
                    display_name(&connector.platform),
                    connector
                        .username
                        .as_deref()
                        .map(|u| format!(" as {}", u))
                        .unwrap_or_default()
                )),
                Ok(None) => print_warn("Connection cancelled. Nothing was changed."),
                Err(e) => print_error(&e.to_string()),
            }
            Ok(())
        }
        "disconnect" => {
            let connector_id = parsed
                .positional(0)
                .ok_or_else(|| anyhow!("Usage: creatorflow accounts disconnect <account_id>"))?;
            let ctx = AppContext::load().await?;
            ctx.require_session()?;
            let mut registry = ctx.registry().await?;
            registry.disconnect(connector_id).await?;
            if let Some(warning) = registry.last_error() {
                print_warn(&format!(
                    "Removed locally, but the connector service reported: {}",
                    warning
                ));
            } else {
                print_success(&format!("Disconnected {}.", connector_id));
            }
            Ok(())
        }
        "watch" => run_watch().await,
        other => {
            print_error(&format!("Unknown accounts command: {}", other));
            print_help();
            Err(anyhow!("Expected one of: list, connect, disconnect, refresh, watch"))
        }
    }
}

/// Keeps refreshing in the background and reprints the list until Ctrl+C.
async fn run_watch() -> Result<()> {
    let ctx = AppContext::load().await?;
    ctx.require_session()?;
    let mut registry = ctx.registry().await?;
    registry.refresh().await;
    print_accounts(&registry);

    let interval = ctx.config.connectors.refresh_interval();
    let registry = Arc::new(Mutex::new(registry));
    let token = CancellationToken::new();
    let task = spawn_auto_refresh(registry.clone(), interval, token.clone());
    print_info(&format!(
        "Refreshing every {}s. Press Ctrl+C to stop.",
        interval.as_secs()
    ));

    let mut last: Vec<Connector> = registry.lock().await.accounts().to_vec();
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let registry = registry.lock().await;
                if registry.accounts() != last.as_slice() {
                    print_accounts(&registry);
                    last = registry.accounts().to_vec();
                }
            }
        }
    }
    token.cancel();
    let _ = task.await;
    Ok(())
}

fn display_name(platform: &str) -> String {
    find_platform(platform)
        .map(|p| p.name.to_string())
        .unwrap_or_else(|| platform.to_string())
}

fn print_accounts(registry: &ConnectorRegistry) {
    if let Some(error) = registry.last_error() {
        print_warn(&format!("{} (showing accounts saved on this machine)", error));
    }
    let accounts = registry.accounts();
    if accounts.is_empty() {
        print_info("No connected accounts. Link one with `creatorflow accounts connect <platform>`.");
        return;
    }
    println!("\n  {}{}\n", GLOBE, style("Connected accounts").bold());
    for account in accounts {
        let status = match account.status {
            ConnectorStatus::Active => style("active").green(),
            ConnectorStatus::Expired => style("expired").yellow(),
            ConnectorStatus::Error => style("error").red(),
        };
        println!(
            "  {:<12} {:<20} {:<8} {}",
            style(display_name(&account.platform)).bold(),
            account.username.as_deref().unwrap_or("-"),
            status,
            style(&account.id).dim()
        );
    }
    println!();
}

pub fn print_platforms() {
    let mut section = GuideSection::new("Supported platforms");
    for platform in SUPPORTED_PLATFORMS {
        section = section.command(platform.id, &format!(
            "{} ({})",
            platform.name,
            platform.features.join(", ")
        ));
    }
    section.print();
    println!();
}

fn print_help() {
    GuideSection::new("creatorflow accounts")
        .command("list", "Show linked accounts")
        .command("connect [platform]", "Link an account through the browser")
        .command("disconnect <id>", "Unlink an account")
        .command("refresh", "Reload and tidy the account list")
        .command("watch", "Keep refreshing until Ctrl+C")
        .print();
    println!();
}
