mod accounts;
mod context;
mod conversation;
mod doctor;
mod post;
mod transcribe;
mod vault;
mod video;

pub(crate) use context::AppContext;

use anyhow::{Result, anyhow};
use console::style;

use crate::core::terminal::{self, GuideSection, print_error};
use crate::platform::{NativePlatform, Platform};

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Videos")
        .command("video create", "Render a replica video from a script or audio URL")
        .command("video status <id>", "Show (or --watch) a render's status")
        .command("video list", "List renders started from this machine")
        .command("conversation start", "Open a live conversation with a persona")
        .command("conversation end <id>", "End a live conversation")
        .print();

    GuideSection::new("Social")
        .command("accounts", "List, connect, disconnect, refresh or watch accounts")
        .command("platforms", "Show the platforms that can be connected")
        .command("post", "Publish content to connected platforms")
        .command("agent-post", "Let the posting agent decide what to publish")
        .command("system-prompt", "Print the posting agent's system prompt")
        .print();

    GuideSection::new("Speech")
        .command("transcribe <file>", "Transcribe an audio file")
        .command("languages", "List languages each engine supports")
        .print();

    GuideSection::new("Setup")
        .command("vault", "Store API keys in the encrypted vault")
        .command("doctor", "Check configuration and vendor access")
        .print();

    println!(
        "\n {} {} <command> [subcommand] [--help]\n",
        style("Usage:").bold(),
        style("creatorflow").green()
    );
}

/// Flags and positionals following a (sub)command. Flags listed in
/// `value_flags` consume the next argument; any other `-`-prefixed
/// argument is a switch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CommandArgs {
    pub positionals: Vec<String>,
    values: Vec<(String, String)>,
    switches: Vec<String>,
}

impl CommandArgs {
    /// Last value given for any of `names`.
    pub fn value(&self, names: &[&str]) -> Option<String> {
        self.values
            .iter()
            .rev()
            .find(|(flag, _)| names.contains(&flag.as_str()))
            .map(|(_, v)| v.clone())
    }

    /// Every value given for any of `names`, comma lists split out.
    pub fn values(&self, names: &[&str]) -> Vec<String> {
        self.values
            .iter()
            .filter(|(flag, _)| names.contains(&flag.as_str()))
            .flat_map(|(_, v)| v.split(','))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn switch(&self, names: &[&str]) -> bool {
        self.switches.iter().any(|s| names.contains(&s.as_str()))
    }

    pub fn positional(&self, index: usize) -> Option<&str> {
        self.positionals.get(index).map(String::as_str)
    }

    pub fn wants_help(&self) -> bool {
        self.switch(&["--help", "-h"])
    }
}

pub(crate) fn parse_command_args(args: &[String], start: usize, value_flags: &[&str]) -> CommandArgs {
    let mut parsed = CommandArgs::default();
    let mut i = start;
    while i < args.len() {
        let arg = args[i].as_str();
        if value_flags.contains(&arg) {
            if i + 1 < args.len() {
                parsed.values.push((arg.to_string(), args[i + 1].clone()));
                i += 2;
            } else {
                i += 1;
            }
        } else if arg.starts_with('-') && arg.len() > 1 {
            parsed.switches.push(arg.to_string());
            i += 1;
        } else {
            parsed.positionals.push(arg.to_string());
            i += 1;
        }
    }
    parsed
}

pub(crate) fn sub_command(args: &[String]) -> &str {
    if args.len() > 2 { args[2].as_str() } else { "" }
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let cmd = args[1].as_str();
    if matches!(cmd, "help" | "--help" | "-h") {
        print_help();
        return Ok(());
    }

    crate::logging::init(&NativePlatform::data_dir());
    tracing::debug!("creatorflow {} {:?}", env!("CARGO_PKG_VERSION"), &args[1..]);

    match cmd {
        "video" | "videos" => video::run_video_command(&args).await,
        "conversation" | "conv" => conversation::run_conversation_command(&args).await,
        "accounts" | "account" => accounts::run_accounts_command(&args).await,
        "platforms" => {
            accounts::print_platforms();
            Ok(())
        }
        "post" => post::run_post(&args).await,
        "agent-post" => post::run_agent_post(&args).await,
        "system-prompt" => post::run_system_prompt().await,
        "transcribe" => transcribe::run_transcribe(&args).await,
        "languages" => transcribe::run_languages(&args),
        "vault" => vault::run_vault_command(&args).await,
        "doctor" => doctor::run_doctor().await,
        "version" | "--version" | "-V" => {
            println!("creatorflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        _ => {
            print_error(&format!("Unknown command: {}", cmd));
            print_help();
            Err(anyhow!("Unknown command: {}", cmd))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_command_args_splits_values_switches_and_positionals() {
        let args = argv(&[
            "creatorflow",
            "video",
            "create",
            "--replica",
            "r1",
            "--no-wait",
            "--script",
            "hello there",
            "extra",
        ]);
        let parsed = parse_command_args(&args, 3, &["--replica", "--script"]);
        assert_eq!(parsed.value(&["--replica", "-r"]).as_deref(), Some("r1"));
        assert_eq!(parsed.value(&["--script"]).as_deref(), Some("hello there"));
        assert!(parsed.switch(&["--no-wait"]));
        assert_eq!(parsed.positional(0), Some("extra"));
        assert!(!parsed.wants_help());
    }

    #[test]
    fn repeated_and_comma_separated_values_collect() {
        let args = argv(&[
            "creatorflow",
            "post",
            "--platform",
            "instagram, tiktok",
            "-p",
            "youtube",
            "--platform",
        ]);
        let parsed = parse_command_args(&args, 2, &["--platform", "-p"]);
        assert_eq!(
            parsed.values(&["--platform", "-p"]),
            vec!["instagram", "tiktok", "youtube"]
        );
    }

    #[test]
    fn sub_command_defaults_to_empty() {
        assert_eq!(sub_command(&argv(&["creatorflow", "video"])), "");
        assert_eq!(sub_command(&argv(&["creatorflow", "video", "list"])), "list");
    }
}
