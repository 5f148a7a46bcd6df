use anyhow::{Result, anyhow};

use super::{AppContext, parse_command_args, sub_command};
use crate::core::terminal::{GuideSection, print_error, print_link, print_status, print_success};
use crate::core::vendors::tavus::CreateConversationRequest;

const VALUE_FLAGS: &[&str] = &["--persona", "--replica", "-r", "--greeting", "--context"];

pub async fn run_conversation_command(args: &[String]) -> Result<()> {
    let parsed = parse_command_args(args, 3, VALUE_FLAGS);
    if parsed.wants_help() {
        print_help();
        return Ok(());
    }

    match sub_command(args) {
        "start" => {
            let ctx = AppContext::load().await?;
            let persona_id = parsed
                .value(&["--persona"])
                .or_else(|| ctx.config.tavus.default_persona_id.clone())
                .ok_or_else(|| {
                    anyhow!("--persona is required (or set [tavus] default_persona_id)")
                })?;
            let request = CreateConversationRequest {
                persona_id,
                replica_id: parsed
                    .value(&["--replica", "-r"])
                    .or_else(|| ctx.config.tavus.default_replica_id.clone()),
                custom_greeting: parsed.value(&["--greeting"]),
                conversational_context: parsed.value(&["--context"]),
            };
            let client = ctx.tavus().await?;
            match client.create_conversation(&request).await {
                Ok(conversation) => {
                    print_success("Conversation started.");
                    print_status("Conversation", &conversation.conversation_id);
                    print_link("Join", &conversation.conversation_url);
                }
                Err(e) => print_error(&format!("Failed to start conversation: {}", e.user_message())),
            }
            Ok(())
        }
        "end" => {
            let conversation_id = parsed
                .positional(0)
                .ok_or_else(|| anyhow!("Usage: creatorflow conversation end <conversation_id>"))?;
            let ctx = AppContext::load().await?;
            let client = ctx.tavus().await?;
            match client.end_conversation(conversation_id).await {
                Ok(()) => print_success(&format!("Conversation {} ended.", conversation_id)),
                Err(e) => print_error(&e.user_message()),
            }
            Ok(())
        }
        _ => {
            print_help();
            Err(anyhow!("Expected one of: start, end"))
        }
    }
}

fn print_help() {
    GuideSection::new("creatorflow conversation")
        .command("start", "Open a live video conversation")
        .command("end <id>", "End a conversation")
        .blank()
        .text("--persona <id>      Persona to talk to (required)")
        .text("--replica, -r <id>  Replica to appear as")
        .text("--greeting <text>   Custom opening line")
        .text("--context <text>    Background for the conversation")
        .print();
    println!();
}
