use anyhow::{Result, anyhow};
use console::style;
use std::path::Path;

use super::{AppContext, parse_command_args};
use crate::core::terminal::{GuideSection, print_error, print_info, print_status, print_warn};
use crate::core::transcribe::{self, AudioClip, Engine, Speaker};

pub async fn run_transcribe(args: &[String]) -> Result<()> {
    let parsed = parse_command_args(
        args,
        2,
        &["--engine", "-e", "--speaker", "--language", "-l", "--prompt"],
    );
    if parsed.wants_help() {
        GuideSection::new("creatorflow transcribe <file>")
            .text("--engine, -e <name>     whisper (default) or elevenlabs")
            .text("--language, -l <code>   Spoken language, e.g. en")
            .text("--speaker <who>         user (default) or ai")
            .text("--prompt <text>         Vocabulary hint (whisper)")
            .text("--json                  Print the transcript as JSON")
            .print();
        println!();
        return Ok(());
    }

    let path = parsed
        .positional(0)
        .ok_or_else(|| anyhow!("Usage: creatorflow transcribe <audio-file>"))?;
    let speaker = match parsed.value(&["--speaker"]) {
        Some(raw) => Speaker::parse(&raw).ok_or_else(|| anyhow!("--speaker must be user or ai"))?,
        None => Speaker::User,
    };

    let mut ctx = AppContext::load().await?;
    let engine = ctx.engine(parsed.value(&["--engine", "-e"]).as_deref())?;
    if let Some(language) = parsed.value(&["--language", "-l"]) {
        if !engine.supports_language(&language) {
            print_warn(&format!("{} does not list '{}' as supported.", engine, language));
        }
        ctx.config.transcription.language = language;
    }
    if let Some(prompt) = parsed.value(&["--prompt"]) {
        ctx.config.transcription.prompt = Some(prompt);
    }

    let clip = match AudioClip::from_path(Path::new(path)).await {
        Ok(clip) => clip,
        Err(e) => {
            print_error(&e.user_message());
            return Ok(());
        }
    };
    let transcriber = ctx.transcriber(engine).await?;

    match transcriber.transcribe(&clip, speaker).await {
        Ok(Some(transcript)) => {
            if parsed.switch(&["--json"]) {
                println!("{}", serde_json::to_string_pretty(&transcript)?);
            } else {
                println!("{}", transcript.text);
                if let Some(language) = &transcript.language {
                    print_status("Language", language);
                }
                if let Some(duration) = transcript.duration {
                    print_status(
                        "Estimated cost",
                        &format!("${:.4}", engine.estimate_cost(duration / 60.0)),
                    );
                }
            }
        }
        Ok(None) => print_info("No speech detected."),
        Err(e) => print_error(&e.user_message()),
    }
    Ok(())
}

pub fn run_languages(args: &[String]) -> Result<()> {
    let parsed = parse_command_args(args, 2, &["--engine", "-e"]);
    let engines = match parsed.value(&["--engine", "-e"]) {
        Some(name) => vec![
            Engine::parse(&name).ok_or_else(|| anyhow!("Unknown engine '{}'", name))?,
        ],
        None => vec![Engine::Whisper, Engine::ElevenLabs],
    };
    for engine in engines {
        let mut section = GuideSection::new(&format!(
            "{} (${}/min, up to {}MB)",
            engine,
            engine.cost_per_minute(),
            engine.vendor().max_upload_mb()
        ));
        for (code, name) in engine.languages() {
            section = section.command(code, name);
        }
        if engine == Engine::ElevenLabs {
            section = section.blank();
            for (model, description) in transcribe::ELEVENLABS_MODELS {
                section = section.status(&format!("model {}", model), description);
            }
        }
        section.print();
    }
    println!("\n  {}\n", style("Pick one with --language <code>.").dim());
    Ok(())
}
