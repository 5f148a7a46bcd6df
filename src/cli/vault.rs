use anyhow::{Result, anyhow};

use super::{AppContext, parse_command_args, sub_command};
use crate::core::terminal::{GuideSection, print_info, print_success};
use crate::core::vault::vendor_key;
use crate::core::vendors::Vendor;

/// Accepts a vendor name (`tavus`) or its variable (`TAVUS_API_KEY`).
pub(crate) fn resolve_key_name(raw: &str) -> String {
    let lowered = raw.trim().to_ascii_lowercase();
    Vendor::all()
        .iter()
        .find(|v| v.name().eq_ignore_ascii_case(&lowered) || vendor_key(**v) == lowered)
        .map(|v| vendor_key(*v))
        .unwrap_or(lowered)
}

pub async fn run_vault_command(args: &[String]) -> Result<()> {
    let parsed = parse_command_args(args, 3, &[]);
    match sub_command(args) {
        "set" => {
            let name = parsed
                .positional(0)
                .ok_or_else(|| anyhow!("Usage: creatorflow vault set <name> [value]"))?;
            let key = resolve_key_name(name);
            let value = match parsed.positional(1) {
                Some(v) => v.to_string(),
                None => inquire::Password::new(&format!("Value for {}:", key))
                    .without_confirmation()
                    .prompt()?,
            };
            if value.trim().is_empty() {
                return Err(anyhow!("Refusing to store an empty value"));
            }
            let ctx = AppContext::load().await?;
            ctx.vault.set_secret(&key, value.trim()).await?;
            print_success(&format!("Stored {} in the vault.", key));
            Ok(())
        }
        "list" | "ls" => {
            let ctx = AppContext::load().await?;
            let keys = ctx.vault.list_keys().await?;
            if keys.is_empty() {
                print_info("The vault is empty.");
            }
            for key in keys {
                println!("  {}", key);
            }
            Ok(())
        }
        _ => {
            GuideSection::new("creatorflow vault")
                .command("set <name> [value]", "Encrypt and store a secret")
                .command("list", "Show stored secret names")
                .blank()
                .text("Names: tavus, pica, openai, elevenlabs (or any custom key)")
                .print();
            println!();
            if parsed.wants_help() {
                Ok(())
            } else {
                Err(anyhow!("Expected one of: set, list"))
            }
        }
    }
}
