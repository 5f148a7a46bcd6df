use console::{Emoji, style};

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static FILM: Emoji<'_, '_> = Emoji("🎬 ", "");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_step(step: &str) {
    println!("{} {}", SPARKLE, style(step).bold());
}

pub fn print_link(label: &str, url: &str) {
    println!(
        "  {} {}: {}",
        GLOBE,
        style(label).bold(),
        style(url).underlined().cyan()
    );
}

/// Text progress bar, `width` cells wide.
pub fn progress_bar(progress: u8, width: usize) -> String {
    let filled = (progress.min(100) as usize * width) / 100;
    format!(
        "[{}{}] {:>3}%",
        "█".repeat(filled),
        "░".repeat(width - filled),
        progress.min(100)
    )
}

pub fn print_banner() {
    println!();
    println!(
        "{}{}",
        FILM,
        style("creatorflow").bold().magenta()
    );
    println!(
        "{}\n",
        style("AI video, conversations and social publishing from your terminal.").dim()
    );
}

enum GuideLine {
    Command(String, String),
    Status(String, String),
    Text(String),
    Hint(String, String),
    Blank,
}

/// A titled block of help text, built up line by line and printed at once.
pub struct GuideSection {
    title: String,
    lines: Vec<GuideLine>,
}

impl GuideSection {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn command(mut self, name: &str, description: &str) -> Self {
        self.lines
            .push(GuideLine::Command(name.to_string(), description.to_string()));
        self
    }

    pub fn status(mut self, label: &str, value: &str) -> Self {
        self.lines
            .push(GuideLine::Status(label.to_string(), value.to_string()));
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.lines.push(GuideLine::Text(text.to_string()));
        self
    }

    pub fn hint(mut self, command: &str, note: &str) -> Self {
        self.lines
            .push(GuideLine::Hint(command.to_string(), note.to_string()));
        self
    }

    pub fn blank(mut self) -> Self {
        self.lines.push(GuideLine::Blank);
        self
    }

    pub fn print(self) {
        let width = self
            .lines
            .iter()
            .filter_map(|l| match l {
                GuideLine::Command(name, _) => Some(name.chars().count()),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        println!("\n {}", style(&self.title).bold().underlined());
        for line in self.lines {
            match line {
                GuideLine::Command(name, description) => println!(
                    "   {}  {}",
                    style(format!("{:<width$}", name, width = width)).green(),
                    description
                ),
                GuideLine::Status(label, value) => {
                    println!("   {} {}", style(format!("{}:", label)).bold(), value)
                }
                GuideLine::Text(text) => println!("   {}", text),
                GuideLine::Hint(command, note) if note.is_empty() => {
                    println!("   $ {}", style(command).cyan())
                }
                GuideLine::Hint(command, note) => {
                    println!("   $ {}  {}", style(command).cyan(), style(note).dim())
                }
                GuideLine::Blank => println!(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(0, 10), "[░░░░░░░░░░]   0%");
        assert_eq!(progress_bar(50, 10), "[█████░░░░░]  50%");
        assert_eq!(progress_bar(100, 4), "[████] 100%");
        assert_eq!(progress_bar(250, 4), "[████] 100%");
    }
}
