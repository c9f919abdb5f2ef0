use std::fmt::Display;

use console::{style, StyledObject};

/// How a piece of terminal output should stand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Title,
    Muted,
    Pending,
    Done,
    Failed,
}

pub fn paint(text: impl Display, tone: Tone) -> StyledObject<String> {
    let styled = style(text.to_string());
    match tone {
        Tone::Title => styled.magenta().bold(),
        Tone::Muted => styled.dim(),
        Tone::Pending => styled.yellow(),
        Tone::Done => styled.green().bold(),
        Tone::Failed => styled.red().bold(),
    }
}

/// Tone for a test result processing status.
pub fn status_tone(status: &str) -> Tone {
    match status.to_ascii_lowercase().as_str() {
        "success" => Tone::Done,
        "failed" => Tone::Failed,
        "warning" => Tone::Pending,
        _ => Tone::Muted,
    }
}
