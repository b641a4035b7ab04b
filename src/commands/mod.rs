pub mod index;
pub mod ingest;
pub mod search;
pub mod toc;

use colored::{ColoredString, Colorize};

/// Char-aware truncation for terminal display.
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

pub(crate) fn colored_score(score: f32) -> ColoredString {
    let s = format!("{:.2}", score);
    if score >= 0.8 {
        s.green()
    } else if score >= 0.5 {
        s.yellow()
    } else {
        s.dimmed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_is_char_aware() {
        assert_eq!(truncate("전기기사 필기", 4), "전기기사...");
        assert_eq!(truncate("short", 10), "short");
    }
}
