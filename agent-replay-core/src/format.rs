//! Text helpers for deriving event labels.

use std::path::{Component, Path};

/// Maximum characters in an event summary, including the ellipsis.
pub const SUMMARY_MAX_CHARS: usize = 120;

/// Collapse whitespace and truncate to [`SUMMARY_MAX_CHARS`].
pub fn summarize(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, SUMMARY_MAX_CHARS)
}

/// First non-blank line of `text`, summarized.
pub fn first_line(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    summarize(line)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Shorten a file path for display.
///
/// Paths with more than three components become `…/parent/name`; shorter
/// ones keep their last two components.
pub fn short_path(path: &str) -> String {
    if path.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = Path::new(path)
        .components()
        .map(|c| match c {
            Component::RootDir => "/".to_string(),
            other => other.as_os_str().to_string_lossy().into_owned(),
        })
        .collect();

    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        n if n > 3 => format!("…/{}/{}", parts[n - 2], parts[n - 1]),
        n => {
            let parent = &parts[n - 2];
            if parent == "/" {
                format!("/{}", parts[n - 1])
            } else {
                format!("{}/{}", parent, parts[n - 1])
            }
        }
    }
}
