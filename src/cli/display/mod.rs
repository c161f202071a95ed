//! Display framework for CLI output formatting.
//!
//! Shared primitives for colors, tables and detail views used by every
//! command's output.

pub mod colors;
pub mod detail;
pub mod table;

use chrono::{DateTime, Utc};
use console::style;
use serde::Serialize;

pub use colors::{colorize_recommendation, colorize_status, label};
pub use detail::DetailView;
pub use table::{list_table, render_list};

/// Output that can be rendered for people or as JSON.
pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Print `result` in the mode the user asked for.
pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

pub fn action_success(message: &str) -> String {
    format!("{} {}", style("\u{2713}").green().bold(), message)
}

pub fn action_failure(message: &str) -> String {
    format!("{} {}", style("\u{2717}").red().bold(), message)
}

/// Truncate to `max_chars` characters, ending in "..." when cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// First 8 characters of an id for list display.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

pub fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

pub fn timestamp_opt(dt: Option<&DateTime<Utc>>) -> String {
    dt.map_or_else(|| "-".to_string(), timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("₹₹₹₹₹₹₹₹₹₹", 6), "₹₹₹...");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0f3c2a1b-aaaa"), "0f3c2a1b");
        assert_eq!(short_id("abc"), "abc");
    }
}
