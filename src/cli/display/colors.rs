//! Status and recommendation coloring. `console` honours `NO_COLOR` and
//! non-tty output on its own.

use console::{style, StyledObject};

/// Color scheme:
/// - Green: reported, delivered
/// - Yellow: in-flight states
/// - Blue: pending, gate_passed, generated
/// - Red: error, delivery_failed
/// - Dim: filtered_out, analyzed
pub fn colorize_status(status: &str) -> StyledObject<&str> {
    match status {
        "reported" | "delivered" => style(status).green().bold(),
        "analyzing" | "assessing" | "analyzed" | "assessed" => style(status).yellow(),
        "pending" | "gate_passed" | "generated" => style(status).blue(),
        "error" | "delivery_failed" => style(status).red().bold(),
        "filtered_out" => style(status).dim(),
        _ => style(status),
    }
}

pub fn colorize_recommendation(recommendation: &str) -> StyledObject<&str> {
    match recommendation.to_lowercase().as_str() {
        "buy" => style(recommendation).green().bold(),
        "sell" => style(recommendation).red().bold(),
        "hold" => style(recommendation).yellow(),
        _ => style(recommendation).dim(),
    }
}

/// Styled label for detail views.
pub fn label(name: &str) -> String {
    format!("{}{}", style(name).bold(), style(":").dim())
}
