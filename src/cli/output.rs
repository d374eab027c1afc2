//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

use crate::domain::models::{ConvergenceStatus, IssueStatus};

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value;
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum length, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Table with the house style: UTF-8 borders, bold header, dynamic width.
pub fn table<I, S>(headers: I) -> Table
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .into_iter()
                .map(|h| Cell::new(h.into()).add_attribute(Attribute::Bold)),
        );
    table
}

pub fn status_cell(status: ConvergenceStatus) -> Cell {
    let color = match status {
        ConvergenceStatus::Converged => Color::Green,
        ConvergenceStatus::Running => Color::Cyan,
        ConvergenceStatus::Timeout => Color::Yellow,
        ConvergenceStatus::Aborted => Color::Red,
    };
    Cell::new(status.to_string()).fg(color)
}

pub fn issue_status_cell(status: IssueStatus) -> Cell {
    let (label, color) = match status {
        IssueStatus::Open => ("open", Color::Red),
        IssueStatus::Fixed => ("fixed", Color::Green),
        IssueStatus::Abandoned => ("abandoned", Color::Yellow),
    };
    Cell::new(label).fg(color)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a much longer description", 10), "a much ...");
        assert_eq!(truncate("requirements→deliverables", 15), "requirements...");
    }

    #[test]
    fn test_table_renders_header() {
        let mut t = table(["Pass", "Methodology"]);
        t.add_row(vec!["1", "security"]);
        let rendered = t.to_string();
        assert!(rendered.contains("Methodology"));
        assert!(rendered.contains("security"));
    }
}
