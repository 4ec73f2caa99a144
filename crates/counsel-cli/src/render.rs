//! Minimal writers for finished reports

use anyhow::{Context, Result};
use counsel_core::ReportDocument;
use std::path::Path;

/// Markdown rendering: title, match table, then the sections in order
pub fn to_markdown(document: &ReportDocument, title: &str) -> String {
    let mut out = format!("# {}\n\n", title);
    out.push_str(&format!(
        "_Generated {} · about {:.1} pages_\n\n",
        document.metadata.generated_at.format("%Y-%m-%d"),
        document.metadata.page_estimate
    ));

    if !document.matches.is_empty() {
        out.push_str("| Rank | School | Match |\n|---|---|---|\n");
        for result in &document.matches {
            out.push_str(&format!(
                "| {} | {} | {:.0}% |\n",
                result.rank, result.school.name, result.match_percentage
            ));
        }
        out.push('\n');
    }

    for (index, (heading, body)) in document.sections_for_render().into_iter().enumerate() {
        out.push_str(&format!("## {}. {}\n\n{}\n\n", index + 1, heading, body));
    }
    out
}

pub fn write_markdown(document: &ReportDocument, title: &str, path: &Path) -> Result<()> {
    std::fs::write(path, to_markdown(document, title))
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn write_json(document: &ReportDocument, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(document)?;
    std::fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
