//! Report generation
//!
//! Renders a finished analysis into a word-wrapped markdown file and returns
//! the file path as the artifact identifier.

use super::{field_has_content, names, Tool};
use crate::completion::DEFAULT_COMPLETION_MARKER;
use crate::error::OrchestrationError;
use crate::models::{DraftAnalysis, ToolInput, ToolOutput};
use crate::Result;
use chrono::Utc;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

const DEFAULT_LINE_WIDTH: usize = 90;

pub struct MarkdownReportTool {
    output_dir: PathBuf,
    completion_marker: String,
}

impl MarkdownReportTool {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            completion_marker: DEFAULT_COMPLETION_MARKER.to_string(),
        }
    }

    pub fn with_completion_marker(mut self, marker: impl Into<String>) -> Self {
        self.completion_marker = marker.into();
        self
    }
}

/// Greedy word wrap. Paragraph breaks are kept; a word longer than `width`
/// gets a line of its own.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
            } else if current.chars().count() + 1 + word.chars().count() <= width {
                current.push(' ');
                current.push_str(word);
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
            }
        }
        lines.push(current);
    }

    lines
}

fn sanitize_for_filename(symbol: &str) -> String {
    let cleaned: String = symbol
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '-' })
        .collect();

    if cleaned.trim_matches('-').is_empty() {
        "UNKNOWN".to_string()
    } else {
        cleaned
    }
}

pub fn render_report(draft: &DraftAnalysis, width: usize) -> String {
    let mut out = String::new();

    out.push_str("# DETAILED FINANCIAL ANALYSIS\n\n---\n\n");
    out.push_str(&format!("## COMPANY: {} ({})\n\n", draft.company_name, draft.symbol));

    out.push_str("## ANALYSIS SUMMARY\n\n");
    for line in wrap_text(&draft.analysis, width) {
        out.push_str(&line);
        out.push('\n');
    }

    out.push_str(&format!("\n## SCORE: {}/10\n\n", draft.score));

    out.push_str("## JUSTIFICATION\n\n");
    for line in wrap_text(&draft.justification, width) {
        out.push_str(&line);
        out.push('\n');
    }

    out.push_str("\n---\n\n");
    out.push_str(&format!(
        "_Report generated on {}_\n",
        Utc::now().format("%d/%m/%Y %H:%M:%S UTC")
    ));

    out
}

#[async_trait::async_trait]
impl Tool for MarkdownReportTool {
    fn name(&self) -> &str {
        names::GENERATE_REPORT
    }

    fn description(&self) -> &str {
        "Render the finished analysis into a report file"
    }

    fn has_content(&self, data: &Value) -> bool {
        field_has_content(data, "artifact")
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let draft = DraftAnalysis::from_value(&input.parameters)
            .map_err(OrchestrationError::InvalidToolInput)?;

        tokio::fs::create_dir_all(&self.output_dir).await?;

        let filename = format!(
            "financial_report_{}_{}_{}.md",
            sanitize_for_filename(&draft.symbol),
            Utc::now().format("%d-%m-%Y_%H-%M-%S"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let path = self.output_dir.join(&filename);

        tokio::fs::write(&path, render_report(&draft, DEFAULT_LINE_WIDTH)).await?;

        let artifact = path.to_string_lossy().to_string();
        info!(artifact = %artifact, symbol = %draft.symbol, "Report written");

        Ok(ToolOutput::new(json!({
            "artifact": artifact,
            "filename": filename,
        }))
        .with_message(format!("report written to {}; {}", filename, self.completion_marker)))
    }
}
