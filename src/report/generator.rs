//! Markdown and JSON rendering of a finished run.
//!
//! The synthesized report is embedded as-is; this module adds metadata,
//! the execution trace, charts and sources around it.

use crate::coordinator::RunResult;
use crate::models::{ConfidenceLevel, ExecutionTrace, Record, Visualization};
use crate::synthesis::aggregator::total_duration_ms;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

/// Facts about the run that the coordinator does not know.
#[derive(Debug, Clone, Serialize)]
pub struct ReportMetadata {
    pub model_used: String,
    pub generated_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Sections to include in the markdown report.
#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub include_traces: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            include_traces: true,
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(
    result: &RunResult,
    metadata: &ReportMetadata,
    options: &ReportOptions,
) -> String {
    let mut output = String::new();

    output.push_str("# Councilor Report\n\n");
    output.push_str(&generate_metadata_section(result, metadata));
    output.push_str(&generate_summary_section(result));
    output.push_str(&result.report);
    if !result.report.ends_with('\n') {
        output.push('\n');
    }
    output.push('\n');

    if options.include_traces {
        output.push_str(&generate_trace_section(&result.traces));
    }
    output.push_str(&generate_visualization_section(result));
    output.push_str(&generate_sources_section(&result.sources));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(result: &RunResult, metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Session:** `{}`\n", result.session_id));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Model Used:** `{}`\n", metadata.model_used));
    section.push_str(&format!("- **Agents Run:** {}\n", result.agent_count));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n\n",
        metadata.duration_seconds
    ));

    section
}

fn generate_summary_section(result: &RunResult) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!(
        "**Overall confidence:** {:.0}% {}\n\n",
        result.confidence * 100.0,
        ConfidenceLevel::from_confidence(result.confidence).emoji()
    ));

    if !result.execution_order.is_empty() {
        section.push_str(&format!(
            "**Execution order:** {}\n\n",
            result.execution_order.join(" → ")
        ));
    }
    if !result.selection_reason.is_empty() {
        section.push_str(&format!("*{}*\n\n", result.selection_reason));
    }

    if result.levels.total() > 0 {
        section.push_str(&format!(
            "| {} Pass | {} Warn | {} Fail | **Total** |\n",
            ConfidenceLevel::Pass.emoji(),
            ConfidenceLevel::Warn.emoji(),
            ConfidenceLevel::Fail.emoji(),
        ));
        section.push_str("|:---:|:---:|:---:|:---:|\n");
        section.push_str(&format!(
            "| {} | {} | {} | **{}** |\n\n",
            result.levels.pass,
            result.levels.warn,
            result.levels.fail,
            result.levels.total()
        ));
    }

    section
}

fn generate_trace_section(traces: &[ExecutionTrace]) -> String {
    if traces.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Execution Trace\n\n");
    section.push_str("| # | Agent | Started | Duration | Confidence |\n");
    section.push_str("|:---:|:---|:---|---:|---:|\n");

    for (i, trace) in traces.iter().enumerate() {
        section.push_str(&format!(
            "| {} | {} | {} | {}ms | {:.0}% |\n",
            i + 1,
            trace.agent_name,
            trace.timestamp.format("%H:%M:%S"),
            trace.duration_ms,
            trace.confidence * 100.0
        ));
    }
    section.push('\n');

    section
}

fn generate_visualization_section(result: &RunResult) -> String {
    let charts: Vec<(&str, &Visualization)> = result
        .agent_results
        .iter()
        .flat_map(|o| o.visualizations.iter().map(move |v| (o.agent_name.as_str(), v)))
        .collect();

    if charts.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Charts\n\n");
    for (agent, chart) in charts {
        section.push_str(&generate_chart_block(agent, chart));
    }

    section
}

/// A chart rendered as a table; the kind is kept as a tag for richer frontends.
fn generate_chart_block(agent: &str, chart: &Visualization) -> String {
    let mut block = String::new();

    block.push_str(&format!("### {} ({}, from {})\n\n", chart.title, chart.kind, agent));

    if !chart.data.is_empty() {
        // Rows may carry different keys; columns are their union in first-seen order.
        let mut columns: Vec<&String> = Vec::new();
        for key in chart.data.iter().flat_map(|row| row.keys()) {
            if !columns.contains(&key) {
                columns.push(key);
            }
        }
        block.push_str(&format!(
            "| {} |\n",
            columns.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(" | ")
        ));
        block.push_str(&format!("|{}\n", "---|".repeat(columns.len())));

        for row in &chart.data {
            let cells: Vec<String> = columns
                .iter()
                .map(|c| row.get(c.as_str()).map(cell_text).unwrap_or_default())
                .collect();
            block.push_str(&format!("| {} |\n", cells.join(" | ")));
        }
        block.push('\n');
    }

    if !chart.insight.is_empty() {
        block.push_str(&format!("> 💡 {}\n\n", chart.insight));
    }

    block
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn generate_sources_section(sources: &[Record]) -> String {
    if sources.is_empty() {
        return String::new();
    }

    let mut section = String::new();
    section.push_str("## Sources\n\n");

    for (i, source) in sources.iter().enumerate() {
        let fields: Vec<String> = source
            .iter()
            .map(|(k, v)| format!("{}: {}", k, cell_text(v)))
            .collect();
        section.push_str(&format!("{}. {}\n", i + 1, fields.join(", ")));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by Councilor*\n".to_string()
}

/// JSON form of a run, including per-agent outputs.
pub fn generate_json_report(result: &RunResult, metadata: &ReportMetadata) -> Result<String> {
    #[derive(Serialize)]
    struct JsonReport<'a> {
        metadata: &'a ReportMetadata,
        agent_time_ms: u64,
        #[serde(flatten)]
        result: &'a RunResult,
    }

    let report = JsonReport {
        metadata,
        agent_time_ms: total_duration_ms(&result.agent_results),
        result,
    };
    serde_json::to_string_pretty(&report).map_err(Into::into)
}

/// Write rendered report text to `path`.
pub fn write_report(content: &str, path: &Path) -> Result<()> {
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{record, AgentOutput, VisualizationKind};
    use crate::synthesis::LevelSummary;
    use serde_json::json;

    fn create_test_result() -> RunResult {
        let law = AgentOutput::new("law_expert", "Article 12 applies.")
            .with_confidence(0.85)
            .with_source(record([("type", json!("law_analysis")), ("query", json!("q"))]));
        let calc = AgentOutput::new("calculator", "Corporate saves 3M.")
            .with_confidence(0.9)
            .with_visualization(Visualization {
                kind: VisualizationKind::Compare,
                title: "Corporate vs sole proprietor".to_string(),
                data: vec![
                    record([("option", json!("corporate")), ("tax", json!(1000))]),
                    record([("option", json!("sole")), ("tax", json!(1300))]),
                ],
                insight: "Corporate is cheaper".to_string(),
            });
        let traces = vec![ExecutionTrace::from(&law), ExecutionTrace::from(&calc)];

        RunResult {
            query: "법인 전환시 세금 비교".to_string(),
            session_id: "session-1".to_string(),
            report: "## 📊 Combined Analysis Report\n\nbody\n".to_string(),
            confidence: 0.875,
            agent_count: 2,
            sources: law.sources.clone(),
            agent_results: vec![law, calc],
            execution_order: vec!["law_expert".to_string(), "calculator".to_string()],
            selection_reason: "Keyword match: law_expert, calculator".to_string(),
            traces,
            levels: LevelSummary {
                pass: 2,
                warn: 0,
                fail: 0,
            },
        }
    }

    fn create_metadata() -> ReportMetadata {
        ReportMetadata {
            model_used: "test-model".to_string(),
            generated_at: Utc::now(),
            duration_seconds: 4.2,
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let markdown = generate_markdown_report(
            &create_test_result(),
            &create_metadata(),
            &ReportOptions::default(),
        );

        assert!(markdown.contains("# Councilor Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("`session-1`"));
        assert!(markdown.contains("`test-model`"));
        assert!(markdown.contains("law_expert → calculator"));
        assert!(markdown.contains("## 📊 Combined Analysis Report"));
        assert!(markdown.contains("## Execution Trace"));
        assert!(markdown.contains("## Sources"));
        assert!(markdown.contains("type: law_analysis"));
    }

    #[test]
    fn test_traces_can_be_omitted() {
        let options = ReportOptions {
            include_traces: false,
        };
        let markdown = generate_markdown_report(&create_test_result(), &create_metadata(), &options);
        assert!(!markdown.contains("## Execution Trace"));
    }

    #[test]
    fn test_chart_block_renders_table() {
        let result = create_test_result();
        let chart = &result.agent_results[1].visualizations[0];
        let block = generate_chart_block("calculator", chart);

        assert!(block.contains("### Corporate vs sole proprietor (compare, from calculator)"));
        assert!(block.contains("| option | tax |"));
        assert!(block.contains("| sole | 1300 |"));
        assert!(block.contains("Corporate is cheaper"));
    }

    #[test]
    fn test_chart_columns_cover_every_row() {
        let chart = Visualization {
            kind: VisualizationKind::Compare,
            title: "Tax burden comparison".to_string(),
            data: vec![
                record([("name", json!("Sole")), ("income_tax", json!(3500)), ("total", json!(4100))]),
                record([
                    ("name", json!("Corporation")),
                    ("corporate_tax", json!(1200)),
                    ("total", json!(3500)),
                ]),
            ],
            insight: String::new(),
        };
        let block = generate_chart_block("calculator", &chart);

        assert!(block.contains("| income_tax | name | total | corporate_tax |"));
        assert!(block.contains("|---|---|---|---|\n"));
        assert!(block.contains("| 3500 | Sole | 4100 |  |"));
        assert!(block.contains("|  | Corporation | 3500 | 1200 |"));
    }

    #[test]
    fn test_empty_run_has_no_optional_sections() {
        let result = RunResult {
            query: "q".to_string(),
            session_id: "s".to_string(),
            report: "No analysis results.".to_string(),
            confidence: 0.0,
            agent_count: 0,
            agent_results: Vec::new(),
            execution_order: Vec::new(),
            selection_reason: String::new(),
            sources: Vec::new(),
            traces: Vec::new(),
            levels: LevelSummary::default(),
        };
        let markdown = generate_markdown_report(&result, &create_metadata(), &ReportOptions::default());

        assert!(markdown.contains("No analysis results."));
        assert!(!markdown.contains("## Charts"));
        assert!(!markdown.contains("## Sources"));
        assert!(!markdown.contains("| ✅ Pass"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_result(), &create_metadata()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["session_id"], json!("session-1"));
        assert_eq!(value["metadata"]["model_used"], json!("test-model"));
        assert_eq!(value["agent_results"][1]["visualizations"][0]["type"], json!("compare"));
        assert_eq!(value["execution_order"][0], json!("law_expert"));
    }

    #[test]
    fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        write_report("# hi\n", &path).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# hi\n");
    }
}
