//! Tabular data profiling.
//!
//! Reads delimited text from the shared context (`csv_data` inline, or a
//! `file_path` to read), profiles its shape and column quality, and asks the
//! completion service for insights on top of the profile.

use crate::agent::{Agent, AgentSettings};
use crate::models::{record, AgentInput, AgentOutput, Visualization, VisualizationKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;

const INSTRUCTIONS: &str = r#"You are a data analysis specialist.
Study the data profile you are given and derive insights.

Rules:
- Point out data quality problems.
- Describe notable patterns.
- Give actionable recommendations.
- Suggest useful visualizations.

Output format:
## Data Analysis
### Overview
### Key Findings
### Recommendations
"#;

/// Columns with more missing cells than this share get a quality warning.
const MISSING_WARNING_PCT: f64 = 20.0;

/// Per-column profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub missing: usize,
    pub missing_pct: f64,
    pub unique: usize,
    pub numeric: bool,
}

/// Shape and quality summary of a table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableProfile {
    pub rows: usize,
    pub columns: Vec<ColumnProfile>,
    pub duplicate_rows: usize,
    pub warnings: Vec<String>,
}

impl TableProfile {
    /// Profile comma-separated text whose first record is the header.
    pub fn from_csv(text: &str) -> Option<Self> {
        let mut records = split_records(text).into_iter();
        let headers = records.next()?;
        let rows: Vec<Vec<String>> = records.collect();

        let columns = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let cells: Vec<&str> = rows
                    .iter()
                    .map(|row| row.get(idx).map(String::as_str).unwrap_or("").trim())
                    .collect();
                let present: Vec<&str> = cells.iter().copied().filter(|c| !c.is_empty()).collect();
                let missing = cells.len() - present.len();
                let unique = present.iter().collect::<HashSet<_>>().len();
                let numeric = !present.is_empty() && present.iter().all(|c| c.parse::<f64>().is_ok());

                ColumnProfile {
                    name: name.trim().to_string(),
                    missing,
                    missing_pct: percent(missing, cells.len()),
                    unique,
                    numeric,
                }
            })
            .collect::<Vec<_>>();

        let mut seen: HashSet<&Vec<String>> = HashSet::new();
        let duplicate_rows = rows.iter().filter(|row| !seen.insert(*row)).count();

        let mut warnings = Vec::new();
        if duplicate_rows > 0 {
            warnings.push(format!("{} duplicate rows found", duplicate_rows));
        }
        let sparse: Vec<&str> = columns
            .iter()
            .filter(|c| c.missing_pct > MISSING_WARNING_PCT)
            .map(|c| c.name.as_str())
            .collect();
        if !sparse.is_empty() {
            warnings.push(format!(
                "Columns with more than {}% missing values: {}",
                MISSING_WARNING_PCT,
                sparse.join(", ")
            ));
        }

        Some(Self {
            rows: rows.len(),
            columns,
            duplicate_rows,
            warnings,
        })
    }

    /// Plain markdown summary, used when no completion service is available.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("## Data Analysis\n\n### Overview\n\n");
        out.push_str("| Item | Value |\n|:---|:---|\n");
        out.push_str(&format!("| Rows | {} |\n", self.rows));
        out.push_str(&format!("| Columns | {} |\n", self.columns.len()));
        out.push_str(&format!(
            "| Columns with missing values | {} |\n\n",
            self.columns.iter().filter(|c| c.missing > 0).count()
        ));

        out.push_str("### Columns\n\n| Column | Numeric | Missing (%) | Unique |\n|:---|:---:|---:|---:|\n");
        for column in self.columns.iter().take(10) {
            out.push_str(&format!(
                "| {} | {} | {:.2}% | {} |\n",
                column.name,
                if column.numeric { "yes" } else { "no" },
                column.missing_pct,
                column.unique
            ));
        }

        if !self.warnings.is_empty() {
            out.push_str("\n### Data Quality Warnings\n\n");
            for warning in &self.warnings {
                out.push_str(&format!("- {}\n", warning));
            }
        }

        out
    }

    fn column_table(&self) -> Visualization {
        Visualization {
            kind: VisualizationKind::Table,
            title: "Column profile".to_string(),
            data: self
                .columns
                .iter()
                .map(|c| {
                    record([
                        ("column", json!(c.name)),
                        ("numeric", json!(c.numeric)),
                        ("missing_pct", json!(c.missing_pct)),
                        ("unique", json!(c.unique)),
                    ])
                })
                .collect(),
            insight: self.warnings.join("; "),
        }
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64 * 10_000.0).round() / 100.0
    }
}

/// Split comma-separated text into records.
///
/// Double-quoted fields may contain commas, escaped quotes (`""`) and line
/// breaks. Blank lines outside quotes produce no record.
fn split_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            '\r' if !quoted && chars.peek() == Some(&'\n') => {}
            '\n' if !quoted => {
                fields.push(std::mem::take(&mut current));
                push_record(&mut records, std::mem::take(&mut fields));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    push_record(&mut records, fields);
    records
}

fn push_record(records: &mut Vec<Vec<String>>, fields: Vec<String>) {
    let blank = fields.len() == 1 && fields[0].trim().is_empty();
    if !blank {
        records.push(fields);
    }
}

pub struct DataAnalystAgent {
    settings: AgentSettings,
}

impl DataAnalystAgent {
    pub fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }

    fn load_table(&self, input: &AgentInput) -> Result<Option<String>> {
        if let Some(inline) = input.context_str("csv_data") {
            return Ok(Some(inline.to_string()));
        }
        match input.context_str("file_path") {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read data file: {}", path))
                .map(Some),
            None => Ok(None),
        }
    }

    async fn analyze_table(&self, input: &AgentInput, text: &str) -> Result<AgentOutput> {
        let profile = TableProfile::from_csv(text).context("Data has no header row")?;
        let profile_json = serde_json::to_value(&profile)?;

        let result = if self.settings.llm.is_some() {
            let prompt = format!(
                "Analyze this data profile and provide insights:\n\n{}\n\nUser question: {}\n",
                serde_json::to_string_pretty(&profile_json)?,
                input.query
            );
            match self.settings.consult(self.instructions(), &prompt).await {
                Ok(text) => text,
                Err(degraded) => return Ok(degraded),
            }
        } else {
            profile.to_markdown()
        };

        Ok(AgentOutput::new(&self.settings.name, result)
            .with_confidence(0.85)
            .with_reasoning("Tabular data profiling complete")
            .with_metadata("rows", json!(profile.rows))
            .with_metadata("columns", json!(profile.columns.len()))
            .with_metadata("profile", profile_json)
            .with_visualization(profile.column_table()))
    }
}

#[async_trait]
impl Agent for DataAnalystAgent {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn instructions(&self) -> &str {
        INSTRUCTIONS
    }

    async fn execute(&self, input: &AgentInput) -> Result<AgentOutput> {
        match self.load_table(input) {
            Ok(Some(text)) => {
                return match self.analyze_table(input, &text).await {
                    Ok(output) => Ok(output),
                    Err(e) => Ok(AgentOutput::failed(&self.settings.name, format!("{:#}", e))),
                };
            }
            Ok(None) => {}
            Err(e) => return Ok(AgentOutput::failed(&self.settings.name, format!("{:#}", e))),
        }

        if self.settings.llm.is_none() {
            return Ok(AgentOutput::new(
                &self.settings.name,
                "Provide CSV data or ask a data-analysis question.",
            )
            .with_confidence(0.5)
            .with_reasoning("no data supplied"));
        }

        let prompt = format!(
            "Answer the following question from a data-analysis perspective:\n\n{}",
            input.query
        );
        let result = match self.settings.consult(self.instructions(), &prompt).await {
            Ok(text) => text,
            Err(degraded) => return Ok(degraded),
        };

        Ok(AgentOutput::new(&self.settings.name, result)
            .with_confidence(0.75)
            .with_reasoning("General data-analysis advice"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::specialists::testing::{settings, RecordingLlm};
    use crate::models::ConfigMap;
    use std::io::Write;

    const SAMPLE: &str = "region,revenue,note\nnorth,100,\"a, b\"\nsouth,,x\nnorth,100,\"a, b\"\n";

    #[test]
    fn test_split_records_handles_quotes() {
        assert_eq!(split_records("a,\"b, c\",d"), vec![vec!["a", "b, c", "d"]]);
        assert_eq!(split_records("\"say \"\"hi\"\"\""), vec![vec!["say \"hi\""]]);
        assert_eq!(split_records("a,b\r\n\r\nc,d\r\n"), vec![vec!["a", "b"], vec!["c", "d"]]);
        assert!(split_records("").is_empty());
    }

    #[test]
    fn test_quoted_field_spans_lines() {
        let profile = TableProfile::from_csv("id,note\n1,\"line one\nline two\"\n2,x\n").unwrap();
        assert_eq!(profile.rows, 2);
        assert_eq!(profile.columns[1].missing, 0);
        assert_eq!(profile.columns[1].unique, 2);
        assert!(profile.columns[0].numeric);
        assert!(profile.warnings.is_empty());

        let records = split_records("id,note\n1,\"line one\nline two\"\n");
        assert_eq!(records[1][1], "line one\nline two");
    }

    #[test]
    fn test_profile() {
        let profile = TableProfile::from_csv(SAMPLE).unwrap();
        assert_eq!(profile.rows, 3);
        assert_eq!(profile.columns.len(), 3);
        assert_eq!(profile.duplicate_rows, 1);

        let revenue = &profile.columns[1];
        assert!(revenue.numeric);
        assert_eq!(revenue.missing, 1);
        assert_eq!(revenue.missing_pct, 33.33);
        assert_eq!(revenue.unique, 1);
        assert!(!profile.columns[0].numeric);
        assert_eq!(profile.warnings.len(), 2);
    }

    #[test]
    fn test_profile_requires_header() {
        assert!(TableProfile::from_csv("\n\n").is_none());
    }

    #[tokio::test]
    async fn test_inline_data_without_service() {
        let agent = DataAnalystAgent::new(settings("data_analyst", None, ConfigMap::new()));
        let mut input = AgentInput::new("profile this");
        input.context.insert("csv_data".to_string(), json!(SAMPLE));

        let output = agent.execute(&input).await.unwrap();
        assert_eq!(output.confidence, 0.85);
        assert!(output.result.contains("| Rows | 3 |"));
        assert_eq!(output.metadata["rows"], json!(3));
        assert_eq!(output.visualizations[0].kind, VisualizationKind::Table);
    }

    #[tokio::test]
    async fn test_file_data_with_service() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let llm = RecordingLlm::replying("insights");
        let agent = DataAnalystAgent::new(settings("data_analyst", Some(llm.clone()), ConfigMap::new()));
        let mut input = AgentInput::new("what stands out");
        input.context.insert(
            "file_path".to_string(),
            json!(file.path().to_string_lossy()),
        );

        let output = agent.execute(&input).await.unwrap();
        assert_eq!(output.result, "insights");
        assert!(llm.last_user_prompt().contains("\"duplicate_rows\": 1"));
    }

    #[tokio::test]
    async fn test_missing_file_is_degraded() {
        let agent = DataAnalystAgent::new(settings("data_analyst", None, ConfigMap::new()));
        let mut input = AgentInput::new("q");
        input
            .context
            .insert("file_path".to_string(), json!("/nonexistent/data.csv"));

        let output = agent.execute(&input).await.unwrap();
        assert_eq!(output.confidence, 0.0);
        assert!(output.result.contains("Failed to read data file"));
    }

    #[tokio::test]
    async fn test_no_data_paths() {
        let agent = DataAnalystAgent::new(settings("data_analyst", None, ConfigMap::new()));
        let output = agent.execute(&AgentInput::new("q")).await.unwrap();
        assert_eq!(output.confidence, 0.5);

        let llm = RecordingLlm::replying("advice");
        let agent = DataAnalystAgent::new(settings("data_analyst", Some(llm), ConfigMap::new()));
        let output = agent.execute(&AgentInput::new("q")).await.unwrap();
        assert_eq!(output.confidence, 0.75);
        assert_eq!(output.result, "advice");
    }
}
