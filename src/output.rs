use crate::models::{Metric, ScenarioOutcome};
use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print scenario outcomes in the requested format
pub fn print_results(outcomes: &[ScenarioOutcome], format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", render_plain(outcomes)),
        OutputFormat::Json => print_json(outcomes),
    }
}

/// Render outcomes as plain text
fn render_plain(outcomes: &[ScenarioOutcome]) -> String {
    let mut out = String::new();

    for (i, outcome) in outcomes.iter().enumerate() {
        let status = match (&outcome.error, outcome.passed) {
            (Some(_), _) => "ERROR",
            (None, true) => "PASSED",
            (None, false) => "FAILED",
        };
        out.push_str(&format!("=== Scenario: {} [{}] ===\n", outcome.scenario, status));
        out.push_str(&format!("Execution: {}\n", outcome.execution));
        if let Some(error) = &outcome.error {
            out.push_str(&format!("Error: {}\n", error));
        }
        out.push_str(&format!("Response: {}\n\n", outcome.response.text()));

        if outcome.results.is_empty() && outcome.error.is_none() {
            out.push_str("No metrics produced.\n");
        }
        for metric in outcome.results.metrics() {
            render_metric(&mut out, metric);
            let passed = outcome
                .verdicts
                .iter()
                .find(|v| v.metric == metric.name)
                .is_some_and(|v| v.passed);
            out.push_str(&format!("\tGate: {}\n\n", if passed { "pass" } else { "fail" }));
        }

        if outcome.failed_verdicts().next().is_some() {
            out.push_str("Failed metrics:\n");
            for verdict in outcome.failed_verdicts() {
                let value = verdict
                    .value
                    .as_ref()
                    .map_or_else(|| "none".to_string(), |v| v.to_string());
                out.push_str(&format!(
                    "  - {} = {} ({})\n",
                    verdict.metric,
                    value,
                    verdict.reason.as_deref().unwrap_or("no reason")
                ));
            }
        }

        if i < outcomes.len() - 1 {
            out.push_str(&format!("{}\n\n", "=".repeat(50)));
        }
    }

    out
}

/// Render one metric: name, reason, value, interpretation and diagnostics
fn render_metric(out: &mut String, metric: &Metric) {
    out.push_str(&format!("\tEvaluation Name: {}\n", metric.name));
    out.push_str(&format!(
        "\tEvaluation Reason: {}\n",
        metric.reason.as_deref().unwrap_or("")
    ));
    match &metric.value {
        Some(value) => out.push_str(&format!("\tValue: {}\n", value)),
        None => out.push_str("\tValue: none\n"),
    }
    if let Some(interpretation) = &metric.interpretation {
        out.push_str(&format!(
            "\tRating: {} (failed: {}) {}\n",
            interpretation.rating,
            interpretation.failed,
            interpretation.reason.as_deref().unwrap_or("")
        ));
    }
    if !metric.diagnostics.is_empty() {
        let messages: Vec<&str> = metric.diagnostics.iter().map(|d| d.message.as_str()).collect();
        out.push_str(&format!("\tEvaluation Diagnostics: {}\n", messages.join(", ")));
    }
}

/// Render outcomes as a pretty JSON array
fn render_json(outcomes: &[ScenarioOutcome]) -> Result<String> {
    serde_json::to_string_pretty(outcomes).context("Failed to serialize results to JSON")
}

fn print_json(outcomes: &[ScenarioOutcome]) {
    match render_json(outcomes) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::error!("{:#}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ChatMessage, ChatResponse, Diagnostic, EvaluationResult, Interpretation, MetricVerdict,
        Rating,
    };
    use crate::runner::apply_gate;

    fn create_outcome(answer: &str, score: Option<f64>) -> ScenarioOutcome {
        let metric = match score {
            Some(score) => Metric::numeric("KeyWordSearch", Some(score), "keyword reason")
                .with_interpretation(Interpretation::passed(Rating::Good, "key word(s) found")),
            None => Metric::unknown("Coherence", "The judge reply could not be parsed.")
                .with_diagnostic(Diagnostic::error("No JSON found in reply")),
        };
        let results = EvaluationResult::new([metric]);
        let verdicts: Vec<MetricVerdict> = apply_gate(&results, 3.0);
        let passed = verdicts.iter().all(|v| v.passed);

        ScenarioOutcome {
            scenario: "SuperSportsBallEvaluation".to_string(),
            execution: "Execution-2025-01-01-00-00-00".to_string(),
            evaluators: vec!["KeyWordSearch".to_string()],
            messages: vec![ChatMessage::user("Who won the Super Sport Ball 2025?")],
            response: ChatResponse::from_text(answer),
            results,
            verdicts,
            passed,
            error: None,
        }
    }

    #[test]
    fn test_plain_output_passing_scenario() {
        let text = render_plain(&[create_outcome("The Super Sports Ball went to Munich.", Some(3.0))]);
        assert!(text.contains("=== Scenario: SuperSportsBallEvaluation [PASSED] ==="));
        assert!(text.contains("\tEvaluation Name: KeyWordSearch"));
        assert!(text.contains("\tValue: 3"));
        assert!(text.contains("\tRating: Good (failed: false) key word(s) found"));
        assert!(text.contains("\tGate: pass"));
        assert!(!text.contains("Failed metrics:"));
    }

    #[test]
    fn test_plain_output_lists_failed_metrics() {
        let text = render_plain(&[create_outcome("I don't know.", Some(0.0))]);
        assert!(text.contains("[FAILED]"));
        assert!(text.contains("Failed metrics:\n  - KeyWordSearch = 0 (keyword reason)"));
    }

    #[test]
    fn test_plain_output_shows_diagnostics() {
        let text = render_plain(&[create_outcome("???", None)]);
        assert!(text.contains("\tValue: none"));
        assert!(text.contains("\tEvaluation Diagnostics: No JSON found in reply"));
        assert!(text.contains("  - Coherence = none (The judge reply could not be parsed.)"));
    }

    #[test]
    fn test_plain_output_separates_scenarios() {
        let outcomes = vec![
            create_outcome("Super Sports Ball", Some(3.0)),
            create_outcome("Super Sports Ball", Some(3.0)),
        ];
        let text = render_plain(&outcomes);
        assert_eq!(text.matches(&"=".repeat(50)).count(), 1);
    }

    #[test]
    fn test_plain_output_empty() {
        assert_eq!(render_plain(&[]), "");
    }

    #[test]
    fn test_plain_output_shows_errored_scenario() {
        let outcomes = vec![
            create_outcome("Super Sports Ball", Some(3.0)),
            ScenarioOutcome::errored(
                "SingleEvaluator",
                "Execution-2025-01-01-00-00-00",
                Vec::new(),
                "Failed to evaluate response: judge 503",
            ),
        ];
        let text = render_plain(&outcomes);
        assert!(text.contains("=== Scenario: SuperSportsBallEvaluation [PASSED] ==="));
        assert!(text.contains("=== Scenario: SingleEvaluator [ERROR] ==="));
        assert!(text.contains("Error: Failed to evaluate response: judge 503"));
        assert!(!text.contains("No metrics produced."));
        assert!(!text.contains("Failed metrics:"));
    }

    #[test]
    fn test_json_output() {
        let outcomes = vec![
            create_outcome("Super Sports Ball", Some(3.0)),
            create_outcome("I don't know.", Some(0.0)),
        ];
        let rendered = render_json(&outcomes).unwrap();
        let json: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        let array = json.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["scenario"], "SuperSportsBallEvaluation");
        assert_eq!(array[0]["passed"], true);
        assert_eq!(array[0]["results"]["KeyWordSearch"]["value"], 3.0);
        assert_eq!(array[0]["verdicts"][0]["passed"], true);
        assert_eq!(array[1]["passed"], false);
        assert_eq!(array[1]["verdicts"][0]["value"], 0.0);
        assert!(array[0].get("error").is_none());
    }
}
