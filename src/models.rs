use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Role of a participant in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

/// Response from the AI model
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated text, absent when the model returned no content
    pub text: Option<String>,
    /// Metadata about the response (model, tokens used, etc.)
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ChatResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            metadata: HashMap::new(),
        }
    }

    /// Response text, or the empty string when absent
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

/// Value carried by a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(value) => Some(*value),
            MetricValue::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(value) => write!(f, "{}", value),
            MetricValue::Text(value) => write!(f, "{}", value),
        }
    }
}

/// Ordinal quality scale, worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rating {
    Unknown,
    Inconclusive,
    Unacceptable,
    Poor,
    Average,
    Good,
    Exceptional,
}

impl Rating {
    /// Ratings that always imply a failed interpretation
    pub fn is_failing(self) -> bool {
        matches!(
            self,
            Rating::Unknown | Rating::Inconclusive | Rating::Unacceptable
        )
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Qualitative judgment derived from a metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub rating: Rating,
    pub failed: bool,
    pub reason: Option<String>,
}

impl Interpretation {
    /// `failed` is forced on for failing ratings.
    pub fn new(rating: Rating, failed: bool, reason: impl Into<String>) -> Self {
        Self {
            rating,
            failed: failed || rating.is_failing(),
            reason: Some(reason.into()),
        }
    }

    pub fn passed(rating: Rating, reason: impl Into<String>) -> Self {
        Self::new(rating, false, reason)
    }

    pub fn failed(rating: Rating, reason: impl Into<String>) -> Self {
        Self::new(rating, true, reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Informational,
    Warning,
    Error,
}

/// Diagnostic message attached to a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn informational(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Informational,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

/// Named result of an evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: Option<MetricValue>,
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
    pub interpretation: Option<Interpretation>,
}

impl Metric {
    pub fn numeric(name: impl Into<String>, value: Option<f64>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.map(MetricValue::Number),
            reason: Some(reason.into()),
            diagnostics: Vec::new(),
            interpretation: None,
        }
    }

    pub fn text(name: impl Into<String>, value: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.map(MetricValue::Text),
            reason: Some(reason.into()),
            diagnostics: Vec::new(),
            interpretation: None,
        }
    }

    /// Metric with no value, interpreted as Unknown and failed
    pub fn unknown(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            name: name.into(),
            value: None,
            reason: Some(reason.clone()),
            diagnostics: Vec::new(),
            interpretation: Some(Interpretation::failed(Rating::Unknown, reason)),
        }
    }

    pub fn numeric_value(&self) -> Option<f64> {
        self.value.as_ref().and_then(MetricValue::as_number)
    }

    pub fn with_interpretation(mut self, interpretation: Interpretation) -> Self {
        self.interpretation = Some(interpretation);
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }
}

/// Metrics produced by one evaluator invocation, keyed by metric name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationResult {
    metrics: BTreeMap<String, Metric>,
}

impl EvaluationResult {
    pub fn new(metrics: impl IntoIterator<Item = Metric>) -> Self {
        let mut result = Self::default();
        for metric in metrics {
            result.insert(metric);
        }
        result
    }

    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.metrics.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.values()
    }

    pub(crate) fn insert(&mut self, metric: Metric) -> Option<Metric> {
        self.metrics.insert(metric.name.clone(), metric)
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Metric> {
        self.metrics.remove(name)
    }
}

impl IntoIterator for EvaluationResult {
    type Item = Metric;
    type IntoIter = std::collections::btree_map::IntoValues<String, Metric>;

    fn into_iter(self) -> Self::IntoIter {
        self.metrics.into_values()
    }
}

/// Named free-text context handed to evaluators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub name: String,
    pub content: String,
}

impl EvaluationContext {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Pass/fail verdict for a single metric against a scenario threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricVerdict {
    pub metric: String,
    pub value: Option<MetricValue>,
    pub reason: Option<String>,
    pub passed: bool,
}

/// Complete result for a single scenario run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    /// Scenario name
    pub scenario: String,
    /// Execution the scenario ran under
    pub execution: String,
    /// Names of the evaluators that scored the response
    pub evaluators: Vec<String>,
    /// Conversation sent to the model
    pub messages: Vec<ChatMessage>,
    /// Model's response
    pub response: ChatResponse,
    /// Metrics from every evaluator
    pub results: EvaluationResult,
    /// Gate verdict per metric
    pub verdicts: Vec<MetricVerdict>,
    /// True when every metric passed and the scenario ran to completion
    pub passed: bool,
    /// Infrastructure failure that stopped the scenario
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScenarioOutcome {
    /// Outcome for a scenario that could not be produced or evaluated
    pub fn errored(
        scenario: impl Into<String>,
        execution: impl Into<String>,
        messages: Vec<ChatMessage>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            scenario: scenario.into(),
            execution: execution.into(),
            evaluators: Vec::new(),
            messages,
            response: ChatResponse::default(),
            results: EvaluationResult::default(),
            verdicts: Vec::new(),
            passed: false,
            error: Some(error.into()),
        }
    }

    pub fn failed_verdicts(&self) -> impl Iterator<Item = &MetricVerdict> {
        self.verdicts.iter().filter(|v| !v.passed)
    }
}
