//! The evaluator contract and evaluator composition.
//!
//! An [`Evaluator`] scores a conversation and the model's response, producing
//! exactly one [`Metric`] per name it declares in [`Evaluator::metric_names`].
//! Bad input never makes an evaluator fail: it reports an `Unknown` metric
//! instead. Only infrastructure failures (for example an unreachable judge
//! model) are returned as [`EvaluationError`].

use crate::client::ChatClient;
use crate::models::{
    ChatMessage, ChatResponse, Diagnostic, EvaluationContext, EvaluationResult, Metric,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Errors from evaluators.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("evaluator '{evaluator}' needs a chat configuration for its judge model")]
    MissingChatConfiguration { evaluator: String },

    #[error("metric name '{0}' is declared by more than one evaluator")]
    DuplicateMetricName(String),

    #[error(transparent)]
    Judge(#[from] anyhow::Error),
}

/// Judge model handed to LLM-backed evaluators
#[derive(Clone)]
pub struct ChatConfiguration {
    pub client: Arc<dyn ChatClient>,
}

impl ChatConfiguration {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Human-readable evaluator name
    fn name(&self) -> &str;

    /// Names of the metrics this evaluator always returns
    fn metric_names(&self) -> &[String];

    async fn evaluate(
        &self,
        messages: &[ChatMessage],
        response: &ChatResponse,
        context: &[EvaluationContext],
        config: Option<&ChatConfiguration>,
    ) -> Result<EvaluationResult, EvaluationError>;
}

/// Runs several evaluators over the same input and merges their metrics.
///
/// Metric names must be disjoint across members; construction fails otherwise.
pub struct CompositeEvaluator {
    evaluators: Vec<Box<dyn Evaluator>>,
    metric_names: Vec<String>,
}

impl CompositeEvaluator {
    pub fn new(evaluators: Vec<Box<dyn Evaluator>>) -> Result<Self, EvaluationError> {
        let mut seen = HashSet::new();
        let mut metric_names = Vec::new();

        for evaluator in &evaluators {
            for name in evaluator.metric_names() {
                if !seen.insert(name.clone()) {
                    return Err(EvaluationError::DuplicateMetricName(name.clone()));
                }
                metric_names.push(name.clone());
            }
        }

        Ok(Self {
            evaluators,
            metric_names,
        })
    }

    /// Names of the member evaluators, in order
    pub fn evaluator_names(&self) -> Vec<String> {
        self.evaluators.iter().map(|e| e.name().to_string()).collect()
    }
}

#[async_trait]
impl Evaluator for CompositeEvaluator {
    fn name(&self) -> &str {
        "Composite"
    }

    fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    async fn evaluate(
        &self,
        messages: &[ChatMessage],
        response: &ChatResponse,
        context: &[EvaluationContext],
        config: Option<&ChatConfiguration>,
    ) -> Result<EvaluationResult, EvaluationError> {
        let mut merged = EvaluationResult::default();

        for evaluator in &self.evaluators {
            tracing::debug!(evaluator = evaluator.name(), "Running evaluator");
            let result = evaluator
                .evaluate(messages, response, context, config)
                .await?;
            for metric in conform(evaluator.as_ref(), result) {
                merged.insert(metric);
            }
        }

        Ok(merged)
    }
}

/// Keep exactly the declared metrics of `evaluator`, filling gaps with
/// Unknown placeholders.
fn conform(evaluator: &dyn Evaluator, mut result: EvaluationResult) -> Vec<Metric> {
    let mut metrics = Vec::with_capacity(evaluator.metric_names().len());

    for name in evaluator.metric_names() {
        let metric = match result.remove(name) {
            Some(metric) => metric,
            None => {
                tracing::warn!(
                    evaluator = evaluator.name(),
                    metric = %name,
                    "Evaluator did not return a declared metric"
                );
                Metric::unknown(name.clone(), "Metric missing from evaluator output.")
                    .with_diagnostic(Diagnostic::error(format!(
                        "Evaluator '{}' did not produce metric '{}'.",
                        evaluator.name(),
                        name
                    )))
            }
        };
        metrics.push(metric);
    }

    for extra in result {
        tracing::warn!(
            evaluator = evaluator.name(),
            metric = %extra.name,
            "Dropping undeclared metric"
        );
    }

    metrics
}
