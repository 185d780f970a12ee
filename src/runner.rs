use crate::client::{self, CachingChatClient, ChatClient};
use crate::config::{Config, EvaluatorKind, ScenarioConfig};
use crate::evaluator::{ChatConfiguration, CompositeEvaluator, Evaluator};
use crate::judge::LlmJudgeEvaluator;
use crate::keyword::KeywordEvaluator;
use crate::models::{
    ChatMessage, EvaluationResult, Metric, MetricValue, MetricVerdict, ScenarioOutcome,
};
use crate::producer::ResponseProducer;
use crate::report::{DiskReportStore, ReportStore};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Main runner that orchestrates scenario evaluation
pub struct Runner {
    config: Config,
    execution_name: String,
    store: Option<Box<dyn ReportStore>>,
}

impl Runner {
    /// Create a new runner; reports go to the configured reporting path, if any
    pub fn new(config: Config, execution_name: impl Into<String>) -> Self {
        let store = config
            .reporting_path
            .as_ref()
            .map(|root| Box::new(DiskReportStore::new(root)) as Box<dyn ReportStore>);

        Self {
            config,
            execution_name: execution_name.into(),
            store,
        }
    }

    pub fn execution_name(&self) -> &str {
        &self.execution_name
    }

    /// Run all scenarios defined in the configuration
    pub async fn run_scenarios(&self) -> Result<Vec<ScenarioOutcome>> {
        let chat_client = client::build_client(&self.config.chat)
            .context("Failed to create chat client")?;
        let judge = if self.config.needs_judge() {
            Some(ChatConfiguration::new(self.judge_client()?))
        } else {
            None
        };

        Ok(self.run_scenarios_with(chat_client, judge.as_ref()).await)
    }

    /// Judge client, replaying cached replies when caching is on
    fn judge_client(&self) -> Result<Arc<dyn ChatClient>> {
        let endpoint = self.config.judge_endpoint();
        let judge_client =
            client::build_client(endpoint).context("Failed to create judge client")?;

        let client: Arc<dyn ChatClient> = match self.config.response_cache_dir() {
            Some(dir) => {
                tracing::info!(dir = %dir.display(), "Judge response caching enabled");
                let scope = format!("{}/{}", endpoint.api_endpoint, endpoint.model);
                Arc::new(CachingChatClient::new(judge_client, dir, scope))
            }
            None => judge_client,
        };
        Ok(client)
    }

    /// Run all scenarios against the given clients.
    ///
    /// A scenario that fails to run is recorded as an errored outcome and
    /// the remaining scenarios still run.
    pub async fn run_scenarios_with(
        &self,
        chat_client: Arc<dyn ChatClient>,
        judge: Option<&ChatConfiguration>,
    ) -> Vec<ScenarioOutcome> {
        let producer = ResponseProducer::new(chat_client);
        let total = self.config.scenarios.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, scenario) in self.config.scenarios.iter().enumerate() {
            tracing::info!(
                scenario = %scenario.name,
                "Running scenario {}/{}",
                index + 1,
                total
            );
            let messages = ResponseProducer::chat_messages(scenario);
            let mut outcome = match self
                .run_scenario(&producer, scenario, messages.clone(), judge)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(scenario = %scenario.name, "Scenario failed to run: {:#}", e);
                    ScenarioOutcome::errored(
                        &scenario.name,
                        &self.execution_name,
                        messages,
                        format!("{:#}", e),
                    )
                }
            };

            if let Err(e) = self.store_outcome_if_configured(&outcome) {
                tracing::error!(scenario = %scenario.name, "{:#}", e);
                outcome.passed = false;
                if outcome.error.is_none() {
                    outcome.error = Some(format!("{:#}", e));
                }
            }
            outcomes.push(outcome);
        }

        outcomes
    }

    /// Produce, evaluate and gate a single scenario
    async fn run_scenario(
        &self,
        producer: &ResponseProducer,
        scenario: &ScenarioConfig,
        messages: Vec<ChatMessage>,
        judge: Option<&ChatConfiguration>,
    ) -> Result<ScenarioOutcome> {
        let evaluator = build_evaluator(scenario)?;
        let response = producer.chat_response(scenario, &messages).await?;

        tracing::info!(scenario = %scenario.name, "Evaluating response");
        let results = evaluator
            .evaluate(&messages, &response, &[], judge)
            .await
            .context("Failed to evaluate response")?;

        let verdicts = apply_gate(&results, scenario.threshold);
        let passed = verdicts.iter().all(|v| v.passed);
        if !passed {
            tracing::warn!(scenario = %scenario.name, "Scenario did not meet its threshold");
        }

        Ok(ScenarioOutcome {
            scenario: scenario.name.clone(),
            execution: self.execution_name.clone(),
            evaluators: evaluator.evaluator_names(),
            messages,
            response,
            results,
            verdicts,
            passed,
            error: None,
        })
    }

    /// Store the outcome if a reporting path is configured
    fn store_outcome_if_configured(&self, outcome: &ScenarioOutcome) -> Result<()> {
        if let Some(store) = &self.store {
            store
                .store(outcome)
                .with_context(|| format!("Failed to store report for '{}'", outcome.scenario))?;
        }
        Ok(())
    }
}

/// Compose the evaluators a scenario asks for
pub fn build_evaluator(scenario: &ScenarioConfig) -> Result<CompositeEvaluator> {
    scenario.validate()?;

    let evaluators: Vec<Box<dyn Evaluator>> = scenario
        .evaluators
        .iter()
        .map(|kind| -> Box<dyn Evaluator> {
            match kind {
                EvaluatorKind::Coherence => Box::new(LlmJudgeEvaluator::coherence()),
                EvaluatorKind::Relevance => Box::new(LlmJudgeEvaluator::relevance()),
                EvaluatorKind::Keyword => {
                    Box::new(KeywordEvaluator::with_key_phrase(&scenario.keyword))
                }
            }
        })
        .collect();

    CompositeEvaluator::new(evaluators)
        .with_context(|| format!("Invalid evaluator list for '{}'", scenario.name))
}

/// Check every metric against `threshold`.
///
/// Numeric metrics pass at or above the threshold; a missing value fails.
/// Text metrics pass unless their interpretation failed.
pub fn apply_gate(results: &EvaluationResult, threshold: f64) -> Vec<MetricVerdict> {
    results
        .metrics()
        .map(|metric| MetricVerdict {
            metric: metric.name.clone(),
            value: metric.value.clone(),
            reason: metric.reason.clone(),
            passed: metric_passes(metric, threshold),
        })
        .collect()
}

fn metric_passes(metric: &Metric, threshold: f64) -> bool {
    match &metric.value {
        None => false,
        Some(MetricValue::Number(value)) => *value >= threshold,
        Some(MetricValue::Text(_)) => !metric
            .interpretation
            .as_ref()
            .is_some_and(|interpretation| interpretation.failed),
    }
}
