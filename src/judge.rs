use crate::client::{ChatOptions, ResponseFormat};
use crate::evaluator::{ChatConfiguration, EvaluationError, Evaluator};
use crate::models::{
    ChatMessage, ChatResponse, ChatRole, Diagnostic, EvaluationContext, EvaluationResult,
    Interpretation, Metric, Rating,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

pub const COHERENCE_METRIC_NAME: &str = "Coherence";
pub const RELEVANCE_METRIC_NAME: &str = "Relevance";

const MIN_SCORE: f64 = 1.0;
const MAX_SCORE: f64 = 5.0;
const MIN_PASSING_SCORE: f64 = 4.0;

const JUDGE_SYSTEM_PROMPT: &str = "You are an impartial evaluator of AI assistant responses. \
     You read a conversation and the assistant's final response and grade the response \
     on a single criterion. You always answer with a single JSON object.";

/// Evaluator that asks a judge model to grade one quality criterion on a 1-5 scale
pub struct LlmJudgeEvaluator {
    metric_names: Vec<String>,
    definition: &'static str,
}

impl LlmJudgeEvaluator {
    /// How logically ordered and easy to follow the response is
    pub fn coherence() -> Self {
        Self {
            metric_names: vec![COHERENCE_METRIC_NAME.to_string()],
            definition: "Coherence measures how well the response is organised: ideas follow \
                 logically, sentences connect naturally, and the reader can follow the answer \
                 without confusion. 1 means incoherent, 5 means perfectly coherent.",
        }
    }

    /// How well the response addresses what the user asked
    pub fn relevance() -> Self {
        Self {
            metric_names: vec![RELEVANCE_METRIC_NAME.to_string()],
            definition: "Relevance measures how well the response addresses the user's request \
                 given the conversation: it answers the actual question, stays on topic, and \
                 uses the information provided. 1 means irrelevant, 5 means fully relevant.",
        }
    }

    fn metric_name(&self) -> &str {
        &self.metric_names[0]
    }

    /// Build the judge prompt
    fn build_judge_prompt(
        &self,
        messages: &[ChatMessage],
        response: &ChatResponse,
        context: &[EvaluationContext],
    ) -> String {
        let conversation = messages
            .iter()
            .map(|m| format!("[{}] {}", role_label(m.role), m.text))
            .collect::<Vec<_>>()
            .join("\n");

        let mut prompt = format!(
            "Criterion: {}\n{}\n\nConversation:\n{}\n",
            self.metric_name(),
            self.definition,
            conversation
        );

        if !context.is_empty() {
            prompt.push_str("\nAdditional context:\n");
            for item in context {
                prompt.push_str(&format!("- {}: {}\n", item.name, item.content));
            }
        }

        prompt.push_str(&format!(
            "\nResponse to Evaluate:\n{}\n\nReturn JSON with a 'score' field (integer from 1 to 5) \
             and a 'reason' field explaining the score.",
            response.text()
        ));

        prompt
    }

    /// Turn the judge reply into a metric; unreadable replies become Unknown
    fn parse_judge_reply(&self, reply: &str) -> Metric {
        let name = self.metric_name();

        let parsed = match parse_json_response(reply) {
            Ok(parsed) => parsed,
            Err(err) => {
                return Metric::unknown(name, "The judge reply could not be parsed.")
                    .with_diagnostic(Diagnostic::error(format!("{:#}", err)))
                    .with_diagnostic(Diagnostic::informational(format!(
                        "Judge reply: {}",
                        reply
                    )));
            }
        };

        let reason = extract_reason(&parsed);
        match extract_score(&parsed) {
            Some(score) => {
                let score = score.clamp(MIN_SCORE, MAX_SCORE);
                Metric::numeric(name, Some(score), reason)
                    .with_interpretation(interpret_judge_score(Some(score)))
            }
            None => Metric::unknown(name, reason).with_diagnostic(Diagnostic::error(format!(
                "Judge reply has no numeric 'score': {}",
                reply
            ))),
        }
    }
}

fn role_label(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

/// Parse JSON from the reply, handling JSON embedded in prose
fn parse_json_response(reply: &str) -> Result<Value> {
    match serde_json::from_str(reply) {
        Ok(parsed) => Ok(parsed),
        Err(_) => try_extract_embedded_json(reply),
    }
}

fn try_extract_embedded_json(reply: &str) -> Result<Value> {
    match reply.find('{') {
        Some(start) => match reply.rfind('}') {
            Some(end) if end > start => serde_json::from_str(&reply[start..=end])
                .context("Failed to parse extracted JSON"),
            _ => anyhow::bail!("Found opening brace but no closing brace in reply"),
        },
        None => anyhow::bail!("No JSON found in reply"),
    }
}

/// Score as a finite number, also accepting numeric strings
fn extract_score(parsed: &Value) -> Option<f64> {
    let score = match parsed.get("score")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    score.is_finite().then_some(score)
}

fn extract_reason(parsed: &Value) -> String {
    match parsed.get("reason").and_then(|r| r.as_str()) {
        Some(reason) => reason.to_string(),
        None => "No reason provided".to_string(),
    }
}

/// Interpret a 1-5 judge score. Scores below 4 fail.
pub fn interpret_judge_score(value: Option<f64>) -> Interpretation {
    let Some(score) = value else {
        return Interpretation::failed(Rating::Unknown, "No score was produced.");
    };

    let rating = match score {
        s if s > 4.0 => Rating::Exceptional,
        s if s > 3.0 => Rating::Good,
        s if s > 2.0 => Rating::Average,
        s if s > 1.0 => Rating::Poor,
        s if s >= 1.0 => Rating::Unacceptable,
        _ => Rating::Inconclusive,
    };

    if score < MIN_PASSING_SCORE {
        Interpretation::failed(rating, format!("Score {} is below {}.", score, MIN_PASSING_SCORE))
    } else {
        Interpretation::passed(rating, format!("Score {} meets {}.", score, MIN_PASSING_SCORE))
    }
}

#[async_trait]
impl Evaluator for LlmJudgeEvaluator {
    fn name(&self) -> &str {
        self.metric_name()
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
        let config = config.ok_or_else(|| EvaluationError::MissingChatConfiguration {
            evaluator: self.name().to_string(),
        })?;

        let judge_messages = vec![
            ChatMessage::system(JUDGE_SYSTEM_PROMPT),
            ChatMessage::user(self.build_judge_prompt(messages, response, context)),
        ];
        let options = ChatOptions {
            temperature: 0.0,
            response_format: ResponseFormat::Text,
            max_tokens: None,
        };

        let reply = config
            .client
            .complete(&judge_messages, &options)
            .await
            .with_context(|| format!("Judge request for '{}' failed", self.metric_name()))?;

        Ok(EvaluationResult::new([self.parse_judge_reply(reply.text())]))
    }
}
