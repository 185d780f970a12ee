use crate::evaluator::{ChatConfiguration, EvaluationError, Evaluator};
use crate::models::{
    ChatMessage, ChatResponse, EvaluationContext, EvaluationResult, Interpretation, Metric, Rating,
};
use async_trait::async_trait;

pub const KEYWORD_METRIC_NAME: &str = "KeyWordSearch";
pub const DEFAULT_KEY_PHRASE: &str = "super sports ball";

/// Score awarded when the key phrase is present
const KEY_PHRASE_WEIGHT: u32 = 3;
/// Highest score still rated Good
const MAX_GOOD_SCORE: f64 = 4.0;

/// Deterministic evaluator that looks for a key phrase in the response.
///
/// The score is a fixed-weight presence check (0 or 3), not a count of
/// occurrences.
pub struct KeywordEvaluator {
    key_phrase: String,
    metric_names: Vec<String>,
}

impl KeywordEvaluator {
    pub fn new() -> Self {
        Self::with_key_phrase(DEFAULT_KEY_PHRASE)
    }

    pub fn with_key_phrase(key_phrase: impl Into<String>) -> Self {
        Self {
            key_phrase: key_phrase.into().to_lowercase(),
            metric_names: vec![KEYWORD_METRIC_NAME.to_string()],
        }
    }

    fn check_for_key_words(&self, input: Option<&str>) -> u32 {
        // a blank phrase is never present
        if self.key_phrase.trim().is_empty() {
            return 0;
        }

        let input = match input {
            Some(text) if !text.trim().is_empty() => text,
            _ => return 0,
        };

        if input.to_lowercase().contains(&self.key_phrase) {
            KEY_PHRASE_WEIGHT
        } else {
            0
        }
    }
}

impl Default for KeywordEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpret a keyword score.
///
/// Scores above 4 are rated Unacceptable, which the 0/3 scoring never
/// produces; the branch is kept so the thresholds stay explicit.
pub fn interpret_keyword_score(value: Option<f64>) -> Interpretation {
    match value {
        None => Interpretation::failed(
            Rating::Unknown,
            "Failed to identify key words in the response.",
        ),
        Some(score) if score <= MAX_GOOD_SCORE => {
            Interpretation::passed(Rating::Good, "key word(s) found")
        }
        Some(_) => Interpretation::failed(Rating::Unacceptable, "key word(s) not found"),
    }
}

#[async_trait]
impl Evaluator for KeywordEvaluator {
    fn name(&self) -> &str {
        KEYWORD_METRIC_NAME
    }

    fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    async fn evaluate(
        &self,
        _messages: &[ChatMessage],
        response: &ChatResponse,
        _context: &[EvaluationContext],
        _config: Option<&ChatConfiguration>,
    ) -> Result<EvaluationResult, EvaluationError> {
        let key_phrase_count = self.check_for_key_words(response.text.as_deref());
        let value = Some(f64::from(key_phrase_count));

        let reason = format!(
            "'{}' metric has found {} key words.",
            KEYWORD_METRIC_NAME, key_phrase_count
        );
        let metric = Metric::numeric(KEYWORD_METRIC_NAME, value, reason)
            .with_interpretation(interpret_keyword_score(value));

        Ok(EvaluationResult::new([metric]))
    }
}
