use crate::client::{ChatClient, ChatOptions, ResponseFormat};
use crate::config::ScenarioConfig;
use crate::models::{ChatMessage, ChatResponse};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Builds a scenario's conversation and obtains one completion for it
pub struct ResponseProducer {
    client: Arc<dyn ChatClient>,
}

impl ResponseProducer {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }

    /// System message followed by the user's question
    pub fn chat_messages(scenario: &ScenarioConfig) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(scenario.system_prompt.trim()),
            ChatMessage::user(scenario.user_prompt.trim()),
        ]
    }

    pub fn chat_options(scenario: &ScenarioConfig) -> ChatOptions {
        ChatOptions {
            temperature: scenario.temperature,
            response_format: ResponseFormat::Text,
            max_tokens: scenario.max_tokens,
        }
    }

    /// Generate the response for `messages`
    pub async fn chat_response(
        &self,
        scenario: &ScenarioConfig,
        messages: &[ChatMessage],
    ) -> Result<ChatResponse> {
        tracing::info!(scenario = %scenario.name, "Generating response");

        let response = self
            .client
            .complete(messages, &Self::chat_options(scenario))
            .await
            .with_context(|| format!("Failed to generate response for '{}'", scenario.name))?;

        if response.text().trim().is_empty() {
            tracing::warn!(scenario = %scenario.name, "Model returned an empty response");
        }

        Ok(response)
    }
}
