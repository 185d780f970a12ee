use crate::config::{EndpointConfig, Provider};
use crate::models::{ChatMessage, ChatResponse, ChatRole};
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::{AzureConfig, Config, OpenAIConfig},
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, ResponseFormat as OpenAIResponseFormat,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Format the model is asked to reply in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseFormat {
    #[default]
    Text,
    JsonObject,
}

/// Per-request generation options
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub temperature: f32,
    pub response_format: ResponseFormat,
    pub max_tokens: Option<u32>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            response_format: ResponseFormat::Text,
            max_tokens: None,
        }
    }
}

/// Anything that can complete a conversation.
///
/// Errors are transport or API failures; they are returned unmodified to the
/// caller.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], options: &ChatOptions)
    -> Result<ChatResponse>;
}

/// Chat client backed by an OpenAI-compatible endpoint
pub struct OpenAiChatClient<C: Config> {
    client: Client<C>,
    model: String,
}

impl<C> OpenAiChatClient<C>
where
    C: Config + Send + Sync + 'static,
{
    pub fn new(config: C, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        // async-openai retries rate-limited requests by default; surface them instead
        let no_retry = backoff::ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::ZERO))
            .build();

        let client = Client::with_config(config)
            .with_http_client(http_client)
            .with_backoff(no_retry);

        Ok(Self {
            client,
            model: model.into(),
        })
    }

    /// Build the chat completion request
    fn build_request(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<CreateChatCompletionRequest> {
        let messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let response_format = match options.response_format {
            ResponseFormat::Text => OpenAIResponseFormat::Text,
            ResponseFormat::JsonObject => OpenAIResponseFormat::JsonObject,
        };

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&self.model)
            .messages(messages)
            .temperature(options.temperature)
            .response_format(response_format);
        if let Some(max_tokens) = options.max_tokens {
            builder.max_tokens(max_tokens);
        }

        builder
            .build()
            .context("Failed to build chat completion request")
    }
}

#[async_trait]
impl<C> ChatClient for OpenAiChatClient<C>
where
    C: Config + Send + Sync + 'static,
{
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse> {
        let request = self.build_request(messages, options)?;
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .context("Chat completion request failed")?;

        Ok(extract_chat_response(response))
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let text = message.text.clone();
    let request_message = match message.role {
        ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(text)
            .build()
            .context("Failed to build system message")?
            .into(),
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(text)
            .build()
            .context("Failed to build user message")?
            .into(),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(text)
            .build()
            .context("Failed to build assistant message")?
            .into(),
    };
    Ok(request_message)
}

/// Extract text and usage from the first choice
fn extract_chat_response(response: CreateChatCompletionResponse) -> ChatResponse {
    let text = response
        .choices
        .first()
        .and_then(|choice| choice.message.content.clone());

    let mut metadata = HashMap::new();
    metadata.insert("model".to_string(), json!(response.model));
    if let Some(usage) = response.usage {
        metadata.insert("prompt_tokens".to_string(), json!(usage.prompt_tokens));
        metadata.insert("completion_tokens".to_string(), json!(usage.completion_tokens));
        metadata.insert("total_tokens".to_string(), json!(usage.total_tokens));
    }

    ChatResponse { text, metadata }
}

/// Chat client that replays stored replies for identical requests.
///
/// Entries are `{dir}/{sha256}.json`, keyed on the scope, the messages and the
/// options. Only successful replies are stored.
pub struct CachingChatClient {
    inner: Arc<dyn ChatClient>,
    dir: PathBuf,
    scope: String,
}

impl CachingChatClient {
    /// `scope` separates endpoints and models sharing one cache directory
    pub fn new(
        inner: Arc<dyn ChatClient>,
        dir: impl Into<PathBuf>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            dir: dir.into(),
            scope: scope.into(),
        }
    }

    fn cache_key(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String> {
        let request = serde_json::to_vec(&(&self.scope, messages, options))
            .context("Failed to serialize request for the response cache")?;
        let mut hasher = Sha256::new();
        hasher.update(&request);
        Ok(hex::encode(hasher.finalize()))
    }

    async fn read_entry(&self, path: &Path) -> Option<ChatResponse> {
        let content = tokio::fs::read_to_string(path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Ignoring unreadable cache entry: {}", e);
                None
            }
        }
    }

    async fn write_entry(&self, path: &Path, response: &ChatResponse) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create cache directory: {}", self.dir.display()))?;
        let json_content = serde_json::to_string_pretty(response)
            .context("Failed to serialize cached response")?;
        tokio::fs::write(path, json_content)
            .await
            .with_context(|| format!("Failed to write cache entry: {}", path.display()))
    }
}

#[async_trait]
impl ChatClient for CachingChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<ChatResponse> {
        let key = self.cache_key(messages, options)?;
        let path = self.dir.join(format!("{}.json", key));

        if let Some(response) = self.read_entry(&path).await {
            tracing::debug!(key = %key, "Response cache hit");
            return Ok(response);
        }

        let response = self.inner.complete(messages, options).await?;
        self.write_entry(&path, &response).await?;
        Ok(response)
    }
}

/// Create a chat client for the configured endpoint
pub fn build_client(endpoint: &EndpointConfig) -> Result<Arc<dyn ChatClient>> {
    let api_key = endpoint.api_key();
    let timeout = Duration::from_secs(endpoint.timeout_secs);

    let client: Arc<dyn ChatClient> = match endpoint.provider {
        Provider::OpenAI => {
            let config = OpenAIConfig::new()
                .with_api_key(api_key)
                .with_api_base(&endpoint.api_endpoint);
            Arc::new(OpenAiChatClient::new(config, &endpoint.model, timeout)?)
        }
        Provider::Azure => {
            let config = AzureConfig::new()
                .with_api_key(api_key)
                .with_api_base(&endpoint.api_endpoint)
                .with_deployment_id(&endpoint.model)
                .with_api_version(&endpoint.api_version);
            Arc::new(OpenAiChatClient::new(config, &endpoint.model, timeout)?)
        }
    };

    tracing::debug!(
        provider = ?endpoint.provider,
        endpoint = %endpoint.api_endpoint,
        model = %endpoint.model,
        "Created chat client"
    );

    Ok(client)
}
