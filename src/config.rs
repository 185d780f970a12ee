use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which API flavour an endpoint speaks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAI,
    Azure,
}

/// Connection settings for a chat-completion endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointConfig {
    #[serde(default)]
    pub provider: Provider,
    /// API base URL
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    pub env_var_api_key: String,
    /// Model name, or deployment id for Azure
    pub model: String,
    /// API version sent to Azure endpoints
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl EndpointConfig {
    /// Resolve the API key from the environment.
    ///
    /// A missing variable yields an empty key; the endpoint rejects it.
    pub fn api_key(&self) -> String {
        match std::env::var(&self.env_var_api_key) {
            Ok(key) => key,
            Err(_) => {
                tracing::warn!(
                    "Environment variable {} not set, using an empty API key",
                    self.env_var_api_key
                );
                String::new()
            }
        }
    }
}

/// Evaluators a scenario can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluatorKind {
    Coherence,
    Relevance,
    Keyword,
}

impl EvaluatorKind {
    pub fn needs_judge(self) -> bool {
        !matches!(self, EvaluatorKind::Keyword)
    }
}

/// Configuration for a single scenario
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    /// Scenario name, used as the report key
    pub name: String,
    /// System message opening the conversation
    pub system_prompt: String,
    /// User message the model answers
    pub user_prompt: String,
    /// Temperature for response generation
    #[serde(default)]
    pub temperature: f32,
    /// Maximum tokens for response generation
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Evaluators run against the response
    pub evaluators: Vec<EvaluatorKind>,
    /// Minimum numeric value for a metric to pass
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Phrase searched for by the keyword evaluator
    #[serde(default = "default_keyword")]
    pub keyword: String,
}

impl ScenarioConfig {
    /// Reject settings no evaluator can score meaningfully
    pub fn validate(&self) -> Result<()> {
        if self.keyword.trim().is_empty() {
            anyhow::bail!("Scenario '{}' has a blank keyword", self.name);
        }
        Ok(())
    }
}

fn default_api_version() -> String {
    "2024-06-01".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_threshold() -> f64 {
    3.0
}

fn default_keyword() -> String {
    crate::keyword::DEFAULT_KEY_PHRASE.to_string()
}

/// Root configuration for a run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Model under test
    pub chat: EndpointConfig,
    /// Judge model for LLM-backed evaluators, defaults to `chat`
    #[serde(default)]
    pub judge: Option<EndpointConfig>,
    /// Optional root directory for scenario reports
    #[serde(default)]
    pub reporting_path: Option<PathBuf>,
    /// Reuse judge replies stored under `{reporting_path}/cache`
    #[serde(default)]
    pub enable_response_caching: bool,
    /// Scenarios to run, in order
    pub scenarios: Vec<ScenarioConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.enable_response_caching && self.reporting_path.is_none() {
            anyhow::bail!("enable_response_caching requires reporting_path");
        }
        for scenario in &self.scenarios {
            scenario.validate()?;
        }
        Ok(())
    }

    /// Directory for cached judge replies, when caching is on
    pub fn response_cache_dir(&self) -> Option<PathBuf> {
        match &self.reporting_path {
            Some(root) if self.enable_response_caching => Some(root.join("cache")),
            _ => None,
        }
    }

    pub fn judge_endpoint(&self) -> &EndpointConfig {
        self.judge.as_ref().unwrap_or(&self.chat)
    }

    pub fn needs_judge(&self) -> bool {
        self.scenarios
            .iter()
            .flat_map(|s| s.evaluators.iter())
            .any(|kind| kind.needs_judge())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", content).unwrap();
        temp_file
    }

    #[test]
    fn test_config_parsing() {
        let toml_content = r#"
reporting_path = "/tmp/reports"
enable_response_caching = true

[chat]
provider = "azure"
api_endpoint = "https://example.openai.azure.com"
env_var_api_key = "AOAI_APIKEY"
model = "gpt-4o"
api_version = "2024-10-21"
timeout_secs = 30

[judge]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
model = "gpt-4o-mini"

[[scenarios]]
name = "SuperSportsBallEvaluation"
system_prompt = "You provide answers related to sport events."
user_prompt = "Who won the Super Sport Ball 2025?"
temperature = 0.2
max_tokens = 200
evaluators = ["coherence", "relevance", "keyword"]
threshold = 4.0
keyword = "flying dolphins"
"#;

        let temp_file = write_config(toml_content);
        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.chat.provider, Provider::Azure);
        assert_eq!(config.chat.api_version, "2024-10-21");
        assert_eq!(config.chat.timeout_secs, 30);
        assert_eq!(config.judge_endpoint().model, "gpt-4o-mini");
        assert_eq!(config.judge_endpoint().provider, Provider::OpenAI);
        assert_eq!(config.reporting_path, Some(PathBuf::from("/tmp/reports")));
        assert_eq!(
            config.response_cache_dir(),
            Some(PathBuf::from("/tmp/reports/cache"))
        );

        let scenario = &config.scenarios[0];
        assert_eq!(scenario.temperature, 0.2);
        assert_eq!(scenario.max_tokens, Some(200));
        assert_eq!(
            scenario.evaluators,
            vec![
                EvaluatorKind::Coherence,
                EvaluatorKind::Relevance,
                EvaluatorKind::Keyword
            ]
        );
        assert_eq!(scenario.threshold, 4.0);
        assert_eq!(scenario.keyword, "flying dolphins");
        assert!(config.needs_judge());
    }

    #[test]
    fn test_config_defaults() {
        let toml_content = r#"
[chat]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
model = "gpt-4o"

[[scenarios]]
name = "KeyWords"
system_prompt = "system"
user_prompt = "user"
evaluators = ["keyword"]
"#;

        let temp_file = write_config(toml_content);
        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.chat.provider, Provider::OpenAI);
        assert_eq!(config.chat.api_version, "2024-06-01");
        assert_eq!(config.chat.timeout_secs, 60);
        assert!(config.judge.is_none());
        assert_eq!(config.judge_endpoint().model, "gpt-4o");
        assert!(config.reporting_path.is_none());
        assert!(!config.enable_response_caching);
        assert!(config.response_cache_dir().is_none());

        let scenario = &config.scenarios[0];
        assert_eq!(scenario.temperature, 0.0);
        assert_eq!(scenario.max_tokens, None);
        assert_eq!(scenario.threshold, 3.0);
        assert_eq!(scenario.keyword, "super sports ball");
        assert!(!config.needs_judge());
    }

    #[test]
    fn test_config_unknown_evaluator_rejected() {
        let toml_content = r#"
[chat]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
model = "gpt-4o"

[[scenarios]]
name = "Bad"
system_prompt = "system"
user_prompt = "user"
evaluators = ["fluency"]
"#;

        let temp_file = write_config(toml_content);
        let err = Config::from_file(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML config"));
    }

    #[test]
    fn test_config_blank_keyword_rejected() {
        let toml_content = r#"
[chat]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
model = "gpt-4o"

[[scenarios]]
name = "CustomEvaluator"
system_prompt = "system"
user_prompt = "user"
evaluators = ["keyword"]
keyword = "   "
"#;

        let temp_file = write_config(toml_content);
        let err = Config::from_file(temp_file.path()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("Invalid config"));
        assert!(message.contains("Scenario 'CustomEvaluator' has a blank keyword"));
    }

    #[test]
    fn test_config_caching_requires_reporting_path() {
        let toml_content = r#"
enable_response_caching = true

[chat]
api_endpoint = "https://api.openai.com/v1"
env_var_api_key = "OPENAI_API_KEY"
model = "gpt-4o"

[[scenarios]]
name = "SingleEvaluator"
system_prompt = "system"
user_prompt = "user"
evaluators = ["coherence"]
"#;

        let temp_file = write_config(toml_content);
        let err = Config::from_file(temp_file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("enable_response_caching requires reporting_path"));
    }

    #[test]
    fn test_sample_run_file_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("runs/super_sports_ball.toml");
        let config = Config::from_file(&path).unwrap();

        assert_eq!(config.chat.provider, Provider::Azure);
        assert_eq!(config.scenarios.len(), 3);
        assert_eq!(config.scenarios[2].evaluators, vec![EvaluatorKind::Keyword]);
        assert!(config.scenarios[0].system_prompt.contains("Flying Dolphins Munich"));
        assert!(config.needs_judge());
        assert_eq!(config.response_cache_dir(), Some(PathBuf::from("reports/cache")));
    }

    #[test]
    fn test_config_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_missing_api_key_resolves_empty() {
        let endpoint = EndpointConfig {
            provider: Provider::OpenAI,
            api_endpoint: "https://api.openai.com/v1".to_string(),
            env_var_api_key: "CHAT_RESPONSE_EVAL_TEST_UNSET_KEY".to_string(),
            model: "gpt-4o".to_string(),
            api_version: default_api_version(),
            timeout_secs: 60,
        };
        assert_eq!(endpoint.api_key(), "");
    }
}
