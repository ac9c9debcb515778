use crate::error::{AssistantError, AssistantResult};

/// Configuration for the chat-completion endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub timeout_secs: u64,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://models.github.ai/inference".to_string(),
            model: "openai/gpt-4.1-mini".to_string(),
            temperature: 1.0,
            top_p: 1.0,
            timeout_secs: 30,
        }
    }
}

impl LLMConfig {
    /// Create config from environment variables
    pub fn from_env() -> AssistantResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LLMConfig::from_env`] but reads variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> AssistantResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_key = lookup("LLM_API_KEY")
            .or_else(|| lookup("GITHUB_TOKEN"))
            .filter(|key| !key.trim().is_empty());

        let base_url = lookup("LLM_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);

        let model = lookup("LLM_MODEL").unwrap_or(defaults.model);

        let temperature = parse_var(&lookup, "LLM_TEMPERATURE")?.unwrap_or(defaults.temperature);
        let top_p = parse_var(&lookup, "LLM_TOP_P")?.unwrap_or(defaults.top_p);
        let timeout_secs = parse_var(&lookup, "LLM_TIMEOUT_SECS")?.unwrap_or(defaults.timeout_secs);

        Ok(Self {
            api_key,
            base_url,
            model,
            temperature,
            top_p,
            timeout_secs,
        })
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> AssistantResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| AssistantError::Config(format!("{} has an invalid value: {}", key, raw))),
    }
}
