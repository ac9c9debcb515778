use thiserror::Error;

pub type AssistantResult<T> = Result<T, AssistantError>;

#[derive(Debug, Error)]
pub enum AssistantError {
    /// The model could not be reached or answered with a failure
    #[error("External service error: {0}")]
    ExternalService(String),

    /// The model answered, but no JSON object could be recovered from the reply
    #[error("LLM did not return valid JSON")]
    MalformedResponse { raw: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AssistantError {
    pub fn external(message: impl Into<String>) -> Self {
        AssistantError::ExternalService(message.into())
    }
}

impl From<reqwest::Error> for AssistantError {
    fn from(err: reqwest::Error) -> Self {
        AssistantError::ExternalService(err.to_string())
    }
}
