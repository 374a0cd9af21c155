use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl CoreError {
    /// True when the remote answered but its payload could not be decoded.
    pub fn is_response_format_error(&self) -> bool {
        matches!(
            self,
            CoreError::Serialization(_)
                | CoreError::Llm(LlmError::InvalidResponseFormat { .. })
                | CoreError::RedditApi(RedditApiError::InvalidResponse { .. })
        )
    }
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::RedditApi(e) => {
                error!("Reddit API error details: {:?}", e);
            }
            CoreError::Llm(e) => {
                error!("LLM error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_retryable(),
            CoreError::Llm(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            CoreError::Timeout { .. } => true,
            CoreError::RateLimited { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after }) => {
                Some(Duration::from_secs(*retry_after))
            }
            CoreError::Llm(LlmError::RateLimitExceeded { retry_after, .. }) => {
                Some(Duration::from_secs(*retry_after))
            }
            CoreError::Timeout { seconds } => Some(Duration::from_secs(*seconds)),
            CoreError::RateLimited { retry_after, .. } => *retry_after,
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.user_friendly_message(),
            CoreError::Llm(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            CoreError::Timeout { .. } => {
                "The operation took too long to complete. Please try again.".to_string()
            }
            CoreError::NotFound { resource } => format!("File not found: {}", resource),
            CoreError::RateLimited { message, .. } => {
                format!(
                    "Rate limited: {}. Please wait before trying again.",
                    message
                )
            }
            CoreError::RequestFailed { message, .. } => {
                format!("Request failed: {}", message)
            }
            CoreError::Serialization(e) => format!("Malformed JSON: {}", e),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::RedditApi(_) => "REDDIT_API".to_string(),
            CoreError::Llm(_) => "LLM".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::InvalidInput { .. } => "INVALID_INPUT".to_string(),
            CoreError::Timeout { .. } => "TIMEOUT".to_string(),
            CoreError::NotFound { .. } => "NOT_FOUND".to_string(),
            CoreError::RateLimited { .. } => "RATE_LIMITED".to_string(),
            CoreError::RequestFailed { .. } => "REQUEST_FAILED".to_string(),
        }
    }
}

impl ErrorExt for RedditApiError {
    fn log_error(&self) -> &Self {
        error!("RedditApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("RedditApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            RedditApiError::RateLimitExceeded { .. } => true,
            RedditApiError::RequestTimeout => true,
            RedditApiError::ServerError { status_code } => *status_code >= 500,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RedditApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ if self.is_retryable() => Some(Duration::from_secs(30)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => {
                "Reddit authentication failed. Please check your credentials.".to_string()
            }
            RedditApiError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            RedditApiError::Forbidden { resource } => format!(
                "Access denied to {}. You may not have permission to view this content.",
                resource
            ),
            RedditApiError::SubredditNotFound { subreddit } => {
                format!("Subreddit '{}' not found or is private.", subreddit)
            }
            RedditApiError::PostNotFound { .. } => {
                "The requested post could not be found.".to_string()
            }
            RedditApiError::InvalidToken => {
                "Reddit authentication token is invalid. Please re-authenticate.".to_string()
            }
            RedditApiError::RequestTimeout => {
                "Request to Reddit timed out. Please try again.".to_string()
            }
            _ => "Reddit API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => "REDDIT_AUTH_FAILED".to_string(),
            RedditApiError::RateLimitExceeded { .. } => "REDDIT_RATE_LIMIT".to_string(),
            RedditApiError::Forbidden { .. } => "REDDIT_FORBIDDEN".to_string(),
            RedditApiError::SubredditNotFound { .. } => "REDDIT_SUBREDDIT_NOT_FOUND".to_string(),
            RedditApiError::PostNotFound { .. } => "REDDIT_POST_NOT_FOUND".to_string(),
            RedditApiError::InvalidToken => "REDDIT_INVALID_TOKEN".to_string(),
            RedditApiError::RequestTimeout => "REDDIT_TIMEOUT".to_string(),
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE".to_string(),
            RedditApiError::ServerError { .. } => "REDDIT_SERVER_ERROR".to_string(),
        }
    }
}

impl ErrorExt for LlmError {
    fn log_error(&self) -> &Self {
        error!("LlmError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("LlmError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimitExceeded { .. }
                | LlmError::ServiceUnavailable { .. }
                | LlmError::RequestTimeout { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimitExceeded { retry_after, .. } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ if self.is_retryable() => Some(Duration::from_secs(10)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            LlmError::AuthenticationFailed { provider } => format!(
                "Authentication failed for {}. Please check your API key.",
                provider
            ),
            LlmError::InvalidApiKey { provider } => format!(
                "Invalid API key for {}. Please update your credentials.",
                provider
            ),
            LlmError::RateLimitExceeded {
                provider,
                retry_after,
            } => format!(
                "Rate limit exceeded for {}. Please wait {} seconds.",
                provider, retry_after
            ),
            LlmError::ModelNotAvailable { model } => format!(
                "Model '{}' is not available. Please try a different model.",
                model
            ),
            LlmError::ContentFiltered { .. } => {
                "Content was filtered by the AI provider's safety systems.".to_string()
            }
            LlmError::ServiceUnavailable { provider } => format!(
                "{} service is temporarily unavailable. Please try again later.",
                provider
            ),
            _ => "AI service error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            LlmError::AuthenticationFailed { .. } => "LLM_AUTH_FAILED".to_string(),
            LlmError::InvalidApiKey { .. } => "LLM_INVALID_API_KEY".to_string(),
            LlmError::RateLimitExceeded { .. } => "LLM_RATE_LIMIT".to_string(),
            LlmError::ModelNotAvailable { .. } => "LLM_MODEL_NOT_AVAILABLE".to_string(),
            LlmError::ContentFiltered { .. } => "LLM_CONTENT_FILTERED".to_string(),
            LlmError::ServiceUnavailable { .. } => "LLM_SERVICE_UNAVAILABLE".to_string(),
            LlmError::RequestTimeout { .. } => "LLM_TIMEOUT".to_string(),
            LlmError::InvalidResponseFormat { .. } => "LLM_INVALID_RESPONSE".to_string(),
            LlmError::UnexpectedStatus { .. } => "LLM_UNEXPECTED_STATUS".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::InvalidValue { field, value } => {
                format!("Invalid value '{}' for configuration field '{}'.", value, field)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable '{}' is required but not set.",
                var_name
            ),
            ConfigError::Parse(e) => format!("Configuration file could not be parsed: {}", e),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

/// Logs fatal and degraded-but-recovered errors with their code and user message.
#[derive(Debug, Default)]
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn report_error(&self, error: &CoreError) {
        error.log_error();
        info!("Error code: {}", error.error_code());
        info!("User message: {}", error.user_friendly_message());
        if error.is_retryable() {
            if let Some(retry_after) = error.retry_after() {
                info!("Error is retryable. Retry after: {:?}", retry_after);
            }
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        error.log_warn();
        info!("Error code: {}", error.error_code());
    }
}
