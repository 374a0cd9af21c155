//! Application configuration.
//!
//! Credentials come from the environment only. Tuning knobs may additionally be read
//! from an optional TOML file; any key it leaves out keeps its default.

use crate::{ConfigError, CoreError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "desktop:stocksentiment:v1.0.0";

/// Tuning for comment-tree flattening.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FlattenConfig {
    pub max_depth: usize,
    pub batch_size: usize,
    pub inter_batch_delay_secs: u64,
    pub max_retries: u32,
    pub expansion_limit: Option<usize>,
}

impl FlattenConfig {
    pub fn interactive() -> Self {
        Self {
            max_depth: 5,
            batch_size: 32,
            inter_batch_delay_secs: 0,
            max_retries: 3,
            expansion_limit: Some(32),
        }
    }

    pub fn bulk() -> Self {
        Self {
            max_depth: 5,
            batch_size: 200,
            inter_batch_delay_secs: 30,
            max_retries: 3,
            expansion_limit: None,
        }
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_secs(self.inter_batch_delay_secs)
    }
}

impl Default for FlattenConfig {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Tuning for the annotation stage.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AnnotateConfig {
    pub max_comments: usize,
    pub pacing_delay_ms: u64,
    pub temperature: f32,
    pub summary_max_tokens: u32,
    pub classify_max_tokens: u32,
}

impl AnnotateConfig {
    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            max_comments: 10,
            pacing_delay_ms: 500,
            temperature: 0.3,
            summary_max_tokens: 150,
            classify_max_tokens: 200,
        }
    }
}

/// Contents of the optional TOML settings file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileSettings {
    pub output_dir: PathBuf,
    pub flatten: FlattenConfig,
    pub annotate: AnnotateConfig,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            flatten: FlattenConfig::default(),
            annotate: AnnotateConfig::default(),
        }
    }
}

impl FileSettings {
    pub fn from_toml_str(contents: &str) -> Result<Self, CoreError> {
        let settings: FileSettings = toml::from_str(contents).map_err(ConfigError::from)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            }
            .into());
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.flatten.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "flatten.batch_size".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if !(0.0..=2.0).contains(&self.annotate.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "annotate.temperature".to_string(),
                value: self.annotate.temperature.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone)]
pub struct LlmCredentials {
    pub provider: LlmProviderKind,
    pub api_key: String,
    pub model: Option<String>,
}

/// Looks up environment variables; abstracted so tests need not touch the process env.
pub trait EnvSource {
    fn var(&self, name: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

fn require(env: &impl EnvSource, name: &str) -> Result<String, CoreError> {
    env.var(name).ok_or_else(|| {
        ConfigError::MissingEnvironmentVariable {
            var_name: name.to_string(),
        }
        .into()
    })
}

impl RedditCredentials {
    pub fn from_env(env: &impl EnvSource) -> Result<Self, CoreError> {
        let username = env.var("REDDIT_USERNAME");
        let password = env.var("REDDIT_PASSWORD");
        if username.is_some() != password.is_some() {
            return Err(ConfigError::MissingEnvironmentVariable {
                var_name: if username.is_some() {
                    "REDDIT_PASSWORD".to_string()
                } else {
                    "REDDIT_USERNAME".to_string()
                },
            }
            .into());
        }

        Ok(Self {
            client_id: require(env, "REDDIT_CLIENT_ID")?,
            client_secret: require(env, "REDDIT_CLIENT_SECRET")?,
            user_agent: env
                .var("REDDIT_USER_AGENT")
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            username,
            password,
        })
    }
}

impl LlmCredentials {
    pub fn from_env(env: &impl EnvSource) -> Result<Self, CoreError> {
        let provider = match env.var("LLM_PROVIDER").map(|p| p.to_lowercase()) {
            None => {
                if env.var("OPENAI_API_KEY").is_none() && env.var("ANTHROPIC_API_KEY").is_some() {
                    LlmProviderKind::Anthropic
                } else {
                    LlmProviderKind::OpenAi
                }
            }
            Some(p) if p == "openai" => LlmProviderKind::OpenAi,
            Some(p) if p == "anthropic" || p == "claude" => LlmProviderKind::Anthropic,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    field: "LLM_PROVIDER".to_string(),
                    value: other,
                }
                .into())
            }
        };

        let key_var = match provider {
            LlmProviderKind::OpenAi => "OPENAI_API_KEY",
            LlmProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        };

        Ok(Self {
            provider,
            api_key: require(env, key_var)?,
            model: env.var("LLM_MODEL"),
        })
    }
}
