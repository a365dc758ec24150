use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use url::Url;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProviderId {
    Anthropic,
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAi,
}

/// Resolved LLM provider configuration. Selection happens here, at
/// construction time; the rest of the pipeline is provider-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: ProviderId,
    pub url: Url,
    pub api_key: String,
    pub model: String,
}

impl ProviderConfig {
    pub fn anthropic(api_key: impl ToString, model: impl ToString) -> Self {
        Self {
            id: ProviderId::Anthropic,
            url: Url::parse("https://api.anthropic.com").unwrap(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn openai(api_key: impl ToString, model: impl ToString) -> Self {
        Self {
            id: ProviderId::OpenAi,
            url: Url::parse("https://api.openai.com").unwrap(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

/// Configuration for the transport-level retry mechanism of the gateway.
/// Applies to rate limiting only; generation itself is never auto-retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retry_attempts: usize,
    pub min_delay_ms: u64,
    pub backoff_factor: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: 3,
            min_delay_ms: 500,
            backoff_factor: 2,
        }
    }
}

/// Represents the environment in which the service is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// Base folder under which every validation stores its artifacts,
    /// metadata and cached results.
    pub base_upload_folder: PathBuf,
    /// Base URL of the isolated execution service.
    pub sandbox_url: Url,
    /// Per-request timeout for sandbox executions, in seconds.
    pub execution_timeout_secs: u64,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_provider_id_round_trips_through_config_value() {
        let actual: ProviderId = "openai".parse().unwrap();
        assert_eq!(actual, ProviderId::OpenAi);
        assert_eq!(ProviderId::Anthropic.to_string(), "anthropic");
    }

    #[test]
    fn test_default_retry_is_bounded() {
        let fixture = RetryConfig::default();
        assert_eq!(fixture.max_retry_attempts, 3);
    }
}
