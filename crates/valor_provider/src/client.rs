use std::time::Duration;

use tracing::info;
use valor_domain::{Conversation, ProviderConfig, ProviderId, RetryConfig};

use crate::{anthropic, openai, retry, Error};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Provider-agnostic completion client. The backend is fixed at
/// construction from the provider configuration; callers only ever see
/// `complete`. The client is stateless between calls — the full conversation
/// history is passed in every time.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    config: ProviderConfig,
    retry: RetryConfig,
}

impl Client {
    pub fn new(config: ProviderConfig, retry: RetryConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| Error::Unavailable(error.to_string()))?;

        Ok(Self {
            http,
            config,
            retry,
        })
    }

    pub fn provider_id(&self) -> ProviderId {
        self.config.id
    }

    /// Sends the conversation and returns the next assistant message as
    /// plain text. Rate limiting is retried with bounded backoff; any other
    /// failure surfaces immediately.
    pub async fn complete(&self, conversation: &Conversation) -> Result<String, Error> {
        info!(provider = %self.config.id, messages = conversation.len(), "Requesting completion");

        retry::retry_with_config(&self.retry, || async {
            match self.config.id {
                ProviderId::Anthropic => {
                    anthropic::complete(&self.http, &self.config, conversation).await
                }
                ProviderId::OpenAi => {
                    openai::complete(&self.http, &self.config, conversation).await
                }
            }
        })
        .await
    }
}
