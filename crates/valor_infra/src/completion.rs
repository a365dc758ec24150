use valor_app::CompletionService;
use valor_domain::{Conversation, ProviderConfig, Result, RetryConfig};
use valor_provider::Client;

/// Completion service backed by the configured LLM provider.
pub struct ProviderCompletionService {
    client: Client,
}

impl ProviderCompletionService {
    pub fn new(config: ProviderConfig, retry: RetryConfig) -> Result<Self> {
        let client = Client::new(config, retry).map_err(valor_domain::Error::from)?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl CompletionService for ProviderCompletionService {
    async fn complete(&self, conversation: &Conversation) -> Result<String> {
        self.client
            .complete(conversation)
            .await
            .map_err(valor_domain::Error::from)
    }
}
