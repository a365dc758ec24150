use std::path::PathBuf;

use anyhow::Context;
use url::Url;
use valor_domain::{Environment, ProviderConfig, ProviderId, RetryConfig};

const DEFAULT_UPLOAD_FOLDER: &str = "data/uploads";
const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 300;
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4";

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// Resolves the runtime environment from a `.env` file (if present) and
/// process environment variables:
///
/// - `BASE_UPLOAD_FOLDER` — validation store root
/// - `EXECUTION_SERVICE_URL` — execution service base URL (required)
/// - `EXECUTION_TIMEOUT` — per-execution timeout in seconds
/// - `LLM_PROVIDER` — `anthropic` or `openai`
/// - `LLM_API_KEY` — provider credential (required)
/// - `LLM_MODEL`, `LLM_BASE_URL` — optional provider overrides
pub fn load_environment() -> anyhow::Result<Environment> {
    dotenvy::dotenv().ok();

    let base_upload_folder =
        PathBuf::from(var("BASE_UPLOAD_FOLDER").unwrap_or_else(|| DEFAULT_UPLOAD_FOLDER.to_string()));

    let sandbox_url = var("EXECUTION_SERVICE_URL")
        .context("EXECUTION_SERVICE_URL is not set")?
        .parse::<Url>()
        .context("EXECUTION_SERVICE_URL is not a valid URL")?;

    let execution_timeout_secs = match var("EXECUTION_TIMEOUT") {
        Some(value) => value
            .parse::<u64>()
            .context("EXECUTION_TIMEOUT is not a number of seconds")?,
        None => DEFAULT_EXECUTION_TIMEOUT_SECS,
    };

    let provider_id = match var("LLM_PROVIDER") {
        Some(value) => value
            .parse::<ProviderId>()
            .with_context(|| format!("Unsupported LLM provider: {value}"))?,
        None => ProviderId::Anthropic,
    };
    let api_key = var("LLM_API_KEY").context("LLM_API_KEY is not set")?;

    let mut provider = match provider_id {
        ProviderId::Anthropic => ProviderConfig::anthropic(
            api_key,
            var("LLM_MODEL").unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
        ),
        ProviderId::OpenAi => ProviderConfig::openai(
            api_key,
            var("LLM_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
        ),
    };
    if let Some(base_url) = var("LLM_BASE_URL") {
        provider.url = base_url.parse().context("LLM_BASE_URL is not a valid URL")?;
    }

    Ok(Environment {
        base_upload_folder,
        sandbox_url,
        execution_timeout_secs,
        provider,
        retry: RetryConfig::default(),
    })
}
