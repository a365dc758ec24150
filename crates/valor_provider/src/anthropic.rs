use serde::{Deserialize, Serialize};
use tracing::debug;
use valor_domain::{Conversation, ProviderConfig, Role};

use crate::Error;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct Response {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// The messages API takes system content as a top-level field, not as a
/// conversation entry.
fn to_request<'a>(config: &'a ProviderConfig, conversation: &'a Conversation) -> Request<'a> {
    let system: Vec<&str> = conversation
        .messages
        .iter()
        .filter(|message| message.role == Role::System)
        .map(|message| message.content.as_str())
        .collect();

    let messages = conversation
        .messages
        .iter()
        .filter(|message| message.role != Role::System)
        .map(|message| WireMessage {
            role: match message.role {
                Role::Assistant => "assistant",
                _ => "user",
            },
            content: &message.content,
        })
        .collect();

    Request {
        model: &config.model,
        max_tokens: MAX_TOKENS,
        temperature: 0.2,
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        messages,
    }
}

pub async fn complete(
    http: &reqwest::Client,
    config: &ProviderConfig,
    conversation: &Conversation,
) -> Result<String, Error> {
    let url = config
        .url
        .join("v1/messages")
        .map_err(|error| Error::Unavailable(error.to_string()))?;
    debug!(%url, model = %config.model, messages = conversation.len(), "Anthropic completion");

    let response = http
        .post(url)
        .header("x-api-key", &config.api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&to_request(config, conversation))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::from_status(status, body));
    }

    let response: Response = response
        .json()
        .await
        .map_err(|error| Error::MalformedResponse(error.to_string()))?;

    let text: String = response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(Error::MalformedResponse(
            "response carries no text content".to_string(),
        ));
    }

    Ok(text)
}
