use serde::{Deserialize, Serialize};
use tracing::debug;
use valor_domain::{Conversation, ProviderConfig, Role};

use crate::Error;

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    temperature: f32,
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
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn to_request<'a>(config: &'a ProviderConfig, conversation: &'a Conversation) -> Request<'a> {
    let messages = conversation
        .messages
        .iter()
        .map(|message| WireMessage {
            role: match message.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &message.content,
        })
        .collect();

    Request {
        model: &config.model,
        temperature: 0.2,
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
        .join("v1/chat/completions")
        .map_err(|error| Error::Unavailable(error.to_string()))?;
    debug!(%url, model = %config.model, messages = conversation.len(), "OpenAI completion");

    let response = http
        .post(url)
        .bearer_auth(&config.api_key)
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

    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(Error::MalformedResponse(
            "response carries no assistant content".to_string(),
        ));
    }

    Ok(text)
}
