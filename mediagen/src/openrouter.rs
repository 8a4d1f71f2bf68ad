use color_eyre::{
    Result,
    eyre::{WrapErr as _, bail},
};
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::MediaGenError;

pub const MAX_TOKENS: usize = 4096;

/// Non-streaming client for OpenRouter's chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenRouter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenRouter {
    pub fn new(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Sends `req` and returns the first choice's message.
    pub async fn complete(&self, req: &ChatRequest) -> Result<ChatCompletion> {
        let resp = self
            .client
            .post(format!("{}/api/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await
            .wrap_err("sending chat completion request")?;

        let status = resp.status();
        let body = resp.text().await?;
        debug!("OpenRouter response {status}: {body}");

        parse_completion(&body)
    }
}

/// Interprets a chat completion body. An `error` object wins over the status
/// code, as does a body without choices.
pub fn parse_completion(body: &str) -> Result<ChatCompletion> {
    let response: ChatResponse = serde_json::from_str(body).map_err(|e| {
        let head: String = body.chars().take(500).collect();
        MediaGenError::parse_failed(format!("{e}; raw response: {head}"))
    })?;

    if let Some(error) = response.error {
        let message = error["message"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        bail!(MediaGenError::Api { message });
    }

    let Some(choice) = response.choices.into_iter().next() else {
        bail!(MediaGenError::parse_failed(format!(
            "response contained no choices: {body}"
        )));
    };

    Ok(ChatCompletion {
        message: choice.message,
        usage: response.usage,
    })
}

#[derive(Debug)]
pub struct ChatCompletion {
    pub message: ResponseMessage,
    pub usage: Option<Usage>,
}

//
// ===== wire types =====
//

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<&'static str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<ImageConfig>,
    pub max_tokens: usize,
}

#[derive(Debug, Serialize)]
pub struct ImageConfig {
    pub aspect_ratio: String,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: MessageContent) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseMessage {
    /// Plain text, or a list of typed parts for multimodal replies.
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub images: Vec<Value>,
}

impl ResponseMessage {
    /// Text of the reply; text parts are joined when the content is a list.
    pub fn text(&self) -> Option<String> {
        match self.content.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Array(parts) => {
                let text: Vec<&str> = parts
                    .iter()
                    .filter(|p| p["type"] == "text")
                    .filter_map(|p| p["text"].as_str())
                    .collect();
                (!text.is_empty()).then(|| text.join("\n"))
            }
            _ => None,
        }
    }

    /// `image_url` parts of the `images` list, with their position in it.
    pub fn image_urls(&self) -> Vec<(usize, &str)> {
        image_part_urls(&self.images)
    }

    /// `image_url` parts of a list-shaped `content`, with their position in it.
    pub fn content_image_urls(&self) -> Vec<(usize, &str)> {
        match &self.content {
            Some(Value::Array(parts)) => image_part_urls(parts),
            _ => vec![],
        }
    }
}

fn image_part_urls(parts: &[Value]) -> Vec<(usize, &str)> {
    parts
        .iter()
        .enumerate()
        .filter(|(_, p)| p["type"] == "image_url")
        .filter_map(|(i, p)| p["image_url"]["url"].as_str().map(|url| (i, url)))
        .collect()
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}
