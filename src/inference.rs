//! The client side of the hosted vision-language model. The model is reached
//! through an OpenAI-compatible chat-completion API: one user message with the
//! instruction and the image, one short answer back.

use crate::config::Settings;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::debug;

/// Anything that can turn an image into a sentence
#[async_trait]
pub trait Describer: Send + Sync {
    /// Describe the image behind `image_url`, an inline `data:` URL
    async fn describe(&self, image_url: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    /// The trimmed text of the first choice. A choice without content is an
    /// empty description, a response without choices is an error.
    fn into_text(self) -> Result<String> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no choices in completion response"))?;
        Ok(choice
            .message
            .content
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

/// Chat-completion client, built once at startup and shared by all requests
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
    model: String,
    prompt: String,
    temperature: f32,
    max_tokens: u32,
}

impl Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ChatClient {{ endpoint: {:?}, model: {:?}, token: <redacted> }}",
            self.endpoint, self.model
        )
    }
}

impl ChatClient {
    pub fn new(settings: &Settings, token: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .context("failed to build the HTTP client")?;

        Ok(ChatClient {
            http,
            endpoint: format!(
                "{}/chat/completions",
                settings.api_base.trim_end_matches('/')
            ),
            token,
            model: settings.model.clone(),
            prompt: settings.prompt.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    fn request<'a>(&'a self, image_url: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentPart::Text { text: &self.prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: image_url },
                    },
                ],
            }],
        }
    }
}

#[async_trait]
impl Describer for ChatClient {
    async fn describe(&self, image_url: &str) -> Result<String> {
        debug!("sending completion request to {}", self.endpoint);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&self.request(image_url))
            .send()
            .await
            .context("failed to reach the inference API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Error code: {} - {}", status.as_u16(), body);
        }

        let completion: ChatResponse = response
            .json()
            .await
            .context("failed to parse the completion response")?;
        completion.into_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const IMAGE_URL: &str = "data:image/jpeg;base64,/9j/AAAA";

    fn client_for(server: &MockServer) -> ChatClient {
        let settings = Settings {
            api_base: format!("{}/v1/", server.uri()),
            ..Settings::default()
        };
        ChatClient::new(&settings, "test-token".into()).unwrap()
    }

    fn completion(content: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "model": crate::config::MODEL,
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
    }

    #[tokio::test]
    async fn test_describe_sends_single_user_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-token"))
            .and(body_partial_json(json!({
                "model": crate::config::MODEL,
                "temperature": 0.0,
                "max_tokens": 60,
                "messages": [{
                    "role": "user",
                    "content": [
                        { "type": "text", "text": crate::config::PROMPT },
                        { "type": "image_url", "image_url": { "url": IMAGE_URL } }
                    ]
                }]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion(json!("  Un chat sur un canapé.\n"))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let text = client_for(&server).describe(IMAGE_URL).await.unwrap();
        assert_eq!(text, "Un chat sur un canapé.");
    }

    #[tokio::test]
    async fn test_null_content_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!(null))))
            .mount(&server)
            .await;

        let text = client_for(&server).describe(IMAGE_URL).await.unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn test_no_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = client_for(&server).describe(IMAGE_URL).await.unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }

    #[tokio::test]
    async fn test_api_error_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Invalid credentials in Authorization header" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).describe(IMAGE_URL).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Error code: 401"), "{msg}");
        assert!(msg.contains("Invalid credentials"));
    }

    #[tokio::test]
    async fn test_unreachable_api() {
        let settings = Settings {
            api_base: "http://127.0.0.1:9".into(),
            ..Settings::default()
        };
        let client = ChatClient::new(&settings, "test-token".into()).unwrap();
        let err = client.describe(IMAGE_URL).await.unwrap_err();
        assert!(err.to_string().contains("failed to reach"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = ChatClient::new(&Settings::default(), "secret-token".into()).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }
}
