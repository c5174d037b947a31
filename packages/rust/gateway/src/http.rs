//! Sync-HTTP generator over an OpenAI-compatible chat-completions API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use presswork_shared::{
    GatewayError, GatewayMode, HttpGatewayConfig, PressworkError, Result, read_api_key,
};

use crate::{GenerateOptions, Generator, truncate_tail};

const USER_AGENT: &str = concat!("Presswork/", env!("CARGO_PKG_VERSION"));
const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
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

/// Generator backed by `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl HttpGenerator {
    pub fn new(base_url: &str, api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| PressworkError::config(format!("invalid gateway base_url '{base_url}': {e}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base
            .join("chat/completions")
            .map_err(|e| PressworkError::config(format!("invalid gateway base_url '{base_url}': {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PressworkError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Build from config, reading the API key from the configured env var.
    pub fn from_config(config: &HttpGatewayConfig) -> Result<Self> {
        let api_key = read_api_key(&config.api_key_env)?;
        Self::new(&config.base_url, api_key, config.model.clone())
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn generate(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> std::result::Result<String, GatewayError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .timeout(opts.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_send_error(e, opts))?;

        let status = response.status();
        debug!(status = %status, "completion response received");

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("generation service rate limited the request");
            return Err(GatewayError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body: truncate_tail(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| classify_send_error(e, opts))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GatewayError::EmptyOutput);
        }
        Ok(text)
    }

    fn mode(&self) -> GatewayMode {
        GatewayMode::SyncHttp
    }
}

fn classify_send_error(e: reqwest::Error, opts: &GenerateOptions) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout {
            after: opts.timeout,
        }
    } else {
        GatewayError::Transport(e.to_string())
    }
}
