//! Chat completion client.
//!
//! Agents talk to the model only through [`Completer`], so tests and other
//! providers can stand in for the HTTP client.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::types::{ChatMessage, CompletionRequest};
use crate::io::config::CompletionConfig;

/// Produces the text of the top completion choice for a request.
///
/// Treat implementations as non-deterministic: the same request may yield
/// different replies.
pub trait Completer {
    fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
pub struct ChatCompletionClient {
    client: Client,
    url: String,
    model: String,
    api_key: String,
}

impl ChatCompletionClient {
    /// Build a client, reading the bearer credential from `config.api_key_env`.
    pub fn from_env(config: &CompletionConfig) -> Result<Self> {
        let api_key = env::var(&config.api_key_env)
            .map_err(|_| anyhow!("missing completion api key (set {})", config.api_key_env))?;
        Self::new(config, api_key)
    }

    pub fn new(config: &CompletionConfig, api_key: String) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(anyhow!("completion api key must be non-empty"));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("build completion http client")?;
        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            api_key,
        })
    }
}

impl Completer for ChatCompletionClient {
    #[instrument(skip_all, fields(model = %self.model, temperature = request.temperature))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        info!(prompt_len = request.prompt().len(), "requesting completion");
        let body = ChatCompletionsRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .context("send completion request")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            warn!(%status, "completion request failed");
            return Err(anyhow!("completion error {status}: {}", text.trim()));
        }

        let text = response.text().context("read completion response")?;
        let content = parse_first_choice(&text)?;
        debug!(reply_len = content.len(), "completion received");
        Ok(content)
    }
}

fn parse_first_choice(body: &str) -> Result<String> {
    let parsed: ChatCompletionsResponse =
        serde_json::from_str(body).context("parse completion response")?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("completion response has no choices"))?;
    Ok(choice.message.content.unwrap_or_default())
}
