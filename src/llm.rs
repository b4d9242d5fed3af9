//! # LLM clients
//!
//! A small provider-agnostic seam over hosted chat-completion APIs. The fallback
//! path only needs one operation, [`LlmClient::generate_response`]: send the prior
//! turns plus the new user prompt and get a single text reply back.
//!
//! Two providers are implemented:
//!
//! - [`AnthropicClient`] talks to the Anthropic Messages API with `reqwest`.
//!   System turns are lifted into the request's top-level `system` field.
//! - [`OpenAiClient`] talks to any OpenAI-compatible endpoint through
//!   `async-openai`.
//!
//! When a provider has no API key, the client still constructs (with a warning)
//! and answers every request with [`NOT_CONFIGURED_REPLY`] instead of calling the
//! network. Transport and HTTP failures are returned as errors.
//!
//! ```no_run
//! use bizbot::config::LlmSettings;
//! use bizbot::context::Turn;
//! use bizbot::llm::get_llm_client;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let client = get_llm_client(&LlmSettings::default(), None);
//! let reply = client
//!     .generate_response("Do you ship abroad?", &[Turn::system("You work for a shop.")])
//!     .await?;
//! println!("{reply}");
//! # Ok(()) }
//! ```

use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt, time::Duration};
use tracing::{debug, warn};

use crate::config::LlmSettings;
use crate::context::{Role, Turn};

/// Result type used across the async client boundary.
pub type LlmResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Returned instead of a model reply when the selected provider has no API key.
pub const NOT_CONFIGURED_REPLY: &str = "LLM integration not configured. Please set the API key.";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Upstream chat-completion provider.
///
/// Deserializes through [`Provider::from_name`], so config files accept any case
/// and fall back to Anthropic on unknown names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Provider {
    #[default]
    Anthropic,
    OpenAi,
}

impl From<String> for Provider {
    fn from(name: String) -> Self {
        Provider::from_name(&name)
    }
}

impl Provider {
    /// Parse a provider name case-insensitively.
    ///
    /// Unknown names log a warning and select [`Provider::Anthropic`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Provider::Anthropic,
            "openai" | "open_ai" => Provider::OpenAi,
            other => {
                warn!("Unknown LLM provider: {other}. Using Anthropic as default.");
                Provider::Anthropic
            }
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Anthropic => write!(f, "anthropic"),
            Provider::OpenAi => write!(f, "openai"),
        }
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    /// Generate a reply to `prompt`, sending `context` (oldest first) before it.
    async fn generate_response(&self, prompt: &str, context: &[Turn]) -> LlmResult<String>;
}

/// Build the client for `provider`, or for `settings.default_provider` when `None`.
pub fn get_llm_client(settings: &LlmSettings, provider: Option<Provider>) -> Box<dyn LlmClient> {
    match provider.unwrap_or(settings.default_provider) {
        Provider::Anthropic => Box::new(AnthropicClient::from_settings(settings)),
        Provider::OpenAi => Box::new(OpenAiClient::from_settings(settings)),
    }
}

fn usable_key(key: Option<&String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl AnthropicClient {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let api_key = usable_key(settings.anthropic_api_key.as_ref());
        if api_key.is_none() {
            warn!(
                "Anthropic API key not found! Please set the ANTHROPIC_API_KEY environment variable."
            );
        }

        Self {
            http: reqwest::Client::new(),
            api_key,
            api_url: settings.anthropic_api_url.clone(),
            model: settings.anthropic_model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }

    fn build_request<'a>(&'a self, prompt: &'a str, context: &'a [Turn]) -> MessagesRequest<'a> {
        let system_prompts: Vec<&str> = context
            .iter()
            .filter(|turn| turn.role == Role::System)
            .map(|turn| turn.content.as_str())
            .collect();

        let mut messages: Vec<AnthropicMessage> = context
            .iter()
            .filter(|turn| turn.role != Role::System)
            .map(|turn| AnthropicMessage {
                role: turn.role.as_str(),
                content: &turn.content,
            })
            .collect();
        messages.push(AnthropicMessage {
            role: Role::User.as_str(),
            content: prompt,
        });

        MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages,
            system: (!system_prompts.is_empty()).then(|| system_prompts.join("\n\n")),
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate_response(&self, prompt: &str, context: &[Turn]) -> LlmResult<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(NOT_CONFIGURED_REPLY.to_string());
        };

        let request = self.build_request(prompt, context);
        debug!("Sending Anthropic request: {:?}", request);

        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Anthropic API error ({status}): {body}").into());
        }

        let body: MessagesResponse = response.json().await?;
        body.content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| "Anthropic response contained no text block".into())
    }
}

/// Client for OpenAI-compatible chat-completion APIs.
pub struct OpenAiClient {
    client: Option<Client<OpenAIConfig>>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiClient {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let client = match usable_key(settings.openai_api_key.as_ref()) {
            Some(api_key) => {
                let openai_config = OpenAIConfig::new()
                    .with_api_key(api_key)
                    .with_api_base(settings.openai_api_base.clone());
                Some(Client::with_config(openai_config))
            }
            None => {
                warn!(
                    "OpenAI API key not found! Please set the OPENAI_API_KEY environment variable."
                );
                None
            }
        };

        Self {
            client,
            model: settings.openai_model.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }
}

fn to_request_message(turn: &Turn) -> Result<ChatCompletionRequestMessage, OpenAIError> {
    let content = turn.content.clone();
    Ok(match turn.role {
        Role::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::User => ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()?
            .into(),
        Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(content)
            .build()?
            .into(),
    })
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    #[allow(deprecated)]
    async fn generate_response(&self, prompt: &str, context: &[Turn]) -> LlmResult<String> {
        let Some(client) = self.client.as_ref() else {
            return Ok(NOT_CONFIGURED_REPLY.to_string());
        };

        let mut messages = context
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>, _>>()?;
        messages.push(to_request_message(&Turn::user(prompt))?);

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.clone())
            .messages(messages)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .build()?;

        debug!("Sending OpenAI request: {:?}", request);

        let response = client.chat().create(request).await?;

        response
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| "OpenAI response contained no message content".into())
    }
}

/// Test double that replays canned replies and records every request.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    pub(crate) type RecordedRequests = Arc<Mutex<Vec<(String, Vec<Turn>)>>>;

    pub(crate) struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, String>>>,
        requests: RecordedRequests,
    }

    impl ScriptedClient {
        pub(crate) fn new(replies: Vec<Result<&str, &str>>) -> (Self, RecordedRequests) {
            let requests = RecordedRequests::default();
            let client = Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                requests: Arc::clone(&requests),
            };
            (client, requests)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn provider(&self) -> Provider {
            Provider::Anthropic
        }

        async fn generate_response(&self, prompt: &str, context: &[Turn]) -> LlmResult<String> {
            self.requests
                .lock()
                .unwrap()
                .push((prompt.to_string(), context.to_vec()));
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(err)) => Err(err.into()),
                None => Err("no scripted reply left".into()),
            }
        }
    }
}
