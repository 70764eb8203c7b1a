//! Reasoning provider abstraction and implementations.
//!
//! Enum dispatch instead of trait objects, since async methods are not
//! dyn-compatible. Remote variants talk HTTP through `reqwest`; the local
//! variants answer in-process.
//!
//! A provider receives the rendered observation text and returns raw text
//! that should contain a JSON decision. It does not validate that text;
//! [`crate::parse`] does.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use holdfast_types::Observation;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::ProviderError;
use crate::heuristic::{SurvivalThresholds, survival_decision};
use crate::parse::render_decision;

/// Instructions sent alongside every observation to remote models.
pub const SYSTEM_PROMPT: &str = "You control one agent in a grid survival simulation. \
You receive the agent's observation as JSON. Reply with exactly one JSON object: \
{\"action\": <move|gather|consume|buy|trade|sleep|work|explore|idle>, ...parameters, \
\"rationale\": <short reason>}. Parameters: move {to: {x, y}}, gather {spawn}, \
consume {item, quantity}, buy {vendor, item, quantity}, trade {partner, give, \
give_quantity, receive, receive_quantity}, work {contract}. Items are food, wood, stone.";

/// Text returned by a provider, with token usage when reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReply {
    /// Raw completion text.
    pub text: String,
    /// Prompt tokens, if the provider reported them.
    pub tokens_in: Option<u32>,
    /// Completion tokens, if the provider reported them.
    pub tokens_out: Option<u32>,
    /// Id of the provider that answered.
    pub provider_id: String,
}

/// A free-form prompt, used by tooling outside the tick loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPrompt {
    /// Prompt text, sent as the single user message.
    pub text: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion budget.
    pub max_tokens: u32,
}

// ---------------------------------------------------------------------------
// Unified provider enum
// ---------------------------------------------------------------------------

/// Something that turns an observation into decision text.
#[derive(Debug)]
pub enum ReasoningProvider {
    /// `OpenAI`-compatible chat completions API.
    OpenAi(OpenAiProvider),
    /// Anthropic Messages API.
    Anthropic(AnthropicProvider),
    /// Local survival heuristic.
    Heuristic(HeuristicProvider),
    /// Pre-recorded replies, for tests and reproducible runs.
    Scripted(ScriptedProvider),
}

impl ReasoningProvider {
    /// Ask for a decision on `observation_text`.
    ///
    /// `timeout` is forwarded to HTTP clients as a request deadline. The
    /// caller still enforces its own deadline around this future.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the call fails or the reply lacks
    /// completion text.
    pub async fn decide(
        &self,
        observation_text: &str,
        timeout: Duration,
    ) -> Result<ProviderReply, ProviderError> {
        match self {
            Self::OpenAi(provider) => {
                provider
                    .complete(SYSTEM_PROMPT, observation_text, provider.sampling(), Some(timeout))
                    .await
            }
            Self::Anthropic(provider) => {
                provider
                    .complete(SYSTEM_PROMPT, observation_text, provider.sampling(), Some(timeout))
                    .await
            }
            Self::Heuristic(provider) => provider.decide(observation_text),
            Self::Scripted(provider) => provider.next().await,
        }
    }

    /// Complete a free-form prompt.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Unsupported`] for the heuristic, otherwise
    /// the same errors as [`Self::decide`].
    pub async fn complete_raw(&self, prompt: &RawPrompt) -> Result<ProviderReply, ProviderError> {
        let sampling = Sampling {
            temperature: prompt.temperature,
            max_tokens: prompt.max_tokens,
        };
        match self {
            Self::OpenAi(provider) => provider.complete("", &prompt.text, sampling, None).await,
            Self::Anthropic(provider) => provider.complete("", &prompt.text, sampling, None).await,
            Self::Heuristic(_) => Err(ProviderError::Unsupported {
                provider: self.id().to_owned(),
                operation: "complete_raw",
            }),
            Self::Scripted(provider) => provider.next().await,
        }
    }

    /// Stable identifier, part of every cache fingerprint.
    pub fn id(&self) -> &str {
        match self {
            Self::OpenAi(provider) => &provider.id,
            Self::Anthropic(provider) => &provider.id,
            Self::Heuristic(_) => HeuristicProvider::ID,
            Self::Scripted(provider) => &provider.id,
        }
    }

    /// Human-readable backend name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OpenAi(_) => "openai-compatible",
            Self::Anthropic(_) => "anthropic",
            Self::Heuristic(_) => "heuristic",
            Self::Scripted(_) => "scripted",
        }
    }
}

/// Build a provider from configuration.
pub fn create_provider(
    config: &ProviderConfig,
    thresholds: SurvivalThresholds,
) -> ReasoningProvider {
    match config.kind {
        ProviderKind::OpenAi => ReasoningProvider::OpenAi(OpenAiProvider::new(config)),
        ProviderKind::Anthropic => ReasoningProvider::Anthropic(AnthropicProvider::new(config)),
        ProviderKind::Heuristic => ReasoningProvider::Heuristic(HeuristicProvider::new(thresholds)),
    }
}

#[derive(Debug, Clone, Copy)]
struct Sampling {
    temperature: f32,
    max_tokens: u32,
}

// ---------------------------------------------------------------------------
// Shared HTTP plumbing
// ---------------------------------------------------------------------------

async fn post_json(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
    timeout: Option<Duration>,
) -> Result<serde_json::Value, ProviderError> {
    let request = match timeout {
        Some(deadline) => request.timeout(deadline),
        None => request,
    };
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(provider, &e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read error body".to_owned());
        return Err(ProviderError::Status {
            provider: provider.to_owned(),
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::MalformedResponse {
            provider: provider.to_owned(),
            detail: format!("body is not JSON: {e}"),
        })
}

fn transport_error(
    provider: &str,
    error: &reqwest::Error,
    timeout: Option<Duration>,
) -> ProviderError {
    if error.is_timeout() {
        let after_ms = timeout
            .and_then(|t| u64::try_from(t.as_millis()).ok())
            .unwrap_or(0);
        return ProviderError::Timeout {
            provider: provider.to_owned(),
            after_ms,
        };
    }
    ProviderError::Transport {
        provider: provider.to_owned(),
        message: error.to_string(),
    }
}

/// Read `usage.<field>` as a token count.
fn usage(json: &serde_json::Value, field: &str) -> Option<u32> {
    json.get("usage")
        .and_then(|u| u.get(field))
        .and_then(serde_json::Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

// ---------------------------------------------------------------------------
// OpenAI-compatible provider
// ---------------------------------------------------------------------------

/// Provider for `OpenAI`-compatible chat completions APIs.
///
/// Works with `OpenAI`, `DeepSeek`, and Ollama endpoints.
/// Sends requests to `{api_url}/chat/completions`.
pub struct OpenAiProvider {
    client: reqwest::Client,
    id: String,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl core::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("id", &self.id)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl OpenAiProvider {
    /// Create a new `OpenAI`-compatible provider.
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            id: format!("openai:{}", config.model),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    const fn sampling(&self) -> Sampling {
        Sampling {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        sampling: Sampling,
        timeout: Option<Duration>,
    ) -> Result<ProviderReply, ProviderError> {
        let url = format!("{}/chat/completions", self.api_url);
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        messages.push(serde_json::json!({"role": "user", "content": user}));

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": sampling.temperature,
            "max_tokens": sampling.max_tokens,
        });

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key));
        let json = post_json(&self.id, request, &body, timeout).await?;

        Ok(ProviderReply {
            text: extract_openai_content(&self.id, &json)?,
            tokens_in: usage(&json, "prompt_tokens"),
            tokens_out: usage(&json, "completion_tokens"),
            provider_id: self.id.clone(),
        })
    }
}

/// Extract the text content from an `OpenAI` chat completions response.
fn extract_openai_content(
    provider: &str,
    json: &serde_json::Value,
) -> Result<String, ProviderError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| ProviderError::MalformedResponse {
            provider: provider.to_owned(),
            detail: "missing choices[0].message.content".to_owned(),
        })
}

// ---------------------------------------------------------------------------
// Anthropic Messages API provider
// ---------------------------------------------------------------------------

/// Provider for the Anthropic Messages API.
///
/// Differs from `OpenAI` in three ways: the `x-api-key` header, a
/// top-level `system` field, and `content[0].text` in the response.
pub struct AnthropicProvider {
    client: reqwest::Client,
    id: String,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl core::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("id", &self.id)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

impl AnthropicProvider {
    /// Create a new Anthropic Messages API provider.
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            id: format!("anthropic:{}", config.model),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    const fn sampling(&self) -> Sampling {
        Sampling {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        sampling: Sampling,
        timeout: Option<Duration>,
    ) -> Result<ProviderReply, ProviderError> {
        let url = format!("{}/messages", self.api_url);
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": sampling.max_tokens,
            "temperature": sampling.temperature,
            "messages": [
                {"role": "user", "content": user}
            ]
        });
        if !system.is_empty()
            && let Some(map) = body.as_object_mut()
        {
            map.insert("system".to_owned(), serde_json::Value::from(system));
        }

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01");
        let json = post_json(&self.id, request, &body, timeout).await?;

        Ok(ProviderReply {
            text: extract_anthropic_content(&self.id, &json)?,
            tokens_in: usage(&json, "input_tokens"),
            tokens_out: usage(&json, "output_tokens"),
            provider_id: self.id.clone(),
        })
    }
}

/// Extract the text content from an Anthropic Messages API response.
fn extract_anthropic_content(
    provider: &str,
    json: &serde_json::Value,
) -> Result<String, ProviderError> {
    json.get("content")
        .and_then(|c| c.get(0))
        .and_then(|b| b.get("text"))
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| ProviderError::MalformedResponse {
            provider: provider.to_owned(),
            detail: "missing content[0].text".to_owned(),
        })
}

// ---------------------------------------------------------------------------
// Heuristic provider
// ---------------------------------------------------------------------------

/// Answers with the survival heuristic, parsing the observation back from
/// its rendered JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicProvider {
    thresholds: SurvivalThresholds,
}

impl HeuristicProvider {
    /// Provider id.
    pub const ID: &'static str = "heuristic";

    /// Create a heuristic provider.
    pub const fn new(thresholds: SurvivalThresholds) -> Self {
        Self { thresholds }
    }

    fn decide(&self, observation_text: &str) -> Result<ProviderReply, ProviderError> {
        let malformed = |detail: String| ProviderError::MalformedResponse {
            provider: Self::ID.to_owned(),
            detail,
        };
        let observation: Observation = serde_json::from_str(observation_text)
            .map_err(|e| malformed(format!("observation is not valid JSON: {e}")))?;
        let decision = survival_decision(&observation, self.thresholds);
        let text = render_decision(&decision).map_err(|e| malformed(e.to_string()))?;
        Ok(ProviderReply {
            text,
            tokens_in: None,
            tokens_out: None,
            provider_id: Self::ID.to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Scripted provider
// ---------------------------------------------------------------------------

/// One pre-recorded provider reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Answer immediately.
    Text(String),
    /// Answer after a delay.
    Delayed {
        /// How long to wait.
        delay: Duration,
        /// What to answer.
        text: String,
    },
    /// Fail with the given error.
    Fail(ProviderError),
}

/// Replays queued replies in order, one per call.
#[derive(Debug)]
pub struct ScriptedProvider {
    id: String,
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: AtomicU64,
}

impl ScriptedProvider {
    /// A provider with the given id and no replies queued.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// A provider preloaded with `replies`.
    pub fn with_replies(
        id: impl Into<String>,
        replies: impl IntoIterator<Item = ScriptedReply>,
    ) -> Self {
        let provider = Self::new(id);
        for reply in replies {
            provider.push(reply);
        }
        provider
    }

    /// Queue another reply. A poisoned queue drops it.
    pub fn push(&self, reply: ScriptedReply) {
        if let Ok(mut queue) = self.replies.lock() {
            queue.push_back(reply);
        }
    }

    /// Number of calls received so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next(&self) -> Result<ProviderReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        let text = match reply {
            None => {
                return Err(ProviderError::Exhausted {
                    provider: self.id.clone(),
                });
            }
            Some(ScriptedReply::Fail(error)) => return Err(error),
            Some(ScriptedReply::Text(text)) => text,
            Some(ScriptedReply::Delayed { delay, text }) => {
                tokio::time::sleep(delay).await;
                text
            }
        };
        Ok(ProviderReply {
            text,
            tokens_in: None,
            tokens_out: None,
            provider_id: self.id.clone(),
        })
    }
}
