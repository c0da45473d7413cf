//! OpenAI-compatible streaming chat completions client.
//!
//! Sends `POST {api_base}/chat/completions` with `"stream": true` and
//! decodes the event stream into [`Delta`]s. `api_base` carries the API
//! version, e.g. `https://api.openai.com/v1`. The stream ends at the
//! `[DONE]` sentinel or when the body closes.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::provider::{ChatMessage, CompletionProvider, Delta, DeltaStream, ProviderError};

const DONE_SENTINEL: &str = "[DONE]";

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<ErrorPayload>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

impl OpenAiProvider {
    /// Build a client from configuration. A missing key is allowed; the
    /// upstream rejects the call when it is made.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                config.api_base.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<DeltaStream, ProviderError> {
        let body = CompletionBody {
            model,
            messages,
            stream: true,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status,
                message: error_message(&text),
            });
        }

        debug!(model, messages = messages.len(), "Provider stream opened");

        let mut events = Box::pin(response.bytes_stream().eventsource());
        let deltas = async_stream::stream! {
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(stream_error(e));
                        return;
                    }
                };

                let data = event.data.trim();
                if data.is_empty() {
                    continue;
                }
                if data == DONE_SENTINEL {
                    return;
                }

                let item = parse_chunk(data);
                let failed = item.is_err();
                yield item;
                if failed {
                    return;
                }
            }
        };

        Ok(Box::pin(deltas))
    }
}

/// Decode one `data:` payload into a delta.
///
/// Chunks without choices (usage reports) become empty deltas. An `error`
/// object inside the stream is surfaced as [`ProviderError::Upstream`].
pub fn parse_chunk(data: &str) -> Result<Delta, ProviderError> {
    let payload: ChunkPayload =
        serde_json::from_str(data).map_err(|e| ProviderError::Malformed(e.to_string()))?;

    if let Some(error) = payload.error {
        return Err(ProviderError::Upstream(error.message));
    }

    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content);

    Ok(Delta { content })
}

fn stream_error(err: EventStreamError<reqwest::Error>) -> ProviderError {
    match err {
        EventStreamError::Transport(e) => ProviderError::Transport(e),
        other => ProviderError::Malformed(other.to_string()),
    }
}

/// Prefer the `error.message` field of an OpenAI error body; fall back to the raw text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.message,
        Err(_) => body.trim().to_string(),
    }
}
