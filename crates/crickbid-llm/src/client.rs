// Claude Messages API client using reqwest-eventsource.
//
// Requests are sent with `stream: true`; the Server-Sent Events are folded
// into a single `Completion` once `message_stop` arrives.

use futures_util::StreamExt;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to create event source: {0}")]
    Connect(String),

    #[error("API returned status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Transport(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("stream ended without any content")]
    Empty,
}

/// The assembled text of one streamed response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

// ---------------------------------------------------------------------------
// ClaudeClient
// ---------------------------------------------------------------------------

pub struct ClaudeClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl ClaudeClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send one user message and collect the streamed reply.
    pub async fn complete(
        &self,
        system: &str,
        user_content: &str,
        max_tokens: u32,
    ) -> Result<Completion, ClientError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "stream": true,
            "system": system,
            "messages": [{ "role": "user", "content": user_content }]
        });

        let request = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let mut es = request
            .eventsource()
            .map_err(|e| ClientError::Connect(e.to_string()))?;

        let mut completion = Completion::default();

        while let Some(event) = es.next().await {
            match event {
                Ok(Event::Open) => debug!("SSE connection opened"),
                Ok(Event::Message(msg)) => match msg.event.as_str() {
                    "message_start" => {
                        match parse_input_tokens(&msg.data) {
                            Some(n) => completion.input_tokens = n,
                            None => warn!("failed to parse input_tokens from message_start"),
                        }
                    }
                    "content_block_delta" => {
                        if let Some(text) = parse_delta_text(&msg.data) {
                            completion.text.push_str(&text);
                        }
                    }
                    "message_delta" => {
                        if let Some(n) = parse_output_tokens(&msg.data) {
                            completion.output_tokens = n;
                        }
                    }
                    "message_stop" => {
                        debug!(
                            input_tokens = completion.input_tokens,
                            output_tokens = completion.output_tokens,
                            "message_stop"
                        );
                        es.close();
                        return Ok(completion);
                    }
                    "error" => {
                        es.close();
                        return Err(ClientError::Stream(
                            parse_error_message(&msg.data)
                                .unwrap_or_else(|| "unknown API error".into()),
                        ));
                    }
                    other => debug!(event_type = other, "ignoring SSE event"),
                },
                Err(err) => {
                    warn!(?err, "SSE stream error");
                    es.close();
                    return Err(classify(err));
                }
            }
        }

        if completion.text.is_empty() {
            Err(ClientError::Empty)
        } else {
            Ok(completion)
        }
    }
}

// ---------------------------------------------------------------------------
// SSE JSON parsing helpers
// ---------------------------------------------------------------------------

/// `{ "message": { "usage": { "input_tokens": N } } }`
pub(crate) fn parse_input_tokens(data: &str) -> Option<u32> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("message")?
        .get("usage")?
        .get("input_tokens")?
        .as_u64()
        .map(|n| n as u32)
}

/// `{ "delta": { "type": "text_delta", "text": "..." } }`
pub(crate) fn parse_delta_text(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("delta")?
        .get("text")?
        .as_str()
        .map(|s| s.to_string())
}

/// `{ "usage": { "output_tokens": N } }`
pub(crate) fn parse_output_tokens(data: &str) -> Option<u32> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("usage")?
        .get("output_tokens")?
        .as_u64()
        .map(|n| n as u32)
}

/// `{ "type": "error", "error": { "message": "..." } }`
pub(crate) fn parse_error_message(data: &str) -> Option<String> {
    let v: Value = serde_json::from_str(data).ok()?;
    v.get("error")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

fn classify(err: reqwest_eventsource::Error) -> ClientError {
    match err {
        reqwest_eventsource::Error::InvalidStatusCode(status, _) => {
            ClientError::Status(status.as_u16())
        }
        reqwest_eventsource::Error::Transport(e) => ClientError::Transport(e.to_string()),
        other => ClientError::Stream(other.to_string()),
    }
}
