//! HTTP generation backend: OpenAI-compatible chat completions.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::BackendSettings;
use crate::error::BackendError;

use super::{GenerationBackend, GenerationRequest, StreamReceiver};

const STREAM_CHANNEL_CAPACITY: usize = 100;

/// Request body for chat completions (OpenAI format).
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

/// Response: choices[0].message.content.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// One SSE chunk of a streamed completion.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for one chat-completions endpoint.
pub struct HttpBackend {
    client: reqwest::Client,
    name: String,
    inference_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpBackend {
    /// Build a backend from its settings, resolving the API key.
    #[must_use]
    pub fn from_settings(settings: &BackendSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            name: settings.name.clone(),
            inference_url: settings.inference_url.clone(),
            model: settings.model.clone(),
            api_key: settings.resolve_api_key(),
        }
    }

    fn wire_messages(request: &GenerationRequest) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(request.prior_turns.len() + 2);
        messages.push(WireMessage {
            role: "system".to_string(),
            content: request.system_prompt.clone(),
        });
        for turn in &request.prior_turns {
            messages.push(WireMessage {
                role: turn.role.clone(),
                content: turn.content.clone(),
            });
        }
        messages.push(WireMessage {
            role: "user".to_string(),
            content: request.user_prompt.clone(),
        });
        messages
    }

    async fn post_completion(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: Self::wire_messages(request),
            stream: stream.then_some(true),
        };
        let mut req = self
            .client
            .post(&self.inference_url)
            .json(&body)
            .header("Content-Type", "application/json");
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }
        let res = req
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let status = res.status();
        if !status.is_success() {
            let body = res
                .text()
                .await
                .unwrap_or_else(|e| format!("(unreadable body: {e})"));
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(res)
    }

    async fn completion_content(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let res = self.post_completion(request, false).await?;
        let text = res
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| BackendError::MalformedOutput {
                reason: format!("response parse error: {e}; body: {text}"),
            })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(BackendError::EmptyResponse)
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    async fn generate_text(&self, request: GenerationRequest) -> Result<String, BackendError> {
        let content = self.completion_content(&request).await?;
        tracing::debug!(
            backend = %self.name,
            prompt_chars = request.user_prompt.chars().count(),
            reply_chars = content.chars().count(),
            "text generation completed"
        );
        Ok(content)
    }

    async fn generate_json(
        &self,
        request: GenerationRequest,
    ) -> Result<serde_json::Value, BackendError> {
        let content = self.completion_content(&request).await?;
        let stripped = strip_code_fences(&content);
        serde_json::from_str(stripped).map_err(|e| BackendError::MalformedOutput {
            reason: format!("expected JSON object, got parse error: {e}"),
        })
    }

    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<StreamReceiver, BackendError> {
        let res = self.post_completion(&request, true).await?;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            let mut stream = res.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(BackendError::Stream {
                                reason: e.to_string(),
                            }))
                            .await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return;
                    }
                    let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) else {
                        continue;
                    };
                    let Some(content) = parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|choice| choice.delta.content)
                    else {
                        continue;
                    };
                    if !content.is_empty() && tx.send(Ok(content)).await.is_err() {
                        return;
                    }
                }
            }
        });
        Ok(rx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Tolerate backends that wrap JSON answers in markdown code fences.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::strip_code_fences;

    #[test]
    fn strip_code_fences_passes_plain_json() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn strip_code_fences_unwraps_fenced_json() {
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
    }
}
