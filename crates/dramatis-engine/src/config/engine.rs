//! Engine configuration: backend endpoints, compression trigger, window sizing.

use serde::{Deserialize, Serialize};

/// One generation backend endpoint (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Display name for logging ("primary", "backup", or a vendor name).
    pub name: String,
    /// Chat completions endpoint (e.g. `https://api.openai.com/v1/chat/completions`).
    pub inference_url: String,
    /// Model id (e.g. `gpt-4o-mini`, `claude-3-5-sonnet`).
    pub model: String,
    /// API key; if None, read from env depending on URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl BackendSettings {
    /// Resolve API key: config value, or env (OPENAI_API_KEY / ANTHROPIC_API_KEY).
    /// Local endpoints (127.0.0.1 / localhost) get no key; a local proxy holds
    /// the real key and forwards upstream.
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(ref k) = self.api_key {
            return Some(k.clone());
        }
        if self.inference_url.contains("127.0.0.1") || self.inference_url.contains("localhost") {
            return None;
        }
        if self.inference_url.contains("anthropic") || self.inference_url.contains("claude") {
            return std::env::var("ANTHROPIC_API_KEY").ok();
        }
        std::env::var("OPENAI_API_KEY").ok()
    }
}

/// Turn engine config: two backends plus the bounded-memory knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Backend tried first for every generation call.
    pub primary: BackendSettings,
    /// Backend retried on any primary failure.
    pub backup: BackendSettings,
    /// Compress history once this many fragments sit past the last summary's
    /// end offset (10 compression-eligible exchanges of 3 fragments each).
    #[serde(default = "default_compression_threshold_fragments")]
    pub compression_threshold_fragments: u64,
    /// Conversation-kind fragments sent as prior turns with each call.
    #[serde(default = "default_prior_turns_window")]
    pub prior_turns_window: usize,
    /// Fragments kept in the window after a compression pass; everything
    /// older is carried by the summary.
    #[serde(default = "default_window_keep_after_compression")]
    pub window_keep_after_compression: usize,
    /// Log tail over-fetched into the window on session load.
    #[serde(default = "default_window_overfetch_fragments")]
    pub window_overfetch_fragments: usize,
    /// Deadline per generation call, in seconds. A timeout counts as a
    /// failure for failover purposes.
    #[serde(default = "default_generation_deadline_secs")]
    pub generation_deadline_secs: u64,
}

fn default_compression_threshold_fragments() -> u64 {
    30
}

fn default_prior_turns_window() -> usize {
    30
}

fn default_window_keep_after_compression() -> usize {
    3
}

fn default_window_overfetch_fragments() -> usize {
    200
}

fn default_generation_deadline_secs() -> u64 {
    120
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            primary: BackendSettings {
                name: "primary".to_string(),
                inference_url: "https://api.openai.com/v1/chat/completions".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key: None,
            },
            backup: BackendSettings {
                name: "backup".to_string(),
                inference_url: "https://api.anthropic.com/v1/chat/completions".to_string(),
                model: "claude-3-5-haiku".to_string(),
                api_key: None,
            },
            compression_threshold_fragments: default_compression_threshold_fragments(),
            prior_turns_window: default_prior_turns_window(),
            window_keep_after_compression: default_window_keep_after_compression(),
            window_overfetch_fragments: default_window_overfetch_fragments(),
            generation_deadline_secs: default_generation_deadline_secs(),
        }
    }
}
