//! Wire payloads for the OpenRouter HTTP API.
//!
//! These types mirror the gateway's `/models` and `/chat/completions`
//! envelopes. Streaming and non-streaming completions share one response
//! shape: blocking calls populate `message`, streamed chunks populate
//! `delta`.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Deserialize, Debug)]
pub struct ChatResponseMessage {
    pub role: Option<String>,
    pub content: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub message: Option<ChatResponseMessage>,
    #[serde(default)]
    pub delta: Option<ChatResponseMessage>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Deserialize, Debug)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

impl ChatResponse {
    /// Content of the first choice, whether it arrived as a full message or
    /// a streamed delta.
    pub fn first_content(&self) -> Option<&str> {
        let choice = self.choices.first()?;
        choice
            .message
            .as_ref()
            .or(choice.delta.as_ref())
            .and_then(|m| m.content.as_deref())
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct Modalities {
    #[serde(default)]
    pub input: Option<Vec<String>>,
    #[serde(default)]
    pub output: Option<Vec<String>>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Architecture {
    #[serde(default)]
    pub tokenizer: Option<String>,
    #[serde(default)]
    pub instruction_type: Option<String>,
    #[serde(default)]
    pub modalities: Option<Modalities>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct Pricing {
    pub prompt: String,
    pub completion: String,
}

impl Pricing {
    pub fn prompt_cost_per_million(&self) -> f64 {
        self.prompt.parse::<f64>().unwrap_or(0.0) * 1_000_000.0
    }

    pub fn completion_cost_per_million(&self) -> f64 {
        self.completion.parse::<f64>().unwrap_or(0.0) * 1_000_000.0
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context_length: Option<u64>,
    #[serde(default)]
    pub pricing: Option<Pricing>,
    #[serde(default)]
    pub architecture: Option<Architecture>,
}

impl ModelInfo {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// The provider prefix of a namespaced model id (`anthropic/claude-...`).
    pub fn provider_name(&self) -> &str {
        self.id.split('/').next().unwrap_or("unknown")
    }

    pub fn model_name(&self) -> &str {
        match self.id.split_once('/') {
            Some((_, rest)) => rest,
            None => &self.id,
        }
    }

    /// A model is text-capable when its declared input and output modalities
    /// both include `"text"`. Models that declare nothing are assumed to be
    /// text-capable.
    pub fn supports_text(&self) -> bool {
        let Some(modalities) = self
            .architecture
            .as_ref()
            .and_then(|a| a.modalities.as_ref())
        else {
            return true;
        };
        let has = |side: &Option<Vec<String>>| {
            side.as_ref()
                .map(|m| m.iter().any(|s| s == "text"))
                .unwrap_or(true)
        };
        has(&modalities.input) && has(&modalities.output)
    }
}

#[derive(Deserialize, Debug)]
pub struct ModelsResponse {
    pub data: Vec<ModelInfo>,
}

#[derive(Deserialize, Debug)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
}

#[derive(Deserialize, Debug)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}
