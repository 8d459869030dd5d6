use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// `POST /api/chat` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<JsonValue>,
    pub stream: bool,
    /// Always serialized, even when empty.
    #[serde(default)]
    pub options: ChatOptions,
}

/// Backend tuning knobs. Ollama calls the output token limit `num_predict`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i64>,
}
