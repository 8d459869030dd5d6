use authgate_protocol::ollama::chat::response::ChatResponse;
use authgate_protocol::openai::create_chat_completions::response::{
    ChatCompletionChoice, ChatCompletionObjectType, CreateChatCompletionResponse,
};
use authgate_protocol::openai::create_chat_completions::types::{
    ChatCompletionFinishReason, ChatCompletionResponseMessage, ChatCompletionRole,
    CompletionUsage,
};

pub const COMPLETION_ID_PREFIX: &str = "chatcmpl-";

const UNKNOWN_MODEL: &str = "unknown";
const COMPLETION_ID_HASH_LEN: usize = 16;

/// Convert a non-streaming Ollama chat response into an OpenAI chat completion.
///
/// The backend reports neither a creation time nor token usage, so `created`
/// and every usage counter are zero.
pub fn transform_response(response: &ChatResponse) -> CreateChatCompletionResponse {
    let content = response
        .message
        .as_ref()
        .and_then(|message| message.content.clone())
        .unwrap_or_default();

    CreateChatCompletionResponse {
        id: completion_id(response),
        object: ChatCompletionObjectType::ChatCompletion,
        created: 0,
        model: response
            .model
            .clone()
            .unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
        choices: vec![ChatCompletionChoice {
            index: 0,
            message: ChatCompletionResponseMessage {
                role: ChatCompletionRole::Assistant,
                content,
            },
            finish_reason: ChatCompletionFinishReason::Stop,
        }],
        usage: CompletionUsage::default(),
    }
}

/// Deterministic id derived from the response content.
///
/// Truncated digest; two different responses may collide.
fn completion_id(response: &ChatResponse) -> String {
    let canonical = serde_json::to_vec(response).unwrap_or_default();
    let digest = blake3::hash(&canonical).to_hex();
    format!(
        "{COMPLETION_ID_PREFIX}{}",
        &digest.as_str()[..COMPLETION_ID_HASH_LEN]
    )
}
