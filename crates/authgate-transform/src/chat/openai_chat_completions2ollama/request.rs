use authgate_protocol::ollama::chat::request::{ChatOptions, ChatRequest};
use authgate_protocol::openai::create_chat_completions::request::CreateChatCompletionRequest;

/// Model used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "llama2";

/// Convert an OpenAI chat-completions request into an Ollama chat request.
///
/// `max_tokens` becomes `options.num_predict`; fields the backend has no
/// counterpart for are dropped.
pub fn transform_request(request: CreateChatCompletionRequest) -> ChatRequest {
    ChatRequest {
        model: request.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        messages: request.messages.unwrap_or_default(),
        stream: request.stream.unwrap_or(false),
        options: ChatOptions {
            temperature: request.temperature,
            num_predict: request.max_tokens,
        },
    }
}
