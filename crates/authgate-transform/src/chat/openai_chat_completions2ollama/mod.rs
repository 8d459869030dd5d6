//! OpenAI chat-completions in front, Ollama `/api/chat` behind.
//!
//! `request` maps the caller's payload onto the backend, `response` maps the
//! backend's answer back. The byte-level helpers here are what the proxy engine
//! calls; a deserialization failure is returned to the caller so it can fall
//! back to relaying the untouched bytes.

pub mod request;
pub mod response;

use authgate_protocol::ollama::chat::response::ChatResponse;
use authgate_protocol::openai::create_chat_completions::request::CreateChatCompletionRequest;

pub use request::transform_request;
pub use response::transform_response;

/// Parse an OpenAI chat request body and re-encode it as an Ollama chat body.
pub fn transform_request_body(body: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
    let request: CreateChatCompletionRequest = serde_json::from_slice(body)?;
    serde_json::to_vec(&transform_request(request))
}

/// Parse an Ollama chat response body and re-encode it as an OpenAI chat completion.
pub fn transform_response_body(body: &[u8]) -> Result<Vec<u8>, serde_json::Error> {
    let response: ChatResponse = serde_json::from_slice(body)?;
    serde_json::to_vec(&transform_response(&response))
}

#[cfg(test)]
mod tests {
    use serde_json::{Value as JsonValue, json};

    use super::*;

    #[test]
    fn request_body_round_trips_through_json() {
        let body = json!({
            "model": "mistral",
            "messages": [{"role": "system", "content": "be brief"}],
            "stream": true,
            "max_tokens": 32
        });
        let out = transform_request_body(body.to_string().as_bytes()).unwrap();
        let out: JsonValue = serde_json::from_slice(&out).unwrap();
        assert_eq!(
            out,
            json!({
                "model": "mistral",
                "messages": [{"role": "system", "content": "be brief"}],
                "stream": true,
                "options": {"num_predict": 32}
            })
        );
    }

    #[test]
    fn request_body_rejects_non_json() {
        assert!(transform_request_body(b"not json at all").is_err());
    }

    #[test]
    fn request_body_rejects_json_that_is_not_an_object() {
        assert!(transform_request_body(b"[1, 2, 3]").is_err());
    }

    #[test]
    fn response_body_rejects_non_json() {
        assert!(transform_response_body(b"{\"model\": ").is_err());
    }

    #[test]
    fn response_body_maps_content() {
        let body = json!({
            "model": "llama3",
            "message": {"role": "assistant", "content": "pong"},
            "done": true,
            "eval_count": 12
        });
        let out = transform_response_body(body.to_string().as_bytes()).unwrap();
        let out: JsonValue = serde_json::from_slice(&out).unwrap();
        assert_eq!(out["object"], "chat.completion");
        assert_eq!(out["model"], "llama3");
        assert_eq!(out["choices"][0]["message"]["content"], "pong");
        assert_eq!(out["usage"]["completion_tokens"], 0);
    }
}
