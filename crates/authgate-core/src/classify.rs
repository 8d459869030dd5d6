/// Caller-facing path of the OpenAI-compatible chat endpoint, version prefix removed.
pub const CHAT_COMPLETIONS_PATH: &str = "chat/completions";
/// Backend endpoint every chat-completions request is sent to.
pub const OLLAMA_CHAT_PATH: &str = "/api/chat";

const VERSION_PREFIX: &str = "v1/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    /// Path on the backend, always starting with `/`.
    pub target_path: String,
    /// Whether the payloads need rewriting between the two chat dialects.
    pub transform: bool,
}

impl RouteDecision {
    /// Absolute backend URL. The query string is appended untouched.
    pub fn target_url(&self, backend_base: &str, query: Option<&str>) -> String {
        let base = backend_base.trim_end_matches('/');
        match query.filter(|query| !query.is_empty()) {
            Some(query) => format!("{base}{}?{query}", self.target_path),
            None => format!("{base}{}", self.target_path),
        }
    }
}

/// Decide where an inbound path goes.
///
/// A single leading `v1/` is dropped. What remains is either the chat
/// completions route, which maps to the backend's native chat endpoint, or
/// anything else, which is forwarded as-is.
pub fn classify_path(path: &str) -> RouteDecision {
    let path = path.trim_start_matches('/');
    let path = path.strip_prefix(VERSION_PREFIX).unwrap_or(path);

    if path == CHAT_COMPLETIONS_PATH {
        return RouteDecision {
            target_path: OLLAMA_CHAT_PATH.to_string(),
            transform: true,
        };
    }

    RouteDecision {
        target_path: format!("/{path}"),
        transform: false,
    }
}
