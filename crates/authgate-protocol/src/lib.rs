//! Wire types for the two chat dialects the proxy speaks.
//!
//! `openai` is the provider-agnostic shape exposed to callers, `ollama` is the
//! backend's native shape. Both are plain serde types; conversion lives in
//! `authgate-transform`.

pub mod ollama;
pub mod openai;
