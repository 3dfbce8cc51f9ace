//! LLM provider boundary: payload types, the [`LlmProvider`] trait and an
//! OpenAI-compatible chat-completions client.

mod client;

pub use client::{
    ChatClient, Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage,
    DEFAULT_API_BASE,
};
