//! Completion client with structured-output support (Gemini, OpenAI).
//!
//! Provides the `ProviderAdapter` trait, `DynProvider` wrapper, middleware chain,
//! model catalog, and `LlmClient` for routing requests by provider.

mod client;
mod gemini;
mod openai;
mod provider;
mod types;

pub use client::*;
pub use gemini::GeminiAdapter;
pub use openai::OpenAiAdapter;
pub use provider::*;
pub use types::*;
