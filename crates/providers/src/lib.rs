//! LLM provider implementations for thinkloop.
//!
//! All providers implement the `thinkloop_core::Provider` trait. The agent
//! loop only sees the trait; the binary picks the implementation.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
