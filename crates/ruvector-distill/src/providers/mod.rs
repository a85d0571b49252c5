//! Collaborator abstraction and its HTTP implementation
//!
//! Stages depend only on the [`LlmProvider`] trait, so any text-generation
//! backend can be plugged in.

pub mod chat;
pub mod llm;

#[cfg(test)]
pub(crate) mod mock;

pub use chat::ChatCompletionsProvider;
pub use llm::{ByteStream, LlmProvider};
