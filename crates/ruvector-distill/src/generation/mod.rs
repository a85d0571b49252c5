//! Prompt construction and reply parsing

pub mod prompt;
pub mod response;

pub use prompt::{PromptBuilder, SYNTHESIS_DELIMITER};
