//! Token estimation, section compression and the section budget checkpoint

use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::providers::LlmProvider;

use super::cancel::CancellationToken;

/// Estimated tokens for `chars` characters: floor(chars / 2.5)
pub fn estimate_tokens(chars: usize) -> usize {
    chars.saturating_mul(2) / 5
}

/// Estimated tokens for a whole section set
pub fn estimate_section_tokens(sections: &[String]) -> usize {
    estimate_tokens(sections.iter().map(|s| s.chars().count()).sum())
}

/// Cut `text` to at most `max_chars` characters on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => text[..byte].to_string(),
        None => text.to_string(),
    }
}

pub struct BudgetEnforcer {
    provider: Arc<dyn LlmProvider>,
    config: PipelineConfig,
}

impl BudgetEnforcer {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &PipelineConfig) -> Self {
        Self {
            provider,
            config: config.clone(),
        }
    }

    /// Compress oversized sections when the set is large, then fail if the
    /// result is still over the section limit
    pub async fn enforce(
        &self,
        sections: Vec<String>,
        goal: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let estimated = estimate_section_tokens(&sections);
        tracing::info!(
            "Relevant sections: {} ({} estimated tokens)",
            sections.len(),
            estimated
        );

        let sections = if estimated > self.config.compression_trigger_tokens {
            self.compress_oversized(sections, goal, cancel).await?
        } else {
            sections
        };

        let estimated = estimate_section_tokens(&sections);
        if estimated > self.config.section_token_limit {
            tracing::error!(
                "Section budget exceeded after compression: {} > {} tokens",
                estimated,
                self.config.section_token_limit
            );
            return Err(Error::BudgetExceeded {
                checkpoint: "sections",
                estimated_tokens: estimated,
                limit: self.config.section_token_limit,
            });
        }

        tracing::info!("Section budget ok: {} estimated tokens", estimated);
        Ok(sections)
    }

    async fn compress_oversized(
        &self,
        sections: Vec<String>,
        goal: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let threshold = self.config.compression_char_threshold;
        let target = self.config.truncation_chars;
        let mut compressed = Vec::with_capacity(sections.len());

        for (i, section) in sections.into_iter().enumerate() {
            let chars = section.chars().count();
            if chars <= threshold {
                compressed.push(section);
                continue;
            }

            tracing::info!("Compressing section {} ({} chars)", i + 1, chars);
            match cancel
                .run(self.provider.compress_section(&section, goal, target))
                .await
            {
                Ok(text) => {
                    tracing::debug!(
                        "Section {} compressed to {} chars",
                        i + 1,
                        text.chars().count()
                    );
                    compressed.push(text);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        "Compression of section {} failed, truncating to {} chars: {}",
                        i + 1,
                        target,
                        e
                    );
                    compressed.push(truncate_chars(&section, target));
                }
            }
        }

        Ok(compressed)
    }
}
