//! Re-derive topic-coherent sections from the combined syntheses

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::generation::SYNTHESIS_DELIMITER;
use crate::providers::LlmProvider;
use crate::types::LogicalSection;

use super::cancel::CancellationToken;

pub struct LogicalSegmentation {
    provider: Arc<dyn LlmProvider>,
}

impl LogicalSegmentation {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Join syntheses with the `---` delimiter
    pub fn combine(syntheses: &[String]) -> String {
        syntheses.join(SYNTHESIS_DELIMITER)
    }

    /// One collaborator call; blank sections are dropped and an empty result
    /// is an error
    pub async fn create_logical_sections(
        &self,
        syntheses: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<LogicalSection>> {
        let combined = Self::combine(syntheses);
        tracing::info!(
            "Segmenting {} syntheses ({} chars) into logical sections",
            syntheses.len(),
            combined.chars().count()
        );

        let sections = cancel
            .run(self.provider.create_logical_sections(&combined))
            .await
            .map_err(|e| Error::stage("segmentation", e))?;

        let returned = sections.len();
        let sections: Vec<LogicalSection> = sections
            .into_iter()
            .filter(|s| !s.content.trim().is_empty())
            .collect();

        if sections.len() < returned {
            tracing::warn!(
                "Dropped {} empty sections from segmentation reply",
                returned - sections.len()
            );
        }
        if sections.is_empty() {
            return Err(Error::stage(
                "segmentation",
                Error::invalid_response("no logical sections returned"),
            ));
        }

        tracing::info!("Created {} logical sections", sections.len());
        Ok(sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;

    #[tokio::test]
    async fn test_combined_input_uses_delimiter() {
        let provider = Arc::new(MockProvider::new());
        let stage = LogicalSegmentation::new(provider.clone());

        let sections = stage
            .create_logical_sections(
                &["first".to_string(), "second".to_string()],
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(
            provider.last_prompt.lock().as_deref(),
            Some("first\n\n---\n\nsecond")
        );
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[1].content, "second");
    }

    #[tokio::test]
    async fn test_blank_sections_dropped() {
        let provider = Arc::new(MockProvider::new().with_sections(vec![
            LogicalSection::new("  "),
            LogicalSection::new("Real content").with_title("Real"),
        ]));
        let stage = LogicalSegmentation::new(provider);

        let sections = stage
            .create_logical_sections(&["x".to_string()], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].metadata.title.as_deref(), Some("Real"));
    }

    #[tokio::test]
    async fn test_empty_result_is_error() {
        let provider = Arc::new(MockProvider::new().with_sections(vec![]));
        let stage = LogicalSegmentation::new(provider);

        let err = stage
            .create_logical_sections(&["x".to_string()], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Stage { stage: "segmentation", .. }));
    }

    #[tokio::test]
    async fn test_collaborator_failure_propagates() {
        let provider = Arc::new(MockProvider::new().failing_segmentation());
        let stage = LogicalSegmentation::new(provider.clone());

        let err = stage
            .create_logical_sections(&["x".to_string()], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Stage { stage: "segmentation", .. }));
        assert_eq!(MockProvider::calls(&provider.segmentation_calls), 1);
    }
}
