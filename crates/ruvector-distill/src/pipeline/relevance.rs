//! Goal-driven selection of logical sections

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::types::{LogicalSection, RelevanceSelection};

use super::cancel::CancellationToken;

pub struct RelevanceFilter {
    provider: Arc<dyn LlmProvider>,
}

impl RelevanceFilter {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    /// Full selection, including the collaborator's reasoning
    pub async fn select(
        &self,
        sections: &[LogicalSection],
        goal: &str,
        cancel: &CancellationToken,
    ) -> Result<RelevanceSelection> {
        tracing::info!(
            "Filtering {} sections for goal: \"{}\"",
            sections.len(),
            goal
        );

        let selection = cancel
            .run(self.provider.filter_relevant_sections(sections, goal))
            .await
            .map_err(|e| Error::stage("relevance filtering", e))?;

        tracing::info!(
            "Kept {} of {} sections ({})",
            selection.sections.len(),
            sections.len(),
            selection.reasoning
        );

        if selection.sections.is_empty() {
            return Err(Error::NoRelevantContent(goal.to_string()));
        }
        Ok(selection)
    }

    /// Retained section texts, in the order the collaborator returned them
    pub async fn filter_relevant_sections(
        &self,
        sections: &[LogicalSection],
        goal: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let selection = self.select(sections, goal, cancel).await?;
        Ok(selection
            .into_relevant_sections()
            .into_iter()
            .map(|s| s.content)
            .collect())
    }
}
