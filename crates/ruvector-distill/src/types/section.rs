//! Logical sections, relevance results and the final consolidation payload

use serde::{Deserialize, Serialize};

/// Descriptive fields the segmentation call attaches to a section.
/// All optional: collaborators differ in what they return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionMetadata {
    /// Section heading
    pub title: Option<String>,
    /// One-line description
    pub summary: Option<String>,
    /// Key topics covered
    pub topics: Vec<String>,
}

/// A topic-coherent section re-derived from the synthesized narrative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalSection {
    /// Section text
    pub content: String,
    /// Section metadata
    #[serde(default)]
    pub metadata: SectionMetadata,
}

impl LogicalSection {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: SectionMetadata::default(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }

    /// Title for prompts and logs
    pub fn display_title(&self, index: usize) -> String {
        self.metadata
            .title
            .clone()
            .unwrap_or_else(|| format!("Section {}", index + 1))
    }
}

/// A section kept by the relevance filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedSection {
    /// Kept content
    pub content: String,
    /// Title, if the collaborator echoed one back
    #[serde(default)]
    pub title: Option<String>,
}

/// What the relevance collaborator returns: kept sections plus why
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceSelection {
    /// Kept sections, in the order the collaborator returned them
    #[serde(default)]
    pub sections: Vec<SelectedSection>,
    /// Explanation of what was kept and dropped
    #[serde(default)]
    pub reasoning: String,
}

/// A retained section together with the selection rationale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevantSection {
    pub content: String,
    pub reasoning: String,
}

impl RelevanceSelection {
    /// Pair every kept section with the shared rationale
    pub fn into_relevant_sections(self) -> Vec<RelevantSection> {
        let reasoning = self.reasoning;
        self.sections
            .into_iter()
            .map(|s| RelevantSection {
                content: s.content,
                reasoning: reasoning.clone(),
            })
            .collect()
    }
}

/// Final payload submitted for streaming consolidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationRequest {
    /// Relevant, budget-checked section texts
    pub sections: Vec<String>,
    /// What the user wants from the document
    pub user_goal: String,
    /// Document display name
    pub document_name: String,
    /// Declared page count
    pub total_pages: u32,
}

impl ConsolidationRequest {
    /// Total section characters
    pub fn section_chars(&self) -> usize {
        self.sections.iter().map(|s| s.chars().count()).sum()
    }
}
