//! Parsing of structured (JSON) collaborator replies

use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::types::{LogicalSection, RelevanceSelection};

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("static regex is valid")
    })
}

/// Strip a markdown code fence, if the model wrapped its JSON in one
pub fn extract_json_block(text: &str) -> &str {
    match fence_regex().captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => text.trim(),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SectionsReply {
    Wrapped { sections: Vec<LogicalSection> },
    Bare(Vec<LogicalSection>),
}

/// Parse a segmentation reply: `{"sections": [...]}` or a bare array
pub fn parse_sections(text: &str) -> Result<Vec<LogicalSection>> {
    let json = extract_json_block(text);
    let reply: SectionsReply = serde_json::from_str(json)
        .map_err(|e| {
            Error::invalid_response(format!("segmentation reply is not valid JSON: {}", e))
        })?;

    Ok(match reply {
        SectionsReply::Wrapped { sections } => sections,
        SectionsReply::Bare(sections) => sections,
    })
}

/// Parse a relevance reply: `{"sections": [...], "reasoning": "..."}`
pub fn parse_relevance(text: &str) -> Result<RelevanceSelection> {
    let json = extract_json_block(text);
    serde_json::from_str(json)
        .map_err(|e| Error::invalid_response(format!("relevance reply is not valid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(extract_json_block(text), "{\"a\": 1}");
        assert_eq!(extract_json_block("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_sections_both_shapes() {
        let wrapped = r#"{"sections": [{"content": "A", "metadata": {"title": "Intro"}}]}"#;
        let sections = parse_sections(wrapped).unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].metadata.title.as_deref(), Some("Intro"));

        let bare = r#"```
[{"content": "A"}, {"content": "B"}]
```"#;
        assert_eq!(parse_sections(bare).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_relevance() {
        let reply = r#"{"sections": [{"content": "kept"}], "reasoning": "only this one matters"}"#;
        let selection = parse_relevance(reply).unwrap();
        assert_eq!(selection.sections[0].content, "kept");
        assert_eq!(selection.reasoning, "only this one matters");

        assert!(matches!(
            parse_relevance("not json"),
            Err(Error::InvalidResponse(_))
        ));
    }
}
