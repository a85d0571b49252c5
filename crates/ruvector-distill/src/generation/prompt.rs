//! Prompt templates for every collaborator task

use crate::types::{Chunk, ConsolidationRequest, LogicalSection};

/// Separator placed between syntheses before segmentation
pub const SYNTHESIS_DELIMITER: &str = "\n\n---\n\n";

/// Prompt builder for the distillation tasks
pub struct PromptBuilder;

impl PromptBuilder {
    /// System message shared by all tasks
    pub fn system_prompt() -> &'static str {
        "You are a meticulous document analyst. You work only from the text you are given, \
         never invent facts, and keep names, numbers and dates exactly as written."
    }

    /// Analysis of a single chunk
    pub fn build_analysis_prompt(chunk: &Chunk, total_chunks: usize, total_pages: u32) -> String {
        format!(
            r#"You are reading part {part} of {total} of a {pages}-page document.

Analyze this part thoroughly:
- Identify chapters, headings and the topics covered
- Record key facts, figures, definitions, names and dates
- Note arguments, conclusions and open questions
- Mention where the text appears to continue from, or into, a neighbouring part

DOCUMENT PART {part}/{total}:
{content}

Write a detailed, structured analysis of this part:"#,
            part = chunk.index + 1,
            total = total_chunks,
            pages = total_pages,
            content = chunk.content,
        )
    }

    /// Synthesis of one coarse group of analyses
    pub fn build_synthesis_prompt(
        analyses: &[String],
        group_index: usize,
        total_groups: usize,
    ) -> String {
        let mut body = String::new();
        for (i, analysis) in analyses.iter().enumerate() {
            body.push_str(&format!("### Analysis {}\n{}\n\n", i + 1, analysis));
        }

        format!(
            r#"Below are consecutive analyses covering section {section} of {total} of a document.
Some parts may be marked as NOT PROCESSED; acknowledge the gap without guessing its content.

Merge them into one coherent narrative that:
- Preserves the document's order and structure
- Removes repetition caused by overlapping parts
- Keeps every concrete fact, figure and name

{body}
Write the synthesized narrative for section {section}:"#,
            section = group_index + 1,
            total = total_groups,
            body = body,
        )
    }

    /// Segmentation of the combined syntheses into logical sections
    pub fn build_segmentation_prompt(combined: &str) -> String {
        format!(
            r#"The text below is a synthesized account of a whole document. Parts are separated by "---".

Split it into logical sections along topic boundaries (ignore the "---" separators when a topic spans them).
Each section must be self-contained and keep all of its facts.

Respond with JSON only, in this shape:
{{"sections": [{{"content": "...", "metadata": {{"title": "...", "summary": "...", "topics": ["..."]}}}}]}}

TEXT:
{combined}"#,
            combined = combined,
        )
    }

    /// Relevance filtering of logical sections against the user's goal
    pub fn build_relevance_prompt(sections: &[LogicalSection], goal: &str) -> String {
        let mut listing = String::new();
        for (i, section) in sections.iter().enumerate() {
            listing.push_str(&format!(
                "[{}] {}\n{}\n\n",
                i + 1,
                section.display_title(i),
                section.content
            ));
        }

        format!(
            r#"USER GOAL: {goal}

Below are the sections of a document. Keep only the sections needed to fulfil the goal, in the order they should be presented.
Copy each kept section's content verbatim.

Respond with JSON only, in this shape:
{{"sections": [{{"title": "...", "content": "..."}}], "reasoning": "why these sections were kept and the others dropped"}}

SECTIONS:
{listing}"#,
            goal = goal,
            listing = listing,
        )
    }

    /// Compression of one oversized section
    pub fn build_compression_prompt(content: &str, goal: &str, target_chars: usize) -> String {
        format!(
            r#"Condense the section below to at most {target} characters.
Keep everything relevant to this goal: {goal}
Keep exact figures, names and dates; drop repetition and tangents.

SECTION:
{content}

Condensed section:"#,
            target = target_chars,
            goal = goal,
            content = content,
        )
    }

    /// Final consolidation prompt, the text whose size the streamer checks
    pub fn build_consolidation_prompt(request: &ConsolidationRequest) -> String {
        let mut sections = String::new();
        for (i, section) in request.sections.iter().enumerate() {
            sections.push_str(&format!("## Section {}\n{}\n\n", i + 1, section));
        }

        format!(
            r#"DOCUMENT: {name} ({pages} pages)
USER GOAL: {goal}

The sections below were selected from the document as relevant to the goal.

RULES:
1. Answer the goal using ONLY the sections below
2. Follow the structure the goal asks for; otherwise use clear headings
3. Keep figures, names and dates exactly as written
4. If the sections do not cover part of the goal, say so plainly

{sections}
Answer:"#,
            name = request.document_name,
            pages = request.total_pages,
            goal = request.user_goal,
            sections = sections,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_prompt_numbers_parts_from_one() {
        let chunk = Chunk {
            index: 0,
            content: "Chapter 1".into(),
            start: 0,
            end: 9,
        };
        let prompt = PromptBuilder::build_analysis_prompt(&chunk, 5, 100);
        assert!(prompt.contains("part 1 of 5"));
        assert!(prompt.contains("100-page"));
        assert!(prompt.contains("Chapter 1"));
    }

    #[test]
    fn test_relevance_prompt_lists_sections() {
        let sections = vec![
            LogicalSection::new("alpha body").with_title("Alpha"),
            LogicalSection::new("beta body"),
        ];
        let prompt = PromptBuilder::build_relevance_prompt(&sections, "summarize chapter 3");
        assert!(prompt.contains("USER GOAL: summarize chapter 3"));
        assert!(prompt.contains("[1] Alpha"));
        assert!(prompt.contains("[2] Section 2"));
    }

    #[test]
    fn test_consolidation_prompt_contains_everything() {
        let request = ConsolidationRequest {
            sections: vec!["first".into(), "second".into()],
            user_goal: "summarize".into(),
            document_name: "report.pdf".into(),
            total_pages: 12,
        };
        let prompt = PromptBuilder::build_consolidation_prompt(&request);
        assert!(prompt.contains("report.pdf (12 pages)"));
        assert!(prompt.contains("## Section 2\nsecond"));
        assert!(prompt.contains("USER GOAL: summarize"));
    }
}
