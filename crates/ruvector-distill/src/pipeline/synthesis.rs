//! Coarse grouping of chunk analyses and one synthesis call per group
//!
//! Calls are strictly sequential and any failure is fatal for the run.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::types::{ChunkAnalysis, Progress, ProgressCallback, Stage};

use super::cancel::CancellationToken;

pub struct SynthesisStage {
    provider: Arc<dyn LlmProvider>,
    groups: usize,
}

impl SynthesisStage {
    /// `groups` is the target number of coarse groups (3 by default)
    pub fn new(provider: Arc<dyn LlmProvider>, groups: usize) -> Self {
        Self {
            provider,
            groups: groups.max(1),
        }
    }

    /// Consecutive, non-overlapping groups of `ceil(len / groups)` analyses
    pub fn group<'a>(&self, analyses: &'a [ChunkAnalysis]) -> Vec<&'a [ChunkAnalysis]> {
        if analyses.is_empty() {
            return Vec::new();
        }
        let group_size = analyses.len().div_ceil(self.groups);
        analyses.chunks(group_size).collect()
    }

    /// One synthesized narrative per coarse group, in order
    pub async fn synthesize_sections(
        &self,
        analyses: &[ChunkAnalysis],
        on_progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let groups = self.group(analyses);
        let total = groups.len();
        let mut syntheses = Vec::with_capacity(total);

        tracing::info!(
            "Synthesizing {} analyses in {} sections",
            analyses.len(),
            total
        );

        for (i, group) in groups.into_iter().enumerate() {
            cancel.check()?;
            on_progress(Progress::new(
                Stage::Synthesis,
                i,
                total,
                format!("Synthesizing section {} of {}", i + 1, total),
            ));

            let texts: Vec<String> = group.iter().map(ChunkAnalysis::text).collect();
            let synthesis = cancel
                .run(self.provider.synthesize_section(&texts, i, total))
                .await
                .map_err(|e| {
                    tracing::error!("Synthesis of section {} failed: {}", i + 1, e);
                    Error::stage("synthesis", e)
                })?;

            syntheses.push(synthesis);
        }

        on_progress(Progress::new(Stage::Synthesis, total, total, "Synthesis complete"));
        Ok(syntheses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use crate::types::no_progress;

    fn analyses(n: usize) -> Vec<ChunkAnalysis> {
        (0..n)
            .map(|i| ChunkAnalysis::analyzed(i, format!("a{}", i)))
            .collect()
    }

    #[test]
    fn test_grouping_sizes() {
        let stage = SynthesisStage::new(Arc::new(MockProvider::new()), 3);

        let sizes = |n: usize| -> Vec<usize> {
            let input = analyses(n);
            stage.group(&input).iter().map(|g| g.len()).collect()
        };

        assert_eq!(sizes(0), Vec::<usize>::new());
        assert_eq!(sizes(1), vec![1]);
        assert_eq!(sizes(2), vec![1, 1]);
        assert_eq!(sizes(5), vec![2, 2, 1]);
        assert_eq!(sizes(6), vec![2, 2, 2]);
        assert_eq!(sizes(7), vec![3, 3, 1]);
        assert_eq!(sizes(9), vec![3, 3, 3]);
    }

    #[tokio::test]
    async fn test_one_call_per_group_in_order() {
        let provider = Arc::new(MockProvider::new());
        let stage = SynthesisStage::new(provider.clone(), 3);
        let mut input = analyses(4);
        input[3] = ChunkAnalysis::failed(3, "HTTP 429");

        let syntheses = stage
            .synthesize_sections(&input, &no_progress(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(syntheses.len(), 2);
        assert_eq!(syntheses[0], "synthesis 0: a0 | a1");
        assert_eq!(
            syntheses[1],
            "synthesis 1: a2 | [CHUNK 4 NOT PROCESSED: HTTP 429]"
        );
        assert_eq!(MockProvider::calls(&provider.synthesis_calls), 2);
    }

    #[tokio::test]
    async fn test_failure_aborts_stage() {
        let provider = Arc::new(MockProvider::new().failing_synthesis());
        let stage = SynthesisStage::new(provider.clone(), 3);

        let err = stage
            .synthesize_sections(&analyses(6), &no_progress(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Stage { stage: "synthesis", .. }));
        // No retry, no further groups
        assert_eq!(MockProvider::calls(&provider.synthesis_calls), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let stage = SynthesisStage::new(Arc::new(MockProvider::new()), 3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = stage
            .synthesize_sections(&analyses(3), &no_progress(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
