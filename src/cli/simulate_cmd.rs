//! `simulate`: replay a reference sequence through the decoder.
//!
//! The base model is an oracle that always predicts the next reference token,
//! so the run measures how many tokens per forward pass the drafters would
//! save on that text.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use super::CliError;
use crate::automaton::CorpusIndex;
use crate::config::EnvConfig;
use crate::engine::{
    BaseModel, DecodeError, FinishReason, Logits, ModelBatch, SpeculativeDecoder,
    SpeculativeStats,
};
use crate::memory::{KvCache, KvCacheConfig, LayeredKvCache};

/// Score given to the oracle's token; everything else scores 0.
const ORACLE_LOGIT: f32 = 100.0;

/// Base model that replays a fixed token sequence.
#[derive(Debug, Clone)]
pub struct ReplayModel {
    reference: Vec<u32>,
    vocab_size: usize,
    fallback: u32,
}

impl ReplayModel {
    pub fn new(reference: Vec<u32>, fallback: u32) -> Self {
        let largest = reference.iter().copied().chain([fallback]).max().unwrap_or(0);
        let vocab_size = largest as usize + 1;
        Self {
            reference,
            vocab_size,
            fallback,
        }
    }

    fn next_token(&self, position: usize) -> u32 {
        self.reference.get(position + 1).copied().unwrap_or(self.fallback)
    }
}

#[async_trait::async_trait]
impl BaseModel for ReplayModel {
    type Cache = LayeredKvCache<f32>;

    async fn forward(
        &self,
        batch: &ModelBatch,
        cache: &mut Self::Cache,
    ) -> Result<Logits, DecodeError> {
        let rows: Vec<f32> = batch.token_ids.iter().map(|&t| t as f32).collect();
        cache.append(0, &rows, &rows)?;

        let mut data = vec![0.0; batch.len() * self.vocab_size];
        for (i, &pos) in batch.position_ids.iter().enumerate() {
            data[i * self.vocab_size + self.next_token(pos) as usize] = ORACLE_LOGIT;
        }
        Logits::new(self.vocab_size, data)
    }
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub prompt_len: usize,
    pub tokens_generated: usize,
    pub matches_reference: bool,
    pub finish_reason: FinishReason,
    pub tokens_per_step: f64,
    pub acceptance_rate: f64,
    pub mean_accept_length: f64,
    pub stats: SpeculativeStats,
}

/// Replay `reference` after its first `prompt_len` tokens.
pub async fn simulate(
    config: &EnvConfig,
    reference: Vec<u32>,
    prompt_len: usize,
    corpus: Option<Arc<CorpusIndex>>,
    tree: bool,
) -> Result<SimulationReport, CliError> {
    if prompt_len == 0 || prompt_len >= reference.len() {
        return Err(CliError::Usage(format!(
            "prompt length must be between 1 and {}",
            reference.len().saturating_sub(1)
        )));
    }
    let speculative = config.speculative.clone();
    let draft_rows = (speculative.max_predicts + 1).max(speculative.max_tree_size);
    let cache = LayeredKvCache::new(KvCacheConfig {
        num_layers: 1,
        kv_width: 1,
        capacity: reference.len() + draft_rows,
    });
    let mut generation = config.generation.clone();
    generation.max_new_tokens = reference.len() - prompt_len;

    let model = ReplayModel::new(reference.clone(), generation.eos_token.unwrap_or(0));
    let mut decoder = SpeculativeDecoder::new(model, cache, speculative, generation)?;
    if let Some(corpus) = corpus {
        decoder = decoder.with_corpus(corpus);
    }
    if tree {
        decoder = decoder.with_token_recycle();
    }

    let output = decoder.generate(&reference[..prompt_len]).await?;
    debug_assert!(decoder.cache().committed_length() <= reference.len());
    Ok(SimulationReport {
        prompt_len,
        tokens_generated: output.tokens.len(),
        matches_reference: reference[prompt_len..].starts_with(&output.tokens),
        finish_reason: output.finish_reason,
        tokens_per_step: output.stats.tokens_per_step(),
        acceptance_rate: output.stats.acceptance_rate(),
        mean_accept_length: output.stats.mean_accept_length(),
        stats: output.stats,
    })
}

fn simulate_file(
    config: &EnvConfig,
    reference: &Path,
    prompt_len: usize,
    index: Option<&Path>,
    tree: bool,
) -> Result<SimulationReport, CliError> {
    let reference: Vec<u32> = serde_json::from_slice(&std::fs::read(reference)?)?;
    let corpus = match index {
        Some(path) => Some(Arc::new(CorpusIndex::load(path)?)),
        None => None,
    };
    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    runtime.block_on(simulate(config, reference, prompt_len, corpus, tree))
}

/// Run `simulate`. Returns exit code: 0 on success, 1 on failure.
pub fn run_simulate(
    config: &EnvConfig,
    reference: &Path,
    prompt_len: usize,
    index: Option<&Path>,
    tree: bool,
) -> i32 {
    match simulate_file(config, reference, prompt_len, index, tree) {
        Ok(report) => super::index_cmd::print_json(&report),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_reproduces_reference() {
        let mut config = EnvConfig::default();
        config.speculative.max_predicts = 3;
        let reference: Vec<u32> = [1, 2, 3, 4].repeat(6);
        let report = simulate(&config, reference, 4, None, false)
            .await
            .unwrap();
        assert!(report.matches_reference);
        assert_eq!(report.tokens_generated, 20);
        assert_eq!(report.finish_reason, FinishReason::MaxTokens);
        assert!(report.tokens_per_step > 1.0);
    }

    #[tokio::test]
    async fn test_prompt_must_leave_room() {
        let err = simulate(&EnvConfig::default(), vec![1, 2], 2, None, false).await;
        assert!(matches!(err, Err(CliError::Usage(_))));
    }
}
