//! Speculative decoding controller.
//!
//! Each step picks a root token from the previous distribution, drafts a
//! continuation behind it, scores root and draft in a single forward pass,
//! keeps the longest accepted path, and compacts the cache down to it.

use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;

use crate::automaton::CorpusIndex;
use crate::memory::KvCache;
use crate::telemetry::{self, DecodeSpan, SpanExt};

use super::candidate::DraftSource;
use super::config::{GenerationConfig, SpeculativeConfig};
use super::draft::{DraftSelector, TreeDrafter};
use super::error::DecodeError;
use super::model::{BaseModel, Logits, ModelBatch};
use super::recycle::TokenRecycleDrafter;
use super::sampling::{Seed, TokenSampler};
use super::verify::verify;

/// Why generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// EOS or stop token emitted.
    Stop,
    /// `max_new_tokens` reached.
    MaxTokens,
    /// The next batch would not fit in the cache.
    CacheExhausted,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::MaxTokens => "max_tokens",
            Self::CacheExhausted => "cache_exhausted",
        }
    }
}

/// Counters for speculative decoding.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpeculativeStats {
    /// Verified decode steps (forward passes after prefill).
    pub steps: u64,
    /// Draft tokens scored, roots excluded.
    pub drafted_tokens: u64,
    /// Draft tokens accepted.
    pub accepted_tokens: u64,
    /// Tokens returned to the caller.
    pub emitted_tokens: u64,
    pub dynamic_steps: u64,
    pub static_steps: u64,
    pub tree_steps: u64,
}

impl SpeculativeStats {
    pub fn record_step(&mut self, source: DraftSource, drafted: usize, accepted: usize) {
        self.steps += 1;
        self.drafted_tokens += drafted as u64;
        self.accepted_tokens += accepted as u64;
        match source {
            DraftSource::Dynamic => self.dynamic_steps += 1,
            DraftSource::Static => self.static_steps += 1,
            DraftSource::Tree => self.tree_steps += 1,
        }
    }

    /// Fraction of drafted tokens accepted.
    pub fn acceptance_rate(&self) -> f64 {
        if self.drafted_tokens == 0 {
            return 0.0;
        }
        self.accepted_tokens as f64 / self.drafted_tokens as f64
    }

    /// Mean accepted drafts per step.
    pub fn mean_accept_length(&self) -> f64 {
        if self.steps == 0 {
            return 0.0;
        }
        self.accepted_tokens as f64 / self.steps as f64
    }

    /// Tokens emitted per forward pass; plain decoding scores 1.0.
    pub fn tokens_per_step(&self) -> f64 {
        if self.steps == 0 {
            return 0.0;
        }
        self.emitted_tokens as f64 / self.steps as f64
    }

    fn merge(&mut self, other: &Self) {
        self.steps += other.steps;
        self.drafted_tokens += other.drafted_tokens;
        self.accepted_tokens += other.accepted_tokens;
        self.emitted_tokens += other.emitted_tokens;
        self.dynamic_steps += other.dynamic_steps;
        self.static_steps += other.static_steps;
        self.tree_steps += other.tree_steps;
    }
}

/// Result of one [`SpeculativeDecoder::generate`] call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOutput {
    /// Generated tokens, prompt excluded.
    pub tokens: Vec<u32>,
    pub decode_steps: usize,
    /// Tokens emitted by each step.
    pub accept_lengths: Vec<usize>,
    pub finish_reason: FinishReason,
    pub stats: SpeculativeStats,
}

/// Per-request decoding controller around one base model and its cache.
///
/// Requests are processed one at a time; run several decoders to serve
/// requests concurrently. A static corpus may be shared between them.
pub struct SpeculativeDecoder<M: BaseModel> {
    model: M,
    cache: M::Cache,
    selector: DraftSelector,
    config: GenerationConfig,
    stats: SpeculativeStats,
}

impl<M: BaseModel> SpeculativeDecoder<M> {
    /// Create a decoder without a corpus or tree drafter.
    pub fn new(
        model: M,
        cache: M::Cache,
        speculative: SpeculativeConfig,
        config: GenerationConfig,
    ) -> Result<Self, DecodeError> {
        speculative.validate()?;
        config.validate()?;
        Ok(Self {
            model,
            cache,
            selector: DraftSelector::new(speculative, None, None),
            config,
            stats: SpeculativeStats::default(),
        })
    }

    /// Draft from a shared static corpus as well.
    pub fn with_corpus(mut self, corpus: Arc<CorpusIndex>) -> Self {
        self.selector.set_corpus(Some(corpus));
        self
    }

    /// Fall back to `drafter` when neither automaton is confident.
    pub fn with_tree_drafter(mut self, drafter: Box<dyn TreeDrafter>) -> Self {
        self.selector.set_tree_drafter(Some(drafter));
        self
    }

    /// Fall back to a [`TokenRecycleDrafter`] configured from the selector.
    pub fn with_token_recycle(self) -> Self {
        let drafter = TokenRecycleDrafter::from_config(self.selector.config());
        self.with_tree_drafter(Box::new(drafter))
    }

    /// Cumulative counters over every request served.
    pub fn stats(&self) -> &SpeculativeStats {
        &self.stats
    }

    pub fn cache(&self) -> &M::Cache {
        &self.cache
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn selector(&self) -> &DraftSelector {
        &self.selector
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Generate a continuation of `prompt`.
    ///
    /// Cache exhaustion ends the request with what was generated so far.
    pub async fn generate(&mut self, prompt: &[u32]) -> Result<GenerationOutput, DecodeError> {
        let request_id = DecodeSpan::request_id();
        let span = DecodeSpan::new(&request_id, prompt.len());

        let result = self.run(prompt).instrument(span.clone()).await;
        span.record_result(&result);

        match &result {
            Ok(output) => {
                span.record("tokens_generated", output.tokens.len());
                span.record("decode_steps", output.decode_steps);
                span.record("mean_accept_length", output.stats.mean_accept_length());
                self.stats.merge(&output.stats);
                telemetry::record_request(output.finish_reason.as_str(), output.tokens.len());
                tracing::info!(
                    parent: &span,
                    tokens = output.tokens.len(),
                    steps = output.decode_steps,
                    finish_reason = output.finish_reason.as_str(),
                    tokens_per_step = output.stats.tokens_per_step(),
                    "generation finished"
                );
            }
            Err(e) => {
                telemetry::record_request_failure(error_kind(e));
                tracing::error!(parent: &span, error = %e, "generation failed");
            }
        }
        result
    }

    async fn run(&mut self, prompt: &[u32]) -> Result<GenerationOutput, DecodeError> {
        if prompt.is_empty() {
            return Err(DecodeError::InputValidation("prompt must not be empty".into()));
        }

        self.selector.reset();
        self.cache.reset();
        let mut sampler = TokenSampler::new(&self.config);
        let mut output = GenerationOutput {
            tokens: Vec::with_capacity(self.config.max_new_tokens),
            decode_steps: 0,
            accept_lengths: Vec::new(),
            finish_reason: FinishReason::MaxTokens,
            stats: SpeculativeStats::default(),
        };

        if prompt.len() > self.cache.capacity() {
            tracing::warn!(
                prompt_len = prompt.len(),
                capacity = self.cache.capacity(),
                "prompt does not fit in the cache"
            );
            output.finish_reason = FinishReason::CacheExhausted;
            return Ok(output);
        }

        let batch = ModelBatch::causal(prompt.to_vec(), 0);
        let Some(logits) = self.score(&batch).await? else {
            output.finish_reason = FinishReason::CacheExhausted;
            return Ok(output);
        };
        self.cache.promote_staged();
        let rows: Vec<&[f32]> = logits.rows().collect();
        self.selector.commit(prompt, &rows);
        let mut seed = Seed::Logits(logits.row(prompt.len() - 1).to_vec());

        loop {
            if output.tokens.len() >= self.config.max_new_tokens {
                output.finish_reason = FinishReason::MaxTokens;
                break;
            }

            let root = sampler.pick(&seed);
            let candidate = self.selector.select(root).into_candidate(root);
            let offset = self.cache.committed_length();
            if offset + candidate.len() > self.cache.capacity() {
                tracing::warn!(
                    committed = offset,
                    batch = candidate.len(),
                    capacity = self.cache.capacity(),
                    "cache exhausted"
                );
                output.finish_reason = FinishReason::CacheExhausted;
                break;
            }

            let batch = candidate.to_batch(offset);
            let Some(logits) = self.score(&batch).await? else {
                output.finish_reason = FinishReason::CacheExhausted;
                break;
            };
            let verdict = match verify(&candidate, &logits, &mut sampler) {
                Ok(verdict) => verdict,
                Err(e) => {
                    self.cache.discard_staged();
                    return Err(e);
                }
            };
            if let Err(e) = self.cache.compact(&verdict.positions) {
                self.cache.discard_staged();
                return Err(e.into());
            }
            let rows: Vec<&[f32]> = verdict.positions.iter().map(|&p| logits.row(p)).collect();
            self.selector.commit(&verdict.tokens, &rows);

            output.decode_steps += 1;
            output
                .stats
                .record_step(candidate.source(), candidate.drafted(), verdict.accept_length);
            telemetry::record_decode_step(
                candidate.source().as_str(),
                candidate.drafted(),
                verdict.accept_length,
            );
            tracing::debug!(
                step = output.decode_steps,
                source = candidate.source().as_str(),
                drafted = candidate.drafted(),
                path = verdict.path,
                accept_length = verdict.accept_length,
                "decode step"
            );

            let before = output.tokens.len();
            let mut stopped = false;
            for &token in &verdict.tokens {
                if output.tokens.len() >= self.config.max_new_tokens {
                    break;
                }
                output.tokens.push(token);
                if self.config.is_stop(token) {
                    stopped = true;
                    break;
                }
            }
            let emitted = output.tokens.len() - before;
            output.accept_lengths.push(emitted);
            output.stats.emitted_tokens += emitted as u64;
            seed = verdict.seed;

            if stopped {
                output.finish_reason = FinishReason::Stop;
                break;
            }
        }

        Ok(output)
    }

    /// Forward `batch`. `None` when the cache ran out of room; staged rows are
    /// discarded on any failure.
    async fn score(&mut self, batch: &ModelBatch) -> Result<Option<Logits>, DecodeError> {
        let result = self.model.forward(batch, &mut self.cache).await;
        let logits = match result {
            Ok(logits) => logits,
            Err(e) if e.is_capacity() => {
                self.cache.discard_staged();
                tracing::warn!(error = %e, "cache exhausted during forward pass");
                return Ok(None);
            }
            Err(e) => {
                self.cache.discard_staged();
                return Err(e);
            }
        };
        if let Err(e) = logits.expect_rows(batch.len()) {
            self.cache.discard_staged();
            return Err(e);
        }
        Ok(Some(logits))
    }
}

fn error_kind(error: &DecodeError) -> &'static str {
    match error {
        DecodeError::InvalidConfig(_) => "invalid_config",
        DecodeError::InputValidation(_) => "input_validation",
        DecodeError::ModelError(_) => "model",
        DecodeError::OutputShape { .. } => "output_shape",
        DecodeError::Cache(_) => "cache",
    }
}
