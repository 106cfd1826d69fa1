//! Base model boundary.
//!
//! The base model is a black box mapping token ids, position ids, an optional
//! attention mask, and cache state to one row of logits per input position.
//! It must honor the supplied mask and positions instead of assuming a plain
//! causal layout.

use super::error::DecodeError;
use crate::memory::KvCache;

/// Dense `n x n` attention mask. `allows(i, j)`: position `i` may attend to `j`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttentionMask {
    size: usize,
    bits: Vec<bool>,
}

impl AttentionMask {
    /// Mask where nothing may attend to anything.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            bits: vec![false; size * size],
        }
    }

    /// Lower-triangular mask.
    pub fn causal(size: usize) -> Self {
        let mut mask = Self::new(size);
        for i in 0..size {
            for j in 0..=i {
                mask.set(i, j, true);
            }
        }
        mask
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn set(&mut self, i: usize, j: usize, allowed: bool) {
        self.bits[i * self.size + j] = allowed;
    }

    pub fn allows(&self, i: usize, j: usize) -> bool {
        self.bits[i * self.size + j]
    }

    /// Row `i` as a slice of booleans over all batch positions.
    pub fn row(&self, i: usize) -> &[bool] {
        &self.bits[i * self.size..(i + 1) * self.size]
    }
}

/// One scoring call's worth of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelBatch {
    pub token_ids: Vec<u32>,
    /// Absolute positions, one per token.
    pub position_ids: Vec<usize>,
    /// `None` means causal over the batch.
    pub attention_mask: Option<AttentionMask>,
}

impl ModelBatch {
    /// Causal batch with positions counting up from `start`.
    pub fn causal(token_ids: Vec<u32>, start: usize) -> Self {
        let position_ids = (start..start + token_ids.len()).collect();
        Self {
            token_ids,
            position_ids,
            attention_mask: None,
        }
    }

    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }

    /// Whether batch position `i` may attend to batch position `j`.
    pub fn attends(&self, i: usize, j: usize) -> bool {
        match &self.attention_mask {
            Some(mask) => mask.allows(i, j),
            None => j <= i,
        }
    }
}

/// Row-major logits, one row of `vocab_size` scores per batch position.
#[derive(Debug, Clone, PartialEq)]
pub struct Logits {
    vocab_size: usize,
    data: Vec<f32>,
}

impl Logits {
    pub fn new(vocab_size: usize, data: Vec<f32>) -> Result<Self, DecodeError> {
        if vocab_size == 0 || data.len() % vocab_size != 0 {
            return Err(DecodeError::ModelError(format!(
                "{} logits do not form rows of {}",
                data.len(),
                vocab_size
            )));
        }
        Ok(Self { vocab_size, data })
    }

    /// Stack equally sized rows.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, DecodeError> {
        let vocab_size = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != vocab_size) {
            return Err(DecodeError::ModelError("logit rows differ in length".into()));
        }
        Self::new(vocab_size, rows.concat())
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn num_rows(&self) -> usize {
        self.data.len() / self.vocab_size
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.vocab_size..(i + 1) * self.vocab_size]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.vocab_size)
    }

    /// Fail unless there is exactly one row per batch position.
    pub fn expect_rows(&self, rows: usize) -> Result<(), DecodeError> {
        if self.num_rows() != rows {
            return Err(DecodeError::OutputShape {
                rows,
                vocab_size: self.vocab_size,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Base model used for prefill and verification.
///
/// `forward` appends one cache row per batch position to every layer of
/// `cache` (staged after the committed rows) and returns one logits row per
/// position. Calls are synchronous from the decoder's point of view.
#[async_trait::async_trait]
pub trait BaseModel: Send + Sync {
    type Cache: KvCache;

    async fn forward(
        &self,
        batch: &ModelBatch,
        cache: &mut Self::Cache,
    ) -> Result<Logits, DecodeError>;
}
