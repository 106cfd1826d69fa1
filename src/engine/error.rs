//! Decoding error types.
//!
//! Low-confidence lookups and rejected drafts are not errors; they are handled
//! inside the decoding loop. Only bad input, a misbehaving model, or a cache
//! failure surfaces here.

use thiserror::Error;

use crate::memory::KvCacheError;

/// Errors that can occur while drafting, scoring, or verifying.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Input validation failed: {0}")]
    InputValidation(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Model returned {actual} logits, expected {rows} rows of {vocab_size}")]
    OutputShape {
        rows: usize,
        vocab_size: usize,
        actual: usize,
    },

    #[error("KV cache error: {0}")]
    Cache(#[from] KvCacheError),
}

impl DecodeError {
    /// True when the cache ran out of room; the request stops cleanly.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::Cache(KvCacheError::CapacityExceeded { .. }))
    }

    /// Returns true if this error should be logged as a warning.
    pub fn is_warning(&self) -> bool {
        self.is_capacity()
    }
}
