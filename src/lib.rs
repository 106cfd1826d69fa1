//! SAM Decoding Core
//!
//! Speculative decoding driven by suffix automata. The text generated so far
//! is matched against its own history and against a static corpus; the
//! longest match proposes a continuation that the base model verifies in one
//! forward pass.
//!
//! # Components
//!
//! - [`automaton`]: dynamic and static suffix-automaton indexes
//! - [`engine`]: draft selection, candidate layout, verification, decoding loop
//! - [`memory`]: KV cache with speculative staging and compaction
//! - [`telemetry`]: logging, spans, metrics
//! - [`config`]: environment and TOML configuration
//!
//! The base model is a black box behind [`engine::BaseModel`]; tokenization
//! and model loading are out of scope.

pub mod automaton;
pub mod cli;
pub mod config;
pub mod engine;
pub mod memory;
pub mod telemetry;

pub use automaton::{CorpusIndex, DynamicIndex, StaticIndex, SuffixAutomaton};
pub use engine::{
    BaseModel, DecodeError, FinishReason, GenerationConfig, GenerationOutput, SpeculativeConfig,
    SpeculativeDecoder,
};
pub use memory::{KvCache, KvCacheConfig, LayeredKvCache};
