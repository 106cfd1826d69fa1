//! Speculative decoding engine.
//!
//! Draft selection, candidate layout, verification, and the decoding loop that
//! drives a [`BaseModel`] through them.

pub mod candidate;
pub mod config;
pub mod draft;
pub mod error;
pub mod model;
pub mod recycle;
pub mod sampling;
pub mod speculative;
pub mod verify;

pub use candidate::{Candidate, CandidateKind, DraftSource, TokenTree};
pub use config::{AcceptanceMode, GenerationConfig, SpeculativeConfig, DEFAULT_TREE_TEMPLATE};
pub use draft::{Draft, DraftSelector, TreeDrafter};
pub use error::DecodeError;
pub use model::{AttentionMask, BaseModel, Logits, ModelBatch};
pub use recycle::TokenRecycleDrafter;
pub use sampling::{argmax, softmax, Seed, TokenSampler};
pub use speculative::{FinishReason, GenerationOutput, SpeculativeDecoder, SpeculativeStats};
pub use verify::{greedy_accept_length, verify, Verdict};
