//! Drafting and generation configuration.
//!
//! All fields have safe defaults. Configuration is validated before use.

use serde::{Deserialize, Serialize};

use super::error::DecodeError;

/// Rank paths expanded by the token-recycle drafter, parents before children.
///
/// `[0, 1]` is the second most likely successor of the most likely successor
/// of the root.
pub const DEFAULT_TREE_TEMPLATE: &[&[usize]] = &[
    &[0],
    &[1],
    &[2],
    &[3],
    &[0, 0],
    &[0, 1],
    &[0, 2],
    &[1, 0],
    &[1, 1],
    &[2, 0],
    &[0, 0, 0],
    &[0, 0, 1],
    &[0, 1, 0],
    &[1, 0, 0],
    &[0, 0, 0, 0],
    &[0, 0, 0, 1],
    &[0, 1, 0, 0],
    &[0, 0, 0, 0, 0],
    &[0, 0, 0, 0, 0, 0],
];

/// How drafted tokens are accepted against the base model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptanceMode {
    /// Accept while the draft matches the base model's argmax.
    #[default]
    Greedy,
    /// Speculative sampling; output distribution matches the base model.
    Sampled,
}

/// Draft selection policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeculativeConfig {
    /// Tokens predicted per automaton lookup.
    pub max_predicts: usize,
    /// Minimum match length before an automaton draft is trusted.
    pub len_threshold: usize,
    /// Subtracted from the static match length before comparison.
    pub len_bias: usize,
    /// Maximum nodes in a tree draft, root included.
    pub max_tree_size: usize,
    /// Successors remembered per token by the token-recycle drafter.
    pub tree_top_k: usize,
    /// Rank paths expanded into a tree draft.
    pub tree_template: Vec<Vec<usize>>,
}

impl Default for SpeculativeConfig {
    fn default() -> Self {
        Self {
            max_predicts: 40,
            len_threshold: 5,
            len_bias: 5,
            max_tree_size: 64,
            tree_top_k: 8,
            tree_template: DEFAULT_TREE_TEMPLATE.iter().map(|p| p.to_vec()).collect(),
        }
    }
}

impl SpeculativeConfig {
    /// Validate configuration values. Returns error on invalid values.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.max_predicts == 0 {
            return Err(DecodeError::InvalidConfig("max_predicts must be > 0".into()));
        }
        if self.max_tree_size == 0 {
            return Err(DecodeError::InvalidConfig("max_tree_size must be > 0".into()));
        }
        if self.tree_top_k == 0 {
            return Err(DecodeError::InvalidConfig("tree_top_k must be > 0".into()));
        }
        for path in &self.tree_template {
            if path.is_empty() {
                return Err(DecodeError::InvalidConfig(
                    "tree_template entries must be non-empty".into(),
                ));
            }
            if path.iter().any(|&rank| rank >= self.tree_top_k) {
                return Err(DecodeError::InvalidConfig(format!(
                    "tree_template entry {:?} uses a rank >= tree_top_k ({})",
                    path, self.tree_top_k
                )));
            }
        }
        Ok(())
    }

    /// Sequence candidates hold the root plus one lookup's worth of tokens.
    pub fn max_sequence_len(&self) -> usize {
        self.max_predicts + 1
    }
}

/// Per-request generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Maximum tokens to generate.
    pub max_new_tokens: usize,
    /// Acceptance rule used by the verifier.
    pub acceptance: AcceptanceMode,
    /// Sampling temperature. 0.0 always behaves greedily.
    pub temperature: f32,
    /// RNG seed for reproducible sampled runs.
    pub seed: Option<u64>,
    /// End-of-sequence token; generation stops after emitting it.
    pub eos_token: Option<u32>,
    /// Extra stop token treated like EOS.
    pub stop_token: Option<u32>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 512,
            acceptance: AcceptanceMode::Greedy,
            temperature: 0.0,
            seed: None,
            eos_token: None,
            stop_token: None,
        }
    }
}

impl GenerationConfig {
    /// Validate configuration values. Returns error on invalid values.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.max_new_tokens == 0 {
            return Err(DecodeError::InvalidConfig("max_new_tokens must be > 0".into()));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(DecodeError::InvalidConfig(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        Ok(())
    }

    /// True when acceptance and token choice use argmax.
    pub fn is_greedy(&self) -> bool {
        self.acceptance == AcceptanceMode::Greedy || self.temperature == 0.0
    }

    /// True when `token` ends generation.
    pub fn is_stop(&self, token: u32) -> bool {
        self.eos_token == Some(token) || self.stop_token == Some(token)
    }

    /// Create a config for temperature-sampled acceptance.
    pub fn sampled(temperature: f32, seed: Option<u64>) -> Self {
        Self {
            acceptance: AcceptanceMode::Sampled,
            temperature,
            seed,
            ..Self::default()
        }
    }
}
