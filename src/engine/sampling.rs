//! Token choice from base-model distributions.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::config::GenerationConfig;

/// Distribution the next step draws its root token from.
#[derive(Debug, Clone, PartialEq)]
pub enum Seed {
    /// Raw logits straight from the model.
    Logits(Vec<f32>),
    /// Normalized probabilities, possibly a residual after a rejection.
    Probs(Vec<f32>),
}

/// Index of the largest value. Ties resolve to the lowest index.
pub fn argmax(values: &[f32]) -> u32 {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best as u32
}

/// Softmax of `logits / temperature`. A non-positive temperature is treated as 1.
pub fn softmax(logits: &[f32], temperature: f32) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let t = if temperature > 0.0 { temperature } else { 1.0 };
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&x| ((x - max) / t).exp()).collect();
    let sum: f32 = exp.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![1.0 / logits.len() as f32; logits.len()];
    }
    exp.iter().map(|&x| x / sum).collect()
}

/// Speculative-sampling acceptance probability `min(1, p_model / p_draft)`.
pub fn acceptance_probability(p_model: f32, p_draft: f32) -> f32 {
    if p_draft <= 0.0 {
        return if p_model > 0.0 { 1.0 } else { 0.0 };
    }
    (p_model / p_draft).min(1.0)
}

/// Remove a rejected one-hot draft from `probs` and renormalize in place.
///
/// This is `norm(max(0, p - q))` for a deterministic draft `q`.
pub fn remove_rejected(probs: &mut [f32], token: u32) {
    if let Some(p) = probs.get_mut(token as usize) {
        *p = 0.0;
    }
    let sum: f32 = probs.iter().sum();
    if sum > 0.0 {
        probs.iter_mut().for_each(|p| *p /= sum);
    }
}

/// Picks tokens greedily or by temperature sampling with a private RNG.
#[derive(Debug, Clone)]
pub struct TokenSampler {
    greedy: bool,
    temperature: f32,
    rng: StdRng,
}

impl TokenSampler {
    pub fn new(config: &GenerationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            greedy: config.is_greedy(),
            temperature: config.temperature,
            rng,
        }
    }

    pub fn is_greedy(&self) -> bool {
        self.greedy
    }

    /// Temperature-scaled probabilities for one logits row.
    pub fn probabilities(&self, logits: &[f32]) -> Vec<f32> {
        softmax(logits, self.temperature)
    }

    /// Choose the root token of the next step.
    pub fn pick(&mut self, seed: &Seed) -> u32 {
        match seed {
            Seed::Logits(logits) if self.greedy => argmax(logits),
            Seed::Probs(probs) if self.greedy => argmax(probs),
            Seed::Logits(logits) => {
                let probs = self.probabilities(logits);
                self.sample(&probs)
            }
            Seed::Probs(probs) => self.sample(probs),
        }
    }

    /// Draw from a probability vector; degenerate vectors fall back to argmax.
    pub fn sample(&mut self, probs: &[f32]) -> u32 {
        match WeightedIndex::new(probs) {
            Ok(dist) => dist.sample(&mut self.rng) as u32,
            Err(_) => argmax(probs),
        }
    }

    /// Uniform draw in `[0, 1)`.
    pub fn uniform(&mut self) -> f32 {
        self.rng.gen::<f32>()
    }
}
