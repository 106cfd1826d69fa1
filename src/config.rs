//! Configuration loading from environment variables and TOML.
//!
//! Environment values come from `SAMD_*` variables with safe defaults. Invalid
//! values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `SAMD_MAX_PREDICTS` | 40 | Tokens predicted per automaton lookup |
//! | `SAMD_LEN_THRESHOLD` | 5 | Match length needed to trust an automaton draft |
//! | `SAMD_LEN_BIAS` | 5 | Subtracted from the static match length |
//! | `SAMD_MAX_TREE_SIZE` | 64 | Max nodes in a tree draft |
//! | `SAMD_TREE_TOP_K` | 8 | Successors kept per token for tree drafts |
//! | `SAMD_MAX_NEW_TOKENS` | 512 | Max generated tokens per request |
//! | `SAMD_ACCEPTANCE` | greedy | `greedy` or `sampled` |
//! | `SAMD_TEMPERATURE` | 0.0 | Sampling temperature, 0.0 to 2.0 |
//! | `SAMD_SEED` | unset | RNG seed for sampled runs |
//! | `SAMD_EOS_TOKEN` | unset | End-of-sequence token id |
//! | `SAMD_MAX_CACHE_LEN` | 4096 | KV cache capacity (rows) |
//! | `SAMD_STATIC_INDEX` | unset | Path of a saved static corpus index |
//! | `SAMD_LOG_LEVEL` | info | Tracing filter directive |
//! | `SAMD_LOG_FORMAT` | json | `json` or `pretty` |

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{AcceptanceMode, DecodeError, GenerationConfig, SpeculativeConfig};
use crate::memory::KvCacheConfig;
use crate::telemetry::{LogConfig, LogFormat};

/// Largest prediction span accepted from the environment.
const MAX_PREDICTS_LIMIT: usize = 1024;
/// Largest tree draft accepted from the environment.
const MAX_TREE_SIZE_LIMIT: usize = 1024;

/// Errors from file-based configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] DecodeError),
}

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub max_predicts: usize,
    pub len_threshold: usize,
    pub len_bias: usize,
    pub max_tree_size: usize,
    pub tree_top_k: usize,
    pub tree_template_paths: usize,
    pub max_new_tokens: usize,
    pub acceptance: AcceptanceMode,
    pub temperature: f32,
    pub seed: Option<u64>,
    pub eos_token: Option<u32>,
    pub num_layers: usize,
    pub kv_width: usize,
    pub max_cache_len: usize,
    pub static_index: Option<PathBuf>,
    pub log_level: String,
    pub log_format: LogFormat,
}

/// All configuration for one decoding service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub speculative: SpeculativeConfig,
    pub generation: GenerationConfig,
    pub cache: KvCacheConfig,
    /// Saved static corpus index to load at startup.
    pub static_index: Option<PathBuf>,
    pub log: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse an optional env var; missing or invalid gives `None`.
fn parse_opt<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}

/// Default template paths whose ranks all fall below `top_k`.
///
/// Ranks beyond top-k could never be expanded.
fn default_template_within(top_k: usize) -> Vec<Vec<usize>> {
    SpeculativeConfig::default()
        .tree_template
        .into_iter()
        .filter(|path| path.iter().all(|&rank| rank < top_k))
        .collect()
}

fn load_speculative_config() -> SpeculativeConfig {
    let defaults = SpeculativeConfig::default();
    let max_predicts = parse_usize("SAMD_MAX_PREDICTS", defaults.max_predicts);
    let max_predicts = max_predicts.clamp(1, MAX_PREDICTS_LIMIT);
    let max_tree_size = parse_usize("SAMD_MAX_TREE_SIZE", defaults.max_tree_size);
    let max_tree_size = max_tree_size.clamp(1, MAX_TREE_SIZE_LIMIT);
    let tree_top_k = parse_usize("SAMD_TREE_TOP_K", defaults.tree_top_k).max(1);
    let tree_template = default_template_within(tree_top_k);

    SpeculativeConfig {
        max_predicts,
        len_threshold: parse_usize("SAMD_LEN_THRESHOLD", defaults.len_threshold),
        len_bias: parse_usize("SAMD_LEN_BIAS", defaults.len_bias),
        max_tree_size,
        tree_top_k,
        tree_template,
    }
}

fn load_generation_config() -> GenerationConfig {
    let defaults = GenerationConfig::default();
    let max_new_tokens = parse_usize("SAMD_MAX_NEW_TOKENS", defaults.max_new_tokens).max(1);
    let acceptance = match std::env::var("SAMD_ACCEPTANCE") {
        Ok(val) if val.trim().eq_ignore_ascii_case("sampled") => AcceptanceMode::Sampled,
        Ok(val) if val.trim().eq_ignore_ascii_case("greedy") => AcceptanceMode::Greedy,
        _ => defaults.acceptance,
    };
    let temperature = parse_opt::<f32>("SAMD_TEMPERATURE")
        .filter(|t| t.is_finite() && (0.0..=2.0).contains(t))
        .unwrap_or(defaults.temperature);

    GenerationConfig {
        max_new_tokens,
        acceptance,
        temperature,
        seed: parse_opt("SAMD_SEED"),
        eos_token: parse_opt("SAMD_EOS_TOKEN"),
        stop_token: defaults.stop_token,
    }
}

fn load_cache_config() -> KvCacheConfig {
    let defaults = KvCacheConfig::default();
    let capacity = parse_usize("SAMD_MAX_CACHE_LEN", defaults.capacity).max(1);
    KvCacheConfig {
        capacity,
        ..defaults
    }
}

fn load_log_config() -> LogConfig {
    let defaults = LogConfig::default();
    let level = std::env::var("SAMD_LOG_LEVEL")
        .ok()
        .filter(|level| !level.trim().is_empty())
        .unwrap_or(defaults.level);
    let format = parse_opt::<LogFormat>("SAMD_LOG_FORMAT").unwrap_or(defaults.format);
    LogConfig {
        format,
        level,
        output_path: defaults.output_path,
    }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    EnvConfig {
        speculative: load_speculative_config(),
        generation: load_generation_config(),
        cache: load_cache_config(),
        static_index: std::env::var_os("SAMD_STATIC_INDEX").map(PathBuf::from),
        log: load_log_config(),
    }
}

/// Parse a TOML document. Missing tables and keys take their defaults; the
/// result is validated.
///
/// When the document leaves `tree_template` out, the default template is
/// trimmed to `tree_top_k` the same way [`load`] does it. An explicit template
/// is validated as written.
pub fn from_toml_str(source: &str) -> Result<EnvConfig, ConfigError> {
    let document: toml::Value = toml::from_str(source)?;
    let explicit_template = document
        .get("speculative")
        .and_then(|table| table.get("tree_template"))
        .is_some();
    let mut config: EnvConfig = document.try_into()?;
    if !explicit_template {
        config.speculative.tree_template = default_template_within(config.speculative.tree_top_k);
    }
    config.validate()?;
    Ok(config)
}

/// Read and parse a TOML config file.
pub fn load_file(path: &Path) -> Result<EnvConfig, ConfigError> {
    let source = std::fs::read_to_string(path)?;
    from_toml_str(&source)
}

impl EnvConfig {
    pub fn validate(&self) -> Result<(), DecodeError> {
        self.speculative.validate()?;
        self.generation.validate()?;
        if self.cache.capacity == 0 || self.cache.num_layers == 0 || self.cache.kv_width == 0 {
            return Err(DecodeError::InvalidConfig(
                "cache dimensions must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            max_predicts: self.speculative.max_predicts,
            len_threshold: self.speculative.len_threshold,
            len_bias: self.speculative.len_bias,
            max_tree_size: self.speculative.max_tree_size,
            tree_top_k: self.speculative.tree_top_k,
            tree_template_paths: self.speculative.tree_template.len(),
            max_new_tokens: self.generation.max_new_tokens,
            acceptance: self.generation.acceptance,
            temperature: self.generation.temperature,
            seed: self.generation.seed,
            eos_token: self.generation.eos_token,
            num_layers: self.cache.num_layers,
            kv_width: self.cache.kv_width,
            max_cache_len: self.cache.capacity,
            static_index: self.static_index.clone(),
            log_level: self.log.level.clone(),
            log_format: self.log.format,
        }
    }
}
