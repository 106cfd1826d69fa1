//! Config CLI subcommands: show, validate.
//!
//! These commands read configuration directly from environment variables or
//! a TOML file.

use std::path::Path;

use crate::config::{self, EffectiveConfig, EnvConfig};

/// Print effective config as key-value pairs to stdout.
pub fn run_show() {
    let cfg = config::load().effective_config();
    print_config(&cfg);
}

/// Print effective config as JSON.
pub fn run_show_json() -> i32 {
    let cfg = config::load().effective_config();
    match serde_json::to_string_pretty(&cfg) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

/// Validate the environment configuration, or a TOML file when given.
///
/// Returns 0 if valid, 1 if invalid or if any warnings are found.
pub fn run_validate(file: Option<&Path>) -> i32 {
    let env = match file {
        Some(path) => match config::load_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("ERROR: {}: {}", path.display(), e);
                return 1;
            }
        },
        None => config::load(),
    };
    if let Err(e) = env.validate() {
        eprintln!("ERROR: {}", e);
        return 1;
    }

    let warnings = config_warnings(&env);
    for warning in &warnings {
        eprintln!("WARNING: {}", warning);
    }
    if warnings.is_empty() {
        println!("Configuration is valid.");
        0
    } else {
        1
    }
}

/// Settings that validate but are unlikely to behave as intended.
fn config_warnings(env: &EnvConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let speculative = &env.speculative;
    if speculative.len_threshold > speculative.max_predicts {
        warnings.push(format!(
            "SAMD_LEN_THRESHOLD ({}) > SAMD_MAX_PREDICTS ({})",
            speculative.len_threshold, speculative.max_predicts
        ));
    }
    let largest_draft = speculative.max_sequence_len().max(speculative.max_tree_size);
    if largest_draft > env.cache.capacity {
        warnings.push(format!(
            "a single draft of {} tokens may not fit in SAMD_MAX_CACHE_LEN ({})",
            largest_draft, env.cache.capacity
        ));
    }
    if let Some(path) = &env.static_index {
        if !path.exists() {
            warnings.push(format!("SAMD_STATIC_INDEX {} does not exist", path.display()));
        }
    }
    warnings
}

fn print_config(cfg: &EffectiveConfig) {
    let opt = |v: Option<String>| v.unwrap_or_default();
    println!("SAMD_MAX_PREDICTS={}", cfg.max_predicts);
    println!("SAMD_LEN_THRESHOLD={}", cfg.len_threshold);
    println!("SAMD_LEN_BIAS={}", cfg.len_bias);
    println!("SAMD_MAX_TREE_SIZE={}", cfg.max_tree_size);
    println!("SAMD_TREE_TOP_K={}", cfg.tree_top_k);
    println!("SAMD_MAX_NEW_TOKENS={}", cfg.max_new_tokens);
    println!("SAMD_ACCEPTANCE={}", format!("{:?}", cfg.acceptance).to_lowercase());
    println!("SAMD_TEMPERATURE={}", cfg.temperature);
    println!("SAMD_SEED={}", opt(cfg.seed.map(|s| s.to_string())));
    println!("SAMD_EOS_TOKEN={}", opt(cfg.eos_token.map(|t| t.to_string())));
    println!("SAMD_MAX_CACHE_LEN={}", cfg.max_cache_len);
    println!(
        "SAMD_STATIC_INDEX={}",
        opt(cfg.static_index.as_ref().map(|p| p.display().to_string()))
    );
    println!("SAMD_LOG_LEVEL={}", cfg.log_level);
    println!("SAMD_LOG_FORMAT={}", format!("{:?}", cfg.log_format).to_lowercase());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_have_no_warnings() {
        assert!(config_warnings(&EnvConfig::default()).is_empty());
    }

    #[test]
    fn test_draft_larger_than_cache_warns() {
        let mut env = EnvConfig::default();
        env.speculative.max_predicts = 40;
        env.speculative.max_tree_size = 8;
        env.cache.capacity = 40;
        let warnings = config_warnings(&env);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("41 tokens"));

        env.cache.capacity = 41;
        assert!(config_warnings(&env).is_empty());
    }

    #[test]
    fn test_missing_static_index_warns() {
        let mut env = EnvConfig::default();
        env.static_index = Some("/nonexistent/corpus.samd".into());
        let warnings = config_warnings(&env);
        assert!(warnings.iter().any(|w| w.contains("does not exist")));
    }
}
