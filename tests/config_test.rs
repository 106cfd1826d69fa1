//! Config file loading tests.

use samd_core::config::{self, ConfigError};
use samd_core::engine::AcceptanceMode;

#[test]
fn test_load_file_reads_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samd.toml");
    std::fs::write(
        &path,
        r#"
        [speculative]
        max_predicts = 12
        tree_top_k = 4
        tree_template = [[0], [1], [0, 0], [0, 3]]

        [generation]
        max_new_tokens = 64
        eos_token = 2
        "#,
    )
    .unwrap();

    let cfg = config::load_file(&path).unwrap();
    assert_eq!(cfg.speculative.max_predicts, 12);
    assert_eq!(cfg.speculative.tree_template.len(), 4);
    assert_eq!(cfg.generation.max_new_tokens, 64);
    assert_eq!(cfg.generation.eos_token, Some(2));
    assert_eq!(cfg.generation.acceptance, AcceptanceMode::Greedy);
    assert_eq!(cfg.effective_config().tree_template_paths, 4);
}

#[test]
fn test_template_rank_outside_top_k_is_rejected() {
    let err = config::from_toml_str(
        "[speculative]\ntree_top_k = 2\ntree_template = [[0], [0, 5]]\n",
    )
    .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = config::load_file(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_empty_file_is_all_defaults() {
    let cfg = config::from_toml_str("").unwrap();
    assert_eq!(cfg.speculative.max_predicts, 40);
    assert_eq!(cfg.cache.capacity, 4096);
    assert!(cfg.static_index.is_none());
}

#[test]
fn test_small_top_k_trims_default_template() {
    let cfg = config::from_toml_str("[speculative]\ntree_top_k = 2\n").unwrap();
    assert_eq!(cfg.speculative.tree_top_k, 2);
    assert!(!cfg.speculative.tree_template.is_empty());
    assert!(cfg.speculative.tree_template.iter().flatten().all(|&rank| rank < 2));
}
