//! Static index CLI subcommands: build, inspect, lookup.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use super::CliError;
use crate::automaton::{CorpusIndex, StaticIndex};

#[derive(Debug, Serialize)]
struct IndexSummary {
    format_version: u32,
    sequences: usize,
    tokens: usize,
    states: usize,
    eos_token: u32,
}

impl IndexSummary {
    fn of(index: &CorpusIndex) -> Self {
        Self {
            format_version: index.format_version(),
            sequences: index.sequences(),
            tokens: index.automaton().len(),
            states: index.automaton().num_states(),
            eos_token: index.eos_token(),
        }
    }
}

#[derive(Debug, Serialize)]
struct LookupReport {
    context: Vec<u32>,
    token: u32,
    prediction: Vec<u32>,
    match_length: usize,
}

/// Read a JSON array of token-id arrays.
pub fn read_corpus(path: &Path) -> Result<Vec<Vec<u32>>, CliError> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Build a static index from `corpus` and save it to `out`.
pub fn build(corpus: &Path, out: &Path, eos_token: u32) -> Result<CorpusIndex, CliError> {
    let sequences = read_corpus(corpus)?;
    let index = CorpusIndex::build(&sequences, eos_token);
    index.save(out)?;
    Ok(index)
}

/// Prediction after walking `tokens` through a fresh cursor.
fn lookup(index: CorpusIndex, tokens: &[u32], horizon: usize) -> Result<LookupReport, CliError> {
    let Some((&token, context)) = tokens.split_last() else {
        return Err(CliError::Usage("lookup needs at least one token".into()));
    };
    let mut view = StaticIndex::new(Arc::new(index), horizon);
    view.commit_tokens(context);
    let prediction = view.lookup(token);
    Ok(LookupReport {
        context: context.to_vec(),
        token,
        prediction: prediction.tokens,
        match_length: prediction.match_length,
    })
}

/// Run `build`. Returns exit code: 0 on success, 1 on failure.
pub fn run_build(corpus: &Path, out: &Path, eos_token: u32) -> i32 {
    match build(corpus, out, eos_token) {
        Ok(index) => print_json(&IndexSummary::of(&index)),
        Err(e) => {
            eprintln!("Error building index: {}", e);
            1
        }
    }
}

/// Run `inspect`.
pub fn run_inspect(path: &Path) -> i32 {
    match CorpusIndex::load(path) {
        Ok(index) => print_json(&IndexSummary::of(&index)),
        Err(e) => {
            eprintln!("Error loading index {}: {}", path.display(), e);
            1
        }
    }
}

/// Run `lookup`.
pub fn run_lookup(path: &Path, tokens: &[u32], horizon: usize) -> i32 {
    let result = CorpusIndex::load(path)
        .map_err(CliError::from)
        .and_then(|index| lookup(index, tokens, horizon));
    match result {
        Ok(report) => print_json(&report),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus.json");
        let out = dir.path().join("corpus.samd");
        std::fs::write(&corpus, "[[5, 1, 2, 3, 1, 2, 3], [7, 8]]").unwrap();

        let index = build(&corpus, &out, 0).unwrap();
        assert_eq!(index.sequences(), 2);

        let loaded = CorpusIndex::load(&out).unwrap();
        let report = lookup(loaded, &[1, 2], 2).unwrap();
        assert_eq!(report.prediction, vec![3, 1]);
        assert_eq!(report.match_length, 2);
    }

    #[test]
    fn test_lookup_without_tokens_is_usage_error() {
        let index = CorpusIndex::build(vec![vec![1u32]], 0);
        assert!(matches!(lookup(index, &[], 2), Err(CliError::Usage(_))));
    }

    #[test]
    fn test_bad_corpus_json() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus.json");
        std::fs::write(&corpus, "{\"not\": \"a corpus\"}").unwrap();
        assert!(matches!(read_corpus(&corpus), Err(CliError::Json(_))));
    }
}
