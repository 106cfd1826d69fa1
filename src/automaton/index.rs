//! Dynamic (per-request) and static (shared corpus) token indexes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::sam::SuffixAutomaton;
use super::state::{Cursor, Prediction};

/// Sequences between build progress log lines.
const BUILD_LOG_INTERVAL: usize = 10_000;

/// Automaton grown online from the current request's own tokens.
///
/// Reset at the start of every request.
#[derive(Debug, Clone)]
pub struct DynamicIndex {
    automaton: SuffixAutomaton,
    cursor: Cursor,
    horizon: usize,
}

impl DynamicIndex {
    /// Create an empty index predicting `horizon` tokens per lookup.
    pub fn new(horizon: usize) -> Self {
        Self {
            automaton: SuffixAutomaton::new(),
            cursor: Cursor::root(),
            horizon,
        }
    }

    /// Drop everything indexed so far.
    pub fn reset(&mut self) {
        self.automaton = SuffixAutomaton::new();
        self.cursor = Cursor::root();
    }

    /// Predict the continuation after `token` without moving the cursor.
    pub fn lookup(&self, token: u32) -> Prediction {
        self.automaton.lookup(self.cursor, token, self.horizon)
    }

    /// Absorb accepted tokens so later lookups can match against them.
    pub fn commit_tokens(&mut self, tokens: &[u32]) {
        for &token in tokens {
            self.automaton.add_token(token);
            self.cursor = self.automaton.advance(self.cursor, token);
        }
        self.cursor = self.automaton.retract(self.cursor, self.horizon);
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn automaton(&self) -> &SuffixAutomaton {
        &self.automaton
    }
}

/// Frozen automaton built once from a corpus of historical sequences.
///
/// Never mutated after construction; share it behind an [`Arc`] and give each
/// request its own [`StaticIndex`] view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusIndex {
    pub(crate) format_version: u32,
    pub(crate) eos_token: u32,
    pub(crate) sequences: usize,
    pub(crate) automaton: SuffixAutomaton,
}

impl CorpusIndex {
    /// Build from a batch of token sequences.
    ///
    /// Every sequence not already terminated by `eos_token` gets one appended,
    /// so continuations never cross document boundaries. Empty sequences are
    /// skipped.
    pub fn build<I, S>(batch: I, eos_token: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u32]>,
    {
        let mut automaton = SuffixAutomaton::new();
        let mut sequences = 0;
        for seq in batch {
            let tokens = seq.as_ref();
            let Some(&tail) = tokens.last() else {
                continue;
            };
            automaton.extend(tokens);
            if tail != eos_token {
                automaton.add_token(eos_token);
            }
            sequences += 1;
            if sequences % BUILD_LOG_INTERVAL == 0 {
                tracing::info!(
                    sequences,
                    tokens = automaton.len(),
                    states = automaton.num_states(),
                    "static index build progress"
                );
            }
        }
        tracing::debug!(
            sequences,
            tokens = automaton.len(),
            states = automaton.num_states(),
            "static index built"
        );
        Self {
            format_version: super::persist::FORMAT_VERSION,
            eos_token,
            sequences,
            automaton,
        }
    }

    pub fn automaton(&self) -> &SuffixAutomaton {
        &self.automaton
    }

    pub fn eos_token(&self) -> u32 {
        self.eos_token
    }

    /// Number of non-empty sequences indexed.
    pub fn sequences(&self) -> usize {
        self.sequences
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }
}

/// Per-request view of a shared [`CorpusIndex`].
///
/// Holds the request-local cursor. A view without a corpus is the null
/// variant: every lookup reports zero confidence.
#[derive(Debug, Clone)]
pub struct StaticIndex {
    corpus: Option<Arc<CorpusIndex>>,
    cursor: Cursor,
    horizon: usize,
}

impl StaticIndex {
    pub fn new(corpus: Arc<CorpusIndex>, horizon: usize) -> Self {
        Self {
            corpus: Some(corpus),
            cursor: Cursor::root(),
            horizon,
        }
    }

    /// View that never predicts anything.
    pub fn null(horizon: usize) -> Self {
        Self {
            corpus: None,
            cursor: Cursor::root(),
            horizon,
        }
    }

    pub fn is_null(&self) -> bool {
        self.corpus.is_none()
    }

    /// Rewind the cursor. The corpus itself is untouched.
    pub fn reset(&mut self) {
        self.cursor = Cursor::root();
    }

    /// Predict the continuation after `token` without moving the cursor.
    pub fn lookup(&self, token: u32) -> Prediction {
        match &self.corpus {
            Some(corpus) => corpus.automaton.lookup(self.cursor, token, self.horizon),
            None => Prediction::empty(self.horizon),
        }
    }

    /// Move the cursor over accepted tokens. The corpus is not extended.
    pub fn commit_tokens(&mut self, tokens: &[u32]) {
        let Some(corpus) = &self.corpus else {
            return;
        };
        let automaton = &corpus.automaton;
        for &token in tokens {
            self.cursor = automaton.advance(self.cursor, token);
        }
        self.cursor = automaton.retract(self.cursor, self.horizon);
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn horizon(&self) -> usize {
        self.horizon
    }

    pub fn corpus(&self) -> Option<&Arc<CorpusIndex>> {
        self.corpus.as_ref()
    }
}
