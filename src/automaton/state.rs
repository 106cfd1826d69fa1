//! Automaton states, cursors, and prediction results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Dense index of a state inside the automaton arena.
pub type StateId = usize;

/// The root state. Always present, never has a suffix link.
pub const ROOT: StateId = 0;

/// Token used to pad predictions that run past the end of the stream.
pub const PAD_TOKEN: u32 = 0;

/// A single suffix-automaton state.
///
/// Transitions and the suffix link are plain indices into the owning arena.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Outgoing transitions keyed by token id.
    pub next: HashMap<u32, StateId>,
    /// Suffix link. `None` only for the root.
    pub link: Option<StateId>,
    /// Length of the longest string ending in this state.
    pub length: usize,
    /// Earliest end position (1-based) of any occurrence in the stream.
    pub min_endpos: usize,
}

impl State {
    pub(crate) fn root() -> Self {
        Self {
            next: HashMap::new(),
            link: None,
            length: 0,
            min_endpos: 0,
        }
    }

    pub(crate) fn with_length(length: usize, min_endpos: usize) -> Self {
        Self {
            next: HashMap::new(),
            link: None,
            length,
            min_endpos,
        }
    }
}

/// Per-caller position inside an automaton.
///
/// Cursors are plain values so a read-only automaton can be shared between
/// requests while each request tracks its own match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Cursor {
    /// State the last match ended in.
    pub state: StateId,
    /// Length of the matched suffix.
    pub length: usize,
}

impl Cursor {
    /// Cursor positioned at the root with an empty match.
    pub const fn root() -> Self {
        Self { state: ROOT, length: 0 }
    }
}

/// Continuation predicted by a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prediction {
    /// Exactly `horizon` tokens, padded with [`PAD_TOKEN`].
    pub tokens: Vec<u32>,
    /// Length of the matched suffix; zero means no confidence at all.
    pub match_length: usize,
}

impl Prediction {
    /// Zero-confidence prediction of the given span.
    pub fn empty(horizon: usize) -> Self {
        Self {
            tokens: vec![PAD_TOKEN; horizon],
            match_length: 0,
        }
    }
}
