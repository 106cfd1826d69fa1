//! Online suffix automaton over token ids.
//!
//! States live in a single append-only arena. The indexed token stream keeps a
//! sentinel at index 0 so that state end positions can be used directly as
//! 1-based offsets into it.

use serde::{Deserialize, Serialize};

use super::state::{Cursor, Prediction, State, StateId, PAD_TOKEN, ROOT};

const SENTINEL: u32 = u32::MAX;

/// Suffix automaton built incrementally over a token stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuffixAutomaton {
    states: Vec<State>,
    tokens: Vec<u32>,
    last: StateId,
}

impl Default for SuffixAutomaton {
    fn default() -> Self {
        Self::new()
    }
}

impl SuffixAutomaton {
    /// Create an empty automaton holding only the root state.
    pub fn new() -> Self {
        Self {
            states: vec![State::root()],
            tokens: vec![SENTINEL],
            last: ROOT,
        }
    }

    /// Create an empty automaton sized for roughly `tokens` stream tokens.
    pub fn with_capacity(tokens: usize) -> Self {
        let mut states = Vec::with_capacity(2 * tokens + 1);
        states.push(State::root());
        let mut stream = Vec::with_capacity(tokens + 1);
        stream.push(SENTINEL);
        Self {
            states,
            tokens: stream,
            last: ROOT,
        }
    }

    /// Build an automaton over `tokens` in one pass.
    pub fn from_tokens(tokens: &[u32]) -> Self {
        let mut sam = Self::with_capacity(tokens.len());
        sam.extend(tokens);
        sam
    }

    /// Number of indexed tokens (the sentinel is not counted).
    pub fn len(&self) -> usize {
        self.tokens.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Indexed token stream without the sentinel.
    pub fn tokens(&self) -> &[u32] {
        &self.tokens[1..]
    }

    /// State by id. Panics on an id this automaton never issued.
    pub fn state(&self, id: StateId) -> &State {
        &self.states[id]
    }

    /// Most recently created non-clone state.
    pub fn last(&self) -> StateId {
        self.last
    }

    /// Append every token of `tokens` to the stream.
    pub fn extend(&mut self, tokens: &[u32]) {
        for &token in tokens {
            self.add_token(token);
        }
    }

    /// Extend the stream by one token.
    ///
    /// Creates exactly one new state and at most one clone.
    pub fn add_token(&mut self, token: u32) {
        self.tokens.push(token);
        let length = self.len();
        let cur = self.push_state(State::with_length(length, length));

        let mut walk = Some(self.last);
        while let Some(p) = walk {
            if self.states[p].next.contains_key(&token) {
                break;
            }
            self.states[p].next.insert(token, cur);
            walk = self.states[p].link;
        }

        match walk {
            None => self.states[cur].link = Some(ROOT),
            Some(p) => {
                let q = self.states[p].next[&token];
                if self.states[p].length + 1 == self.states[q].length {
                    self.states[cur].link = Some(q);
                } else {
                    let mut split = self.states[q].clone();
                    split.length = self.states[p].length + 1;
                    let clone = self.push_state(split);

                    let mut redirect = Some(p);
                    while let Some(r) = redirect {
                        if self.states[r].next.get(&token) != Some(&q) {
                            break;
                        }
                        self.states[r].next.insert(token, clone);
                        redirect = self.states[r].link;
                    }
                    self.states[q].link = Some(clone);
                    self.states[cur].link = Some(clone);
                }
            }
        }

        self.last = cur;
    }

    /// Follow `token` from `cursor`, falling back along suffix links.
    ///
    /// The result is the longest suffix of (matched text + `token`) that occurs
    /// in the stream, or the root when `token` was never seen.
    pub fn advance(&self, cursor: Cursor, token: u32) -> Cursor {
        let Cursor { mut state, mut length } = cursor;
        while state != ROOT && !self.states[state].next.contains_key(&token) {
            state = self.states[state].link.unwrap_or(ROOT);
            length = self.states[state].length;
        }
        match self.states[state].next.get(&token) {
            Some(&next) => Cursor {
                state: next,
                length: length + 1,
            },
            None => Cursor::root(),
        }
    }

    /// Walk suffix links until the state's earliest occurrence leaves at least
    /// `horizon` tokens of recorded history after it.
    pub fn retract(&self, cursor: Cursor, horizon: usize) -> Cursor {
        let Cursor { mut state, mut length } = cursor;
        while state != ROOT && self.len() - self.states[state].min_endpos < horizon {
            state = self.states[state].link.unwrap_or(ROOT);
            length = self.states[state].length;
        }
        Cursor { state, length }
    }

    /// Predict the `horizon` tokens following the match of `token` from `cursor`.
    ///
    /// Does not move `cursor`.
    pub fn lookup(&self, cursor: Cursor, token: u32, horizon: usize) -> Prediction {
        let matched = self.retract(self.advance(cursor, token), horizon);
        let endpos = self.states[matched.state].min_endpos;
        Prediction {
            tokens: self.continuation(endpos, horizon),
            match_length: matched.length,
        }
    }

    /// `horizon` tokens of the stream after 1-based position `endpos`, padded.
    pub fn continuation(&self, endpos: usize, horizon: usize) -> Vec<u32> {
        let start = (endpos + 1).min(self.tokens.len());
        let end = (start + horizon).min(self.tokens.len());
        let mut out = Vec::with_capacity(horizon);
        out.extend_from_slice(&self.tokens[start..end]);
        out.resize(horizon, PAD_TOKEN);
        out
    }

    /// Check the structural invariants of a deserialized automaton.
    pub fn verify_structure(&self) -> Result<(), String> {
        if self.tokens.is_empty() {
            return Err("token stream is missing its sentinel".into());
        }
        let root = self.states.first().ok_or("automaton has no root state")?;
        if root.link.is_some() || root.length != 0 {
            return Err("root state must have no suffix link and zero length".into());
        }
        if self.last >= self.states.len() {
            return Err(format!("last state {} out of range", self.last));
        }
        for (id, state) in self.states.iter().enumerate().skip(1) {
            let link = state
                .link
                .ok_or_else(|| format!("state {} has no suffix link", id))?;
            if link >= self.states.len() {
                return Err(format!("state {} links to missing state {}", id, link));
            }
            if self.states[link].length >= state.length {
                return Err(format!("state {} is not longer than its suffix link", id));
            }
            if state.min_endpos > self.len() || state.min_endpos < state.length {
                return Err(format!("state {} has invalid end position", id));
            }
        }
        for (id, state) in self.states.iter().enumerate() {
            if let Some((token, _)) = state.next.iter().find(|(_, t)| **t >= self.states.len()) {
                return Err(format!("state {} transition on {} out of range", id, token));
            }
        }
        Ok(())
    }

    fn push_state(&mut self, state: State) -> StateId {
        self.states.push(state);
        self.states.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(sam: &SuffixAutomaton, tokens: &[u32]) -> Cursor {
        tokens.iter().fold(Cursor::root(), |c, &t| sam.advance(c, t))
    }

    #[test]
    fn test_empty_automaton_has_root_only() {
        let sam = SuffixAutomaton::new();
        assert!(sam.is_empty());
        assert_eq!(sam.num_states(), 1);
        assert_eq!(sam.lookup(Cursor::root(), 7, 4), Prediction::empty(4));
    }

    #[test]
    fn test_recognizes_every_substring() {
        let stream = [3, 1, 4, 1, 5, 9, 2, 6, 5, 3, 5];
        let sam = SuffixAutomaton::from_tokens(&stream);
        for i in 0..stream.len() {
            for j in i + 1..=stream.len() {
                let cursor = walk(&sam, &stream[i..j]);
                assert_eq!(cursor.length, j - i, "substring {:?}", &stream[i..j]);
            }
        }
    }

    #[test]
    fn test_state_count_bound() {
        let stream: Vec<u32> = (0..200).map(|i| (i * 7 % 13) as u32).collect();
        let sam = SuffixAutomaton::from_tokens(&stream);
        assert!(sam.num_states() <= 2 * stream.len());
        assert!(sam.verify_structure().is_ok());
    }

    #[test]
    fn test_link_length_strictly_decreases() {
        let sam = SuffixAutomaton::from_tokens(&[1, 2, 1, 2, 1, 3, 1, 2]);
        for id in 1..sam.num_states() {
            let state = sam.state(id);
            let link = state.link.expect("non-root state has a link");
            assert!(sam.state(link).length < state.length);
        }
    }

    #[test]
    fn test_advance_unknown_token_resets() {
        let sam = SuffixAutomaton::from_tokens(&[1, 2, 3]);
        let cursor = walk(&sam, &[1, 2]);
        assert_eq!(sam.advance(cursor, 42), Cursor::root());
    }

    #[test]
    fn test_advance_falls_back_to_shorter_suffix() {
        let sam = SuffixAutomaton::from_tokens(&[1, 2, 3, 2, 4]);
        let cursor = walk(&sam, &[1, 2]);
        let cursor = sam.advance(cursor, 4);
        assert_eq!(cursor.length, 2);
    }

    #[test]
    fn test_retract_is_idempotent() {
        let sam = SuffixAutomaton::from_tokens(&[5, 1, 2, 3, 1, 2, 3, 1, 2]);
        let cursor = walk(&sam, &[1, 2, 3, 1, 2]);
        let once = sam.retract(cursor, 3);
        assert_eq!(sam.retract(once, 3), once);
    }

    #[test]
    fn test_continuation_pads_with_zero() {
        let sam = SuffixAutomaton::from_tokens(&[8, 9]);
        assert_eq!(sam.continuation(1, 4), vec![9, 0, 0, 0]);
        assert_eq!(sam.continuation(2, 2), vec![0, 0]);
    }
}
