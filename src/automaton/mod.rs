//! Suffix-automaton token index.
//!
//! Finds the longest previously seen suffix of the text generated so far and
//! replays what followed it. A [`DynamicIndex`] grows with the current request;
//! a [`CorpusIndex`] is built once from historical sequences and shared
//! read-only through per-request [`StaticIndex`] views.

mod index;
mod persist;
mod sam;
mod state;

pub use index::{CorpusIndex, DynamicIndex, StaticIndex};
pub use persist::{IndexError, FORMAT_VERSION};
pub use sam::SuffixAutomaton;
pub use state::{Cursor, Prediction, State, StateId, PAD_TOKEN, ROOT};
