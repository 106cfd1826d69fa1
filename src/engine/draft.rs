//! Draft selection between the dynamic automaton, the static corpus, and a
//! tree drafter.

use std::sync::Arc;

use crate::automaton::{CorpusIndex, DynamicIndex, StaticIndex};

use super::candidate::{Candidate, DraftSource, TokenTree};
use super::config::SpeculativeConfig;

/// Learned or heuristic drafter producing a token tree.
///
/// Used when neither automaton is confident enough.
pub trait TreeDrafter: Send {
    /// Tree rooted at `root` with at most `max_nodes` nodes, root included.
    fn draft(&self, root: u32, max_nodes: usize) -> TokenTree;

    /// Observe scored tokens and the logits row computed at each of them.
    fn update(&mut self, tokens: &[u32], rows: &[&[f32]]);

    /// Forget request-local state.
    fn reset(&mut self);
}

/// Output of [`DraftSelector::select`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draft {
    /// Continuation predicted by an automaton, root not included.
    Sequence {
        tokens: Vec<u32>,
        source: DraftSource,
        match_length: usize,
    },
    /// Tree rooted at the root token.
    Tree(TokenTree),
}

impl Draft {
    pub fn source(&self) -> DraftSource {
        match self {
            Self::Sequence { source, .. } => *source,
            Self::Tree(_) => DraftSource::Tree,
        }
    }

    /// Lay out the draft behind `root`.
    pub fn into_candidate(self, root: u32) -> Candidate {
        match self {
            Self::Sequence { tokens, source, .. } => Candidate::sequence(root, &tokens, source),
            Self::Tree(tree) => {
                debug_assert_eq!(tree.root(), root, "tree drafted for a different root");
                Candidate::tree(&tree)
            }
        }
    }
}

/// Per-request draft policy and the indexes it reads.
pub struct DraftSelector {
    config: SpeculativeConfig,
    dynamic: DynamicIndex,
    corpus: StaticIndex,
    tree: Option<Box<dyn TreeDrafter>>,
}

impl std::fmt::Debug for DraftSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DraftSelector")
            .field("config", &self.config)
            .field("dynamic", &self.dynamic.automaton().len())
            .field("corpus", &!self.corpus.is_null())
            .field("tree", &self.tree.is_some())
            .finish()
    }
}

impl DraftSelector {
    /// Without a tree drafter the selector always emits an automaton draft.
    pub fn new(
        config: SpeculativeConfig,
        corpus: Option<Arc<CorpusIndex>>,
        tree: Option<Box<dyn TreeDrafter>>,
    ) -> Self {
        let horizon = config.max_predicts;
        let corpus = match corpus {
            Some(corpus) => StaticIndex::new(corpus, horizon),
            None => StaticIndex::null(horizon),
        };
        Self {
            dynamic: DynamicIndex::new(horizon),
            corpus,
            tree,
            config,
        }
    }

    /// Choose the draft following `root`. Does not change any state.
    pub fn select(&self, root: u32) -> Draft {
        let dynamic = self.dynamic.lookup(root);
        let corpus = self.corpus.lookup(root);
        let biased = corpus.match_length.saturating_sub(self.config.len_bias);

        if let Some(tree) = &self.tree {
            if dynamic.match_length.max(biased) < self.config.len_threshold {
                return Draft::Tree(tree.draft(root, self.config.max_tree_size));
            }
        }

        if dynamic.match_length >= biased {
            Draft::Sequence {
                tokens: dynamic.tokens,
                source: DraftSource::Dynamic,
                match_length: dynamic.match_length,
            }
        } else {
            Draft::Sequence {
                tokens: corpus.tokens,
                source: DraftSource::Static,
                match_length: corpus.match_length,
            }
        }
    }

    /// Absorb accepted tokens and the logits row scored at each one.
    pub fn commit(&mut self, tokens: &[u32], rows: &[&[f32]]) {
        self.dynamic.commit_tokens(tokens);
        self.corpus.commit_tokens(tokens);
        if let Some(tree) = &mut self.tree {
            tree.update(tokens, rows);
        }
    }

    /// Start a new request. The shared corpus is kept.
    pub fn reset(&mut self) {
        self.dynamic.reset();
        self.corpus.reset();
        if let Some(tree) = &mut self.tree {
            tree.reset();
        }
    }

    pub fn set_corpus(&mut self, corpus: Option<Arc<CorpusIndex>>) {
        let horizon = self.config.max_predicts;
        self.corpus = match corpus {
            Some(corpus) => StaticIndex::new(corpus, horizon),
            None => StaticIndex::null(horizon),
        };
    }

    pub fn set_tree_drafter(&mut self, tree: Option<Box<dyn TreeDrafter>>) {
        self.tree = tree;
    }

    pub fn has_tree_drafter(&self) -> bool {
        self.tree.is_some()
    }

    pub fn config(&self) -> &SpeculativeConfig {
        &self.config
    }

    pub fn dynamic(&self) -> &DynamicIndex {
        &self.dynamic
    }

    pub fn corpus(&self) -> &StaticIndex {
        &self.corpus
    }
}
