//! Candidate layout: drafts turned into one scoreable batch.
//!
//! Flattened position 0 is always the root token chosen from the previous
//! step's distribution. Every path starts there.

use super::model::{AttentionMask, ModelBatch};

/// Where a draft came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DraftSource {
    /// Automaton over the current request.
    Dynamic,
    /// Shared corpus automaton.
    Static,
    /// Tree drafter.
    Tree,
}

impl DraftSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dynamic => "dynamic",
            Self::Static => "static",
            Self::Tree => "tree",
        }
    }
}

/// Token tree produced by a tree drafter. Node 0 is the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTree {
    tokens: Vec<u32>,
    parents: Vec<Option<usize>>,
}

impl TokenTree {
    pub fn new(root: u32) -> Self {
        Self {
            tokens: vec![root],
            parents: vec![None],
        }
    }

    /// Linear tree `root -> tokens[0] -> tokens[1] -> ...`.
    pub fn chain(root: u32, tokens: &[u32]) -> Self {
        let mut tree = Self::new(root);
        let mut parent = 0;
        for &token in tokens {
            parent = tree.push(parent, token);
        }
        tree
    }

    /// Add `token` under node `parent` and return the new node's index.
    pub fn push(&mut self, parent: usize, token: u32) -> usize {
        assert!(parent < self.tokens.len(), "parent node {} does not exist", parent);
        self.tokens.push(token);
        self.parents.push(Some(parent));
        self.tokens.len() - 1
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Always false; a tree holds at least its root.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn root(&self) -> u32 {
        self.tokens[0]
    }

    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn parent(&self, node: usize) -> Option<usize> {
        self.parents[node]
    }

    /// Edges between `node` and the root.
    pub fn depth(&self, node: usize) -> usize {
        let mut depth = 0;
        let mut cur = node;
        while let Some(parent) = self.parents[cur] {
            depth += 1;
            cur = parent;
        }
        depth
    }
}

/// Layout-specific part of a [`Candidate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateKind {
    /// One causal path over every position.
    Sequence,
    /// Branching draft, nodes laid out breadth-first.
    Tree {
        /// Depth of each flattened position; the root is 0.
        depths: Vec<usize>,
        /// Flattened positions of each root-to-leaf path, in leaf order.
        retrieval: Vec<Vec<usize>>,
        /// Ancestor-or-self attention.
        mask: AttentionMask,
    },
}

/// One decoding step's candidate batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    tokens: Vec<u32>,
    source: DraftSource,
    kind: CandidateKind,
}

impl Candidate {
    /// Flat candidate: `root` followed by the predicted tokens.
    pub fn sequence(root: u32, predicted: &[u32], source: DraftSource) -> Self {
        let mut tokens = Vec::with_capacity(predicted.len() + 1);
        tokens.push(root);
        tokens.extend_from_slice(predicted);
        Self {
            tokens,
            source,
            kind: CandidateKind::Sequence,
        }
    }

    /// Tree candidate. Nodes are reordered breadth-first by depth, keeping
    /// insertion order within a depth.
    pub fn tree(tree: &TokenTree) -> Self {
        let n = tree.len();
        let node_depths: Vec<usize> = (0..n).map(|i| tree.depth(i)).collect();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| node_depths[i]);

        let mut flat_of = vec![0; n];
        for (flat, &node) in order.iter().enumerate() {
            flat_of[node] = flat;
        }

        let tokens: Vec<u32> = order.iter().map(|&node| tree.tokens[node]).collect();
        let depths: Vec<usize> = order.iter().map(|&node| node_depths[node]).collect();
        let parents: Vec<Option<usize>> = order
            .iter()
            .map(|&node| tree.parents[node].map(|p| flat_of[p]))
            .collect();

        let mut has_child = vec![false; n];
        for parent in parents.iter().flatten() {
            has_child[*parent] = true;
        }

        let mut mask = AttentionMask::new(n);
        let mut retrieval = Vec::new();
        for i in 0..n {
            let mut path = vec![i];
            let mut cur = i;
            while let Some(parent) = parents[cur] {
                path.push(parent);
                cur = parent;
            }
            for &j in &path {
                mask.set(i, j, true);
            }
            if !has_child[i] {
                path.reverse();
                retrieval.push(path);
            }
        }

        Self {
            tokens,
            source: DraftSource::Tree,
            kind: CandidateKind::Tree {
                depths,
                retrieval,
                mask,
            },
        }
    }

    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn source(&self) -> DraftSource {
        self.source
    }

    pub fn kind(&self) -> &CandidateKind {
        &self.kind
    }

    /// Flattened positions, root included.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Drafted tokens, the root excluded.
    pub fn drafted(&self) -> usize {
        self.tokens.len().saturating_sub(1)
    }

    /// Flattened positions of every root-to-leaf path, strictly increasing.
    pub fn paths(&self) -> Vec<Vec<usize>> {
        match &self.kind {
            CandidateKind::Sequence => vec![(0..self.tokens.len()).collect()],
            CandidateKind::Tree { retrieval, .. } => retrieval.clone(),
        }
    }

    /// Tokens along a path of flattened positions.
    pub fn path_tokens(&self, path: &[usize]) -> Vec<u32> {
        path.iter().map(|&pos| self.tokens[pos]).collect()
    }

    /// Batch for the base model with positions offset by the committed length.
    pub fn to_batch(&self, offset: usize) -> ModelBatch {
        match &self.kind {
            CandidateKind::Sequence => ModelBatch::causal(self.tokens.clone(), offset),
            CandidateKind::Tree { depths, mask, .. } => ModelBatch {
                token_ids: self.tokens.clone(),
                position_ids: depths.iter().map(|d| offset + d).collect(),
                attention_mask: Some(mask.clone()),
            },
        }
    }
}
