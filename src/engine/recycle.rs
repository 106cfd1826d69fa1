//! Token-recycle tree drafter.
//!
//! Remembers, for every token scored so far, the base model's top-k next
//! tokens at that position and expands a fixed rank template over them.

use std::collections::HashMap;

use super::candidate::TokenTree;
use super::config::SpeculativeConfig;
use super::draft::TreeDrafter;

#[derive(Debug, Clone)]
pub struct TokenRecycleDrafter {
    top_k: usize,
    /// Rank paths, shortest first so parents precede children.
    template: Vec<Vec<usize>>,
    successors: HashMap<u32, Vec<u32>>,
}

impl TokenRecycleDrafter {
    pub fn new(top_k: usize, mut template: Vec<Vec<usize>>) -> Self {
        template.retain(|path| !path.is_empty());
        template.sort_by_key(Vec::len);
        Self {
            top_k,
            template,
            successors: HashMap::new(),
        }
    }

    pub fn from_config(config: &SpeculativeConfig) -> Self {
        Self::new(config.tree_top_k, config.tree_template.clone())
    }

    /// Remembered successors of `token`, most likely first.
    pub fn successors(&self, token: u32) -> Option<&[u32]> {
        self.successors.get(&token).map(Vec::as_slice)
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

/// Indices of the `k` largest scores, highest first, ties to the lower index.
pub(crate) fn top_k_indices(scores: &[f32], k: usize) -> Vec<u32> {
    let by_score = |a: &usize, b: &usize| scores[*b].total_cmp(&scores[*a]).then(a.cmp(b));
    let mut idx: Vec<usize> = (0..scores.len()).collect();
    if k < idx.len() {
        if k > 0 {
            idx.select_nth_unstable_by(k - 1, by_score);
        }
        idx.truncate(k);
    }
    idx.sort_by(by_score);
    idx.into_iter().map(|i| i as u32).collect()
}

impl TreeDrafter for TokenRecycleDrafter {
    fn draft(&self, root: u32, max_nodes: usize) -> TokenTree {
        let mut tree = TokenTree::new(root);
        let mut nodes: HashMap<&[usize], usize> = HashMap::new();
        nodes.insert(&[], 0);

        for path in &self.template {
            if tree.len() >= max_nodes {
                break;
            }
            let (&rank, prefix) = match path.split_last() {
                Some(split) => split,
                None => continue,
            };
            let Some(&parent) = nodes.get(prefix) else {
                continue;
            };
            let parent_token = tree.tokens()[parent];
            let Some(&token) = self
                .successors
                .get(&parent_token)
                .and_then(|next| next.get(rank))
            else {
                continue;
            };
            let node = tree.push(parent, token);
            nodes.insert(path.as_slice(), node);
        }
        tree
    }

    fn update(&mut self, tokens: &[u32], rows: &[&[f32]]) {
        for (&token, row) in tokens.iter().zip(rows) {
            self.successors.insert(token, top_k_indices(row, self.top_k));
        }
    }

    fn reset(&mut self) {
        self.successors.clear();
    }
}
