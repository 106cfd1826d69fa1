//! Draft selection policy tests.

use std::sync::Arc;

use samd_core::automaton::CorpusIndex;
use samd_core::engine::{
    Draft, DraftSelector, DraftSource, SpeculativeConfig, TokenRecycleDrafter, TokenTree,
    TreeDrafter,
};

/// Drafts `root -> root + 1 -> root + 2`.
struct ChainDrafter;

impl TreeDrafter for ChainDrafter {
    fn draft(&self, root: u32, max_nodes: usize) -> TokenTree {
        let chain = [root + 1, root + 2];
        TokenTree::chain(root, &chain[..chain.len().min(max_nodes - 1)])
    }

    fn update(&mut self, tokens: &[u32], rows: &[&[f32]]) {
        assert_eq!(tokens.len(), rows.len());
    }

    fn reset(&mut self) {}
}

fn config(len_threshold: usize, len_bias: usize) -> SpeculativeConfig {
    SpeculativeConfig {
        max_predicts: 3,
        len_threshold,
        len_bias,
        ..Default::default()
    }
}

fn commit(selector: &mut DraftSelector, tokens: &[u32]) {
    let row = [0.0f32; 16];
    let rows: Vec<&[f32]> = tokens.iter().map(|_| row.as_slice()).collect();
    selector.commit(tokens, &rows);
}

#[test]
fn test_without_tree_drafter_always_sequence() {
    let selector = DraftSelector::new(config(100, 0), None, None);
    match selector.select(5) {
        Draft::Sequence { source, match_length, tokens } => {
            assert_eq!(source, DraftSource::Dynamic);
            assert_eq!(match_length, 0);
            assert_eq!(tokens.len(), 3);
        }
        other => panic!("expected a sequence draft, got {:?}", other),
    }
}

#[test]
fn test_low_confidence_falls_back_to_tree() {
    let drafter: Box<dyn TreeDrafter> = Box::new(ChainDrafter);
    let mut selector = DraftSelector::new(config(4, 0), None, Some(drafter));
    commit(&mut selector, &[1, 2, 3, 1, 2, 3]);

    let draft = selector.select(9);
    assert_eq!(draft.source(), DraftSource::Tree);
    let candidate = draft.into_candidate(9);
    assert_eq!(candidate.tokens(), &[9, 10, 11]);
}

#[test]
fn test_confident_match_beats_tree() {
    let drafter: Box<dyn TreeDrafter> = Box::new(ChainDrafter);
    let mut selector = DraftSelector::new(config(2, 0), None, Some(drafter));
    commit(&mut selector, &[4, 5, 6, 7, 4, 5, 6, 7, 4, 5]);

    match selector.select(6) {
        Draft::Sequence { source, tokens, match_length } => {
            assert_eq!(source, DraftSource::Dynamic);
            assert!(match_length >= 2);
            assert_eq!(tokens, vec![7, 4, 5]);
        }
        other => panic!("expected a sequence draft, got {:?}", other),
    }
}

#[test]
fn test_corpus_draft_needs_to_clear_bias() {
    let corpus = Arc::new(CorpusIndex::build(vec![(20..40).collect::<Vec<u32>>()], 0));

    let mut unbiased = DraftSelector::new(config(1, 2), Some(Arc::clone(&corpus)), None);
    commit(&mut unbiased, &[21, 22, 23]);
    let draft = unbiased.select(24);
    assert_eq!(draft.source(), DraftSource::Static);
    assert_eq!(draft.into_candidate(24).tokens(), &[24, 25, 26, 27]);

    let mut biased = DraftSelector::new(config(1, 50), Some(corpus), None);
    commit(&mut biased, &[21, 22, 23]);
    assert_eq!(biased.select(24).source(), DraftSource::Dynamic);
}

#[test]
fn test_selection_does_not_move_cursors() {
    let corpus = Arc::new(CorpusIndex::build(vec![vec![1, 2, 3, 4, 5, 6]], 0));
    let mut selector = DraftSelector::new(config(1, 0), Some(corpus), None);
    commit(&mut selector, &[1, 2]);

    let dynamic = selector.dynamic().cursor();
    let corpus = selector.corpus().cursor();
    let first = selector.select(3);
    let second = selector.select(3);
    assert_eq!(first, second);
    assert_eq!(selector.dynamic().cursor(), dynamic);
    assert_eq!(selector.corpus().cursor(), corpus);
}

#[test]
fn test_reset_keeps_corpus() {
    let corpus = Arc::new(CorpusIndex::build(vec![vec![1, 2, 3, 4, 5, 6]], 0));
    let mut selector = DraftSelector::new(config(1, 0), Some(corpus), None);
    commit(&mut selector, &[1, 2, 3]);
    selector.reset();

    assert!(selector.dynamic().automaton().is_empty());
    assert!(!selector.corpus().is_null());
    let draft = selector.select(1);
    assert_eq!(draft.source(), DraftSource::Static);
}

#[test]
fn test_token_recycle_learns_from_committed_rows() {
    let drafter = TokenRecycleDrafter::new(2, vec![vec![0], vec![0, 0], vec![1]]);
    let mut selector = DraftSelector::new(config(100, 0), None, Some(Box::new(drafter)));

    let mut row_a = vec![0.0f32; 16];
    row_a[7] = 5.0;
    row_a[3] = 2.0;
    let mut row_b = vec![0.0f32; 16];
    row_b[9] = 5.0;
    selector.commit(&[1, 7], &[row_a.as_slice(), row_b.as_slice()]);

    let Draft::Tree(tree) = selector.select(1) else {
        panic!("expected a tree draft");
    };
    // Template is expanded shortest path first: [0], [1], then [0, 0].
    assert_eq!(tree.tokens(), &[1, 7, 3, 9]);
    assert_eq!(tree.parent(2), Some(0));
    assert_eq!(tree.parent(3), Some(1));
}

#[test]
fn test_shared_corpus_serves_parallel_selectors() {
    let corpus = Arc::new(CorpusIndex::build(
        vec![vec![1, 2, 3, 4, 5, 6, 7, 8], vec![9, 10, 11, 12]],
        0,
    ));
    let handles: Vec<_> = [vec![1u32, 2], vec![9], vec![5, 6]]
        .into_iter()
        .map(|history| {
            let corpus = Arc::clone(&corpus);
            std::thread::spawn(move || {
                let mut selector = DraftSelector::new(config(1, 0), Some(corpus), None);
                commit(&mut selector, &history);
                let next = history[history.len() - 1] + 1;
                selector.select(next).into_candidate(next).tokens().to_vec()
            })
        })
        .collect();

    let drafts: Vec<Vec<u32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(drafts[0], vec![3, 4, 5, 6]);
    assert_eq!(drafts[1], vec![10, 11, 12, 0]);
    assert_eq!(drafts[2], vec![7, 8, 0, 9]);
}
