//! Acceptance of candidate paths against the base model's own distribution.

use super::candidate::Candidate;
use super::error::DecodeError;
use super::model::Logits;
use super::sampling::{acceptance_probability, argmax, remove_rejected, Seed, TokenSampler};

/// Outcome of verifying one candidate batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Index of the winning path in [`Candidate::paths`] order.
    pub path: usize,
    /// Drafted tokens accepted after the root.
    pub accept_length: usize,
    /// Emitted tokens: the root plus the accepted drafts.
    pub tokens: Vec<u32>,
    /// Flattened batch positions of `tokens`, strictly increasing.
    pub positions: Vec<usize>,
    /// Distribution the next step's root is drawn from.
    pub seed: Seed,
}

/// Number of leading drafts along one path that match the argmax of the row
/// scored just before them. `rows[i]` is the logits row at `tokens[i]`.
pub fn greedy_accept_length(tokens: &[u32], rows: &[&[f32]]) -> usize {
    tokens
        .iter()
        .skip(1)
        .zip(rows)
        .take_while(|(&token, row)| argmax(row) == token)
        .count()
}

/// Verify `candidate` against one logits row per flattened position.
pub fn verify(
    candidate: &Candidate,
    logits: &Logits,
    sampler: &mut TokenSampler,
) -> Result<Verdict, DecodeError> {
    if candidate.is_empty() {
        return Err(DecodeError::InputValidation("empty candidate".into()));
    }
    logits.expect_rows(candidate.len())?;
    let paths = candidate.paths();

    let verdict = if sampler.is_greedy() {
        verify_greedy(candidate, logits, &paths)
    } else {
        verify_sampled(candidate, logits, &paths, sampler)
    };
    assert!(
        verdict.accept_length < paths[verdict.path].len(),
        "accept length {} exceeds path of {} positions",
        verdict.accept_length,
        paths[verdict.path].len()
    );
    Ok(verdict)
}

fn verify_greedy(candidate: &Candidate, logits: &Logits, paths: &[Vec<usize>]) -> Verdict {
    let mut best_path = 0;
    let mut best_len = 0;
    for (i, path) in paths.iter().enumerate() {
        let tokens = candidate.path_tokens(path);
        let rows: Vec<&[f32]> = path.iter().map(|&pos| logits.row(pos)).collect();
        let len = greedy_accept_length(&tokens, &rows);
        if len > best_len {
            best_path = i;
            best_len = len;
        }
    }

    let positions = paths[best_path][..=best_len].to_vec();
    let boundary = positions[best_len];
    Verdict {
        path: best_path,
        accept_length: best_len,
        tokens: candidate.path_tokens(&positions),
        seed: Seed::Logits(logits.row(boundary).to_vec()),
        positions,
    }
}

/// Speculative sampling over the tree. Drafts are deterministic so each child
/// token has draft probability 1; rejected children leave a residual.
fn verify_sampled(
    candidate: &Candidate,
    logits: &Logits,
    paths: &[Vec<usize>],
    sampler: &mut TokenSampler,
) -> Verdict {
    let tokens = candidate.tokens();
    let mut live: Vec<usize> = (0..paths.len()).collect();
    let mut depth = 0;
    let mut probs = sampler.probabilities(logits.row(0));

    loop {
        let mut tried: Vec<u32> = Vec::new();
        let mut accepted = None;
        for &p in &live {
            let Some(&child) = paths[p].get(depth + 1) else {
                continue;
            };
            let token = tokens[child];
            if tried.contains(&token) {
                continue;
            }
            tried.push(token);
            let p_model = probs.get(token as usize).copied().unwrap_or(0.0);
            if sampler.uniform() < acceptance_probability(p_model, 1.0) {
                accepted = Some(child);
                break;
            }
            remove_rejected(&mut probs, token);
        }

        let Some(child) = accepted else {
            break;
        };
        live.retain(|&p| paths[p].get(depth + 1) == Some(&child));
        depth += 1;
        probs = sampler.probabilities(logits.row(child));
    }

    let path = live[0];
    let positions = paths[path][..=depth].to_vec();
    Verdict {
        path,
        accept_length: depth,
        tokens: candidate.path_tokens(&positions),
        positions,
        seed: Seed::Probs(probs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::candidate::DraftSource;
    use crate::engine::config::GenerationConfig;

    fn one_hot(vocab: usize, hot: u32) -> Vec<f32> {
        let mut row = vec![0.0; vocab];
        row[hot as usize] = 10.0;
        row
    }

    #[test]
    fn test_greedy_accept_length_stops_at_mismatch() {
        let rows = [one_hot(8, 2), one_hot(8, 3), one_hot(8, 7)];
        let rows: Vec<&[f32]> = rows.iter().map(Vec::as_slice).collect();
        assert_eq!(greedy_accept_length(&[1, 2, 3], &rows), 2);
        assert_eq!(greedy_accept_length(&[1, 5, 3], &rows), 0);
        assert_eq!(greedy_accept_length(&[1], &rows[..1]), 0);
    }

    #[test]
    fn test_zero_accept_still_emits_root() {
        let candidate = Candidate::sequence(4, &[1, 1], DraftSource::Dynamic);
        let logits = Logits::from_rows(vec![one_hot(8, 6); 3]).unwrap();
        let mut sampler = TokenSampler::new(&GenerationConfig::default());

        let verdict = verify(&candidate, &logits, &mut sampler).unwrap();
        assert_eq!(verdict.accept_length, 0);
        assert_eq!(verdict.tokens, vec![4]);
        assert_eq!(verdict.positions, vec![0]);
        assert_eq!(sampler.pick(&verdict.seed), 6);
    }

    #[test]
    fn test_wrong_row_count_is_rejected() {
        let candidate = Candidate::sequence(4, &[1, 1], DraftSource::Dynamic);
        let logits = Logits::from_rows(vec![one_hot(8, 6); 2]).unwrap();
        let mut sampler = TokenSampler::new(&GenerationConfig::default());
        assert!(matches!(
            verify(&candidate, &logits, &mut sampler),
            Err(DecodeError::OutputShape { .. })
        ));
    }

    #[test]
    fn test_sampled_accepts_certain_tokens() {
        let candidate = Candidate::sequence(1, &[2, 3], DraftSource::Static);
        // Near-certain agreement with the whole draft.
        let rows = vec![one_hot(4, 2), one_hot(4, 3), one_hot(4, 0)];
        let logits = Logits::from_rows(
            rows.into_iter()
                .map(|r| r.into_iter().map(|x| x * 10.0).collect())
                .collect(),
        )
        .unwrap();
        let mut sampler = TokenSampler::new(&GenerationConfig::sampled(1.0, Some(3)));

        let verdict = verify(&candidate, &logits, &mut sampler).unwrap();
        assert_eq!(verdict.accept_length, 2);
        assert_eq!(verdict.tokens, vec![1, 2, 3]);
        assert!(matches!(verdict.seed, Seed::Probs(_)));
    }

    #[test]
    fn test_sampled_rejection_leaves_residual() {
        let candidate = Candidate::sequence(1, &[3], DraftSource::Dynamic);
        // Token 3 has no mass at all.
        let logits = Logits::from_rows(vec![vec![0.0, 0.0, 0.0, -1000.0], vec![0.0; 4]]).unwrap();
        let mut sampler = TokenSampler::new(&GenerationConfig::sampled(1.0, Some(9)));

        let verdict = verify(&candidate, &logits, &mut sampler).unwrap();
        assert_eq!(verdict.accept_length, 0);
        let Seed::Probs(residual) = verdict.seed else {
            panic!("expected a residual distribution");
        };
        assert_eq!(residual[3], 0.0);
        assert!((residual.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }
}
