use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::{benchmark::random_sequence, scoring::ScoreParams, *};
use crate::token::{sequence_of, Interner, TokenType};

fn options(threshold: u32) -> AlignmentOptions {
    AlignmentOptions {
        params: ScoreParams {
            threshold,
            drop_off: threshold,
            ..ScoreParams::default()
        },
        ..AlignmentOptions::default()
    }
}

fn finish(mut alignment: Alignment) -> [Vec<bool>; 2] {
    loop {
        let progress = alignment.executor.step(Duration::from_millis(5)).unwrap();
        assert!(progress.done_work <= progress.total_work);
        if progress.is_complete() {
            break;
        }
    }
    alignment
        .executor
        .sequences()
        .map(|sequence| sequence.iter().map(|token| token.valid).collect())
}

fn run(kind: AlgorithmKind, sequences: [TokenSequence; 2], options: &AlignmentOptions) -> [Vec<bool>; 2] {
    finish(start(kind, sequences, options, None).unwrap())
}

fn random_pair(seed: u64, lengths: [usize; 2]) -> [TokenSequence; 2] {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let interner = Interner::new();
    lengths.map(|len| random_sequence(&mut rng, &interner, TokenType::Character, 4, len))
}

fn pct(validity: &[bool]) -> f64 {
    validity.iter().filter(|valid| !**valid).count() as f64 / validity.len() as f64
}

#[test]
fn identical_content_is_fully_claimed() {
    let interner = Interner::new();
    let words = ["int", "main", "(", ")", "{", "}"];
    let alignment = start(
        AlgorithmKind::Auto,
        [sequence_of(&interner, &words), sequence_of(&interner, &words)],
        &options(5),
        None,
    )
    .unwrap();
    assert_eq!(alignment.strategy, Strategy::Identical);
    assert_eq!(alignment.executor.progress(), Progress::new(1, 1));
    assert_eq!(finish(alignment), [vec![false; 6], vec![false; 6]]);
}

#[test]
fn empty_side_settles_immediately() {
    let interner = Interner::new();
    let alignment = start(
        AlgorithmKind::Exhaustive,
        [sequence_of(&interner, &[]), sequence_of(&interner, &["a"])],
        &options(1),
        None,
    )
    .unwrap();
    assert_eq!(alignment.strategy, Strategy::Empty);
    assert_eq!(alignment.executor.progress(), Progress::new(0, 0));
    assert!(alignment.executor.progress().is_complete());
}

#[test]
fn runs_are_deterministic() {
    let options = options(3);
    let first = run(AlgorithmKind::Exhaustive, random_pair(21, [60, 50]), &options);
    let second = run(AlgorithmKind::Exhaustive, random_pair(21, [60, 50]), &options);
    assert_eq!(first, second);
}

#[test]
fn swapping_sides_claims_the_same_tokens() {
    let options = AlignmentOptions {
        tile_size: 8,
        ..options(3)
    };
    for kind in [AlgorithmKind::Exhaustive, AlgorithmKind::Tiled] {
        for seed in 0..48 {
            // Equal lengths leave the side order to the lexemes.
            let lengths = if seed % 4 == 0 { [30, 30] } else { [40, 35] };
            let [a, b] = random_pair(seed, lengths);
            let forward = run(kind, [a.clone(), b.clone()], &options);
            let backward = run(kind, [b, a], &options);
            assert_eq!(forward[0], backward[1], "{kind:?} seed {seed}");
            assert_eq!(forward[1], backward[0], "{kind:?} seed {seed}");
        }
    }
}

#[test]
fn both_sides_lose_the_same_number_of_tokens() {
    let options = options(3);
    for kind in [AlgorithmKind::Exhaustive, AlgorithmKind::Tiled] {
        let [a, b] = run(kind, random_pair(4, [120, 90]), &AlignmentOptions { tile_size: 32, ..options });
        let count = |validity: &Vec<bool>| validity.iter().filter(|valid| !**valid).count();
        assert_eq!(count(&a), count(&b), "{kind:?}");
    }
}

#[test]
fn single_tile_equals_exhaustive() {
    let options = AlignmentOptions {
        tile_size: 128,
        ..options(4)
    };
    for seed in 0..6 {
        let exhaustive = run(AlgorithmKind::Exhaustive, random_pair(seed, [100, 80]), &options);
        let tiled = run(AlgorithmKind::Tiled, random_pair(seed, [100, 80]), &options);
        assert_eq!(exhaustive, tiled, "seed {seed}");
    }
}

/// With the drop-off held fixed, the chains claimed at a higher threshold are the first chains
/// claimed at a lower one, so every token claimed at the higher threshold is claimed at the lower.
#[test]
fn higher_threshold_claims_a_subset() {
    let at = |threshold| AlignmentOptions {
        params: ScoreParams {
            threshold,
            drop_off: 5,
            ..ScoreParams::default()
        },
        tile_size: 64,
        ..AlignmentOptions::default()
    };
    for kind in [AlgorithmKind::Exhaustive, AlgorithmKind::Tiled] {
        for seed in 0..24 {
            let claims: Vec<[Vec<bool>; 2]> = (1..8).map(|threshold| run(kind, random_pair(seed, [40, 35]), &at(threshold))).collect();
            for (threshold, pair) in claims.windows(2).enumerate() {
                let [low, high] = [&pair[0], &pair[1]];
                for side in 0..2 {
                    let subset = low[side].iter().zip(&high[side]).all(|(low, high)| *low <= *high);
                    assert!(subset, "{kind:?} seed {seed} side {side} threshold {}", threshold + 2);
                }
                assert!(pct(&high[0]) <= pct(&low[0]));
            }
        }
    }
}

#[test]
fn huge_tile_size_does_not_overflow() {
    let options = AlignmentOptions {
        tile_size: usize::MAX,
        ..options(3)
    };
    let alignment = start(AlgorithmKind::Auto, random_pair(1, [6, 7]), &options, None).unwrap();
    assert_eq!(alignment.strategy, Strategy::Exhaustive);
}

#[test]
fn line_compare_claims_shared_lines_afresh() {
    let interner = Interner::new();
    let lines = |text: &[&str]| TokenSequence::from_lexemes(TokenType::Line, text.iter().map(|line| interner.intern(line)));
    let a = lines(&["int x;", "}", "}", "x++;"]);
    let mut b = lines(&["}", "int y;", "int x;"]);
    b.invalidate(crate::token::TokenIndex::new(1));
    let alignment = start(AlgorithmKind::LineCompare, [a.clone(), b.clone()], &options(5), None).unwrap();
    assert_eq!(alignment.strategy, Strategy::LineCompare);
    let forward = finish(alignment);
    assert_eq!(forward, [vec![false, false, false, true], vec![false, true, false]]);
    let backward = run(AlgorithmKind::LineCompare, [b, a], &options(5));
    assert_eq!([&forward[0], &forward[1]], [&backward[1], &backward[0]]);
}

#[test]
fn auto_picks_by_size() {
    let options = AlignmentOptions {
        tile_size: 8,
        ..options(3)
    };
    let small = start(AlgorithmKind::Auto, random_pair(1, [6, 7]), &options, None).unwrap();
    assert_eq!(small.strategy, Strategy::Exhaustive);
    let large = start(AlgorithmKind::Auto, random_pair(1, [20, 7]), &options, None).unwrap();
    assert_eq!(large.strategy, Strategy::Tiled);
}

#[test]
fn oversized_exhaustive_degrades() {
    let options = AlignmentOptions {
        max_cells: 10,
        ..options(3)
    };
    let alignment = start(AlgorithmKind::Exhaustive, random_pair(2, [6, 7]), &options, None).unwrap();
    assert_eq!(alignment.strategy, Strategy::Oversized);
    assert!(alignment.executor.progress().is_complete());
    assert_eq!(alignment.executor.sequences()[0].invalid_count(), 0);

    let alignment = start(AlgorithmKind::Auto, random_pair(2, [6, 7]), &options, None).unwrap();
    assert_eq!(alignment.strategy, Strategy::Tiled);
}

#[test]
fn stale_checkpoint_restarts_fresh() {
    let options = AlignmentOptions {
        tile_size: 4,
        ..options(3)
    };
    let mut alignment = start(AlgorithmKind::Tiled, random_pair(3, [12, 13]), &options, None).unwrap();
    alignment.executor.step(Duration::ZERO).unwrap();
    let checkpoint = alignment.executor.checkpoint();
    assert!(checkpoint.is_some());

    let mut other = random_pair(3, [12, 14]);
    other[0].invalidate(crate::token::TokenIndex::new(0));
    let resumed = start(AlgorithmKind::Tiled, other, &options, checkpoint).unwrap();
    assert_eq!(resumed.strategy, Strategy::Tiled);
    assert_eq!(resumed.executor.progress().done_work, 0);
    assert_eq!(resumed.executor.sequences()[0].invalid_count(), 0);
}

#[test]
fn type_mismatch_is_rejected() {
    let interner = Interner::new();
    let lines = TokenSequence::from_lexemes(TokenType::Line, [interner.intern("x")]);
    let words = sequence_of(&interner, &["y"]);
    let result = start(AlgorithmKind::Auto, [lines, words], &options(1), None);
    assert!(matches!(result, Err(AlignmentError::TokenTypeMismatch { .. })));
}
