use std::time::{Duration, Instant};

use rand::Rng;

use super::{start, AlgorithmKind, AlignmentOptions, Strategy};
use crate::{
    error::AlignmentError,
    token::{Interner, TokenIndex, TokenSequence, TokenType},
};

/// Uniform tokens over an alphabet of `alphabet` distinct lexemes.
pub fn random_sequence(
    rng: &mut impl Rng,
    interner: &Interner,
    kind: TokenType,
    alphabet: usize,
    len: usize,
) -> TokenSequence {
    let lexemes: Vec<_> = (0..alphabet).map(|symbol| interner.intern(&format!("t{symbol}"))).collect();
    TokenSequence::from_lexemes(kind, (0..len).map(|_| lexemes[rng.gen_range(0..lexemes.len())]))
}

/// A copy of `source` where each token is replaced by a random one with probability `rate`.
pub fn mutate(rng: &mut impl Rng, interner: &Interner, source: &TokenSequence, alphabet: usize, rate: f64) -> TokenSequence {
    let mut mutated = TokenSequence::new(source.kind());
    for index in 0..source.len() {
        let lexeme = if rng.gen_bool(rate) {
            interner.intern(&format!("t{}", rng.gen_range(0..alphabet)))
        } else {
            source[TokenIndex::new(index)].lexeme
        };
        mutated.push(lexeme);
    }
    mutated
}

pub struct Testcase {
    pub name: String,
    pub sequences: [TokenSequence; 2],
}

impl Testcase {
    /// A pair sharing most of its tokens: the right side is a mutated copy of the left.
    pub fn generate(rng: &mut impl Rng, name: String, len: usize, alphabet: usize, rate: f64) -> Testcase {
        let interner = Interner::new();
        let left = random_sequence(rng, &interner, TokenType::Whitespace, alphabet, len);
        let right = mutate(rng, &interner, &left, alphabet, rate);
        Testcase {
            name,
            sequences: [left, right],
        }
    }
}

pub struct Measurement {
    pub strategy: Strategy,
    pub elapsed: Duration,
    pub identical: [usize; 2],
}

pub fn run_algorithm(
    testcase: &Testcase,
    kind: AlgorithmKind,
    options: &AlignmentOptions,
) -> Result<Measurement, AlignmentError> {
    let started = Instant::now();
    let mut alignment = start(kind, testcase.sequences.clone(), options, None)?;
    while !alignment.executor.step(Duration::MAX)?.is_complete() {}
    let identical = alignment.executor.sequences().map(TokenSequence::invalid_count);
    Ok(Measurement {
        strategy: alignment.strategy,
        elapsed: started.elapsed(),
        identical,
    })
}
