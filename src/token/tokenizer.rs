use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation as _;

use super::{Interner, TokenSequence, TokenType};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerKind {
    /// One token per grapheme cluster.
    Character,
    /// One token per whitespace-separated word.
    Whitespace,
    /// One token per non-empty line, trimmed.
    Line,
    /// One token per run of ASCII letters, digits and hyphens. A lone hyphen is not a word.
    Words,
}

impl TokenizerKind {
    pub fn token_type(self) -> TokenType {
        match self {
            TokenizerKind::Character => TokenType::Character,
            TokenizerKind::Whitespace => TokenType::Whitespace,
            TokenizerKind::Line => TokenType::Line,
            TokenizerKind::Words => TokenType::Words,
        }
    }

    pub fn tokenize(self, text: &str, interner: &Interner) -> TokenSequence {
        let bounds = match self {
            TokenizerKind::Character => partition_into_graphemes(text),
            TokenizerKind::Whitespace => partition_into_words(text),
            TokenizerKind::Line => partition_into_lines(text),
            TokenizerKind::Words => partition_into_alphanumeric_words(text),
        };
        let parts = bounds
            .chunks_exact(2)
            .map(|bound| &text[bound[0]..bound[1]])
            .map(|part| if self == TokenizerKind::Line { part.trim() } else { part })
            .filter(|part| !part.is_empty())
            .filter(|part| self != TokenizerKind::Words || *part != "-");
        TokenSequence::from_lexemes(self.token_type(), parts.map(|part| interner.intern(part)))
    }
}

// Each partition function returns a flat list of [start, end) byte pairs.

pub fn partition_into_graphemes(text: &str) -> Vec<usize> {
    let mut bounds = vec![];
    for (start, grapheme) in text.grapheme_indices(true) {
        bounds.push(start);
        bounds.push(start + grapheme.len());
    }
    bounds
}

pub fn partition_into_words(text: &str) -> Vec<usize> {
    partition_into_runs(text, |c| !c.is_whitespace())
}

pub fn partition_into_alphanumeric_words(text: &str) -> Vec<usize> {
    partition_into_runs(text, |c| c.is_ascii_alphanumeric() || c == '-')
}

/// Maximal runs of characters that are `in_word`.
fn partition_into_runs(text: &str, in_word: impl Fn(char) -> bool) -> Vec<usize> {
    let mut bounds = vec![];
    let mut word_start = None;
    for (i, c) in text.char_indices() {
        match (!in_word(c), word_start) {
            (false, None) => word_start = Some(i),
            (true, Some(start)) => {
                bounds.push(start);
                bounds.push(i);
                word_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = word_start {
        bounds.push(start);
        bounds.push(text.len());
    }
    bounds
}

pub fn partition_into_lines(text: &str) -> Vec<usize> {
    let mut bounds = vec![];
    let mut line_start = 0;
    for newline in memchr::memchr_iter(b'\n', text.as_bytes()) {
        bounds.push(line_start);
        bounds.push(newline);
        line_start = newline + 1;
    }
    if line_start < text.len() {
        bounds.push(line_start);
        bounds.push(text.len());
    }
    bounds
}
