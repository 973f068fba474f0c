pub mod lexeme;
pub mod tokenizer;

use std::{cmp::Ordering, fmt};

use index_vec::IndexVec;
use serde::{Deserialize, Serialize};

pub use self::lexeme::{Interner, Lexeme};

index_vec::define_index_type! {
    pub struct TokenIndex = usize;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Character,
    Whitespace,
    Line,
    Words,
    Mixed,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenType::Character => "character",
            TokenType::Whitespace => "whitespace",
            TokenType::Line => "line",
            TokenType::Words => "words",
            TokenType::Mixed => "mixed",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Token {
    pub lexeme: Lexeme,
    pub kind: TokenType,
    pub valid: bool,
}

impl Token {
    pub fn new(lexeme: Lexeme, kind: TokenType) -> Token {
        Token {
            lexeme,
            kind,
            valid: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonMode {
    /// Tokens match only if both are still valid.
    ValidityEnsuring,
    ValidityIgnoring,
}

pub fn tokens_equal(a: &Token, b: &Token, mode: ComparisonMode) -> bool {
    let same_content = a.lexeme == b.lexeme && a.kind == b.kind;
    match mode {
        ComparisonMode::ValidityEnsuring => same_content && a.valid && b.valid,
        ComparisonMode::ValidityIgnoring => same_content,
    }
}

/// Ordered, single-typed output of one tokenizer run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSequence {
    kind: TokenType,
    tokens: IndexVec<TokenIndex, Token>,
}

impl TokenSequence {
    pub fn new(kind: TokenType) -> TokenSequence {
        TokenSequence {
            kind,
            tokens: IndexVec::new(),
        }
    }

    pub fn from_lexemes(kind: TokenType, lexemes: impl IntoIterator<Item = Lexeme>) -> TokenSequence {
        TokenSequence {
            kind,
            tokens: lexemes.into_iter().map(|lexeme| Token::new(lexeme, kind)).collect(),
        }
    }

    pub fn kind(&self) -> TokenType {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn push(&mut self, lexeme: Lexeme) {
        self.tokens.push(Token::new(lexeme, self.kind));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> + '_ {
        self.tokens.iter()
    }

    pub fn invalidate(&mut self, index: TokenIndex) {
        self.tokens[index].valid = false;
    }

    pub fn invalidate_all(&mut self) {
        for token in self.tokens.iter_mut() {
            token.valid = false;
        }
    }

    pub fn reset_validity(&mut self) {
        for token in self.tokens.iter_mut() {
            token.valid = true;
        }
    }

    pub fn invalid_count(&self) -> usize {
        self.tokens.iter().filter(|token| !token.valid).count()
    }

    /// True if both sequences hold the same lexemes in the same order, whatever their validity.
    pub fn content_equals(&self, other: &TokenSequence) -> bool {
        self.kind == other.kind
            && self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| tokens_equal(a, b, ComparisonMode::ValidityIgnoring))
    }

    /// Orders sequences by length, then by their lexemes. Validity plays no part, and two
    /// sequences compare equal exactly when `content_equals` holds for sequences of one kind.
    pub fn canonical_cmp(&self, other: &TokenSequence) -> Ordering {
        self.len().cmp(&other.len()).then_with(|| {
            let theirs = other.iter().map(|token| token.lexeme.id());
            self.iter().map(|token| token.lexeme.id()).cmp(theirs)
        })
    }
}

impl std::ops::Index<TokenIndex> for TokenSequence {
    type Output = Token;

    fn index(&self, index: TokenIndex) -> &Token {
        &self.tokens[index]
    }
}

#[cfg(test)]
pub(crate) fn sequence_of(interner: &Interner, words: &[&str]) -> TokenSequence {
    TokenSequence::from_lexemes(TokenType::Whitespace, words.iter().map(|word| interner.intern(word)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validity_modes() {
        let interner = Interner::new();
        let a = Token::new(interner.intern("x"), TokenType::Line);
        let mut b = a;
        assert!(tokens_equal(&a, &b, ComparisonMode::ValidityEnsuring));
        b.valid = false;
        assert!(!tokens_equal(&a, &b, ComparisonMode::ValidityEnsuring));
        assert!(tokens_equal(&a, &b, ComparisonMode::ValidityIgnoring));
    }

    #[test]
    fn type_is_part_of_equality() {
        let interner = Interner::new();
        let lexeme = interner.intern("x");
        let a = Token::new(lexeme, TokenType::Line);
        let b = Token::new(lexeme, TokenType::Character);
        assert!(!tokens_equal(&a, &b, ComparisonMode::ValidityIgnoring));
    }

    #[test]
    fn content_equality_ignores_validity() {
        let interner = Interner::new();
        let a = sequence_of(&interner, &["a", "b"]);
        let mut b = a.clone();
        b.invalidate(TokenIndex::new(1));
        assert!(a.content_equals(&b));
        assert_eq!(b.invalid_count(), 1);
        assert!(!a.content_equals(&sequence_of(&interner, &["a"])));
    }

    #[test]
    fn canonical_order_is_length_then_lexemes() {
        let interner = Interner::new();
        let ab = sequence_of(&interner, &["a", "b"]);
        let ba = sequence_of(&interner, &["b", "a"]);
        let abc = sequence_of(&interner, &["a", "b", "c"]);
        assert_eq!(ab.canonical_cmp(&ba), Ordering::Less);
        assert_eq!(ba.canonical_cmp(&ab), Ordering::Greater);
        assert_eq!(ba.canonical_cmp(&abc), Ordering::Less);
        let mut claimed = ab.clone();
        claimed.invalidate_all();
        assert_eq!(ab.canonical_cmp(&claimed), Ordering::Equal);
    }
}
