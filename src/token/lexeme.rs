use parking_lot::RwLock;
use string_interner::{backend::StringBackend, symbol::SymbolU32, StringInterner, Symbol as _};

use crate::error::AlignmentError;

/// Interned id of a piece of token content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lexeme(u32);

impl Lexeme {
    pub fn id(self) -> u32 {
        self.0
    }

    fn from_symbol(symbol: SymbolU32) -> Lexeme {
        Lexeme(symbol.to_usize() as u32)
    }
}

/// Append-only content interner shared by every tokenizer invocation of a process.
///
/// Ids are handed out in increasing order and never reused, so two sequences tokenized
/// through the same interner can be compared lexeme by lexeme.
#[derive(Default)]
pub struct Interner {
    symbols: RwLock<StringInterner<StringBackend<SymbolU32>>>,
}

impl Interner {
    pub fn new() -> Interner {
        Interner::default()
    }

    pub fn intern(&self, content: &str) -> Lexeme {
        if let Some(symbol) = self.symbols.read().get(content) {
            return Lexeme::from_symbol(symbol);
        }
        Lexeme::from_symbol(self.symbols.write().get_or_intern(content))
    }

    pub fn resolve(&self, lexeme: Lexeme) -> Result<String, AlignmentError> {
        let unknown = AlignmentError::UnknownLexeme(lexeme.id());
        let symbol = SymbolU32::try_from_usize(lexeme.id() as usize).ok_or(unknown.clone())?;
        self.symbols.read().resolve(symbol).map(str::to_owned).ok_or(unknown)
    }

    pub fn len(&self) -> usize {
        self.symbols.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
