use crate::{algorithm::indices::Coordinate, token::TokenType};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlignmentError {
    #[error("{side} token sequence is empty")]
    EmptySequence { side: &'static str },

    #[error("cannot align {left} tokens against {right} tokens")]
    TokenTypeMismatch { left: TokenType, right: TokenType },

    #[error("lexeme {0} was never interned")]
    UnknownLexeme(u32),

    #[error("internal invariant violated at {coordinate}: {message}")]
    InternalInvariantViolation { coordinate: Coordinate, message: String },

    #[error("comparison needs {cells} cells, more than the limit of {limit}")]
    OversizedComparison { cells: u64, limit: u64 },

    #[error("invalid alignment parameters: {0}")]
    InvalidParameters(String),
}

impl AlignmentError {
    pub fn invariant(coordinate: Coordinate, message: impl Into<String>) -> AlignmentError {
        let message = message.into();
        tracing::error!(x = coordinate.x, y = coordinate.y, "{message}");
        AlignmentError::InternalInvariantViolation { coordinate, message }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o failed on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}
