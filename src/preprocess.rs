use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use regex::Regex;
use tracing::debug;

use crate::{
    algorithm::{scoring::ScoreParams, start, AlgorithmKind, AlignmentOptions},
    error::AlignmentError,
    token::{tokenizer::TokenizerKind, Interner},
};

/// A text transformation applied to every submission before tokenizing.
#[derive(Clone, Debug)]
pub enum Preprocessor {
    Lowercase,
    /// Collapses runs of spaces and tabs, and runs of blank lines.
    DeduplicateWhitespace,
    /// Drops every line that also occurs in the common code, as matched line by line.
    CommonCode(Arc<str>),
}

impl Preprocessor {
    pub fn name(&self) -> &'static str {
        match self {
            Preprocessor::Lowercase => "lowercase",
            Preprocessor::DeduplicateWhitespace => "deduplicate-whitespace",
            Preprocessor::CommonCode(_) => "common-code",
        }
    }

    pub fn apply(&self, text: &str, interner: &Interner) -> Result<String, AlignmentError> {
        match self {
            Preprocessor::Lowercase => Ok(text.to_lowercase()),
            Preprocessor::DeduplicateWhitespace => Ok(deduplicate_whitespace(text)),
            Preprocessor::CommonCode(common) => remove_common_code(text, common, interner),
        }
    }
}

/// Runs collapsed by `deduplicate_whitespace`, each with its replacement.
static WHITESPACE_RUNS: LazyLock<[(Regex, &str); 3]> = LazyLock::new(|| {
    [(r"[ \t]+", " "), (r"\n+", "\n"), (r"(\r\n)+", "\r\n")]
        .map(|(pattern, replacement)| (Regex::new(pattern).expect("whitespace pattern compiles"), replacement))
});

fn deduplicate_whitespace(text: &str) -> String {
    let mut text = text.to_string();
    for (regex, replacement) in WHITESPACE_RUNS.iter() {
        text = regex.replace_all(&text, *replacement).into_owned();
    }
    text
}

fn remove_common_code(text: &str, common: &str, interner: &Interner) -> Result<String, AlignmentError> {
    let tokenizer = TokenizerKind::Line;
    let sequences = [tokenizer.tokenize(text, interner), tokenizer.tokenize(common, interner)];
    let options = AlignmentOptions {
        params: ScoreParams {
            threshold: 1,
            drop_off: 1,
            ..ScoreParams::default()
        },
        ..AlignmentOptions::default()
    };
    let mut alignment = start(AlgorithmKind::Auto, sequences, &options, None)?;
    while !alignment.executor.step(Duration::MAX)?.is_complete() {}

    let [lines, _] = alignment.executor.sequences();
    let mut kept = vec![];
    for token in lines.iter().filter(|token| token.valid) {
        kept.push(interner.resolve(token.lexeme)?);
    }
    debug!(removed = lines.len() - kept.len(), "removed common code lines");
    Ok(kept.join("\n"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lowercase() {
        let interner = Interner::new();
        assert_eq!(Preprocessor::Lowercase.apply("Int MAIN", &interner).unwrap(), "int main");
    }

    #[test]
    fn whitespace_runs_collapse() {
        let interner = Interner::new();
        let text = "a  \t b\n\n\nc\r\n\r\nd";
        assert_eq!(
            Preprocessor::DeduplicateWhitespace.apply(text, &interner).unwrap(),
            "a b\nc\r\nd"
        );
    }

    #[test]
    fn every_whitespace_pattern_is_active() {
        for (regex, replacement) in WHITESPACE_RUNS.iter() {
            let doubled = replacement.repeat(2);
            assert!(regex.is_match(&doubled), "{regex}");
            assert_eq!(deduplicate_whitespace(&doubled), *replacement);
        }
    }

    #[test]
    fn common_lines_are_removed() {
        let interner = Interner::new();
        let common = Preprocessor::CommonCode(Arc::from("#include <stdio.h>\nint main() {\n}"));
        let text = "#include <stdio.h>\nint main() {\n    puts(\"hi\");\n}";
        assert_eq!(common.apply(text, &interner).unwrap(), "puts(\"hi\");");
    }

    #[test]
    fn common_code_without_overlap_keeps_everything() {
        let interner = Interner::new();
        let common = Preprocessor::CommonCode(Arc::from("unrelated"));
        assert_eq!(common.apply("one\ntwo", &interner).unwrap(), "one\ntwo");
    }
}
