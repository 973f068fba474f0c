use std::{collections::BTreeMap, sync::Arc};

use anyhow::{bail, Result};

use crate::{algorithm::AlgorithmKind, error::AlignmentError, preprocess::Preprocessor, token::Interner};

/// Named algorithms and preprocessors, built once at startup and passed where needed.
#[derive(Clone, Debug)]
pub struct Registry {
    algorithms: BTreeMap<&'static str, AlgorithmKind>,
    preprocessors: BTreeMap<&'static str, Preprocessor>,
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

impl Registry {
    pub fn new() -> Registry {
        let algorithms = [
            ("auto", AlgorithmKind::Auto),
            ("exhaustive", AlgorithmKind::Exhaustive),
            ("tiled", AlgorithmKind::Tiled),
            ("linecompare", AlgorithmKind::LineCompare),
        ];
        let mut registry = Registry {
            algorithms: algorithms.into_iter().collect(),
            preprocessors: BTreeMap::new(),
        };
        registry.register(Preprocessor::Lowercase);
        registry.register(Preprocessor::DeduplicateWhitespace);
        registry
    }

    /// Makes `common-code` available, stripping lines of `common`.
    pub fn with_common_code(mut self, common: &str) -> Registry {
        self.register(Preprocessor::CommonCode(Arc::from(common)));
        self
    }

    pub fn register(&mut self, preprocessor: Preprocessor) {
        self.preprocessors.insert(preprocessor.name(), preprocessor);
    }

    pub fn algorithm(&self, name: &str) -> Result<AlgorithmKind> {
        match self.algorithms.get(name) {
            Some(&kind) => Ok(kind),
            None => bail!(
                "unknown algorithm {name:?}, expected one of: {}",
                self.algorithms.keys().copied().collect::<Vec<_>>().join(", ")
            ),
        }
    }

    pub fn preprocessor(&self, name: &str) -> Result<&Preprocessor> {
        match self.preprocessors.get(name) {
            Some(preprocessor) => Ok(preprocessor),
            None if name == "common-code" => bail!("the common-code preprocessor needs a common code file"),
            None => bail!(
                "unknown preprocessor {name:?}, expected one of: {}",
                self.preprocessor_names().join(", ")
            ),
        }
    }

    pub fn preprocessor_names(&self) -> Vec<&'static str> {
        self.preprocessors.keys().copied().collect()
    }

    /// Resolves `names` up front so a typo fails before any submission is read.
    pub fn pipeline(&self, names: &[String]) -> Result<Vec<Preprocessor>> {
        names.iter().map(|name| self.preprocessor(name).cloned()).collect()
    }
}

pub fn apply_all(pipeline: &[Preprocessor], text: &str, interner: &Interner) -> Result<String, AlignmentError> {
    let mut text = text.to_string();
    for preprocessor in pipeline {
        text = preprocessor.apply(&text, interner)?;
    }
    Ok(text)
}
