use crate::model::Language;
use thiserror::Error;

/// Failures that mean the engine itself is inconsistent. They abort the
/// current stage.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load the {language} grammar")]
    Grammar {
        language: Language,
        #[source]
        source: tree_sitter::LanguageError,
    },
    #[error("parser returned no tree for `{0}`")]
    Parse(String),
    #[error("file `{0}` is referenced but missing from the registry")]
    MissingFile(String),
    #[error("symbol `{symbol}` is referenced but missing from `{file}`")]
    MissingSymbol { file: String, symbol: String },
}

/// A caller-provided seed that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeedError {
    #[error("seed file `{0}` is not part of the project")]
    FileNotFound(String),
    #[error("symbol `{symbol}` not found in `{file}`")]
    SymbolNotFound { file: String, symbol: String },
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{} seed(s) could not be found: {}", .0.len(), describe_seeds(.0))]
    Seeds(Vec<SeedError>),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

fn describe_seeds(errors: &[SeedError]) -> String {
    errors
        .iter()
        .map(|err| err.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
