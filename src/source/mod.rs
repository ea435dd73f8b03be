pub mod scan;

use crate::error::EngineError;
use crate::model::Language;
use crate::util;
use anyhow::Result;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Parser, Tree};

pub use scan::{ScanOptions, ScannedFile};

/// A parsed source file. The tree always belongs to `text`.
#[derive(Debug)]
pub struct SourceFile {
    pub id: String,
    pub language: Language,
    pub text: String,
    pub tree: Tree,
}

impl SourceFile {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }
}

/// A single-language set of parsed files keyed by normalized relative path.
#[derive(Debug)]
pub struct Project {
    pub root: Option<PathBuf>,
    pub language: Language,
    files: BTreeMap<String, SourceFile>,
}

impl Project {
    /// Builds a project from in-memory sources. Paths are normalized to
    /// `/`-joined relative ids.
    pub fn from_sources<I, P, S>(language: Language, sources: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = (P, S)>,
        P: AsRef<str>,
        S: Into<String>,
    {
        let inputs: Vec<(String, String)> = sources
            .into_iter()
            .map(|(path, text)| (util::normalize_path(Path::new(path.as_ref())), text.into()))
            .collect();
        let files = parse_all(language, inputs)?;
        Ok(Self {
            root: None,
            language,
            files,
        })
    }

    /// Scans `root` and parses every file of `language`.
    pub fn load(root: &Path, language: Language, options: &ScanOptions) -> Result<Self> {
        let scanned = scan::scan_repo_with_options(root, options)?;
        let mut inputs = Vec::new();
        for file in scanned.into_iter().filter(|file| file.language == language) {
            let text = util::read_to_string(&file.abs_path)?;
            tracing::debug!(path = %file.rel_path, hash = %file.hash, size = file.size, "read source");
            inputs.push((file.rel_path, text));
        }
        tracing::info!(root = %root.display(), %language, files = inputs.len(), "loaded project");
        let files = parse_all(language, inputs)?;
        Ok(Self {
            root: Some(root.to_path_buf()),
            language,
            files,
        })
    }

    pub fn file(&self, id: &str) -> Option<&SourceFile> {
        self.files.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.files.contains_key(id)
    }

    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.files.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

pub fn new_parser(language: Language) -> Result<Parser, EngineError> {
    let mut parser = Parser::new();
    let grammar: tree_sitter::Language = match language {
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::C => tree_sitter_c::LANGUAGE.into(),
    };
    parser
        .set_language(&grammar)
        .map_err(|source| EngineError::Grammar { language, source })?;
    Ok(parser)
}

pub fn parse(parser: &mut Parser, id: &str, text: &str) -> Result<Tree, EngineError> {
    parser
        .parse(text, None)
        .ok_or_else(|| EngineError::Parse(id.to_string()))
}

fn parse_all(
    language: Language,
    inputs: Vec<(String, String)>,
) -> Result<BTreeMap<String, SourceFile>, EngineError> {
    // Surface grammar failures once, before fanning out.
    new_parser(language)?;
    let parsed: Vec<SourceFile> = inputs
        .into_par_iter()
        .map_init(
            || new_parser(language),
            |parser, (id, text)| {
                let parser = parser
                    .as_mut()
                    .map_err(|_| EngineError::Parse(format!("{id}: parser unavailable")))?;
                let tree = parse(parser, &id, &text)?;
                Ok(SourceFile {
                    id,
                    language,
                    text,
                    tree,
                })
            },
        )
        .collect::<Result<Vec<_>, EngineError>>()?;
    Ok(parsed.into_iter().map(|file| (file.id.clone(), file)).collect())
}
