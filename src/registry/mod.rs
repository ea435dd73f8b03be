//! Per-file symbol tables built once per run.
//!
//! Extraction runs per file in parallel; cross-file links (C signature to
//! definition, typedef to datatype) are made afterwards in a single pass.
//! The registry is read-only once [`Registry::build`] returns.

pub mod c;
pub mod python;

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::EngineError;
use crate::model::{Language, Span, Symbol, SymbolKey};
use crate::source::{Project, SourceFile};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// One name brought in by an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportMember {
    /// Dotted module path for `import`, item name for `from ... import`.
    pub name: String,
    pub alias: Option<String>,
    pub span: Span,
}

impl ImportMember {
    pub fn bound_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatement {
    /// `import a.b [as c], ...`
    Module { span: Span, members: Vec<ImportMember> },
    /// `from m import x [as y], ...` or `from m import *`
    From {
        span: Span,
        module: String,
        members: Vec<ImportMember>,
        wildcard: bool,
    },
}

impl ImportStatement {
    pub fn span(&self) -> Span {
        match self {
            ImportStatement::Module { span, .. } | ImportStatement::From { span, .. } => *span,
        }
    }

    pub fn members(&self) -> &[ImportMember] {
        match self {
            ImportStatement::Module { members, .. } | ImportStatement::From { members, .. } => {
                members
            }
        }
    }
}

/// `#include "path"` or `#include <path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    pub path: String,
    pub system: bool,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub id: String,
    pub language: Language,
    pub symbols: BTreeMap<String, Symbol>,
    /// C enum member name to the name of the symbol owning it.
    pub enum_members: BTreeMap<String, String>,
    /// Python `__all__`, when the module declares one.
    pub exports: Option<Vec<String>>,
    pub imports: Vec<ImportStatement>,
    pub includes: Vec<IncludeDirective>,
    /// C macro names that conditional-compilation directives test.
    pub conditionals: BTreeSet<String>,
}

impl FileEntry {
    pub fn new(id: &str, language: Language) -> Self {
        Self {
            id: id.to_string(),
            language,
            symbols: BTreeMap::new(),
            enum_members: BTreeMap::new(),
            exports: None,
            imports: Vec::new(),
            includes: Vec::new(),
            conditionals: BTreeSet::new(),
        }
    }

    pub fn is_header(&self) -> bool {
        self.id.ends_with(".h")
    }

    /// Whether `from <this module> import *` exposes `name`.
    pub fn is_wildcard_visible(&self, name: &str) -> bool {
        match &self.exports {
            Some(exports) => exports.iter().any(|export| export == name),
            None => !name.starts_with('_'),
        }
    }
}

/// Output of a single-file extraction, before cross-file linking.
#[derive(Debug)]
pub(crate) struct Extracted {
    pub entry: FileEntry,
    pub diagnostics: Vec<Diagnostic>,
    /// `(typedef name, named type)` pairs awaiting resolution.
    pub typedef_targets: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct Registry {
    language: Language,
    files: BTreeMap<String, FileEntry>,
    diagnostics: Vec<Diagnostic>,
}

impl Registry {
    pub fn build(project: &Project) -> Self {
        let sources: Vec<&SourceFile> = project.files().collect();
        let extracted: Vec<Extracted> = sources
            .par_iter()
            .map(|file| match file.language {
                Language::Python => python::extract(file),
                Language::C => c::extract(file),
            })
            .collect();

        let mut diagnostics = Diagnostics::default();
        let mut files = BTreeMap::new();
        let mut typedef_targets = Vec::new();
        for item in extracted {
            diagnostics.extend(item.diagnostics);
            for (name, target) in item.typedef_targets {
                typedef_targets.push((item.entry.id.clone(), name, target));
            }
            files.insert(item.entry.id.clone(), item.entry);
        }
        if project.language == Language::C {
            c::link(&mut files, &typedef_targets);
        }

        let symbol_count: usize = files.values().map(|entry| entry.symbols.len()).sum();
        tracing::debug!(
            files = files.len(),
            symbols = symbol_count,
            "symbol registry built"
        );
        Self {
            language: project.language,
            files,
            diagnostics: diagnostics.into_vec(),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn file(&self, id: &str) -> Option<&FileEntry> {
        self.files.get(id)
    }

    pub fn require_file(&self, id: &str) -> Result<&FileEntry, EngineError> {
        self.files
            .get(id)
            .ok_or_else(|| EngineError::MissingFile(id.to_string()))
    }

    pub fn files(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }

    pub fn symbol(&self, key: &SymbolKey) -> Option<&Symbol> {
        self.files
            .get(&key.file)
            .and_then(|entry| entry.symbols.get(&key.name))
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
