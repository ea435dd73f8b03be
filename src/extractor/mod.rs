//! Extracts the minimal source needed for a set of seed symbols.

pub mod c;
pub mod python;

use crate::analysis::Analysis;
use crate::error::{EngineError, ExtractError, SeedError};
use crate::model::{Language, Manifest, Span, SymbolKey, SymbolSet};
use crate::registry::FileEntry;
use crate::source::SourceFile;
use crate::util::remove_ranges;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tree_sitter::Node;

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Extra nodes to cut, per file.
    pub remove: BTreeMap<String, Vec<Span>>,
    /// Files to emit even when none of their symbols are kept.
    pub keep_files: BTreeSet<String>,
}

/// Everything reachable from the seeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Closure {
    pub symbols: SymbolSet,
    /// Files to materialize: defining files, re-export hops and the files
    /// Python module code reaches.
    pub files: BTreeSet<String>,
}

impl Closure {
    pub fn kept(&self, file: &str) -> BTreeSet<String> {
        self.symbols.get(file).cloned().unwrap_or_default()
    }
}

pub struct Extractor<'a> {
    analysis: &'a Analysis,
    manifest: &'a Manifest,
}

impl<'a> Extractor<'a> {
    pub fn new(analysis: &'a Analysis, manifest: &'a Manifest) -> Self {
        Self { analysis, manifest }
    }

    /// Transitive dependency closure of `seeds`. Every unknown seed is
    /// reported at once.
    pub fn closure(&self, seeds: &SymbolSet) -> Result<Closure, ExtractError> {
        self.closure_with(seeds, &ExtractOptions::default())
    }

    /// Closure over symbol dependencies and, for Python, over the module
    /// code of every materialized file, since that code is never cut.
    /// Statements listed in `options.remove` are not followed.
    pub fn closure_with(
        &self,
        seeds: &SymbolSet,
        options: &ExtractOptions,
    ) -> Result<Closure, ExtractError> {
        self.validate(seeds)?;
        let usage = self.analysis.usage();
        let follow_module_code = self.analysis.language() == Language::Python;
        let mut closure = Closure::default();
        let mut visited: HashSet<SymbolKey> = HashSet::new();
        let mut scanned: HashSet<String> = HashSet::new();
        let mut stack: Vec<SymbolKey> = Vec::new();
        let mut pending: Vec<String> = options
            .keep_files
            .iter()
            .filter(|file| self.analysis.project().contains(file))
            .cloned()
            .collect();
        for (file, names) in seeds {
            pending.push(file.clone());
            stack.extend(names.iter().map(|name| SymbolKey::new(file.as_str(), name.as_str())));
        }

        loop {
            while let Some(key) = stack.pop() {
                if !visited.insert(key.clone()) {
                    continue;
                }
                let symbol = self
                    .manifest
                    .symbol(&key)
                    .ok_or_else(|| EngineError::MissingSymbol {
                        file: key.file.clone(),
                        symbol: key.name.clone(),
                    })?;
                for edge in symbol.dependencies.values().filter(|edge| !edge.is_external) {
                    pending.push(edge.id.clone());
                    for name in edge.symbols.keys() {
                        let next = SymbolKey::new(edge.id.as_str(), name.as_str());
                        if !visited.contains(&next) {
                            stack.push(next);
                        }
                    }
                }
                pending.push(key.file.clone());
                closure.symbols.entry(key.file).or_default().insert(key.name);
            }

            let Some(file) = pending.pop() else {
                break;
            };
            closure.files.insert(file.clone());
            if !follow_module_code || !scanned.insert(file.clone()) {
                continue;
            }
            let skip = options.remove.get(&file).map(Vec::as_slice).unwrap_or(&[]);
            let module_code = usage.module_level(&file, skip)?;
            stack.extend(
                module_code
                    .resolved
                    .into_iter()
                    .filter(|key| !visited.contains(key)),
            );
            pending.extend(module_code.modules);
        }
        Ok(closure)
    }

    fn validate(&self, seeds: &SymbolSet) -> Result<(), ExtractError> {
        let mut errors = Vec::new();
        for (file, names) in seeds {
            let Some(record) = self.manifest.file(file) else {
                errors.push(SeedError::FileNotFound(file.clone()));
                continue;
            };
            for name in names {
                if !record.symbols.contains_key(name) {
                    errors.push(SeedError::SymbolNotFound {
                        file: file.clone(),
                        symbol: name.clone(),
                    });
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ExtractError::Seeds(errors))
        }
    }

    pub fn extract(&self, seeds: &SymbolSet) -> Result<BTreeMap<String, String>, ExtractError> {
        self.extract_with(seeds, &ExtractOptions::default())
    }

    /// File id to extracted content, for the touched files only.
    pub fn extract_with(
        &self,
        seeds: &SymbolSet,
        options: &ExtractOptions,
    ) -> Result<BTreeMap<String, String>, ExtractError> {
        let closure = self.closure_with(seeds, options)?;
        let output = match self.analysis.language() {
            Language::Python => python::slice(self.analysis, &closure, options)?,
            Language::C => c::slice(self.analysis, self.manifest, &closure, options)?,
        };
        tracing::info!(
            seeds = seeds.values().map(BTreeSet::len).sum::<usize>(),
            symbols = closure.symbols.values().map(BTreeSet::len).sum::<usize>(),
            files = output.len(),
            "extraction finished"
        );
        Ok(output)
    }
}

/// Cuts every declaration node that holds no kept symbol, plus `extra`.
/// A `;` token directly after a cut node goes with it.
pub(crate) fn cut_unkept(
    source: &SourceFile,
    entry: &FileEntry,
    items: &[Node<'_>],
    kept: &BTreeSet<String>,
    extra: &[Span],
) -> String {
    let kept_spans: Vec<Span> = entry
        .symbols
        .values()
        .filter(|symbol| kept.contains(symbol.name()))
        .flat_map(|symbol| symbol.nodes().iter().copied())
        .collect();
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for item in items {
        let span = Span::of(*item);
        if kept_spans.iter().any(|kept| span.contains(kept)) {
            continue;
        }
        let end = match item.next_sibling() {
            Some(next) if next.kind() == ";" => next.end_byte(),
            _ => item.end_byte(),
        };
        ranges.push((item.start_byte(), end));
    }
    ranges.extend(extra.iter().map(|span| (span.start_byte, span.end_byte)));
    remove_ranges(&source.text, ranges)
}

/// Files the output must contain.
pub(crate) fn output_files(
    analysis: &Analysis,
    closure: &Closure,
    options: &ExtractOptions,
) -> BTreeSet<String> {
    closure
        .files
        .iter()
        .chain(options.keep_files.iter())
        .filter(|file| analysis.project().contains(file))
        .cloned()
        .collect()
}
