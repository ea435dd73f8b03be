//! Builds the dependency manifest: per-file and per-symbol dependencies,
//! then the dependents that mirror them.

use crate::analysis::Analysis;
use crate::error::EngineError;
use crate::metrics;
use crate::model::{DependencyEdge, DependentEdge, FileManifest, Manifest, SymbolManifest};
use crate::source::SourceFile;
use crate::usage::UsageResolver;
use crate::util::node_for_span;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tree_sitter::Node;

pub fn build(analysis: &Analysis) -> Result<Manifest, EngineError> {
    let usage = analysis.usage();
    let sources: Vec<&SourceFile> = analysis.project().files().collect();
    let files = sources
        .par_iter()
        .map(|source| build_file(analysis, usage.as_ref(), source))
        .collect::<Result<Vec<_>, EngineError>>()?;

    let mut manifest = Manifest {
        files: files.into_iter().map(|file| (file.id.clone(), file)).collect(),
    };
    populate_dependents(&mut manifest)?;
    set_counts(&mut manifest);
    tracing::info!(files = manifest.files.len(), "manifest built");
    Ok(manifest)
}

fn build_file(
    analysis: &Analysis,
    usage: &dyn UsageResolver,
    source: &SourceFile,
) -> Result<FileManifest, EngineError> {
    let entry = analysis.registry().require_file(&source.id)?;
    let root = source.root();
    let mut file_dependencies: BTreeMap<String, DependencyEdge> = BTreeMap::new();
    let mut symbols = BTreeMap::new();

    for symbol in entry.symbols.values() {
        let invocations = usage.invocations_of(symbol)?;
        let dependencies = invocations.edges();
        for (target, edge) in &dependencies {
            if *target != source.id {
                merge_edge(&mut file_dependencies, edge);
            }
        }
        let nodes: Vec<Node<'_>> = symbol
            .nodes()
            .iter()
            .filter_map(|span| node_for_span(root, span))
            .collect();
        symbols.insert(
            symbol.name().to_string(),
            SymbolManifest {
                id: symbol.name().to_string(),
                kind: symbol.kind(),
                metrics: metrics::analyze(&nodes, &source.text, source.language),
                dependencies,
                dependents: BTreeMap::new(),
            },
        );
    }

    let mut file_level = usage.module_level(&source.id, &[])?;
    file_level.merge(usage.file_imports(&source.id)?);
    for (target, edge) in file_level.edges() {
        if target != source.id {
            merge_edge(&mut file_dependencies, &edge);
        }
    }

    Ok(FileManifest {
        id: source.id.clone(),
        file_path: source.id.clone(),
        language: source.language,
        metrics: metrics::file_metrics(root, &source.text, source.language),
        dependencies: file_dependencies,
        dependents: BTreeMap::new(),
        symbols,
    })
}

fn merge_edge(edges: &mut BTreeMap<String, DependencyEdge>, edge: &DependencyEdge) {
    let target = edges
        .entry(edge.id.clone())
        .or_insert_with(|| DependencyEdge::new(&edge.id, edge.is_external));
    for (name, value) in &edge.symbols {
        target.symbols.insert(name.clone(), value.clone());
    }
}

/// One dependent record to insert: `target` file (and symbol) is used by
/// `dependent` through `names`.
struct Transpose {
    target_file: String,
    target_symbol: Option<String>,
    dependent: String,
    names: Vec<String>,
}

/// Mirrors every internal dependency into the target's dependents. A
/// dependency on something the manifest does not contain is an engine bug.
fn populate_dependents(manifest: &mut Manifest) -> Result<(), EngineError> {
    let mut transposes = Vec::new();
    for (file_id, file) in &manifest.files {
        for edge in file.dependencies.values().filter(|edge| !edge.is_external) {
            transposes.push(Transpose {
                target_file: edge.id.clone(),
                target_symbol: None,
                dependent: file_id.clone(),
                names: edge.symbols.keys().cloned().collect(),
            });
        }
        for (symbol_name, symbol) in &file.symbols {
            for edge in symbol.dependencies.values().filter(|edge| !edge.is_external) {
                for target in edge.symbols.keys() {
                    transposes.push(Transpose {
                        target_file: edge.id.clone(),
                        target_symbol: Some(target.clone()),
                        dependent: file_id.clone(),
                        names: vec![symbol_name.clone()],
                    });
                }
                if edge.symbols.is_empty() && !manifest.files.contains_key(&edge.id) {
                    return Err(EngineError::MissingFile(edge.id.clone()));
                }
            }
        }
    }

    for transpose in transposes {
        let target = manifest
            .files
            .get_mut(&transpose.target_file)
            .ok_or_else(|| EngineError::MissingFile(transpose.target_file.clone()))?;
        let dependents = match &transpose.target_symbol {
            None => {
                for name in &transpose.names {
                    if !target.symbols.contains_key(name) {
                        return Err(EngineError::MissingSymbol {
                            file: transpose.target_file.clone(),
                            symbol: name.clone(),
                        });
                    }
                }
                &mut target.dependents
            }
            Some(symbol) => {
                &mut target
                    .symbols
                    .get_mut(symbol)
                    .ok_or_else(|| EngineError::MissingSymbol {
                        file: transpose.target_file.clone(),
                        symbol: symbol.clone(),
                    })?
                    .dependents
            }
        };
        let record = dependents
            .entry(transpose.dependent.clone())
            .or_insert_with(|| DependentEdge::new(&transpose.dependent));
        for name in transpose.names {
            record.symbols.insert(name.clone(), name);
        }
    }
    Ok(())
}

fn set_counts(manifest: &mut Manifest) {
    for file in manifest.files.values_mut() {
        file.metrics.dependency_count = file.dependencies.len();
        file.metrics.dependent_count = file.dependents.len();
        for symbol in file.symbols.values_mut() {
            symbol.metrics.dependency_count = symbol.dependencies.len();
            symbol.metrics.dependent_count = symbol.dependents.len();
        }
    }
}
