use super::{Closure, ExtractOptions, cut_unkept, output_files};
use crate::analysis::Analysis;
use crate::error::EngineError;
use crate::model::{Language, Manifest};
use crate::registry::c::top_level_items;
use crate::source::Project;
use crate::util::{compact_lines, remove_ranges};
use std::collections::{BTreeMap, BTreeSet};

const MAX_BLANK_LINES: usize = 1;

pub(crate) fn slice(
    analysis: &Analysis,
    manifest: &Manifest,
    closure: &Closure,
    options: &ExtractOptions,
) -> Result<BTreeMap<String, String>, EngineError> {
    let mut files = output_files(analysis, closure, options);
    files.extend(chain_files(analysis, manifest, closure));

    let mut cut: BTreeMap<String, String> = BTreeMap::new();
    for file in &files {
        let source = analysis
            .project()
            .file(file)
            .ok_or_else(|| EngineError::MissingFile(file.clone()))?;
        let entry = analysis.registry().require_file(file)?;
        // Defines that select which branch compiles go wherever the file goes.
        let mut kept = closure.kept(file);
        kept.extend(
            entry
                .conditionals
                .iter()
                .filter(|name| entry.symbols.contains_key(*name))
                .cloned(),
        );
        let items = top_level_items(source.root());
        let extra = options.remove.get(file).map(Vec::as_slice).unwrap_or(&[]);
        cut.insert(file.clone(), cut_unkept(source, entry, &items, &kept, extra));
    }

    let sliced = Analysis::new(
        Project::from_sources(Language::C, cut.iter().map(|(id, text)| (id, text.clone())))?,
        analysis.options().clone(),
    );
    let before = analysis.module_resolver();
    let after = sliced.module_resolver();
    let mut out = BTreeMap::new();
    for source in sliced.project().files() {
        let entry = sliced.registry().require_file(&source.id)?;
        let dangling: Vec<(usize, usize)> = entry
            .includes
            .iter()
            .filter(|include| !include.system)
            .filter(|include| {
                before.resolve(&source.id, &include.path).is_resolved()
                    && !after.resolve(&source.id, &include.path).is_resolved()
            })
            .map(|include| (include.span.start_byte, include.span.end_byte))
            .collect();
        let text = remove_ranges(&source.text, dangling);
        out.insert(source.id.clone(), compact_lines(&text, MAX_BLANK_LINES));
    }
    Ok(out)
}

/// Headers that sit between a kept file and the files its kept symbols
/// use. Without them the `#include` path would break.
fn chain_files(analysis: &Analysis, manifest: &Manifest, closure: &Closure) -> BTreeSet<String> {
    let mut chain = BTreeSet::new();
    let Some(graph) = analysis.include_graph() else {
        return chain;
    };
    for (file, names) in &closure.symbols {
        let Some(record) = manifest.file(file) else {
            continue;
        };
        let targets: BTreeSet<&str> = names
            .iter()
            .filter_map(|name| record.symbols.get(name))
            .flat_map(|symbol| symbol.dependencies.values())
            .filter(|edge| !edge.is_external && edge.id != *file)
            .map(|edge| edge.id.as_str())
            .collect();
        for target in targets {
            if let Some(path) = graph.find_inclusion_chain(file, target) {
                chain.extend(path);
            }
        }
    }
    chain
}
