//! `@nanoapi` endpoint annotations: finding them from an entrypoint and
//! splitting a project into one extracted copy per endpoint group.
//!
//! An annotation is a comment attached to the statement that follows it:
//!
//! ```text
//! # @nanoapi method:GET path:/api/elves group:elves
//! @app.route("/api/elves")
//! def list_elves(): ...
//! ```
//!
//! The legacy `@nanoapi GET /api/elves` form is accepted too. An
//! annotation without a method marks a module that hosts endpoints under
//! its path prefix (a blueprint registration, for instance).

use crate::analysis::Analysis;
use crate::error::{ExtractError, SeedError};
use crate::extractor::{ExtractOptions, Extractor};
use crate::model::{Manifest, Span, SymbolSet};
use crate::usage::{Invocations, UsageResolver};
use crate::util::{descendants, ensure_parent_dir, node_text};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use tree_sitter::Node;

pub const ANNOTATION_TAG: &str = "@nanoapi";
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Annotation {
    pub method: Option<String>,
    pub path: String,
    pub group: Option<String>,
}

/// Parses the text of one comment. Returns `None` when the comment is not
/// an annotation or names no path.
pub fn parse_annotation(comment: &str) -> Option<Annotation> {
    let start = comment.find(ANNOTATION_TAG)?;
    let rest = comment[start + ANNOTATION_TAG.len()..]
        .trim_end()
        .trim_end_matches("*/");
    let tokens: Vec<&str> = rest.split_whitespace().collect();

    if tokens.iter().any(|token| token.contains(':')) {
        let value = |key: &str| {
            tokens
                .iter()
                .find_map(|token| token.strip_prefix(key))
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        return Some(Annotation {
            path: value("path:")?,
            method: value("method:").map(|method| method.to_uppercase()),
            group: value("group:"),
        });
    }

    match tokens.as_slice() {
        [path] if path.starts_with('/') => Some(Annotation {
            method: None,
            path: path.to_string(),
            group: None,
        }),
        [method, path, ..] => Some(Annotation {
            method: Some(method.to_uppercase()),
            path: path.to_string(),
            group: None,
        }),
        _ => None,
    }
}

/// An annotation found in the project, with what it needs to run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(flatten)]
    pub annotation: Annotation,
    pub file: String,
    /// 1-based line of the annotation comment.
    pub line: usize,
    /// Symbols the annotated statement and its surrounding module code use.
    pub seeds: SymbolSet,
    /// Files from the entrypoint down to the annotated file, plus modules
    /// the statement uses without naming a symbol.
    pub files: BTreeSet<String>,
    #[serde(skip)]
    pub comment: Span,
    #[serde(skip)]
    pub statement: Span,
}

impl Endpoint {
    pub fn is_module(&self) -> bool {
        self.annotation.method.is_none()
    }

    fn group_key(&self) -> String {
        match &self.annotation.group {
            Some(group) => group.clone(),
            None => format!(
                "{} {}",
                self.annotation.method.as_deref().unwrap_or(""),
                self.annotation.path
            ),
        }
    }
}

struct Found<'tree> {
    annotation: Annotation,
    comment: Node<'tree>,
    statement: Node<'tree>,
}

fn annotations_in<'tree>(root: Node<'tree>, source: &str) -> Vec<Found<'tree>> {
    let mut found: Vec<Found<'_>> = descendants(root)
        .into_iter()
        .filter(|node| node.kind() == "comment")
        .filter_map(|comment| {
            let annotation = parse_annotation(node_text(comment, source))?;
            let mut next = comment.next_named_sibling();
            while let Some(node) = next {
                if node.kind() != "comment" {
                    break;
                }
                next = node.next_named_sibling();
            }
            Some(Found {
                annotation,
                comment,
                statement: next?,
            })
        })
        .collect();
    found.sort_by_key(|item| item.comment.start_byte());
    found
}

/// Walks the file dependencies breadth-first from `entrypoint` and collects
/// every annotation on the way, in visit order.
pub fn scan(
    analysis: &Analysis,
    manifest: &Manifest,
    entrypoint: &str,
) -> Result<Vec<Endpoint>, ExtractError> {
    if manifest.file(entrypoint).is_none() {
        return Err(ExtractError::Seeds(vec![SeedError::FileNotFound(
            entrypoint.to_string(),
        )]));
    }
    let usage = analysis.usage();
    let mut endpoints = Vec::new();
    let mut queue: VecDeque<Vec<String>> = VecDeque::from([vec![entrypoint.to_string()]]);
    let mut visited: HashSet<String> = HashSet::from([entrypoint.to_string()]);

    while let Some(chain) = queue.pop_front() {
        let Some(file) = chain.last() else {
            continue;
        };
        endpoints.extend(scan_file(analysis, usage.as_ref(), file, &chain)?);
        let Some(record) = manifest.file(file) else {
            continue;
        };
        for edge in record.dependencies.values().filter(|edge| !edge.is_external) {
            if visited.insert(edge.id.clone()) {
                let mut next = chain.clone();
                next.push(edge.id.clone());
                queue.push_back(next);
            }
        }
    }
    tracing::info!(entrypoint, endpoints = endpoints.len(), "annotation scan finished");
    Ok(endpoints)
}

fn scan_file(
    analysis: &Analysis,
    usage: &dyn UsageResolver,
    file: &str,
    chain: &[String],
) -> Result<Vec<Endpoint>, ExtractError> {
    let Some(source) = analysis.project().file(file) else {
        return Ok(Vec::new());
    };
    let found = annotations_in(source.root(), &source.text);
    if found.is_empty() {
        return Ok(Vec::new());
    }
    let entry = analysis.registry().require_file(file)?;

    // Module code along the chain, minus every annotated statement.
    let mut surrounding = Invocations::default();
    for hop in chain {
        let skip = annotated_statements(analysis, hop);
        surrounding.merge(usage.module_level(hop, &skip)?);
    }

    let mut endpoints = Vec::new();
    for item in found {
        let statement = Span::of(item.statement);
        let mut invocations = surrounding.clone();
        let own = entry
            .symbols
            .values()
            .find(|symbol| symbol.nodes().contains(&statement));
        match own {
            Some(symbol) => {
                invocations.resolved.insert(symbol.key());
            }
            None => invocations.merge(usage.invocations_in(file, &statement)?),
        }

        let mut seeds = SymbolSet::new();
        for key in invocations.resolved {
            seeds.entry(key.file).or_default().insert(key.name);
        }
        let mut files: BTreeSet<String> = chain.iter().cloned().collect();
        files.extend(invocations.modules);

        endpoints.push(Endpoint {
            annotation: item.annotation,
            file: file.to_string(),
            line: item.comment.start_position().row + 1,
            seeds,
            files,
            comment: Span::of(item.comment),
            statement,
        });
    }
    Ok(endpoints)
}

fn annotated_statements(analysis: &Analysis, file: &str) -> Vec<Span> {
    analysis
        .project()
        .file(file)
        .map(|source| {
            annotations_in(source.root(), &source.text)
                .iter()
                .map(|item| Span::of(item.statement))
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointRef {
    pub method: Option<String>,
    pub path: String,
}

/// One entry of `index.json`.
#[derive(Debug, Clone, Serialize)]
pub struct GroupIndex {
    pub method: Option<String>,
    pub path: String,
    pub group: Option<String>,
    pub endpoints: Vec<EndpointRef>,
    pub files: Vec<String>,
}

/// Extracts one project copy per endpoint group into
/// `output_dir/<index>/` and writes `output_dir/index.json`.
pub fn split(
    analysis: &Analysis,
    manifest: &Manifest,
    entrypoint: &str,
    output_dir: &Path,
) -> Result<BTreeMap<usize, GroupIndex>> {
    let endpoints = scan(analysis, manifest, entrypoint)?;
    let (modules, routes): (Vec<&Endpoint>, Vec<&Endpoint>) =
        endpoints.iter().partition(|endpoint| endpoint.is_module());

    let mut groups: Vec<(String, Vec<&Endpoint>)> = Vec::new();
    for endpoint in routes {
        let key = endpoint.group_key();
        match groups.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, members)) => members.push(endpoint),
            None => groups.push((key, vec![endpoint])),
        }
    }

    let extractor = Extractor::new(analysis, manifest);
    let mut index = BTreeMap::new();
    for (position, (_, members)) in groups.iter().enumerate() {
        let Some(first) = members.first().map(|member| &member.annotation) else {
            continue;
        };
        let hosts: Vec<&Endpoint> = modules
            .iter()
            .copied()
            .filter(|module| {
                members
                    .iter()
                    .any(|member| member.annotation.path.starts_with(&module.annotation.path))
            })
            .collect();
        let included: Vec<&Endpoint> = members.iter().chain(hosts.iter()).copied().collect();

        let mut seeds = SymbolSet::new();
        let mut options = ExtractOptions::default();
        options.keep_files.insert(entrypoint.to_string());
        for endpoint in &included {
            for (file, names) in &endpoint.seeds {
                seeds.entry(file.clone()).or_default().extend(names.iter().cloned());
            }
            options.keep_files.extend(endpoint.files.iter().cloned());
        }
        for other in &endpoints {
            if included.iter().any(|kept| std::ptr::eq(*kept, other)) {
                continue;
            }
            let spans = options.remove.entry(other.file.clone()).or_default();
            spans.push(other.comment);
            spans.push(other.statement);
        }

        let files = extractor
            .extract_with(&seeds, &options)
            .with_context(|| format!("extract group {position}"))?;
        let group_dir = output_dir.join(position.to_string());
        if group_dir.exists() {
            fs::remove_dir_all(&group_dir)
                .with_context(|| format!("clear {}", group_dir.display()))?;
        }
        for (file, content) in &files {
            let target = group_dir.join(file);
            ensure_parent_dir(&target)?;
            fs::write(&target, content).with_context(|| format!("write {}", target.display()))?;
        }

        index.insert(
            position,
            GroupIndex {
                method: first.method.clone(),
                path: first.path.clone(),
                group: first.group.clone(),
                endpoints: members
                    .iter()
                    .map(|member| EndpointRef {
                        method: member.annotation.method.clone(),
                        path: member.annotation.path.clone(),
                    })
                    .collect(),
                files: files.keys().cloned().collect(),
            },
        );
    }

    let index_path = output_dir.join(INDEX_FILE);
    ensure_parent_dir(&index_path)?;
    let json = serde_json::to_string_pretty(&index)?;
    fs::write(&index_path, json).with_context(|| format!("write {}", index_path.display()))?;
    tracing::info!(groups = index.len(), output = %output_dir.display(), "split finished");
    Ok(index)
}
