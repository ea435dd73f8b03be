use crate::model::Language;
use anyhow::{Context, Result};
use blake3::Hasher;
use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub hash: String,
    pub size: u64,
    pub language: Language,
}

#[derive(Debug, Clone)]
pub struct LanguageSpec {
    pub language: Language,
    pub extensions: &'static [&'static str],
}

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub no_ignore: bool,
    /// Extra gitignore-style globs to exclude.
    pub exclude: Vec<String>,
    /// Directories skipped regardless of ignore files, relative to the root.
    pub skip_dirs: Vec<PathBuf>,
    /// Files above this size are skipped; 0 disables the limit.
    pub max_file_bytes: u64,
}

impl ScanOptions {
    pub fn new(no_ignore: bool) -> Self {
        Self {
            no_ignore,
            ..Self::default()
        }
    }
}

static LANGUAGE_SPECS: &[LanguageSpec] = &[
    LanguageSpec {
        language: Language::Python,
        extensions: &["py", "pyi"],
    },
    LanguageSpec {
        language: Language::C,
        extensions: &["c", "h"],
    },
];

pub fn scan_repo_with_options(repo_root: &Path, options: &ScanOptions) -> Result<Vec<ScannedFile>> {
    let mut files = Vec::new();
    let mut builder = WalkBuilder::new(repo_root);
    if options.no_ignore {
        builder
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false);
    } else {
        builder
            .ignore(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .parents(true)
            .require_git(false);
    }
    if !options.exclude.is_empty() {
        let mut overrides = OverrideBuilder::new(repo_root);
        for pattern in &options.exclude {
            overrides
                .add(&format!("!{pattern}"))
                .with_context(|| format!("invalid ignore pattern {pattern}"))?;
        }
        builder.overrides(overrides.build().context("build ignore overrides")?);
    }
    let skip_dirs: Vec<PathBuf> = options
        .skip_dirs
        .iter()
        .map(|dir| {
            if dir.is_absolute() {
                dir.clone()
            } else {
                repo_root.join(dir)
            }
        })
        .collect();
    let walker = builder
        .hidden(false)
        .filter_entry(move |entry| {
            !is_ignored_entry(entry) && !skip_dirs.iter().any(|dir| entry.path() == dir)
        })
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!("walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        let language = match detect_language(path) {
            Some(value) => value,
            None => continue,
        };
        let rel_path = crate::util::normalize_rel_path(repo_root, path)?;
        let size = fs::metadata(path)
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        if options.max_file_bytes > 0 && size > options.max_file_bytes {
            tracing::info!(path = %rel_path, size, "skipping oversized file");
            continue;
        }
        let hash = hash_file(path).with_context(|| format!("hash {}", path.display()))?;
        files.push(ScannedFile {
            rel_path,
            abs_path: path.to_path_buf(),
            hash,
            size,
            language,
        });
    }
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

fn is_ignored_entry(entry: &ignore::DirEntry) -> bool {
    match entry.file_name() {
        name if name == OsStr::new(".git") => true,
        name if name == OsStr::new("__pycache__") => true,
        _ => false,
    }
}

fn detect_language(path: &Path) -> Option<Language> {
    let ext = path.extension().and_then(|ext| ext.to_str())?;
    for spec in LANGUAGE_SPECS {
        if spec.extensions.iter().any(|candidate| *candidate == ext) {
            return Some(spec.language);
        }
    }
    None
}

/// Picks the language with the most files, preferring the earlier table entry
/// on ties.
pub fn dominant_language(files: &[ScannedFile]) -> Option<Language> {
    let mut best: Option<(Language, usize)> = None;
    for spec in LANGUAGE_SPECS {
        let count = files
            .iter()
            .filter(|file| file.language == spec.language)
            .count();
        if count > 0 && best.is_none_or(|(_, top)| count > top) {
            best = Some((spec.language, count));
        }
    }
    best.map(|(language, _)| language)
}

fn hash_file(path: &Path) -> Result<String> {
    let data = fs::read(path)?;
    let mut hasher = Hasher::new();
    hasher.update(&data);
    Ok(hasher.finalize().to_hex().to_string())
}
