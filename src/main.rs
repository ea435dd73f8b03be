use anyhow::{Context, Result, bail};
use clap::Parser;
use depslice::analysis::{Analysis, AnalysisOptions};
use depslice::config::{Config, ProjectConfig};
use depslice::extractor::Extractor;
use depslice::model::SymbolSet;
use depslice::source::Project;
use depslice::source::scan::{ScanOptions, dominant_language, scan_repo_with_options};
use depslice::{annotations, cli, util};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_SPLIT_DIR: &str = "depslice-split";

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DEPSLICE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn init_threads(config: &Config) {
    if config.threads == 0 {
        return;
    }
    if let Err(err) = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build_global()
    {
        tracing::warn!("could not size the worker pool: {err}");
    }
}

/// Loads the project the way every command needs it: project file merged
/// with flags, language detected when unset.
fn load(project: &cli::ProjectArgs, output_dir: Option<PathBuf>) -> Result<(Analysis, ProjectConfig)> {
    let settings = ProjectConfig::load(&project.repo)?.merge_cli(
        project.language,
        &project.include_dirs,
        output_dir,
    );
    let mut scan = ScanOptions::new(project.no_ignore);
    scan.exclude = settings.ignore.clone();
    scan.max_file_bytes = Config::get().max_file_bytes;
    scan.skip_dirs.push(PathBuf::from(DEFAULT_SPLIT_DIR));
    scan.skip_dirs.extend(settings.output_dir.iter().cloned());

    let language = match settings.language {
        Some(language) => language,
        None => {
            let scanned = scan_repo_with_options(&project.repo, &scan)?;
            match dominant_language(&scanned) {
                Some(language) => language,
                None => bail!("no Python or C sources under {}", project.repo.display()),
            }
        }
    };
    let loaded = Project::load(&project.repo, language, &scan)
        .with_context(|| format!("load {}", project.repo.display()))?;
    let analysis = Analysis::new(
        loaded,
        AnalysisOptions {
            include_dirs: settings.include_dirs.clone(),
        },
    );
    Ok((analysis, settings))
}

fn parse_seeds(raw: &[String]) -> Result<SymbolSet> {
    let mut seeds = SymbolSet::new();
    for value in raw {
        let Some((file, name)) = cli::parse_seed(value) else {
            bail!("invalid --symbol `{value}`, expected `path/to/file:name`");
        };
        seeds.entry(file).or_default().insert(name);
    }
    Ok(seeds)
}

fn write_files(root: &Path, files: &std::collections::BTreeMap<String, String>) -> Result<()> {
    for (file, content) in files {
        let target = root.join(file);
        util::ensure_parent_dir(&target)?;
        std::fs::write(&target, content).with_context(|| format!("write {}", target.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    init_threads(Config::get());
    let args = cli::Args::parse();

    match args.command {
        cli::Command::Manifest { project } => {
            let (analysis, _) = load(&project, None)?;
            let manifest = analysis.manifest()?;
            println!("{}", serde_json::to_string_pretty(&manifest)?);
            Ok(())
        }
        cli::Command::Extract {
            project,
            symbols,
            output_dir,
        } => {
            let seeds = parse_seeds(&symbols)?;
            let (analysis, settings) = load(&project, output_dir)?;
            let manifest = analysis.manifest()?;
            let files = Extractor::new(&analysis, &manifest).extract(&seeds)?;
            match settings.output_dir {
                Some(dir) => {
                    write_files(&dir, &files)?;
                    let written: Vec<&String> = files.keys().collect();
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&json!({ "outputDir": dir, "files": written }))?
                    );
                }
                None => println!("{}", serde_json::to_string_pretty(&files)?),
            }
            Ok(())
        }
        cli::Command::Scan {
            project,
            entrypoint,
        } => {
            let (analysis, _) = load(&project, None)?;
            let manifest = analysis.manifest()?;
            let endpoints = annotations::scan(&analysis, &manifest, &entrypoint)?;
            println!("{}", serde_json::to_string_pretty(&endpoints)?);
            Ok(())
        }
        cli::Command::Split {
            project,
            entrypoint,
            output_dir,
        } => {
            let (analysis, settings) = load(&project, output_dir)?;
            let output_dir = settings
                .output_dir
                .unwrap_or_else(|| project.repo.join(DEFAULT_SPLIT_DIR));
            let manifest = analysis.manifest()?;
            let index = annotations::split(&analysis, &manifest, &entrypoint, &output_dir)?;
            println!("{}", serde_json::to_string_pretty(&index)?);
            Ok(())
        }
        cli::Command::Diagnostics { project } => {
            let (analysis, _) = load(&project, None)?;
            for diagnostic in analysis.diagnostics() {
                tracing::warn!(path = %diagnostic.path, rule = %diagnostic.rule_id, "{}", diagnostic.message);
            }
            println!("{}", serde_json::to_string_pretty(analysis.diagnostics())?);
            Ok(())
        }
    }
}
