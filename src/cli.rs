use crate::model::Language;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "depslice",
    version,
    about = "Dependency manifests and minimal extraction for Python and C projects",
    after_help = r#"Examples:
  depslice manifest --repo .
  depslice extract --repo . --symbol src/burgers.c:create_burger --output-dir out
  depslice scan --repo . --entrypoint app.py
  depslice split --repo . --entrypoint app.py --output-dir split
  depslice diagnostics --repo . --language c --include-dir include
"#
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

/// Options every command takes.
#[derive(ClapArgs, Debug, Clone)]
pub struct ProjectArgs {
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,
    /// python|c; detected from file counts when omitted.
    #[arg(long)]
    pub language: Option<Language>,
    /// Extra C include directory, relative to the repo. Repeatable.
    #[arg(long = "include-dir")]
    pub include_dirs: Vec<String>,
    /// Include files ignored by .gitignore.
    #[arg(long)]
    pub no_ignore: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the dependency manifest as JSON.
    Manifest {
        #[command(flatten)]
        project: ProjectArgs,
    },
    /// Extract the minimal source for one or more symbols.
    Extract {
        #[command(flatten)]
        project: ProjectArgs,
        /// Seed symbol as `path/to/file:name`. Repeatable.
        #[arg(long = "symbol", required = true)]
        symbols: Vec<String>,
        /// Write files here instead of printing them as JSON.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// List the annotated endpoints reachable from an entrypoint.
    Scan {
        #[command(flatten)]
        project: ProjectArgs,
        #[arg(long)]
        entrypoint: String,
    },
    /// Extract one project copy per endpoint group.
    Split {
        #[command(flatten)]
        project: ProjectArgs,
        #[arg(long)]
        entrypoint: String,
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Print parse and registry diagnostics.
    Diagnostics {
        #[command(flatten)]
        project: ProjectArgs,
    },
}

/// Splits `file:name` at the last colon.
pub fn parse_seed(raw: &str) -> Option<(String, String)> {
    let (file, name) = raw.rsplit_once(':')?;
    if file.is_empty() || name.is_empty() {
        return None;
    }
    Some((file.replace('\\', "/"), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_split_on_last_colon() {
        assert_eq!(
            parse_seed("src/app.py:main"),
            Some(("src/app.py".to_string(), "main".to_string()))
        );
        assert_eq!(parse_seed("app.py"), None);
        assert_eq!(parse_seed("app.py:"), None);
    }

    #[test]
    fn args_parse_repeatable_flags() {
        let args = Args::parse_from([
            "depslice",
            "extract",
            "--repo",
            "proj",
            "--language",
            "c",
            "--include-dir",
            "include",
            "--symbol",
            "a.c:f",
            "--symbol",
            "b.h:g",
        ]);
        match args.command {
            Command::Extract {
                project, symbols, ..
            } => {
                assert_eq!(project.language, Some(Language::C));
                assert_eq!(project.include_dirs, vec!["include".to_string()]);
                assert_eq!(symbols.len(), 2);
            }
            _ => panic!("expected extract"),
        }
    }
}
