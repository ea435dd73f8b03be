// Process configuration from environment variables, plus the optional
// per-project `.depslice.toml`.

use crate::model::Language;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const PROJECT_CONFIG_FILE: &str = ".depslice.toml";

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker threads for parsing and manifest building, 0 = rayon default (DEPSLICE_THREADS)
    pub threads: usize,

    /// Files larger than this are skipped while scanning (DEPSLICE_MAX_FILE_BYTES)
    pub max_file_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: 0,
            max_file_bytes: 2 * 1024 * 1024,
        }
    }
}

impl Config {
    fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(val) = env::var("DEPSLICE_THREADS") {
            if let Ok(parsed) = val.parse() {
                config.threads = parsed;
            } else {
                tracing::warn!(
                    "invalid DEPSLICE_THREADS value: {}, using default: {}",
                    val,
                    config.threads
                );
            }
        }

        if let Ok(val) = env::var("DEPSLICE_MAX_FILE_BYTES") {
            match val.parse() {
                Ok(parsed) if parsed > 0 => config.max_file_bytes = parsed,
                _ => tracing::warn!(
                    "invalid DEPSLICE_MAX_FILE_BYTES value: {}, using default: {}",
                    val,
                    config.max_file_bytes
                ),
            }
        }

        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

/// Settings read from `<repo>/.depslice.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub language: Option<Language>,
    pub include_dirs: Vec<String>,
    pub ignore: Vec<String>,
    pub output_dir: Option<PathBuf>,
}

impl ProjectConfig {
    /// Loads the project file if present; a missing file yields defaults.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = repo_root.join(PROJECT_CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("parse {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: ProjectConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// CLI values win over file values; list options are appended.
    pub fn merge_cli(
        mut self,
        language: Option<Language>,
        include_dirs: &[String],
        output_dir: Option<PathBuf>,
    ) -> Self {
        if language.is_some() {
            self.language = language;
        }
        for dir in include_dirs {
            if !self.include_dirs.contains(dir) {
                self.include_dirs.push(dir.clone());
            }
        }
        if output_dir.is_some() {
            self.output_dir = output_dir;
        }
        self
    }
}
