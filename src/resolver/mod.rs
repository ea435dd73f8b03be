//! Module specifier resolution.
//!
//! Resolution is a pure function of the file set, memoized per
//! `(current file, specifier)` in a [`ResolverCache`] owned by the run.

pub mod c;
pub mod python;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "camelCase")]
pub enum Resolution {
    FileModule(String),
    PackageModule(String),
    NamespacePackageModule(String),
    Unresolved,
}

impl Resolution {
    /// The file backing the module. Namespace packages have none.
    pub fn file(&self) -> Option<&str> {
        match self {
            Resolution::FileModule(path) | Resolution::PackageModule(path) => Some(path),
            Resolution::NamespacePackageModule(_) | Resolution::Unresolved => None,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Resolution::FileModule(path)
            | Resolution::PackageModule(path)
            | Resolution::NamespacePackageModule(path) => Some(path),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Resolution::Unresolved)
    }
}

#[derive(Debug, Default)]
pub struct ResolverCache {
    entries: Mutex<HashMap<(String, String), Resolution>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ResolverCache {
    pub fn get_or_insert_with(
        &self,
        current: &str,
        specifier: &str,
        resolve: impl FnOnce() -> Resolution,
    ) -> Resolution {
        let key = (current.to_string(), specifier.to_string());
        if let Some(found) = self.lock().get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return found.clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        // Resolution is pure, so a racing insert stores the same value.
        let resolved = resolve();
        self.lock().insert(key, resolved.clone());
        resolved
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), Resolution>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Maps a specifier written in `current` to a module.
pub trait ModuleResolver: Sync {
    fn resolve_uncached(&self, current: &str, specifier: &str) -> Resolution;

    fn cache(&self) -> &ResolverCache;

    fn resolve(&self, current: &str, specifier: &str) -> Resolution {
        self.cache()
            .get_or_insert_with(current, specifier, || {
                self.resolve_uncached(current, specifier)
            })
    }
}
