//! Template lookup by name.

use std::collections::HashMap;

/// Maps a template name to its source text.
///
/// Implemented for closures so a loader can be as small as
/// `|name: &str| std::fs::read_to_string(name).ok()`.
pub trait Loader: Send + Sync {
    fn load(&self, name: &str) -> Option<String>;
}

impl<F> Loader for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn load(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// A loader backed by an in-memory map.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: HashMap<String, String>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(name.into(), source.into());
    }

    pub fn with(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.insert(name, source);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.sources.remove(name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Loader for MemoryLoader {
    fn load(&self, name: &str) -> Option<String> {
        self.sources.get(name).cloned()
    }
}

/// A loader that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLoader;

impl Loader for NoLoader {
    fn load(&self, _name: &str) -> Option<String> {
        None
    }
}
