use crate::error::Result;
use crate::tpl::resolver::ResolvedTemplate;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tracing::{debug, trace};

/// Resolved templates by name.
///
/// An entry is resolved at most once even under concurrent first access:
/// the entry lock is held while the template is resolved and inserted.
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: DashMap<String, Arc<ResolvedTemplate>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ResolvedTemplate>> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    /// Return the cached template, calling `resolve` to populate a missing entry.
    ///
    /// On a miss the write lock of the shard holding `name` is held until
    /// `resolve` returns, loader I/O included. Lookups of other names on the
    /// same shard wait for it; names on other shards do not. `resolve` must
    /// not touch this cache.
    pub fn get_or_resolve<F>(&self, name: &str, resolve: F) -> Result<Arc<ResolvedTemplate>>
    where
        F: FnOnce() -> Result<ResolvedTemplate>,
    {
        if let Some(hit) = self.get(name) {
            trace!(template = name, "template cache hit");
            return Ok(hit);
        }
        match self.entries.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let resolved = Arc::new(resolve()?);
                entry.insert(resolved.clone());
                debug!(template = name, "template cached");
                Ok(resolved)
            }
        }
    }

    /// Drop one entry; returns whether it was present.
    pub fn remove(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
