use crate::config::Options;
use crate::error::Result;
use crate::filter::{Filter, FilterRegistry};
use crate::loader::{Loader, NoLoader};
use crate::tpl::ast::Template;
use crate::tpl::cache::TemplateCache;
use crate::tpl::render_context::Context;
use crate::tpl::resolver::{ResolvedTemplate, resolve, resolve_template};
use crate::tpl::{compile_with, render};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Name given to templates rendered with [`Engine::render_str`].
pub const INLINE_TEMPLATE: &str = "<string>";

/// Owns everything a render needs: templates, a loader, filters, options
/// and a cache of resolved templates.
pub struct Engine {
    loader: Box<dyn Loader>,
    filters: FilterRegistry,
    options: Options,
    templates: HashMap<String, Arc<Template>>,
    cache: TemplateCache,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut templates: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        templates.sort_unstable();
        f.debug_struct("Engine")
            .field("filters", &self.filters)
            .field("options", &self.options)
            .field("templates", &templates)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl Engine {
    /// An engine with the builtin filters and no loader.
    pub fn new() -> Self {
        Self::with_loader(NoLoader)
    }

    pub fn with_loader(loader: impl Loader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            filters: FilterRegistry::with_builtins(),
            options: Options::default(),
            templates: HashMap::new(),
            cache: TemplateCache::new(),
        }
    }

    /// Replace the options. Templates added afterwards compile under them.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self.cache.clear();
        self
    }

    pub fn with_filters(mut self, filters: FilterRegistry) -> Self {
        self.filters = filters;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Compile `source` and register it under `name`.
    ///
    /// Cached templates may extend or include `name`, so the whole cache is dropped.
    pub fn add_template(&mut self, name: impl Into<String>, source: &str) -> Result<()> {
        let name = name.into();
        let template = compile_with(source, &name, &self.options)?;
        self.templates.insert(name, Arc::new(template));
        self.cache.clear();
        Ok(())
    }

    pub fn add_filter(&mut self, name: impl Into<String>, filter: impl Filter + 'static) {
        self.filters.register(name, filter);
    }

    /// The resolved template called `name`, from the cache when possible.
    ///
    /// A first access resolves under a cache shard lock; see
    /// [`TemplateCache::get_or_resolve`].
    pub fn get_template(&self, name: &str) -> Result<Arc<ResolvedTemplate>> {
        self.cache.get_or_resolve(name, || {
            resolve(name, &self.templates, self.loader.as_ref(), &self.options)
        })
    }

    pub fn render(&self, name: &str, context: &Context) -> Result<String> {
        let template = self.get_template(name)?;
        render(&template, context, &self.filters, &self.options)
    }

    /// Render a one-off template. It may extend or include named templates
    /// but is never cached.
    pub fn render_str(&self, source: &str, context: &Context) -> Result<String> {
        let template = compile_with(source, INLINE_TEMPLATE, &self.options)?;
        let resolved =
            resolve_template(&template, &self.templates, self.loader.as_ref(), &self.options)?;
        render(&resolved, context, &self.filters, &self.options)
    }

    /// Drop the cached resolution of `name`. Templates that extend or
    /// include it keep their cached copy until [`Engine::clear_cache`].
    pub fn invalidate(&self, name: &str) -> bool {
        self.cache.remove(name)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
