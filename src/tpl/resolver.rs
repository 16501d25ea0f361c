use crate::config::{BlockOverride, Options};
use crate::diagnostic::{Source, Span};
use crate::error::{Error, InheritanceError, Result};
use crate::loader::Loader;
use crate::tpl::ast::{Included, Node, Template};
use crate::tpl::compile_with;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// A template with its inheritance chain and includes merged into one tree.
///
/// The tree contains no `Extends` nodes and every `Include` carries its
/// target, so it renders without further lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTemplate {
    name: String,
    /// Source of the root ancestor, which authored every node outside a block.
    source: Arc<Source>,
    nodes: Vec<Node>,
}

impl ResolvedTemplate {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<Source> {
        &self.source
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

impl fmt::Display for ResolvedTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.nodes.iter().try_for_each(|node| write!(f, "{node}"))
    }
}

/// Resolve the template called `name`, taken from `compiled` or else from `loader`.
pub fn resolve(
    name: &str,
    compiled: &HashMap<String, Arc<Template>>,
    loader: &dyn Loader,
    options: &Options,
) -> Result<ResolvedTemplate> {
    let mut resolver = Resolver::new(compiled, loader, options);
    let template = resolver.fetch(name, None)?;
    resolver.finish(&template)
}

/// Resolve an already compiled template; its ancestors and includes are
/// looked up in `compiled` and then `loader`.
pub fn resolve_template(
    template: &Template,
    compiled: &HashMap<String, Arc<Template>>,
    loader: &dyn Loader,
    options: &Options,
) -> Result<ResolvedTemplate> {
    Resolver::new(compiled, loader, options).finish(template)
}

/// A reference to another template: where it was written.
type Site<'s> = Option<(Span, &'s Arc<Source>)>;

struct Resolver<'a> {
    compiled: &'a HashMap<String, Arc<Template>>,
    loader: &'a dyn Loader,
    options: &'a Options,
    /// Templates currently being merged, outermost first.
    chain: Vec<String>,
    loaded: HashMap<String, Arc<Template>>,
}

impl<'a> Resolver<'a> {
    fn new(
        compiled: &'a HashMap<String, Arc<Template>>,
        loader: &'a dyn Loader,
        options: &'a Options,
    ) -> Self {
        Self {
            compiled,
            loader,
            options,
            chain: Vec::new(),
            loaded: HashMap::new(),
        }
    }

    fn finish(mut self, template: &Template) -> Result<ResolvedTemplate> {
        let start = Instant::now();
        let (source, nodes) = self.merge(template, None)?;
        debug!(
            template = template.name(),
            loaded = self.loaded.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "resolved template"
        );
        Ok(ResolvedTemplate {
            name: template.name().to_string(),
            source,
            nodes,
        })
    }

    fn fetch(&mut self, name: &str, site: Site<'_>) -> Result<Arc<Template>> {
        if let Some(template) = self.compiled.get(name).or_else(|| self.loaded.get(name)) {
            return Ok(template.clone());
        }
        let Some(text) = self.loader.load(name) else {
            let err = Error::new(
                InheritanceError::MissingParent,
                format!("template `{name}` not found"),
            );
            return Err(locate(err, site));
        };
        let template = Arc::new(compile_with(&text, name, self.options)?);
        self.loaded.insert(name.to_string(), template.clone());
        Ok(template)
    }

    fn merge(&mut self, template: &Template, site: Site<'_>) -> Result<(Arc<Source>, Vec<Node>)> {
        let name = template.name();
        if self.chain.iter().any(|n| n == name) {
            let cycle: Vec<String> = self
                .chain
                .iter()
                .map(String::as_str)
                .chain([name])
                .map(|n| format!("`{n}`"))
                .collect();
            let err = Error::new(
                InheritanceError::CyclicExtends,
                format!("cycle through {}", cycle.join(" -> ")),
            );
            return Err(locate(err, site));
        }
        if self.chain.len() >= self.options.max_recursion_depth {
            let err = Error::new(
                InheritanceError::CyclicExtends,
                format!(
                    "template chain deeper than {}",
                    self.options.max_recursion_depth
                ),
            );
            return Err(locate(err, site));
        }

        self.chain.push(name.to_string());
        let merged = self.merge_chain(template);
        self.chain.pop();
        merged
    }

    fn merge_chain(&mut self, template: &Template) -> Result<(Arc<Source>, Vec<Node>)> {
        let source = template.source();
        let Some((parent_name, extends_span)) = extends_of(template) else {
            let mut nodes = template.nodes().to_vec();
            self.link(&mut nodes, source)?;
            return Ok((source.clone(), nodes));
        };

        let site = Some((extends_span, source));
        let parent = self.fetch(parent_name, site)?;
        let (root, mut nodes) = self.merge(&parent, site)?;

        let mut overrides = IndexMap::new();
        collect_blocks(template.nodes(), &mut overrides);
        for block in overrides.values_mut() {
            self.link(std::slice::from_mut(block), source)?;
        }

        let mut known = HashSet::new();
        block_names(&nodes, &mut known);
        let unknown: Vec<String> = overrides
            .keys()
            .filter(|name| !known.contains(name.as_str()))
            .cloned()
            .collect();

        apply_overrides(&mut nodes, &overrides);

        match self.options.block_override {
            BlockOverride::Strict => {
                if let Some(name) = unknown.first() {
                    let span = overrides.get(name).map(Node::span).unwrap_or_default();
                    return Err(Error::new(
                        InheritanceError::UnknownBlockOverride,
                        format!("block `{name}` does not exist in `{parent_name}`"),
                    )
                    .at(span, source));
                }
            }
            BlockOverride::Lenient => {
                for name in &unknown {
                    if let Some(block) = overrides.swap_remove(name) {
                        nodes.push(block);
                    }
                }
            }
        }
        Ok((root, nodes))
    }

    /// Attach the merged target of every `include` under `nodes`.
    fn link(&mut self, nodes: &mut [Node], source: &Arc<Source>) -> Result<()> {
        for node in nodes {
            match node {
                Node::Include {
                    name, span, target, ..
                } => {
                    let site = Some((*span, source));
                    let included = self.fetch(name, site)?;
                    let (included_source, merged) = self.merge(&included, site)?;
                    *target = Some(Arc::new(Included {
                        source: included_source,
                        nodes: merged,
                    }));
                }
                Node::Block { body, origin, .. } => {
                    let origin = origin.clone();
                    self.link(body, &origin)?;
                }
                Node::If {
                    branches,
                    else_body,
                    ..
                } => {
                    for (_, body) in branches {
                        self.link(body, source)?;
                    }
                    if let Some(body) = else_body {
                        self.link(body, source)?;
                    }
                }
                Node::For {
                    body, empty_body, ..
                } => {
                    self.link(body, source)?;
                    if let Some(body) = empty_body {
                        self.link(body, source)?;
                    }
                }
                Node::Text { .. } | Node::Output { .. } | Node::Let { .. } | Node::Extends { .. } => {}
            }
        }
        Ok(())
    }
}

fn locate(err: Error, site: Site<'_>) -> Error {
    match site {
        Some((span, source)) => err.at(span, source),
        None => err,
    }
}

fn extends_of(template: &Template) -> Option<(&str, Span)> {
    template.nodes().iter().find_map(|node| match node {
        Node::Extends { parent, span } => Some((parent.as_str(), *span)),
        _ => None,
    })
}

/// Blocks a child defines, outermost only: nested blocks travel with their parent block.
fn collect_blocks(nodes: &[Node], out: &mut IndexMap<String, Node>) {
    for node in nodes {
        match node {
            Node::Block { name, .. } => {
                out.insert(name.clone(), node.clone());
            }
            Node::If {
                branches,
                else_body,
                ..
            } => {
                for (_, body) in branches {
                    collect_blocks(body, out);
                }
                if let Some(body) = else_body {
                    collect_blocks(body, out);
                }
            }
            Node::For {
                body, empty_body, ..
            } => {
                collect_blocks(body, out);
                if let Some(body) = empty_body {
                    collect_blocks(body, out);
                }
            }
            _ => {}
        }
    }
}

fn block_names(nodes: &[Node], out: &mut HashSet<String>) {
    for node in nodes {
        match node {
            Node::Block { name, body, .. } => {
                out.insert(name.clone());
                block_names(body, out);
            }
            Node::If {
                branches,
                else_body,
                ..
            } => {
                for (_, body) in branches {
                    block_names(body, out);
                }
                if let Some(body) = else_body {
                    block_names(body, out);
                }
            }
            Node::For {
                body, empty_body, ..
            } => {
                block_names(body, out);
                if let Some(body) = empty_body {
                    block_names(body, out);
                }
            }
            _ => {}
        }
    }
}

fn apply_overrides(nodes: &mut [Node], overrides: &IndexMap<String, Node>) {
    for node in nodes {
        let replacement = match node {
            Node::Block { name, .. } => overrides.get(name.as_str()).cloned(),
            _ => None,
        };
        if let Some(replacement) = replacement {
            *node = replacement;
            continue;
        }
        match node {
            Node::Block { body, .. } => apply_overrides(body, overrides),
            Node::If {
                branches,
                else_body,
                ..
            } => {
                for (_, body) in branches {
                    apply_overrides(body, overrides);
                }
                if let Some(body) = else_body {
                    apply_overrides(body, overrides);
                }
            }
            Node::For {
                body, empty_body, ..
            } => {
                apply_overrides(body, overrides);
                if let Some(body) = empty_body {
                    apply_overrides(body, overrides);
                }
            }
            _ => {}
        }
    }
}
