pub mod ast;
mod cache;
pub(crate) mod engine;
mod lexer;
mod parser;
mod render;
mod render_context;
mod resolver;
pub mod token;

pub use cache::TemplateCache;
pub use engine::Engine;
pub use lexer::tokenize;
pub use parser::parse;
pub use render::render;
pub use render_context::Context;
pub use resolver::{ResolvedTemplate, resolve, resolve_template};

use crate::config::Options;
use crate::diagnostic::Source;
use crate::error::Result;
use ast::Template;
use std::sync::Arc;
use tracing::debug;

/// Compile `source` under default [`Options`].
pub fn compile(source: &str, name: &str) -> Result<Template> {
    compile_with(source, name, &Options::default())
}

pub fn compile_with(source: &str, name: &str, options: &Options) -> Result<Template> {
    let source = Arc::new(Source::new(name, source));
    let tokens = tokenize(&source, &options.syntax)?;
    let template = parse(tokens, source, options)?;
    debug!(
        template = name,
        nodes = template.nodes().len(),
        extends = template.extends(),
        "compiled template"
    );
    Ok(template)
}
