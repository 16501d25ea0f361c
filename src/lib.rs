//! A small text template engine.
//!
//! Templates are tokenized, parsed into a tree, resolved against their
//! `extends` and `include` references and rendered against a [`Context`].
//! [`Engine`] ties the stages together and caches resolved templates.

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod filter;
pub mod loader;
pub mod tpl;
pub mod value;

pub use config::{BlockOverride, EscapeMode, Options, Syntax, UndefinedVariable};
pub use diagnostic::{Source, Span};
pub use error::{
    Error, ErrorKind, InheritanceError, LexError, ParseError, RenderError, Report, Result,
};
pub use filter::{Filter, FilterError, FilterRegistry, register_filter};
pub use loader::{Loader, MemoryLoader, NoLoader};
pub use tpl::ast::Template;
pub use tpl::{
    Context, Engine, ResolvedTemplate, compile, compile_with, render, resolve, resolve_template,
};
pub use value::{Mapping, Value, ValueError, to_value};
