use crate::diagnostic::{Source, Span};
use miette::{Diagnostic, GraphicalReportHandler, GraphicalTheme, LabeledSpan, SourceCode};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failures while splitting source text into tokens.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated tag")]
    UnterminatedTag,
    #[error("invalid escape sequence")]
    InvalidEscape,
}

/// Failures while building a template from tokens.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected token")]
    UnexpectedToken,
    #[error("unknown keyword")]
    UnknownKeyword,
    #[error("unmatched end")]
    UnmatchedEnd,
    #[error("unclosed block")]
    UnclosedBlock,
    #[error("duplicate block name")]
    DuplicateBlockName,
    #[error("extends must come first")]
    ExtendsNotFirst,
    #[error("maximum nesting depth exceeded")]
    MaxDepthExceeded,
}

/// Failures while following `extends` and `include` references.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InheritanceError {
    #[error("missing template")]
    MissingParent,
    #[error("cyclic extends")]
    CyclicExtends,
    #[error("unknown block override")]
    UnknownBlockOverride,
}

/// Failures while rendering a resolved template.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    #[error("undefined variable")]
    UndefinedVariable,
    #[error("unknown filter")]
    UnknownFilter,
    #[error("filter argument error")]
    FilterArgumentError,
    #[error("type mismatch")]
    TypeMismatch,
    #[error("division by zero")]
    DivisionByZero,
    #[error("not iterable")]
    NotIterable,
    #[error("maximum nesting depth exceeded")]
    MaxDepthExceeded,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("inheritance error: {0}")]
    Inheritance(#[from] InheritanceError),
    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

impl ErrorKind {
    /// Stable diagnostic code, e.g. `stencil::render::undefined_variable`.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Lex(LexError::UnterminatedTag) => "stencil::lex::unterminated_tag",
            ErrorKind::Lex(LexError::InvalidEscape) => "stencil::lex::invalid_escape",
            ErrorKind::Parse(e) => match e {
                ParseError::UnexpectedToken => "stencil::parse::unexpected_token",
                ParseError::UnknownKeyword => "stencil::parse::unknown_keyword",
                ParseError::UnmatchedEnd => "stencil::parse::unmatched_end",
                ParseError::UnclosedBlock => "stencil::parse::unclosed_block",
                ParseError::DuplicateBlockName => "stencil::parse::duplicate_block_name",
                ParseError::ExtendsNotFirst => "stencil::parse::extends_not_first",
                ParseError::MaxDepthExceeded => "stencil::parse::max_depth_exceeded",
            },
            ErrorKind::Inheritance(e) => match e {
                InheritanceError::MissingParent => "stencil::inheritance::missing_parent",
                InheritanceError::CyclicExtends => "stencil::inheritance::cyclic_extends",
                InheritanceError::UnknownBlockOverride => {
                    "stencil::inheritance::unknown_block_override"
                }
            },
            ErrorKind::Render(e) => match e {
                RenderError::UndefinedVariable => "stencil::render::undefined_variable",
                RenderError::UnknownFilter => "stencil::render::unknown_filter",
                RenderError::FilterArgumentError => "stencil::render::filter_argument_error",
                RenderError::TypeMismatch => "stencil::render::type_mismatch",
                RenderError::DivisionByZero => "stencil::render::division_by_zero",
                RenderError::NotIterable => "stencil::render::not_iterable",
                RenderError::MaxDepthExceeded => "stencil::render::max_depth_exceeded",
            },
        }
    }

    /// Short text for the label under the offending span.
    fn label(&self) -> String {
        match self {
            ErrorKind::Lex(e) => e.to_string(),
            ErrorKind::Parse(e) => e.to_string(),
            ErrorKind::Inheritance(e) => e.to_string(),
            ErrorKind::Render(e) => e.to_string(),
        }
    }
}

/// A diagnostic produced by any stage of the pipeline.
///
/// `Display` gives a one-line summary. The [`miette::Diagnostic`] impl
/// carries the template text, a label at the offending span and an
/// optional help line; [`Error::report`] renders all of it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}{}", location(.template, .span))]
pub struct Error {
    kind: ErrorKind,
    message: String,
    template: Option<String>,
    span: Option<Span>,
    origin: Option<Arc<Source>>,
    help: Option<String>,
}

pub type Result<T> = std::result::Result<T, Error>;

fn location(template: &Option<String>, span: &Option<Span>) -> String {
    match (template, span) {
        (Some(name), Some(span)) => format!(" ({name}:{span})"),
        (Some(name), None) => format!(" ({name})"),
        (None, Some(span)) => format!(" ({span})"),
        (None, None) => String::new(),
    }
}

impl Error {
    pub fn new(kind: impl Into<ErrorKind>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            template: None,
            span: None,
            origin: None,
            help: None,
        }
    }

    /// Attach a position inside `source`. The template name and its text
    /// travel with the error for reporting.
    pub fn at(mut self, span: Span, source: &Arc<Source>) -> Self {
        self.template = Some(source.name().to_string());
        self.origin = Some(Arc::clone(source));
        self.span = Some(span);
        self
    }

    pub fn in_template(mut self, name: impl Into<String>) -> Self {
        self.template = Some(name.into());
        self
    }

    /// A suggestion printed under the report.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    pub fn span(&self) -> Option<Span> {
        self.span
    }

    pub fn line(&self) -> Option<usize> {
        self.span.map(|s| s.line)
    }

    pub fn column(&self) -> Option<usize> {
        self.span.map(|s| s.column)
    }

    pub fn byte_offset(&self) -> Option<usize> {
        self.span.map(|s| s.offset)
    }

    pub fn help_text(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// The full text of the line the error points at.
    pub fn source_snippet(&self) -> Option<&str> {
        let (source, span) = (self.origin.as_ref()?, self.span?);
        Some(source.line_text(span.line))
    }

    /// Multi-line rendering of the diagnostic, without colors.
    ///
    /// ```text
    ///   × render error: undefined variable: `nme` is not defined (page.html:1:11)
    ///    ╭─[page.html:1:11]
    ///  1 │ Hello, {{ nme }}!
    ///    ·           ─┬─
    ///    ·            ╰── undefined variable
    ///    ╰────
    /// ```
    pub fn report(&self) -> String {
        let handler = GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor());
        let mut out = String::new();
        match handler.render_report(&mut out, self) {
            Ok(()) => out,
            Err(_) => self.to_string(),
        }
    }
}

impl Diagnostic for Error {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(self.kind.code()))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_deref()
            .map(|help| Box::new(help) as Box<dyn fmt::Display + 'a>)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.origin.as_deref().map(|s| s as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = self.span?;
        self.origin.as_ref()?;
        Some(Box::new(std::iter::once(LabeledSpan::at(
            span,
            self.kind.label(),
        ))))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind, kind.to_string())
    }
}

/// Wraps an [`Error`] so that `{}` prints the full report.
pub struct Report<'a>(pub &'a Error);

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        GraphicalReportHandler::new_themed(GraphicalTheme::unicode_nocolor())
            .render_report(f, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Arc<Source> {
        Arc::new(Source::new("page.html", "Hello, {{ nme }}!"))
    }

    #[test]
    fn test_display_includes_location() {
        let source = page();
        let err = Error::new(RenderError::UndefinedVariable, "`nme` is not defined")
            .at(source.span(10, 13), &source);

        assert_eq!(
            err.to_string(),
            "render error: undefined variable: `nme` is not defined (page.html:1:11)"
        );
        assert_eq!(err.kind(), ErrorKind::Render(RenderError::UndefinedVariable));
        assert_eq!(err.line(), Some(1));
        assert_eq!(err.column(), Some(11));
        assert_eq!(err.byte_offset(), Some(10));
        assert_eq!(err.source_snippet(), Some("Hello, {{ nme }}!"));
    }

    #[test]
    fn test_diagnostic_parts() {
        let source = page();
        let err = Error::new(RenderError::UndefinedVariable, "`nme` is not defined")
            .at(source.span(10, 13), &source)
            .with_help("did you mean `name`?");

        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("stencil::render::undefined_variable"));
        let help = Diagnostic::help(&err).map(|h| h.to_string());
        assert_eq!(help.as_deref(), Some("did you mean `name`?"));
        assert!(err.source_code().is_some());

        let labels: Vec<LabeledSpan> = err.labels().unwrap().collect();
        assert_eq!(labels.len(), 1);
        assert_eq!((labels[0].offset(), labels[0].len()), (10, 3));
        assert_eq!(labels[0].label(), Some("undefined variable"));
    }

    #[test]
    fn test_report() {
        let source = page();
        let err = Error::new(RenderError::UndefinedVariable, "`nme` is not defined")
            .at(source.span(10, 13), &source)
            .with_help("did you mean `name`?");
        let report = err.report();

        assert!(report.contains("render error: undefined variable: `nme` is not defined"));
        assert!(report.contains("page.html:1:11"));
        assert!(report.contains("Hello, {{ nme }}!"));
        assert!(report.contains("did you mean `name`?"));
        assert_eq!(Report(&err).to_string(), report);
    }

    #[test]
    fn test_without_position() {
        let err = Error::new(InheritanceError::MissingParent, "template `base` not found");
        assert_eq!(
            err.to_string(),
            "inheritance error: missing template: template `base` not found"
        );
        assert!(err.labels().is_none());
        assert!(err.source_code().is_none());
        assert!(err.source_snippet().is_none());
        assert!(err.report().contains(&err.to_string()));
    }
}
