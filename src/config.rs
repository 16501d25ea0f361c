use std::borrow::Cow;

pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 64;

/// How rendered expression output is escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeMode {
    None,
    #[default]
    Html,
}

impl EscapeMode {
    pub fn escape<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self {
            EscapeMode::None => Cow::Borrowed(text),
            EscapeMode::Html => escape_html(text),
        }
    }
}

fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Treatment of variables that are not found in any scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UndefinedVariable {
    #[default]
    Strict,
    /// Undefined variables evaluate to `Null` and render as "".
    Lenient,
}

/// Treatment of child blocks that have no counterpart in the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockOverride {
    #[default]
    Strict,
    /// Unknown blocks are rendered after the parent's body.
    Lenient,
}

/// Tag delimiters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    pub expression: (String, String),
    pub block: (String, String),
    pub comment: (String, String),
}

impl Default for Syntax {
    fn default() -> Self {
        Self {
            expression: ("{{".into(), "}}".into()),
            block: ("{%".into(), "%}".into()),
            comment: ("{#".into(), "#}".into()),
        }
    }
}

impl Syntax {
    pub fn expression(mut self, open: &str, close: &str) -> Self {
        self.expression = (open.to_string(), close.to_string());
        self
    }

    pub fn block(mut self, open: &str, close: &str) -> Self {
        self.block = (open.to_string(), close.to_string());
        self
    }

    pub fn comment(mut self, open: &str, close: &str) -> Self {
        self.comment = (open.to_string(), close.to_string());
        self
    }
}

/// Options consulted by compile, resolve and render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub escape_mode: EscapeMode,
    pub undefined_variable: UndefinedVariable,
    pub block_override: BlockOverride,
    /// Bound on expression nesting, construct nesting, `extends`/`include`
    /// chain length and render recursion.
    pub max_recursion_depth: usize,
    pub syntax: Syntax,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            escape_mode: EscapeMode::default(),
            undefined_variable: UndefinedVariable::default(),
            block_override: BlockOverride::default(),
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            syntax: Syntax::default(),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn escape_mode(mut self, escape_mode: EscapeMode) -> Self {
        self.escape_mode = escape_mode;
        self
    }

    pub fn undefined_variable(mut self, undefined_variable: UndefinedVariable) -> Self {
        self.undefined_variable = undefined_variable;
        self
    }

    pub fn block_override(mut self, block_override: BlockOverride) -> Self {
        self.block_override = block_override;
        self
    }

    pub fn max_recursion_depth(mut self, max_recursion_depth: usize) -> Self {
        self.max_recursion_depth = max_recursion_depth;
        self
    }

    pub fn syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            EscapeMode::Html.escape(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
        assert!(matches!(EscapeMode::Html.escape("plain"), Cow::Borrowed(_)));
        assert_eq!(EscapeMode::None.escape("<b>"), "<b>");
    }

    #[test]
    fn test_builder() {
        let options = Options::new()
            .escape_mode(EscapeMode::None)
            .undefined_variable(UndefinedVariable::Lenient)
            .block_override(BlockOverride::Lenient)
            .max_recursion_depth(8)
            .syntax(Syntax::default().expression("[[", "]]"));

        assert_eq!(options.escape_mode, EscapeMode::None);
        assert_eq!(options.undefined_variable, UndefinedVariable::Lenient);
        assert_eq!(options.block_override, BlockOverride::Lenient);
        assert_eq!(options.max_recursion_depth, 8);
        assert_eq!(options.syntax.expression.0, "[[");
        assert_eq!(options.syntax.block.0, "{%");
    }
}
