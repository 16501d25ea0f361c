use crate::diagnostic::Span;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Elif,
    Else,
    EndIf,
    For,
    In,
    EndFor,
    Let,
    Block,
    EndBlock,
    Extends,
    Include,
}

impl Keyword {
    pub fn from_ident(ident: &str) -> Option<Keyword> {
        Some(match ident {
            "if" => Keyword::If,
            "elif" => Keyword::Elif,
            "else" => Keyword::Else,
            "endif" => Keyword::EndIf,
            "for" => Keyword::For,
            "in" => Keyword::In,
            "endfor" => Keyword::EndFor,
            "let" => Keyword::Let,
            "block" => Keyword::Block,
            "endblock" => Keyword::EndBlock,
            "extends" => Keyword::Extends,
            "include" => Keyword::Include,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::EndIf => "endif",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::EndFor => "endfor",
            Keyword::Let => "let",
            Keyword::Block => "block",
            Keyword::EndBlock => "endblock",
            Keyword::Extends => "extends",
            Keyword::Include => "include",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Text,
    ExprOpen,
    ExprClose,
    BlockOpen,
    BlockClose,
    Ident,
    Keyword(Keyword),
    Str,
    Number,
    Bool,
    Null,
    Op(Operator),
    Pipe,
    Comma,
    Colon,
    Dot,
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Decoded text for `Str`, post-trim text for `Text`, source text otherwise.
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            span,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Text => f.write_str("text"),
            TokenKind::ExprOpen => f.write_str("expression opener"),
            TokenKind::ExprClose => f.write_str("expression closer"),
            TokenKind::BlockOpen => f.write_str("block opener"),
            TokenKind::BlockClose => f.write_str("block closer"),
            TokenKind::Ident => f.write_str("identifier"),
            TokenKind::Keyword(k) => write!(f, "keyword `{}`", k.as_str()),
            TokenKind::Str => f.write_str("string"),
            TokenKind::Number => f.write_str("number"),
            TokenKind::Bool => f.write_str("bool"),
            TokenKind::Null => f.write_str("null"),
            TokenKind::Op(_) => f.write_str("operator"),
            TokenKind::Pipe => f.write_str("`|`"),
            TokenKind::Comma => f.write_str("`,`"),
            TokenKind::Colon => f.write_str("`:`"),
            TokenKind::Dot => f.write_str("`.`"),
            TokenKind::Assign => f.write_str("`=`"),
            TokenKind::LParen => f.write_str("`(`"),
            TokenKind::RParen => f.write_str("`)`"),
            TokenKind::LBracket => f.write_str("`[`"),
            TokenKind::RBracket => f.write_str("`]`"),
        }
    }
}
