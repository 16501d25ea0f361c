use crate::config::Syntax;
use crate::diagnostic::{Source, Span};
use crate::error::{Error, LexError, ParseError, Result};
use crate::tpl::token::{Keyword, Operator, Token, TokenKind};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Expr,
    Block,
    Comment,
}

struct Lexer<'a> {
    source: &'a Arc<Source>,
    text: &'a str,
    syntax: &'a Syntax,
    pos: usize,
    /// Set by a `-` before a close delimiter; strips the next text's leading whitespace.
    trim_next: bool,
    tokens: Vec<Token>,
}

/// Split `source` into tokens, alternating between text and tag mode.
pub fn tokenize(source: &Arc<Source>, syntax: &Syntax) -> Result<Vec<Token>> {
    let mut lexer = Lexer {
        source,
        text: source.text(),
        syntax,
        pos: 0,
        trim_next: false,
        tokens: Vec::new(),
    };
    while lexer.pos < lexer.text.len() {
        if let Some(kind) = lexer.lex_text() {
            lexer.lex_tag(kind)?;
        }
    }
    trace!(template = source.name(), tokens = lexer.tokens.len(), "tokenized");
    Ok(lexer.tokens)
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn delimiters(&self, kind: TagKind) -> (&'a str, &'a str) {
        let syntax = self.syntax;
        let (open, close) = match kind {
            TagKind::Expr => &syntax.expression,
            TagKind::Block => &syntax.block,
            TagKind::Comment => &syntax.comment,
        };
        (open.as_str(), close.as_str())
    }

    /// The longest opening delimiter starting at byte `at`.
    fn opener_at(&self, at: usize) -> Option<TagKind> {
        let rest = &self.text[at..];
        [TagKind::Expr, TagKind::Block, TagKind::Comment]
            .into_iter()
            .map(|kind| (kind, self.delimiters(kind).0))
            .filter(|(_, open)| !open.is_empty() && rest.starts_with(open))
            .max_by_key(|(_, open)| open.len())
            .map(|(kind, _)| kind)
    }

    /// Consume text up to the next opener and return the opener's kind.
    fn lex_text(&mut self) -> Option<TagKind> {
        let start = self.pos;
        let mut at = self.pos;
        let mut buf = String::new();
        let mut found = None;

        while at < self.text.len() {
            let rest = &self.text[at..];
            if rest.starts_with('\\') {
                if let Some(kind) = self.opener_at(at + 1) {
                    let open = self.delimiters(kind).0;
                    buf.push_str(open);
                    at += 1 + open.len();
                    continue;
                }
            }
            if let Some(kind) = self.opener_at(at) {
                found = Some(kind);
                break;
            }
            let Some(c) = rest.chars().next() else {
                break;
            };
            buf.push(c);
            at += c.len_utf8();
        }
        self.pos = at;

        if std::mem::take(&mut self.trim_next) {
            buf = buf.trim_start().to_string();
        }
        if let Some(kind) = found {
            let open = self.delimiters(kind).0;
            if self.text[at + open.len()..].starts_with('-') {
                buf.truncate(buf.trim_end().len());
            }
        }
        if !buf.is_empty() {
            let span = self.source.span(start, at);
            self.tokens.push(Token::new(TokenKind::Text, buf, span));
        }
        found
    }

    fn lex_tag(&mut self, kind: TagKind) -> Result<()> {
        let (open, close) = self.delimiters(kind);
        let start = self.pos;
        self.pos += open.len();
        if self.rest().starts_with('-') {
            self.pos += 1;
        }
        let opener = self.source.span(start, self.pos);

        let close_kind = match kind {
            TagKind::Comment => return self.skip_comment(close, opener),
            TagKind::Expr => {
                self.tokens.push(Token::new(TokenKind::ExprOpen, open, opener));
                TokenKind::ExprClose
            }
            TagKind::Block => {
                self.tokens.push(Token::new(TokenKind::BlockOpen, open, opener));
                TokenKind::BlockClose
            }
        };

        loop {
            self.skip_whitespace();
            if self.pos >= self.text.len() {
                return Err(self.unterminated(opener));
            }
            let rest = self.rest();
            let trimmed = rest.strip_prefix('-').is_some_and(|r| r.starts_with(close));
            if trimmed || rest.starts_with(close) {
                let begin = self.pos;
                self.pos += close.len() + usize::from(trimmed);
                self.trim_next = trimmed;
                let span = self.source.span(begin, self.pos);
                self.tokens.push(Token::new(close_kind, close, span));
                return Ok(());
            }
            self.lex_token(opener)?;
        }
    }

    fn skip_comment(&mut self, close: &str, opener: Span) -> Result<()> {
        let Some(found) = self.rest().find(close) else {
            return Err(self.unterminated(opener));
        };
        let end = self.pos + found;
        self.trim_next = end > self.pos && self.text[..end].ends_with('-');
        self.pos = end + close.len();
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn lex_token(&mut self, opener: Span) -> Result<()> {
        let start = self.pos;
        let rest = self.rest();
        let Some(c) = rest.chars().next() else {
            return Err(self.unterminated(opener));
        };
        match c {
            '"' | '\'' => self.lex_string(c, opener),
            '0'..='9' => {
                self.lex_number();
                Ok(())
            }
            c if c.is_alphabetic() || c == '_' => {
                self.lex_word();
                Ok(())
            }
            c => match symbol(rest) {
                Some((kind, width)) => {
                    self.push_source(kind, start, start + width);
                    Ok(())
                }
                None => Err(Error::new(
                    ParseError::UnexpectedToken,
                    format!("unexpected character `{c}`"),
                )
                .at(self.source.span(start, start + c.len_utf8()), self.source)),
            },
        }
    }

    fn lex_string(&mut self, quote: char, opener: Span) -> Result<()> {
        let start = self.pos;
        let mut value = String::new();
        let mut chars = self.text[start + 1..].char_indices();

        while let Some((i, c)) = chars.next() {
            let at = start + 1 + i;
            match c {
                c if c == quote => {
                    self.pos = at + 1;
                    let span = self.source.span(start, self.pos);
                    self.tokens.push(Token::new(TokenKind::Str, value, span));
                    return Ok(());
                }
                '\\' => {
                    let decoded = match chars.next() {
                        Some((_, '\\')) => '\\',
                        Some((_, '"')) => '"',
                        Some((_, '\'')) => '\'',
                        Some((_, 'n')) => '\n',
                        Some((_, 't')) => '\t',
                        Some((_, 'r')) => '\r',
                        Some((_, '0')) => '\0',
                        Some((_, other)) => {
                            let span = self.source.span(at, at + 1 + other.len_utf8());
                            return Err(Error::new(
                                LexError::InvalidEscape,
                                format!("unknown escape `\\{other}`"),
                            )
                            .at(span, self.source));
                        }
                        None => break,
                    };
                    value.push(decoded);
                }
                c => value.push(c),
            }
        }
        Err(self.unterminated(opener))
    }

    fn lex_number(&mut self) {
        let start = self.pos;
        let bytes = self.text.as_bytes();
        let digits = |mut at: usize| {
            while at < bytes.len() && bytes[at].is_ascii_digit() {
                at += 1;
            }
            at
        };
        let mut end = digits(start);
        if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
            end = digits(end + 1);
        }
        self.push_source(TokenKind::Number, start, end);
    }

    fn lex_word(&mut self) {
        let start = self.pos;
        let end = self
            .rest()
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map_or(self.text.len(), |(i, _)| start + i);
        let word = &self.text[start..end];
        let kind = match word {
            "true" | "false" => TokenKind::Bool,
            "null" | "none" => TokenKind::Null,
            "and" => TokenKind::Op(Operator::And),
            "or" => TokenKind::Op(Operator::Or),
            "not" => TokenKind::Op(Operator::Not),
            _ => Keyword::from_ident(word).map_or(TokenKind::Ident, TokenKind::Keyword),
        };
        self.push_source(kind, start, end);
    }

    fn push_source(&mut self, kind: TokenKind, start: usize, end: usize) {
        let span = self.source.span(start, end);
        self.tokens
            .push(Token::new(kind, &self.text[start..end], span));
        self.pos = end;
    }

    fn unterminated(&self, opener: Span) -> Error {
        Error::new(LexError::UnterminatedTag, "end of input inside a tag").at(opener, self.source)
    }
}

fn symbol(rest: &str) -> Option<(TokenKind, usize)> {
    use Operator::*;
    const PAIRS: [(&str, Operator); 6] = [
        ("==", Eq),
        ("!=", Ne),
        ("<=", Le),
        (">=", Ge),
        ("&&", And),
        ("||", Or),
    ];
    if let Some((_, op)) = PAIRS.iter().find(|(text, _)| rest.starts_with(text)) {
        return Some((TokenKind::Op(*op), 2));
    }
    let kind = match rest.chars().next()? {
        '+' => TokenKind::Op(Plus),
        '-' => TokenKind::Op(Minus),
        '*' => TokenKind::Op(Star),
        '/' => TokenKind::Op(Slash),
        '%' => TokenKind::Op(Percent),
        '<' => TokenKind::Op(Lt),
        '>' => TokenKind::Op(Gt),
        '!' => TokenKind::Op(Not),
        '|' => TokenKind::Pipe,
        ',' => TokenKind::Comma,
        ':' => TokenKind::Colon,
        '.' => TokenKind::Dot,
        '=' => TokenKind::Assign,
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        '[' => TokenKind::LBracket,
        ']' => TokenKind::RBracket,
        _ => return None,
    };
    Some((kind, 1))
}
