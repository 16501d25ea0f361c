use crate::config::Options;
use crate::diagnostic::{Source, Span};
use crate::error::{Error, ParseError, Result};
use crate::tpl::ast::{BinaryOp, Expr, Node, PathSegment, Template, UnaryOp};
use crate::tpl::token::{Keyword, Operator, Token, TokenKind};
use crate::value::Value;
use std::collections::HashSet;
use std::iter::Peekable;
use std::sync::Arc;
use std::vec::IntoIter;

/// An open construct waiting for its end keyword.
enum TagFrame {
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        /// Condition of the branch being collected; `None` once inside `else`.
        pending: Option<Expr>,
        span: Span,
    },
    For {
        bindings: Vec<String>,
        iterable: Expr,
        /// The loop body once `else` has been seen.
        body: Option<Vec<Node>>,
        span: Span,
    },
    Block {
        name: String,
        span: Span,
    },
}

impl TagFrame {
    fn keyword(&self) -> &'static str {
        match self {
            TagFrame::If { .. } => "if",
            TagFrame::For { .. } => "for",
            TagFrame::Block { .. } => "block",
        }
    }

    fn span(&self) -> Span {
        match self {
            TagFrame::If { span, .. } | TagFrame::For { span, .. } | TagFrame::Block { span, .. } => {
                *span
            }
        }
    }
}

const COMPARISON: [(Operator, BinaryOp); 6] = [
    (Operator::Eq, BinaryOp::Eq),
    (Operator::Ne, BinaryOp::Ne),
    (Operator::Lt, BinaryOp::Lt),
    (Operator::Le, BinaryOp::Le),
    (Operator::Gt, BinaryOp::Gt),
    (Operator::Ge, BinaryOp::Ge),
];
const ADDITIVE: [(Operator, BinaryOp); 2] =
    [(Operator::Plus, BinaryOp::Add), (Operator::Minus, BinaryOp::Sub)];
const MULTIPLICATIVE: [(Operator, BinaryOp); 3] = [
    (Operator::Star, BinaryOp::Mul),
    (Operator::Slash, BinaryOp::Div),
    (Operator::Percent, BinaryOp::Rem),
];

struct Parser {
    tokens: Peekable<IntoIter<Token>>,
    source: Arc<Source>,
    max_depth: usize,
    /// Current expression nesting.
    depth: usize,
    current: Vec<Node>,
    nodes_stack: Vec<Vec<Node>>,
    tag_stack: Vec<TagFrame>,
    block_names: HashSet<String>,
}

/// Build a [`Template`] from the tokens of `source`.
pub fn parse(tokens: Vec<Token>, source: Arc<Source>, options: &Options) -> Result<Template> {
    let parser = Parser {
        tokens: tokens.into_iter().peekable(),
        source,
        max_depth: options.max_recursion_depth,
        depth: 0,
        current: Vec::new(),
        nodes_stack: Vec::new(),
        tag_stack: Vec::new(),
        block_names: HashSet::new(),
    };
    parser.parse_template()
}

impl Parser {
    fn parse_template(mut self) -> Result<Template> {
        while let Some(token) = self.tokens.next() {
            match token.kind {
                TokenKind::Text => append_text(&mut self.current, token.lexeme, token.span),
                TokenKind::ExprOpen => {
                    let expr = self.parse_expr()?;
                    let close = self.expect(TokenKind::ExprClose, "end of expression")?;
                    self.current.push(Node::Output {
                        expr,
                        span: token.span.to(close.span),
                    });
                }
                TokenKind::BlockOpen => self.parse_statement(token.span)?,
                _ => return Err(self.unexpected(&token, "text or a tag")),
            }
        }

        if let Some(frame) = self.tag_stack.last() {
            return Err(Error::new(
                ParseError::UnclosedBlock,
                format!("`{}` is never closed", frame.keyword()),
            )
            .at(frame.span(), &self.source));
        }
        Ok(Template::new(self.source, self.current))
    }

    fn parse_statement(&mut self, open: Span) -> Result<()> {
        let Some(token) = self.tokens.next() else {
            return Err(self.eof("a statement"));
        };
        let keyword = match token.kind {
            TokenKind::Keyword(keyword) => keyword,
            TokenKind::Ident => {
                return Err(Error::new(
                    ParseError::UnknownKeyword,
                    format!("unknown keyword `{}`", token.lexeme),
                )
                .at(token.span, &self.source));
            }
            _ => return Err(self.unexpected(&token, "a keyword")),
        };

        match keyword {
            Keyword::If => {
                let condition = self.parse_expr()?;
                self.close_tag()?;
                self.open(TagFrame::If {
                    branches: Vec::new(),
                    pending: Some(condition),
                    span: open,
                })
            }
            Keyword::Elif => {
                let condition = self.parse_expr()?;
                let close = self.close_tag()?;
                self.elif(condition, open.to(close))
            }
            Keyword::Else => {
                let close = self.close_tag()?;
                self.else_branch(open.to(close))
            }
            Keyword::EndIf => {
                let close = self.close_tag()?;
                self.end_if(open.to(close))
            }
            Keyword::For => {
                let mut bindings = vec![self.expect(TokenKind::Ident, "a loop variable")?.lexeme];
                if self.eat(TokenKind::Comma).is_some() {
                    bindings.push(self.expect(TokenKind::Ident, "a loop variable")?.lexeme);
                }
                self.expect(TokenKind::Keyword(Keyword::In), "`in`")?;
                let iterable = self.parse_expr()?;
                self.close_tag()?;
                self.open(TagFrame::For {
                    bindings,
                    iterable,
                    body: None,
                    span: open,
                })
            }
            Keyword::EndFor => {
                let close = self.close_tag()?;
                self.end_for(open.to(close))
            }
            Keyword::Let => {
                let name = self.expect(TokenKind::Ident, "a variable name")?.lexeme;
                self.expect(TokenKind::Assign, "`=`")?;
                let value = self.parse_expr()?;
                let close = self.close_tag()?;
                self.current.push(Node::Let {
                    name,
                    value,
                    span: open.to(close),
                });
                Ok(())
            }
            Keyword::Block => {
                let name = self.expect(TokenKind::Ident, "a block name")?;
                if !self.block_names.insert(name.lexeme.clone()) {
                    return Err(Error::new(
                        ParseError::DuplicateBlockName,
                        format!("block `{}` is defined more than once", name.lexeme),
                    )
                    .at(name.span, &self.source));
                }
                self.close_tag()?;
                self.open(TagFrame::Block {
                    name: name.lexeme,
                    span: open,
                })
            }
            Keyword::EndBlock => {
                let name = self.eat(TokenKind::Ident).map(|t| t.lexeme);
                let close = self.close_tag()?;
                self.end_block(name, open.to(close))
            }
            Keyword::Extends => {
                let parent = self.expect(TokenKind::Str, "a template name")?.lexeme;
                let close = self.close_tag()?;
                let span = open.to(close);
                let first = self.tag_stack.is_empty()
                    && self.current.iter().all(
                        |node| matches!(node, Node::Text { text, .. } if text.trim().is_empty()),
                    );
                if !first {
                    return Err(Error::new(
                        ParseError::ExtendsNotFirst,
                        "`extends` must be the first tag in the template",
                    )
                    .at(span, &self.source));
                }
                self.current.clear();
                self.current.push(Node::Extends { parent, span });
                Ok(())
            }
            Keyword::Include => {
                let name = self.expect(TokenKind::Str, "a template name")?.lexeme;
                let mut args = Vec::new();
                while self.peek_kind() == Some(TokenKind::Ident) {
                    let key = self.next_token("an argument name")?.lexeme;
                    self.expect(TokenKind::Colon, "`:`")?;
                    args.push((key, self.parse_expr()?));
                    if self.eat(TokenKind::Comma).is_none() {
                        break;
                    }
                }
                let close = self.close_tag()?;
                self.current.push(Node::Include {
                    name,
                    args,
                    span: open.to(close),
                    target: None,
                });
                Ok(())
            }
            Keyword::In => Err(self.unexpected(&token, "a keyword")),
        }
    }

    fn open(&mut self, frame: TagFrame) -> Result<()> {
        if self.tag_stack.len() >= self.max_depth {
            return Err(Error::new(
                ParseError::MaxDepthExceeded,
                format!("constructs nested deeper than {}", self.max_depth),
            )
            .at(frame.span(), &self.source));
        }
        self.tag_stack.push(frame);
        self.nodes_stack.push(std::mem::take(&mut self.current));
        Ok(())
    }

    /// Pop the innermost construct together with the body collected for it.
    fn pop_frame(&mut self) -> Option<(TagFrame, Vec<Node>)> {
        let frame = self.tag_stack.pop()?;
        let parent = self.nodes_stack.pop().unwrap_or_default();
        Some((frame, std::mem::replace(&mut self.current, parent)))
    }

    fn elif(&mut self, condition: Expr, span: Span) -> Result<()> {
        if let Some(TagFrame::If {
            branches, pending, ..
        }) = self.tag_stack.last_mut()
        {
            if let Some(previous) = pending.take() {
                branches.push((previous, std::mem::take(&mut self.current)));
                *pending = Some(condition);
                return Ok(());
            }
        }
        Err(Error::new(ParseError::UnmatchedEnd, "`elif` must follow `if` or `elif`")
            .at(span, &self.source))
    }

    fn else_branch(&mut self, span: Span) -> Result<()> {
        match self.tag_stack.last_mut() {
            Some(TagFrame::If {
                branches, pending, ..
            }) => {
                if let Some(condition) = pending.take() {
                    branches.push((condition, std::mem::take(&mut self.current)));
                    return Ok(());
                }
            }
            Some(TagFrame::For { body, .. }) if body.is_none() => {
                *body = Some(std::mem::take(&mut self.current));
                return Ok(());
            }
            _ => {}
        }
        Err(Error::new(ParseError::UnmatchedEnd, "`else` without an open `if` or `for`")
            .at(span, &self.source))
    }

    fn end_if(&mut self, end: Span) -> Result<()> {
        match self.pop_frame() {
            Some((
                TagFrame::If {
                    mut branches,
                    pending,
                    span,
                },
                collected,
            )) => {
                let else_body = match pending {
                    Some(condition) => {
                        branches.push((condition, collected));
                        None
                    }
                    None => Some(collected),
                };
                self.current.push(Node::If {
                    branches,
                    else_body,
                    span: span.to(end),
                });
                Ok(())
            }
            other => Err(self.mismatch("endif", "if", other, end)),
        }
    }

    fn end_for(&mut self, end: Span) -> Result<()> {
        match self.pop_frame() {
            Some((
                TagFrame::For {
                    bindings,
                    iterable,
                    body,
                    span,
                },
                collected,
            )) => {
                let (body, empty_body) = match body {
                    Some(body) => (body, Some(collected)),
                    None => (collected, None),
                };
                self.current.push(Node::For {
                    bindings,
                    iterable,
                    body,
                    empty_body,
                    span: span.to(end),
                });
                Ok(())
            }
            other => Err(self.mismatch("endfor", "for", other, end)),
        }
    }

    fn end_block(&mut self, end_name: Option<String>, end: Span) -> Result<()> {
        match self.pop_frame() {
            Some((TagFrame::Block { name, span }, body)) => {
                if let Some(end_name) = end_name.filter(|end_name| *end_name != name) {
                    return Err(Error::new(
                        ParseError::UnmatchedEnd,
                        format!("`endblock {end_name}` does not match `block {name}`"),
                    )
                    .at(end, &self.source));
                }
                self.current.push(Node::Block {
                    name,
                    body,
                    span: span.to(end),
                    origin: self.source.clone(),
                });
                Ok(())
            }
            other => Err(self.mismatch("endblock", "block", other, end)),
        }
    }

    fn mismatch(
        &self,
        end: &str,
        expected: &str,
        open: Option<(TagFrame, Vec<Node>)>,
        span: Span,
    ) -> Error {
        let message = match open {
            Some((frame, _)) => format!("`{end}` does not match open `{}`", frame.keyword()),
            None => format!("`{end}` without an open `{expected}`"),
        };
        Error::new(ParseError::UnmatchedEnd, message).at(span, &self.source)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.enter()?;
        let expr = self.parse_pipe();
        self.depth -= 1;
        expr
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            let span = self.peek_span();
            return Err(Error::new(
                ParseError::MaxDepthExceeded,
                format!("expression nested deeper than {}", self.max_depth),
            )
            .at(span, &self.source));
        }
        Ok(())
    }

    fn parse_pipe(&mut self) -> Result<Expr> {
        let mut expr = self.parse_binary(Self::parse_and, &[(Operator::Or, BinaryOp::Or)])?;
        while self.eat(TokenKind::Pipe).is_some() {
            let name = self.expect(TokenKind::Ident, "a filter name")?;
            let mut end = name.span;
            let mut args = Vec::new();
            if self.eat(TokenKind::LParen).is_some() {
                if self.peek_kind() != Some(TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                }
                end = self.expect(TokenKind::RParen, "`)`")?.span;
            }
            let span = expr.span().to(end);
            expr = Expr::Filter {
                base: Box::new(expr),
                name: name.lexeme,
                args,
                span,
            };
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        self.parse_binary(Self::parse_comparison, &[(Operator::And, BinaryOp::And)])
    }

    /// Comparisons do not chain: `a < b < c` is rejected.
    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        match self.peek_op(&COMPARISON) {
            Some(op) => {
                self.tokens.next();
                let right = self.parse_additive()?;
                Ok(binary(op, left, right))
            }
            None => Ok(left),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        self.parse_binary(Self::parse_multiplicative, &ADDITIVE)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        self.parse_binary(Self::parse_unary, &MULTIPLICATIVE)
    }

    /// Left-associative run of `ops` over operands parsed by `next`.
    fn parse_binary(
        &mut self,
        next: fn(&mut Self) -> Result<Expr>,
        ops: &[(Operator, BinaryOp)],
    ) -> Result<Expr> {
        let mut left = next(self)?;
        while let Some(op) = self.peek_op(ops) {
            self.tokens.next();
            let right = next(self)?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let op = match self.peek_kind() {
            Some(TokenKind::Op(Operator::Not)) => UnaryOp::Not,
            Some(TokenKind::Op(Operator::Minus)) => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        let start = self.peek_span();
        self.tokens.next();
        self.enter()?;
        let operand = self.parse_unary();
        self.depth -= 1;
        let operand = operand?;
        let span = start.to(operand.span());
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
            span,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let (mut path, mut span) = match self.parse_primary()? {
            Expr::Variable { path, span } => (path, span),
            other => return Ok(other),
        };
        loop {
            if self.eat(TokenKind::Dot).is_some() {
                let token = self.next_token("an attribute name")?;
                match token.kind {
                    TokenKind::Ident | TokenKind::Keyword(_) => {
                        path.push(PathSegment::Key(token.lexeme));
                        span = span.to(token.span);
                    }
                    _ => return Err(self.unexpected(&token, "an attribute name")),
                }
            } else if self.eat(TokenKind::LBracket).is_some() {
                let token = self.next_token("an index or key")?;
                let segment = match token.kind {
                    TokenKind::Str => PathSegment::Key(token.lexeme),
                    TokenKind::Number => match token.lexeme.parse::<usize>() {
                        Ok(index) => PathSegment::Index(index),
                        Err(_) => return Err(self.unexpected(&token, "an integer index")),
                    },
                    _ => return Err(self.unexpected(&token, "an index or key")),
                };
                path.push(segment);
                span = span.to(self.expect(TokenKind::RBracket, "`]`")?.span);
            } else {
                return Ok(Expr::Variable { path, span });
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let token = self.next_token("an expression")?;
        let span = token.span;
        let value = match token.kind {
            TokenKind::Number => match token.lexeme.parse::<f64>() {
                Ok(n) => Value::Number(n),
                Err(_) => return Err(self.unexpected(&token, "a number")),
            },
            TokenKind::Str => Value::String(token.lexeme),
            TokenKind::Bool => Value::Bool(token.lexeme == "true"),
            TokenKind::Null => Value::Null,
            TokenKind::Ident => {
                return Ok(Expr::Variable {
                    path: vec![PathSegment::Key(token.lexeme)],
                    span,
                });
            }
            TokenKind::LParen => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                return Ok(expr);
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                if self.peek_kind() != Some(TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                }
                let close = self.expect(TokenKind::RBracket, "`]`")?;
                return Ok(Expr::List {
                    items,
                    span: span.to(close.span),
                });
            }
            _ => return Err(self.unexpected(&token, "an expression")),
        };
        Ok(Expr::Literal { value, span })
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.tokens.peek().map(|t| t.kind)
    }

    fn peek_span(&mut self) -> Span {
        match self.tokens.peek() {
            Some(token) => token.span,
            None => self.end_span(),
        }
    }

    fn peek_op(&mut self, ops: &[(Operator, BinaryOp)]) -> Option<BinaryOp> {
        let TokenKind::Op(found) = self.peek_kind()? else {
            return None;
        };
        ops.iter()
            .find(|(op, _)| *op == found)
            .map(|(_, binary)| *binary)
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        self.tokens.next_if(|t| t.kind == kind)
    }

    fn next_token(&mut self, expected: &str) -> Result<Token> {
        self.tokens.next().ok_or_else(|| self.eof(expected))
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token> {
        let token = self.next_token(expected)?;
        if token.kind == kind {
            Ok(token)
        } else {
            Err(self.unexpected(&token, expected))
        }
    }

    fn close_tag(&mut self) -> Result<Span> {
        Ok(self.expect(TokenKind::BlockClose, "end of tag")?.span)
    }

    fn unexpected(&self, token: &Token, expected: &str) -> Error {
        let found = match token.kind {
            TokenKind::Text => "text".to_string(),
            TokenKind::Str => "string".to_string(),
            _ => format!("`{}`", token.lexeme),
        };
        Error::new(
            ParseError::UnexpectedToken,
            format!("expected {expected}, found {found}"),
        )
        .at(token.span, &self.source)
    }

    fn end_span(&self) -> Span {
        let len = self.source.text().len();
        self.source.span(len, len)
    }

    fn eof(&self, expected: &str) -> Error {
        Error::new(
            ParseError::UnexpectedToken,
            format!("expected {expected}, found end of input"),
        )
        .at(self.end_span(), &self.source)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let span = left.span().to(right.span());
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span,
    }
}

fn append_text(nodes: &mut Vec<Node>, text: String, span: Span) {
    if let Some(Node::Text {
        text: last_text,
        span: last_span,
    }) = nodes.last_mut()
    {
        last_text.push_str(&text);
        *last_span = last_span.to(span);
    } else {
        nodes.push(Node::Text { text, span });
    }
}
