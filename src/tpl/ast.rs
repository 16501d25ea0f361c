use crate::diagnostic::{Source, Span};
use crate::value::{Value, format_number, quote};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Value,
        span: Span,
    },
    /// The first segment is always a `Key` naming a scope variable.
    Variable {
        path: Vec<PathSegment>,
        span: Span,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    /// `base | name(args...)`; `base` is the filter's first input.
    Filter {
        base: Box<Expr>,
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
    List {
        items: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal { span, .. }
            | Expr::Variable { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Filter { span, .. }
            | Expr::List { span, .. } => *span,
        }
    }
}

impl Expr {
    /// Equality that ignores spans.
    pub fn same_shape(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Literal { value: a, .. }, Expr::Literal { value: b, .. }) => a == b,
            (Expr::Variable { path: a, .. }, Expr::Variable { path: b, .. }) => a == b,
            (
                Expr::Binary {
                    op: a,
                    left: la,
                    right: ra,
                    ..
                },
                Expr::Binary {
                    op: b,
                    left: lb,
                    right: rb,
                    ..
                },
            ) => a == b && la.same_shape(lb) && ra.same_shape(rb),
            (
                Expr::Unary {
                    op: a, operand: x, ..
                },
                Expr::Unary {
                    op: b, operand: y, ..
                },
            ) => a == b && x.same_shape(y),
            (
                Expr::Filter {
                    base: x,
                    name: a,
                    args: xs,
                    ..
                },
                Expr::Filter {
                    base: y,
                    name: b,
                    args: ys,
                    ..
                },
            ) => a == b && x.same_shape(y) && all_same(xs, ys, Expr::same_shape),
            (Expr::List { items: xs, .. }, Expr::List { items: ys, .. }) => {
                all_same(xs, ys, Expr::same_shape)
            }
            _ => false,
        }
    }
}

fn all_same<T>(a: &[T], b: &[T], same: impl Fn(&T, &T) -> bool) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same(x, y))
}

fn same_body(a: &Option<Vec<Node>>, b: &Option<Vec<Node>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => all_same(a, b, Node::same_shape),
        (None, None) => true,
        _ => false,
    }
}

/// A template merged into its includer at resolve time.
#[derive(Debug, Clone, PartialEq)]
pub struct Included {
    pub source: Arc<Source>,
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text {
        text: String,
        span: Span,
    },
    Output {
        expr: Expr,
        span: Span,
    },
    If {
        /// `(condition, body)`: the `if` followed by every `elif`.
        branches: Vec<(Expr, Vec<Node>)>,
        else_body: Option<Vec<Node>>,
        span: Span,
    },
    For {
        bindings: Vec<String>,
        iterable: Expr,
        body: Vec<Node>,
        empty_body: Option<Vec<Node>>,
        span: Span,
    },
    Let {
        name: String,
        value: Expr,
        span: Span,
    },
    Block {
        name: String,
        body: Vec<Node>,
        span: Span,
        /// The template this block was written in.
        origin: Arc<Source>,
    },
    Extends {
        parent: String,
        span: Span,
    },
    Include {
        name: String,
        /// `key: expr` pairs. When present the target sees only these.
        args: Vec<(String, Expr)>,
        span: Span,
        /// Filled in by the resolver.
        target: Option<Arc<Included>>,
    },
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Text { span, .. }
            | Node::Output { span, .. }
            | Node::If { span, .. }
            | Node::For { span, .. }
            | Node::Let { span, .. }
            | Node::Block { span, .. }
            | Node::Extends { span, .. }
            | Node::Include { span, .. } => *span,
        }
    }
}

impl Node {
    /// Equality that ignores spans, block origins and include targets.
    pub fn same_shape(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::Text { text: a, .. }, Node::Text { text: b, .. }) => a == b,
            (Node::Output { expr: a, .. }, Node::Output { expr: b, .. }) => a.same_shape(b),
            (
                Node::If {
                    branches: a,
                    else_body: ea,
                    ..
                },
                Node::If {
                    branches: b,
                    else_body: eb,
                    ..
                },
            ) => {
                all_same(a, b, |(ca, ba), (cb, bb)| {
                    ca.same_shape(cb) && all_same(ba, bb, Node::same_shape)
                }) && same_body(ea, eb)
            }
            (
                Node::For {
                    bindings: a,
                    iterable: ia,
                    body: ba,
                    empty_body: ea,
                    ..
                },
                Node::For {
                    bindings: b,
                    iterable: ib,
                    body: bb,
                    empty_body: eb,
                    ..
                },
            ) => {
                a == b
                    && ia.same_shape(ib)
                    && all_same(ba, bb, Node::same_shape)
                    && same_body(ea, eb)
            }
            (
                Node::Let {
                    name: a, value: x, ..
                },
                Node::Let {
                    name: b, value: y, ..
                },
            ) => a == b && x.same_shape(y),
            (
                Node::Block {
                    name: a, body: ba, ..
                },
                Node::Block {
                    name: b, body: bb, ..
                },
            ) => a == b && all_same(ba, bb, Node::same_shape),
            (Node::Extends { parent: a, .. }, Node::Extends { parent: b, .. }) => a == b,
            (
                Node::Include {
                    name: a, args: xa, ..
                },
                Node::Include {
                    name: b, args: xb, ..
                },
            ) => {
                a == b
                    && all_same(xa, xb, |(ka, va), (kb, vb)| ka == kb && va.same_shape(vb))
            }
            _ => false,
        }
    }
}

/// A compiled, not yet resolved template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: String,
    source: Arc<Source>,
    nodes: Vec<Node>,
    extends: Option<String>,
}

impl Template {
    pub(crate) fn new(source: Arc<Source>, nodes: Vec<Node>) -> Self {
        let extends = nodes.iter().find_map(|node| match node {
            Node::Extends { parent, .. } => Some(parent.clone()),
            _ => None,
        });
        Self {
            name: source.name().to_string(),
            source,
            nodes,
            extends,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Arc<Source> {
        &self.source
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Name of the parent template, if this template extends one.
    pub fn extends(&self) -> Option<&str> {
        self.extends.as_deref()
    }

    /// Same node tree as `other`, ignoring where the nodes were written.
    pub fn same_tree(&self, other: &Template) -> bool {
        all_same(&self.nodes, &other.nodes, Node::same_shape)
    }
}

/// Canonical source text: reparsing it yields the same tree.
impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_nodes(f, &self.nodes)
    }
}

const RESERVED: [&str; 7] = ["true", "false", "null", "none", "and", "or", "not"];

fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    starts_ok
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && !RESERVED.contains(&key)
}

fn write_nodes(f: &mut fmt::Formatter<'_>, nodes: &[Node]) -> fmt::Result {
    nodes.iter().try_for_each(|node| write!(f, "{node}"))
}

/// Openers in text are escaped with `\`. Text ending in `\` or `{` would
/// join the next opener, so it is closed with an empty trimming comment.
fn write_text(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if ["{{", "{%", "{#"].iter().any(|open| rest.starts_with(open)) {
            f.write_str("\\")?;
            f.write_str(&rest[..2])?;
            rest = &rest[2..];
        } else {
            write!(f, "{c}")?;
            rest = &rest[c.len_utf8()..];
        }
    }
    if text.ends_with(['\\', '{']) {
        f.write_str(" {#- #}")?;
    }
    Ok(())
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Text { text, .. } => write_text(f, text),
            Node::Output { expr, .. } => write!(f, "{{{{ {expr} }}}}"),
            Node::If {
                branches,
                else_body,
                ..
            } => {
                for (i, (condition, body)) in branches.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { "elif" };
                    write!(f, "{{% {keyword} {condition} %}}")?;
                    write_nodes(f, body)?;
                }
                if let Some(body) = else_body {
                    f.write_str("{% else %}")?;
                    write_nodes(f, body)?;
                }
                f.write_str("{% endif %}")
            }
            Node::For {
                bindings,
                iterable,
                body,
                empty_body,
                ..
            } => {
                write!(f, "{{% for {} in {iterable} %}}", bindings.join(", "))?;
                write_nodes(f, body)?;
                if let Some(body) = empty_body {
                    f.write_str("{% else %}")?;
                    write_nodes(f, body)?;
                }
                f.write_str("{% endfor %}")
            }
            Node::Let { name, value, .. } => write!(f, "{{% let {name} = {value} %}}"),
            Node::Block { name, body, .. } => {
                write!(f, "{{% block {name} %}}")?;
                write_nodes(f, body)?;
                f.write_str("{% endblock %}")
            }
            Node::Extends { parent, .. } => write!(f, "{{% extends {} %}}", quote(parent)),
            Node::Include { name, args, .. } => {
                write!(f, "{{% include {}", quote(name))?;
                for (i, (key, value)) in args.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{sep}{key}: {value}")?;
                }
                f.write_str(" %}")
            }
        }
    }
}

/// Fully parenthesized so that precedence never depends on the printer.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal { value, .. } => match value {
                Value::Number(n) => format_number(*n, f),
                other => f.write_str(&other.repr()),
            },
            Expr::Variable { path, .. } => {
                for (i, segment) in path.iter().enumerate() {
                    match segment {
                        PathSegment::Key(key) if i == 0 => f.write_str(key)?,
                        PathSegment::Key(key) if is_plain_key(key) => write!(f, ".{key}")?,
                        PathSegment::Key(key) => write!(f, "[{}]", quote(key))?,
                        PathSegment::Index(index) => write!(f, "[{index}]")?,
                    }
                }
                Ok(())
            }
            Expr::Binary {
                op, left, right, ..
            } => write!(f, "({left} {op} {right})"),
            Expr::Unary { op, operand, .. } => match op {
                UnaryOp::Not => write!(f, "(not {operand})"),
                UnaryOp::Neg => write!(f, "(-{operand})"),
            },
            Expr::Filter {
                base, name, args, ..
            } => {
                write!(f, "({base} | {name}")?;
                if !args.is_empty() {
                    let args: Vec<String> = args.iter().map(ToString::to_string).collect();
                    write!(f, "({})", args.join(", "))?;
                }
                f.write_str(")")
            }
            Expr::List { items, .. } => {
                let items: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", items.join(", "))
            }
        }
    }
}
