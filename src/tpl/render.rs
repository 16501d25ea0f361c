use crate::config::{Options, UndefinedVariable};
use crate::diagnostic::{Source, Span};
use crate::error::{Error, ErrorKind, InheritanceError, RenderError, Result};
use crate::filter::FilterRegistry;
use crate::tpl::ast::{BinaryOp, Expr, Node, UnaryOp};
use crate::tpl::render_context::{Context, Scope};
use crate::tpl::resolver::ResolvedTemplate;
use crate::value::{Mapping, OpError, Value, binary};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Render a resolved template. The first error aborts the render.
pub fn render(
    template: &ResolvedTemplate,
    context: &Context,
    filters: &FilterRegistry,
    options: &Options,
) -> Result<String> {
    let start = Instant::now();
    let mut renderer = Renderer {
        filters,
        options,
        scope: Scope::new(context),
        origin: template.source(),
        depth: 0,
    };
    let mut out = String::with_capacity(template.source().text().len());
    renderer.render_nodes(template.nodes(), &mut out)?;
    debug!(
        template = template.name(),
        bytes = out.len(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "rendered template"
    );
    Ok(out)
}

struct Renderer<'a> {
    filters: &'a FilterRegistry,
    options: &'a Options,
    scope: Scope<'a>,
    /// Template the nodes being rendered were written in.
    origin: &'a Arc<Source>,
    /// Nesting of constructs and includes.
    depth: usize,
}

impl<'a> Renderer<'a> {
    fn render_nodes(&mut self, nodes: &'a [Node], out: &mut String) -> Result<()> {
        nodes.iter().try_for_each(|node| self.render_node(node, out))
    }

    fn render_node(&mut self, node: &'a Node, out: &mut String) -> Result<()> {
        match node {
            Node::Text { text, .. } => {
                out.push_str(text);
                Ok(())
            }
            Node::Output { expr, .. } => {
                match self.eval(expr)? {
                    Value::Safe(text) => out.push_str(&text),
                    value => out.push_str(&self.options.escape_mode.escape(&value.to_string())),
                }
                Ok(())
            }
            Node::If {
                branches,
                else_body,
                span,
            } => {
                for (condition, body) in branches {
                    if self.eval(condition)?.is_truthy() {
                        return self.nested(*span, body, out);
                    }
                }
                match else_body {
                    Some(body) => self.nested(*span, body, out),
                    None => Ok(()),
                }
            }
            Node::For {
                bindings,
                iterable,
                body,
                empty_body,
                span,
            } => self.render_for(bindings, iterable, body, empty_body.as_deref(), *span, out),
            Node::Let { name, value, .. } => {
                let value = self.eval(value)?;
                self.scope.set(name, value);
                Ok(())
            }
            Node::Block {
                body, span, origin, ..
            } => self.in_origin(origin, |renderer| renderer.nested(*span, body, out)),
            // Merged away by the resolver.
            Node::Extends { .. } => Ok(()),
            Node::Include {
                name,
                args,
                span,
                target,
            } => {
                let Some(included) = target else {
                    return Err(self.error(
                        InheritanceError::MissingParent,
                        format!("include `{name}` was not resolved"),
                        *span,
                    ));
                };
                if args.is_empty() {
                    return self.in_origin(&included.source, |renderer| {
                        renderer.nested(*span, &included.nodes, out)
                    });
                }
                let mut vars = Mapping::new();
                for (key, value) in args {
                    vars.insert(key.clone(), self.eval(value)?);
                }
                let saved = std::mem::replace(&mut self.scope, Scope::isolated(vars));
                let rendered = self.in_origin(&included.source, |renderer| {
                    renderer.nested(*span, &included.nodes, out)
                });
                self.scope = saved;
                rendered
            }
        }
    }

    fn render_for(
        &mut self,
        bindings: &'a [String],
        iterable: &'a Expr,
        body: &'a [Node],
        empty_body: Option<&'a [Node]>,
        span: Span,
        out: &mut String,
    ) -> Result<()> {
        let items: Vec<(Value, Value)> = match self.eval(iterable)? {
            Value::Sequence(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect(),
            Value::Mapping(map) => map
                .into_iter()
                .map(|(key, value)| (Value::from(key), value))
                .collect(),
            Value::String(s) | Value::Safe(s) => s
                .chars()
                .enumerate()
                .map(|(i, c)| (Value::from(i), Value::from(c)))
                .collect(),
            other => {
                return Err(self
                    .error(
                        RenderError::NotIterable,
                        format!("cannot iterate over {}", other.type_name()),
                        iterable.span(),
                    )
                    .with_help("`for` walks sequences, mappings and strings"));
            }
        };

        if items.is_empty() {
            return match empty_body {
                Some(nodes) => self.nested(span, nodes, out),
                None => Ok(()),
            };
        }

        let length = items.len();
        for (index, (key, item)) in items.into_iter().enumerate() {
            let mut frame = Mapping::new();
            match bindings {
                [single] => {
                    frame.insert(single.clone(), item);
                }
                [first, second, ..] => {
                    frame.insert(first.clone(), key);
                    frame.insert(second.clone(), item);
                }
                [] => {}
            }
            frame.insert("loop".to_string(), loop_info(index, length));

            self.scope.push(frame);
            let rendered = self.nested(span, body, out);
            self.scope.pop();
            rendered?;
        }
        Ok(())
    }

    /// Render `nodes` one construct deeper.
    fn nested(&mut self, span: Span, nodes: &'a [Node], out: &mut String) -> Result<()> {
        if self.depth >= self.options.max_recursion_depth {
            return Err(self.error(
                RenderError::MaxDepthExceeded,
                format!("render nested deeper than {}", self.options.max_recursion_depth),
                span,
            ));
        }
        self.depth += 1;
        let rendered = self.render_nodes(nodes, out);
        self.depth -= 1;
        rendered
    }

    fn in_origin<F>(&mut self, origin: &'a Arc<Source>, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let saved = std::mem::replace(&mut self.origin, origin);
        let rendered = f(self);
        self.origin = saved;
        rendered
    }

    fn eval(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal { value, .. } => Ok(value.clone()),
            Expr::Variable { path, span } => match self.scope.resolve(path) {
                Some(value) => Ok(value.clone()),
                None => match self.options.undefined_variable {
                    UndefinedVariable::Lenient => Ok(Value::Null),
                    UndefinedVariable::Strict => Err(self
                        .error(
                            RenderError::UndefinedVariable,
                            format!("`{expr}` is not defined"),
                            *span,
                        )
                        .with_help(
                            "add it to the context, or render with `UndefinedVariable::Lenient`",
                        )),
                },
            },
            Expr::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
                ..
            } => {
                let left = self.eval(left)?.is_truthy();
                let decided = match op {
                    BinaryOp::And => !left,
                    _ => left,
                };
                if decided {
                    return Ok(Value::Bool(left));
                }
                Ok(Value::Bool(self.eval(right)?.is_truthy()))
            }
            Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right).map_err(|err| match err {
                    OpError::TypeMismatch(message) => self
                        .error(RenderError::TypeMismatch, message, *span)
                        .with_help(mismatch_help(*op, &left, &right)),
                    OpError::DivisionByZero => self.error(
                        RenderError::DivisionByZero,
                        format!("`{expr}` divides by zero"),
                        *span,
                    ),
                })
            }
            Expr::Unary { op, operand, span } => {
                let value = self.eval(operand)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Neg, Value::Number(n)) => Ok(Value::Number(-n)),
                    (UnaryOp::Neg, other) => Err(self
                        .error(
                            RenderError::TypeMismatch,
                            format!("cannot negate {}", other.type_name()),
                            *span,
                        )
                        .with_help("only numbers can be negated")),
                }
            }
            Expr::Filter {
                base,
                name,
                args,
                span,
            } => {
                let Some(filter) = self.filters.get(name) else {
                    return Err(self
                        .error(
                            RenderError::UnknownFilter,
                            format!("unknown filter `{name}`"),
                            *span,
                        )
                        .with_help(format!(
                            "register it with `Engine::add_filter(\"{name}\", ..)`"
                        )));
                };
                let input = self.eval(base)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                filter.apply(&input, &args).map_err(|err| {
                    self.error(
                        RenderError::FilterArgumentError,
                        format!("filter `{name}`: {err}"),
                        *span,
                    )
                })
            }
            Expr::List { items, .. } => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Sequence),
        }
    }

    fn error(&self, kind: impl Into<ErrorKind>, message: impl Into<String>, span: Span) -> Error {
        Error::new(kind, message).at(span, self.origin)
    }
}

fn mismatch_help(op: BinaryOp, left: &Value, right: &Value) -> String {
    let text = |v: &Value| matches!(v, Value::String(_) | Value::Safe(_));
    let number = |v: &Value| matches!(v, Value::Number(_));
    if op == BinaryOp::Add && ((text(left) && number(right)) || (number(left) && text(right))) {
        return "use quotes to make the number a string".to_string();
    }
    match op {
        BinaryOp::Add => "`+` adds numbers and joins strings or sequences".to_string(),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            format!("`{op}` orders two numbers or two strings")
        }
        _ => format!("`{op}` works on numbers only"),
    }
}

fn loop_info(index: usize, length: usize) -> Value {
    let mut info = Mapping::new();
    info.insert("index".to_string(), Value::from(index));
    info.insert("index1".to_string(), Value::from(index + 1));
    info.insert("is_first".to_string(), Value::from(index == 0));
    info.insert("is_last".to_string(), Value::from(index + 1 == length));
    info.insert("length".to_string(), Value::from(length));
    Value::Mapping(info)
}
