use crate::tpl::ast::PathSegment;
use crate::value::{Mapping, Value, ValueError, to_value};
use serde::Serialize;

/// Variables supplied by the caller. A render never modifies them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    vars: Mapping,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn vars(&self) -> &Mapping {
        &self.vars
    }

    /// Build a context from a struct or map; its fields become the root variables.
    pub fn from_serialize<T: Serialize + ?Sized>(data: &T) -> Result<Self, ValueError> {
        Self::from_value(to_value(data)?)
    }

    pub fn from_value(value: Value) -> Result<Self, ValueError> {
        match value {
            Value::Mapping(vars) => Ok(Self { vars }),
            other => Err(ValueError::NotAMapping(other.type_name())),
        }
    }
}

impl From<Mapping> for Context {
    fn from(vars: Mapping) -> Self {
        Self { vars }
    }
}

/// The frame stack of one render: local frames over the caller's context.
pub(crate) struct Scope<'a> {
    root: Option<&'a Context>,
    frames: Vec<Mapping>,
}

impl<'a> Scope<'a> {
    pub fn new(root: &'a Context) -> Self {
        Self {
            root: Some(root),
            frames: vec![Mapping::new()],
        }
    }

    /// A scope that sees `vars` and nothing else.
    pub fn isolated(vars: Mapping) -> Self {
        Self {
            root: None,
            frames: vec![vars],
        }
    }

    pub fn push(&mut self, frame: Mapping) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Bind `name` in the innermost frame.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .or_else(|| self.root?.get(name))
    }

    /// Look up `path[0]` and follow the remaining segments.
    pub fn resolve(&self, path: &[PathSegment]) -> Option<&Value> {
        let (PathSegment::Key(name), rest) = path.split_first()? else {
            return None;
        };
        resolve_path(self.lookup(name)?, rest)
    }
}

fn resolve_path<'v>(mut current: &'v Value, path: &[PathSegment]) -> Option<&'v Value> {
    for segment in path {
        current = match (current, segment) {
            (Value::Mapping(map), PathSegment::Key(key)) => map.get(key)?,
            (Value::Sequence(items), PathSegment::Index(index)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> PathSegment {
        PathSegment::Key(name.to_string())
    }

    #[test]
    fn test_lookup_simple() {
        let ctx = Context::new().with("a", 1);
        let scope = Scope::new(&ctx);

        assert_eq!(scope.lookup("a"), Some(&Value::from(1)));
        assert_eq!(scope.lookup("b"), None);
    }

    #[test]
    fn test_isolated_scope_ignores_context() {
        let vars: Mapping = [("a".to_string(), Value::from(2))].into_iter().collect();
        let mut scope = Scope::isolated(vars);

        assert_eq!(scope.lookup("a"), Some(&Value::from(2)));
        assert_eq!(scope.lookup("b"), None);
        scope.set("b", Value::from(3));
        assert_eq!(scope.lookup("b"), Some(&Value::from(3)));
    }

    #[test]
    fn test_lookup_nested() {
        let user: Value = [("tags", Value::from(vec!["x", "y"]))].into_iter().collect();
        let ctx = Context::new().with("user", user);
        let scope = Scope::new(&ctx);

        let path = [key("user"), key("tags"), PathSegment::Index(1)];
        assert_eq!(scope.resolve(&path), Some(&Value::from("y")));
        assert_eq!(scope.resolve(&[key("user"), key("missing")]), None);
        assert_eq!(scope.resolve(&[key("user"), PathSegment::Index(0)]), None);
    }

    #[test]
    fn test_lookup_frames_shadowing() {
        let ctx = Context::new().with("a", 1);
        let mut scope = Scope::new(&ctx);

        let mut frame = Mapping::new();
        frame.insert("a".to_string(), Value::from(2));
        scope.push(frame);
        assert_eq!(scope.lookup("a"), Some(&Value::from(2)));

        scope.set("b", Value::from(3));
        assert_eq!(scope.lookup("b"), Some(&Value::from(3)));

        scope.pop();
        assert_eq!(scope.lookup("a"), Some(&Value::from(1)));
        assert_eq!(scope.lookup("b"), None);
        assert_eq!(ctx.get("b"), None);
    }

    #[derive(Serialize)]
    struct Page {
        title: &'static str,
        items: Vec<u32>,
    }

    #[test]
    fn test_from_serialize() {
        let ctx = Context::from_serialize(&Page {
            title: "Home",
            items: vec![1, 2],
        })
        .unwrap();
        assert_eq!(ctx.get("title"), Some(&Value::from("Home")));
        assert_eq!(ctx.get("items"), Some(&Value::from(vec![1, 2])));

        assert_eq!(
            Context::from_serialize(&vec![1]),
            Err(ValueError::NotAMapping("sequence"))
        );
    }
}
