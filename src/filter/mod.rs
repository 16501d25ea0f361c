//! Named value transformations applied with `expr | name(args...)`.

mod builtins;

use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A filter's rejection of its input or arguments.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct FilterError(pub String);

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub trait Filter: Send + Sync {
    /// `value` is the piped input; `args` are the parenthesized arguments.
    fn apply(&self, value: &Value, args: &[Value]) -> Result<Value, FilterError>;
}

impl<F> Filter for F
where
    F: Fn(&Value, &[Value]) -> Result<Value, FilterError> + Send + Sync,
{
    fn apply(&self, value: &Value, args: &[Value]) -> Result<Value, FilterError> {
        self(value, args)
    }
}

/// Filters by name. Passed explicitly to every render; there is no global registry.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the builtin filters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::register_all(&mut registry);
        registry
    }

    /// Register `filter` under `name`, replacing any filter already there.
    pub fn register(&mut self, name: impl Into<String>, filter: impl Filter + 'static) {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn with(mut self, name: impl Into<String>, filter: impl Filter + 'static) -> Self {
        self.register(name, filter);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Filter> {
        self.filters.get(name).map(|filter| filter.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

pub fn register_filter(
    registry: &mut FilterRegistry,
    name: impl Into<String>,
    filter: impl Filter + 'static,
) {
    registry.register(name, filter);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shout(value: &Value, _args: &[Value]) -> Result<Value, FilterError> {
        Ok(Value::from(format!("{value}!")))
    }

    struct Repeat;

    impl Filter for Repeat {
        fn apply(&self, value: &Value, args: &[Value]) -> Result<Value, FilterError> {
            let times = args
                .first()
                .and_then(Value::as_number)
                .ok_or_else(|| FilterError::new("expected a count"))?;
            Ok(Value::from(value.to_string().repeat(times as usize)))
        }
    }

    #[test]
    fn test_register_and_apply() {
        let mut registry = FilterRegistry::new().with("shout", shout);
        register_filter(&mut registry, "repeat", Repeat);

        assert!(registry.contains("shout"));
        assert_eq!(registry.names(), vec!["repeat", "shout"]);

        let shout = registry.get("shout").unwrap();
        assert_eq!(shout.apply(&Value::from("hi"), &[]), Ok(Value::from("hi!")));

        let repeat = registry.get("repeat").unwrap();
        assert_eq!(
            repeat.apply(&Value::from("ab"), &[Value::from(2)]),
            Ok(Value::from("abab"))
        );
        assert_eq!(
            repeat.apply(&Value::from("ab"), &[]),
            Err(FilterError::new("expected a count"))
        );
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = FilterRegistry::with_builtins();
        let before = registry.len();
        registry.register("upper", shout);
        assert_eq!(registry.len(), before);
        let upper = registry.get("upper").unwrap();
        assert_eq!(upper.apply(&Value::from("a"), &[]), Ok(Value::from("a!")));
    }

    #[test]
    fn test_builtins_present() {
        let registry = FilterRegistry::with_builtins();
        for name in [
            "safe", "escape", "upper", "lower", "capitalize", "trim", "length", "join", "first",
            "last", "reverse", "default", "replace", "abs", "round", "keys", "values",
        ] {
            assert!(registry.contains(name), "{name}");
        }
        assert!(FilterRegistry::new().is_empty());
    }
}
