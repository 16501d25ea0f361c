use crate::config::EscapeMode;
use crate::filter::{FilterError, FilterRegistry};
use crate::value::Value;

type FilterResult = Result<Value, FilterError>;

pub(crate) fn register_all(registry: &mut FilterRegistry) {
    registry.register("safe", safe);
    registry.register("escape", escape);
    registry.register("upper", upper);
    registry.register("lower", lower);
    registry.register("capitalize", capitalize);
    registry.register("trim", trim);
    registry.register("length", length);
    registry.register("join", join);
    registry.register("first", first);
    registry.register("last", last);
    registry.register("reverse", reverse);
    registry.register("default", default);
    registry.register("replace", replace);
    registry.register("abs", abs);
    registry.register("round", round);
    registry.register("keys", keys);
    registry.register("values", values);
}

fn arity(args: &[Value], min: usize, max: usize) -> Result<(), FilterError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = match (min, max) {
        (0, 0) => "no arguments".to_string(),
        (min, max) if min == max => format!("{min} argument{}", if min == 1 { "" } else { "s" }),
        (min, max) => format!("{min} to {max} arguments"),
    };
    Err(FilterError::new(format!(
        "expected {expected}, got {}",
        args.len()
    )))
}

/// Scalars as text; collections are rejected.
fn text(value: &Value) -> Result<String, FilterError> {
    match value {
        Value::Sequence(_) | Value::Mapping(_) => Err(FilterError::new(format!(
            "expected a string, got {}",
            value.type_name()
        ))),
        other => Ok(other.to_string()),
    }
}

/// Case and whitespace changes keep the safe mark of their input.
fn same_mark(input: &Value, text: String) -> Value {
    if input.is_safe() {
        Value::Safe(text)
    } else {
        Value::String(text)
    }
}

fn string_arg<'v>(args: &'v [Value], index: usize) -> Result<&'v str, FilterError> {
    match args.get(index) {
        Some(Value::String(s) | Value::Safe(s)) => Ok(s),
        Some(other) => Err(FilterError::new(format!(
            "argument {} must be a string, got {}",
            index + 1,
            other.type_name()
        ))),
        None => Err(FilterError::new(format!("missing argument {}", index + 1))),
    }
}

fn number(value: &Value) -> Result<f64, FilterError> {
    value
        .as_number()
        .ok_or_else(|| FilterError::new(format!("expected a number, got {}", value.type_name())))
}

fn safe(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    Ok(Value::Safe(value.to_string()))
}

/// Safe input is already escaped and passes through unchanged.
fn escape(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    if value.is_safe() {
        return Ok(value.clone());
    }
    Ok(Value::Safe(
        EscapeMode::Html.escape(&value.to_string()).into_owned(),
    ))
}

fn upper(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    Ok(same_mark(value, text(value)?.to_uppercase()))
}

fn lower(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    Ok(same_mark(value, text(value)?.to_lowercase()))
}

fn capitalize(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    let text = text(value)?;
    let mut chars = text.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    };
    Ok(same_mark(value, capitalized))
}

fn trim(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    Ok(same_mark(value, text(value)?.trim().to_string()))
}

fn length(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    let len = match value {
        Value::String(s) | Value::Safe(s) => s.chars().count(),
        Value::Sequence(items) => items.len(),
        Value::Mapping(map) => map.len(),
        other => {
            return Err(FilterError::new(format!(
                "{} has no length",
                other.type_name()
            )));
        }
    };
    Ok(Value::from(len))
}

fn join(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 1)?;
    let separator = if args.is_empty() { "" } else { string_arg(args, 0)? };
    let Value::Sequence(items) = value else {
        return Err(FilterError::new(format!(
            "expected a sequence, got {}",
            value.type_name()
        )));
    };
    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
    Ok(Value::from(parts.join(separator)))
}

fn first(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    match value {
        Value::Sequence(items) => Ok(items.first().cloned().unwrap_or_default()),
        Value::String(s) | Value::Safe(s) => {
            Ok(s.chars().next().map(Value::from).unwrap_or_default())
        }
        other => Err(FilterError::new(format!(
            "expected a sequence or string, got {}",
            other.type_name()
        ))),
    }
}

fn last(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    match value {
        Value::Sequence(items) => Ok(items.last().cloned().unwrap_or_default()),
        Value::String(s) | Value::Safe(s) => {
            Ok(s.chars().next_back().map(Value::from).unwrap_or_default())
        }
        other => Err(FilterError::new(format!(
            "expected a sequence or string, got {}",
            other.type_name()
        ))),
    }
}

fn reverse(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    match value {
        Value::Sequence(items) => Ok(Value::Sequence(items.iter().rev().cloned().collect())),
        Value::String(s) | Value::Safe(s) => Ok(Value::from(s.chars().rev().collect::<String>())),
        other => Err(FilterError::new(format!(
            "expected a sequence or string, got {}",
            other.type_name()
        ))),
    }
}

/// The fallback replaces `null` only; other falsy values pass through.
fn default(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 1, 1)?;
    Ok(match value {
        Value::Null => args[0].clone(),
        other => other.clone(),
    })
}

fn replace(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 2, 2)?;
    let from = string_arg(args, 0)?;
    let to = string_arg(args, 1)?;
    Ok(Value::from(text(value)?.replace(from, to)))
}

fn abs(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    Ok(Value::Number(number(value)?.abs()))
}

fn round(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 1)?;
    let n = number(value)?;
    let digits = match args.first() {
        Some(arg) => number(arg)?,
        None => 0.0,
    };
    if digits < 0.0 || digits.fract() != 0.0 {
        return Err(FilterError::new("digits must be a non-negative integer"));
    }
    let factor = 10f64.powi(digits.min(15.0) as i32);
    Ok(Value::Number((n * factor).round() / factor))
}

fn keys(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    match value {
        Value::Mapping(map) => Ok(Value::Sequence(map.keys().map(|k| Value::from(k.as_str())).collect())),
        other => Err(FilterError::new(format!(
            "expected a mapping, got {}",
            other.type_name()
        ))),
    }
}

fn values(value: &Value, args: &[Value]) -> FilterResult {
    arity(args, 0, 0)?;
    match value {
        Value::Mapping(map) => Ok(Value::Sequence(map.values().cloned().collect())),
        other => Err(FilterError::new(format!(
            "expected a mapping, got {}",
            other.type_name()
        ))),
    }
}
