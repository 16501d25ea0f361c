use crate::tpl::ast::BinaryOp;
use crate::value::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OpError {
    TypeMismatch(String),
    DivisionByZero,
}

/// Apply a non-short-circuiting binary operator.
///
/// `and`/`or` are handled by the renderer so that the right operand is only
/// evaluated when needed; here they fall back to truthiness. Safe text
/// takes part as a plain string and the result carries no safe mark.
pub(crate) fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, OpError> {
    use BinaryOp::*;
    let (left, right) = (left.unmarked(), right.unmarked());
    let (left, right) = (left.as_ref(), right.as_ref());
    match op {
        Add => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::Sequence(a), Value::Sequence(b)) => {
                Ok(Value::Sequence(a.iter().chain(b).cloned().collect()))
            }
            _ => Err(mismatch(op, left, right)),
        },
        Sub | Mul | Div | Rem => {
            let (Value::Number(a), Value::Number(b)) = (left, right) else {
                return Err(mismatch(op, left, right));
            };
            match op {
                Sub => Ok(Value::Number(a - b)),
                Mul => Ok(Value::Number(a * b)),
                Div | Rem if *b == 0.0 => Err(OpError::DivisionByZero),
                Div => Ok(Value::Number(a / b)),
                _ => Ok(Value::Number(a % b)),
            }
        }
        Eq => Ok(Value::Bool(left == right)),
        Ne => Ok(Value::Bool(left != right)),
        Lt | Le | Gt | Ge => {
            let ordering = compare(left, right).ok_or_else(|| mismatch(op, left, right))?;
            Ok(Value::Bool(match op {
                Lt => ordering == Ordering::Less,
                Le => ordering != Ordering::Greater,
                Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        And => Ok(Value::Bool(left.is_truthy() && right.is_truthy())),
        Or => Ok(Value::Bool(left.is_truthy() || right.is_truthy())),
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> OpError {
    OpError::TypeMismatch(format!(
        "cannot apply `{}` to {} and {}",
        op,
        left.type_name(),
        right.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let n = Value::from;
        assert_eq!(binary(BinaryOp::Add, &n(2), &n(3)), Ok(n(5)));
        assert_eq!(binary(BinaryOp::Sub, &n(2), &n(3)), Ok(n(-1)));
        assert_eq!(binary(BinaryOp::Mul, &n(2), &n(3)), Ok(n(6)));
        assert_eq!(binary(BinaryOp::Div, &n(3), &n(2)), Ok(Value::from(1.5)));
        assert_eq!(binary(BinaryOp::Rem, &n(7), &n(4)), Ok(n(3)));
    }

    #[test]
    fn test_division_by_zero() {
        let n = Value::from;
        assert_eq!(binary(BinaryOp::Div, &n(1), &n(0)), Err(OpError::DivisionByZero));
        assert_eq!(binary(BinaryOp::Rem, &n(1), &n(0)), Err(OpError::DivisionByZero));
    }

    #[test]
    fn test_concatenation() {
        assert_eq!(
            binary(BinaryOp::Add, &Value::from("ab"), &Value::from("cd")),
            Ok(Value::from("abcd"))
        );
        assert_eq!(
            binary(BinaryOp::Add, &Value::from(vec![1]), &Value::from(vec![2])),
            Ok(Value::from(vec![1, 2]))
        );
    }

    #[test]
    fn test_safe_text_compares_as_string() {
        let safe = Value::safe("<b>");
        assert_eq!(binary(BinaryOp::Eq, &safe, &Value::from("<b>")), Ok(Value::Bool(true)));
        assert_eq!(
            binary(BinaryOp::Add, &safe, &Value::from("!")),
            Ok(Value::from("<b>!"))
        );
    }

    #[test]
    fn test_type_mismatch() {
        match binary(BinaryOp::Add, &Value::from("a"), &Value::from(1)) {
            Err(OpError::TypeMismatch(msg)) => {
                assert_eq!(msg, "cannot apply `+` to string and number")
            }
            other => panic!("Expected TypeMismatch, got {:?}", other),
        }
        assert!(binary(BinaryOp::Lt, &Value::from("a"), &Value::from(1)).is_err());
    }

    #[test]
    fn test_comparison() {
        let n = Value::from;
        assert_eq!(binary(BinaryOp::Lt, &n(1), &n(2)), Ok(Value::Bool(true)));
        assert_eq!(binary(BinaryOp::Ge, &n(2), &n(2)), Ok(Value::Bool(true)));
        assert_eq!(
            binary(BinaryOp::Gt, &Value::from("b"), &Value::from("a")),
            Ok(Value::Bool(true))
        );
        assert_eq!(binary(BinaryOp::Eq, &n(1), &Value::from("1")), Ok(Value::Bool(false)));
        assert_eq!(binary(BinaryOp::Ne, &Value::Null, &Value::Null), Ok(Value::Bool(false)));
    }
}
