use std::cmp::Ordering;

use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueKind, ValueRepr};

pub enum CoerceResult<'a> {
    I128(i128, i128),
    F64(f64, f64),
    Str(&'a str, &'a str),
}

pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    Some(match value.0 {
        ValueRepr::Bool(x) => x as i64 as f64,
        ValueRepr::I64(x) => x as f64,
        ValueRepr::I128(x) => x.0 as f64,
        ValueRepr::F64(x) => x,
        _ => return None,
    })
}

pub fn coerce<'x>(a: &'x Value, b: &'x Value) -> Option<CoerceResult<'x>> {
    match (&a.0, &b.0) {
        // equal mappings are trivial
        (ValueRepr::String(a, _), ValueRepr::String(b, _)) => Some(CoerceResult::Str(a, b)),
        (ValueRepr::I64(a), ValueRepr::I64(b)) => Some(CoerceResult::I128(*a as i128, *b as i128)),
        (ValueRepr::I128(a), ValueRepr::I128(b)) => Some(CoerceResult::I128(a.0, b.0)),
        (ValueRepr::F64(a), ValueRepr::F64(b)) => Some(CoerceResult::F64(*a, *b)),

        // are floats involved?
        (ValueRepr::F64(a), _) => Some(CoerceResult::F64(*a, some!(as_f64(b)))),
        (_, ValueRepr::F64(b)) => Some(CoerceResult::F64(some!(as_f64(a)), *b)),

        // everything else goes up to i128
        _ => Some(CoerceResult::I128(
            some!(i128::try_from(a.clone()).ok()),
            some!(i128::try_from(b.clone()).ok()),
        )),
    }
}

fn int_as_value(val: i128) -> Value {
    if val as i64 as i128 == val {
        (val as i64).into()
    } else {
        val.into()
    }
}

fn impossible_op(op: &str, lhs: &Value, rhs: &Value) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!(
            "tried to use {} operator on unsupported types {} and {}",
            op,
            lhs.kind(),
            rhs.kind()
        ),
    )
}

fn failed_op(op: &str, lhs: &Value, rhs: &Value) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!("unable to calculate {lhs} {op} {rhs}"),
    )
}

macro_rules! math_binop {
    ($name:ident, $int:ident, $float:tt) => {
        pub fn $name(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
            match coerce(lhs, rhs) {
                Some(CoerceResult::I128(a, b)) => match a.$int(b) {
                    Some(val) => Ok(int_as_value(val)),
                    None => Err(failed_op(stringify!($float), lhs, rhs))
                },
                Some(CoerceResult::F64(a, b)) => Ok((a $float b).into()),
                _ => Err(impossible_op(stringify!($float), lhs, rhs))
            }
        }
    }
}

math_binop!(add, checked_add, +);
math_binop!(sub, checked_sub, -);
math_binop!(mul, checked_mul, *);
math_binop!(rem, checked_rem_euclid, %);

/// The `/` operator always produces floats.
pub fn div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    fn do_it(lhs: &Value, rhs: &Value) -> Option<Value> {
        let a = some!(as_f64(lhs));
        let b = some!(as_f64(rhs));
        Some((a / b).into())
    }
    do_it(lhs, rhs).ok_or_else(|| impossible_op("/", lhs, rhs))
}

/// The `//` operator stays integral when both sides are integers.
pub fn int_div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I128(a, b)) => {
            if b != 0 {
                a.checked_div_euclid(b)
                    .ok_or_else(|| failed_op("//", lhs, rhs))
                    .map(int_as_value)
            } else {
                Err(failed_op("//", lhs, rhs))
            }
        }
        Some(CoerceResult::F64(a, b)) => Ok(a.div_euclid(b).into()),
        _ => Err(impossible_op("//", lhs, rhs)),
    }
}

/// Implements a binary `pow` operation on values.
pub fn pow(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I128(a, b)) => {
            match TryFrom::try_from(b).ok().and_then(|b| a.checked_pow(b)) {
                Some(val) => Ok(int_as_value(val)),
                None => Err(failed_op("**", lhs, rhs)),
            }
        }
        Some(CoerceResult::F64(a, b)) => Ok((a.powf(b)).into()),
        _ => Err(impossible_op("**", lhs, rhs)),
    }
}

/// Implements an unary `neg` operation on value.
pub fn neg(val: &Value) -> Result<Value, Error> {
    if val.kind() == ValueKind::Number {
        if let ValueRepr::F64(x) = val.0 {
            return Ok((-x).into());
        }
        if let Ok(x) = i128::try_from(val.clone()) {
            return x
                .checked_mul(-1)
                .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "overflow"))
                .map(int_as_value);
        }
    }
    Err(Error::from(ErrorKind::InvalidOperation))
}

/// Attempts a string concatenation.
///
/// Only the concatenation of two safe strings is safe again; everything
/// else drops the safe flag.
pub fn string_concat(left: &Value, right: &Value) -> Value {
    let rv = format!("{left}{right}");
    if left.is_safe() && right.is_safe() {
        Value::from_safe_string(rv)
    } else {
        Value::from(rv)
    }
}

/// Compares two values.
///
/// Unlike equality this operation fails for values of mismatching kinds.
pub fn cmp(lhs: &Value, rhs: &Value) -> Result<Ordering, Error> {
    match (&lhs.0, &rhs.0) {
        (ValueRepr::String(a, _), ValueRepr::String(b, _)) => Ok(a.cmp(b)),
        (ValueRepr::Bytes(a), ValueRepr::Bytes(b)) => Ok(a.cmp(b)),
        (ValueRepr::Seq(a), ValueRepr::Seq(b)) => {
            for (a, b) in a.iter().zip(b.iter()) {
                match ok!(cmp(a, b)) {
                    Ordering::Equal => continue,
                    other => return Ok(other),
                }
            }
            Ok(a.len().cmp(&b.len()))
        }
        _ => match coerce(lhs, rhs) {
            Some(CoerceResult::F64(a, b)) => Ok(super::f64_total_cmp(a, b)),
            Some(CoerceResult::I128(a, b)) => Ok(a.cmp(&b)),
            Some(CoerceResult::Str(a, b)) => Ok(a.cmp(b)),
            None => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("cannot compare {} with {}", lhs.kind(), rhs.kind()),
            )),
        },
    }
}

/// Implements a containment operation on values.
pub fn contains(container: &Value, value: &Value) -> Result<Value, Error> {
    // Special case where if the container is undefined, it cannot hold
    // values.  For strict containment checks the evaluator has a special
    // case.
    if container.is_undefined() {
        return Ok(Value::from(false));
    }
    let rv = if let Some(s) = container.as_str() {
        if let Some(s2) = value.as_str() {
            s.contains(s2)
        } else {
            s.contains(&value.to_string())
        }
    } else if let ValueRepr::Map(ref map, _) = container.0 {
        match value.as_str() {
            Some(key) => map.contains_key(key),
            None => map.contains_key(value.to_string().as_str()),
        }
    } else if matches!(
        container.kind(),
        ValueKind::Seq | ValueKind::Map | ValueKind::Iterator
    ) {
        ok!(container.try_iter()).any(|v| &v == value)
    } else {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "cannot perform a containment check on this value",
        ));
    };
    Ok(Value::from(rv))
}

fn get_offset_and_len<F: FnOnce() -> usize>(
    start: Option<i64>,
    stop: Option<i64>,
    end: F,
) -> (usize, usize) {
    let start = start.unwrap_or(0);
    if start < 0 || stop.map_or(true, |x| x < 0) {
        let end = end();
        let start = if start < 0 {
            std::cmp::max(0, end as i64 + start) as usize
        } else {
            start as usize
        };
        let stop = match stop {
            None => end,
            Some(x) if x < 0 => std::cmp::max(0, end as i64 + x) as usize,
            Some(x) => x as usize,
        };
        (start, stop.saturating_sub(start))
    } else {
        (
            start as usize,
            (stop.unwrap() as usize).saturating_sub(start as usize),
        )
    }
}

fn range_step_backwards(
    start: Option<i64>,
    stop: Option<i64>,
    step: usize,
    end: usize,
) -> impl Iterator<Item = usize> {
    let start = match start {
        None => end.saturating_sub(1),
        Some(start) if start >= end as i64 => end.saturating_sub(1),
        Some(start) if start >= 0 => start as usize,
        Some(start) => (end as i64 + start).max(0) as usize,
    };
    let stop = match stop {
        None => 0,
        Some(stop) if stop < 0 => (end as i64 + stop).max(0) as usize,
        Some(stop) => stop as usize,
    };
    let length = if stop == 0 {
        (start + step) / step
    } else {
        (start - stop + step - 1) / step
    };
    (stop..=start).rev().step_by(step).take(length)
}

/// Slices a value with optional start, stop and step.
pub fn slice(value: Value, start: Value, stop: Value, step: Value) -> Result<Value, Error> {
    let start: Option<i64> = if start.is_none() {
        None
    } else {
        Some(ok!(start.try_into()))
    };
    let stop = if stop.is_none() {
        None
    } else {
        Some(ok!(i64::try_from(stop)))
    };
    let step = if step.is_none() {
        1i64
    } else {
        ok!(i64::try_from(step))
    };
    if step == 0 {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "cannot slice by step size of 0",
        ));
    }

    match value.0 {
        ValueRepr::String(ref s, _) => {
            if step > 0 {
                let (start, len) = get_offset_and_len(start, stop, || s.chars().count());
                Ok(Value::from(
                    s.chars()
                        .skip(start)
                        .take(len)
                        .step_by(step as usize)
                        .collect::<String>(),
                ))
            } else {
                let chars: Vec<char> = s.chars().collect();
                Ok(Value::from(
                    range_step_backwards(start, stop, -step as usize, chars.len())
                        .map(|i| chars[i])
                        .collect::<String>(),
                ))
            }
        }
        ValueRepr::Bytes(ref b) => {
            if step > 0 {
                let (start, len) = get_offset_and_len(start, stop, || b.len());
                Ok(Value::from_bytes(
                    b.iter()
                        .skip(start)
                        .take(len)
                        .step_by(step as usize)
                        .copied()
                        .collect(),
                ))
            } else {
                Ok(Value::from_bytes(
                    range_step_backwards(start, stop, -step as usize, b.len())
                        .map(|i| b[i])
                        .collect(),
                ))
            }
        }
        ValueRepr::Seq(ref items) => {
            if step > 0 {
                let (start, len) = get_offset_and_len(start, stop, || items.len());
                Ok(Value::from(
                    items
                        .iter()
                        .skip(start)
                        .take(len)
                        .step_by(step as usize)
                        .cloned()
                        .collect::<Vec<_>>(),
                ))
            } else {
                Ok(Value::from(
                    range_step_backwards(start, stop, -step as usize, items.len())
                        .map(|i| items[i].clone())
                        .collect::<Vec<_>>(),
                ))
            }
        }
        ValueRepr::Undefined(_) | ValueRepr::None => Ok(Value::from(Vec::<Value>::new())),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("value of type {} cannot be sliced", value.kind()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_adding() {
        let err = add(&Value::from("a"), &Value::from(42)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid operation: tried to use + operator on unsupported types string and number"
        );

        assert_eq!(add(&Value::from(1), &Value::from(2)).unwrap(), Value::from(3));

        // strings concatenate with `~`, not `+`
        assert!(add(&Value::from("foo"), &Value::from("bar")).is_err());
    }

    #[test]
    fn test_promotion() {
        // int op int stays int
        assert_eq!(mul(&Value::from(3), &Value::from(4)).unwrap(), Value::from(12));
        assert!(mul(&Value::from(3), &Value::from(4)).unwrap().is_integer());
        // floats promote
        assert_eq!(
            add(&Value::from(1), &Value::from(0.5)).unwrap(),
            Value::from(1.5)
        );
        // int64 overflow promotes to a big integer
        let big = add(&Value::from(i64::MAX), &Value::from(1)).unwrap();
        assert_eq!(big, Value::from(i64::MAX as i128 + 1));
        // i128 overflow errors out
        assert!(add(&Value::from(i128::MAX), &Value::from(1)).is_err());
    }

    #[test]
    fn test_dividing() {
        assert_eq!(
            div(&Value::from(100), &Value::from(2)).unwrap(),
            Value::from(50.0)
        );
        assert_eq!(
            int_div(&Value::from(10), &Value::from(4)).unwrap(),
            Value::from(2)
        );
        assert_eq!(
            int_div(&Value::from(10.0), &Value::from(4)).unwrap(),
            Value::from(2.0)
        );
        assert!(int_div(&Value::from(1), &Value::from(0)).is_err());
    }

    #[test]
    fn test_concat() {
        assert_eq!(
            string_concat(&Value::from("foo"), &Value::from(42)),
            Value::from("foo42")
        );
        let safe = string_concat(
            &Value::from_safe_string("a".into()),
            &Value::from_safe_string("b".into()),
        );
        assert!(safe.is_safe());
        let unsafe_ = string_concat(&Value::from_safe_string("a".into()), &Value::from("b"));
        assert!(!unsafe_.is_safe());
    }

    #[test]
    fn test_cmp() {
        assert_eq!(cmp(&Value::from(1), &Value::from(2)).unwrap(), Ordering::Less);
        assert_eq!(
            cmp(&Value::from("a"), &Value::from("b")).unwrap(),
            Ordering::Less
        );
        assert!(cmp(&Value::from(1), &Value::from("b")).is_err());
    }

    #[test]
    fn test_slicing() {
        let v = Value::from(vec![0, 1, 2, 3, 4]);
        assert_eq!(
            slice(v.clone(), Value::from(()), Value::from(()), Value::from(2)).unwrap(),
            Value::from(vec![0, 2, 4])
        );
        assert_eq!(
            slice(v.clone(), Value::from(-2), Value::from(()), Value::from(())).unwrap(),
            Value::from(vec![3, 4])
        );
        assert_eq!(
            slice(v, Value::from(()), Value::from(-3), Value::from(())).unwrap(),
            Value::from(vec![0, 1])
        );
        let s = Value::from("abcdef");
        assert_eq!(
            slice(s.clone(), Value::from(1), Value::from(4), Value::from(())).unwrap(),
            Value::from("bcd")
        );
        assert_eq!(
            slice(s, Value::from(()), Value::from(()), Value::from(-1)).unwrap(),
            Value::from("fedcba")
        );
    }
}
