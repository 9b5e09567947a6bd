//! Filter functions and abstractions.
//!
//! This engine inherits from Jinja2 the concept of filter functions.  These
//! are functions which are applied to values to modify them.  For example
//! the expression `{{ 42|filter(23) }}` invokes the filter `filter` with
//! the arguments `42` and `23`.
//!
//! The engine ships only the small set of filters its own semantics depend
//! on.  To create a custom filter write a function that takes at least a
//! [`&State`](crate::State) and value argument, then register it with
//! [`add_filter`](crate::Environment::add_filter).
//!
//! # Custom Filters
//!
//! A custom filter is just a simple function which accepts its inputs as
//! parameters and then returns a new value.  For instance the following
//! shows a filter which takes an input value and replaces whitespace with
//! dashes and converts it to lowercase:
//!
//! ```
//! # use stencil::{Environment, State, Error};
//! # let mut env = Environment::new();
//! fn slugify(_state: &State, value: String) -> Result<String, Error> {
//!     Ok(value.to_lowercase().split_whitespace().collect::<Vec<_>>().join("-"))
//! }
//!
//! env.add_filter("slugify", slugify);
//! ```
//!
//! The engine will perform the necessary conversions automatically via the
//! [`FunctionArgs`](crate::value::FunctionArgs) and [`Into`] traits.
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::eval::State;
use crate::utils::HtmlEscape;
use crate::value::{ArgType, FunctionArgs, Value};

type FilterFunc = dyn Fn(&State, &Value, &[Value]) -> Result<Value, Error> + Sync + Send + 'static;

#[derive(Clone)]
pub(crate) struct BoxedFilter(Arc<FilterFunc>);

/// A utility trait that represents filters.
///
/// This is implemented for functions up to an arity of four parameters
/// beyond state and value.
pub trait Filter<V = Value, Rv = Value, Args = ()>: Send + Sync + 'static {
    /// Applies a filter to value with the given arguments.
    fn apply_to(&self, state: &State, value: V, args: Args) -> Result<Rv, Error>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, V, Rv, $($name),*> Filter<V, Rv, ($($name,)*)> for Func
        where
            Func: Fn(&State, V, $($name),*) -> Result<Rv, Error> + Send + Sync + 'static
        {
            fn apply_to(&self, state: &State, value: V, args: ($($name,)*)) -> Result<Rv, Error> {
                #[allow(non_snake_case)]
                let ($($name,)*) = args;
                (self)(state, value, $($name,)*)
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }

impl BoxedFilter {
    /// Creates a new boxed filter.
    pub fn new<F, V, Rv, Args>(f: F) -> BoxedFilter
    where
        F: Filter<V, Rv, Args>,
        V: ArgType,
        Rv: Into<Value>,
        Args: FunctionArgs,
    {
        BoxedFilter(Arc::new(
            move |state, value, args| -> Result<Value, Error> {
                f.apply_to(
                    state,
                    ok!(ArgType::from_value(Some(value))),
                    ok!(FunctionArgs::from_values(args)),
                )
                .map(Into::into)
            },
        ))
    }

    /// Applies the filter to a value and arguments.
    pub fn apply_to(&self, state: &State, value: &Value, args: &[Value]) -> Result<Value, Error> {
        (self.0)(state, value, args)
    }
}

/// Marks a value as safe.  This converts it into a string.
pub fn safe(_state: &State, v: String) -> Result<Value, Error> {
    Ok(Value::from_safe_string(v))
}

/// HTML escapes a string.
///
/// By default this filter is also registered under the alias `e`.  A value
/// that is already marked as safe is passed through unchanged which makes
/// the filter idempotent.
pub fn escape(_state: &State, v: Value) -> Result<Value, Error> {
    if v.is_safe() {
        Ok(v)
    } else {
        Ok(Value::from_safe_string(
            HtmlEscape(&v.to_string()).to_string(),
        ))
    }
}

/// Converts a value to uppercase.
pub fn upper(_state: &State, v: String) -> Result<String, Error> {
    Ok(v.to_uppercase())
}

/// Converts a value to lowercase.
pub fn lower(_state: &State, v: String) -> Result<String, Error> {
    Ok(v.to_lowercase())
}

/// Returns the length of the value.
///
/// For strings this is the number of characters, for sequences and maps
/// the number of items.
pub fn length(_state: &State, v: Value) -> Result<Value, Error> {
    v.len().map(Value::from).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot calculate length of value of type {}", v.kind()),
        )
    })
}

/// Trims leading and trailing whitespace or custom characters.
pub fn trim(_state: &State, v: String, chars: Option<String>) -> Result<String, Error> {
    match chars {
        Some(chars) => {
            let chars = chars.chars().collect::<Vec<_>>();
            Ok(v.trim_matches(&chars[..]).to_string())
        }
        None => Ok(v.trim().to_string()),
    }
}

/// Joins a sequence of values with an optional joiner string.
pub fn join(_state: &State, v: Value, joiner: Option<String>) -> Result<String, Error> {
    if v.is_undefined() || v.is_none() {
        return Ok(String::new());
    }
    let joiner = joiner.unwrap_or_default();
    if let Some(s) = v.as_str() {
        return Ok(s
            .chars()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(&joiner));
    }
    Ok(ok!(v.try_iter())
        .map(|item| match item.as_str() {
            Some(s) => s.to_string(),
            None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join(&joiner))
}

/// Returns the value if it's defined, otherwise the fallback.
///
/// The fallback defaults to an empty string.
pub fn default(_state: &State, v: Value, other: Option<Value>) -> Result<Value, Error> {
    Ok(if v.is_undefined() {
        other.unwrap_or_else(|| Value::from(""))
    } else {
        v
    })
}

/// Serializes a value to JSON.
///
/// The result is marked safe for HTML because problematic characters are
/// escaped in a way that keeps the output embeddable.
pub fn tojson(_state: &State, v: Value) -> Result<Value, Error> {
    serde_json::to_string(&v)
        .map_err(|err| {
            Error::new(ErrorKind::BadSerialization, "unable to format to JSON").with_source(err)
        })
        .map(|s| {
            // When this filter is used the return value is safe for both
            // HTML and JSON.  The escaping here avoids accidental script
            // injection when the result lands in HTML attributes or tags.
            let mut rv = String::with_capacity(s.len());
            for c in s.chars() {
                match c {
                    '<' => rv.push_str("\\u003c"),
                    '>' => rv.push_str("\\u003e"),
                    '&' => rv.push_str("\\u0026"),
                    '\'' => rv.push_str("\\u0027"),
                    _ => rv.push(c),
                }
            }
            Value::from_safe_string(rv)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_escape_idempotent() {
        let env = crate::Environment::new();
        let state = env.empty_state();
        let once = escape(&state, Value::from("<x>")).unwrap();
        assert_eq!(once.as_str(), Some("&lt;x&gt;"));
        let twice = escape(&state, once.clone()).unwrap();
        assert_eq!(once, twice);
    }
}
