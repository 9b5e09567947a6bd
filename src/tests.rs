//! Test functions and abstractions.
//!
//! Test functions in this engine are like [`filters`](crate::filters) but a
//! different syntax is used to invoke them and they have to return boolean
//! values.  For instance the expression `{% if foo is defined %}` invokes
//! the test `defined` on the value of `foo`.
//!
//! The comparison operators are also exposed as tests under symbolic names
//! (`==`, `!=`, `<`, `<=`, `>`, `>=`) and their spelled out aliases so that
//! expressions such as `{{ users|select("age", ">=", 18) }}` can resolve
//! them by name.
//!
//! # Custom Tests
//!
//! A custom test function is just a simple function which accepts its
//! inputs as parameters and then returns a bool:
//!
//! ```
//! # use stencil::{Environment, State, Error};
//! # let mut env = Environment::new();
//! fn is_lowercase(_state: &State, value: String) -> Result<bool, Error> {
//!     Ok(value.chars().all(|x| x.is_lowercase()))
//! }
//!
//! env.add_test("lowercase", is_lowercase);
//! ```
use std::sync::Arc;

use crate::error::Error;
use crate::eval::State;
use crate::value::{ArgType, FunctionArgs, Value, ValueKind};

type TestFunc = dyn Fn(&State, &Value, &[Value]) -> Result<bool, Error> + Sync + Send + 'static;

#[derive(Clone)]
pub(crate) struct BoxedTest(Arc<TestFunc>);

/// A utility trait that represents test functions.
///
/// This is implemented for functions up to an arity of four parameters
/// beyond state and value.
pub trait Test<V = Value, Args = ()>: Send + Sync + 'static {
    /// Performs a test to value with the given arguments.
    fn perform(&self, state: &State, value: V, args: Args) -> Result<bool, Error>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, V, $($name),*> Test<V, ($($name,)*)> for Func
        where
            Func: Fn(&State, V, $($name),*) -> Result<bool, Error> + Send + Sync + 'static
        {
            fn perform(&self, state: &State, value: V, args: ($($name,)*)) -> Result<bool, Error> {
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

impl BoxedTest {
    /// Creates a new boxed test.
    pub fn new<F, V, Args>(f: F) -> BoxedTest
    where
        F: Test<V, Args>,
        V: ArgType,
        Args: FunctionArgs,
    {
        BoxedTest(Arc::new(move |state, value, args| -> Result<bool, Error> {
            f.perform(
                state,
                ok!(ArgType::from_value(Some(value))),
                ok!(FunctionArgs::from_values(args)),
            )
        }))
    }

    /// Performs the test with a value and arguments.
    pub fn perform(&self, state: &State, value: &Value, args: &[Value]) -> Result<bool, Error> {
        (self.0)(state, value, args)
    }
}

/// Checks if a value is undefined.
pub fn is_undefined(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.is_undefined())
}

/// Checks if a value is defined.
pub fn is_defined(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(!v.is_undefined())
}

/// Checks if a value is none.
pub fn is_none(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.is_none())
}

/// Checks if a value is a safe string.
pub fn is_safe(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.is_safe())
}

/// Checks if a value is odd.
pub fn is_odd(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.as_i64().map_or(false, |x| x % 2 != 0))
}

/// Checks if a value is even.
pub fn is_even(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.as_i64().map_or(false, |x| x % 2 == 0))
}

/// Checks if a value is a number.
pub fn is_number(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.kind() == ValueKind::Number)
}

/// Checks if a value is a string.
pub fn is_string(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.kind() == ValueKind::String)
}

/// Checks if a value is a sequence.
pub fn is_sequence(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.kind() == ValueKind::Seq)
}

/// Checks if a value is a mapping.
pub fn is_mapping(_state: &State, v: Value) -> Result<bool, Error> {
    Ok(v.kind() == ValueKind::Map)
}

/// Checks if the value is equal to another value.
pub fn is_eq(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    Ok(v == other)
}

/// Checks if the value is not equal to another value.
pub fn is_ne(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    Ok(v != other)
}

/// Checks if the value is less than another value.
pub fn is_lt(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    crate::value::ops::cmp(&v, &other).map(|x| x == std::cmp::Ordering::Less)
}

/// Checks if the value is less than or equal to another value.
pub fn is_le(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    crate::value::ops::cmp(&v, &other).map(|x| x != std::cmp::Ordering::Greater)
}

/// Checks if the value is greater than another value.
pub fn is_gt(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    crate::value::ops::cmp(&v, &other).map(|x| x == std::cmp::Ordering::Greater)
}

/// Checks if the value is greater than or equal to another value.
pub fn is_ge(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    crate::value::ops::cmp(&v, &other).map(|x| x != std::cmp::Ordering::Less)
}

/// Checks if the value is contained in another value.
pub fn is_in(_state: &State, v: Value, other: Value) -> Result<bool, Error> {
    crate::value::ops::contains(&other, &v).map(|x| x.is_true())
}
