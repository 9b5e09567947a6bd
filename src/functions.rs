//! Global functions and abstractions.
//!
//! This module provides the abstractions for functions that can be
//! registered as global functions in the environment via
//! [`add_function`](crate::Environment::add_function).
//!
//! Functions are a separate registry from globals: when a variable cannot
//! be found anywhere else, the function registry is consulted last and the
//! function is handed out as a callable value.
//!
//! # Custom Functions
//!
//! A custom global function is just a simple rust function which accepts a
//! [`&State`](crate::State) and its parameters and returns a result:
//!
//! ```
//! # use stencil::{Environment, State, Error};
//! # let mut env = Environment::new();
//! fn include_file(_state: &State, name: String) -> Result<String, Error> {
//!     std::fs::read_to_string(&name)
//!         .map_err(|e| Error::new(stencil::ErrorKind::InvalidOperation,
//!                                 "cannot load file").with_source(e))
//! }
//!
//! env.add_function("include_file", include_file);
//! ```
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::eval::State;
use crate::value::{FunctionArgs, Kwargs, Namespace, Object, ObjectRepr, Value, ValueMap};

type FuncFunc = dyn Fn(&State, &[Value]) -> Result<Value, Error> + Sync + Send + 'static;

/// A boxed function kept in the function registry.
#[derive(Clone)]
pub(crate) struct BoxedFunction(Arc<FuncFunc>, Arc<str>);

/// A utility trait that represents global functions.
///
/// This is implemented for functions up to an arity of five parameters
/// beyond the state.
pub trait Function<Args = ()>: Send + Sync + 'static {
    /// Calls a function with the given arguments.
    fn invoke(&self, state: &State, args: Args) -> Result<Value, Error>;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, Rv, $($name),*> Function<($($name,)*)> for Func
        where
            Func: Fn(&State, $($name),*) -> Result<Rv, Error> + Send + Sync + 'static,
            Rv: Into<Value>,
        {
            fn invoke(&self, state: &State, args: ($($name,)*)) -> Result<Value, Error> {
                #[allow(non_snake_case)]
                let ($($name,)*) = args;
                (self)(state, $($name,)*).map(Into::into)
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }
tuple_impls! { A B C D E }

impl BoxedFunction {
    /// Creates a new boxed function.
    pub fn new<F, Args>(name: &str, f: F) -> BoxedFunction
    where
        F: Function<Args>,
        Args: FunctionArgs,
    {
        BoxedFunction(
            Arc::new(move |state, args| -> Result<Value, Error> {
                f.invoke(state, ok!(FunctionArgs::from_values(args)))
            }),
            Arc::from(name),
        )
    }

    /// Invokes the function.
    pub fn invoke(&self, state: &State, args: &[Value]) -> Result<Value, Error> {
        (self.0)(state, args)
    }

    /// Creates a value from the function.
    pub fn to_value(&self) -> Value {
        Value::from_object(FuncObject(self.clone()))
    }
}

struct FuncObject(BoxedFunction);

impl fmt::Debug for FuncObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {}>", self.0 .1)
    }
}

impl Object for FuncObject {
    fn repr(&self) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call(&self, state: &State, args: &[Value]) -> Result<Value, Error> {
        self.0.invoke(state, args)
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Returns a range of numbers.
///
/// With a single argument the range starts at `0`, with two arguments the
/// first is the lower bound.  The optional third argument is the step size.
pub fn range(_state: &State, lower: u32, upper: Option<u32>, step: Option<u32>) -> Result<Value, Error> {
    fn to_result<I: ExactSizeIterator<Item = u32> + Send + Sync + Clone + 'static>(
        i: I,
    ) -> Result<Value, Error> {
        if i.len() > 100000 {
            Err(Error::new(
                ErrorKind::InvalidOperation,
                "range has too many elements",
            ))
        } else {
            Ok(Value::from(i.map(Value::from).collect::<Vec<_>>()))
        }
    }
    let rv = match (upper, step) {
        (None, None) => to_result(0..lower),
        (Some(upper), None) => to_result(lower..upper),
        (Some(_), Some(0)) => Err(Error::new(
            ErrorKind::InvalidOperation,
            "cannot create range with step of 0",
        )),
        (Some(upper), Some(step)) => to_result((lower..upper).step_by(step as usize)),
        _ => Err(Error::new(
            ErrorKind::MissingArgument,
            "upper bound required when step is given",
        )),
    };
    rv
}

/// Creates a dictionary from keyword arguments.
pub fn dict(_state: &State, kwargs: Kwargs) -> Result<Value, Error> {
    let mut rv = ValueMap::new();
    for key in kwargs.args() {
        rv.insert(Arc::from(key), ok!(kwargs.get(key)));
    }
    Ok(Value::from_map(rv))
}

/// Creates a namespace object for attribute assignments.
///
/// Namespaces are the only values `{% set ns.attr = value %}` can mutate.
pub fn namespace(_state: &State, kwargs: Kwargs) -> Result<Value, Error> {
    let mut rv = ValueMap::new();
    for key in kwargs.args() {
        rv.insert(Arc::from(key), ok!(kwargs.get(key)));
    }
    Ok(Value::from_object(Namespace::from_fields(rv)))
}
