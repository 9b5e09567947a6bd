use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::value::{MapType, Packed, StringType, Value, ValueMap, ValueRepr};

/// Helper trait representing valid filter, test and function arguments.
///
/// Since it's more convenient to write filters and tests with concrete
/// types instead of values, this helper trait exists to automatically
/// perform this conversion.  It is implemented for tuples up to an arity
/// of five parameters.
///
/// For each argument the conversion is performed via the [`ArgType`]
/// trait which is implemented for some primitive concrete types as well
/// as these types wrapped in [`Option`].
pub trait FunctionArgs: Sized {
    /// Converts to function arguments from a slice of values.
    fn from_values(values: &[Value]) -> Result<Self, Error>;
}

/// A trait implemented by all filter, test and function argument types.
///
/// This trait is the companion to [`FunctionArgs`].  It's passed an
/// `Option<&Value>` where `Some` means the argument was provided and
/// `None` that it was not.  This is used to implement optional arguments.
pub trait ArgType: Sized {
    /// Converts a value into the argument type.
    fn from_value(value: Option<&Value>) -> Result<Self, Error>;
}

fn missing_argument() -> Error {
    Error::new(ErrorKind::MissingArgument, "missing argument")
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<$($name: ArgType,)*> FunctionArgs for ($($name,)*) {
            fn from_values(values: &[Value]) -> Result<Self, Error> {
                #![allow(non_snake_case, unused)]
                let arg_count = 0 $(
                    + { let $name = (); 1 }
                )*;
                if values.len() > arg_count {
                    return Err(Error::new(
                        ErrorKind::TooManyArguments,
                        "received unexpected extra arguments",
                    ));
                }
                {
                    let mut idx = 0;
                    $(
                        let $name = ok!(ArgType::from_value(values.get(idx)));
                        idx += 1;
                    )*
                    Ok(( $($name,)* ))
                }
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

impl ArgType for Value {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        value.cloned().ok_or_else(missing_argument)
    }
}

impl ArgType for String {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => Ok(value.to_string()),
            None => Err(missing_argument()),
        }
    }
}

impl<T: ArgType> ArgType for Option<T> {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            None => Ok(None),
            Some(value) if value.is_undefined() || value.is_none() => Ok(None),
            Some(value) => T::from_value(Some(value)).map(Some),
        }
    }
}

impl<T: ArgType> ArgType for Vec<T> {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            None => Ok(Vec::new()),
            Some(value) => {
                let mut rv = Vec::new();
                for item in ok!(value.try_iter()) {
                    rv.push(ok!(T::from_value(Some(&item))));
                }
                Ok(rv)
            }
        }
    }
}

macro_rules! primitive_try_from {
    ($ty:ident) => {
        impl TryFrom<Value> for $ty {
            type Error = Error;

            fn try_from(value: Value) -> Result<Self, Self::Error> {
                let opt = match value.0 {
                    ValueRepr::Bool(val) => <$ty>::try_from(val as i64).ok(),
                    ValueRepr::I64(val) => <$ty>::try_from(val).ok(),
                    ValueRepr::I128(val) => <$ty>::try_from(val.0).ok(),
                    _ => None,
                };
                opt.ok_or_else(|| {
                    Error::new(
                        ErrorKind::InvalidOperation,
                        concat!("cannot convert to ", stringify!($ty)),
                    )
                })
            }
        }

        impl ArgType for $ty {
            fn from_value(value: Option<&Value>) -> Result<Self, Error> {
                match value {
                    Some(value) => TryFrom::try_from(value.clone()),
                    None => Err(missing_argument()),
                }
            }
        }
    };
}

primitive_try_from!(u8);
primitive_try_from!(u16);
primitive_try_from!(u32);
primitive_try_from!(u64);
primitive_try_from!(i8);
primitive_try_from!(i16);
primitive_try_from!(i32);
primitive_try_from!(i64);
primitive_try_from!(i128);
primitive_try_from!(usize);
primitive_try_from!(isize);

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        super::ops::as_f64(&value)
            .ok_or_else(|| Error::new(ErrorKind::InvalidOperation, "cannot convert to f64"))
    }
}

impl ArgType for f64 {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => TryFrom::try_from(value.clone()),
            None => Err(missing_argument()),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value.0 {
            ValueRepr::Bool(val) => Ok(val),
            _ => Err(Error::new(ErrorKind::InvalidOperation, "cannot convert to bool")),
        }
    }
}

impl ArgType for bool {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => Ok(value.is_true()),
            None => Err(missing_argument()),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        ValueRepr::None.into()
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Self {
        ValueRepr::Bool(val).into()
    }
}

macro_rules! value_from_int {
    ($ty:ty) => {
        impl From<$ty> for Value {
            fn from(val: $ty) -> Self {
                ValueRepr::I64(val as i64).into()
            }
        }
    };
}

value_from_int!(u8);
value_from_int!(u16);
value_from_int!(u32);
value_from_int!(i8);
value_from_int!(i16);
value_from_int!(i32);
value_from_int!(i64);

impl From<u64> for Value {
    fn from(val: u64) -> Self {
        if let Ok(val) = i64::try_from(val) {
            ValueRepr::I64(val).into()
        } else {
            ValueRepr::I128(Packed(val as i128)).into()
        }
    }
}

impl From<usize> for Value {
    fn from(val: usize) -> Self {
        Value::from(val as u64)
    }
}

impl From<i128> for Value {
    fn from(val: i128) -> Self {
        if let Ok(val) = i64::try_from(val) {
            ValueRepr::I64(val).into()
        } else {
            ValueRepr::I128(Packed(val)).into()
        }
    }
}

impl From<f32> for Value {
    fn from(val: f32) -> Self {
        ValueRepr::F64(val as f64).into()
    }
}

impl From<f64> for Value {
    fn from(val: f64) -> Self {
        ValueRepr::F64(val).into()
    }
}

impl From<char> for Value {
    fn from(val: char) -> Self {
        ValueRepr::String(Arc::from(val.to_string()), StringType::Normal).into()
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        ValueRepr::String(Arc::from(val), StringType::Normal).into()
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        ValueRepr::String(Arc::from(val), StringType::Normal).into()
    }
}

impl From<Arc<str>> for Value {
    fn from(val: Arc<str>) -> Self {
        ValueRepr::String(val, StringType::Normal).into()
    }
}

impl From<Cow<'_, str>> for Value {
    fn from(val: Cow<'_, str>) -> Self {
        Value::from(val.as_ref())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(val) => val.into(),
            None => ValueRepr::None.into(),
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(val: Vec<T>) -> Self {
        ValueRepr::Seq(Arc::new(val.into_iter().map(Into::into).collect())).into()
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(val: BTreeMap<K, V>) -> Self {
        val.into_iter().collect()
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> From<HashMap<K, V>> for Value {
    fn from(val: HashMap<K, V>) -> Self {
        val.into_iter().collect()
    }
}

impl Value {
    /// Creates a value from a byte vector.
    pub fn from_bytes(val: Vec<u8>) -> Value {
        ValueRepr::Bytes(Arc::new(val)).into()
    }
}

impl<V: Into<Value>> FromIterator<V> for Value {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        ValueRepr::Seq(Arc::new(iter.into_iter().map(Into::into).collect())).into()
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let map: ValueMap = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        ValueRepr::Map(Arc::new(map), MapType::Normal).into()
    }
}

/// Utility to accept keyword arguments.
///
/// Keyword arguments are represented as regular values as the last argument
/// in an argument list.  This can be quite complex to use manually so this
/// type is added as a utility.  You can use [`get`](Self::get) to fetch a
/// single keyword argument and then use [`assert_all_used`](Self::assert_all_used)
/// to make sure the template did not pass unsupported arguments.
#[derive(Debug, Default, Clone)]
pub struct Kwargs {
    values: ValueMap,
    used: std::cell::RefCell<std::collections::BTreeSet<Arc<str>>>,
}

impl Kwargs {
    pub(crate) fn from_map(values: ValueMap) -> Kwargs {
        Kwargs {
            values,
            used: Default::default(),
        }
    }

    /// Splits a trailing kwargs value off an argument list.
    pub(crate) fn extract(args: &[Value]) -> (&[Value], Kwargs) {
        match args.last() {
            Some(Value(ValueRepr::Map(map, MapType::Kwargs))) => (
                &args[..args.len() - 1],
                Kwargs::from_map((**map).clone()),
            ),
            _ => (args, Kwargs::default()),
        }
    }

    /// Gets a keyword argument by name.
    ///
    /// Absent arguments convert like absent positional arguments which
    /// means `Option<T>` returns `None` for them.
    pub fn get<T: ArgType>(&self, name: &str) -> Result<T, Error> {
        let value = self.values.get(name);
        if value.is_some() {
            self.used.borrow_mut().insert(Arc::from(name));
        }
        T::from_value(value)
    }

    /// Checks if a keyword argument exists.
    pub fn has(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterates over all passed keyword argument names.
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|x| x as &str)
    }

    /// Asserts that all keyword arguments were used.
    pub fn assert_all_used(&self) -> Result<(), Error> {
        let used = self.used.borrow();
        for key in self.values.keys() {
            if !used.contains(key) {
                return Err(Error::new(
                    ErrorKind::TooManyArguments,
                    format!("unknown keyword argument '{key}'"),
                ));
            }
        }
        Ok(())
    }
}

impl ArgType for Kwargs {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            None => Ok(Kwargs::default()),
            Some(value) => match &value.0 {
                ValueRepr::Map(map, MapType::Kwargs) => Ok(Kwargs::from_map((**map).clone())),
                _ => Err(Error::new(
                    ErrorKind::InvalidOperation,
                    "expected keyword arguments",
                )),
            },
        }
    }
}
