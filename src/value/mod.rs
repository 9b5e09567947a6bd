//! Provides a dynamic value type abstraction.
//!
//! This module gives access to a dynamically typed value which is used by
//! the template engine during execution.
//!
//! For the most part the existence of the value type can be ignored as
//! the engine will perform the necessary conversions for you.  For instance
//! if you write a filter that converts a string you can directly declare the
//! filter to take a [`String`](std::string::String).  However for some more
//! advanced use cases it's useful to know that this type exists.
//!
//! # Basic Value Conversions
//!
//! Values are typically created via the [`From`] trait:
//!
//! ```
//! # use stencil::value::Value;
//! let int_value = Value::from(42);
//! let none_value = Value::from(());
//! let true_value = Value::from(true);
//! ```
//!
//! Or via the [`FromIterator`] trait:
//!
//! ```
//! # use stencil::value::Value;
//! // collection into a sequence
//! let value: Value = (1..10).collect();
//!
//! // collection into a map
//! let value: Value = [("key", "value")].into_iter().collect();
//! ```
//!
//! # Serde Conversions
//!
//! The engine will usually create values via an indirection via [`serde`] when
//! a template is rendered.  This can also be triggered manually by using the
//! [`Value::from_serializable`] method:
//!
//! ```
//! # use stencil::value::Value;
//! let value = Value::from_serializable(&[1, 2, 3]);
//! ```
//!
//! # Dynamic Objects
//!
//! Values can also hold "dynamic" objects.  These are objects which implement
//! the [`Object`] trait.  These can be used to implement dynamic functionality
//! such as stateful values and more.  Dynamic objects are internally also used
//! to implement the special `loop` variable or macros.
//!
//! # One-Shot Iterators
//!
//! A value can hold a one-shot iterator which yields its items exactly once.
//! Loops over such values pull items lazily which means a loop that breaks
//! early leaves the remaining items behind for a later loop to pick up.
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::ser::{Serialize, Serializer};

use crate::error::{Error, ErrorKind};
use crate::eval::State;
use crate::utils::OnDrop;
use crate::value::serialize::transform;

pub use crate::value::argtypes::{ArgType, FunctionArgs, Kwargs};
pub use crate::value::object::{Namespace, Object, ObjectRepr};

mod argtypes;
pub(crate) mod object;
pub(crate) mod ops;
mod serialize;

/// The type of map used by values.
pub(crate) type ValueMap = BTreeMap<Arc<str>, Value>;

// We use in-band signalling to roundtrip some internal values.  This is
// not ideal but unfortunately there is no better system in serde today.
const VALUE_HANDLE_MARKER: &str = "\x01__stencil_ValueHandle";

thread_local! {
    static INTERNAL_SERIALIZATION: Cell<bool> = const { Cell::new(false) };
    static LAST_VALUE_HANDLE: Cell<u32> = const { Cell::new(0) };
    static VALUE_HANDLES: RefCell<BTreeMap<u32, Value>> = RefCell::new(BTreeMap::new());
}

/// Function that returns true when serialization for [`Value`] is taking place.
///
/// The engine internally creates [`Value`] objects from all values passed to
/// it by going through the regular serde serialization trait.  In some cases
/// users might want to customize the serialization specifically for the
/// template engine because they want to tune the object for the engine
/// independently of what is normally serialized to disk.
pub fn serializing_for_value() -> bool {
    INTERNAL_SERIALIZATION.with(|flag| flag.get())
}

fn mark_internal_serialization() -> impl Drop {
    let old = INTERNAL_SERIALIZATION.with(|flag| {
        let old = flag.get();
        flag.set(true);
        old
    });
    OnDrop::new(move || {
        if !old {
            INTERNAL_SERIALIZATION.with(|flag| flag.set(false));
        }
    })
}

pub(crate) fn get_value_handle(handle: u32) -> Value {
    VALUE_HANDLES.with(|handles| {
        handles
            .borrow_mut()
            .remove(&handle)
            .expect("value handle not in registry")
    })
}

/// Describes the kind of value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[non_exhaustive]
pub enum ValueKind {
    /// The value is undefined
    Undefined,
    /// The value is the none singleton (`()`)
    None,
    /// The value is a [`bool`]
    Bool,
    /// The value is a number of a supported type.
    Number,
    /// The value is a string.
    String,
    /// The value is a byte array.
    Bytes,
    /// The value is an array of other values.
    Seq,
    /// The value is a key/value mapping.
    Map,
    /// The value is a one-shot iterator.
    Iterator,
    /// The value is a plain object with no specific shape.
    Plain,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::Undefined => "undefined",
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Seq => "sequence",
            ValueKind::Map => "map",
            ValueKind::Iterator => "iterator",
            ValueKind::Plain => "plain object",
        })
    }
}

/// The type of string.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum StringType {
    Normal,
    Safe,
}

/// The type of undefined value.
///
/// Silent undefined values are produced by a ternary expression without an
/// `else` branch and never fail, not even in strict mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum UndefinedType {
    Default,
    Silent,
}

/// The type of map.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum MapType {
    Normal,
    Kwargs,
}

/// Wraps an internal copyable value but marks it as packed.
///
/// This is used for `i128` in the value repr to avoid the excessive 16
/// byte alignment.
#[derive(Copy)]
#[repr(packed)]
pub(crate) struct Packed<T: Copy>(pub T);

impl<T: Copy> Clone for Packed<T> {
    fn clone(&self) -> Self {
        *self
    }
}

/// A one-shot iterator held by a value.
///
/// The cursor is shared by all clones of the value which means a partial
/// iteration suspends the cursor and a later iteration resumes it.
pub(crate) struct OneShotIterator {
    name: std::borrow::Cow<'static, str>,
    iter: Mutex<Box<dyn Iterator<Item = Value> + Send + Sync>>,
    done: std::sync::atomic::AtomicBool,
}

impl OneShotIterator {
    /// Pulls the next item off the iterator.
    pub fn pull_next(&self) -> Option<Value> {
        let rv = self.iter.lock().unwrap().next();
        if rv.is_none() {
            self.done.store(true, std::sync::atomic::Ordering::Relaxed);
        }
        rv
    }

    /// Reports if the iterator was observed to be exhausted.
    pub fn pull_done(&self) -> bool {
        self.done.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// The debug name of the iterator.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for OneShotIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<iterator {:?}>", self.name())
    }
}

#[derive(Clone)]
pub(crate) enum ValueRepr {
    Undefined(UndefinedType),
    Bool(bool),
    I64(i64),
    F64(f64),
    I128(Packed<i128>),
    None,
    Invalid(Arc<str>),
    String(Arc<str>, StringType),
    Bytes(Arc<Vec<u8>>),
    Seq(Arc<Vec<Value>>),
    Map(Arc<ValueMap>, MapType),
    Iterator(Arc<OneShotIterator>),
    Dynamic(Arc<dyn Object>),
}

impl fmt::Debug for ValueRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRepr::Undefined(_) => f.write_str("undefined"),
            ValueRepr::Bool(val) => fmt::Debug::fmt(val, f),
            ValueRepr::I64(val) => fmt::Debug::fmt(val, f),
            ValueRepr::F64(val) => fmt::Debug::fmt(val, f),
            ValueRepr::I128(val) => fmt::Debug::fmt(&{ val.0 }, f),
            ValueRepr::None => f.write_str("none"),
            ValueRepr::Invalid(ref val) => write!(f, "<invalid value: {val}>"),
            ValueRepr::String(val, _) => fmt::Debug::fmt(val, f),
            ValueRepr::Bytes(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Seq(val) => f.debug_list().entries(val.iter()).finish(),
            ValueRepr::Map(val, _) => f.debug_map().entries(val.iter()).finish(),
            ValueRepr::Iterator(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Dynamic(val) => fmt::Debug::fmt(val, f),
        }
    }
}

/// Represents a dynamically typed value in the template engine.
#[derive(Clone)]
pub struct Value(pub(crate) ValueRepr);

impl From<ValueRepr> for Value {
    #[inline(always)]
    fn from(val: ValueRepr) -> Value {
        Value(val)
    }
}

impl Default for Value {
    fn default() -> Value {
        ValueRepr::Undefined(UndefinedType::Default).into()
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (ValueRepr::None, ValueRepr::None) => true,
            (ValueRepr::Undefined(_), ValueRepr::Undefined(_)) => true,
            (ValueRepr::String(ref a, _), ValueRepr::String(ref b, _)) => a == b,
            (ValueRepr::Bytes(a), ValueRepr::Bytes(b)) => a == b,
            (ValueRepr::Seq(a), ValueRepr::Seq(b)) => a == b,
            (ValueRepr::Map(a, _), ValueRepr::Map(b, _)) => a == b,
            (ValueRepr::Iterator(a), ValueRepr::Iterator(b)) => Arc::ptr_eq(a, b),
            (ValueRepr::Dynamic(a), ValueRepr::Dynamic(b)) => {
                if Arc::ptr_eq(a, b) {
                    true
                } else {
                    match (a.enumerate(), b.enumerate()) {
                        (Some(a), Some(b)) => a == b,
                        _ => false,
                    }
                }
            }
            _ => match ops::coerce(self, other) {
                Some(ops::CoerceResult::F64(a, b)) => a == b,
                Some(ops::CoerceResult::I128(a, b)) => a == b,
                Some(ops::CoerceResult::Str(a, b)) => a == b,
                None => false,
            },
        }
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn f64_total_cmp(left: f64, right: f64) -> Ordering {
    // this is taken from f64::total_cmp on newer rust versions
    let mut left = left.to_bits() as i64;
    let mut right = right.to_bits() as i64;
    left ^= (((left >> 63) as u64) >> 1) as i64;
    right ^= (((right >> 63) as u64) >> 1) as i64;
    left.cmp(&right)
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let value_ordering = match (&self.0, &other.0) {
            (ValueRepr::None, ValueRepr::None) => Ordering::Equal,
            (ValueRepr::Undefined(_), ValueRepr::Undefined(_)) => Ordering::Equal,
            (ValueRepr::String(ref a, _), ValueRepr::String(ref b, _)) => a.cmp(b),
            (ValueRepr::Bytes(a), ValueRepr::Bytes(b)) => a.cmp(b),
            (ValueRepr::Seq(a), ValueRepr::Seq(b)) => a.cmp(b),
            (ValueRepr::Map(a, _), ValueRepr::Map(b, _)) => a.cmp(b),
            _ => match ops::coerce(self, other) {
                Some(ops::CoerceResult::F64(a, b)) => f64_total_cmp(a, b),
                Some(ops::CoerceResult::I128(a, b)) => a.cmp(&b),
                Some(ops::CoerceResult::Str(a, b)) => a.cmp(b),
                None => Ordering::Equal,
            },
        };
        value_ordering.then((self.kind() as usize).cmp(&(other.kind() as usize)))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ValueRepr::Undefined(_) => Ok(()),
            ValueRepr::Bool(val) => val.fmt(f),
            ValueRepr::I64(val) => val.fmt(f),
            ValueRepr::I128(val) => write!(f, "{}", { val.0 }),
            ValueRepr::F64(val) => {
                if val.is_nan() {
                    f.write_str("NaN")
                } else if val.is_infinite() {
                    write!(f, "{}inf", if val.is_sign_negative() { "-" } else { "" })
                } else {
                    let mut num = val.to_string();
                    if !num.contains('.') {
                        num.push_str(".0");
                    }
                    write!(f, "{num}")
                }
            }
            ValueRepr::None => f.write_str("none"),
            ValueRepr::Invalid(ref val) => write!(f, "<invalid value: {val}>"),
            ValueRepr::String(val, _) => write!(f, "{val}"),
            ValueRepr::Bytes(val) => write!(f, "{}", String::from_utf8_lossy(val)),
            ValueRepr::Seq(_) | ValueRepr::Map(..) => fmt::Debug::fmt(&self.0, f),
            ValueRepr::Iterator(val) => fmt::Debug::fmt(val, f),
            ValueRepr::Dynamic(val) => val.render(f),
        }
    }
}

#[allow(clippy::len_without_is_empty)]
impl Value {
    /// The undefined value.
    ///
    /// This constant exists because the undefined type does not exist in Rust
    /// and this is the only way to construct it.
    pub const UNDEFINED: Value = Value(ValueRepr::Undefined(UndefinedType::Default));

    /// The silent undefined value.
    ///
    /// This is what a ternary expression without an `else` branch produces.
    /// It never triggers strict undefined errors.
    pub(crate) const SILENT_UNDEFINED: Value = Value(ValueRepr::Undefined(UndefinedType::Silent));

    /// Creates a value from something that can be serialized.
    ///
    /// This is the method that the engine will generally use whenever a
    /// serializable object is passed to one of the APIs that internally
    /// want to create a value.  For instance this is what
    /// [`context!`](crate::context) and [`render`](crate::Template::render)
    /// will use.
    ///
    /// During serialization of the value, [`serializing_for_value`] will return
    /// `true` which makes it possible to customize serialization for the
    /// template engine.
    ///
    /// This method does not fail but it might return a value that is not valid.
    /// Such values will fail in the template engine in most situations when
    /// operated on.
    pub fn from_serializable<T: Serialize>(value: &T) -> Value {
        let _serialization_guard = mark_internal_serialization();
        transform(value)
    }

    /// Creates a value from a safe string.
    ///
    /// A safe string is one that will bypass auto escaping.  For instance if
    /// you want to have the template engine render some HTML without the user
    /// having to supply the `|safe` filter, you can use a value of this type
    /// instead.
    ///
    /// ```
    /// # use stencil::value::Value;
    /// let val = Value::from_safe_string("<em>note</em>".into());
    /// ```
    pub fn from_safe_string(value: String) -> Value {
        ValueRepr::String(Arc::from(value), StringType::Safe).into()
    }

    /// Creates a value from a dynamic object.
    ///
    /// For more information see [`Object`].
    pub fn from_object<T: Object + 'static>(value: T) -> Value {
        Value(ValueRepr::Dynamic(Arc::new(value)))
    }

    /// Creates a value from an already reference counted object.
    pub fn from_arc_object(value: Arc<dyn Object>) -> Value {
        Value(ValueRepr::Dynamic(value))
    }

    /// Creates a value holding a one-shot iterator.
    ///
    /// The name is used as debug label.  All clones of the returned value
    /// share the same cursor: iterating part of the items through one clone
    /// leaves the remaining items for the others.
    ///
    /// ```
    /// # use stencil::value::Value;
    /// let val = Value::make_one_shot_iterator("numbers", 1..3);
    /// ```
    pub fn make_one_shot_iterator<N, I>(name: N, iter: I) -> Value
    where
        N: Into<std::borrow::Cow<'static, str>>,
        I: Iterator + Send + Sync + 'static,
        I::Item: Into<Value>,
    {
        Value(ValueRepr::Iterator(Arc::new(OneShotIterator {
            name: name.into(),
            iter: Mutex::new(Box::new(iter.map(Into::into))),
            done: std::sync::atomic::AtomicBool::new(false),
        })))
    }

    /// Wraps a map so that it's interpreted as keyword arguments.
    pub(crate) fn from_kwargs(map: ValueMap) -> Value {
        Value(ValueRepr::Map(Arc::new(map), MapType::Kwargs))
    }

    /// Creates a value from a map.
    pub(crate) fn from_map(map: ValueMap) -> Value {
        Value(ValueRepr::Map(Arc::new(map), MapType::Normal))
    }

    /// Returns the kind of the value.
    ///
    /// This can be used to determine what's in the value before trying to
    /// perform operations on it.
    pub fn kind(&self) -> ValueKind {
        match self.0 {
            ValueRepr::Undefined(_) => ValueKind::Undefined,
            ValueRepr::Bool(_) => ValueKind::Bool,
            ValueRepr::I64(_) | ValueRepr::F64(_) | ValueRepr::I128(_) => ValueKind::Number,
            ValueRepr::None => ValueKind::None,
            ValueRepr::String(..) => ValueKind::String,
            ValueRepr::Bytes(_) => ValueKind::Bytes,
            ValueRepr::Seq(_) => ValueKind::Seq,
            ValueRepr::Map(..) => ValueKind::Map,
            ValueRepr::Iterator(_) => ValueKind::Iterator,
            // XXX: invalid values report themselves as undefined which is a lie
            ValueRepr::Invalid(_) => ValueKind::Undefined,
            ValueRepr::Dynamic(ref obj) => match obj.repr() {
                ObjectRepr::Map => ValueKind::Map,
                ObjectRepr::Seq => ValueKind::Seq,
                ObjectRepr::Plain => ValueKind::Plain,
            },
        }
    }

    /// Returns `true` if the value is a number.
    pub fn is_number(&self) -> bool {
        matches!(
            self.0,
            ValueRepr::I64(_) | ValueRepr::F64(_) | ValueRepr::I128(_)
        )
    }

    /// Returns `true` if the value holds an integer that fits exactly.
    pub fn is_integer(&self) -> bool {
        matches!(self.0, ValueRepr::I64(_) | ValueRepr::I128(_))
    }

    /// Returns `true` if the map represents keyword arguments.
    pub fn is_kwargs(&self) -> bool {
        matches!(self.0, ValueRepr::Map(_, MapType::Kwargs))
    }

    /// Is this value true?
    pub fn is_true(&self) -> bool {
        match self.0 {
            ValueRepr::Bool(val) => val,
            ValueRepr::I64(x) => x != 0,
            ValueRepr::I128(x) => x.0 != 0,
            ValueRepr::F64(x) => x != 0.0,
            ValueRepr::String(ref x, _) => !x.is_empty(),
            ValueRepr::Bytes(ref x) => !x.is_empty(),
            ValueRepr::None | ValueRepr::Undefined(_) | ValueRepr::Invalid(_) => false,
            ValueRepr::Seq(ref x) => !x.is_empty(),
            ValueRepr::Map(ref x, _) => !x.is_empty(),
            ValueRepr::Iterator(ref x) => !x.pull_done(),
            ValueRepr::Dynamic(ref x) => x.is_true(),
        }
    }

    /// Returns `true` if this value is safe.
    pub fn is_safe(&self) -> bool {
        matches!(&self.0, ValueRepr::String(_, StringType::Safe))
    }

    /// Returns `true` if this value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(&self.0, ValueRepr::Undefined(_))
    }

    /// Returns `true` if this value is none.
    pub fn is_none(&self) -> bool {
        matches!(&self.0, ValueRepr::None)
    }

    /// If the value is a string, return it.
    pub fn as_str(&self) -> Option<&str> {
        match &self.0 {
            ValueRepr::String(ref s, _) => Some(s as &str),
            _ => None,
        }
    }

    /// If the value is a string, return it as shared string.
    pub fn to_str(&self) -> Option<Arc<str>> {
        match &self.0 {
            ValueRepr::String(ref s, _) => Some(s.clone()),
            _ => None,
        }
    }

    /// Returns the bytes of this value if they exist.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.0 {
            ValueRepr::String(ref s, _) => Some(s.as_bytes()),
            ValueRepr::Bytes(ref b) => Some(&b[..]),
            _ => None,
        }
    }

    /// If this is an integer that fits a usize, return it.
    pub fn as_usize(&self) -> Option<usize> {
        usize::try_from(self.clone()).ok()
    }

    /// If this is an integer that fits an i64, return it.
    pub fn as_i64(&self) -> Option<i64> {
        i64::try_from(self.clone()).ok()
    }

    /// If the value is an object, it's returned as reference counted object.
    pub fn as_object(&self) -> Option<Arc<dyn Object>> {
        match self.0 {
            ValueRepr::Dynamic(ref obj) => Some(obj.clone()),
            _ => None,
        }
    }

    /// If the value wraps a map, return it.
    pub(crate) fn as_map(&self) -> Option<&ValueMap> {
        match self.0 {
            ValueRepr::Map(ref map, _) => Some(map),
            _ => None,
        }
    }

    /// Returns the length of the contained value.
    ///
    /// Values without a length will return `None`.
    ///
    /// ```
    /// # use stencil::value::Value;
    /// let seq = Value::from(vec![1, 2, 3, 4]);
    /// assert_eq!(seq.len(), Some(4));
    /// ```
    pub fn len(&self) -> Option<usize> {
        match self.0 {
            ValueRepr::String(ref s, _) => Some(s.chars().count()),
            ValueRepr::Bytes(ref b) => Some(b.len()),
            ValueRepr::Seq(ref seq) => Some(seq.len()),
            ValueRepr::Map(ref map, _) => Some(map.len()),
            ValueRepr::Dynamic(ref obj) => obj.len(),
            _ => None,
        }
    }

    /// Looks up an attribute by attribute name.
    ///
    /// This returns [`UNDEFINED`](Self::UNDEFINED) when an invalid key is
    /// resolved.  An error is returned if the value is undefined.
    ///
    /// ```
    /// # use stencil::value::Value;
    /// # fn test() -> Result<(), stencil::Error> {
    /// let ctx = stencil::context! {
    ///     foo => "Foo"
    /// };
    /// let value = ctx.get_attr("foo")?;
    /// assert_eq!(value.to_string(), "Foo");
    /// # Ok(()) }
    /// ```
    pub fn get_attr(&self, key: &str) -> Result<Value, Error> {
        if let ValueRepr::Undefined(_) = self.0 {
            return Err(Error::from(ErrorKind::UndefinedError));
        }
        Ok(self.get_attr_fast(key).unwrap_or(Value::UNDEFINED))
    }

    /// Alternative lookup strategy without error handling exclusively for
    /// context resolution.
    ///
    /// The main difference is that the return value will be `None` if the
    /// value is unable to look up the key rather than returning `Undefined`
    /// and errors will also not be created.
    pub(crate) fn get_attr_fast(&self, key: &str) -> Option<Value> {
        match self.0 {
            ValueRepr::Map(ref map, _) => map.get(key).cloned(),
            ValueRepr::Dynamic(ref obj) => obj.get_attr(key),
            _ => None,
        }
    }

    /// Looks up an item (or attribute) by key.
    ///
    /// This is similar to [`get_attr`](Self::get_attr) but instead of using
    /// a string key this can be any key.  For instance this can be used to
    /// index into sequences.  Like [`get_attr`](Self::get_attr) this returns
    /// [`UNDEFINED`](Self::UNDEFINED) when an invalid key is looked up.
    pub fn get_item(&self, key: &Value) -> Result<Value, Error> {
        if let ValueRepr::Undefined(_) = self.0 {
            Err(Error::from(ErrorKind::UndefinedError))
        } else {
            Ok(self.get_item_opt(key).unwrap_or(Value::UNDEFINED))
        }
    }

    /// Looks up an item by an integer index.
    pub fn get_item_by_index(&self, idx: usize) -> Result<Value, Error> {
        self.get_item(&Value(ValueRepr::I64(idx as i64)))
    }

    pub(crate) fn get_item_opt(&self, key: &Value) -> Option<Value> {
        fn index(value: &Value, len: impl Fn() -> usize) -> Option<usize> {
            match value.as_i64().and_then(|v| isize::try_from(v).ok()) {
                Some(i) if i < 0 => len().checked_sub(i.unsigned_abs()),
                Some(i) => Some(i as usize),
                None => None,
            }
        }

        match self.0 {
            ValueRepr::Map(ref map, _) => match key.as_str() {
                Some(key) => map.get(key).cloned(),
                None => map.get(key.to_string().as_str()).cloned(),
            },
            ValueRepr::Seq(ref seq) => {
                let idx = some!(index(key, || seq.len()));
                seq.get(idx).cloned()
            }
            ValueRepr::String(ref s, _) => {
                let idx = some!(index(key, || s.chars().count()));
                s.chars().nth(idx).map(Value::from)
            }
            ValueRepr::Bytes(ref b) => {
                let idx = some!(index(key, || b.len()));
                b.get(idx).copied().map(Value::from)
            }
            ValueRepr::Dynamic(ref obj) => obj.get_item(key),
            _ => None,
        }
    }

    /// Calls the value directly.
    ///
    /// If the value holds a function or macro, this invokes it.  Note that
    /// there is a separate namespace for methods on objects.  To call methods
    /// you have to use [`call_method`](Self::call_method).
    pub fn call(&self, state: &State, args: &[Value]) -> Result<Value, Error> {
        if let ValueRepr::Dynamic(ref obj) = self.0 {
            obj.call(state, args)
        } else {
            Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("value of type {} is not callable", self.kind()),
            ))
        }
    }

    /// Calls a method on the value.
    ///
    /// The name of the method is `name`, the arguments passed are in the
    /// `args` slice.
    pub fn call_method(&self, state: &State, name: &str, args: &[Value]) -> Result<Value, Error> {
        match self.0 {
            ValueRepr::Dynamic(ref obj) => obj.call_method(state, name, args),
            ValueRepr::Map(ref map, _) => match map.get(name) {
                Some(value) => value.call(state, args),
                None => Err(Error::new(
                    ErrorKind::UnknownMethod,
                    format!("map has no method named {name}"),
                )),
            },
            _ => Err(Error::new(
                ErrorKind::UnknownMethod,
                format!("object has no method named {name}"),
            )),
        }
    }

    /// Iterates over the value.
    ///
    /// Depending on the [`kind`](Self::kind) of the value the iterator
    /// has a different behavior.
    ///
    /// * [`ValueKind::Map`]: the iterator yields the keys of the map in
    ///   sorted order.
    /// * [`ValueKind::Seq`]: the iterator yields the items in the sequence.
    /// * [`ValueKind::Iterator`]: the iterator pulls from the shared cursor.
    /// * [`ValueKind::None`] / [`ValueKind::Undefined`]: the iterator is empty.
    pub fn try_iter(&self) -> Result<ValueIter, Error> {
        let imp = match self.0 {
            ValueRepr::None | ValueRepr::Undefined(_) => ValueIterImpl::Empty,
            ValueRepr::String(ref s, _) => ValueIterImpl::Chars(0, s.clone()),
            ValueRepr::Seq(ref seq) => ValueIterImpl::Seq(0, seq.clone()),
            ValueRepr::Map(ref map, _) => ValueIterImpl::Owned(
                map.keys()
                    .map(|k| Value::from(k.clone()))
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            ValueRepr::Iterator(ref iter) => ValueIterImpl::Shared(iter.clone()),
            ValueRepr::Dynamic(ref obj) => match obj.enumerate() {
                Some(items) => ValueIterImpl::Owned(items.into_iter()),
                None => {
                    return Err(Error::new(
                        ErrorKind::InvalidOperation,
                        format!("{} is not iterable", self.kind()),
                    ))
                }
            },
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("{} is not iterable", self.kind()),
                ))
            }
        };
        Ok(ValueIter { imp })
    }

    /// Returns some reference to the boxed object if it is of type `T`, or
    /// None if it isn't.
    ///
    /// This is basically the "reverse" of [`from_object`](Self::from_object).
    pub fn downcast_object_ref<T: Object + 'static>(&self) -> Option<&T> {
        match self.0 {
            ValueRepr::Dynamic(ref obj) => obj.downcast_ref(),
            _ => None,
        }
    }

    /// Checks the value for validity.
    ///
    /// Values that fail to serialize are carried through the engine as
    /// invalid values.  This surfaces such errors late, when the value is
    /// actually used.
    pub(crate) fn validate(self) -> Result<Value, Error> {
        if let ValueRepr::Invalid(ref msg) = self.0 {
            Err(Error::new(ErrorKind::BadSerialization, msg.to_string()))
        } else {
            Ok(self)
        }
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // enable round tripping of values
        if serializing_for_value() {
            let handle = LAST_VALUE_HANDLE.with(|x| {
                // we are okay with overflowing the handle here because these
                // values only live for a very short period of time and it's
                // not likely that you run out of an entire u32 worth of
                // handles in a single serialization operation.
                let rv = x.get().wrapping_add(1);
                x.set(rv);
                rv
            });
            VALUE_HANDLES.with(|handles| handles.borrow_mut().insert(handle, self.clone()));
            return serializer.serialize_unit_variant(VALUE_HANDLE_MARKER, handle, VALUE_HANDLE_MARKER);
        }

        match self.0 {
            ValueRepr::Bool(b) => serializer.serialize_bool(b),
            ValueRepr::I64(i) => serializer.serialize_i64(i),
            ValueRepr::F64(f) => serializer.serialize_f64(f),
            ValueRepr::I128(i) => serializer.serialize_i128(i.0),
            ValueRepr::None | ValueRepr::Undefined(_) | ValueRepr::Invalid(_) => {
                serializer.serialize_unit()
            }
            ValueRepr::String(ref s, _) => serializer.serialize_str(s),
            ValueRepr::Bytes(ref b) => serializer.serialize_bytes(b),
            ValueRepr::Seq(ref seq) => {
                use serde::ser::SerializeSeq;
                let mut s = ok!(serializer.serialize_seq(Some(seq.len())));
                for item in seq.iter() {
                    ok!(s.serialize_element(item));
                }
                s.end()
            }
            ValueRepr::Map(ref map, _) => {
                use serde::ser::SerializeMap;
                let mut s = ok!(serializer.serialize_map(Some(map.len())));
                for (key, value) in map.iter() {
                    ok!(s.serialize_entry(&key as &str, value));
                }
                s.end()
            }
            ValueRepr::Iterator(ref iter) => {
                use serde::ser::SerializeSeq;
                let mut s = ok!(serializer.serialize_seq(None));
                while let Some(item) = iter.pull_next() {
                    ok!(s.serialize_element(&item));
                }
                s.end()
            }
            ValueRepr::Dynamic(ref obj) => match obj.repr() {
                ObjectRepr::Seq => {
                    use serde::ser::SerializeSeq;
                    let items = obj.enumerate().unwrap_or_default();
                    let mut s = ok!(serializer.serialize_seq(Some(items.len())));
                    for item in items {
                        ok!(s.serialize_element(&item));
                    }
                    s.end()
                }
                ObjectRepr::Map => {
                    use serde::ser::SerializeMap;
                    let keys = obj.enumerate().unwrap_or_default();
                    let mut s = ok!(serializer.serialize_map(Some(keys.len())));
                    for key in keys {
                        let value = key
                            .as_str()
                            .and_then(|k| obj.get_attr(k))
                            .unwrap_or(Value::UNDEFINED);
                        ok!(s.serialize_entry(&key, &value));
                    }
                    s.end()
                }
                ObjectRepr::Plain => serializer.serialize_str(&obj.to_string()),
            },
        }
    }
}

/// Iterates over a value.
pub struct ValueIter {
    imp: ValueIterImpl,
}

impl ValueIter {
    /// Reports if the iterator pulls lazily from a shared one-shot cursor.
    pub(crate) fn is_one_shot(&self) -> bool {
        matches!(self.imp, ValueIterImpl::Shared(_))
    }
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Self::Item> {
        match self.imp {
            ValueIterImpl::Empty => None,
            ValueIterImpl::Chars(ref mut offset, ref s) => {
                (s as &str)[*offset..].chars().next().map(|c| {
                    *offset += c.len_utf8();
                    Value::from(c)
                })
            }
            ValueIterImpl::Seq(ref mut idx, ref seq) => {
                let rv = seq.get(*idx).cloned();
                if rv.is_some() {
                    *idx += 1;
                }
                rv
            }
            ValueIterImpl::Owned(ref mut iter) => iter.next(),
            ValueIterImpl::Shared(ref iter) => iter.pull_next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.imp {
            ValueIterImpl::Empty => (0, Some(0)),
            ValueIterImpl::Chars(offset, ref s) => {
                let rest = (s as &str)[offset..].chars().count();
                (rest, Some(rest))
            }
            ValueIterImpl::Seq(idx, ref seq) => {
                let rest = seq.len() - idx;
                (rest, Some(rest))
            }
            ValueIterImpl::Owned(ref iter) => iter.size_hint(),
            ValueIterImpl::Shared(_) => (0, None),
        }
    }
}

impl fmt::Debug for ValueIter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueIter").finish()
    }
}

enum ValueIterImpl {
    Empty,
    Chars(usize, Arc<str>),
    Seq(usize, Arc<Vec<Value>>),
    Owned(std::vec::IntoIter<Value>),
    Shared(Arc<OneShotIterator>),
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_basic_values() {
        assert_eq!(Value::from(42).to_string(), "42");
        assert_eq!(Value::from(42.5).to_string(), "42.5");
        assert_eq!(Value::from(42.0).to_string(), "42.0");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from(()).to_string(), "none");
        assert_eq!(Value::UNDEFINED.to_string(), "");
    }

    #[test]
    fn test_number_equality() {
        assert_eq!(Value::from(1), Value::from(1.0));
        assert_eq!(Value::from(1), Value::from(1i128));
        assert_ne!(Value::from(1), Value::from("1"));
    }

    #[test]
    fn test_one_shot_iterator_is_shared() {
        let iter = Value::make_one_shot_iterator("numbers", 0..4);
        let clone = iter.clone();
        let first: Vec<_> = iter.try_iter().unwrap().take(2).collect();
        assert_eq!(first, vec![Value::from(0), Value::from(1)]);
        let rest: Vec<_> = clone.try_iter().unwrap().collect();
        assert_eq!(rest, vec![Value::from(2), Value::from(3)]);
    }

    #[test]
    fn test_sizes() {
        assert!(std::mem::size_of::<Value>() <= 24);
    }
}
