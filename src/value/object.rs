use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::{Error, ErrorKind};
use crate::eval::State;
use crate::value::{Value, ValueMap};

/// Defines the shape of a dynamic object.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ObjectRepr {
    /// The object has no specific shape.  It cannot be iterated and
    /// renders via its display implementation.
    Plain,
    /// The object behaves like a sequence.  Iteration yields its items.
    Seq,
    /// The object behaves like a map.  Iteration yields its keys.
    Map,
}

/// A trait that represents a dynamic object.
///
/// The engine uses this trait to implement objects with dynamic behavior
/// such as the special `loop` variable, macros or imported modules.  User
/// code can implement it to expose stateful values to templates.
///
/// All methods have default implementations which makes it possible to
/// implement any subset of the capabilities:
///
/// ```rust
/// use std::sync::Arc;
/// use stencil::value::{Object, Value};
///
/// #[derive(Debug)]
/// struct Point(f32, f32);
///
/// impl Object for Point {
///     fn get_attr(&self, name: &str) -> Option<Value> {
///         match name {
///             "x" => Some(Value::from(self.0)),
///             "y" => Some(Value::from(self.1)),
///             _ => None,
///         }
///     }
/// }
///
/// let value = Value::from_object(Point(1.0, 2.5));
/// ```
pub trait Object: Any + fmt::Debug + Send + Sync {
    /// Describes the shape of the object.
    fn repr(&self) -> ObjectRepr {
        ObjectRepr::Map
    }

    /// Looks up an attribute by name.
    fn get_attr(&self, name: &str) -> Option<Value> {
        let _ = name;
        None
    }

    /// Looks up an item by key.
    ///
    /// The default implementation forwards string keys to
    /// [`get_attr`](Self::get_attr).
    fn get_item(&self, key: &Value) -> Option<Value> {
        self.get_attr(some!(key.as_str()))
    }

    /// Assigns an attribute.
    ///
    /// Only mutable objects such as the namespace object support this
    /// operation.  The default implementation fails.
    fn set_attr(&self, name: &str, value: Value) -> Result<(), Error> {
        let _ = (name, value);
        Err(Error::new(
            ErrorKind::InvalidOperation,
            "object does not support attribute assignment",
        ))
    }

    /// Enumerates the object.
    ///
    /// Sequence objects return their items, map objects their keys.  This
    /// is the eager iteration contract: objects that cannot cheaply produce
    /// their contents return `None` and are not iterable.
    fn enumerate(&self) -> Option<Vec<Value>> {
        None
    }

    /// Returns the length of the object if known.
    fn len(&self) -> Option<usize> {
        self.enumerate().map(|x| x.len())
    }

    /// Calls the object as function.
    fn call(&self, state: &State, args: &[Value]) -> Result<Value, Error> {
        let _ = (state, args);
        Err(Error::new(
            ErrorKind::InvalidOperation,
            "object is not callable",
        ))
    }

    /// Calls a method on the object.
    ///
    /// The default implementation looks the method up as attribute and
    /// calls the resulting value.  This is how macros reached through an
    /// imported module are invoked.
    fn call_method(&self, state: &State, name: &str, args: &[Value]) -> Result<Value, Error> {
        if let Some(value) = self.get_attr(name) {
            return value.call(state, args);
        }
        Err(Error::new(
            ErrorKind::UnknownMethod,
            format!("object has no method named {name}"),
        ))
    }

    /// The truthiness of the object.
    fn is_true(&self) -> bool {
        self.len().map_or(true, |len| len != 0)
    }

    /// Formats the object for output.
    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr() {
            ObjectRepr::Plain => write!(f, "{self:?}"),
            ObjectRepr::Seq | ObjectRepr::Map => {
                let items = self.enumerate().unwrap_or_default();
                if self.repr() == ObjectRepr::Seq {
                    f.debug_list().entries(items.iter()).finish()
                } else {
                    f.debug_map()
                        .entries(items.iter().map(|key| {
                            let value = key
                                .as_str()
                                .and_then(|name| self.get_attr(name))
                                .unwrap_or(Value::UNDEFINED);
                            (key.clone(), value)
                        }))
                        .finish()
                }
            }
        }
    }
}

impl dyn Object {
    /// Returns a reference to the object if it is of type `T`.
    pub fn downcast_ref<T: Object + 'static>(&self) -> Option<&T> {
        if self.type_id() == TypeId::of::<T>() {
            // SAFETY: the type id check above ensures this cast is sound
            unsafe { Some(&*(self as *const dyn Object as *const T)) }
        } else {
            None
        }
    }

    /// Checks if the object is of type `T`.
    pub fn is<T: Object + 'static>(&self) -> bool {
        self.type_id() == TypeId::of::<T>()
    }
}

impl fmt::Display for dyn Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f)
    }
}

/// Object that works like a namespace for attribute assignments.
///
/// This is what the `namespace()` function returns and what
/// `{% set ns.attr = value %}` mutates.
#[derive(Debug, Default)]
pub struct Namespace {
    fields: Mutex<ValueMap>,
}

impl Namespace {
    /// Creates a namespace from initial fields.
    pub(crate) fn from_fields(fields: ValueMap) -> Namespace {
        Namespace {
            fields: Mutex::new(fields),
        }
    }
}

impl Object for Namespace {
    fn get_attr(&self, name: &str) -> Option<Value> {
        self.fields.lock().unwrap().get(name).cloned()
    }

    fn set_attr(&self, name: &str, value: Value) -> Result<(), Error> {
        self.fields.lock().unwrap().insert(Arc::from(name), value);
        Ok(())
    }

    fn enumerate(&self) -> Option<Vec<Value>> {
        Some(
            self.fields
                .lock()
                .unwrap()
                .keys()
                .map(|key| Value::from(key.clone()))
                .collect(),
        )
    }

    fn render(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<namespace {:?}>", &*self.fields.lock().unwrap())
    }
}
